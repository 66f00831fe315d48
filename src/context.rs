//! Different contexts the plugin can use to make callbacks to the host in different...contexts.

pub mod gui;
pub mod process;
