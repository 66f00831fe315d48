#[macro_use]
pub mod debug;

/// Everything a plugin needs. Import this with `use vst3_adapter::prelude::*;`.
pub mod prelude;

// Used by the logging macros
#[doc(hidden)]
pub use log;

pub mod util;

pub mod buffer;
pub mod context;
pub mod editor;
pub mod midi;
pub mod param;
pub mod plugin;
pub mod wrapper;
