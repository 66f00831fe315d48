//! The protocol adapter. [`vst3`] contains the protocol objects, and the other modules contain
//! helpers that are not tied to the object model.

pub mod state;
pub(crate) mod util;
pub mod vst3;
