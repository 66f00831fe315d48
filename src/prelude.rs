// Re-export the macros
pub use crate::debug::*;

pub use crate::util;

pub use crate::buffer::AudioBuffers;
pub use crate::context::gui::GuiContext;
pub use crate::context::process::{BarBeatTick, ProcessContext, Transport};
pub use crate::editor::{Editor, GeometryConstraints, ParentWindowHandle};
pub use crate::midi::{MidiEvent, MidiMessage};
pub use crate::param::{
    ParameterDesignation, ParameterEnumerationValue, ParameterEnumerationValues, ParameterHints,
    ParameterInfo, ParameterRanges,
};
pub use crate::plugin::{AudioPort, AudioPortHints, Plugin, PortGroup, StateKey};
pub use crate::wrapper::vst3::subcategories::Vst3SubCategory;
pub use crate::wrapper::vst3::{Module, ModuleInfo};
