//! The host-facing protocol interfaces, as plain Rust traits. Which of these an object exposes is
//! decided through [`Capability`] queries on the [`Module`][super::factory::Module].

use std::io::{Read, Write};
use std::sync::Arc;

use super::process_data::ProcessData;
use super::protocol::{
    BusDirection, BusInfo, ComponentHandler, IoMode, MediaType, ParamInfo,
    ProcessContextRequirements, ProcessSetup, RoutingInfo, SpeakerArrangement,
    SymbolicSampleSize, Vst3Result,
};
use super::view::PluginView;

/// The interfaces an object can be queried for. Querying an object for an interface it does not
/// expose results in [`Vst3Error::NoInterface`][super::protocol::Vst3Error::NoInterface].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Unknown,
    PluginBase,
    Component,
    AudioProcessor,
    ProcessContextRequirements,
    EditController,
    MidiMapping,
    ConnectionPoint,
    PlugView,
    PlugViewContentScale,
}

pub trait IPluginBase {
    /// Fails with an invalid argument error if the object was already initialized.
    fn initialize(&self) -> Vst3Result<()>;

    /// Fails with an invalid argument error if the object was not initialized.
    fn terminate(&self) -> Vst3Result<()>;
}

pub trait IComponent: IPluginBase {
    fn controller_class_id(&self) -> Vst3Result<[u8; 16]>;
    fn set_io_mode(&self, mode: IoMode) -> Vst3Result<()>;
    fn bus_count(&self, media_type: MediaType, direction: BusDirection) -> i32;
    fn bus_info(
        &self,
        media_type: MediaType,
        direction: BusDirection,
        index: i32,
    ) -> Vst3Result<BusInfo>;
    fn routing_info(&self, input: &RoutingInfo) -> Vst3Result<RoutingInfo>;
    fn activate_bus(
        &self,
        media_type: MediaType,
        direction: BusDirection,
        index: i32,
        state: bool,
    ) -> Vst3Result<()>;
    fn set_active(&self, state: bool) -> Vst3Result<()>;
    fn set_state(&self, state: &mut dyn Read) -> Vst3Result<()>;
    fn get_state(&self, state: &mut dyn Write) -> Vst3Result<()>;
}

pub trait IAudioProcessor {
    fn set_bus_arrangements(
        &self,
        inputs: &[SpeakerArrangement],
        outputs: &[SpeakerArrangement],
    ) -> Vst3Result<()>;
    fn bus_arrangement(&self, direction: BusDirection, index: i32)
        -> Vst3Result<SpeakerArrangement>;
    fn can_process_sample_size(&self, symbolic_sample_size: SymbolicSampleSize) -> Vst3Result<()>;
    fn latency_samples(&self) -> u32;
    fn setup_processing(&self, setup: &ProcessSetup) -> Vst3Result<()>;
    fn set_processing(&self, state: bool) -> Vst3Result<()>;
    /// Called from the render context.
    fn process(&self, data: &mut ProcessData) -> Vst3Result<()>;
    fn tail_samples(&self) -> u32;
}

pub trait IProcessContextRequirements {
    fn process_context_requirements(&self) -> ProcessContextRequirements;
}

pub trait IEditController: IPluginBase {
    /// Receives the processing object's state, as written by [`IComponent::get_state()`].
    fn set_component_state(&self, state: &mut dyn Read) -> Vst3Result<()>;
    fn set_state(&self, state: &mut dyn Read) -> Vst3Result<()>;
    fn get_state(&self, state: &mut dyn Write) -> Vst3Result<()>;
    fn parameter_count(&self) -> i32;
    fn parameter_info(&self, param_index: i32) -> Vst3Result<ParamInfo>;
    fn param_string_by_value(&self, id: u32, value_normalized: f64) -> Vst3Result<String>;
    fn param_value_by_string(&self, id: u32, string: &str) -> Vst3Result<f64>;
    fn normalized_param_to_plain(&self, id: u32, value_normalized: f64) -> f64;
    fn plain_param_to_normalized(&self, id: u32, plain_value: f64) -> f64;
    fn param_normalized(&self, id: u32) -> f64;
    fn set_param_normalized(&self, id: u32, value: f64) -> Vst3Result<()>;
    fn set_component_handler(&self, handler: Option<Arc<dyn ComponentHandler>>)
        -> Vst3Result<()>;
    fn create_view(&self, name: &str) -> Vst3Result<Arc<PluginView>>;
}

pub trait IMidiMapping {
    /// The parameter ID for a MIDI controller on an input event bus.
    fn midi_controller_assignment(&self, bus_index: i32, channel: i16, cc: i16)
        -> Vst3Result<u32>;
}
