use atomic_refcell::AtomicRefCell;
use std::io::{Read, Write};
use std::sync::Arc;

use super::connection::{ComponentConnection, ConnectionPoint, Link, ViewConnection};
use super::inner::WrapperInner;
use super::interfaces::{
    Capability, IAudioProcessor, IComponent, IEditController, IMidiMapping, IPluginBase,
    IProcessContextRequirements,
};
use super::param_ids::MIDI_CHANNELS;
use super::process_data::ProcessData;
use super::protocol::{
    BusDirection, BusInfo, ComponentHandler, IoMode, MediaType, ParamInfo,
    ProcessContextRequirements, ProcessSetup, RoutingInfo, SpeakerArrangement,
    SymbolicSampleSize, Vst3Error, Vst3Result,
};
use super::view::PluginView;
use crate::midi::MIDI_CONTROLLERS_PER_CHANNEL;
use crate::plugin::{platform_class_id, Plugin};

/// The name of the only view the controller can create.
pub const EDITOR_VIEW_NAME: &str = "editor";

/// The adapter state behind a protocol object. The state itself only exists between
/// `initialize()` and `terminate()`.
pub(crate) struct Instance<P: Plugin> {
    inner: AtomicRefCell<Option<Arc<WrapperInner<P>>>>,
    /// The connection between the processing object and the controller in separate controller
    /// mode.
    pub comp_link: Arc<Link>,
    /// The controller's connection to its view.
    pub view_link: Arc<Link>,
}

impl<P: Plugin> Instance<P> {
    fn new() -> Self {
        Self {
            inner: AtomicRefCell::new(None),
            comp_link: Arc::new(Link::new()),
            view_link: Arc::new(Link::new()),
        }
    }

    fn initialize(&self) -> Vst3Result<()> {
        let mut inner = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Vst3Error::InternalError)?;
        if inner.is_some() {
            adapter_warn!("The host tried to initialize an already initialized object");
            return Err(Vst3Error::InvalidArgument);
        }

        *inner = Some(WrapperInner::new(
            self.comp_link.clone(),
            self.view_link.clone(),
        )?);

        Ok(())
    }

    fn terminate(&self) -> Vst3Result<()> {
        let mut inner = self
            .inner
            .try_borrow_mut()
            .map_err(|_| Vst3Error::InternalError)?;
        if inner.take().is_none() {
            adapter_warn!("The host tried to terminate an object that was not initialized");
            return Err(Vst3Error::InvalidArgument);
        }

        self.comp_link.clear();
        self.view_link.clear();

        Ok(())
    }

    /// The adapter state, or a not initialized error outside of `initialize()` and `terminate()`.
    pub fn inner(&self) -> Vst3Result<Arc<WrapperInner<P>>> {
        let inner = self
            .inner
            .try_borrow()
            .map_err(|_| Vst3Error::NotInitialized)?;

        inner.as_ref().cloned().ok_or(Vst3Error::NotInitialized)
    }
}

/// Which half of the plugin a [`Wrapper`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperRole {
    /// The processing object. Unless the plugin uses a separate controller, this is also the
    /// controller.
    Component,
    /// The separate controller object.
    Controller,
}

/// A processing or controller object. Without a separate controller the host only ever creates
/// the component, and that single object implements all of the interfaces.
pub struct Wrapper<P: Plugin> {
    role: WrapperRole,
    instance: Arc<Instance<P>>,
    component_connection: Arc<ComponentConnection<P>>,
    view_connection: Arc<ViewConnection<P>>,
}

impl<P: Plugin> Wrapper<P> {
    pub fn new(role: WrapperRole) -> Self {
        let instance = Arc::new(Instance::new());

        Self {
            role,
            component_connection: Arc::new(ComponentConnection::new(instance.clone())),
            view_connection: Arc::new(ViewConnection::new(instance.clone())),
            instance,
        }
    }

    pub fn role(&self) -> WrapperRole {
        self.role
    }

    /// Whether this object exposes `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        let is_component = self.role == WrapperRole::Component;
        let is_controller = self.role == WrapperRole::Controller || !P::SEPARATE_CONTROLLER;

        match capability {
            Capability::Unknown | Capability::PluginBase => true,
            Capability::Component
            | Capability::AudioProcessor
            | Capability::ProcessContextRequirements => is_component,
            Capability::EditController => is_controller,
            Capability::MidiMapping => is_controller && P::WANTS_MIDI_INPUT,
            Capability::ConnectionPoint => P::SEPARATE_CONTROLLER,
            Capability::PlugView | Capability::PlugViewContentScale => false,
        }
    }

    /// The connection point the host uses to connect the processing object and the controller.
    /// Only exposed in separate controller mode.
    pub fn connection_point(&self) -> Arc<dyn ConnectionPoint> {
        self.component_connection.clone()
    }

    /// The controller's connection point towards its view.
    pub fn view_connection_point(&self) -> Arc<dyn ConnectionPoint> {
        self.view_connection.clone()
    }

    /// Whether another object still holds on to one of this object's connection points.
    pub(crate) fn is_referenced_elsewhere(&self) -> bool {
        Arc::strong_count(&self.component_connection) > 1
            || Arc::strong_count(&self.view_connection) > 1
    }

    /// Forget both remote points without notifying them. Connected objects refer to each other's
    /// connection points, so this is what breaks those cycles when the module is unloaded.
    pub(crate) fn clear_links(&self) {
        self.instance.comp_link.clear();
        self.instance.view_link.clear();
    }

    fn inner(&self) -> Vst3Result<Arc<WrapperInner<P>>> {
        self.instance.inner()
    }
}

impl<P: Plugin> IPluginBase for Wrapper<P> {
    fn initialize(&self) -> Vst3Result<()> {
        self.instance.initialize()
    }

    fn terminate(&self) -> Vst3Result<()> {
        self.instance.terminate()
    }
}

impl<P: Plugin> IComponent for Wrapper<P> {
    fn controller_class_id(&self) -> Vst3Result<[u8; 16]> {
        if P::SEPARATE_CONTROLLER {
            Ok(platform_class_id(P::CONTROLLER_CLASS_ID))
        } else {
            Err(Vst3Error::NotImplemented)
        }
    }

    fn set_io_mode(&self, _mode: IoMode) -> Vst3Result<()> {
        self.inner()?;

        Err(Vst3Error::NotImplemented)
    }

    fn bus_count(&self, media_type: MediaType, direction: BusDirection) -> i32 {
        self.inner()
            .map(|inner| inner.buses.bus_count(media_type, direction))
            .unwrap_or(0)
    }

    fn bus_info(
        &self,
        media_type: MediaType,
        direction: BusDirection,
        index: i32,
    ) -> Vst3Result<BusInfo> {
        self.inner()?.buses.bus_info(media_type, direction, index)
    }

    fn routing_info(&self, _input: &RoutingInfo) -> Vst3Result<RoutingInfo> {
        Err(Vst3Error::NotImplemented)
    }

    fn activate_bus(
        &self,
        media_type: MediaType,
        direction: BusDirection,
        index: i32,
        state: bool,
    ) -> Vst3Result<()> {
        self.inner()?
            .buses
            .activate_bus(media_type, direction, index, state)
    }

    fn set_active(&self, state: bool) -> Vst3Result<()> {
        self.inner()?.set_active(state);

        Ok(())
    }

    fn set_state(&self, mut state: &mut dyn Read) -> Vst3Result<()> {
        self.inner()?.set_state(&mut state)
    }

    fn get_state(&self, mut state: &mut dyn Write) -> Vst3Result<()> {
        self.inner()?.get_state(&mut state)
    }
}

impl<P: Plugin> IAudioProcessor for Wrapper<P> {
    fn set_bus_arrangements(
        &self,
        inputs: &[SpeakerArrangement],
        outputs: &[SpeakerArrangement],
    ) -> Vst3Result<()> {
        self.inner()?.buses.set_arrangements(inputs, outputs)
    }

    fn bus_arrangement(
        &self,
        direction: BusDirection,
        index: i32,
    ) -> Vst3Result<SpeakerArrangement> {
        self.inner()?.buses.arrangement(direction, index)
    }

    fn can_process_sample_size(&self, symbolic_sample_size: SymbolicSampleSize) -> Vst3Result<()> {
        match symbolic_sample_size {
            SymbolicSampleSize::Sample32 => Ok(()),
            SymbolicSampleSize::Sample64 => Err(Vst3Error::ResultFalse),
        }
    }

    fn latency_samples(&self) -> u32 {
        self.inner()
            .map(|inner| inner.latency_samples())
            .unwrap_or(0)
    }

    fn setup_processing(&self, setup: &ProcessSetup) -> Vst3Result<()> {
        self.inner()?.setup_processing(setup)
    }

    fn set_processing(&self, state: bool) -> Vst3Result<()> {
        self.inner()?.set_active(state);

        Ok(())
    }

    fn process(&self, data: &mut ProcessData) -> Vst3Result<()> {
        self.inner()?.process(data)
    }

    fn tail_samples(&self) -> u32 {
        0
    }
}

impl<P: Plugin> IProcessContextRequirements for Wrapper<P> {
    fn process_context_requirements(&self) -> ProcessContextRequirements {
        if P::WANTS_TRANSPORT {
            ProcessContextRequirements::NEED_CONTINUOUS_TIME_SAMPLES
                | ProcessContextRequirements::NEED_PROJECT_TIME_MUSIC
                | ProcessContextRequirements::NEED_BAR_POSITION_MUSIC
                | ProcessContextRequirements::NEED_TEMPO
                | ProcessContextRequirements::NEED_TIME_SIGNATURE
                | ProcessContextRequirements::NEED_TRANSPORT_STATE
        } else {
            ProcessContextRequirements::empty()
        }
    }
}

impl<P: Plugin> IEditController for Wrapper<P> {
    fn set_component_state(&self, mut state: &mut dyn Read) -> Vst3Result<()> {
        let inner = self.inner()?;

        // Without a separate controller the component already has this state
        if P::SEPARATE_CONTROLLER {
            inner.set_state(&mut state)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, _state: &mut dyn Read) -> Vst3Result<()> {
        Ok(())
    }

    fn get_state(&self, _state: &mut dyn Write) -> Vst3Result<()> {
        Ok(())
    }

    fn parameter_count(&self) -> i32 {
        self.inner()
            .map(|inner| inner.parameter_count())
            .unwrap_or(0)
    }

    fn parameter_info(&self, param_index: i32) -> Vst3Result<ParamInfo> {
        self.inner()?.parameter_info(param_index)
    }

    fn param_string_by_value(&self, id: u32, value_normalized: f64) -> Vst3Result<String> {
        self.inner()?
            .parameter_string_for_value(id, value_normalized)
    }

    fn param_value_by_string(&self, id: u32, string: &str) -> Vst3Result<f64> {
        self.inner()?.parameter_value_for_string(id, string)
    }

    fn normalized_param_to_plain(&self, id: u32, value_normalized: f64) -> f64 {
        self.inner()
            .map(|inner| inner.normalized_to_plain(id, value_normalized))
            .unwrap_or(0.0)
    }

    fn plain_param_to_normalized(&self, id: u32, plain_value: f64) -> f64 {
        self.inner()
            .map(|inner| inner.plain_to_normalized(id, plain_value))
            .unwrap_or(0.0)
    }

    fn param_normalized(&self, id: u32) -> f64 {
        self.inner()
            .map(|inner| inner.parameter_normalized(id))
            .unwrap_or(0.0)
    }

    fn set_param_normalized(&self, id: u32, value: f64) -> Vst3Result<()> {
        self.inner()?.set_parameter_normalized(id, value)
    }

    fn set_component_handler(
        &self,
        handler: Option<Arc<dyn ComponentHandler>>,
    ) -> Vst3Result<()> {
        self.inner()?.set_component_handler(handler);

        Ok(())
    }

    fn create_view(&self, name: &str) -> Vst3Result<Arc<PluginView>> {
        let inner = self.inner()?;
        if !P::HAS_UI || name != EDITOR_VIEW_NAME {
            return Err(Vst3Error::NoInterface);
        }

        let editor = inner.plugin.lock().editor().ok_or(Vst3Error::NoInterface)?;
        let view = Arc::new(PluginView::new(editor, inner.param_ids));

        // The controller only talks to a single view at a time
        let controller_point = self.view_connection_point();
        if let Some(previous) = self.instance.view_link.remote() {
            adapter_warn!("Replacing the previous view");
            if let Err(err) = previous.disconnect(&controller_point) {
                adapter_warn!("Could not disconnect the previous view: {}", err);
            }
            self.instance.view_link.clear();
            inner.set_ui_connected(false);
        }

        let view_point: Arc<dyn ConnectionPoint> = view.clone();
        controller_point.connect(view_point.clone())?;
        view_point.connect(controller_point)?;

        Ok(view)
    }
}

impl<P: Plugin> IMidiMapping for Wrapper<P> {
    fn midi_controller_assignment(
        &self,
        bus_index: i32,
        channel: i16,
        cc: i16,
    ) -> Vst3Result<u32> {
        let inner = self.inner()?;
        if bus_index != 0
            || !(0..MIDI_CHANNELS as i16).contains(&channel)
            || !(0..MIDI_CONTROLLERS_PER_CHANNEL as i16).contains(&cc)
        {
            return Err(Vst3Error::ResultFalse);
        }

        inner
            .param_ids
            .midi_cc_id(channel as u8, cc as u8)
            .ok_or(Vst3Error::ResultFalse)
    }
}
