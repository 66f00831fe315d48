use atomic_float::{AtomicF32, AtomicF64};
use atomic_refcell::AtomicRefCell;
use crossbeam::queue::ArrayQueue;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::buses::BusLayout;
use super::connection::Link;
use super::context::{transport_from_context, WrapperProcessContext};
use super::events::EventScheduler;
use super::message::{Message, MessageId, RouteTarget};
use super::param_ids::{AdapterConfig, InternalParameter, ParameterIdSpace, ParameterKind};
use super::process_data::{AudioBusBuffers, ParameterChanges, ProcessData};
use super::protocol::{
    ComponentHandler, ParamFlags, ParamInfo, ProcessSetup, RestartFlags, SymbolicSampleSize,
    Vst3Error, Vst3Result,
};
use crate::buffer::AudioBuffers;
use crate::context::process::Transport;
use crate::midi::{MidiEvent, MAX_MIDI_EVENTS};
use crate::param::{ParameterDesignation, ParameterHints, ParameterInfo};
use crate::plugin::{Plugin, StateKey};
use crate::util::permit_alloc;
use crate::wrapper::state::{self, ParamValue, PluginState};
use crate::wrapper::util::{process_wrapper, u16strlcpy};

/// The largest buffer size the buffer size parameter can represent.
pub const MAX_BUFFER_SIZE: u32 = 32768;
/// The largest sample rate the sample rate parameter can represent.
pub const MAX_SAMPLE_RATE: f64 = 384000.0;
/// The largest latency the latency parameter can represent, in samples.
pub const MAX_LATENCY: f64 = MAX_SAMPLE_RATE * 10.0;

/// Used until the host calls `setupProcessing()`.
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;
pub const DEFAULT_BUFFER_SIZE: u32 = 1024;

/// The capacity of the queue for notes sent from the editor.
const UI_NOTE_QUEUE_CAPACITY: usize = 1024;

/// Everything the render context needs between `process()` calls. Reallocated in
/// `setupProcessing()`, never during processing.
pub(crate) struct ProcessScratch {
    pub scheduler: EventScheduler,
    /// The converted events passed to the plugin. Has room for [`MAX_MIDI_EVENTS`] events.
    pub midi_events: Vec<MidiEvent>,
    pub buffers: AudioBuffers,
    pub transport: Transport,
}

impl ProcessScratch {
    fn new(num_inputs: usize, num_outputs: usize, max_frames: usize) -> Self {
        Self {
            scheduler: EventScheduler::new(),
            midi_events: Vec::with_capacity(MAX_MIDI_EVENTS),
            buffers: AudioBuffers::new(num_inputs, num_outputs, max_frames),
            transport: Transport::default(),
        }
    }
}

/// The adapter state for one plugin instance. The component and the controller share one of
/// these in combined mode. In separate controller mode both objects get their own, and they only
/// talk to each other through their connection points.
pub(crate) struct WrapperInner<P: Plugin> {
    pub config: AdapterConfig,
    pub param_ids: ParameterIdSpace,

    /// The wrapped plugin instance. The render context only ever uses `try_lock()`.
    pub plugin: Mutex<P>,
    /// The plugin's parameter descriptions. Queried once when the instance is created.
    pub parameters: Vec<ParameterInfo>,
    pub program_names: Vec<String>,
    pub state_keys: Vec<StateKey>,
    pub buses: BusLayout,

    /// The last known plain value for every cache slot, see
    /// [`ParameterIdSpace::cache_slot()`].
    cached_values: Vec<AtomicF32>,
    /// Set when a parameter was changed from the render context and the host still needs to be
    /// told. Cleared by the render context after reporting the change.
    changed_during_processing: Vec<AtomicBool>,
    /// Set when a cached value changed and the editor still needs to be told. Cleared on the
    /// message context when the update is sent to the view.
    changed_for_ui: Vec<AtomicBool>,
    /// Three byte MIDI messages sent from the editor, drained at the start of every block.
    pub ui_notes: ArrayQueue<[u8; 3]>,

    /// The link towards the other half in separate controller mode.
    comp_link: Arc<Link>,
    /// The link towards the view, if one is connected.
    view_link: Arc<Link>,
    component_handler: RwLock<Option<Arc<dyn ComponentHandler>>>,

    /// The persisted key/value state, seeded with the declared defaults.
    states: Mutex<BTreeMap<String, String>>,
    current_program: AtomicU32,
    /// The latency last reported to the host.
    last_latency: AtomicU32,
    /// Whether the view has sent `init` and has not sent `close` since.
    ui_connected: AtomicBool,
    /// Whether the plugin's `activate()` has been called without a matching `deactivate()`.
    is_active: AtomicBool,
    sample_rate: AtomicF64,
    buffer_size: AtomicU32,

    scratch: AtomicRefCell<ProcessScratch>,
}

impl<P: Plugin> WrapperInner<P> {
    /// Create the adapter state and the plugin instance. Fails if the plugin's audio ports cannot
    /// be grouped into buses.
    pub fn new(comp_link: Arc<Link>, view_link: Arc<Link>) -> Vst3Result<Arc<Self>> {
        let mut plugin = P::default();
        let parameters = plugin.parameters();
        let program_names = plugin.program_names();
        let state_keys = plugin.state_keys();

        let config =
            AdapterConfig::for_plugin::<P>(parameters.len() as u32, program_names.len() as u32);
        let param_ids = ParameterIdSpace::new(&config);
        let buses = BusLayout::new(
            P::AUDIO_INPUTS,
            P::AUDIO_OUTPUTS,
            config.wants_midi_input,
            config.wants_midi_output,
        )?;

        plugin.set_sample_rate(DEFAULT_SAMPLE_RATE);
        plugin.set_buffer_size(DEFAULT_BUFFER_SIZE);
        let latency = if config.wants_latency {
            plugin.latency()
        } else {
            0
        };

        let cached_values = (0..param_ids.cache_len())
            .map(|slot| {
                let value = match param_ids.from_protocol_id(param_ids.id_for_cache_slot(slot)) {
                    ParameterKind::Internal(InternalParameter::BufferSize) => {
                        DEFAULT_BUFFER_SIZE as f32
                    }
                    ParameterKind::Internal(InternalParameter::SampleRate) => {
                        DEFAULT_SAMPLE_RATE as f32
                    }
                    ParameterKind::Internal(InternalParameter::Latency) => latency as f32,
                    ParameterKind::Plugin(index) => parameters[index as usize].ranges.def,
                    ParameterKind::Internal(InternalParameter::Program)
                    | ParameterKind::MidiCc { .. }
                    | ParameterKind::Invalid => 0.0,
                };

                AtomicF32::new(value)
            })
            .collect();
        let flags = || {
            (0..param_ids.cache_len())
                .map(|_| AtomicBool::new(false))
                .collect()
        };

        let states = state_keys
            .iter()
            .map(|state_key| (state_key.key.clone(), state_key.default.clone()))
            .collect();

        let scratch = ProcessScratch::new(
            buses.inputs.port_count(),
            buses.outputs.port_count(),
            DEFAULT_BUFFER_SIZE as usize,
        );

        Ok(Arc::new(Self {
            config,
            param_ids,

            plugin: Mutex::new(plugin),
            parameters,
            program_names,
            state_keys,
            buses,

            cached_values,
            changed_during_processing: flags(),
            changed_for_ui: flags(),
            ui_notes: ArrayQueue::new(UI_NOTE_QUEUE_CAPACITY),

            comp_link,
            view_link,
            component_handler: RwLock::new(None),

            states: Mutex::new(states),
            current_program: AtomicU32::new(0),
            last_latency: AtomicU32::new(latency),
            ui_connected: AtomicBool::new(false),
            is_active: AtomicBool::new(false),
            sample_rate: AtomicF64::new(DEFAULT_SAMPLE_RATE),
            buffer_size: AtomicU32::new(DEFAULT_BUFFER_SIZE),

            scratch: AtomicRefCell::new(scratch),
        }))
    }

    pub fn set_component_handler(&self, handler: Option<Arc<dyn ComponentHandler>>) {
        *self.component_handler.write() = handler;
    }

    fn component_handler(&self) -> Option<Arc<dyn ComponentHandler>> {
        self.component_handler.read().clone()
    }

    fn restart_component(&self, flags: RestartFlags) {
        if let Some(handler) = self.component_handler() {
            if let Err(err) = handler.restart_component(flags) {
                adapter_warn!("Restarting the component with {:?} failed: {}", flags, err);
            }
        }
    }

    /// The cache slot for an internal parameter, if it exists in this configuration. Internal
    /// parameters use their ID as their slot.
    fn internal_slot(&self, parameter: InternalParameter) -> Option<usize> {
        self.param_ids
            .internal_id(parameter)
            .map(|id| id as usize)
    }

    fn cached_value(&self, slot: usize) -> f32 {
        self.cached_values[slot].load(Ordering::Relaxed)
    }

    fn set_cached_value(&self, slot: usize, value: f32) {
        self.cached_values[slot].store(value, Ordering::Relaxed);
    }

    fn program_count_minus_one(&self) -> f64 {
        self.program_names.len().saturating_sub(1) as f64
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size.load(Ordering::Relaxed)
    }

    pub fn current_program(&self) -> u32 {
        self.current_program.load(Ordering::Relaxed)
    }

    pub fn latency_samples(&self) -> u32 {
        if self.config.wants_latency {
            self.plugin.lock().latency()
        } else {
            0
        }
    }

    // Parameters

    pub fn parameter_count(&self) -> i32 {
        self.param_ids.protocol_parameter_count() as i32
    }

    /// Describe the parameter at `param_index`. Parameter IDs are contiguous, so the index is
    /// also the ID.
    pub fn parameter_info(&self, param_index: i32) -> Vst3Result<ParamInfo> {
        if param_index < 0 || param_index >= self.parameter_count() {
            return Err(Vst3Error::InvalidArgument);
        }

        let id = param_index as u32;
        let mut info = ParamInfo {
            id,
            ..ParamInfo::default()
        };

        match self.param_ids.from_protocol_id(id) {
            ParameterKind::Internal(InternalParameter::BufferSize) => {
                info.flags = ParamFlags::IS_READ_ONLY | ParamFlags::IS_HIDDEN;
                info.step_count = MAX_BUFFER_SIZE as i32 - 1;
                u16strlcpy(&mut info.title, "Buffer Size");
                u16strlcpy(&mut info.short_title, "Buffer Size");
                u16strlcpy(&mut info.units, "frames");
            }
            ParameterKind::Internal(InternalParameter::SampleRate) => {
                info.flags = ParamFlags::IS_READ_ONLY | ParamFlags::IS_HIDDEN;
                u16strlcpy(&mut info.title, "Sample Rate");
                u16strlcpy(&mut info.short_title, "Sample Rate");
                u16strlcpy(&mut info.units, "frames");
            }
            ParameterKind::Internal(InternalParameter::Latency) => {
                info.flags = ParamFlags::IS_READ_ONLY | ParamFlags::IS_HIDDEN;
                u16strlcpy(&mut info.title, "Latency");
                u16strlcpy(&mut info.short_title, "Latency");
                u16strlcpy(&mut info.units, "frames");
            }
            ParameterKind::Internal(InternalParameter::Program) => {
                info.flags = ParamFlags::CAN_AUTOMATE
                    | ParamFlags::IS_LIST
                    | ParamFlags::IS_PROGRAM_CHANGE
                    | ParamFlags::IS_HIDDEN;
                info.step_count = self.program_count_minus_one() as i32;
                u16strlcpy(&mut info.title, "Current Program");
                u16strlcpy(&mut info.short_title, "Program");
            }
            ParameterKind::MidiCc {
                channel,
                controller,
            } => {
                info.flags = ParamFlags::CAN_AUTOMATE | ParamFlags::IS_HIDDEN;
                info.step_count = 127;
                u16strlcpy(
                    &mut info.title,
                    &format!("MIDI Ch. {} CC {}", channel + 1, controller),
                );
                u16strlcpy(&mut info.short_title, &format!("CC{controller}"));
            }
            ParameterKind::Plugin(index) => {
                let parameter = &self.parameters[index as usize];

                if parameter.designation == ParameterDesignation::Bypass {
                    info.flags |= ParamFlags::IS_BYPASS;
                }
                if parameter.hints.contains(ParameterHints::AUTOMATABLE) {
                    info.flags |= ParamFlags::CAN_AUTOMATE;
                }
                if parameter.is_output() {
                    info.flags |= ParamFlags::IS_READ_ONLY;
                }

                info.step_count = if parameter.is_boolean() {
                    1
                } else if parameter.is_integer() {
                    (parameter.ranges.max - parameter.ranges.min) as i32
                } else {
                    0
                };
                let enum_values = &parameter.enum_values;
                if enum_values.restricted && enum_values.values.len() >= 2 {
                    info.flags |= ParamFlags::IS_LIST;
                    info.step_count = enum_values.values.len() as i32 - 1;
                }

                info.default_normalized_value =
                    parameter.ranges.normalized_value(parameter.ranges.def as f64);
                u16strlcpy(&mut info.title, &parameter.name);
                u16strlcpy(&mut info.short_title, &parameter.short_name);
                u16strlcpy(&mut info.units, &parameter.unit);
            }
            ParameterKind::Invalid => return Err(Vst3Error::InvalidArgument),
        }

        Ok(info)
    }

    pub fn parameter_string_for_value(&self, id: u32, normalized: f64) -> Vst3Result<String> {
        if !(0.0..=1.0).contains(&normalized) {
            return Err(Vst3Error::InvalidArgument);
        }

        let string = match self.param_ids.from_protocol_id(id) {
            ParameterKind::Internal(InternalParameter::BufferSize) => {
                ((normalized * MAX_BUFFER_SIZE as f64 + 0.5) as i32).to_string()
            }
            ParameterKind::Internal(InternalParameter::SampleRate) => {
                format_float((normalized * MAX_SAMPLE_RATE).round())
            }
            ParameterKind::Internal(InternalParameter::Latency) => {
                format_float((normalized * MAX_LATENCY).round())
            }
            ParameterKind::Internal(InternalParameter::Program) => {
                let program = (normalized * self.program_count_minus_one()).round() as usize;
                self.program_names
                    .get(program)
                    .cloned()
                    .ok_or(Vst3Error::InvalidArgument)?
            }
            ParameterKind::MidiCc { .. } => format_float((normalized * 127.0).round()),
            ParameterKind::Plugin(index) => {
                let parameter = &self.parameters[index as usize];
                let value = parameter.unnormalize(normalized) as f32;

                match parameter.enum_values.label_for(value) {
                    Some(label) => label.to_owned(),
                    None if parameter.is_integer() => (value as i32).to_string(),
                    None => format_float(value as f64),
                }
            }
            ParameterKind::Invalid => return Err(Vst3Error::InvalidArgument),
        };

        Ok(string)
    }

    pub fn parameter_value_for_string(&self, id: u32, string: &str) -> Vst3Result<f64> {
        let string = string.trim();
        let parse = |string: &str| {
            string
                .parse::<f64>()
                .map_err(|_| Vst3Error::InvalidArgument)
        };

        match self.param_ids.from_protocol_id(id) {
            ParameterKind::Internal(InternalParameter::BufferSize) => {
                Ok(parse(string)?.trunc() / MAX_BUFFER_SIZE as f64)
            }
            ParameterKind::Internal(InternalParameter::SampleRate) => {
                Ok(parse(string)? / MAX_SAMPLE_RATE)
            }
            ParameterKind::Internal(InternalParameter::Latency) => Ok(parse(string)? / MAX_LATENCY),
            ParameterKind::Internal(InternalParameter::Program) => {
                let program = self
                    .program_names
                    .iter()
                    .position(|name| name == string)
                    .ok_or(Vst3Error::InvalidArgument)?;

                Ok(normalize_program(program as f64, self.program_count_minus_one()))
            }
            ParameterKind::MidiCc { .. } => Err(Vst3Error::NotImplemented),
            ParameterKind::Plugin(index) => {
                let parameter = &self.parameters[index as usize];
                let value = match parameter.enum_values.value_for(string) {
                    Some(value) => value as f64,
                    None if parameter.is_integer() => parse(string)?.trunc(),
                    None => parse(string)?,
                };

                Ok(parameter.ranges.normalized_value(value))
            }
            ParameterKind::Invalid => Err(Vst3Error::InvalidArgument),
        }
    }

    /// Convert a normalized value to a plain value. Out of range values and unknown IDs result in
    /// 0.
    pub fn normalized_to_plain(&self, id: u32, normalized: f64) -> f64 {
        if !(0.0..=1.0).contains(&normalized) {
            return 0.0;
        }

        match self.param_ids.from_protocol_id(id) {
            ParameterKind::Internal(InternalParameter::BufferSize) => {
                (normalized * MAX_BUFFER_SIZE as f64).round()
            }
            ParameterKind::Internal(InternalParameter::SampleRate) => normalized * MAX_SAMPLE_RATE,
            ParameterKind::Internal(InternalParameter::Latency) => normalized * MAX_LATENCY,
            ParameterKind::Internal(InternalParameter::Program) => {
                (normalized * self.program_count_minus_one()).round()
            }
            ParameterKind::MidiCc { .. } => (normalized * 127.0).round(),
            ParameterKind::Plugin(index) => self.parameters[index as usize].unnormalize(normalized),
            ParameterKind::Invalid => 0.0,
        }
    }

    /// Convert a plain value to a normalized value. Unknown IDs result in 0.
    pub fn plain_to_normalized(&self, id: u32, plain: f64) -> f64 {
        match self.param_ids.from_protocol_id(id) {
            ParameterKind::Internal(InternalParameter::BufferSize) => {
                (plain / MAX_BUFFER_SIZE as f64).clamp(0.0, 1.0)
            }
            ParameterKind::Internal(InternalParameter::SampleRate) => {
                (plain / MAX_SAMPLE_RATE).clamp(0.0, 1.0)
            }
            ParameterKind::Internal(InternalParameter::Latency) => {
                (plain / MAX_LATENCY).clamp(0.0, 1.0)
            }
            ParameterKind::Internal(InternalParameter::Program) => {
                normalize_program(plain, self.program_count_minus_one())
            }
            ParameterKind::MidiCc { .. } => (plain / 127.0).clamp(0.0, 1.0),
            ParameterKind::Plugin(index) => {
                self.parameters[index as usize].ranges.normalized_value(plain)
            }
            ParameterKind::Invalid => 0.0,
        }
    }

    /// The normalized value for a parameter, based on the cached plain value. The MIDI controller
    /// pseudo-parameters don't have a value and always return 0.
    pub fn parameter_normalized(&self, id: u32) -> f64 {
        match self.param_ids.cache_slot(id) {
            Some(slot) => self.plain_to_normalized(id, self.cached_value(slot) as f64),
            None => 0.0,
        }
    }

    pub fn set_parameter_normalized(&self, id: u32, normalized: f64) -> Vst3Result<()> {
        if !(0.0..=1.0).contains(&normalized) {
            return Err(Vst3Error::InvalidArgument);
        }

        match self.param_ids.from_protocol_id(id) {
            ParameterKind::Internal(parameter) => {
                let plain = self.normalized_to_plain(id, normalized);
                self.set_cached_value(id as usize, plain as f32);

                let flags = match parameter {
                    InternalParameter::BufferSize => {
                        self.buffer_size.store(plain as u32, Ordering::Relaxed);
                        self.plugin.lock().set_buffer_size(plain as u32);
                        RestartFlags::empty()
                    }
                    InternalParameter::SampleRate => {
                        self.sample_rate.store(plain, Ordering::Relaxed);
                        self.changed_for_ui[id as usize].store(true, Ordering::Release);
                        self.plugin.lock().set_sample_rate(plain);
                        RestartFlags::empty()
                    }
                    InternalParameter::Latency => RestartFlags::LATENCY_CHANGED,
                    InternalParameter::Program => {
                        self.load_program(plain as u32);
                        RestartFlags::PARAM_VALUES_CHANGED
                    }
                };

                if !flags.is_empty() {
                    self.restart_component(flags);
                }

                Ok(())
            }
            ParameterKind::Plugin(index) => {
                let plain = self.parameters[index as usize].unnormalize(normalized) as f32;
                let slot = self.param_ids.plugin_cache_slot(index);
                self.set_cached_value(slot, plain);
                self.changed_for_ui[slot].store(true, Ordering::Release);

                // In combined mode the value reaches the plugin through the automation queues
                if self.config.separate_controller {
                    self.plugin.lock().set_parameter_value(index, plain);
                }

                Ok(())
            }
            ParameterKind::MidiCc { .. } | ParameterKind::Invalid => Err(Vst3Error::InvalidArgument),
        }
    }

    /// Load a program and read the parameter values back from the plugin.
    fn load_program(&self, program: u32) {
        self.current_program.store(program, Ordering::Relaxed);
        if let Some(slot) = self.internal_slot(InternalParameter::Program) {
            self.set_cached_value(slot, program as f32);
            self.changed_for_ui[slot].store(true, Ordering::Release);
        }

        let mut plugin = self.plugin.lock();
        plugin.load_program(program);
        for (index, parameter) in self.parameters.iter().enumerate() {
            if !parameter.is_persisted() {
                continue;
            }

            let slot = self.param_ids.plugin_cache_slot(index as u32);
            self.set_cached_value(slot, plugin.parameter_value(index as u32));
            self.changed_for_ui[slot].store(true, Ordering::Release);
        }
    }

    /// Flag a plugin parameter so its current value gets reported to the host after the block.
    pub fn request_parameter_change(&self, index: u32) {
        if index >= self.param_ids.plugin_parameter_count() {
            adapter_debug_assert_failure!("Unknown parameter index {} in a change request", index);
            return;
        }

        let slot = self.param_ids.plugin_cache_slot(index);
        self.changed_during_processing[slot].store(true, Ordering::Release);
    }

    // Processing

    pub fn set_active(&self, active: bool) {
        let mut plugin = self.plugin.lock();
        if active {
            if !self.is_active.swap(true, Ordering::SeqCst) {
                plugin.activate();
            }
        } else if self.is_active.swap(false, Ordering::SeqCst) {
            plugin.deactivate();
        }
    }

    pub fn setup_processing(&self, setup: &ProcessSetup) -> Vst3Result<()> {
        if setup.symbolic_sample_size != SymbolicSampleSize::Sample32 {
            adapter_warn!("Only 32-bit processing is supported");
            return Err(Vst3Error::InvalidArgument);
        }
        if setup.max_samples_per_block <= 0 || setup.sample_rate <= 0.0 {
            return Err(Vst3Error::InvalidArgument);
        }

        let buffer_size = setup.max_samples_per_block as u32;
        adapter_log!(
            "Processing at {} Hz with blocks of up to {} samples",
            setup.sample_rate,
            buffer_size
        );

        let mut plugin = self.plugin.lock();
        let was_active = self.is_active.swap(false, Ordering::SeqCst);
        if was_active {
            plugin.deactivate();
        }

        plugin.set_sample_rate(setup.sample_rate);
        plugin.set_buffer_size(buffer_size);
        self.sample_rate.store(setup.sample_rate, Ordering::Relaxed);
        self.buffer_size.store(buffer_size, Ordering::Relaxed);

        if self.config.separate_controller {
            if let Some(slot) = self.internal_slot(InternalParameter::BufferSize) {
                self.set_cached_value(slot, buffer_size as f32);
                self.changed_during_processing[slot].store(true, Ordering::Release);
            }
            if let Some(slot) = self.internal_slot(InternalParameter::SampleRate) {
                self.set_cached_value(slot, setup.sample_rate as f32);
                self.changed_during_processing[slot].store(true, Ordering::Release);
                self.changed_for_ui[slot].store(true, Ordering::Release);
            }
        }

        {
            let mut scratch = self.scratch.try_borrow_mut().map_err(|_| {
                adapter_warn!("Processing was set up while the render context was running");
                Vst3Error::InternalError
            })?;
            *scratch = ProcessScratch::new(
                self.buses.inputs.port_count(),
                self.buses.outputs.port_count(),
                buffer_size as usize,
            );
        }

        if was_active {
            plugin.activate();
            self.is_active.store(true, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Process a single block. This is called from the render context, so nothing here blocks or
    /// returns an error for bad input. Contended locks result in a silent block.
    pub fn process(&self, data: &mut ProcessData) -> Vst3Result<()> {
        process_wrapper(|| self.process_block(data))
    }

    fn process_block(&self, data: &mut ProcessData) -> Vst3Result<()> {
        let ProcessData {
            symbolic_sample_size,
            num_samples,
            inputs,
            outputs,
            input_parameter_changes,
            output_parameter_changes,
            input_events,
            output_events,
            process_context,
            ..
        } = data;

        if *symbolic_sample_size != SymbolicSampleSize::Sample32 {
            adapter_debug_assert_failure!("The host sent a 64-bit block");
            silence_outputs(outputs);
            return Err(Vst3Error::InvalidArgument);
        }

        let mut plugin = match self.plugin.try_lock() {
            Some(plugin) => plugin,
            None => {
                silence_outputs(outputs);
                return Ok(());
            }
        };

        // The host may only want to flush parameter changes
        if *num_samples <= 0 {
            self.update_parameters_from_processing(&mut plugin, output_parameter_changes.as_mut(), 0);
            return Ok(());
        }

        let mut scratch = match self.scratch.try_borrow_mut() {
            Ok(scratch) => scratch,
            Err(_) => {
                silence_outputs(outputs);
                return Ok(());
            }
        };
        let ProcessScratch {
            scheduler,
            midi_events,
            buffers,
            transport,
        } = &mut *scratch;

        if !self.is_active.swap(true, Ordering::SeqCst) {
            permit_alloc(|| plugin.activate());
        }

        let num_frames = buffers.set_frames(*num_samples as usize) as u32;

        // Automation at the start of the block is applied before running the plugin
        if let Some(changes) = input_parameter_changes.as_ref() {
            for (index, value) in self.plugin_automation(changes, |offset| offset == 0) {
                self.apply_automation(&mut plugin, index, value);
            }
        }

        midi_events.clear();
        if self.config.wants_midi_input {
            scheduler.clear();
            let mut has_room = scheduler.feed_ui_notes(&self.ui_notes);
            if has_room {
                if let Some(events) = input_events.as_ref() {
                    has_room = scheduler.feed_host_events(events, num_frames);
                }
            }
            if has_room {
                if let Some(changes) = input_parameter_changes.as_ref() {
                    scheduler.feed_controller_changes(changes, &self.param_ids, num_frames);
                }
            }

            scheduler.convert(midi_events);
        }

        for port in 0..self.buses.inputs.port_count() {
            let source = if self.buses.inputs.is_port_enabled(port) {
                self.buses
                    .inputs
                    .port_location(port)
                    .and_then(|(bus, channel)| inputs.get(bus)?.channels.get(channel))
            } else {
                None
            };

            let dest = buffers.input_mut(port);
            match source {
                Some(source) => {
                    let len = dest.len().min(source.len());
                    dest[..len].copy_from_slice(&source[..len]);
                    dest[len..].fill(0.0);
                }
                None => dest.fill(0.0),
            }
        }
        buffers.clear_outputs();

        if self.config.wants_transport {
            if let Some(context) = process_context.as_ref() {
                *transport = transport_from_context(context);
            }
        }

        {
            let mut context = WrapperProcessContext {
                inner: self,
                transport: &*transport,
                output_events: output_events.as_mut(),
            };
            plugin.run(buffers, midi_events, &mut context);
        }

        for bus in outputs.iter_mut() {
            bus.silence_flags = 0;
        }
        for port in 0..self.buses.outputs.port_count() {
            let (bus, channel) = match self.buses.outputs.port_location(port) {
                Some(location) => location,
                None => continue,
            };
            let dest = match outputs
                .get_mut(bus)
                .and_then(|bus| bus.channels.get_mut(channel))
            {
                Some(dest) => dest,
                None => continue,
            };

            let source = buffers.output_ref(port);
            let len = dest.len().min(source.len());
            if self.buses.outputs.is_port_enabled(port) {
                dest[..len].copy_from_slice(&source[..len]);
            } else {
                dest[..len].fill(0.0);
            }

            // Blocks longer than the maximum block size only get processed up to that size
            let block_len = dest.len().min(*num_samples as usize);
            if block_len > len {
                dest[len..block_len].fill(0.0);
            }
        }

        // The last point of a queue is applied after the block, unless it was already applied
        // above
        if let Some(changes) = input_parameter_changes.as_ref() {
            let last_points = changes.queues.iter().filter_map(|queue| {
                let &(offset, value) = queue.points.last()?;
                if offset == 0 {
                    return None;
                }

                match self.param_ids.from_protocol_id(queue.id) {
                    ParameterKind::Plugin(index)
                        if !self.parameters[index as usize].is_output() =>
                    {
                        Some((index, value))
                    }
                    _ => None,
                }
            });
            for (index, value) in last_points {
                self.apply_automation(&mut plugin, index, value);
            }
        }

        self.update_parameters_from_processing(
            &mut plugin,
            output_parameter_changes.as_mut(),
            num_frames as i32 - 1,
        );

        Ok(())
    }

    /// The first point of every plugin parameter queue whose offset matches `filter`. Output
    /// parameters cannot be automated and are skipped.
    fn plugin_automation<'a>(
        &'a self,
        changes: &'a ParameterChanges,
        filter: impl Fn(i32) -> bool + 'a,
    ) -> impl Iterator<Item = (u32, f64)> + 'a {
        changes.queues.iter().filter_map(move |queue| {
            let &(offset, value) = queue.points.first()?;
            if !filter(offset) {
                return None;
            }

            match self.param_ids.from_protocol_id(queue.id) {
                ParameterKind::Plugin(index) if !self.parameters[index as usize].is_output() => {
                    Some((index, value))
                }
                _ => None,
            }
        })
    }

    fn apply_automation(&self, plugin: &mut P, index: u32, normalized: f64) {
        let plain = self.parameters[index as usize].unnormalize(normalized) as f32;
        let slot = self.param_ids.plugin_cache_slot(index);
        self.set_cached_value(slot, plain);
        self.changed_for_ui[slot].store(true, Ordering::Release);
        plugin.set_parameter_value(index, plain);
    }

    /// Report parameter changes made on the render context to the host. Every change gets a point
    /// at the start of the block, and another one at `offset` if that is not also the start.
    fn update_parameters_from_processing(
        &self,
        plugin: &mut P,
        changes: Option<&mut ParameterChanges>,
        offset: i32,
    ) {
        let changes = match changes {
            Some(changes) => changes,
            None => return,
        };

        if self.config.separate_controller {
            for parameter in [InternalParameter::BufferSize, InternalParameter::SampleRate] {
                if let Some(slot) = self.internal_slot(parameter) {
                    if self.changed_during_processing[slot].swap(false, Ordering::AcqRel) {
                        let id = slot as u32;
                        let normalized =
                            self.plain_to_normalized(id, self.cached_value(slot) as f64);
                        add_output_point(changes, id, normalized, 0);
                    }
                }
            }
        }

        for (index, parameter) in self.parameters.iter().enumerate() {
            let index = index as u32;
            let slot = self.param_ids.plugin_cache_slot(index);

            let value = if parameter.is_output() {
                let value = plugin.parameter_value(index);
                if value == self.cached_value(slot) {
                    continue;
                }

                value
            } else if parameter.is_trigger() {
                let value = plugin.parameter_value(index);
                if value == parameter.ranges.def {
                    continue;
                }

                plugin.set_parameter_value(index, parameter.ranges.def);
                value
            } else if self.changed_during_processing[slot].swap(false, Ordering::AcqRel) {
                plugin.parameter_value(index)
            } else {
                continue;
            };

            self.set_cached_value(slot, value);
            self.changed_for_ui[slot].store(true, Ordering::Release);

            let id = self.param_ids.internal_count() + index;
            let normalized = parameter.ranges.normalized_value(value as f64);
            add_output_point(changes, id, normalized, offset);
        }

        if let Some(slot) = self.internal_slot(InternalParameter::Latency) {
            let latency = plugin.latency();
            if self.last_latency.swap(latency, Ordering::AcqRel) != latency {
                self.set_cached_value(slot, latency as f32);

                let id = slot as u32;
                add_output_point(changes, id, self.plain_to_normalized(id, latency as f64), 0);
            }
        }
    }

    // State

    /// Write the plugin's current state to `writer`.
    pub fn get_state(&self, writer: &mut impl Write) -> Vst3Result<()> {
        let state = {
            let plugin = self.plugin.lock();
            let mut states = self.states.lock();
            for (key, value) in states.iter_mut() {
                if let Some(current) = plugin.state(key) {
                    *value = current;
                }
            }

            let parameters = self
                .parameters
                .iter()
                .enumerate()
                .filter(|(_, parameter)| parameter.is_persisted())
                .map(|(index, parameter)| {
                    let value = plugin.parameter_value(index as u32);
                    let value = if parameter.is_integer() {
                        ParamValue::I32(value.round() as i32)
                    } else {
                        ParamValue::F32(value)
                    };

                    (parameter.symbol.clone(), value)
                })
                .collect();

            PluginState {
                program: self.config.wants_programs().then(|| self.current_program()),
                states: states.clone(),
                parameters,
            }
        };

        state::serialize(&state, writer).map_err(|err| {
            adapter_warn!("Could not write the state: {}", err);
            Vst3Error::InternalError
        })
    }

    /// Restore a state written by [`get_state()`][Self::get_state()]. Unknown state keys and
    /// parameter symbols are skipped. If a view is connected it is sent the restored values.
    pub fn set_state(&self, reader: &mut impl Read) -> Vst3Result<()> {
        let restored = state::deserialize(reader, |symbol| {
            self.parameters
                .iter()
                .find(|parameter| parameter.is_persisted() && parameter.symbol == symbol)
                .map(|parameter| parameter.is_integer())
        })?;

        let connected = self.is_view_connected();
        let mut view_messages = Vec::new();
        {
            let mut plugin = self.plugin.lock();

            if let Some(program) = restored.program {
                if (program as usize) < self.program_names.len() {
                    self.current_program.store(program, Ordering::Relaxed);
                    plugin.load_program(program);

                    if let Some(slot) = self.internal_slot(InternalParameter::Program) {
                        self.set_cached_value(slot, program as f32);
                        if connected {
                            self.changed_for_ui[slot].store(false, Ordering::Release);
                            view_messages.push(Message::parameter_set(
                                RouteTarget::View,
                                slot as u32,
                                program as f64,
                            ));
                        }
                    }
                } else {
                    adapter_warn!("Ignoring unknown program {} in the state", program);
                }
            }

            for (key, value) in &restored.states {
                if !self.is_state_key(key) {
                    adapter_warn!("Ignoring unknown state key '{}'", key);
                    continue;
                }

                self.states.lock().insert(key.clone(), value.clone());
                plugin.set_state(key, value);
                if connected {
                    view_messages.push(Message::state_set(RouteTarget::View, key, value));
                }
            }

            for (symbol, value) in &restored.parameters {
                let index = match self
                    .parameters
                    .iter()
                    .position(|parameter| parameter.is_persisted() && &parameter.symbol == symbol)
                {
                    Some(index) => index as u32,
                    None => continue,
                };

                let value = value.as_f32();
                let slot = self.param_ids.plugin_cache_slot(index);
                self.set_cached_value(slot, value);
                if connected {
                    self.changed_for_ui[slot].store(true, Ordering::Release);
                }
                plugin.set_parameter_value(index, value);
            }
        }

        self.restart_component(RestartFlags::PARAM_VALUES_CHANGED);

        if connected {
            for (index, parameter) in self.parameters.iter().enumerate() {
                if !parameter.is_persisted() {
                    continue;
                }

                let index = index as u32;
                let slot = self.param_ids.plugin_cache_slot(index);
                self.changed_for_ui[slot].store(false, Ordering::Release);
                view_messages.push(Message::parameter_set(
                    RouteTarget::View,
                    self.param_ids.internal_count() + index,
                    self.cached_value(slot) as f64,
                ));
            }
        }

        for message in view_messages {
            self.send_to_view(&message);
        }

        Ok(())
    }

    fn is_state_key(&self, key: &str) -> bool {
        self.state_keys.iter().any(|state_key| state_key.key == key)
    }

    /// Set a single state value, coming from the editor.
    fn set_state_value(&self, key: &str, value: &str) {
        self.plugin.lock().set_state(key, value);

        if self.is_state_key(key) {
            self.states.lock().insert(key.to_owned(), value.to_owned());
        } else {
            adapter_warn!("Failed to find a state with key '{}'", key);
        }
    }

    // Messages

    pub fn set_ui_connected(&self, connected: bool) {
        self.ui_connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_ui_connected(&self) -> bool {
        self.ui_connected.load(Ordering::SeqCst)
    }

    fn is_view_connected(&self) -> bool {
        self.is_ui_connected() && self.view_link.is_connected()
    }

    /// Whether the processing half is connected, in separate controller mode.
    pub fn is_component_connected(&self) -> bool {
        self.comp_link.is_connected()
    }

    fn send_to_view(&self, message: &Message) {
        if let Err(err) = self.view_link.send(message) {
            adapter_warn!("Could not send '{}' to the view: {}", message.id(), err);
        }
    }

    fn send_parameter_to_view(&self, slot: usize) {
        self.changed_for_ui[slot].store(false, Ordering::Release);
        self.send_to_view(&Message::parameter_set(
            RouteTarget::View,
            self.param_ids.id_for_cache_slot(slot),
            self.cached_value(slot) as f64,
        ));
    }

    /// Handle a message meant for the controller. These all come from the view.
    pub fn handle_controller_message(&self, message: &Message) -> Vst3Result<()> {
        let message_id = message.message_id();
        match message_id {
            Some(MessageId::Init) => {
                self.set_ui_connected(true);
                self.send_everything_to_view();
                return Ok(());
            }
            Some(MessageId::Close) => {
                self.set_ui_connected(false);
                return Ok(());
            }
            _ if !self.is_ui_connected() => {
                adapter_warn!("Received '{}' before 'init'", message.id());
                return Err(Vst3Error::InternalError);
            }
            _ => (),
        }

        match message_id {
            Some(MessageId::Idle) => {
                for slot in 0..self.param_ids.cache_len() {
                    if self.changed_for_ui[slot].load(Ordering::Acquire) {
                        self.send_parameter_to_view(slot);
                    }
                }

                self.send_to_view(&Message::ready());
                Ok(())
            }
            Some(MessageId::ParameterEdit) => {
                let handler = self.component_handler().ok_or(Vst3Error::InternalError)?;
                let (id, started) = message.parameter_edit_args()?;
                self.plugin_parameter_index(id)?;

                if started {
                    handler.begin_edit(id)
                } else {
                    handler.end_edit(id)
                }
            }
            Some(MessageId::ParameterSet) => {
                let handler = self.component_handler().ok_or(Vst3Error::InternalError)?;
                let (id, plain) = message.parameter_set_args()?;
                let index = self.plugin_parameter_index(id)?;

                let normalized = self.parameters[index as usize]
                    .ranges
                    .normalized_value(plain);
                handler.perform_edit(id, normalized)
            }
            _ => {
                adapter_trace!("Unhandled controller message '{}'", message.id());
                Err(Vst3Error::NotImplemented)
            }
        }
    }

    /// Handle a message meant for the processing side. In separate controller mode these arrive
    /// through the component's connection point, otherwise they come straight from the view.
    pub fn handle_processor_message(&self, message: &Message) -> Vst3Result<()> {
        match message.message_id() {
            Some(MessageId::Midi) if self.config.wants_midi_input => {
                let data: [u8; 3] = message.midi_data()?.try_into().map_err(|_| {
                    adapter_warn!("MIDI messages from the editor must be three bytes long");
                    Vst3Error::InternalError
                })?;

                self.ui_notes.push(data).map_err(|_| Vst3Error::OutOfMemory)
            }
            Some(MessageId::StateSet) => {
                let (key, value) = message.state_set_args()?;
                self.set_state_value(&key, &value);

                Ok(())
            }
            _ => {
                adapter_trace!("Unhandled processor message '{}'", message.id());
                Err(Vst3Error::NotImplemented)
            }
        }
    }

    fn plugin_parameter_index(&self, id: u32) -> Vst3Result<u32> {
        match self.param_ids.from_protocol_id(id) {
            ParameterKind::Plugin(index) => Ok(index),
            _ => {
                adapter_warn!("The editor used parameter ID {}, which is not a plugin parameter", id);
                Err(Vst3Error::InternalError)
            }
        }
    }

    /// Send the complete state to a view that just sent `init`, followed by `ready`.
    fn send_everything_to_view(&self) {
        if self.config.separate_controller {
            if let Some(slot) = self.internal_slot(InternalParameter::SampleRate) {
                self.send_parameter_to_view(slot);
            }
        }
        if let Some(slot) = self.internal_slot(InternalParameter::Program) {
            self.send_parameter_to_view(slot);
        }

        let states = {
            let plugin = self.plugin.lock();
            let mut states = self.states.lock();
            for (key, value) in states.iter_mut() {
                if let Some(current) = plugin.state(key) {
                    *value = current;
                }
            }

            states.clone()
        };
        for (key, value) in &states {
            self.send_to_view(&Message::state_set(RouteTarget::View, key, value));
        }

        for index in 0..self.param_ids.plugin_parameter_count() {
            self.send_parameter_to_view(self.param_ids.plugin_cache_slot(index));
        }

        self.send_to_view(&Message::ready());
    }
}

/// Format a float the way the host sees parameter values.
fn format_float(value: f64) -> String {
    format!("{value:.2}")
}

fn normalize_program(program: f64, count_minus_one: f64) -> f64 {
    if count_minus_one > 0.0 {
        (program / count_minus_one).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn add_output_point(changes: &mut ParameterChanges, id: u32, normalized: f64, offset: i32) {
    let queue = changes.add_parameter_data(id);
    queue.add_point(0, normalized);
    if offset != 0 {
        queue.add_point(offset, normalized);
    }
}

fn silence_outputs(outputs: &mut [AudioBusBuffers]) {
    for bus in outputs {
        for channel in &mut bus.channels {
            channel.fill(0.0);
        }

        let num_channels = bus.channels.len() as u32;
        bus.silence_flags = if num_channels >= 64 {
            u64::MAX
        } else {
            (1 << num_channels) - 1
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffers;
    use crate::context::process::ProcessContext;
    use crate::midi::MidiMessage;
    use crate::param::{ParameterEnumerationValue, ParameterEnumerationValues, ParameterRanges};
    use crate::plugin::AudioPort;
    use crate::wrapper::util::u16str_to_string;
    use crate::wrapper::vst3::process_data::AudioBusBuffers;
    use crate::wrapper::vst3::subcategories::Vst3SubCategory;
    use approx::assert_relative_eq;

    #[derive(Default)]
    struct Gain {
        gain: f32,
        mode: f32,
        meter: f32,
        programs_loaded: Vec<u32>,
        received: Vec<MidiEvent>,
    }

    impl Plugin for Gain {
        const NAME: &'static str = "Gain";
        const VENDOR: &'static str = "Tests";
        const URL: &'static str = "https://example.com";
        const EMAIL: &'static str = "tests@example.com";
        const VERSION: &'static str = "0.1.0";
        const CLASS_ID: [u8; 16] = *b"GainGainGainGain";
        const SUBCATEGORIES: &'static [Vst3SubCategory] = &[Vst3SubCategory::Fx];

        const AUDIO_INPUTS: &'static [AudioPort] =
            &[AudioPort::new("In L", "in_l"), AudioPort::new("In R", "in_r")];
        const AUDIO_OUTPUTS: &'static [AudioPort] =
            &[AudioPort::new("Out L", "out_l"), AudioPort::new("Out R", "out_r")];
        const WANTS_MIDI_INPUT: bool = true;
        const WANTS_LATENCY: bool = true;

        fn parameters(&self) -> Vec<ParameterInfo> {
            vec![
                ParameterInfo::new("Gain", "gain", ParameterRanges::new(1.0, 0.0, 2.0))
                    .with_hints(ParameterHints::AUTOMATABLE),
                ParameterInfo::new("Mode", "mode", ParameterRanges::new(0.0, 0.0, 2.0))
                    .with_hints(ParameterHints::AUTOMATABLE | ParameterHints::INTEGER)
                    .with_enum_values(ParameterEnumerationValues {
                        restricted: true,
                        values: vec![
                            ParameterEnumerationValue::new(0.0, "Clean"),
                            ParameterEnumerationValue::new(1.0, "Warm"),
                            ParameterEnumerationValue::new(2.0, "Hot"),
                        ],
                    }),
                ParameterInfo::new("Meter", "meter", ParameterRanges::new(0.0, 0.0, 1.0))
                    .with_hints(ParameterHints::OUTPUT),
            ]
        }

        fn parameter_value(&self, index: u32) -> f32 {
            match index {
                0 => self.gain,
                1 => self.mode,
                _ => self.meter,
            }
        }

        fn set_parameter_value(&mut self, index: u32, value: f32) {
            match index {
                0 => self.gain = value,
                1 => self.mode = value,
                _ => self.meter = value,
            }
        }

        fn program_names(&self) -> Vec<String> {
            vec![String::from("Default"), String::from("Loud")]
        }

        fn load_program(&mut self, index: u32) {
            self.programs_loaded.push(index);
            self.gain = if index == 1 { 2.0 } else { 1.0 };
        }

        fn state_keys(&self) -> Vec<StateKey> {
            vec![StateKey::new("label", "untitled")]
        }

        fn run(
            &mut self,
            buffers: &mut AudioBuffers,
            events: &[MidiEvent],
            _context: &mut dyn ProcessContext,
        ) {
            self.received.clear();
            self.received.extend_from_slice(events);

            for port in 0..2 {
                let (input, output) = buffers.input_output(port, port);
                for (out, sample) in output.iter_mut().zip(input) {
                    *out = sample * self.gain;
                }
            }
            self.meter = 0.5;
        }
    }

    fn make_inner() -> Arc<WrapperInner<Gain>> {
        match WrapperInner::<Gain>::new(Arc::new(Link::new()), Arc::new(Link::new())) {
            Ok(inner) => inner,
            Err(err) => panic!("Could not create the adapter: {err}"),
        }
    }

    #[test]
    fn parameter_layout() {
        let inner = make_inner();

        // Latency and program are internal, followed by the MIDI controllers
        assert_eq!(inner.param_ids.base_count(), 2);
        assert_eq!(inner.parameter_count(), 2 + 16 * 130 + 3);

        let cc_info = inner
            .parameter_info(inner.param_ids.midi_cc_id(1, 7).unwrap() as i32)
            .unwrap();
        assert_eq!(u16str_to_string(&cc_info.title), "MIDI Ch. 2 CC 7");
        assert_eq!(cc_info.step_count, 127);

        let mode_info = inner
            .parameter_info(inner.param_ids.to_protocol_id(1).unwrap() as i32)
            .unwrap();
        assert!(mode_info.flags.contains(ParamFlags::IS_LIST));
        assert_eq!(mode_info.step_count, 2);

        let meter_info = inner
            .parameter_info(inner.param_ids.to_protocol_id(2).unwrap() as i32)
            .unwrap();
        assert!(meter_info.flags.contains(ParamFlags::IS_READ_ONLY));

        assert_eq!(
            inner.parameter_info(inner.parameter_count()),
            Err(Vst3Error::InvalidArgument)
        );
    }

    #[test]
    fn string_conversions() {
        let inner = make_inner();
        let gain_id = inner.param_ids.to_protocol_id(0).unwrap();
        let mode_id = inner.param_ids.to_protocol_id(1).unwrap();
        let program_id = inner
            .param_ids
            .internal_id(InternalParameter::Program)
            .unwrap();

        assert_eq!(
            inner.parameter_string_for_value(gain_id, 0.25).unwrap(),
            "0.50"
        );
        assert_eq!(
            inner.parameter_string_for_value(mode_id, 0.5).unwrap(),
            "Warm"
        );
        assert_eq!(
            inner.parameter_string_for_value(program_id, 1.0).unwrap(),
            "Loud"
        );
        assert_eq!(
            inner.parameter_string_for_value(gain_id, 1.5),
            Err(Vst3Error::InvalidArgument)
        );

        assert_relative_eq!(inner.parameter_value_for_string(mode_id, "Hot").unwrap(), 1.0);
        assert_relative_eq!(inner.parameter_value_for_string(gain_id, "1.5").unwrap(), 0.75);
        assert_relative_eq!(
            inner.parameter_value_for_string(program_id, "Loud").unwrap(),
            1.0
        );
        assert_eq!(
            inner.parameter_value_for_string(program_id, "Quiet"),
            Err(Vst3Error::InvalidArgument)
        );
        let cc_id = inner.param_ids.midi_cc_id(0, 1).unwrap();
        assert_eq!(
            inner.parameter_value_for_string(cc_id, "64"),
            Err(Vst3Error::NotImplemented)
        );
    }

    #[test]
    fn set_parameter_normalized_rules() {
        let inner = make_inner();
        let gain_id = inner.param_ids.to_protocol_id(0).unwrap();
        let cc_id = inner.param_ids.midi_cc_id(3, 10).unwrap();

        assert_eq!(
            inner.set_parameter_normalized(gain_id, 1.5),
            Err(Vst3Error::InvalidArgument)
        );
        assert_eq!(
            inner.set_parameter_normalized(cc_id, 0.5),
            Err(Vst3Error::InvalidArgument)
        );
        assert_eq!(inner.parameter_normalized(cc_id), 0.0);

        assert_relative_eq!(inner.parameter_normalized(gain_id), 0.5);
        inner.set_parameter_normalized(gain_id, 0.75).unwrap();
        assert_relative_eq!(inner.parameter_normalized(gain_id), 0.75);
        // Combined mode leaves the plugin alone until the value arrives through automation
        assert_eq!(inner.plugin.lock().gain, 0.0);
    }

    #[test]
    fn program_change_refreshes_cache() {
        let inner = make_inner();
        let program_id = inner
            .param_ids
            .internal_id(InternalParameter::Program)
            .unwrap();
        let gain_id = inner.param_ids.to_protocol_id(0).unwrap();

        inner.set_parameter_normalized(program_id, 1.0).unwrap();
        assert_eq!(inner.current_program(), 1);
        assert_eq!(inner.plugin.lock().programs_loaded, vec![1]);
        assert_relative_eq!(inner.parameter_normalized(gain_id), 1.0);
    }

    #[test]
    fn state_round_trip() {
        let source = make_inner();
        {
            let mut plugin = source.plugin.lock();
            plugin.gain = 1.25;
            plugin.mode = 2.0;
        }
        source
            .handle_processor_message(&Message::state_set(RouteTarget::Processor, "label", "drums"))
            .unwrap();

        let mut blob = Vec::new();
        source.get_state(&mut blob).unwrap();

        let target = make_inner();
        target.set_state(&mut blob.as_slice()).unwrap();
        {
            let plugin = target.plugin.lock();
            assert_eq!(plugin.gain, 1.25);
            assert_eq!(plugin.mode, 2.0);
        }
        assert_eq!(target.states.lock().get("label").map(String::as_str), Some("drums"));

        let mut second_blob = Vec::new();
        target.get_state(&mut second_blob).unwrap();
        assert_eq!(blob, second_blob);
    }

    #[test]
    fn processing_applies_automation_and_reports_outputs() {
        let inner = make_inner();
        inner
            .setup_processing(&ProcessSetup {
                process_mode: crate::wrapper::vst3::protocol::ProcessMode::Realtime,
                symbolic_sample_size: SymbolicSampleSize::Sample32,
                max_samples_per_block: 64,
                sample_rate: 48000.0,
            })
            .unwrap();

        let gain_id = inner.param_ids.to_protocol_id(0).unwrap();
        let meter_id = inner.param_ids.to_protocol_id(2).unwrap();
        let cc_id = inner.param_ids.midi_cc_id(2, 7).unwrap();

        let mut data = ProcessData::new(16);
        data.inputs = vec![AudioBusBuffers {
            silence_flags: 0,
            channels: vec![vec![1.0; 16], vec![0.5; 16]],
        }];
        data.outputs = vec![AudioBusBuffers::new(2, 16)];
        let mut changes = ParameterChanges::new();
        changes.add_parameter_data(gain_id).add_point(0, 0.25);
        changes.add_parameter_data(cc_id).add_point(10, 1.0);
        data.input_parameter_changes = Some(changes);
        data.output_parameter_changes = Some(ParameterChanges::new());

        inner.process(&mut data).unwrap();

        assert_eq!(data.outputs[0].channels[0], vec![0.5; 16]);
        assert_eq!(data.outputs[0].channels[1], vec![0.25; 16]);

        let received = inner.plugin.lock().received.clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].frame, 10);
        assert_eq!(
            received[0].message(),
            MidiMessage::ControlChange {
                channel: 2,
                cc: 7,
                value: 127
            }
        );

        // The meter moved from 0 to 0.5 during the block
        let output_changes = data.output_parameter_changes.as_ref().unwrap();
        let meter_queue = output_changes.find(meter_id).unwrap();
        assert_eq!(meter_queue.points, vec![(0, 0.5), (15, 0.5)]);
        assert!(output_changes.find(gain_id).is_none());
    }

    #[test]
    fn oversized_blocks_silence_the_tail() {
        let inner = make_inner();
        inner
            .setup_processing(&ProcessSetup {
                process_mode: crate::wrapper::vst3::protocol::ProcessMode::Realtime,
                symbolic_sample_size: SymbolicSampleSize::Sample32,
                max_samples_per_block: 64,
                sample_rate: 48000.0,
            })
            .unwrap();

        let mut data = ProcessData::new(96);
        data.inputs = vec![AudioBusBuffers {
            silence_flags: 0,
            channels: vec![vec![1.0; 96], vec![1.0; 96]],
        }];
        data.outputs = vec![AudioBusBuffers {
            silence_flags: 0,
            channels: vec![vec![9.0; 96], vec![9.0; 96]],
        }];

        inner.process(&mut data).unwrap();

        for channel in &data.outputs[0].channels {
            assert!(channel[..64].iter().all(|&sample| sample != 9.0));
            assert!(channel[64..].iter().all(|&sample| sample == 0.0));
        }
    }

    #[test]
    fn ui_notes_come_first() {
        let inner = make_inner();
        inner
            .handle_processor_message(&Message::midi([0x90, 60, 100]))
            .unwrap();

        let mut data = ProcessData::new(8);
        let mut events = crate::wrapper::vst3::process_data::EventList::new();
        events.add_event(crate::wrapper::vst3::process_data::Event {
            bus_index: 0,
            sample_offset: 0,
            kind: crate::wrapper::vst3::process_data::EventKind::NoteOff {
                channel: 0,
                pitch: 62,
                velocity: 0.0,
                note_id: -1,
            },
        });
        data.input_events = Some(events);
        inner.process(&mut data).unwrap();

        let received = inner.plugin.lock().received.clone();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].bytes(), &[0x90, 60, 100]);
        assert_eq!(received[1].bytes(), &[0x80, 62, 0]);
    }

    #[test]
    fn rejected_processor_messages() {
        let inner = make_inner();

        let mut short_midi = Message::midi([0x90, 60, 100]);
        short_midi.attributes_mut().set_binary("data", &[0x90, 60]);
        assert_eq!(
            inner.handle_processor_message(&short_midi),
            Err(Vst3Error::InternalError)
        );
        assert_eq!(
            inner.handle_processor_message(&Message::idle()),
            Err(Vst3Error::NotImplemented)
        );
    }

    #[test]
    fn controller_messages_need_init() {
        let inner = make_inner();
        let gain_id = inner.param_ids.to_protocol_id(0).unwrap();

        assert_eq!(
            inner.handle_controller_message(&Message::parameter_set(
                RouteTarget::Controller,
                gain_id,
                1.0
            )),
            Err(Vst3Error::InternalError)
        );
        assert_eq!(inner.handle_controller_message(&Message::close()), Ok(()));
    }
}
