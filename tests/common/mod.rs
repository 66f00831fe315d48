//! Plugins and host-side test doubles shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use vst3_adapter::prelude::*;
use vst3_adapter::wrapper::vst3::protocol::{ComponentHandler, RestartFlags};
use vst3_adapter::wrapper::vst3::{Capability, Module, ObjectHandle, Vst3Result};

thread_local! {
    /// The editor most recently created by [`Synth::editor()`] on this thread.
    static LAST_EDITOR: RefCell<Option<Arc<EditorState>>> = RefCell::new(None);
}

/// A synth with a separate controller and an editor. It echoes every MIDI event it receives back
/// to the host.
#[derive(Default)]
pub struct Synth {
    cutoff: f32,
    voices: f32,
    label: Option<String>,
}

impl Plugin for Synth {
    const NAME: &'static str = "Test Synth";
    const VENDOR: &'static str = "Adapter Tests";
    const URL: &'static str = "https://example.com/synth";
    const EMAIL: &'static str = "synth@example.com";
    const VERSION: &'static str = "1.0.0";
    const CLASS_ID: [u8; 16] = *b"TestSynthAdapter";
    const SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Instrument, Vst3SubCategory::Synth];

    const AUDIO_OUTPUTS: &'static [AudioPort] = &[
        AudioPort::new("Out L", "out_l"),
        AudioPort::new("Out R", "out_r"),
    ];
    const WANTS_MIDI_INPUT: bool = true;
    const WANTS_MIDI_OUTPUT: bool = true;
    const SEPARATE_CONTROLLER: bool = true;
    const HAS_UI: bool = true;

    fn parameters(&self) -> Vec<ParameterInfo> {
        vec![
            ParameterInfo::new("Cutoff", "cutoff", ParameterRanges::new(1000.0, 20.0, 20000.0))
                .with_unit("Hz")
                .with_hints(ParameterHints::AUTOMATABLE),
            ParameterInfo::new("Voices", "voices", ParameterRanges::new(8.0, 1.0, 16.0))
                .with_hints(ParameterHints::AUTOMATABLE | ParameterHints::INTEGER),
        ]
    }

    fn parameter_value(&self, index: u32) -> f32 {
        match index {
            0 => self.cutoff,
            _ => self.voices,
        }
    }

    fn set_parameter_value(&mut self, index: u32, value: f32) {
        match index {
            0 => self.cutoff = value,
            _ => self.voices = value,
        }
    }

    fn state_keys(&self) -> Vec<StateKey> {
        vec![StateKey::new("label", "untitled")]
    }

    fn state(&self, key: &str) -> Option<String> {
        match key {
            "label" => self.label.clone(),
            _ => None,
        }
    }

    fn set_state(&mut self, key: &str, value: &str) {
        if key == "label" {
            self.label = Some(value.to_owned());
        }
    }

    fn run(
        &mut self,
        _buffers: &mut AudioBuffers,
        events: &[MidiEvent],
        context: &mut dyn ProcessContext,
    ) {
        for event in events {
            context.send_midi_event(*event);
        }
    }

    fn editor(&self) -> Option<Box<dyn Editor>> {
        let state = Arc::new(EditorState::default());
        LAST_EDITOR.with(|last_editor| *last_editor.borrow_mut() = Some(state.clone()));

        Some(Box::new(RecordingEditor(state)))
    }
}

/// A stereo gain effect that uses a single object for processing and control.
#[derive(Default)]
pub struct Effect {
    gain: f32,
}

impl Plugin for Effect {
    const NAME: &'static str = "Test Effect";
    const VENDOR: &'static str = "Adapter Tests";
    const URL: &'static str = "https://example.com/effect";
    const EMAIL: &'static str = "effect@example.com";
    const VERSION: &'static str = "0.2.0";
    const CLASS_ID: [u8; 16] = *b"TestEffectAdapt!";
    const SUBCATEGORIES: &'static [Vst3SubCategory] = &[Vst3SubCategory::Fx];

    const AUDIO_INPUTS: &'static [AudioPort] =
        &[AudioPort::new("In L", "in_l"), AudioPort::new("In R", "in_r")];
    const AUDIO_OUTPUTS: &'static [AudioPort] = &[
        AudioPort::new("Out L", "out_l"),
        AudioPort::new("Out R", "out_r"),
    ];
    const WANTS_MIDI_INPUT: bool = true;

    fn parameters(&self) -> Vec<ParameterInfo> {
        vec![
            ParameterInfo::new("Gain", "gain", ParameterRanges::new(1.0, 0.0, 2.0))
                .with_hints(ParameterHints::AUTOMATABLE),
        ]
    }

    fn parameter_value(&self, _index: u32) -> f32 {
        self.gain
    }

    fn set_parameter_value(&mut self, _index: u32, value: f32) {
        self.gain = value;
    }

    fn run(
        &mut self,
        buffers: &mut AudioBuffers,
        _events: &[MidiEvent],
        _context: &mut dyn ProcessContext,
    ) {
        for port in 0..2 {
            let (input, output) = buffers.input_output(port, port);
            for (out, sample) in output.iter_mut().zip(input) {
                *out = sample * self.gain;
            }
        }
    }
}

/// Everything the editor was told by the adapter.
#[derive(Default)]
pub struct EditorState {
    pub context: Mutex<Option<Arc<dyn GuiContext>>>,
    pub parameters: Mutex<Vec<(u32, f32)>>,
    pub states: Mutex<Vec<(String, String)>>,
    pub sample_rates: Mutex<Vec<f64>>,
}

impl EditorState {
    pub fn context(&self) -> Arc<dyn GuiContext> {
        match self.context.lock().clone() {
            Some(context) => context,
            None => panic!("The editor has not been spawned"),
        }
    }
}

pub struct RecordingEditor(pub Arc<EditorState>);

impl Editor for RecordingEditor {
    fn spawn(
        &self,
        _parent: ParentWindowHandle,
        context: Arc<dyn GuiContext>,
    ) -> Box<dyn Any + Send> {
        *self.0.context.lock() = Some(context);
        Box::new(())
    }

    fn size(&self) -> (u32, u32) {
        (640, 360)
    }

    fn set_scale_factor(&self, _factor: f32) -> bool {
        false
    }

    fn parameter_changed(&self, index: u32, value: f32) {
        self.0.parameters.lock().push((index, value));
    }

    fn state_changed(&self, key: &str, value: &str) {
        self.0.states.lock().push((key.to_owned(), value.to_owned()));
    }

    fn sample_rate_changed(&self, sample_rate: f64) {
        self.0.sample_rates.lock().push(sample_rate);
    }
}

/// The editor created by the last `create_view()` call on this thread.
pub fn last_editor() -> Arc<EditorState> {
    match LAST_EDITOR.with(|last_editor| last_editor.borrow().clone()) {
        Some(state) => state,
        None => panic!("No editor has been created on this thread"),
    }
}

/// The host's side of the component handler.
#[derive(Default)]
pub struct RecordingHandler {
    pub edits: Mutex<Vec<String>>,
    pub restarts: Mutex<Vec<RestartFlags>>,
}

impl ComponentHandler for RecordingHandler {
    fn begin_edit(&self, id: u32) -> Vst3Result<()> {
        self.edits.lock().push(format!("begin {id}"));
        Ok(())
    }

    fn perform_edit(&self, id: u32, normalized: f64) -> Vst3Result<()> {
        self.edits.lock().push(format!("perform {id} {normalized:.3}"));
        Ok(())
    }

    fn end_edit(&self, id: u32) -> Vst3Result<()> {
        self.edits.lock().push(format!("end {id}"));
        Ok(())
    }

    fn restart_component(&self, flags: RestartFlags) -> Vst3Result<()> {
        self.restarts.lock().push(flags);
        Ok(())
    }
}

/// Create a component, and the controller for plugins with a separate controller, the way a host
/// would. Both are initialized and connected to each other.
pub fn create_instances<P: Plugin>(module: &Module<P>) -> (ObjectHandle, Option<ObjectHandle>) {
    use vst3_adapter::wrapper::vst3::{IComponent, IPluginBase};

    let class_infos = module.class_infos();
    let component = module
        .create_instance(&class_infos[0].class_id, Capability::Component)
        .unwrap();
    let component_wrapper = module.wrapper(component).unwrap();
    component_wrapper.initialize().unwrap();

    if !P::SEPARATE_CONTROLLER {
        return (component, None);
    }

    let controller_id = component_wrapper.controller_class_id().unwrap();
    let controller = module
        .create_instance(&controller_id, Capability::EditController)
        .unwrap();
    module.wrapper(controller).unwrap().initialize().unwrap();

    let component_point = module.connection_point(component).unwrap();
    let controller_point = module.connection_point(controller).unwrap();
    component_point.connect(controller_point.clone()).unwrap();
    controller_point.connect(component_point).unwrap();

    (component, Some(controller))
}
