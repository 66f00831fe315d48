//! The plugin trait, and the static metadata that comes with it.

use bitflags::bitflags;

use crate::buffer::AudioBuffers;
use crate::context::process::ProcessContext;
use crate::editor::Editor;
use crate::midi::MidiEvent;
use crate::param::ParameterInfo;
use crate::wrapper::vst3::subcategories::Vst3SubCategory;

/// A plugin as the adapter sees it. The processing object creates one instance with [`Default`].
/// In separate controller mode the controller object creates a second one, which only ever sees
/// parameter and state changes.
///
/// Parameters are addressed by plain 0-based indices into the vector returned by
/// [`parameters()`][Self::parameters()], and all values passed in either direction are plain,
/// unnormalized values. SysEx, 64-bit samples and note expressions cannot be expressed through
/// this trait.
pub trait Plugin: Default + Send + 'static {
    const NAME: &'static str;
    const VENDOR: &'static str;
    const URL: &'static str;
    const EMAIL: &'static str;

    /// Semver compatible version string (e.g. `0.0.1`). Hosts likely won't do anything with this,
    /// but just in case they do this should only contain decimals values and dots.
    const VERSION: &'static str;

    /// The unique class ID that identifies this particular plugin. You can use the
    /// `*b"fooofooofooofooo"` syntax for this.
    const CLASS_ID: [u8; 16];
    /// The class ID for the controller when
    /// [`SEPARATE_CONTROLLER`][Self::SEPARATE_CONTROLLER] is set. Defaults to the bitwise
    /// complement of [`CLASS_ID`][Self::CLASS_ID].
    const CONTROLLER_CLASS_ID: [u8; 16] = complement_class_id(Self::CLASS_ID);
    /// One or more subcategories. The host may use these to categorize the plugin. Internally this
    /// slice will be converted to a string where each subcategory is separated by a pipe character
    /// (`|`).
    const SUBCATEGORIES: &'static [Vst3SubCategory];

    /// The plugin's audio input ports. Every port is a single channel. Ports are grouped into
    /// buses when the adapter is created.
    const AUDIO_INPUTS: &'static [AudioPort] = &[];
    /// The plugin's audio output ports.
    const AUDIO_OUTPUTS: &'static [AudioPort] = &[];

    /// Whether the plugin receives MIDI. This also exposes 130 MIDI controller pseudo-parameters
    /// per channel to the host.
    const WANTS_MIDI_INPUT: bool = false;
    /// Whether the plugin can send MIDI through
    /// [`ProcessContext::send_midi_event()`][crate::context::process::ProcessContext::send_midi_event()].
    const WANTS_MIDI_OUTPUT: bool = false;
    /// Whether the plugin reports a latency through [`latency()`][Self::latency()].
    const WANTS_LATENCY: bool = false;
    /// Whether the plugin needs transport information during processing.
    const WANTS_TRANSPORT: bool = false;
    /// Whether the processing and controller objects should be separate instances. In this mode
    /// they can only talk to each other through the connection points set up by the host.
    const SEPARATE_CONTROLLER: bool = false;
    /// Whether [`editor()`][Self::editor()] returns an editor.
    const HAS_UI: bool = false;

    /// Describe the plugin's parameters. This is called once per adapter instance, and the result
    /// must not change afterwards.
    fn parameters(&self) -> Vec<ParameterInfo> {
        Vec::new()
    }

    /// Get a parameter's current plain value.
    fn parameter_value(&self, _index: u32) -> f32 {
        0.0
    }

    /// Set a parameter's plain value. The value has already been snapped to the parameter's
    /// hints.
    fn set_parameter_value(&mut self, _index: u32, _value: f32) {}

    /// The keys of the plugin's persisted key/value state, along with their default values.
    fn state_keys(&self) -> Vec<StateKey> {
        Vec::new()
    }

    /// Get the current value for a state key. Plugins that keep their own copy of the state should
    /// return it here. Returning `None` makes the adapter use the last value it set.
    fn state(&self, _key: &str) -> Option<String> {
        None
    }

    /// Set a state value.
    fn set_state(&mut self, _key: &str, _value: &str) {}

    /// The names of the plugin's factory programs. Programs are exposed to the host through a
    /// hidden program-change parameter if there are any.
    fn program_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Load a program. Parameter values are read back after this call.
    fn load_program(&mut self, _index: u32) {}

    /// The plugin's latency in samples. Only used when [`WANTS_LATENCY`][Self::WANTS_LATENCY] is
    /// set.
    fn latency(&self) -> u32 {
        0
    }

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn set_buffer_size(&mut self, _buffer_size: u32) {}

    /// Called before processing starts. Any allocations should happen here.
    fn activate(&mut self) {}

    /// Called when processing stops.
    fn deactivate(&mut self) {}

    /// Process a block of audio. `events` are sorted by their frame. This function runs on the
    /// render context, so it must not allocate or block.
    fn run(
        &mut self,
        buffers: &mut AudioBuffers,
        events: &[MidiEvent],
        context: &mut dyn ProcessContext,
    );

    /// Create an editor for this plugin. Only called when [`HAS_UI`][Self::HAS_UI] is set. The
    /// editor does not get access to the plugin instance; parameter and state changes are
    /// delivered to it through the [`Editor`] callbacks instead.
    fn editor(&self) -> Option<Box<dyn Editor>> {
        None
    }
}

/// A persisted state key, and the value it starts out with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKey {
    pub key: String,
    pub default: String,
}

impl StateKey {
    pub fn new(key: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            default: default.into(),
        }
    }
}

bitflags! {
    /// Flags for a single audio port.
    #[derive(Default)]
    pub struct AudioPortHints: u32 {
        /// The port is a sidechain input. All sidechain ports are grouped in a single auxiliary
        /// bus.
        const SIDECHAIN = 1 << 0;
        /// The port carries control voltage rather than audio. Every CV port gets its own bus.
        const CV = 1 << 1;
    }
}

/// A named group of audio ports. Ports sharing the same group ID are exposed as a single bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortGroup {
    pub id: u32,
    pub name: &'static str,
}

/// A single channel audio port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPort {
    pub name: &'static str,
    pub symbol: &'static str,
    pub hints: AudioPortHints,
    pub group: Option<PortGroup>,
}

impl AudioPort {
    pub const fn new(name: &'static str, symbol: &'static str) -> Self {
        Self {
            name,
            symbol,
            hints: AudioPortHints::empty(),
            group: None,
        }
    }

    pub const fn sidechain(mut self) -> Self {
        self.hints = AudioPortHints::SIDECHAIN;
        self
    }

    pub const fn cv(mut self) -> Self {
        self.hints = AudioPortHints::CV;
        self
    }

    pub const fn in_group(mut self, group: PortGroup) -> Self {
        self.group = Some(group);
        self
    }

    pub fn is_sidechain(&self) -> bool {
        self.hints.contains(AudioPortHints::SIDECHAIN)
    }

    pub fn is_cv(&self) -> bool {
        self.hints.contains(AudioPortHints::CV)
    }
}

const fn complement_class_id(mut uid: [u8; 16]) -> [u8; 16] {
    // No iterators in const functions
    let mut i = 0;
    while i < 16 {
        uid[i] = !uid[i];
        i += 1;
    }

    uid
}

/// A class ID in the correct order for the current platform so projects and presets can be shared
/// between platforms.
#[cfg(not(target_os = "windows"))]
pub(crate) const fn platform_class_id(uid: [u8; 16]) -> [u8; 16] {
    uid
}

/// A class ID in the correct order for the current platform so projects and presets can be shared
/// between platforms.
#[cfg(target_os = "windows")]
pub(crate) const fn platform_class_id(mut uid: [u8; 16]) -> [u8; 16] {
    // No mutable references in const functions, so we can't use `uid.swap()`
    let original_uid = uid;

    uid[0] = original_uid[3];
    uid[1] = original_uid[2];
    uid[2] = original_uid[1];
    uid[3] = original_uid[0];

    uid[4] = original_uid[5];
    uid[5] = original_uid[4];
    uid[6] = original_uid[7];
    uid[7] = original_uid[6];

    uid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_id_differs() {
        let id = *b"AdapterTestPlugn";
        let controller_id = complement_class_id(id);

        assert_ne!(id, controller_id);
        assert_eq!(complement_class_id(controller_id), id);
    }

    #[test]
    fn port_builders() {
        const GROUP: PortGroup = PortGroup {
            id: 1,
            name: "Stereo",
        };
        const PORT: AudioPort = AudioPort::new("Left", "in_left").in_group(GROUP);
        const SIDECHAIN: AudioPort = AudioPort::new("Sidechain", "sc").sidechain();

        assert_eq!(PORT.group, Some(GROUP));
        assert!(!PORT.is_sidechain());
        assert!(SIDECHAIN.is_sidechain());
        assert!(!SIDECHAIN.is_cv());
    }
}
