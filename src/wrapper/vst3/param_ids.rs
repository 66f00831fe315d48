//! The mapping between the plugin's plain parameter indices and the protocol's flat parameter ID
//! space. The protocol IDs are laid out as:
//!
//! 1. Internal parameters. The buffer size and sample rate only exist in separate controller mode,
//!    the latency only exists if the plugin reports one, and the program parameter only exists if
//!    the plugin has programs. These are contiguous starting at 0.
//! 2. If the plugin accepts MIDI, 16 channels worth of 130 MIDI controller pseudo-parameters.
//! 3. The plugin's own parameters.
//!
//! Cached values are stored for the internal parameters and the plugin's parameters, but not for
//! the MIDI controllers. See [`ParameterIdSpace::cache_slot()`].

use crate::midi::MIDI_CONTROLLERS_PER_CHANNEL;
use crate::plugin::Plugin;

/// The number of MIDI channels that get controller pseudo-parameters.
pub const MIDI_CHANNELS: u32 = 16;
/// The number of MIDI controller pseudo-parameters when MIDI input is enabled.
pub const MIDI_CC_PARAMETER_COUNT: u32 = MIDI_CHANNELS * MIDI_CONTROLLERS_PER_CHANNEL;

/// Static configuration for a single adapter instance. Built once from the plugin's constants and
/// its parameter and program counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterConfig {
    pub separate_controller: bool,
    pub wants_latency: bool,
    pub wants_midi_input: bool,
    pub wants_midi_output: bool,
    pub wants_transport: bool,
    pub has_ui: bool,
    pub program_count: u32,
    pub parameter_count: u32,
}

impl AdapterConfig {
    pub fn for_plugin<P: Plugin>(parameter_count: u32, program_count: u32) -> Self {
        Self {
            separate_controller: P::SEPARATE_CONTROLLER,
            wants_latency: P::WANTS_LATENCY,
            wants_midi_input: P::WANTS_MIDI_INPUT,
            wants_midi_output: P::WANTS_MIDI_OUTPUT,
            wants_transport: P::WANTS_TRANSPORT,
            has_ui: P::HAS_UI,
            program_count,
            parameter_count,
        }
    }

    pub fn wants_programs(&self) -> bool {
        self.program_count > 0
    }
}

/// A hidden parameter owned by the adapter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalParameter {
    BufferSize,
    SampleRate,
    Latency,
    Program,
}

/// What a protocol parameter ID refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Internal(InternalParameter),
    /// A MIDI controller pseudo-parameter. `controller` 128 is channel pressure and 129 is pitch
    /// bend.
    MidiCc { channel: u8, controller: u8 },
    /// One of the plugin's parameters, by plain index.
    Plugin(u32),
    /// The ID is not part of the parameter space.
    Invalid,
}

/// The protocol's parameter ID space for a single adapter instance. See the module docs for the
/// layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterIdSpace {
    buffer_size: Option<u32>,
    sample_rate: Option<u32>,
    latency: Option<u32>,
    program: Option<u32>,
    /// The number of internal parameters. This is also the first MIDI controller ID.
    base_count: u32,
    /// Either 0 or [`MIDI_CC_PARAMETER_COUNT`].
    midi_cc_count: u32,
    plugin_parameter_count: u32,
}

impl ParameterIdSpace {
    pub fn new(config: &AdapterConfig) -> Self {
        let mut next_id = 0;
        let mut allocate = |enabled: bool| {
            if enabled {
                next_id += 1;
                Some(next_id - 1)
            } else {
                None
            }
        };

        let buffer_size = allocate(config.separate_controller);
        let sample_rate = allocate(config.separate_controller);
        let latency = allocate(config.wants_latency);
        let program = allocate(config.wants_programs());

        Self {
            buffer_size,
            sample_rate,
            latency,
            program,
            base_count: next_id,
            midi_cc_count: if config.wants_midi_input {
                MIDI_CC_PARAMETER_COUNT
            } else {
                0
            },
            plugin_parameter_count: config.parameter_count,
        }
    }

    /// The protocol ID for an internal parameter, if it exists in this configuration.
    pub fn internal_id(&self, parameter: InternalParameter) -> Option<u32> {
        match parameter {
            InternalParameter::BufferSize => self.buffer_size,
            InternalParameter::SampleRate => self.sample_rate,
            InternalParameter::Latency => self.latency,
            InternalParameter::Program => self.program,
        }
    }

    /// The internal parameters that exist in this configuration, in ID order.
    pub fn internal_parameters(&self) -> impl Iterator<Item = (InternalParameter, u32)> + '_ {
        [
            InternalParameter::BufferSize,
            InternalParameter::SampleRate,
            InternalParameter::Latency,
            InternalParameter::Program,
        ]
        .into_iter()
        .filter_map(|parameter| Some((parameter, self.internal_id(parameter)?)))
    }

    /// The number of internal parameters.
    pub fn base_count(&self) -> u32 {
        self.base_count
    }

    /// The first protocol ID used for the plugin's own parameters.
    pub fn internal_count(&self) -> u32 {
        self.base_count + self.midi_cc_count
    }

    pub fn plugin_parameter_count(&self) -> u32 {
        self.plugin_parameter_count
    }

    /// The total number of parameters reported to the host.
    pub fn protocol_parameter_count(&self) -> u32 {
        self.internal_count() + self.plugin_parameter_count
    }

    /// The protocol ID for the plugin parameter at `index`, or `None` if the index is out of range.
    pub fn to_protocol_id(&self, index: u32) -> Option<u32> {
        if index < self.plugin_parameter_count {
            Some(self.internal_count() + index)
        } else {
            None
        }
    }

    /// Decode a protocol ID. IDs past the end of the space resolve to [`ParameterKind::Invalid`].
    pub fn from_protocol_id(&self, id: u32) -> ParameterKind {
        if id < self.base_count {
            let internal = self
                .internal_parameters()
                .find(|(_, internal_id)| *internal_id == id);

            match internal {
                Some((parameter, _)) => ParameterKind::Internal(parameter),
                None => ParameterKind::Invalid,
            }
        } else if id < self.internal_count() {
            let offset = id - self.base_count;
            ParameterKind::MidiCc {
                channel: (offset / MIDI_CONTROLLERS_PER_CHANNEL) as u8,
                controller: (offset % MIDI_CONTROLLERS_PER_CHANNEL) as u8,
            }
        } else if id < self.protocol_parameter_count() {
            ParameterKind::Plugin(id - self.internal_count())
        } else {
            ParameterKind::Invalid
        }
    }

    /// The protocol ID for a MIDI controller pseudo-parameter. Returns `None` if MIDI input is
    /// disabled or if the channel or controller is out of range.
    pub fn midi_cc_id(&self, channel: u8, controller: u8) -> Option<u32> {
        if self.midi_cc_count == 0
            || channel as u32 >= MIDI_CHANNELS
            || controller as u32 >= MIDI_CONTROLLERS_PER_CHANNEL
        {
            return None;
        }

        Some(self.base_count + channel as u32 * MIDI_CONTROLLERS_PER_CHANNEL + controller as u32)
    }

    /// The number of cached value slots: one per internal parameter and one per plugin parameter.
    pub fn cache_len(&self) -> usize {
        (self.base_count + self.plugin_parameter_count) as usize
    }

    /// The cache slot for a plugin parameter. The index must be in range.
    pub fn plugin_cache_slot(&self, index: u32) -> usize {
        (self.base_count + index) as usize
    }

    /// The cache slot for a protocol ID, if the ID has one. MIDI controllers don't.
    pub fn cache_slot(&self, id: u32) -> Option<usize> {
        match self.from_protocol_id(id) {
            ParameterKind::Internal(_) => Some(id as usize),
            ParameterKind::Plugin(index) => Some(self.plugin_cache_slot(index)),
            ParameterKind::MidiCc { .. } | ParameterKind::Invalid => None,
        }
    }

    /// The protocol ID for a cache slot. This is the inverse of [`cache_slot()`][Self::cache_slot()].
    pub fn id_for_cache_slot(&self, slot: usize) -> u32 {
        let slot = slot as u32;
        if slot < self.base_count {
            slot
        } else {
            self.internal_count() + (slot - self.base_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(separate: bool, midi: bool) -> AdapterConfig {
        AdapterConfig {
            separate_controller: separate,
            wants_latency: true,
            wants_midi_input: midi,
            wants_midi_output: false,
            wants_transport: false,
            has_ui: false,
            program_count: 3,
            parameter_count: 10,
        }
    }

    #[test]
    fn internal_layout_combined() {
        let ids = ParameterIdSpace::new(&make_config(false, false));

        assert_eq!(ids.internal_id(InternalParameter::BufferSize), None);
        assert_eq!(ids.internal_id(InternalParameter::Latency), Some(0));
        assert_eq!(ids.internal_id(InternalParameter::Program), Some(1));
        assert_eq!(ids.base_count(), 2);
        assert_eq!(ids.to_protocol_id(0), Some(2));
        assert_eq!(ids.protocol_parameter_count(), 12);
    }

    #[test]
    fn internal_layout_separate_with_midi() {
        let ids = ParameterIdSpace::new(&make_config(true, true));

        assert_eq!(ids.internal_id(InternalParameter::BufferSize), Some(0));
        assert_eq!(ids.internal_id(InternalParameter::SampleRate), Some(1));
        assert_eq!(ids.internal_id(InternalParameter::Latency), Some(2));
        assert_eq!(ids.internal_id(InternalParameter::Program), Some(3));
        assert_eq!(ids.internal_count(), 4 + 2080);
        assert_eq!(ids.to_protocol_id(0), Some(2084));
        assert_eq!(ids.protocol_parameter_count(), 2094);
    }

    #[test]
    fn plugin_index_round_trip() {
        for config in [make_config(false, false), make_config(true, true)] {
            let ids = ParameterIdSpace::new(&config);
            for index in 0..config.parameter_count {
                let id = ids.to_protocol_id(index).unwrap();
                assert_eq!(ids.from_protocol_id(id), ParameterKind::Plugin(index));
            }

            assert_eq!(ids.to_protocol_id(config.parameter_count), None);
        }
    }

    #[test]
    fn midi_cc_round_trip() {
        let ids = ParameterIdSpace::new(&make_config(true, true));
        for channel in 0..16u8 {
            for controller in 0..130u8 {
                let id = ids.midi_cc_id(channel, controller).unwrap();
                assert_eq!(
                    ids.from_protocol_id(id),
                    ParameterKind::MidiCc {
                        channel,
                        controller
                    }
                );
            }
        }

        assert_eq!(ids.midi_cc_id(16, 0), None);
        assert_eq!(ids.midi_cc_id(0, 130), None);
    }

    #[test]
    fn midi_cc_requires_midi_input() {
        let ids = ParameterIdSpace::new(&make_config(false, false));

        assert_eq!(ids.midi_cc_id(2, 7), None);
    }

    #[test]
    fn out_of_range_is_invalid() {
        let ids = ParameterIdSpace::new(&make_config(false, true));

        assert_eq!(
            ids.from_protocol_id(ids.protocol_parameter_count()),
            ParameterKind::Invalid
        );
        assert_eq!(ids.from_protocol_id(u32::MAX), ParameterKind::Invalid);
    }

    #[test]
    fn cache_slots() {
        let ids = ParameterIdSpace::new(&make_config(true, true));

        assert_eq!(ids.cache_len(), 14);
        assert_eq!(ids.cache_slot(2), Some(2));
        assert_eq!(ids.cache_slot(ids.midi_cc_id(0, 0).unwrap()), None);
        assert_eq!(ids.cache_slot(ids.to_protocol_id(3).unwrap()), Some(7));
        for slot in 0..ids.cache_len() {
            assert_eq!(ids.cache_slot(ids.id_for_cache_slot(slot)), Some(slot));
        }
    }
}
