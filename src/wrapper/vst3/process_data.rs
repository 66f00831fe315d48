//! The data passed to `IAudioProcessor::process()`. The host owns all of this; the adapter reads
//! the inputs and appends to the output queues and event list.

use bitflags::bitflags;

use super::protocol::{ProcessMode, SymbolicSampleSize};
use crate::util::permit_alloc;

/// Push to a host-owned vector. The host is expected to reserve enough room up front, but if it
/// didn't then growing the vector is its allocation rather than ours.
fn host_push<T>(vec: &mut Vec<T>, value: T) {
    if vec.len() < vec.capacity() {
        vec.push(value);
    } else {
        permit_alloc(|| vec.push(value));
    }
}

/// The buffers for a single audio bus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBusBuffers {
    /// One bit per channel, set if the channel only contains silence.
    pub silence_flags: u64,
    /// One buffer per channel of at least `num_samples` samples.
    pub channels: Vec<Vec<f32>>,
}

impl AudioBusBuffers {
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        Self {
            silence_flags: 0,
            channels: vec![vec![0.0; num_samples]; num_channels],
        }
    }
}

/// The automation points for a single parameter within one block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamValueQueue {
    pub id: u32,
    /// `(sample_offset, normalized_value)` pairs in ascending sample offset order.
    pub points: Vec<(i32, f64)>,
}

impl ParamValueQueue {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            points: Vec::new(),
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, index: usize) -> Option<(i32, f64)> {
        self.points.get(index).copied()
    }

    pub fn add_point(&mut self, sample_offset: i32, value: f64) {
        host_push(&mut self.points, (sample_offset, value));
    }
}

/// A set of parameter queues, used both for incoming automation and for outgoing parameter
/// changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterChanges {
    pub queues: Vec<ParamValueQueue>,
}

impl ParameterChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameter_count(&self) -> usize {
        self.queues.len()
    }

    pub fn parameter_data(&self, index: usize) -> Option<&ParamValueQueue> {
        self.queues.get(index)
    }

    /// Get the queue for `id`, adding a new one if it does not exist yet.
    pub fn add_parameter_data(&mut self, id: u32) -> &mut ParamValueQueue {
        let index = match self.queues.iter().position(|queue| queue.id == id) {
            Some(index) => index,
            None => {
                host_push(&mut self.queues, ParamValueQueue::new(id));
                self.queues.len() - 1
            }
        };

        &mut self.queues[index]
    }

    /// The queue for `id`, if there is one.
    pub fn find(&self, id: u32) -> Option<&ParamValueQueue> {
        self.queues.iter().find(|queue| queue.id == id)
    }
}

/// The payload of a host event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    NoteOn {
        channel: i16,
        pitch: i16,
        velocity: f32,
        note_id: i32,
    },
    NoteOff {
        channel: i16,
        pitch: i16,
        velocity: f32,
        note_id: i32,
    },
    PolyPressure {
        channel: i16,
        pitch: i16,
        pressure: f32,
        note_id: i32,
    },
    /// Sysex and other raw data. Accepted, but not converted.
    Data { bytes: Vec<u8> },
    /// MIDI output for messages that don't have a dedicated event type. `control_number` 128 is
    /// channel pressure and 129 is pitch bend, where `value` is the LSB and `value2` the MSB.
    LegacyMidiCcOut {
        channel: u8,
        control_number: u8,
        value: i8,
        value2: i8,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub bus_index: i32,
    pub sample_offset: i32,
    pub kind: EventKind,
}

/// A list of events, ordered by sample offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventList {
    pub events: Vec<Event>,
}

impl EventList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn event(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn add_event(&mut self, event: Event) {
        host_push(&mut self.events, event);
    }
}

bitflags! {
    /// Which fields in [`ProcessContextInfo`] are valid.
    #[derive(Default)]
    pub struct ProcessContextFlags: u32 {
        const PLAYING = 1 << 1;
        const CYCLE_ACTIVE = 1 << 2;
        const RECORDING = 1 << 3;
        const SYSTEM_TIME_VALID = 1 << 8;
        const PROJECT_TIME_MUSIC_VALID = 1 << 9;
        const TEMPO_VALID = 1 << 10;
        const BAR_POSITION_VALID = 1 << 11;
        const CYCLE_VALID = 1 << 12;
        const TIME_SIG_VALID = 1 << 13;
        const CONT_TIME_VALID = 1 << 17;
    }
}

/// The host's transport information for the current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContextInfo {
    pub state: ProcessContextFlags,
    pub sample_rate: f64,
    pub project_time_samples: i64,
    pub continuous_time_samples: i64,
    /// The project time in quarter notes.
    pub project_time_music: f64,
    pub bar_position_music: f64,
    pub tempo: f64,
    pub time_sig_numerator: i32,
    pub time_sig_denominator: i32,
}

impl Default for ProcessContextInfo {
    fn default() -> Self {
        Self {
            state: ProcessContextFlags::empty(),
            sample_rate: 44100.0,
            project_time_samples: 0,
            continuous_time_samples: 0,
            project_time_music: 0.0,
            bar_position_music: 0.0,
            tempo: 120.0,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
        }
    }
}

/// Everything passed to a single `process()` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessData {
    pub process_mode: ProcessMode,
    pub symbolic_sample_size: SymbolicSampleSize,
    pub num_samples: i32,
    pub inputs: Vec<AudioBusBuffers>,
    pub outputs: Vec<AudioBusBuffers>,
    pub input_parameter_changes: Option<ParameterChanges>,
    pub output_parameter_changes: Option<ParameterChanges>,
    pub input_events: Option<EventList>,
    pub output_events: Option<EventList>,
    pub process_context: Option<ProcessContextInfo>,
}

impl ProcessData {
    /// Create process data for a realtime 32-bit block without any buses, automation, or events.
    pub fn new(num_samples: i32) -> Self {
        Self {
            process_mode: ProcessMode::Realtime,
            symbolic_sample_size: SymbolicSampleSize::Sample32,
            num_samples,
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_parameter_changes: None,
            output_parameter_changes: None,
            input_events: None,
            output_events: None,
            process_context: None,
        }
    }
}
