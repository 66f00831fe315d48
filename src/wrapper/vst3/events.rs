//! Merges the input events for a single block into one list ordered by sample offset. Events come
//! from three sources, fed in this order:
//!
//! 1. Notes sent from the editor, which are always placed at the start of the block.
//! 2. The host's event list. Only note on, note off, and polyphonic pressure events are converted.
//! 3. Automation for the MIDI controller pseudo-parameters.
//!
//! Events with equal sample offsets keep their insertion order, so the feed order above is also
//! the tie-break order.

use crossbeam::queue::ArrayQueue;

use super::param_ids::{ParameterIdSpace, ParameterKind};
use super::process_data::{EventKind, EventList, ParameterChanges};
use crate::midi::{
    MidiEvent, CHANNEL_PRESSURE_CONTROLLER, MAX_MIDI_EVENTS, PITCH_BEND_CONTROLLER,
};
use crate::util::{normalized_to_midi_14bit, normalized_to_midi_7bit};
use crate::wrapper::util::clamp_input_event_timing;

/// An event waiting to be converted to a [`MidiEvent`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingEvent {
    pub offset: u32,
    pub payload: PendingPayload,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PendingPayload {
    NoteOn { channel: u8, pitch: u8, velocity: f32 },
    NoteOff { channel: u8, pitch: u8, velocity: f32 },
    PolyPressure { channel: u8, pitch: u8, pressure: f32 },
    /// A value for one of the MIDI controller pseudo-parameters.
    Controller { channel: u8, controller: u8, value: f64 },
    /// A raw three byte message sent from the editor.
    Ui([u8; 3]),
}

impl PendingPayload {
    fn to_midi_event(self, frame: u32) -> MidiEvent {
        match self {
            PendingPayload::NoteOn {
                channel,
                pitch,
                velocity,
            } => MidiEvent::note_on(
                frame,
                channel,
                pitch,
                normalized_to_midi_7bit(velocity as f64),
            ),
            PendingPayload::NoteOff {
                channel,
                pitch,
                velocity,
            } => MidiEvent::note_off(
                frame,
                channel,
                pitch,
                normalized_to_midi_7bit(velocity as f64),
            ),
            PendingPayload::PolyPressure {
                channel,
                pitch,
                pressure,
            } => MidiEvent::poly_pressure(
                frame,
                channel,
                pitch,
                normalized_to_midi_7bit(pressure as f64),
            ),
            PendingPayload::Controller {
                channel,
                controller: CHANNEL_PRESSURE_CONTROLLER,
                value,
            } => MidiEvent::channel_pressure(frame, channel, normalized_to_midi_7bit(value)),
            PendingPayload::Controller {
                channel,
                controller: PITCH_BEND_CONTROLLER,
                value,
            } => {
                let (lsb, msb) = normalized_to_midi_14bit(value);
                MidiEvent::pitch_bend(frame, channel, lsb, msb)
            }
            PendingPayload::Controller {
                channel,
                controller,
                value,
            } => MidiEvent::control_change(frame, channel, controller, normalized_to_midi_7bit(value)),
            PendingPayload::Ui(data) => MidiEvent::new(frame, data),
        }
    }
}

/// A fixed capacity list of [`PendingEvent`]s sorted by sample offset. Cleared at the start of
/// every block. The backing storage is allocated once, up front.
pub struct EventScheduler {
    events: Vec<PendingEvent>,
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventScheduler {
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(MAX_MIDI_EVENTS),
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= MAX_MIDI_EVENTS
    }

    pub fn events(&self) -> &[PendingEvent] {
        &self.events
    }

    /// Insert an event while keeping the list sorted. Returns `false` without inserting anything
    /// if the scheduler is already full.
    pub fn append(&mut self, event: PendingEvent) -> bool {
        if self.is_full() {
            return false;
        }

        match (self.events.first(), self.events.last()) {
            (_, Some(last)) if event.offset >= last.offset => self.events.push(event),
            (Some(first), _) if event.offset < first.offset => self.events.insert(0, event),
            (None, None) => self.events.push(event),
            _ => {
                // Splice after the last event at or before this offset
                let insert_at = self
                    .events
                    .iter()
                    .rposition(|existing| existing.offset <= event.offset)
                    .map(|idx| idx + 1)
                    .unwrap_or(0);
                self.events.insert(insert_at, event);
            }
        }

        true
    }

    /// Drain the notes sent by the editor, placing them at the start of the block. Returns `false`
    /// once the scheduler is full. Notes that don't fit stay in the queue for the next block.
    pub fn feed_ui_notes(&mut self, notes: &ArrayQueue<[u8; 3]>) -> bool {
        while !self.is_full() {
            match notes.pop() {
                Some(data) => {
                    self.append(PendingEvent {
                        offset: 0,
                        payload: PendingPayload::Ui(data),
                    });
                }
                None => return true,
            }
        }

        false
    }

    /// Add the convertible events from the host's event list. Returns `false` once the scheduler
    /// is full.
    pub fn feed_host_events(&mut self, events: &EventList, num_frames: u32) -> bool {
        for event in &events.events {
            let payload = match event.kind {
                EventKind::NoteOn {
                    channel,
                    pitch,
                    velocity,
                    ..
                } => midi_address(channel, pitch)
                    .map(|(channel, pitch)| PendingPayload::NoteOn {
                        channel,
                        pitch,
                        velocity,
                    }),
                EventKind::NoteOff {
                    channel,
                    pitch,
                    velocity,
                    ..
                } => midi_address(channel, pitch)
                    .map(|(channel, pitch)| PendingPayload::NoteOff {
                        channel,
                        pitch,
                        velocity,
                    }),
                EventKind::PolyPressure {
                    channel,
                    pitch,
                    pressure,
                    ..
                } => midi_address(channel, pitch)
                    .map(|(channel, pitch)| PendingPayload::PolyPressure {
                        channel,
                        pitch,
                        pressure,
                    }),
                // SysEx can't be represented in a `MidiEvent`
                EventKind::Data { .. } | EventKind::LegacyMidiCcOut { .. } => continue,
            };
            // Channels past 16 and notes past 127 don't fit in a MIDI message
            let payload = match payload {
                Some(payload) => payload,
                None => continue,
            };

            let accepted = self.append(PendingEvent {
                offset: clamp_input_event_timing(event.sample_offset, num_frames),
                payload,
            });
            if !accepted {
                return false;
            }
        }

        true
    }

    /// Add the automation points for the MIDI controller pseudo-parameters. Queues for any other
    /// parameter are ignored. Returns `false` once the scheduler is full.
    pub fn feed_controller_changes(
        &mut self,
        changes: &ParameterChanges,
        param_ids: &ParameterIdSpace,
        num_frames: u32,
    ) -> bool {
        for queue in &changes.queues {
            let (channel, controller) = match param_ids.from_protocol_id(queue.id) {
                ParameterKind::MidiCc {
                    channel,
                    controller,
                } => (channel, controller),
                _ => continue,
            };

            for &(offset, value) in &queue.points {
                let accepted = self.append(PendingEvent {
                    offset: clamp_input_event_timing(offset, num_frames),
                    payload: PendingPayload::Controller {
                        channel,
                        controller,
                        value,
                    },
                });
                if !accepted {
                    return false;
                }
            }
        }

        true
    }

    /// Write the scheduled events to `output` in order. `output` is cleared first, and never grows
    /// past [`MAX_MIDI_EVENTS`] entries.
    pub fn convert(&self, output: &mut Vec<MidiEvent>) {
        output.clear();
        output.extend(
            self.events
                .iter()
                .take(MAX_MIDI_EVENTS)
                .map(|event| event.payload.to_midi_event(event.offset)),
        );
    }
}

fn midi_address(channel: i16, pitch: i16) -> Option<(u8, u8)> {
    let channel = u8::try_from(channel).ok().filter(|&channel| channel < 16)?;
    let pitch = u8::try_from(pitch).ok().filter(|&pitch| pitch < 128)?;

    Some((channel, pitch))
}
