//! Constants and definitions surrounding MIDI support.

use midi_consts::channel_event as midi;

/// The maximum number of MIDI events a plugin receives or can send during a single block. Events
/// past this point are silently dropped.
pub const MAX_MIDI_EVENTS: usize = 512;

/// The number of pseudo-controllers per MIDI channel exposed to the host: the 128 regular CCs,
/// followed by channel pressure and pitch bend.
pub const MIDI_CONTROLLERS_PER_CHANNEL: u32 = 130;
/// The controller number used for channel pressure in the pseudo-controller space.
pub const CHANNEL_PRESSURE_CONTROLLER: u8 = 128;
/// The controller number used for pitch bend in the pseudo-controller space.
pub const PITCH_BEND_CONTROLLER: u8 = 129;

/// A raw MIDI message with a timing. Only regular channel messages of up to four bytes are
/// represented. `frame` is the sample offset within the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MidiEvent {
    pub frame: u32,
    pub size: u8,
    pub data: [u8; 4],
}

/// A decoded view of a [`MidiEvent`]. All channel and note numbers are zero-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// A 14-bit pitch bend value, where `0x2000` is the center.
    PitchBend { channel: u8, value: u16 },
    /// Anything else, like program changes or system messages.
    Other,
}

impl MidiEvent {
    /// Create a three byte MIDI event.
    pub fn new(frame: u32, data: [u8; 3]) -> Self {
        Self {
            frame,
            size: 3,
            data: [data[0], data[1], data[2], 0],
        }
    }

    pub fn note_on(frame: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(frame, [midi::NOTE_ON | (channel & midi::MIDI_CHANNEL_MASK), note, velocity])
    }

    pub fn note_off(frame: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(frame, [midi::NOTE_OFF | (channel & midi::MIDI_CHANNEL_MASK), note, velocity])
    }

    pub fn poly_pressure(frame: u32, channel: u8, note: u8, pressure: u8) -> Self {
        Self::new(
            frame,
            [
                midi::POLYPHONIC_KEY_PRESSURE | (channel & midi::MIDI_CHANNEL_MASK),
                note,
                pressure,
            ],
        )
    }

    pub fn control_change(frame: u32, channel: u8, cc: u8, value: u8) -> Self {
        Self::new(
            frame,
            [midi::CONTROL_CHANGE | (channel & midi::MIDI_CHANNEL_MASK), cc, value],
        )
    }

    /// Channel pressure only uses two bytes, but the event is still stored with a size of three
    /// and a zero third byte.
    pub fn channel_pressure(frame: u32, channel: u8, pressure: u8) -> Self {
        Self::new(
            frame,
            [midi::CHANNEL_KEY_PRESSURE | (channel & midi::MIDI_CHANNEL_MASK), pressure, 0],
        )
    }

    pub fn pitch_bend(frame: u32, channel: u8, lsb: u8, msb: u8) -> Self {
        Self::new(
            frame,
            [midi::PITCH_BEND_CHANGE | (channel & midi::MIDI_CHANNEL_MASK), lsb, msb],
        )
    }

    /// The event's raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..(self.size as usize).min(4)]
    }

    /// Decode the event. Messages with fewer than the required number of bytes decode to
    /// [`MidiMessage::Other`].
    pub fn message(&self) -> MidiMessage {
        if self.size < 2 {
            return MidiMessage::Other;
        }

        let event_type = self.data[0] & midi::EVENT_TYPE_MASK;
        let channel = self.data[0] & midi::MIDI_CHANNEL_MASK;
        let has_three_bytes = self.size >= 3;
        match event_type {
            midi::NOTE_ON if has_three_bytes => MidiMessage::NoteOn {
                channel,
                note: self.data[1],
                velocity: self.data[2],
            },
            midi::NOTE_OFF if has_three_bytes => MidiMessage::NoteOff {
                channel,
                note: self.data[1],
                velocity: self.data[2],
            },
            midi::POLYPHONIC_KEY_PRESSURE if has_three_bytes => MidiMessage::PolyPressure {
                channel,
                note: self.data[1],
                pressure: self.data[2],
            },
            midi::CONTROL_CHANGE if has_three_bytes => MidiMessage::ControlChange {
                channel,
                cc: self.data[1],
                value: self.data[2],
            },
            midi::CHANNEL_KEY_PRESSURE => MidiMessage::ChannelPressure {
                channel,
                pressure: self.data[1],
            },
            midi::PITCH_BEND_CHANGE if has_three_bytes => MidiMessage::PitchBend {
                channel,
                value: (self.data[1] & 0x7f) as u16 | ((self.data[2] & 0x7f) as u16) << 7,
            },
            _ => MidiMessage::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_control_change() {
        let event = MidiEvent::control_change(10, 2, 7, 127);

        assert_eq!(event.bytes(), &[0xB2, 7, 127]);
        assert_eq!(
            event.message(),
            MidiMessage::ControlChange {
                channel: 2,
                cc: 7,
                value: 127
            }
        );
    }

    #[test]
    fn decode_pitch_bend() {
        let event = MidiEvent::pitch_bend(0, 15, 0x00, 0x40);

        assert_eq!(
            event.message(),
            MidiMessage::PitchBend {
                channel: 15,
                value: 0x2000
            }
        );
    }

    #[test]
    fn short_messages_are_other() {
        let event = MidiEvent {
            frame: 0,
            size: 1,
            data: [0xF8, 0, 0, 0],
        };

        assert_eq!(event.message(), MidiMessage::Other);
        assert_eq!(event.bytes(), &[0xF8]);
    }
}
