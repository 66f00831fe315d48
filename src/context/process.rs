//! A context passed during the process function.

use crate::midi::MidiEvent;

/// Contains both context data and callbacks the plugin can use during processing. This is passed
/// to the plugin as part of [`Plugin::run()`][crate::plugin::Plugin::run()].
pub trait ProcessContext {
    /// Get information about the current transport position and status. The values are only
    /// meaningful when [`Plugin::WANTS_TRANSPORT`][crate::plugin::Plugin::WANTS_TRANSPORT] is set.
    fn transport(&self) -> &Transport;

    /// Send a MIDI event to the host. Only available when
    /// [`Plugin::WANTS_MIDI_OUTPUT`][crate::plugin::Plugin::WANTS_MIDI_OUTPUT] is set, and this
    /// returns `false` otherwise. Messages that cannot be represented as host events are silently
    /// dropped, in which case this still returns `true`.
    fn send_midi_event(&mut self, event: MidiEvent) -> bool;

    /// Mark the parameter at `index` as changed during processing. The new value, as reported by
    /// [`Plugin::parameter_value()`][crate::plugin::Plugin::parameter_value()], is then sent to the
    /// host at the end of the block. Output and trigger parameters are checked automatically, so
    /// this is only needed for other parameters the plugin changes by itself.
    fn request_parameter_change(&mut self, index: u32);
}

/// Musical position information, in bars, beats, and ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarBeatTick {
    /// Whether the host provided a tempo or time signature. If this is false then the other fields
    /// contain defaults.
    pub valid: bool,
    /// The current bar, starting at 1.
    pub bar: i32,
    /// The current beat within the bar, starting at 1.
    pub beat: i32,
    /// The current tick within the beat, in `[0, ticks_per_beat)`.
    pub tick: f64,
    /// The tick position of the start of the current bar.
    pub bar_start_tick: f64,
    /// The time signature's numerator.
    pub beats_per_bar: f32,
    /// The time signature's denominator.
    pub beat_type: f32,
    pub ticks_per_beat: f64,
    pub beats_per_minute: f64,
}

impl Default for BarBeatTick {
    fn default() -> Self {
        Self {
            valid: false,
            bar: 1,
            beat: 1,
            tick: 0.0,
            bar_start_tick: 0.0,
            beats_per_bar: 4.0,
            beat_type: 4.0,
            ticks_per_beat: TICKS_PER_BEAT,
            beats_per_minute: 120.0,
        }
    }
}

/// The tick resolution used for [`BarBeatTick`]. The protocol does not report one.
pub const TICKS_PER_BEAT: f64 = 1920.0;

/// Information about the plugin's transport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transport {
    /// Whether the transport is currently running.
    pub playing: bool,
    /// The position in samples.
    pub frame: i64,
    pub bbt: BarBeatTick,
}
