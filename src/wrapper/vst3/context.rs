use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::inner::WrapperInner;
use super::message::{Message, RouteTarget};
use super::process_data::{Event, EventKind, EventList, ProcessContextFlags, ProcessContextInfo};
use super::protocol::ViewRect;
use super::view::ViewShared;
use crate::context::gui::GuiContext;
use crate::context::process::{BarBeatTick, ProcessContext, Transport, TICKS_PER_BEAT};
use crate::midi::{MidiEvent, MidiMessage, CHANNEL_PRESSURE_CONTROLLER, PITCH_BEND_CONTROLLER};
use crate::plugin::Plugin;

/// A [`ProcessContext`] implementation for the wrapper. This only lives for a single `run()` call
/// and borrows the host's output event list for that call.
pub(crate) struct WrapperProcessContext<'a, P: Plugin> {
    pub inner: &'a WrapperInner<P>,
    pub transport: &'a Transport,
    pub output_events: Option<&'a mut EventList>,
}

impl<P: Plugin> ProcessContext for WrapperProcessContext<'_, P> {
    fn transport(&self) -> &Transport {
        self.transport
    }

    fn send_midi_event(&mut self, event: MidiEvent) -> bool {
        if !self.inner.config.wants_midi_output {
            return false;
        }
        let output_events = match &mut self.output_events {
            Some(output_events) => output_events,
            None => return false,
        };

        if let Some(kind) = midi_to_host_event(&event) {
            output_events.add_event(Event {
                bus_index: 0,
                sample_offset: event.frame as i32,
                kind,
            });
        }

        true
    }

    fn request_parameter_change(&mut self, index: u32) {
        self.inner.request_parameter_change(index);
    }
}

/// Convert a plugin's MIDI event to the matching host event. Messages without a host
/// representation return `None`.
fn midi_to_host_event(event: &MidiEvent) -> Option<EventKind> {
    let kind = match event.message() {
        MidiMessage::NoteOn {
            channel,
            note,
            velocity,
        } => EventKind::NoteOn {
            channel: channel as i16,
            pitch: note as i16,
            velocity: velocity as f32 / 127.0,
            note_id: -1,
        },
        MidiMessage::NoteOff {
            channel,
            note,
            velocity,
        } => EventKind::NoteOff {
            channel: channel as i16,
            pitch: note as i16,
            velocity: velocity as f32 / 127.0,
            note_id: -1,
        },
        MidiMessage::PolyPressure {
            channel,
            note,
            pressure,
        } => EventKind::PolyPressure {
            channel: channel as i16,
            pitch: note as i16,
            pressure: pressure as f32 / 127.0,
            note_id: -1,
        },
        MidiMessage::ControlChange { channel, cc, value } => EventKind::LegacyMidiCcOut {
            channel,
            control_number: cc,
            value: value as i8,
            value2: 0,
        },
        MidiMessage::ChannelPressure { channel, pressure } => EventKind::LegacyMidiCcOut {
            channel,
            control_number: CHANNEL_PRESSURE_CONTROLLER,
            value: pressure as i8,
            value2: 0,
        },
        MidiMessage::PitchBend { channel, value } => EventKind::LegacyMidiCcOut {
            channel,
            control_number: PITCH_BEND_CONTROLLER,
            value: (value & 0x7f) as i8,
            value2: ((value >> 7) & 0x7f) as i8,
        },
        MidiMessage::Other => return None,
    };

    Some(kind)
}

/// Build the plugin's transport information from the host's process context. The host does not
/// report a tick resolution, so [`TICKS_PER_BEAT`] is used.
pub(crate) fn transport_from_context(context: &ProcessContextInfo) -> Transport {
    let state = context.state;

    let frame = if state.contains(ProcessContextFlags::CONT_TIME_VALID) {
        context.continuous_time_samples
    } else {
        context.project_time_samples
    };

    let mut bbt = BarBeatTick {
        valid: state
            .intersects(ProcessContextFlags::TEMPO_VALID | ProcessContextFlags::TIME_SIG_VALID),
        beats_per_minute: if state.contains(ProcessContextFlags::TEMPO_VALID) {
            context.tempo
        } else {
            120.0
        },
        ..BarBeatTick::default()
    };

    let numerator = context.time_sig_numerator;
    let denominator = context.time_sig_denominator;
    let quarters_per_bar = if denominator > 0 {
        numerator * 4 / denominator
    } else {
        0
    };
    let has_position = state.intersects(
        ProcessContextFlags::PROJECT_TIME_MUSIC_VALID | ProcessContextFlags::TIME_SIG_VALID,
    );

    if has_position && quarters_per_bar > 0 {
        let quarters_per_bar_f = quarters_per_bar as f64;
        let position = context.project_time_music.abs();
        let bar_beats = (position % quarters_per_bar_f) / quarters_per_bar_f * numerator as f64;
        let rest = bar_beats % 1.0;

        bbt.bar = position as i32 / quarters_per_bar + 1;
        bbt.beat = (bar_beats - rest + 0.5) as i32 + 1;
        bbt.tick = rest * TICKS_PER_BEAT;
        bbt.beats_per_bar = numerator as f32;
        bbt.beat_type = denominator as f32;

        // Negative positions count backwards from the start of the project
        if context.project_time_music < 0.0 {
            bbt.bar -= 1;
            bbt.beat = numerator - bbt.beat + 1;
            bbt.tick = TICKS_PER_BEAT - bbt.tick - 1.0;
        }
    }

    bbt.bar_start_tick = TICKS_PER_BEAT * bbt.beats_per_bar as f64 * (bbt.bar - 1) as f64;

    Transport {
        playing: state.contains(ProcessContextFlags::PLAYING),
        frame,
        bbt,
    }
}

/// The [`GuiContext`] handed to the editor. Everything the editor does is sent as a message over
/// the view's connection to the controller.
pub(crate) struct WrapperGuiContext {
    pub shared: Arc<ViewShared>,
}

impl WrapperGuiContext {
    fn send(&self, message: Message) {
        if let Err(err) = self.shared.link.send(&message) {
            adapter_warn!("Could not send '{}' to the controller: {}", message.id(), err);
        }
    }

    fn protocol_id(&self, index: u32) -> Option<u32> {
        let id = self.shared.param_ids.to_protocol_id(index);
        if id.is_none() {
            adapter_warn!("The editor used an unknown parameter index {}", index);
        }

        id
    }
}

impl GuiContext for WrapperGuiContext {
    fn begin_edit(&self, index: u32) {
        if let Some(id) = self.protocol_id(index) {
            self.send(Message::parameter_edit(id, true));
        }
    }

    fn set_parameter_value(&self, index: u32, plain: f32) {
        if let Some(id) = self.protocol_id(index) {
            self.send(Message::parameter_set(
                RouteTarget::Controller,
                id,
                plain as f64,
            ));
        }
    }

    fn end_edit(&self, index: u32) {
        if let Some(id) = self.protocol_id(index) {
            self.send(Message::parameter_edit(id, false));
        }
    }

    fn set_state(&self, key: &str, value: &str) {
        self.send(Message::state_set(RouteTarget::Processor, key, value));
    }

    fn send_note(&self, channel: u8, note: u8, velocity: u8) {
        let status = if velocity != 0 { 0x90 } else { 0x80 };
        self.send(Message::midi([status | (channel & 0x0f), note, velocity]));
    }

    fn request_resize(&self, width: u32, height: u32) -> bool {
        if self.shared.resizing_from_host.load(Ordering::SeqCst) {
            adapter_trace!("Ignoring a resize request while the host is resizing");
            return false;
        }

        let frame = match self.shared.frame.read().clone() {
            Some(frame) => frame,
            None => return false,
        };

        self.shared.resizing_from_plugin.store(true, Ordering::SeqCst);
        match frame.resize_view(ViewRect::new(width as i32, height as i32)) {
            Ok(()) => true,
            Err(err) => {
                adapter_warn!("The host rejected a resize to {}x{}: {}", width, height, err);
                self.shared.resizing_from_plugin.store(false, Ordering::SeqCst);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_context(state: ProcessContextFlags, quarters: f64) -> ProcessContextInfo {
        ProcessContextInfo {
            state,
            project_time_samples: 1000,
            continuous_time_samples: 2000,
            project_time_music: quarters,
            tempo: 140.0,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
            ..ProcessContextInfo::default()
        }
    }

    #[test]
    fn transport_defaults_without_position() {
        let transport = transport_from_context(&make_context(ProcessContextFlags::empty(), 9.5));

        assert!(!transport.playing);
        assert_eq!(transport.frame, 1000);
        assert!(!transport.bbt.valid);
        assert_eq!((transport.bbt.bar, transport.bbt.beat), (1, 1));
        assert_relative_eq!(transport.bbt.beats_per_minute, 120.0);
        assert_relative_eq!(transport.bbt.bar_start_tick, 0.0);
    }

    #[test]
    fn transport_bar_beat_tick() {
        let state = ProcessContextFlags::PLAYING
            | ProcessContextFlags::CONT_TIME_VALID
            | ProcessContextFlags::TEMPO_VALID
            | ProcessContextFlags::PROJECT_TIME_MUSIC_VALID
            | ProcessContextFlags::TIME_SIG_VALID;
        let transport = transport_from_context(&make_context(state, 9.5));

        assert!(transport.playing);
        assert_eq!(transport.frame, 2000);
        assert!(transport.bbt.valid);
        // Quarter 9.5 in 4/4 is halfway through the second beat of the third bar
        assert_eq!(transport.bbt.bar, 3);
        assert_eq!(transport.bbt.beat, 2);
        assert_relative_eq!(transport.bbt.tick, 960.0);
        assert_relative_eq!(transport.bbt.beats_per_minute, 140.0);
        assert_relative_eq!(transport.bbt.bar_start_tick, TICKS_PER_BEAT * 4.0 * 2.0);
    }

    #[test]
    fn transport_negative_position() {
        let state = ProcessContextFlags::PROJECT_TIME_MUSIC_VALID | ProcessContextFlags::TIME_SIG_VALID;
        let transport = transport_from_context(&make_context(state, -1.5));

        assert_eq!(transport.bbt.bar, 0);
        assert_eq!(transport.bbt.beat, 3);
        assert_relative_eq!(transport.bbt.tick, TICKS_PER_BEAT - 960.0 - 1.0);
    }

    #[test]
    fn midi_output_conversion() {
        assert_eq!(
            midi_to_host_event(&MidiEvent::control_change(4, 1, 74, 100)),
            Some(EventKind::LegacyMidiCcOut {
                channel: 1,
                control_number: 74,
                value: 100,
                value2: 0,
            })
        );
        assert_eq!(
            midi_to_host_event(&MidiEvent::pitch_bend(0, 2, 0x01, 0x40)),
            Some(EventKind::LegacyMidiCcOut {
                channel: 2,
                control_number: PITCH_BEND_CONTROLLER,
                value: 0x01,
                value2: 0x40,
            })
        );
        assert_eq!(
            midi_to_host_event(&MidiEvent::channel_pressure(0, 0, 64)),
            Some(EventKind::LegacyMidiCcOut {
                channel: 0,
                control_number: CHANNEL_PRESSURE_CONTROLLER,
                value: 64,
                value2: 0,
            })
        );
        assert_eq!(midi_to_host_event(&MidiEvent::new(0, [0xc0, 5, 0])), None);
    }

    #[test]
    fn midi_output_note_velocity() {
        match midi_to_host_event(&MidiEvent::note_on(0, 0, 60, 127)) {
            Some(EventKind::NoteOn {
                pitch, velocity, ..
            }) => {
                assert_eq!(pitch, 60);
                assert_relative_eq!(velocity, 1.0);
            }
            other => panic!("Unexpected event {other:?}"),
        }
    }
}
