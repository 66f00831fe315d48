//! Groups the plugin's individual audio ports into the buses exposed to the host. The bus layout is
//! computed once when the adapter is created, and only the per-port enabled flags can change
//! afterwards.

use std::sync::atomic::{AtomicBool, Ordering};

use super::protocol::{
    speakers, BusDirection, BusFlags, BusInfo, BusType, MediaType, SpeakerArrangement,
    Vst3Error, Vst3Result,
};
use crate::plugin::AudioPort;
use crate::wrapper::util::u16strlcpy;

/// The largest number of channels a single bus can have.
pub const MAX_BUS_CHANNELS: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    /// All ports sharing a group ID.
    Grouped { group_id: u32 },
    /// The ungrouped regular audio ports.
    Main,
    /// The ungrouped sidechain ports.
    Sidechain,
    /// A single ungrouped control voltage port.
    ControlVoltage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bus {
    pub kind: BusKind,
    pub name: String,
    pub bus_type: BusType,
    pub flags: BusFlags,
    /// Port indices in channel order.
    pub members: Vec<usize>,
    /// The only non-empty arrangement the host may set for this bus.
    pub arrangement: SpeakerArrangement,
}

/// The canonical speaker arrangement for a bus with `num_channels` channels, or `None` if buses
/// with that many channels are not supported.
pub fn canonical_arrangement(num_channels: usize) -> Option<SpeakerArrangement> {
    use speakers::*;

    const SURROUND_5_0: SpeakerArrangement = L | R | C | LS | RS;
    const SURROUND_7_1_CINE: SpeakerArrangement = L | R | C | LFE | LS | RS | LC | RC;

    let arrangement = match num_channels {
        0 => EMPTY,
        1 => MONO,
        2 => STEREO,
        3 => L | R | C,
        4 => L | R | C | LFE,
        5 => SURROUND_5_0,
        6 => SURROUND_5_0 | LFE,
        7 => SURROUND_5_0 | LFE | CS,
        8 => SURROUND_7_1_CINE,
        9 => SURROUND_7_1_CINE | CS,
        10 => SURROUND_7_1_CINE | CS | SL,
        11 => SURROUND_7_1_CINE | CS | SL | SR,
        _ => return None,
    };

    Some(arrangement)
}

/// The audio buses for one direction.
#[derive(Debug)]
pub struct AudioBuses {
    direction: BusDirection,
    buses: Vec<Bus>,
    /// The bus index for every port.
    port_bus: Vec<usize>,
    /// Whether each port is currently enabled.
    port_enabled: Vec<AtomicBool>,
}

impl AudioBuses {
    /// Compute the buses for `ports`. Fails with an internal error if a bus would end up with more
    /// channels than any known speaker arrangement supports.
    pub fn new(direction: BusDirection, ports: &[AudioPort]) -> Vst3Result<Self> {
        let mut buses: Vec<Bus> = Vec::new();
        let mut port_bus = vec![usize::MAX; ports.len()];

        // Grouped ports come first, with one bus per group in order of first appearance
        for (port_idx, port) in ports.iter().enumerate() {
            let group = match port.group {
                Some(group) => group,
                None => continue,
            };

            let bus_idx = match buses
                .iter()
                .position(|bus| bus.kind == BusKind::Grouped { group_id: group.id })
            {
                Some(bus_idx) => bus_idx,
                None => {
                    let is_auxiliary = port.is_sidechain() || port.is_cv();
                    buses.push(Bus {
                        kind: BusKind::Grouped { group_id: group.id },
                        name: group.name.to_owned(),
                        bus_type: BusType::Aux,
                        flags: if is_auxiliary {
                            BusFlags::empty()
                        } else {
                            BusFlags::DEFAULT_ACTIVE
                        },
                        members: Vec::new(),
                        arrangement: speakers::EMPTY,
                    });
                    buses.len() - 1
                }
            };

            buses[bus_idx].members.push(port_idx);
            port_bus[port_idx] = bus_idx;
        }

        let ungrouped = |predicate: fn(&AudioPort) -> bool| -> Vec<usize> {
            ports
                .iter()
                .enumerate()
                .filter(|(_, port)| port.group.is_none() && predicate(port))
                .map(|(port_idx, _)| port_idx)
                .collect()
        };

        let main_ports = ungrouped(|port| !port.is_sidechain() && !port.is_cv());
        if !main_ports.is_empty() {
            buses.push(Bus {
                kind: BusKind::Main,
                name: match direction {
                    BusDirection::Input => String::from("Audio Input"),
                    BusDirection::Output => String::from("Audio Output"),
                },
                bus_type: BusType::Main,
                flags: BusFlags::DEFAULT_ACTIVE,
                members: main_ports,
                arrangement: speakers::EMPTY,
            });
        }

        let sidechain_ports = ungrouped(|port| port.is_sidechain() && !port.is_cv());
        if let Some(&first_port) = sidechain_ports.first() {
            buses.push(Bus {
                kind: BusKind::Sidechain,
                name: ports[first_port].name.to_owned(),
                bus_type: BusType::Aux,
                flags: BusFlags::empty(),
                members: sidechain_ports,
                arrangement: speakers::EMPTY,
            });
        }

        for port_idx in ungrouped(|port| port.is_cv()) {
            buses.push(Bus {
                kind: BusKind::ControlVoltage,
                name: ports[port_idx].name.to_owned(),
                bus_type: BusType::Aux,
                flags: BusFlags::IS_CONTROL_VOLTAGE,
                members: vec![port_idx],
                arrangement: speakers::EMPTY,
            });
        }

        // Without an ungrouped main bus, the first regular group acts as the main bus
        if !buses.iter().any(|bus| bus.bus_type == BusType::Main) {
            if let Some(bus) = buses.iter_mut().find(|bus| {
                matches!(bus.kind, BusKind::Grouped { .. })
                    && bus.flags.contains(BusFlags::DEFAULT_ACTIVE)
            }) {
                bus.bus_type = BusType::Main;
            }
        }

        for (bus_idx, bus) in buses.iter_mut().enumerate() {
            bus.arrangement = match canonical_arrangement(bus.members.len()) {
                Some(arrangement) => arrangement,
                None => {
                    adapter_error!(
                        "Bus {} ('{}') has {} channels, at most {} are supported",
                        bus_idx,
                        bus.name,
                        bus.members.len(),
                        MAX_BUS_CHANNELS
                    );
                    return Err(Vst3Error::InternalError);
                }
            };

            for &port_idx in &bus.members {
                port_bus[port_idx] = bus_idx;
            }
        }

        let port_enabled = port_bus
            .iter()
            .map(|&bus_idx| {
                AtomicBool::new(buses[bus_idx].flags.contains(BusFlags::DEFAULT_ACTIVE))
            })
            .collect();

        Ok(Self {
            direction,
            buses,
            port_bus,
            port_enabled,
        })
    }

    pub fn direction(&self) -> BusDirection {
        self.direction
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    pub fn bus(&self, bus_idx: usize) -> Option<&Bus> {
        self.buses.get(bus_idx)
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    /// The bus a port belongs to.
    pub fn bus_for_port(&self, port_idx: usize) -> Option<usize> {
        self.port_bus.get(port_idx).copied()
    }

    /// The bus a port belongs to, together with the port's channel index within that bus.
    pub fn port_location(&self, port_idx: usize) -> Option<(usize, usize)> {
        let bus_idx = self.bus_for_port(port_idx)?;
        let channel_idx = self.buses[bus_idx]
            .members
            .iter()
            .position(|&member| member == port_idx)?;

        Some((bus_idx, channel_idx))
    }

    pub fn port_count(&self) -> usize {
        self.port_bus.len()
    }

    pub fn is_port_enabled(&self, port_idx: usize) -> bool {
        self.port_enabled
            .get(port_idx)
            .map(|enabled| enabled.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    pub fn is_bus_enabled(&self, bus_idx: usize) -> bool {
        self.buses
            .get(bus_idx)
            .map(|bus| bus.members.iter().any(|&port_idx| self.is_port_enabled(port_idx)))
            .unwrap_or(false)
    }

    pub fn bus_info(&self, bus_idx: i32) -> Vst3Result<BusInfo> {
        let bus = self.checked_bus(bus_idx)?;

        let mut info = BusInfo {
            media_type: MediaType::Audio,
            direction: self.direction,
            channel_count: bus.members.len() as i32,
            name: [0; 128],
            bus_type: bus.bus_type,
            flags: bus.flags,
        };
        u16strlcpy(&mut info.name, &bus.name);

        Ok(info)
    }

    pub fn arrangement(&self, bus_idx: i32) -> Vst3Result<SpeakerArrangement> {
        Ok(self.checked_bus(bus_idx)?.arrangement)
    }

    /// Apply the host's proposed arrangements, one per bus. A bus can only be set to its canonical
    /// arrangement, which enables it, or to the empty arrangement, which disables it. If any
    /// proposal is not acceptable then nothing is changed.
    pub fn set_arrangements(&self, proposed: &[SpeakerArrangement]) -> Vst3Result<()> {
        if proposed.len() != self.buses.len() {
            adapter_warn!(
                "Host proposed {} {:?} arrangements for {} buses",
                proposed.len(),
                self.direction,
                self.buses.len()
            );
            return Err(Vst3Error::InvalidArgument);
        }

        for (bus_idx, (bus, &arrangement)) in self.buses.iter().zip(proposed).enumerate() {
            if arrangement != bus.arrangement && arrangement != speakers::EMPTY {
                adapter_trace!(
                    "Rejecting arrangement {:#x} for {:?} bus {}, expected {:#x}",
                    arrangement,
                    self.direction,
                    bus_idx,
                    bus.arrangement
                );
                return Err(Vst3Error::ResultFalse);
            }
        }

        for (bus, &arrangement) in self.buses.iter().zip(proposed) {
            let enabled = arrangement != speakers::EMPTY || bus.arrangement == speakers::EMPTY;
            for &port_idx in &bus.members {
                self.port_enabled[port_idx].store(enabled, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    /// Enable or disable every port of a bus.
    pub fn activate_bus(&self, bus_idx: i32, state: bool) -> Vst3Result<()> {
        let bus = self.checked_bus(bus_idx)?;
        for &port_idx in &bus.members {
            self.port_enabled[port_idx].store(state, Ordering::Relaxed);
        }

        Ok(())
    }

    fn checked_bus(&self, bus_idx: i32) -> Vst3Result<&Bus> {
        if bus_idx < 0 {
            return Err(Vst3Error::InvalidArgument);
        }

        self.buses
            .get(bus_idx as usize)
            .ok_or(Vst3Error::InvalidArgument)
    }
}

/// All buses of an adapter instance: the audio buses for both directions, plus the single MIDI
/// event bus per direction if the plugin wants MIDI.
#[derive(Debug)]
pub struct BusLayout {
    pub inputs: AudioBuses,
    pub outputs: AudioBuses,
    pub midi_input: bool,
    pub midi_output: bool,
}

impl BusLayout {
    pub fn new(
        input_ports: &[AudioPort],
        output_ports: &[AudioPort],
        midi_input: bool,
        midi_output: bool,
    ) -> Vst3Result<Self> {
        Ok(Self {
            inputs: AudioBuses::new(BusDirection::Input, input_ports)?,
            outputs: AudioBuses::new(BusDirection::Output, output_ports)?,
            midi_input,
            midi_output,
        })
    }

    pub fn audio(&self, direction: BusDirection) -> &AudioBuses {
        match direction {
            BusDirection::Input => &self.inputs,
            BusDirection::Output => &self.outputs,
        }
    }

    fn has_event_bus(&self, direction: BusDirection) -> bool {
        match direction {
            BusDirection::Input => self.midi_input,
            BusDirection::Output => self.midi_output,
        }
    }

    pub fn bus_count(&self, media_type: MediaType, direction: BusDirection) -> i32 {
        match media_type {
            MediaType::Audio => self.audio(direction).bus_count() as i32,
            MediaType::Event => self.has_event_bus(direction) as i32,
        }
    }

    pub fn bus_info(
        &self,
        media_type: MediaType,
        direction: BusDirection,
        bus_idx: i32,
    ) -> Vst3Result<BusInfo> {
        match media_type {
            MediaType::Audio => self.audio(direction).bus_info(bus_idx),
            MediaType::Event => {
                if bus_idx != 0 || !self.has_event_bus(direction) {
                    return Err(Vst3Error::InvalidArgument);
                }

                let mut info = BusInfo {
                    media_type: MediaType::Event,
                    direction,
                    channel_count: 1,
                    name: [0; 128],
                    bus_type: BusType::Main,
                    flags: BusFlags::DEFAULT_ACTIVE,
                };
                u16strlcpy(
                    &mut info.name,
                    match direction {
                        BusDirection::Input => "Event/MIDI Input",
                        BusDirection::Output => "Event/MIDI Output",
                    },
                );

                Ok(info)
            }
        }
    }

    /// Toggle a bus. Event buses are always active, so toggling those is accepted but ignored.
    pub fn activate_bus(
        &self,
        media_type: MediaType,
        direction: BusDirection,
        bus_idx: i32,
        state: bool,
    ) -> Vst3Result<()> {
        match media_type {
            MediaType::Audio => self.audio(direction).activate_bus(bus_idx, state),
            MediaType::Event if bus_idx == 0 && self.has_event_bus(direction) => Ok(()),
            MediaType::Event => Err(Vst3Error::InvalidArgument),
        }
    }

    /// Apply the arrangements for both directions. The inputs are validated before anything is
    /// changed, so a rejected output proposal leaves the inputs untouched too.
    pub fn set_arrangements(
        &self,
        inputs: &[SpeakerArrangement],
        outputs: &[SpeakerArrangement],
    ) -> Vst3Result<()> {
        for (buses, proposed) in [(&self.inputs, inputs), (&self.outputs, outputs)] {
            if proposed.len() != buses.bus_count() {
                return Err(Vst3Error::InvalidArgument);
            }
            for (bus, &arrangement) in buses.buses().iter().zip(proposed) {
                if arrangement != bus.arrangement && arrangement != speakers::EMPTY {
                    return Err(Vst3Error::ResultFalse);
                }
            }
        }

        self.inputs.set_arrangements(inputs)?;
        self.outputs.set_arrangements(outputs)
    }

    pub fn arrangement(&self, direction: BusDirection, bus_idx: i32) -> Vst3Result<SpeakerArrangement> {
        self.audio(direction).arrangement(bus_idx)
    }
}
