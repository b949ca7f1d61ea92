//! The MIDI dispatcher collaborator (§4.8): accepts raw MIDI per input
//! port, converts it to RT events via the routing/CC/program-change tables,
//! and forwards outgoing RT events to output ports with clock generation.

use crate::cc::CcMappingManager;
use crate::program_change::ProgramChangeRouter;
use crate::routing::RoutingTable;
use sushi_core::rt_event::RtEvent;
use sushi_midi::MidiEvent;

/// Per §6 "MIDI backend contract": the backend calls `receive_midi(port,
/// bytes, timestamp)`; this converts that into zero or more RT events ready
/// to post into the dispatcher's non-RT->RT ring.
pub struct MidiDispatcher {
    routing: RoutingTable,
    cc: CcMappingManager,
    program_change: ProgramChangeRouter,
}

impl MidiDispatcher {
    pub fn new() -> Self {
        Self {
            routing: RoutingTable::new(),
            cc: CcMappingManager::new(),
            program_change: ProgramChangeRouter::new(),
        }
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn cc_mappings(&self) -> &CcMappingManager {
        &self.cc
    }

    pub fn program_change_router(&self) -> &ProgramChangeRouter {
        &self.program_change
    }

    /// Decode one incoming raw MIDI message and translate it to the RT
    /// event(s) it produces: a note/keyboard event routed to the track
    /// bound to `port`/`channel`, a CC mapped to a (processor, parameter),
    /// or a program-change routed to a processor. Messages matching none of
    /// the tables produce no events.
    pub fn receive_midi(&self, port: u16, data: &[u8], frame_offset: u16) -> Vec<RtEvent> {
        let raw = sushi_midi::RawMidiEvent::new(
            [
                *data.first().unwrap_or(&0),
                *data.get(1).unwrap_or(&0),
                *data.get(2).unwrap_or(&0),
            ],
            data.len().min(3) as u8,
        );
        let Some(event) = MidiEvent::from_bytes(frame_offset as usize, &raw) else {
            return Vec::new();
        };

        let mut out = Vec::new();

        if let Some(cc) = event.control_number() {
            if let Some(value) = event.control_value() {
                if let Some(rt) = self.cc.process_cc(port, event.channel_num(), cc, value, frame_offset) {
                    out.push(rt);
                    return out;
                }
            }
        }

        if let Some(program) = event.program() {
            if let Some(rt) = self
                .program_change
                .process_program_change(port, event.channel_num(), program, frame_offset)
            {
                out.push(rt);
                return out;
            }
        }

        if let Some(track) = self.routing.snapshot().track_for(port, event.channel_num()) {
            if event.is_note_on() {
                if let (Some(note), Some(velocity)) = (event.note(), event.velocity_normalized()) {
                    out.push(RtEvent::note_on(frame_offset, track, note, velocity));
                }
            } else if event.is_note_off() {
                if let (Some(note), Some(velocity)) = (event.note(), event.velocity_normalized()) {
                    out.push(RtEvent::note_off(frame_offset, track, note, velocity));
                }
            }
        }

        out
    }
}

impl Default for MidiDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_routes_to_connected_track() {
        let dispatcher = MidiDispatcher::new();
        dispatcher.routing().connect(0, 0, 7);
        let events = dispatcher.receive_midi(0, &[0x90, 60, 100], 5);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_note_on(), Some((7, 60, 100.0 / 127.0)));
    }

    #[test]
    fn cc_takes_priority_over_note_routing() {
        let dispatcher = MidiDispatcher::new();
        dispatcher.routing().connect(0, 0, 7);
        dispatcher.cc_mappings().add_mapping(
            Some(0),
            0,
            74,
            3,
            1,
            0.0,
            1.0,
            crate::cc::CcMode::Absolute,
        );
        let events = dispatcher.receive_midi(0, &[0xB0, 74, 64], 0);
        assert_eq!(events.len(), 1);
        assert!(events[0].as_float_parameter_change().is_some());
    }

    #[test]
    fn unrouted_channel_produces_no_events() {
        let dispatcher = MidiDispatcher::new();
        let events = dispatcher.receive_midi(0, &[0x90, 60, 100], 0);
        assert!(events.is_empty());
    }
}
