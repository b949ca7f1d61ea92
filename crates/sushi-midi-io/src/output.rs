//! Outgoing MIDI: forwards RT events that carry wrapped MIDI out to specific
//! output ports, plus per-port MIDI clock generation (§4.8: "Forwards
//! outgoing RT events... to specific output ports, with clock generation on
//! enabled ports").

use parking_lot::Mutex;
use std::collections::HashSet;
use sushi_core::rt_event::RtEvent;

/// A single outgoing wire-level MIDI message bound for one port. `data`
/// mirrors the wire format of [`sushi_core::rt_event::RtEventKind::WrappedMidi`]
/// (up to 4 bytes, e.g. a clock byte or a 3-byte channel-voice message).
#[derive(Debug, Clone, Copy)]
pub struct OutgoingMidiMessage {
    pub port: u16,
    pub data: [u8; 4],
    pub len: u8,
    pub sample_offset: u16,
}

/// 24 MIDI clock ticks per quarter note, the standard MIDI clock rate.
pub const CLOCK_PPQN: u32 = 24;

/// Generates MIDI clock bytes (0xF8) at 24 pulses per quarter note for
/// whichever output ports have clock enabled, driven by the transport's
/// advancing beat count.
pub struct ClockGenerator {
    enabled_ports: Mutex<HashSet<u16>>,
    last_tick_beats: Mutex<f64>,
}

impl ClockGenerator {
    pub fn new() -> Self {
        Self {
            enabled_ports: Mutex::new(HashSet::new()),
            last_tick_beats: Mutex::new(0.0),
        }
    }

    pub fn set_port_enabled(&self, port: u16, enabled: bool) {
        let mut ports = self.enabled_ports.lock();
        if enabled {
            ports.insert(port);
        } else {
            ports.remove(&port);
        }
    }

    /// Given the beat position at the start and end of the current chunk,
    /// emit one clock message per enabled port for every clock boundary
    /// crossed in between.
    pub fn tick(&self, beats_start: f64, beats_end: f64) -> Vec<OutgoingMidiMessage> {
        let ports: Vec<u16> = self.enabled_ports.lock().iter().copied().collect();
        if ports.is_empty() {
            return Vec::new();
        }
        let mut last = self.last_tick_beats.lock();
        let ticks_per_beat = CLOCK_PPQN as f64;
        let mut out = Vec::new();
        let start_tick = (beats_start * ticks_per_beat).ceil() as i64;
        let end_tick = (beats_end * ticks_per_beat).ceil() as i64;
        for _tick in start_tick..end_tick {
            for &port in &ports {
                out.push(OutgoingMidiMessage {
                    port,
                    data: [0xF8, 0, 0, 0],
                    len: 1,
                    sample_offset: 0,
                });
            }
        }
        *last = beats_end;
        out
    }
}

impl Default for ClockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts outgoing wrapped-MIDI RT events (e.g. from a MIDI-generating
/// processor) into wire-level messages for a specific output port. Port
/// assignment for a wrapped-MIDI event is carried alongside it by the
/// caller (the engine knows which processor emitted it and which output
/// port that processor is bound to); this type only does the byte framing.
pub struct OutgoingMidiForwarder;

impl OutgoingMidiForwarder {
    pub fn forward(event: &RtEvent, port: u16) -> Option<OutgoingMidiMessage> {
        use sushi_core::rt_event::RtEventKind;
        match event.kind {
            RtEventKind::WrappedMidi { bytes, len, .. } => Some(OutgoingMidiMessage {
                port,
                data: bytes,
                len,
                sample_offset: event.offset,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_emits_one_tick_per_port_per_boundary_crossed() {
        let gen = ClockGenerator::new();
        gen.set_port_enabled(0, true);
        gen.set_port_enabled(1, true);
        let messages = gen.tick(0.0, 2.0 / CLOCK_PPQN as f64);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn disabled_port_receives_no_clock() {
        let gen = ClockGenerator::new();
        let messages = gen.tick(0.0, 10.0);
        assert!(messages.is_empty());
    }
}
