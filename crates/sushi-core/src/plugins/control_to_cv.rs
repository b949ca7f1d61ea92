//! Per-voice note-to-gate/CV conversion, ported from the original
//! `control_to_cv_plugin.cpp` (§8 seed test 3: note-on(60, vel=1.0) with
//! polyphony=1 yields a gate-high event on gate 0 and a CV event on the
//! pitch output with value 0.5).
//!
//! MIDI note -> CV follows the 1V/octave-style convention used by the
//! original: `cv = note / 120.0`, so note 60 (middle C) maps to 0.5 and the
//! full 0-120 note range spans 0.0-1.0.

use crate::processor::{Chunk, InternalPluginBase, Processor, ProcessorCore, ProcessorStatus};
use crate::rt_event::{RtEvent, RtEventKind};

const NOTE_TO_CV_DIVISOR: f32 = 120.0;

struct Voice {
    note: Option<u8>,
    /// Set when a retrigger's gate-low has been emitted this chunk and the
    /// matching gate-high is owed on the *next* chunk (§4.8 / Design Notes
    /// "deferred gate-high re-trigger").
    pending_retrigger_high: bool,
}

impl Voice {
    fn new() -> Self {
        Self {
            note: None,
            pending_retrigger_high: false,
        }
    }
}

/// Converts note on/off into per-voice CV (pitch) and gate RT events.
/// Voice `i` owns CV output channel `i` and gate input/output index `i`.
pub struct ControlToCvPlugin {
    core: ProcessorCore,
    base: InternalPluginBase,
    voices: Vec<Voice>,
    retrigger_enabled: bool,
    velocity_cv_enabled: bool,
}

impl ControlToCvPlugin {
    pub fn new(polyphony: usize) -> Self {
        let core = ProcessorCore::new("sushi.testing.control_to_cv");
        Self {
            core,
            base: InternalPluginBase::new(),
            voices: (0..polyphony.max(1)).map(|_| Voice::new()).collect(),
            retrigger_enabled: true,
            velocity_cv_enabled: true,
        }
    }

    pub fn set_retrigger_enabled(&mut self, enabled: bool) {
        self.retrigger_enabled = enabled;
    }

    pub fn set_velocity_cv_enabled(&mut self, enabled: bool) {
        self.velocity_cv_enabled = enabled;
    }

    /// Pick a free voice, or steal voice 0 if every voice is in use.
    fn allocate_voice(&self) -> usize {
        self.voices
            .iter()
            .position(|v| v.note.is_none())
            .unwrap_or(0)
    }

    fn voice_for_note(&self, note: u8) -> Option<usize> {
        self.voices.iter().position(|v| v.note == Some(note))
    }

    fn handle_note_on(&mut self, offset: u16, note: u8, velocity: f32) {
        let voice_idx = self.allocate_voice();
        let already_active = self.voices[voice_idx].note.is_some();
        let cv = note as f32 / NOTE_TO_CV_DIVISOR;

        self.base
            .output_event(RtEvent::cv_value(offset, voice_idx as u8, cv));
        if self.velocity_cv_enabled {
            // Velocity CV rides the next channel index, conventionally
            // `polyphony + voice_idx`.
            self.base.output_event(RtEvent::cv_value(
                offset,
                (self.voices.len() + voice_idx) as u8,
                velocity,
            ));
        }

        if already_active && self.retrigger_enabled {
            self.base
                .output_event(RtEvent::gate_edge(offset, voice_idx as u8, false));
            self.voices[voice_idx].pending_retrigger_high = true;
        } else {
            self.base
                .output_event(RtEvent::gate_edge(offset, voice_idx as u8, true));
        }
        self.voices[voice_idx].note = Some(note);
    }

    fn handle_note_off(&mut self, offset: u16, note: u8) {
        if let Some(voice_idx) = self.voice_for_note(note) {
            self.voices[voice_idx].note = None;
            self.base
                .output_event(RtEvent::gate_edge(offset, voice_idx as u8, false));
        }
    }

    /// Flush any retrigger gate-highs deferred from the previous chunk.
    fn flush_pending_retriggers(&mut self) {
        for (idx, voice) in self.voices.iter_mut().enumerate() {
            if voice.pending_retrigger_high {
                voice.pending_retrigger_high = false;
                self.base.output_event(RtEvent::gate_edge(0, idx as u8, true));
            }
        }
    }

    /// Drain the RT events this plugin queued since the last call.
    pub fn drain_outgoing(&mut self) -> Vec<RtEvent> {
        self.base.drain_outgoing().collect()
    }
}

impl Processor for ControlToCvPlugin {
    fn core(&self) -> &ProcessorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProcessorCore {
        &mut self.core
    }

    fn init(&mut self, _sample_rate: f64) -> ProcessorStatus {
        ProcessorStatus::Ok
    }

    fn process_event(&mut self, event: &RtEvent) {
        match event.kind {
            RtEventKind::NoteOn {
                note, velocity, ..
            } => self.handle_note_on(event.offset, note, velocity),
            RtEventKind::NoteOff { note, .. } => self.handle_note_off(event.offset, note),
            _ => {}
        }
    }

    fn process_audio(&mut self, input: &Chunk, output: &mut Chunk) {
        self.flush_pending_retriggers();
        output.replace_all(input);
    }

    fn drain_outgoing(&mut self) -> Vec<RtEvent> {
        self.base.drain_outgoing().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_emits_gate_high_and_pitch_cv() {
        let mut plugin = ControlToCvPlugin::new(1);
        plugin.init(48000.0);
        plugin.process_event(&RtEvent::note_on(0, plugin.id(), 60, 1.0));
        let events = plugin.drain_outgoing();

        let gate = events.iter().find_map(|e| e.as_gate_edge());
        assert_eq!(gate, Some((0, true)));

        let cv = events
            .iter()
            .filter_map(|e| e.as_cv_value())
            .find(|(ch, _)| *ch == 0);
        assert_eq!(cv, Some((0, 0.5)));
    }

    #[test]
    fn note_off_emits_gate_low() {
        let mut plugin = ControlToCvPlugin::new(1);
        plugin.process_event(&RtEvent::note_on(0, plugin.id(), 60, 1.0));
        plugin.drain_outgoing();
        plugin.process_event(&RtEvent::note_off(0, plugin.id(), 60, 0.0));
        let events = plugin.drain_outgoing();
        assert_eq!(events[0].as_gate_edge(), Some((0, false)));
    }

    #[test]
    fn retrigger_defers_gate_high_to_next_chunk() {
        let mut plugin = ControlToCvPlugin::new(1);
        plugin.process_event(&RtEvent::note_on(0, plugin.id(), 60, 1.0));
        plugin.drain_outgoing();
        // Re-trigger the same voice without an intervening note-off.
        plugin.process_event(&RtEvent::note_on(0, plugin.id(), 60, 1.0));
        let this_chunk = plugin.drain_outgoing();
        assert_eq!(this_chunk.iter().find_map(|e| e.as_gate_edge()), Some((0, false)));

        let input = Chunk::new(0);
        let mut output = Chunk::new(0);
        plugin.process_audio(&input, &mut output);
        let next_chunk = plugin.drain_outgoing();
        assert_eq!(next_chunk.iter().find_map(|e| e.as_gate_edge()), Some((0, true)));
    }
}
