//! Simplified in-memory sample player, ported from `sample_player_plugin.cpp`.
//!
//! The original streams sample data from disk through a dedicated
//! non-realtime "butler" thread with a disk-backed voice pool; per
//! SPEC_FULL.md this port trades that for an in-memory sample table loaded
//! once (off the RT thread) and played back directly, with the same
//! note-to-pitch and velocity-to-gain behavior.

use crate::processor::{Chunk, InternalPluginBase, Processor, ProcessorCore, ProcessorStatus};
use crate::rt_event::{RtEvent, RtEventKind};

/// One loaded multi-channel sample, resident in memory for the lifetime of
/// the plugin.
#[derive(Clone)]
pub struct SampleData {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: f64,
    pub root_note: u8,
}

impl SampleData {
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    fn frame(&self, channel: usize, index: usize) -> f32 {
        self.channels
            .get(channel)
            .and_then(|c| c.get(index))
            .copied()
            .unwrap_or(0.0)
    }

    /// Linearly interpolated sample at a fractional frame position.
    fn sample_at(&self, channel: usize, position: f64) -> f32 {
        let frame_count = self.frame_count();
        if frame_count == 0 {
            return 0.0;
        }
        let index = position.floor() as usize;
        if index + 1 >= frame_count {
            return self.frame(channel, frame_count - 1);
        }
        let frac = (position - index as f64) as f32;
        let a = self.frame(channel, index);
        let b = self.frame(channel, index + 1);
        a + (b - a) * frac
    }
}

struct Voice {
    active: bool,
    note: u8,
    position: f64,
    playback_rate: f64,
    gain: f32,
}

impl Voice {
    fn idle() -> Self {
        Self {
            active: false,
            note: 0,
            position: 0.0,
            playback_rate: 1.0,
            gain: 0.0,
        }
    }
}

const MAX_VOICES: usize = 8;

/// In-memory sample-playback processor (§4.6, §8 plugin catalog).
pub struct SamplerPlugin {
    core: ProcessorCore,
    base: InternalPluginBase,
    sample: Option<SampleData>,
    voices: Vec<Voice>,
}

impl SamplerPlugin {
    pub fn new() -> Self {
        let core = ProcessorCore::new("sushi.testing.sampler");
        Self {
            core,
            base: InternalPluginBase::new(),
            sample: None,
            voices: (0..MAX_VOICES).map(|_| Voice::idle()).collect(),
        }
    }

    /// Swap in a new sample. Must be called off the RT thread; the engine
    /// hands the previous sample's memory back across the boundary via a
    /// `DeleteVoid` event rather than dropping it here.
    pub fn load_sample(&mut self, sample: SampleData) {
        self.sample = Some(sample);
    }

    pub fn has_sample(&self) -> bool {
        self.sample.is_some()
    }

    fn allocate_voice(&self) -> usize {
        self.voices
            .iter()
            .position(|v| !v.active)
            .unwrap_or(0)
    }

    fn handle_note_on(&mut self, note: u8, velocity: f32) {
        let Some(sample) = &self.sample else { return };
        let semitones = note as f64 - sample.root_note as f64;
        let playback_rate = 2f64.powf(semitones / 12.0);
        let voice_idx = self.allocate_voice();
        self.voices[voice_idx] = Voice {
            active: true,
            note,
            position: 0.0,
            playback_rate,
            gain: velocity,
        };
    }

    fn handle_note_off(&mut self, note: u8) {
        for voice in &mut self.voices {
            if voice.active && voice.note == note {
                voice.active = false;
            }
        }
    }

    pub fn drain_outgoing(&mut self) -> Vec<RtEvent> {
        self.base.drain_outgoing().collect()
    }
}

impl Default for SamplerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for SamplerPlugin {
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
            RtEventKind::NoteOn { note, velocity, .. } => self.handle_note_on(note, velocity),
            RtEventKind::NoteOff { note, .. } => self.handle_note_off(note),
            _ => {}
        }
    }

    fn process_audio(&mut self, _input: &Chunk, output: &mut Chunk) {
        output.clear();
        let Some(sample) = &self.sample else { return };
        let frame_count = sample.frame_count();
        let chunk_len = output.channel(0).len();
        let channel_count = output.channel_count().min(sample.channels.len()).max(1);

        for voice in &mut self.voices {
            if !voice.active {
                continue;
            }
            for frame in 0..chunk_len {
                if voice.position >= frame_count as f64 {
                    voice.active = false;
                    break;
                }
                for ch in 0..channel_count {
                    let s = sample.sample_at(ch, voice.position) * voice.gain;
                    output.channel_mut(ch)[frame] += s;
                }
                voice.position += voice.playback_rate;
            }
        }
    }

    fn drain_outgoing(&mut self) -> Vec<RtEvent> {
        self.base.drain_outgoing().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_second_ramp(sample_rate: f64) -> SampleData {
        let len = sample_rate as usize;
        SampleData {
            channels: vec![(0..len).map(|i| i as f32 / len as f32).collect()],
            sample_rate,
            root_note: 60,
        }
    }

    #[test]
    fn note_on_at_root_plays_back_at_unit_rate() {
        let mut plugin = SamplerPlugin::new();
        plugin.load_sample(one_second_ramp(48000.0));
        plugin.process_event(&RtEvent::note_on(0, plugin.id(), 60, 1.0));
        assert_eq!(plugin.voices[0].playback_rate, 1.0);
    }

    #[test]
    fn note_one_octave_up_doubles_playback_rate() {
        let mut plugin = SamplerPlugin::new();
        plugin.load_sample(one_second_ramp(48000.0));
        plugin.process_event(&RtEvent::note_on(0, plugin.id(), 72, 1.0));
        assert!((plugin.voices[0].playback_rate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn process_audio_without_sample_is_silent() {
        let mut plugin = SamplerPlugin::new();
        let input = Chunk::new(1);
        let mut output = Chunk::new(1);
        output.channel_mut(0).fill(1.0);
        plugin.process_audio(&input, &mut output);
        assert!(output.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn note_off_stops_the_matching_voice() {
        let mut plugin = SamplerPlugin::new();
        plugin.load_sample(one_second_ramp(48000.0));
        plugin.process_event(&RtEvent::note_on(0, plugin.id(), 60, 1.0));
        assert!(plugin.voices[0].active);
        plugin.process_event(&RtEvent::note_off(0, plugin.id(), 60, 0.0));
        assert!(!plugin.voices[0].active);
    }
}
