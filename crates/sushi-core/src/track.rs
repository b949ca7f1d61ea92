//! A track: an ordered chain of child processors, itself a [`Processor`]
//! (§3, §4.7).

use crate::limiter::TruePeakLimiter;
use crate::processor::{process_audio_bypassed, Chunk, Processor, ProcessorCore, ProcessorStatus};
use crate::rt_event::ProcessorId;
use std::time::Instant;

/// Per-channel, once-a-second clip-detection throttle (§4.7 step 3).
struct ClipThrottle {
    last_reported: Vec<Option<Instant>>,
    min_interval: std::time::Duration,
}

impl ClipThrottle {
    fn new(channels: usize, min_interval: std::time::Duration) -> Self {
        Self {
            last_reported: vec![None; channels],
            min_interval,
        }
    }

    fn resize(&mut self, channels: usize) {
        self.last_reported.resize(channels, None);
    }

    /// Returns true if a clip on `channel` should be reported now.
    fn should_report(&mut self, channel: usize, now: Instant) -> bool {
        if channel >= self.last_reported.len() {
            return false;
        }
        let fire = match self.last_reported[channel] {
            None => true,
            Some(last) => now.duration_since(last) >= self.min_interval,
        };
        if fire {
            self.last_reported[channel] = Some(now);
        }
        fire
    }
}

pub struct Track {
    core: ProcessorCore,
    /// Child processors in chain order, by id (resolved against the
    /// engine's [`crate::registry::ProcessorRegistry`] at process time —
    /// the track itself holds no `Box<dyn Processor>`, only ids, per the
    /// Design Notes "arena ownership" resolution of the cyclic
    /// track/processor reference).
    children: Vec<ProcessorId>,
    scratch_a: Chunk,
    scratch_b: Chunk,
    clip_throttle: ClipThrottle,
    limiter: Option<TruePeakLimiter>,
    /// Channels that clipped since the last [`Track::drain_clip_events`]
    /// call, already throttled to at most one report per second per
    /// channel. The engine converts these into
    /// [`crate::control_event::EngineNotification::ClipDetected`] events
    /// posted to the dispatcher -- clipping is non-RT-path information, not
    /// something that needs an `RtEvent` variant of its own.
    pub(crate) clipped_channels: Vec<usize>,
}

impl Track {
    pub fn new(name: impl Into<String>, channel_count: usize) -> Self {
        let mut core = ProcessorCore::new(name);
        core.channels.max_in = channel_count;
        core.channels.max_out = channel_count;
        core.channels.current_in = channel_count;
        core.channels.current_out = channel_count;
        Self {
            core,
            children: Vec::new(),
            scratch_a: Chunk::new(channel_count),
            scratch_b: Chunk::new(channel_count),
            clip_throttle: ClipThrottle::new(channel_count, std::time::Duration::from_secs(1)),
            limiter: None,
            clipped_channels: Vec::new(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.core.channels.current_out
    }

    pub fn children(&self) -> &[ProcessorId] {
        &self.children
    }

    pub fn enable_master_limiter(&mut self, sample_rate: f64, release_ms: f32) {
        self.limiter = Some(TruePeakLimiter::new(sample_rate, release_ms, self.channel_count()));
    }

    pub fn disable_master_limiter(&mut self) {
        self.limiter = None;
    }

    /// Append a processor id to the chain, cascading the current track
    /// channel count through it per the channel-negotiation rule in §4.7.
    /// `resulting_output_channels` is what the processor reported back
    /// from `set_input_channels` (the caller resolves the id against the
    /// registry to call that).
    pub fn add_processor(&mut self, processor: ProcessorId, resulting_output_channels: usize) {
        self.children.push(processor);
        self.resize_scratch(resulting_output_channels);
    }

    pub fn remove_processor(&mut self, processor: ProcessorId) {
        self.children.retain(|&id| id != processor);
    }

    fn resize_scratch(&mut self, channel_count: usize) {
        self.scratch_a = Chunk::new(channel_count);
        self.scratch_b = Chunk::new(channel_count);
        self.clip_throttle.resize(channel_count);
    }

    /// Run the full chain: resolve each child id against `registry`,
    /// swapping the two scratch buffers between children to avoid copies
    /// (§4.7 step 2), then clip-detect and optionally master-limit.
    pub fn process_chain(
        &mut self,
        registry: &mut crate::registry::ProcessorRegistry,
        input: &Chunk,
        output: &mut Chunk,
        now: Instant,
    ) {
        self.scratch_a.replace_all(input);
        let mut front_is_a = true;

        for &id in &self.children {
            let (src, dst) = if front_is_a {
                (&self.scratch_a, &mut self.scratch_b)
            } else {
                (&self.scratch_b, &mut self.scratch_a)
            };
            match registry.get_mut(id) {
                Some(processor) if !processor.core().enabled => continue,
                Some(processor) if processor.is_bypassed() => process_audio_bypassed(src, dst),
                Some(processor) => processor.process_audio(src, dst),
                None => process_audio_bypassed(src, dst),
            }
            front_is_a = !front_is_a;
        }

        let chained = if front_is_a {
            &self.scratch_a
        } else {
            &self.scratch_b
        };
        output.replace_all(chained);

        for ch in 0..output.channel_count() {
            if output.count_clipped_samples(ch) > 0 && self.clip_throttle.should_report(ch, now) {
                self.clipped_channels.push(ch);
            }
        }

        if let Some(limiter) = &mut self.limiter {
            limiter.process(output);
        }
    }

    /// Drain channels that clipped since the last call (already throttled
    /// to one report per second per channel).
    pub fn drain_clipped_channels(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.clipped_channels)
    }
}

impl Processor for Track {
    fn core(&self) -> &ProcessorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProcessorCore {
        &mut self.core
    }

    fn init(&mut self, _sample_rate: f64) -> ProcessorStatus {
        ProcessorStatus::Ok
    }

    fn set_input_channels(&mut self, input_channels: usize) -> usize {
        self.core.channels.current_in = input_channels;
        self.core.channels.current_out = input_channels;
        self.resize_scratch(input_channels);
        input_channels
    }

    /// A bare `Track` (used as pre/post-track) has no registry to resolve
    /// children against, so this default simply passes through; the engine
    /// calls [`Track::process_chain`] directly for tracks in the main
    /// chain, which does resolve children.
    fn process_audio(&mut self, input: &Chunk, output: &mut Chunk) {
        process_audio_bypassed(input, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_cascades_on_resize() {
        let mut track = Track::new("main", 2);
        assert_eq!(track.channel_count(), 2);
        track.set_input_channels(4);
        assert_eq!(track.channel_count(), 4);
        assert_eq!(track.scratch_a.channel_count(), 4);
    }

    #[test]
    fn empty_chain_passes_through() {
        let mut track = Track::new("main", 1);
        let mut registry = crate::registry::ProcessorRegistry::new();
        let mut input = Chunk::new(1);
        input.channel_mut(0).fill(0.5);
        let mut output = Chunk::new(1);
        track.process_chain(&mut registry, &input, &mut output, Instant::now());
        assert_eq!(output.channel(0), input.channel(0));
    }
}
