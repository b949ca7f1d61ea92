//! Transport: clock and musical-position authority (§3, §4.5).

use super::fsm::{PlayingMode, PlayingModeFsm, StateChange};
use super::sync::{ExternalUpdate, PositionSource, SyncLossDetector, SyncMode, DEFAULT_SYNC_LOSS_CHUNKS};
use super::tempo_map::TimeSignature;

/// Result of advancing the transport by one chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportTick {
    pub state_change: StateChange,
    pub sync_lost: bool,
}

pub struct TransportManager {
    sample_rate: f64,
    chunk_size: usize,
    samples_since_start: u64,
    tempo_bpm: f32,
    time_signature: TimeSignature,
    fsm: PlayingModeFsm,
    sync_mode: SyncMode,
    position_source: PositionSource,
    /// Beats at the start of the current chunk.
    beats: f64,
    bar: i64,
    pending_external: Option<ExternalUpdate>,
    loss_detector: SyncLossDetector,
}

impl TransportManager {
    pub fn new(sample_rate: f64, chunk_size: usize) -> Self {
        Self {
            sample_rate,
            chunk_size,
            samples_since_start: 0,
            tempo_bpm: 120.0,
            time_signature: TimeSignature::default(),
            fsm: PlayingModeFsm::new(),
            sync_mode: SyncMode::Internal,
            position_source: PositionSource::Calculated,
            beats: 0.0,
            bar: 0,
            pending_external: None,
            loss_detector: SyncLossDetector::new(DEFAULT_SYNC_LOSS_CHUNKS),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn samples_since_start(&self) -> u64 {
        self.samples_since_start
    }

    pub fn tempo(&self) -> f32 {
        self.tempo_bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn playing_mode(&self) -> PlayingMode {
        self.fsm.current()
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn position_source(&self) -> PositionSource {
        self.position_source
    }

    pub fn set_tempo(&mut self, bpm: f32) {
        if bpm > 0.0 {
            self.tempo_bpm = bpm;
        }
    }

    pub fn set_time_signature(&mut self, numerator: u32, denominator: u32) {
        self.time_signature = TimeSignature::new(numerator, denominator);
    }

    pub fn set_playing_mode(&mut self, mode: PlayingMode) {
        self.fsm.request(mode);
    }

    pub fn set_sync_mode(&mut self, mode: SyncMode) {
        self.sync_mode = mode;
    }

    pub fn set_position_source(&mut self, source: PositionSource) {
        self.position_source = source;
    }

    /// Host-driven beat override. Per §6, only honored when
    /// `position_source == External`; otherwise it is a documented no-op.
    pub fn set_current_beats(&mut self, beats: f64) {
        if self.position_source == PositionSource::External {
            self.beats = beats;
        } else {
            log::debug!("set_current_beats ignored: position_source is Calculated");
        }
    }

    pub fn set_current_bar_beats(&mut self, bar: i64, beat_in_bar: f64) {
        if self.position_source == PositionSource::External {
            self.bar = bar;
            self.beats = bar as f64 * self.time_signature.numerator as f64 + beat_in_bar;
        } else {
            log::debug!("set_current_bar_beats ignored: position_source is Calculated");
        }
    }

    /// Feed an external tempo/position update (MIDI clock, Ableton Link...).
    /// Resets the sync-loss counter.
    pub fn receive_external_update(&mut self, update: ExternalUpdate) {
        self.pending_external = Some(update);
        self.loss_detector.note_update_received();
    }

    /// Advance the transport by one chunk. Must be called exactly once per
    /// chunk, at the chunk boundary.
    pub fn advance(&mut self) -> TransportTick {
        self.samples_since_start += self.chunk_size as u64;
        let state_change = self.fsm.advance();

        if let Some(update) = self.pending_external.take() {
            if let Some(bpm) = update.tempo_bpm {
                self.set_tempo(bpm);
            }
            if let Some(beats) = update.beats {
                self.beats = beats;
            }
        }

        let mut sync_lost = false;
        if self.sync_mode != SyncMode::Internal {
            if self.loss_detector.tick() {
                self.sync_mode = SyncMode::Internal;
                sync_lost = true;
                log::warn!("external sync lost, reverting to internal");
            }
        }

        if self.fsm.current().is_rolling() && self.position_source == PositionSource::Calculated {
            let beats_per_chunk =
                (self.chunk_size as f64 / self.sample_rate) * (self.tempo_bpm as f64 / 60.0);
            self.beats += beats_per_chunk;
        }
        self.bar = (self.beats / self.time_signature.numerator as f64).floor() as i64;

        TransportTick {
            state_change,
            sync_lost,
        }
    }

    fn beats_per_sample(&self) -> f64 {
        self.tempo_bpm as f64 / 60.0 / self.sample_rate
    }

    /// Beats elapsed, interpolated to `offset` samples into the current
    /// chunk.
    pub fn current_beats(&self, offset: usize) -> f64 {
        if self.fsm.current().is_rolling() && self.position_source == PositionSource::Calculated {
            self.beats + offset as f64 * self.beats_per_sample()
        } else {
            self.beats
        }
    }

    /// Position within the bar (`[0, numerator)`), interpolated to `offset`
    /// samples into the current chunk.
    pub fn current_bar_beats(&self, offset: usize) -> f64 {
        let numerator = self.time_signature.numerator as f64;
        self.current_beats(offset).rem_euclid(numerator)
    }

    pub fn current_bar(&self) -> i64 {
        self.bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beats_monotonic_while_playing() {
        let mut t = TransportManager::new(48000.0, 64);
        t.set_tempo(120.0);
        t.set_playing_mode(PlayingMode::Playing);
        t.advance(); // consume Starting
        let mut last = t.current_beats(0);
        for _ in 0..500 {
            t.advance();
            let now = t.current_beats(0);
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn bar_beats_stays_in_range() {
        let mut t = TransportManager::new(48000.0, 64);
        t.set_tempo(300.0);
        t.set_time_signature(4, 4);
        t.set_playing_mode(PlayingMode::Playing);
        t.advance();
        for _ in 0..5000 {
            t.advance();
            let bb = t.current_bar_beats(0);
            assert!(bb >= 0.0 && bb < 4.0);
        }
    }

    #[test]
    fn matches_formula_over_many_chunks() {
        // spec.md seed test 6 asserts 256.0 beats after 2000 chunks at
        // 120bpm/48kHz/chunk=64, but chunk_size*tempo/(60*sample_rate) over
        // 2000 chunks yields ~5.33 beats with those parameters — the
        // figures in the spec are mutually inconsistent (128s of playback
        // would take ~96000 chunks at this tempo/rate to reach 256 beats).
        // Verify the documented formula directly rather than the
        // inconsistent literal.
        let mut t = TransportManager::new(48000.0, 64);
        t.set_tempo(120.0);
        t.set_playing_mode(PlayingMode::Playing);
        t.advance();
        for _ in 0..2000 {
            t.advance();
        }
        let beats_per_chunk = (64.0 / 48000.0) * (120.0 / 60.0);
        let expected = 2000.0 * beats_per_chunk;
        assert!((t.current_beats(0) - expected).abs() < beats_per_chunk);
    }

    #[test]
    fn external_position_source_ignores_calculated_advance() {
        let mut t = TransportManager::new(48000.0, 64);
        t.set_position_source(PositionSource::External);
        t.set_playing_mode(PlayingMode::Playing);
        t.advance();
        t.set_current_beats(42.0);
        t.advance();
        assert_eq!(t.current_beats(0), 42.0);
    }

    #[test]
    fn sync_loss_reverts_to_internal_and_reports_once() {
        let mut t = TransportManager::new(48000.0, 64);
        t.set_sync_mode(SyncMode::Midi);
        let mut lost_count = 0;
        for _ in 0..(DEFAULT_SYNC_LOSS_CHUNKS + 5) {
            if t.advance().sync_lost {
                lost_count += 1;
            }
        }
        assert_eq!(lost_count, 1);
        assert_eq!(t.sync_mode(), SyncMode::Internal);
    }

    proptest::proptest! {
        /// Beat position never moves backwards while rolling, for any
        /// positive tempo (§8 invariant).
        #[test]
        fn beats_never_decrease_while_playing(bpm in 1.0f32..999.0, chunks in 1u32..200) {
            let mut t = TransportManager::new(48000.0, 64);
            t.set_tempo(bpm);
            t.set_playing_mode(PlayingMode::Playing);
            t.advance();
            let mut last = t.current_beats(0);
            for _ in 0..chunks {
                t.advance();
                let now = t.current_beats(0);
                proptest::prop_assert!(now >= last);
                last = now;
            }
        }

        /// Position within the bar always stays in `[0, numerator)`.
        #[test]
        fn bar_beats_always_in_range(bpm in 1.0f32..999.0, numerator in 1u32..16, chunks in 1u32..500) {
            let mut t = TransportManager::new(48000.0, 64);
            t.set_tempo(bpm);
            t.set_time_signature(numerator, 4);
            t.set_playing_mode(PlayingMode::Playing);
            t.advance();
            for _ in 0..chunks {
                t.advance();
                let bb = t.current_bar_beats(0);
                proptest::prop_assert!(bb >= 0.0 && bb < numerator as f64);
            }
        }
    }
}
