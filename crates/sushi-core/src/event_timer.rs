//! Mapping between absolute control-plane time (microseconds) and a sample
//! offset within the chunk currently being assembled.
//!
//! The dispatcher recalibrates this every chunk from the RT thread's
//! [`crate::rt_event::RtEventKind::SyncTick`] event (§4.3: "a synchronization
//! RT event carries the outgoing sample time").

#[derive(Debug, Clone, Copy)]
pub struct EventTimer {
    chunk_start_us: i64,
    chunk_end_us: i64,
    sample_rate: f64,
    chunk_size: usize,
}

impl EventTimer {
    pub fn new(sample_rate: f64, chunk_size: usize) -> Self {
        let mut timer = Self {
            chunk_start_us: 0,
            chunk_end_us: 0,
            sample_rate,
            chunk_size,
        };
        timer.recalibrate(0);
        timer
    }

    /// Recalibrate to a new chunk whose first sample occurs at
    /// `chunk_start_us`.
    pub fn recalibrate(&mut self, chunk_start_us: i64) {
        self.chunk_start_us = chunk_start_us;
        let chunk_duration_us =
            (self.chunk_size as f64 / self.sample_rate * 1_000_000.0).round() as i64;
        self.chunk_end_us = chunk_start_us + chunk_duration_us;
    }

    /// Map an absolute control-plane timestamp to `(in_this_chunk, offset)`.
    ///
    /// - `t < chunk_start` clamps to `(true, 0)` — late events still render,
    ///   at the top of the chunk.
    /// - `t >= chunk_end` is `(false, _)` — stays queued for a later chunk.
    /// - otherwise, offset is rounded to the nearest sample.
    pub fn sample_offset_from_realtime(&self, t_us: i64) -> (bool, usize) {
        if t_us < self.chunk_start_us {
            return (true, 0);
        }
        if t_us >= self.chunk_end_us {
            return (false, 0);
        }
        let elapsed_us = (t_us - self.chunk_start_us) as f64;
        let offset = (elapsed_us * self.sample_rate / 1_000_000.0).round() as usize;
        (true, offset.min(self.chunk_size.saturating_sub(1)))
    }

    /// Map a chunk-relative sample offset to an absolute control-plane
    /// timestamp. Strictly monotonic in `offset` within `[0, chunk_size)`.
    pub fn real_time_from_sample_offset(&self, offset: usize) -> i64 {
        let offset_us = (offset as f64 / self.sample_rate * 1_000_000.0).round() as i64;
        self.chunk_start_us + offset_us
    }

    pub fn chunk_start_us(&self) -> i64 {
        self.chunk_start_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_chunk_clamps_to_zero() {
        let timer = EventTimer::new(48000.0, 64);
        assert_eq!(timer.sample_offset_from_realtime(-100), (true, 0));
    }

    #[test]
    fn after_chunk_is_not_in_this_chunk() {
        let timer = EventTimer::new(48000.0, 64);
        let (in_chunk, _) = timer.sample_offset_from_realtime(10_000_000);
        assert!(!in_chunk);
    }

    #[test]
    fn roundtrip_is_stable_for_all_offsets_in_chunk() {
        let timer = EventTimer::new(48000.0, 64);
        for k in 0..64usize {
            let t = timer.real_time_from_sample_offset(k);
            let (in_chunk, offset) = timer.sample_offset_from_realtime(t);
            assert!(in_chunk);
            assert_eq!(offset, k);
        }
    }

    #[test]
    fn offset_from_sample_is_monotonic() {
        let timer = EventTimer::new(48000.0, 64);
        let mut last = i64::MIN;
        for k in 0..64usize {
            let t = timer.real_time_from_sample_offset(k);
            assert!(t >= last);
            last = t;
        }
    }

    proptest::proptest! {
        /// An event never reports as "in this chunk" at a timestamp before
        /// the chunk it was recalibrated to started (§8 invariant).
        #[test]
        fn never_fires_before_chunk_start(
            chunk_start_us in 0i64..1_000_000_000,
            delta_us in -10_000i64..10_000,
        ) {
            let mut timer = EventTimer::new(48000.0, 64);
            timer.recalibrate(chunk_start_us);
            let t = chunk_start_us + delta_us;
            let (in_chunk, offset) = timer.sample_offset_from_realtime(t);
            if t < chunk_start_us {
                proptest::prop_assert!(in_chunk);
                proptest::prop_assert_eq!(offset, 0);
            }
        }

        /// Sample offsets resolved within the chunk never exceed its last
        /// valid index, for any sample rate/chunk size combination.
        #[test]
        fn offset_within_chunk_is_bounded(
            sample_rate in 8_000.0f64..192_000.0,
            chunk_size in 1usize..2048,
            elapsed_us in 0i64..100_000,
        ) {
            let timer = EventTimer::new(sample_rate, chunk_size);
            let (_, offset) = timer.sample_offset_from_realtime(elapsed_us);
            proptest::prop_assert!(offset < chunk_size);
        }
    }
}
