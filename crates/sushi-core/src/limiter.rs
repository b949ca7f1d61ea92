//! True-peak limiter: a brick-wall limiter that detects peaks at 4x
//! oversampling via a fixed polyphase FIR, with instantaneous attack and
//! exponential release (Glossary "True-peak limiter"; used as the
//! optional master stage in [`crate::track::Track`], §4.7).

/// Fixed 4-tap-per-phase windowed-sinc polyphase FIR, one phase per
/// oversampled output position. Coefficients are a small Lanczos-windowed
/// sinc kernel — enough to catch inter-sample overs without the cost of a
/// long FIR, since this only feeds peak detection, not the output signal.
const TAPS_PER_PHASE: usize = 4;
const PHASES: usize = 4;

fn polyphase_coefficients() -> [[f32; TAPS_PER_PHASE]; PHASES] {
    let mut coeffs = [[0.0f32; TAPS_PER_PHASE]; PHASES];
    for (phase, row) in coeffs.iter_mut().enumerate() {
        for (tap, c) in row.iter_mut().enumerate() {
            let center = TAPS_PER_PHASE as f32 / 2.0;
            let t = (tap as f32 - center) + phase as f32 / PHASES as f32;
            let x = std::f32::consts::PI * t;
            let sinc = if x.abs() < 1e-6 { 1.0 } else { x.sin() / x };
            let window = 0.5 + 0.5 * (std::f32::consts::PI * t / (TAPS_PER_PHASE as f32)).cos();
            *c = sinc * window;
        }
    }
    coeffs
}

struct ChannelState {
    history: [f32; TAPS_PER_PHASE],
    gain: f32,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            history: [0.0; TAPS_PER_PHASE],
            gain: 1.0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.history.rotate_left(1);
        *self.history.last_mut().unwrap() = sample;
    }

    /// True peak of the oversampled reconstruction around the most
    /// recently pushed sample.
    fn true_peak(&self, coeffs: &[[f32; TAPS_PER_PHASE]; PHASES]) -> f32 {
        let mut peak = 0.0f32;
        for phase_coeffs in coeffs {
            let interpolated: f32 = self
                .history
                .iter()
                .zip(phase_coeffs.iter())
                .map(|(s, c)| s * c)
                .sum();
            peak = peak.max(interpolated.abs());
        }
        peak
    }
}

pub struct TruePeakLimiter {
    coeffs: [[f32; TAPS_PER_PHASE]; PHASES],
    channels: Vec<ChannelState>,
    ceiling_linear: f32,
    release_coeff: f32,
}

impl TruePeakLimiter {
    /// `release_ms` sets the exponential release time constant; attack is
    /// instantaneous (gain drops immediately to meet the ceiling).
    pub fn new(sample_rate: f64, release_ms: f32, channel_count: usize) -> Self {
        let release_coeff = (-1.0 / (release_ms.max(1.0) / 1000.0 * sample_rate as f32)).exp();
        Self {
            coeffs: polyphase_coefficients(),
            channels: (0..channel_count).map(|_| ChannelState::new()).collect(),
            ceiling_linear: 1.0,
            release_coeff,
        }
    }

    pub fn set_ceiling_db(&mut self, db: f32) {
        self.ceiling_linear = 10f32.powf(db / 20.0);
    }

    /// Process `buffer` in place, one channel at a time.
    pub fn process<const N: usize>(&mut self, buffer: &mut crate::sample_buffer::SampleBuffer<N>) {
        for ch in 0..buffer.channel_count().min(self.channels.len()) {
            let state = &mut self.channels[ch];
            for sample in buffer.channel_mut(ch).iter_mut() {
                state.push(*sample);
                let peak = state.true_peak(&self.coeffs);
                let target_gain = if peak > self.ceiling_linear {
                    self.ceiling_linear / peak
                } else {
                    1.0
                };
                state.gain = if target_gain < state.gain {
                    target_gain
                } else {
                    self.release_coeff * state.gain + (1.0 - self.release_coeff) * target_gain
                };
                *sample *= state.gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_buffer::SampleBuffer;

    #[test]
    fn leaves_signal_under_ceiling_unchanged() {
        let mut limiter = TruePeakLimiter::new(48000.0, 50.0, 1);
        let mut buf = SampleBuffer::<32>::new(1);
        buf.channel_mut(0).fill(0.1);
        limiter.process(&mut buf);
        for &s in buf.channel(0) {
            assert!((s - 0.1).abs() < 0.02);
        }
    }

    #[test]
    fn clamps_output_near_ceiling_once_settled() {
        let mut limiter = TruePeakLimiter::new(48000.0, 5.0, 1);
        let mut buf = SampleBuffer::<256>::new(1);
        buf.channel_mut(0).fill(2.0);
        limiter.process(&mut buf);
        let tail = &buf.channel(0)[200..];
        for &s in tail {
            assert!(s.abs() <= 1.2, "settled sample {} exceeds ceiling margin", s);
        }
    }
}
