//! Tempo and time signature (§3 Transport).

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        debug_assert!(numerator > 0 && denominator > 0);
        Self {
            numerator,
            denominator,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

/// Bar/beat/tick musical position (the BBT the original sushi exposes
/// alongside raw beat count, used by callers such as a step-sequencer
/// plugin for sample-accurate scheduling).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBT {
    pub bar: i64,
    pub beat_in_bar: f64,
}
