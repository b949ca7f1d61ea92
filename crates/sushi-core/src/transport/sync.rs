//! Sync source and position-source state (§3, §4.5, §7 "sync loss").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Internal,
    Midi,
    Gate,
    ExternalLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    /// Beats/bar-beats are derived from sample count and tempo each chunk.
    Calculated,
    /// An authoritative external source (DAW host, MIDI clock follower)
    /// writes beats/bar-beats directly.
    External,
}

/// A tempo/position update received from an external sync source, applied
/// at the next chunk boundary.
#[derive(Debug, Clone, Copy)]
pub struct ExternalUpdate {
    pub tempo_bpm: Option<f32>,
    pub beats: Option<f64>,
}

/// Tracks how many consecutive chunks have passed without an external
/// update; once past the loss threshold the transport reverts to internal
/// sync and the engine should emit a notification (§7 "Sync loss").
#[derive(Debug)]
pub struct SyncLossDetector {
    chunks_since_update: u32,
    threshold_chunks: u32,
}

impl SyncLossDetector {
    pub fn new(threshold_chunks: u32) -> Self {
        Self {
            chunks_since_update: 0,
            threshold_chunks,
        }
    }

    pub fn note_update_received(&mut self) {
        self.chunks_since_update = 0;
    }

    /// Call once per chunk while `sync_mode != Internal`. Returns `true`
    /// the first chunk the loss threshold is crossed.
    pub fn tick(&mut self) -> bool {
        self.chunks_since_update += 1;
        self.chunks_since_update == self.threshold_chunks
    }
}

pub const DEFAULT_SYNC_LOSS_CHUNKS: u32 = 200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_loss_exactly_once_at_threshold() {
        let mut d = SyncLossDetector::new(3);
        assert!(!d.tick());
        assert!(!d.tick());
        assert!(d.tick());
        assert!(!d.tick());
    }

    #[test]
    fn update_resets_counter() {
        let mut d = SyncLossDetector::new(3);
        d.tick();
        d.tick();
        d.note_update_received();
        assert!(!d.tick());
        assert!(!d.tick());
        assert!(d.tick());
    }
}
