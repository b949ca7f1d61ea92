//! Fluent construction of a [`Controller`] (§7).

use std::time::Duration;

use sushi_core::EngineConfig;

use crate::controller::Controller;

/// Builds an [`EngineConfig`] and the [`Controller`] wrapping it. Mirrors a
/// config loader reading `HostConfigDocument`, but for code that wants to
/// set individual fields directly instead of parsing JSON.
#[derive(Debug, Clone, Copy)]
pub struct SushiBuilder {
    config: EngineConfig,
}

impl Default for SushiBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }
}

impl SushiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    pub fn dispatcher_period(mut self, period: Duration) -> Self {
        self.config.dispatcher_period = period;
        self
    }

    pub fn worker_period(mut self, period: Duration) -> Self {
        self.config.worker_period = period;
        self
    }

    pub fn parameter_notification_interval(mut self, interval: Duration) -> Self {
        self.config.parameter_notification_interval = interval;
        self
    }

    pub fn clip_detection_interval(mut self, interval: Duration) -> Self {
        self.config.clip_detection_interval = interval;
        self
    }

    pub fn sync_loss_chunks(mut self, chunks: u32) -> Self {
        self.config.sync_loss_chunks = chunks;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(self) -> Controller {
        Controller::new(self.config)
    }
}
