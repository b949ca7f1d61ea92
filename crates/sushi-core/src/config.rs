//! Engine tunables and the configuration-document schema (§6, §9 Open
//! Question 2).
//!
//! Full JSON parsing is a control-plane concern and stays out of this crate
//! (a loader built on these types lives above it); what belongs here is the
//! schema a loader deserializes into, since §6 specifies it as part of the
//! core's embedder-visible contract, and the tunables the original hardcoded
//! as constants in `event_dispatcher.cpp`.

use serde::Deserialize;
use std::time::Duration;

/// Runtime-tunable periods and rates, all defaulted to the values the
/// original implementation hardcoded (§9 Open Question 2).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Dispatcher event-loop cadence. Default 1 ms.
    pub dispatcher_period: Duration,
    /// Worker thread cadence. Default 1 ms.
    pub worker_period: Duration,
    /// Engine CPU-load timing-update tick, run by the worker. Default 1 s.
    pub timing_update_interval: Duration,
    /// Parameter-change notification coalescing interval. Default 40 ms
    /// (25 Hz).
    pub parameter_notification_interval: Duration,
    /// Consecutive chunks without an external sync update before reverting
    /// to internal sync. Default 200 (matches
    /// [`crate::transport::DEFAULT_SYNC_LOSS_CHUNKS`]).
    pub sync_loss_chunks: u32,
    /// Minimum spacing between clip-detected notifications for the same
    /// channel. Default 1 s.
    pub clip_detection_interval: Duration,
    pub sample_rate: f64,
    pub chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatcher_period: Duration::from_millis(1),
            worker_period: Duration::from_millis(1),
            timing_update_interval: Duration::from_secs(1),
            parameter_notification_interval: Duration::from_millis(40),
            sync_loss_chunks: crate::transport::DEFAULT_SYNC_LOSS_CHUNKS,
            clip_detection_interval: Duration::from_secs(1),
            sample_rate: 48000.0,
            chunk_size: crate::AUDIO_CHUNK_SIZE,
        }
    }
}

/// Schema types for the configuration document described in §6. These carry
/// no I/O and no parser of their own; a loader built above this crate reads
/// a JSON document and `serde_json::from_str`s it into [`HostConfigDocument`],
/// then drives the engine through the same `Controller` API a test would
/// use. Unknown top-level keys are ignored, matching §6's "unknown sections
/// are ignored".
pub mod config_schema {
    use super::Deserialize;

    #[derive(Debug, Clone, Deserialize)]
    pub struct HostConfigSection {
        #[serde(default = "default_sample_rate")]
        pub samplerate: f64,
        #[serde(default)]
        pub tempo: Option<f32>,
        #[serde(default)]
        pub time_signature: Option<TimeSignatureDocument>,
        #[serde(default)]
        pub playing_mode: Option<String>,
        #[serde(default)]
        pub tempo_sync: Option<String>,
        #[serde(default)]
        pub clip_detection: Option<ClipDetectionDocument>,
        #[serde(default)]
        pub master_limiter: bool,
    }

    fn default_sample_rate() -> f64 {
        48000.0
    }

    #[derive(Debug, Clone, Copy, Deserialize)]
    pub struct TimeSignatureDocument {
        pub numerator: u32,
        pub denominator: u32,
    }

    #[derive(Debug, Clone, Copy, Default, Deserialize)]
    pub struct ClipDetectionDocument {
        #[serde(default)]
        pub inputs: bool,
        #[serde(default)]
        pub outputs: bool,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct PluginDocument {
        pub uid: String,
        #[serde(default)]
        pub name: Option<String>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ConnectionDocument {
        pub track: String,
        #[serde(default)]
        pub track_channel: usize,
        #[serde(default)]
        pub engine_channel: usize,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct TrackDocument {
        pub name: String,
        #[serde(default)]
        pub channels: Option<usize>,
        #[serde(default)]
        pub inputs: Vec<ConnectionDocument>,
        #[serde(default)]
        pub outputs: Vec<ConnectionDocument>,
        #[serde(default)]
        pub plugins: Vec<PluginDocument>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct CcMappingDocument {
        pub port: Option<u16>,
        pub channel: u8,
        pub cc_number: u8,
        pub processor: String,
        pub parameter: String,
        #[serde(default)]
        pub min_range: f32,
        #[serde(default = "default_max_range")]
        pub max_range: f32,
        #[serde(default)]
        pub mode: Option<String>,
    }

    fn default_max_range() -> f32 {
        1.0
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ProgramChangeDocument {
        pub port: u16,
        pub channel: u8,
        pub processor: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct TrackConnectionDocument {
        pub port: u16,
        pub channel: u8,
        pub track: String,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct MidiDocument {
        #[serde(default)]
        pub track_connections: Vec<TrackConnectionDocument>,
        #[serde(default)]
        pub cc_mappings: Vec<CcMappingDocument>,
        #[serde(default)]
        pub program_change_connections: Vec<ProgramChangeDocument>,
        #[serde(default)]
        pub clock_output_ports: Vec<u16>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct OscOutputDocument {
        pub processor: String,
        #[serde(default)]
        pub parameter_blocklist: Vec<String>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct OscDocument {
        #[serde(default)]
        pub outputs: Vec<OscOutputDocument>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ScheduledEventDocument {
        pub timestamp_us: i64,
        pub processor: String,
        pub parameter: String,
        pub value: f32,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ProcessorStateDocument {
        pub processor: String,
        #[serde(default)]
        pub parameters: std::collections::HashMap<String, f32>,
        #[serde(default)]
        pub properties: std::collections::HashMap<String, String>,
        #[serde(default)]
        pub bypassed: bool,
        #[serde(default)]
        pub program: Option<i32>,
    }

    /// Top-level configuration document (§6 "Configuration document"). Each
    /// section is independently optional; a loader validates and applies
    /// whichever sections are present, ignoring the rest.
    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct HostConfigDocument {
        pub host_config: Option<HostConfigSection>,
        #[serde(default)]
        pub tracks: Vec<TrackDocument>,
        pub pre_track: Option<TrackDocument>,
        pub post_track: Option<TrackDocument>,
        pub midi: Option<MidiDocument>,
        pub osc: Option<OscDocument>,
        pub cv_control: Option<serde_json::Value>,
        #[serde(default)]
        pub events: Vec<ScheduledEventDocument>,
        #[serde(default)]
        pub initial_state: Vec<ProcessorStateDocument>,
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn deserializes_minimal_document() {
            let json = r#"{
                "host_config": {"samplerate": 44100.0},
                "tracks": [{"name": "main", "channels": 2}]
            }"#;
            let doc: HostConfigDocument = serde_json::from_str(json).unwrap();
            assert_eq!(doc.host_config.unwrap().samplerate, 44100.0);
            assert_eq!(doc.tracks[0].name, "main");
        }

        #[test]
        fn unknown_top_level_keys_are_ignored() {
            let json = r#"{"tracks": [], "something_unknown": {"a": 1}}"#;
            let doc: HostConfigDocument = serde_json::from_str(json).unwrap();
            assert!(doc.tracks.is_empty());
        }
    }
}
