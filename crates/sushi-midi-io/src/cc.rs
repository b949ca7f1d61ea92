//! MIDI CC -> (processor, parameter) mapping, with min/max scaling and
//! absolute/relative modes (§4.8: "Maps a MIDI CC to a registered
//! (processor, parameter) pair, applying min/max scaling and
//! absolute/relative modes").

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use sushi_core::rt_event::{ParamId, ProcessorId, RtEvent};

pub type MappingId = u32;

/// How an incoming CC value (0-127) is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcMode {
    /// The raw value maps linearly onto `[min, max]`.
    Absolute,
    /// The value is a signed offset around 64 (two's-complement style, as
    /// emitted by relative-mode MIDI controllers); it nudges the mapping's
    /// own running normalized value rather than jumping to an absolute
    /// position.
    Relative,
}

#[derive(Debug, Clone, Copy)]
pub struct CcKey {
    pub port: Option<u16>,
    pub channel: u8,
    pub cc: u8,
}

#[derive(Debug, Clone)]
pub struct CcMapping {
    pub id: MappingId,
    pub key: CcKey,
    pub processor: ProcessorId,
    pub param: ParamId,
    pub min: f32,
    pub max: f32,
    pub mode: CcMode,
}

fn key_tuple(k: &CcKey) -> (Option<u16>, u8, u8) {
    (k.port, k.channel, k.cc)
}

#[derive(Debug, Default, Clone)]
struct MappingSnapshot {
    by_key: HashMap<(Option<u16>, u8, u8), CcMapping>,
}

static NEXT_MAPPING_ID: AtomicU32 = AtomicU32::new(1);

/// CC->parameter mapping table. Mutated from the control plane
/// ("MIDI learn" and config-driven mappings), read from the RT-adjacent
/// MIDI dispatch path via an atomically swapped snapshot. Each mapping also
/// carries a running normalized value for relative mode, stored alongside
/// the snapshot rather than inside it so relative nudges don't require a
/// full snapshot replace per CC message.
pub struct CcMappingManager {
    snapshot: ArcSwap<MappingSnapshot>,
    running_normalized: parking_lot::Mutex<HashMap<MappingId, f32>>,
}

impl CcMappingManager {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(MappingSnapshot::default()),
            running_normalized: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Register a new CC mapping (control plane only). Returns the new
    /// mapping's id.
    pub fn add_mapping(
        &self,
        port: Option<u16>,
        channel: u8,
        cc: u8,
        processor: ProcessorId,
        param: ParamId,
        min: f32,
        max: f32,
        mode: CcMode,
    ) -> MappingId {
        let id = NEXT_MAPPING_ID.fetch_add(1, Ordering::Relaxed);
        let mapping = CcMapping {
            id,
            key: CcKey { port, channel, cc },
            processor,
            param,
            min,
            max,
            mode,
        };
        let mut next = (**self.snapshot.load()).clone();
        next.by_key.insert(key_tuple(&mapping.key), mapping);
        self.snapshot.store(Arc::new(next));
        self.running_normalized.lock().insert(id, 0.5);
        id
    }

    pub fn remove_mapping(&self, port: Option<u16>, channel: u8, cc: u8) {
        let mut next = (**self.snapshot.load()).clone();
        next.by_key.remove(&(port, channel, cc));
        self.snapshot.store(Arc::new(next));
    }

    /// Translate an incoming CC message into a float-parameter-change RT
    /// event, if a mapping exists. Checked against both the port-specific
    /// and the port-agnostic (`None`) key, port-specific taking priority.
    pub fn process_cc(
        &self,
        port: u16,
        channel: u8,
        cc: u8,
        value: u8,
        offset: u16,
    ) -> Option<RtEvent> {
        let snapshot = self.snapshot.load();
        let mapping = snapshot
            .by_key
            .get(&(Some(port), channel, cc))
            .or_else(|| snapshot.by_key.get(&(None, channel, cc)))?
            .clone();
        drop(snapshot);

        let normalized = match mapping.mode {
            CcMode::Absolute => value as f32 / 127.0,
            CcMode::Relative => {
                let delta = (value as i16 - 64) as f32 / 127.0;
                let mut running = self.running_normalized.lock();
                let entry = running.entry(mapping.id).or_insert(0.5);
                *entry = (*entry + delta).clamp(0.0, 1.0);
                *entry
            }
        };
        let scaled = mapping.min + normalized.clamp(0.0, 1.0) * (mapping.max - mapping.min);
        Some(RtEvent::float_parameter_change(
            offset,
            mapping.processor,
            mapping.param,
            scaled,
        ))
    }
}

impl Default for CcMappingManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_mode_scales_linearly() {
        let mgr = CcMappingManager::new();
        mgr.add_mapping(Some(0), 0, 74, 3, 1, 0.0, 100.0, CcMode::Absolute);
        let ev = mgr.process_cc(0, 0, 74, 127, 0).unwrap();
        let (_, _, value) = ev.as_float_parameter_change().unwrap();
        assert!((value - 100.0).abs() < 0.5);
    }

    #[test]
    fn relative_mode_nudges_from_center() {
        let mgr = CcMappingManager::new();
        mgr.add_mapping(Some(0), 0, 74, 3, 1, 0.0, 1.0, CcMode::Relative);
        let first = mgr.process_cc(0, 0, 74, 65, 0).unwrap();
        let (_, _, v1) = first.as_float_parameter_change().unwrap();
        let second = mgr.process_cc(0, 0, 74, 65, 0).unwrap();
        let (_, _, v2) = second.as_float_parameter_change().unwrap();
        assert!(v2 > v1, "relative nudges should accumulate upward");
    }

    #[test]
    fn unmapped_cc_is_none() {
        let mgr = CcMappingManager::new();
        assert!(mgr.process_cc(0, 0, 1, 64, 0).is_none());
    }

    #[test]
    fn port_agnostic_mapping_matches_any_port() {
        let mgr = CcMappingManager::new();
        mgr.add_mapping(None, 0, 7, 2, 0, 0.0, 1.0, CcMode::Absolute);
        assert!(mgr.process_cc(3, 0, 7, 64, 0).is_some());
        assert!(mgr.process_cc(9, 0, 7, 64, 0).is_some());
    }
}
