//! Program-change routing (§4.8: "Routes program-change messages to a
//! processor").

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use sushi_core::rt_event::{ProcessorId, RtEvent};

/// The parameter id every processor reserves for "current program", by
/// convention (processors that don't support program changes simply never
/// register a parameter at this id, in which case the RT event is a no-op
/// at the processor's default handler).
pub const PROGRAM_PARAM_ID: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PortChannel {
    port: u16,
    channel: u8,
}

#[derive(Debug, Default, Clone)]
struct RoutingSnapshot {
    by_channel: HashMap<PortChannel, ProcessorId>,
}

/// Port/channel -> processor routing for incoming program-change messages,
/// mutated from the control plane and read through an atomic snapshot like
/// [`crate::routing::RoutingTable`].
pub struct ProgramChangeRouter {
    snapshot: ArcSwap<RoutingSnapshot>,
}

impl ProgramChangeRouter {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RoutingSnapshot::default()),
        }
    }

    pub fn route(&self, port: u16, channel: u8, processor: ProcessorId) {
        let mut next = (**self.snapshot.load()).clone();
        next.by_channel.insert(PortChannel { port, channel }, processor);
        self.snapshot.store(Arc::new(next));
    }

    pub fn unroute(&self, port: u16, channel: u8) {
        let mut next = (**self.snapshot.load()).clone();
        next.by_channel.remove(&PortChannel { port, channel });
        self.snapshot.store(Arc::new(next));
    }

    pub fn process_program_change(
        &self,
        port: u16,
        channel: u8,
        program: u8,
        offset: u16,
    ) -> Option<RtEvent> {
        let processor = self
            .snapshot
            .load()
            .by_channel
            .get(&PortChannel { port, channel })
            .copied()?;
        Some(RtEvent::int_parameter_change(
            offset,
            processor,
            PROGRAM_PARAM_ID,
            program as i32,
        ))
    }
}

impl Default for ProgramChangeRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_program_change_to_mapped_processor() {
        let router = ProgramChangeRouter::new();
        router.route(0, 2, 7);
        let ev = router.process_program_change(0, 2, 5, 0).unwrap();
        assert_eq!(ev.as_int_parameter_change(), Some((7, PROGRAM_PARAM_ID, 5)));
    }

    #[test]
    fn unmapped_channel_is_none() {
        let router = ProgramChangeRouter::new();
        assert!(router.process_program_change(0, 1, 5, 0).is_none());
    }
}
