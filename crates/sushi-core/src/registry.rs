//! Processor arena and the side-channel that carries heavy graph-mutation
//! payloads across the RT boundary (§4.2, §4.6, §4.7).
//!
//! [`RtEvent::InsertProcessor`]/`RemoveProcessor` carry only a
//! [`ProcessorId`] plus an `event_id` — they stay `Copy` and fit the ring.
//! The actual `Box<dyn Processor>` a non-RT caller wants inserted travels
//! over a separate, unbounded [`crossbeam_channel`] queue keyed by the same
//! id; the RT thread pulls the boxed value out of the registry's pending
//! slot by id when it drains the matching `InsertProcessor` event, so no
//! allocation or boxed trait object ever rides the RT event ring itself.

use crate::processor::Processor;
use crate::rt_event::ProcessorId;
use std::collections::HashMap;

/// One pending insert: a processor boxed on the non-RT side, waiting to be
/// claimed from the RT thread.
pub struct PendingInsert {
    pub processor_id: ProcessorId,
    pub processor: Box<dyn Processor>,
}

/// Non-RT-side sender for processors awaiting insertion.
#[derive(Clone)]
pub struct InsertSender(crossbeam_channel::Sender<PendingInsert>);

/// RT-side receiver; `try_recv` never blocks.
pub struct InsertReceiver(crossbeam_channel::Receiver<PendingInsert>);

pub fn insert_channel() -> (InsertSender, InsertReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (InsertSender(tx), InsertReceiver(rx))
}

/// Non-RT-side receiver for processors the RT thread has removed from the
/// graph, handed back for a clean drop off the audio thread.
#[derive(Clone)]
pub struct RemovalSender(crossbeam_channel::Sender<Box<dyn Processor>>);

pub struct RemovalReceiver(crossbeam_channel::Receiver<Box<dyn Processor>>);

pub fn removal_channel() -> (RemovalSender, RemovalReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (RemovalSender(tx), RemovalReceiver(rx))
}

impl RemovalSender {
    /// Never blocks; called from the RT thread after `RemoveProcessor`.
    pub fn send(&self, processor: Box<dyn Processor>) {
        let _ = self.0.send(processor);
    }
}

impl RemovalReceiver {
    pub fn drain_pending(&self) -> Vec<Box<dyn Processor>> {
        self.0.try_iter().collect()
    }
}

impl InsertSender {
    pub fn send(&self, processor_id: ProcessorId, processor: Box<dyn Processor>) {
        let _ = self.0.send(PendingInsert {
            processor_id,
            processor,
        });
    }
}

impl InsertReceiver {
    /// Pull every processor that has arrived since the last drain. Called
    /// from the RT thread before draining `InsertProcessor` events, never
    /// blocks.
    pub fn drain_pending(&self) -> Vec<PendingInsert> {
        self.0.try_iter().collect()
    }
}

/// Owning arena of live processors, indexed by id. Lives on the RT thread;
/// insertion/removal is driven by RT events plus the [`InsertReceiver`]
/// side channel, never by a lock.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<ProcessorId, Box<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: ProcessorId, processor: Box<dyn Processor>) {
        self.processors.insert(id, processor);
    }

    /// Remove and return ownership, so the caller can hand it back to the
    /// non-RT side for a clean drop (dropping a plugin with heap state on
    /// the RT thread is still technically safe in Rust but is avoided here
    /// to keep deallocation off the audio thread).
    pub fn remove(&mut self, id: ProcessorId) -> Option<Box<dyn Processor>> {
        self.processors.remove(&id)
    }

    pub fn get(&self, id: ProcessorId) -> Option<&dyn Processor> {
        self.processors.get(&id).map(|p| p.as_ref())
    }

    pub fn get_mut(&mut self, id: ProcessorId) -> Option<&mut Box<dyn Processor>> {
        self.processors.get_mut(&id)
    }

    /// Every live processor, for broadcast-style events (CV/gate hardware
    /// input) that have no single addressed recipient.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Processor>> {
        self.processors.values_mut()
    }

    pub fn contains(&self, id: ProcessorId) -> bool {
        self.processors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{Chunk, ProcessorCore, ProcessorStatus};

    struct Dummy(ProcessorCore);
    impl Processor for Dummy {
        fn core(&self) -> &ProcessorCore {
            &self.0
        }
        fn core_mut(&mut self) -> &mut ProcessorCore {
            &mut self.0
        }
        fn init(&mut self, _sample_rate: f64) -> ProcessorStatus {
            ProcessorStatus::Ok
        }
        fn process_audio(&mut self, input: &Chunk, output: &mut Chunk) {
            output.replace_all(input);
        }
    }

    #[test]
    fn pending_insert_crosses_side_channel() {
        let (tx, rx) = insert_channel();
        let core = ProcessorCore::new("dummy");
        let id = core.id;
        tx.send(id, Box::new(Dummy(core)));
        let pending = rx.drain_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].processor_id, id);
    }

    #[test]
    fn registry_insert_remove_roundtrip() {
        let mut registry = ProcessorRegistry::new();
        let core = ProcessorCore::new("dummy");
        let id = core.id;
        registry.insert(id, Box::new(Dummy(core)));
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
        let removed = registry.remove(id);
        assert!(removed.is_some());
        assert!(!registry.contains(id));
    }
}
