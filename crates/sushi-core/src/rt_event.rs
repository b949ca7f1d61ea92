//! The fixed-size, `Copy` event type that crosses the realtime boundary, and
//! the ring that carries it.
//!
//! Every [`RtEvent`] carries a sample `offset` into the current chunk plus a
//! tagged payload. Rust's enum layout cannot be pinned to the C++ original's
//! hand-packed 32-byte union bit-for-bit without an unsafe hand-rolled union,
//! which would buy nothing here — so this port keeps payload fields as small
//! as they can be (`u32` ids, `NonNull`+`u32`-len handles) to stay compact
//! and cache-line-friendly, and asserts the resulting size is still small
//! enough to pass by value through the ring without a second indirection.
//! See DESIGN.md for the tradeoff.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

pub type ProcessorId = u32;
pub type TrackId = u32;
pub type ParamId = u32;
pub type EventId = u32;

/// Status of a returnable event, reported back through its completion path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventStatus {
    Unhandled,
    Ok,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayingModeValue {
    Stopped,
    Playing,
    Recording,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncModeValue {
    Internal,
    Midi,
    Gate,
    ExternalLink,
}

/// Process-wide generator for unique ids on returnable events.
///
/// The original uses a 16-bit wrapping counter; there is no reason to keep
/// that narrow a type in Rust, and widening to `u32` makes id reuse under
/// sustained load effectively impossible.
#[derive(Default)]
pub struct EventIdGenerator {
    next: AtomicU32,
}

impl EventIdGenerator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    pub fn next(&self) -> EventId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// A non-owning handle to a heap-allocated byte blob moving across the RT
/// boundary. Reconstruct it on the non-RT side with [`BlobHandle::into_vec`]
/// via the matching `DeleteBlob` event; never free it from RT code.
#[derive(Clone, Copy, Debug)]
pub struct BlobHandle {
    ptr: NonNull<u8>,
    len: u32,
}

impl BlobHandle {
    pub fn from_vec(data: Vec<u8>) -> Self {
        let boxed = data.into_boxed_slice();
        let len = boxed.len() as u32;
        let ptr = Box::into_raw(boxed) as *mut u8;
        Self {
            ptr: NonNull::new(ptr).expect("boxed slice is never null"),
            len,
        }
    }

    /// # Safety
    /// Must be called exactly once, only from the non-RT side, only on a
    /// handle that was produced by [`BlobHandle::from_vec`] and not yet
    /// reclaimed.
    pub unsafe fn into_vec(self) -> Vec<u8> {
        let slice = std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len as usize);
        Box::into_vec(Box::from_raw(slice as *mut [u8]))
    }
}

/// Same ownership contract as [`BlobHandle`], specialized for `String`.
#[derive(Clone, Copy, Debug)]
pub struct StringHandle {
    ptr: NonNull<u8>,
    len: u32,
}

impl StringHandle {
    pub fn from_string(data: String) -> Self {
        let boxed = data.into_boxed_str().into_boxed_bytes();
        let len = boxed.len() as u32;
        let ptr = Box::into_raw(boxed) as *mut u8;
        Self {
            ptr: NonNull::new(ptr).expect("boxed str is never null"),
            len,
        }
    }

    /// # Safety
    /// Same contract as [`BlobHandle::into_vec`]; the bytes must be valid
    /// UTF-8, which holds because they were produced from a `String`.
    pub unsafe fn into_string(self) -> String {
        let slice = std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len as usize);
        let bytes = Box::into_vec(Box::from_raw(slice as *mut [u8]));
        String::from_utf8_unchecked(bytes)
    }
}

/// Type-erased handle for an arbitrary boxed value, released via a drop
/// function pointer captured at construction time.
#[derive(Clone, Copy)]
pub struct VoidHandle {
    ptr: NonNull<()>,
    drop_fn: unsafe fn(*mut ()),
}

impl std::fmt::Debug for VoidHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoidHandle").field("ptr", &self.ptr).finish()
    }
}

impl VoidHandle {
    pub fn new<T>(value: T) -> Self {
        unsafe fn drop_impl<T>(ptr: *mut ()) {
            drop(Box::from_raw(ptr as *mut T));
        }
        let ptr = Box::into_raw(Box::new(value)) as *mut ();
        Self {
            ptr: NonNull::new(ptr).expect("box is never null"),
            drop_fn: drop_impl::<T>,
        }
    }

    /// # Safety
    /// Must be called exactly once, only from the non-RT side.
    pub unsafe fn release(self) {
        (self.drop_fn)(self.ptr.as_ptr());
    }
}

macro_rules! rt_event_variants {
    ($($variant:ident { $($field:ident : $ty:ty),* $(,)? }),* $(,)?) => {
        #[derive(Clone, Copy, Debug)]
        pub enum RtEventKind {
            $($variant { $($field: $ty),* }),*
        }
    };
}

rt_event_variants! {
    NoteOn { processor: ProcessorId, note: u8, velocity: f32 },
    NoteOff { processor: ProcessorId, note: u8, velocity: f32 },
    NoteAftertouch { processor: ProcessorId, note: u8, value: f32 },
    ChannelPressure { processor: ProcessorId, value: f32 },
    PitchBend { processor: ProcessorId, value: f32 },
    Modulation { processor: ProcessorId, value: f32 },
    WrappedMidi { processor: ProcessorId, bytes: [u8; 4], len: u8 },
    FloatParameterChange { processor: ProcessorId, param: ParamId, value: f32 },
    IntParameterChange { processor: ProcessorId, param: ParamId, value: i32 },
    BoolParameterChange { processor: ProcessorId, param: ParamId, value: bool },
    DataParameterChange { processor: ProcessorId, param: ParamId, blob: BlobHandle },
    SetBypassed { processor: ProcessorId, bypassed: bool },
    AsyncWorkRequest { event_id: EventId, payload: VoidHandle },
    AsyncWorkCompletion { event_id: EventId, status: EventStatus },
    InsertProcessor { processor: ProcessorId, event_id: EventId },
    RemoveProcessor { processor: ProcessorId, event_id: EventId },
    AddTrack { track: TrackId, event_id: EventId },
    RemoveTrack { track: TrackId, event_id: EventId },
    AddProcessorToTrack { track: TrackId, processor: ProcessorId, event_id: EventId },
    RemoveProcessorFromTrack { track: TrackId, processor: ProcessorId, event_id: EventId },
    Tempo { bpm: f32 },
    TimeSignature { numerator: u32, denominator: u32 },
    PlayingMode { mode: PlayingModeValue },
    SyncMode { mode: SyncModeValue },
    CvValue { input: u8, value: f32 },
    GateEdge { input: u8, high: bool },
    SyncTick { sample_time_us: i64 },
    DeleteBlob { blob: BlobHandle },
    DeleteString { string: StringHandle },
    DeleteVoid { handle: VoidHandle },
}

/// A tagged, `Copy`, fixed-layout control message carried into or out of the
/// realtime thread, always stamped with its sample offset in the current
/// chunk.
#[derive(Clone, Copy, Debug)]
pub struct RtEvent {
    pub offset: u16,
    pub kind: RtEventKind,
}

const _SIZE_IS_COMPACT: () = assert!(std::mem::size_of::<RtEvent>() <= 48);

impl RtEvent {
    pub fn note_on(offset: u16, processor: ProcessorId, note: u8, velocity: f32) -> Self {
        Self {
            offset,
            kind: RtEventKind::NoteOn {
                processor,
                note,
                velocity,
            },
        }
    }

    pub fn note_off(offset: u16, processor: ProcessorId, note: u8, velocity: f32) -> Self {
        Self {
            offset,
            kind: RtEventKind::NoteOff {
                processor,
                note,
                velocity,
            },
        }
    }

    pub fn float_parameter_change(
        offset: u16,
        processor: ProcessorId,
        param: ParamId,
        value: f32,
    ) -> Self {
        Self {
            offset,
            kind: RtEventKind::FloatParameterChange {
                processor,
                param,
                value,
            },
        }
    }

    pub fn int_parameter_change(
        offset: u16,
        processor: ProcessorId,
        param: ParamId,
        value: i32,
    ) -> Self {
        Self {
            offset,
            kind: RtEventKind::IntParameterChange {
                processor,
                param,
                value,
            },
        }
    }

    pub fn cv_value(offset: u16, input: u8, value: f32) -> Self {
        Self {
            offset,
            kind: RtEventKind::CvValue { input, value },
        }
    }

    pub fn gate_edge(offset: u16, input: u8, high: bool) -> Self {
        Self {
            offset,
            kind: RtEventKind::GateEdge { input, high },
        }
    }

    pub fn set_bypassed(offset: u16, processor: ProcessorId, bypassed: bool) -> Self {
        Self {
            offset,
            kind: RtEventKind::SetBypassed {
                processor,
                bypassed,
            },
        }
    }

    pub fn sync_tick(offset: u16, sample_time_us: i64) -> Self {
        Self {
            offset,
            kind: RtEventKind::SyncTick { sample_time_us },
        }
    }

    /// Accessor for the `NoteOn` tag; returns `None` on any other tag.
    pub fn as_note_on(&self) -> Option<(ProcessorId, u8, f32)> {
        match self.kind {
            RtEventKind::NoteOn {
                processor,
                note,
                velocity,
            } => Some((processor, note, velocity)),
            _ => None,
        }
    }

    pub fn as_note_off(&self) -> Option<(ProcessorId, u8, f32)> {
        match self.kind {
            RtEventKind::NoteOff {
                processor,
                note,
                velocity,
            } => Some((processor, note, velocity)),
            _ => None,
        }
    }

    pub fn as_float_parameter_change(&self) -> Option<(ProcessorId, ParamId, f32)> {
        match self.kind {
            RtEventKind::FloatParameterChange {
                processor,
                param,
                value,
            } => Some((processor, param, value)),
            _ => None,
        }
    }

    pub fn as_int_parameter_change(&self) -> Option<(ProcessorId, ParamId, i32)> {
        match self.kind {
            RtEventKind::IntParameterChange {
                processor,
                param,
                value,
            } => Some((processor, param, value)),
            _ => None,
        }
    }

    pub fn as_cv_value(&self) -> Option<(u8, f32)> {
        match self.kind {
            RtEventKind::CvValue { input, value } => Some((input, value)),
            _ => None,
        }
    }

    pub fn as_gate_edge(&self) -> Option<(u8, bool)> {
        match self.kind {
            RtEventKind::GateEdge { input, high } => Some((input, high)),
            _ => None,
        }
    }

    pub fn as_set_bypassed(&self) -> Option<(ProcessorId, bool)> {
        match self.kind {
            RtEventKind::SetBypassed {
                processor,
                bypassed,
            } => Some((processor, bypassed)),
            _ => None,
        }
    }

    pub fn as_sync_tick(&self) -> Option<i64> {
        match self.kind {
            RtEventKind::SyncTick { sample_time_us } => Some(sample_time_us),
            _ => None,
        }
    }

    pub fn event_id(&self) -> Option<EventId> {
        use RtEventKind::*;
        match self.kind {
            AsyncWorkRequest { event_id, .. }
            | AsyncWorkCompletion { event_id, .. }
            | InsertProcessor { event_id, .. }
            | RemoveProcessor { event_id, .. }
            | AddTrack { event_id, .. }
            | RemoveTrack { event_id, .. }
            | AddProcessorToTrack { event_id, .. }
            | RemoveProcessorFromTrack { event_id, .. } => Some(event_id),
            _ => None,
        }
    }
}

/// Wait-free single-producer/single-consumer ring of [`RtEvent`]s.
///
/// `push` returns `false` when full (the event is dropped by the caller);
/// `pop` returns `false` when empty. No cross-producer ordering is
/// guaranteed, but within one producer events stay FIFO — that invariant
/// comes directly from `ringbuf`'s SPSC implementation.
pub struct RtEventRing {
    producer: ringbuf::HeapProd<RtEvent>,
    consumer: ringbuf::HeapCons<RtEvent>,
}

/// Default ring capacity for RT-boundary channels (spec §4.2: "~100").
pub const DEFAULT_RING_CAPACITY: usize = 128;

pub struct RtEventProducer(ringbuf::HeapProd<RtEvent>);
pub struct RtEventConsumer(ringbuf::HeapCons<RtEvent>);

impl RtEventRing {
    /// Build a producer/consumer pair with the given capacity.
    pub fn channel(capacity: usize) -> (RtEventProducer, RtEventConsumer) {
        use ringbuf::traits::Split;
        let rb = ringbuf::HeapRb::<RtEvent>::new(capacity);
        let (p, c) = rb.split();
        (RtEventProducer(p), RtEventConsumer(c))
    }
}

impl RtEventProducer {
    #[inline]
    pub fn push(&mut self, event: RtEvent) -> bool {
        use ringbuf::traits::Producer;
        self.0.try_push(event).is_ok()
    }
}

impl RtEventConsumer {
    #[inline]
    pub fn pop(&mut self) -> Option<RtEvent> {
        use ringbuf::traits::Consumer;
        self.0.try_pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessor_roundtrips_constructed_fields() {
        let e = RtEvent::note_on(12, 7, 60, 0.8);
        assert_eq!(e.as_note_on(), Some((7, 60, 0.8)));
        assert_eq!(e.as_note_off(), None);
        assert_eq!(e.offset, 12);
    }

    #[test]
    fn blob_handle_roundtrips() {
        let data = vec![1u8, 2, 3, 4, 5];
        let handle = BlobHandle::from_vec(data.clone());
        let back = unsafe { handle.into_vec() };
        assert_eq!(back, data);
    }

    #[test]
    fn void_handle_drops_exactly_once() {
        use std::sync::atomic::{AtomicUsize, Ordering as O};
        struct Counter<'a>(&'a AtomicUsize);
        impl<'a> Drop for Counter<'a> {
            fn drop(&mut self) {
                self.0.fetch_add(1, O::SeqCst);
            }
        }
        let count = AtomicUsize::new(0);
        let handle = VoidHandle::new(Counter(&count));
        assert_eq!(count.load(O::SeqCst), 0);
        unsafe { handle.release() };
        assert_eq!(count.load(O::SeqCst), 1);
    }

    #[test]
    fn ring_is_fifo_within_one_producer() {
        let (mut tx, mut rx) = RtEventRing::channel(4);
        assert!(tx.push(RtEvent::note_on(0, 1, 60, 1.0)));
        assert!(tx.push(RtEvent::note_on(1, 1, 61, 1.0)));
        assert_eq!(rx.pop().unwrap().as_note_on().unwrap().1, 60);
        assert_eq!(rx.pop().unwrap().as_note_on().unwrap().1, 61);
        assert!(rx.pop().is_none());
    }

    #[test]
    fn push_fails_when_full() {
        let (mut tx, _rx) = RtEventRing::channel(1);
        assert!(tx.push(RtEvent::note_on(0, 1, 60, 1.0)));
        assert!(!tx.push(RtEvent::note_on(1, 1, 61, 1.0)));
    }

    #[test]
    fn event_id_generator_is_unique_and_monotonic() {
        let gen = EventIdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert!(b > a);
    }
}
