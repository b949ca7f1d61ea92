//! The non-realtime, heap-allocated counterpart to [`RtEvent`].
//!
//! `ControlEvent` is posted from any non-RT thread (OSC, RPC, MIDI
//! dispatcher, file loader) into the [`crate::dispatcher::Dispatcher`]. Kinds
//! that have a realtime projection implement `to_rt_event`; the dispatcher
//! calls it once it knows the event's scheduled sample falls in the next
//! chunk (see [`crate::event_timer::EventTimer`]).

use crate::rt_event::{EventId, EventStatus, ParamId, ProcessorId, RtEvent, TrackId};

/// A parameter value of any of the kinds a processor's parameter table can
/// hold.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Data(Vec<u8>),
}

#[derive(Clone, Debug)]
pub enum EngineNotification {
    GraphChanged,
    ClipDetected { track: TrackId, channel: usize },
    TimingUpdate { cpu_load_percent: f32 },
    TransportChanged,
}

/// Work handed to the [`crate::dispatcher::Worker`] thread. The closure runs
/// off the RT thread and may block or allocate; its return value, if any, is
/// posted back to the dispatcher as the matching completion event.
pub enum AsyncWork {
    Custom(Box<dyn FnOnce() -> Option<ControlEvent> + Send>),
}

impl std::fmt::Debug for AsyncWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncWork::Custom").finish()
    }
}

/// A control-plane mutation request, the payload behind §6's controller
/// surface (create/delete track or processor, set parameter/property,
/// bypass). The engine executes these with the all-or-nothing rollback
/// policy from §7.
#[derive(Clone, Debug)]
pub enum EngineCommand {
    CreateTrack { name: String, channel_count: usize },
    DeleteTrack { track: TrackId },
    CreateProcessor { track: TrackId, uid: String },
    DeleteProcessor { processor: ProcessorId },
    SetParameter { processor: ProcessorId, param: ParamId, value: ParamValue },
    SetProperty { processor: ProcessorId, param: ParamId, value: String },
    SetBypassed { processor: ProcessorId, bypassed: bool },
}

#[derive(Debug)]
pub enum ControlEventPayload {
    Keyboard {
        processor: ProcessorId,
        note: u8,
        velocity: f32,
        note_on: bool,
    },
    ParameterChange {
        processor: ProcessorId,
        param: ParamId,
        value: ParamValue,
    },
    PropertyChange {
        processor: ProcessorId,
        param: ParamId,
        value: String,
    },
    ParameterNotification {
        processor: ProcessorId,
        param: ParamId,
        value: f32,
    },
    PropertyNotification {
        processor: ProcessorId,
        param: ParamId,
        value: String,
    },
    EngineNotification(EngineNotification),
    AsyncWorkRequest {
        event_id: EventId,
        work: AsyncWork,
    },
    AsyncWorkCompletion {
        event_id: EventId,
        status: EventStatus,
    },
    EngineCommand(EngineCommand),
}

/// Invoked exactly once per fully-handled event, per §4.3: `(status)`. The
/// opaque-argument C-callback pattern from the original is replaced with a
/// typed `FnOnce` closure, per the Design Notes async/callback guidance.
pub type CompletionCallback = Box<dyn FnOnce(EventStatus) + Send>;

#[derive(Debug)]
pub struct ControlEvent {
    pub timestamp_us: i64,
    pub payload: ControlEventPayload,
    pub completion: Option<CompletionCallback>,
}

impl ControlEvent {
    pub fn new(timestamp_us: i64, payload: ControlEventPayload) -> Self {
        Self {
            timestamp_us,
            payload,
            completion: None,
        }
    }

    pub fn with_completion(mut self, cb: CompletionCallback) -> Self {
        self.completion = Some(cb);
        self
    }

    /// Fire the completion callback exactly once, if one was attached.
    pub fn complete(mut self, status: EventStatus) {
        if let Some(cb) = self.completion.take() {
            cb(status);
        }
    }

    /// Must this event be handled off the RT thread by the worker (blocking
    /// or otherwise non-RT-safe work)?
    pub fn requires_worker(&self) -> bool {
        matches!(
            self.payload,
            ControlEventPayload::AsyncWorkRequest { .. } | ControlEventPayload::EngineCommand(_)
        )
    }

    /// Does this event have a realtime projection at all?
    pub fn maps_to_rt(&self) -> bool {
        matches!(
            self.payload,
            ControlEventPayload::Keyboard { .. }
                | ControlEventPayload::ParameterChange { .. }
                | ControlEventPayload::AsyncWorkCompletion { .. }
        )
    }

    /// Project this event onto its `RtEvent` counterpart, if it has one, at
    /// the given chunk-relative sample offset.
    pub fn to_rt_event(&self, offset: u16) -> Option<RtEvent> {
        use crate::rt_event::RtEventKind;
        match &self.payload {
            ControlEventPayload::Keyboard {
                processor,
                note,
                velocity,
                note_on,
            } => Some(RtEvent {
                offset,
                kind: if *note_on {
                    RtEventKind::NoteOn {
                        processor: *processor,
                        note: *note,
                        velocity: *velocity,
                    }
                } else {
                    RtEventKind::NoteOff {
                        processor: *processor,
                        note: *note,
                        velocity: *velocity,
                    }
                },
            }),
            ControlEventPayload::ParameterChange {
                processor,
                param,
                value,
            } => {
                let kind = match value {
                    ParamValue::Float(v) => RtEventKind::FloatParameterChange {
                        processor: *processor,
                        param: *param,
                        value: *v,
                    },
                    ParamValue::Int(v) => RtEventKind::IntParameterChange {
                        processor: *processor,
                        param: *param,
                        value: *v,
                    },
                    ParamValue::Bool(v) => RtEventKind::BoolParameterChange {
                        processor: *processor,
                        param: *param,
                        value: *v,
                    },
                    ParamValue::Data(bytes) => RtEventKind::DataParameterChange {
                        processor: *processor,
                        param: *param,
                        blob: crate::rt_event::BlobHandle::from_vec(bytes.clone()),
                    },
                };
                Some(RtEvent { offset, kind })
            }
            ControlEventPayload::AsyncWorkCompletion { event_id, status } => Some(RtEvent {
                offset,
                kind: RtEventKind::AsyncWorkCompletion {
                    event_id: *event_id,
                    status: *status,
                },
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_change_projects_to_matching_rt_kind() {
        let ev = ControlEvent::new(
            0,
            ControlEventPayload::ParameterChange {
                processor: 3,
                param: 1,
                value: ParamValue::Float(0.5),
            },
        );
        assert!(ev.maps_to_rt());
        let rt = ev.to_rt_event(10).unwrap();
        assert_eq!(rt.as_float_parameter_change(), Some((3, 1, 0.5)));
    }

    #[test]
    fn engine_notification_has_no_rt_projection() {
        let ev = ControlEvent::new(
            0,
            ControlEventPayload::EngineNotification(EngineNotification::GraphChanged),
        );
        assert!(!ev.maps_to_rt());
        assert!(ev.to_rt_event(0).is_none());
    }

    #[test]
    fn completion_fires_exactly_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let ev = ControlEvent::new(
            0,
            ControlEventPayload::EngineNotification(EngineNotification::GraphChanged),
        )
        .with_completion(Box::new(move |_status| {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        ev.complete(EventStatus::Ok);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
