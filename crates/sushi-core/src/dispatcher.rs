//! Non-realtime event dispatcher, worker and parameter-change aggregator
//! (§2.6, §4.3, §5).
//!
//! The dispatcher owns the non-RT ends of the two rings crossing the RT
//! boundary plus the control-plane queue; [`Dispatcher::run_cycle`] is the
//! full body of the ~1ms event loop, separated from the thread that calls it
//! on a timer so the logic stays directly testable.

use crate::config::EngineConfig;
use crate::control_event::{ControlEvent, ControlEventPayload, EngineNotification};
use crate::event_timer::EventTimer;
use crate::rt_event::{EventStatus, ParamId, ProcessorId, RtEvent, RtEventConsumer, RtEventProducer};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub type SubscriberId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeStatus {
    Subscribed,
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeStatus {
    Unsubscribed,
    UnknownSubscriber,
}

pub type KeyboardCallback = Box<dyn Fn(ProcessorId, u8, f32, bool) + Send + Sync>;
pub type ParameterChangeCallback = Box<dyn Fn(ProcessorId, ParamId, f32) + Send + Sync>;
pub type EngineNotificationCallback = Box<dyn Fn(&EngineNotification) + Send + Sync>;

/// One subscriber list, independently lock-guarded per §4.3 "each guarded by
/// its own lock". Subscribers identify themselves by a caller-chosen id
/// (the original keyed by poster pointer identity; a Rust closure has none,
/// so the caller supplies a stable id instead).
struct SubscriberList<F> {
    subscribers: Mutex<HashMap<SubscriberId, F>>,
}

impl<F> SubscriberList<F> {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn subscribe(&self, id: SubscriberId, callback: F) -> SubscribeStatus {
        let mut subs = self.subscribers.lock();
        if subs.contains_key(&id) {
            SubscribeStatus::AlreadySubscribed
        } else {
            subs.insert(id, callback);
            SubscribeStatus::Subscribed
        }
    }

    fn unsubscribe(&self, id: SubscriberId) -> UnsubscribeStatus {
        if self.subscribers.lock().remove(&id).is_some() {
            UnsubscribeStatus::Unsubscribed
        } else {
            UnsubscribeStatus::UnknownSubscriber
        }
    }

    fn broadcast(&self, mut call: impl FnMut(&F)) {
        for callback in self.subscribers.lock().values() {
            call(callback);
        }
    }
}

/// Coalesces repeated parameter changes within one emission interval into a
/// single notification per (processor, parameter) carrying the latest value
/// (§4.3 "Parameter Manager", §8 invariant).
#[derive(Default)]
pub struct ParameterManager {
    changed: Mutex<HashMap<(ProcessorId, ParamId), f32>>,
}

impl ParameterManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_changed(&self, processor: ProcessorId, param: ParamId, value: f32) {
        self.changed.lock().insert((processor, param), value);
    }

    /// Take the full changed set and clear it, ready for the next interval.
    pub fn drain(&self) -> Vec<(ProcessorId, ParamId, f32)> {
        self.changed
            .lock()
            .drain()
            .map(|((p, q), v)| (p, q, v))
            .collect()
    }
}

/// Work posted to the [`Worker`] thread: async-work callbacks and engine
/// commands that need off-RT-thread construction (plugin instantiation,
/// blocking I/O).
pub struct Worker {
    rx: crossbeam_channel::Receiver<ControlEvent>,
    post_back: crossbeam_channel::Sender<ControlEvent>,
}

impl Worker {
    fn new(
        rx: crossbeam_channel::Receiver<ControlEvent>,
        post_back: crossbeam_channel::Sender<ControlEvent>,
    ) -> Self {
        Self { rx, post_back }
    }

    /// Drain and run every pending job. Called on the worker thread's
    /// ~1ms cadence (§5).
    pub fn process_pending(&self) {
        while let Ok(event) = self.rx.try_recv() {
            self.run(event);
        }
    }

    fn run(&self, event: ControlEvent) {
        let completion = event.completion;
        match event.payload {
            ControlEventPayload::AsyncWorkRequest { work, .. } => {
                let crate::control_event::AsyncWork::Custom(f) = work;
                let response = f();
                if let Some(cb) = completion {
                    cb(EventStatus::Ok);
                }
                if let Some(resp) = response {
                    let _ = self.post_back.send(resp);
                }
            }
            // EngineCommand construction (loading/instantiating a track or
            // processor) is handled by the Controller, which posts the
            // already-built RT events itself; by the time an EngineCommand
            // reaches the worker queue here it is only for commands whose
            // construction step genuinely blocks (left for the embedder's
            // command executor to wire in -- out of this crate's scope per
            // spec.md's plugin-ABI non-goal).
            ControlEventPayload::EngineCommand(_) => {
                if let Some(cb) = completion {
                    cb(EventStatus::Ok);
                }
            }
            _ => {
                if let Some(cb) = completion {
                    cb(EventStatus::Unhandled);
                }
            }
        }
    }
}

/// Result of one `run_cycle`, surfaced for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub rt_events_applied: usize,
    pub notifications_emitted: usize,
    pub dropped_for_ring_full: usize,
}

pub struct Dispatcher {
    control_tx: crossbeam_channel::Sender<ControlEvent>,
    control_rx: crossbeam_channel::Receiver<ControlEvent>,
    worker_tx: crossbeam_channel::Sender<ControlEvent>,
    worker_feedback_rx: crossbeam_channel::Receiver<ControlEvent>,
    rt_producer: Mutex<RtEventProducer>,
    rt_consumer: Mutex<RtEventConsumer>,
    event_timer: Mutex<EventTimer>,
    parameter_manager: ParameterManager,
    waiting: Mutex<Vec<ControlEvent>>,
    keyboard_listeners: SubscriberList<KeyboardCallback>,
    parameter_listeners: SubscriberList<ParameterChangeCallback>,
    engine_notification_listeners: SubscriberList<EngineNotificationCallback>,
    config: EngineConfig,
    last_notification_emit: Mutex<Instant>,
    next_subscriber_id: AtomicU64,
}

impl Dispatcher {
    /// Build a dispatcher plus the [`Worker`] it feeds, wired to the given
    /// RT-boundary ring halves (the engine holds the other halves).
    pub fn new(
        config: EngineConfig,
        rt_producer: RtEventProducer,
        rt_consumer: RtEventConsumer,
    ) -> (Self, Worker) {
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (worker_tx, worker_rx) = crossbeam_channel::unbounded();
        let (worker_feedback_tx, worker_feedback_rx) = crossbeam_channel::unbounded();
        let worker = Worker::new(worker_rx, worker_feedback_tx);
        let dispatcher = Self {
            control_tx,
            control_rx,
            worker_tx,
            worker_feedback_rx,
            rt_producer: Mutex::new(rt_producer),
            rt_consumer: Mutex::new(rt_consumer),
            event_timer: Mutex::new(EventTimer::new(config.sample_rate, config.chunk_size)),
            parameter_manager: ParameterManager::new(),
            waiting: Mutex::new(Vec::new()),
            keyboard_listeners: SubscriberList::new(),
            parameter_listeners: SubscriberList::new(),
            engine_notification_listeners: SubscriberList::new(),
            config,
            last_notification_emit: Mutex::new(Instant::now()),
            next_subscriber_id: AtomicU64::new(1),
        };
        (dispatcher, worker)
    }

    /// Handle usable from any control-plane thread to post an event.
    pub fn poster(&self) -> crossbeam_channel::Sender<ControlEvent> {
        self.control_tx.clone()
    }

    pub fn allocate_subscriber_id(&self) -> SubscriberId {
        self.next_subscriber_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe_keyboard(&self, id: SubscriberId, callback: KeyboardCallback) -> SubscribeStatus {
        self.keyboard_listeners.subscribe(id, callback)
    }

    pub fn unsubscribe_keyboard(&self, id: SubscriberId) -> UnsubscribeStatus {
        self.keyboard_listeners.unsubscribe(id)
    }

    pub fn subscribe_parameter_changes(
        &self,
        id: SubscriberId,
        callback: ParameterChangeCallback,
    ) -> SubscribeStatus {
        self.parameter_listeners.subscribe(id, callback)
    }

    pub fn unsubscribe_parameter_changes(&self, id: SubscriberId) -> UnsubscribeStatus {
        self.parameter_listeners.unsubscribe(id)
    }

    pub fn subscribe_engine_notifications(
        &self,
        id: SubscriberId,
        callback: EngineNotificationCallback,
    ) -> SubscribeStatus {
        self.engine_notification_listeners.subscribe(id, callback)
    }

    pub fn unsubscribe_engine_notifications(&self, id: SubscriberId) -> UnsubscribeStatus {
        self.engine_notification_listeners.unsubscribe(id)
    }

    /// Recalibrate the event timer's chunk boundary from an RT-side sync
    /// tick (§4.3 "RT-side handling").
    pub fn recalibrate(&self, chunk_start_us: i64) {
        self.event_timer.lock().recalibrate(chunk_start_us);
    }

    /// Push an already sample-accurate event straight into the non-RT->RT
    /// ring, bypassing `EventTimer`/waiting-list scheduling. Used by
    /// collaborators that already know their event's offset into the
    /// current chunk (the MIDI backend contract in §6: raw MIDI arrives
    /// with a frame offset, not a wall-clock timestamp). Returns `false`
    /// if the ring is full.
    pub fn post_rt_event(&self, event: RtEvent) -> bool {
        self.rt_producer.lock().push(event)
    }

    fn drain_rt_to_dispatcher(&self, report: &mut CycleReport) {
        while let Some(event) = self.rt_consumer.lock().pop() {
            report.rt_events_applied += 1;
            match event.kind {
                crate::rt_event::RtEventKind::FloatParameterChange { processor, param, value } => {
                    self.parameter_manager.mark_changed(processor, param, value);
                }
                crate::rt_event::RtEventKind::SyncTick { sample_time_us } => {
                    self.recalibrate(sample_time_us);
                }
                crate::rt_event::RtEventKind::AsyncWorkCompletion { status, .. } => {
                    log::debug!("async work completion returned from RT: {status:?}");
                }
                _ => {}
            }
        }
    }

    fn classify_and_handle(&self, event: ControlEvent, report: &mut CycleReport) {
        if event.requires_worker() {
            let _ = self.worker_tx.send(event);
            return;
        }

        if event.maps_to_rt() {
            let timer = self.event_timer.lock();
            let (in_chunk, offset) = timer.sample_offset_from_realtime(event.timestamp_us);
            drop(timer);
            if !in_chunk {
                self.waiting.lock().push(event);
                return;
            }
            if let Some(rt_event) = event.to_rt_event(offset as u16) {
                if self.rt_producer.lock().push(rt_event) {
                    event.complete(EventStatus::Ok);
                } else {
                    report.dropped_for_ring_full += 1;
                    log::warn!("non-RT->RT ring full, dropping event");
                    event.complete(EventStatus::Error);
                }
            }
            return;
        }

        match event.payload {
            ControlEventPayload::ParameterNotification { processor, param, value } => {
                self.parameter_listeners
                    .broadcast(|cb| cb(processor, param, value));
                event.complete(EventStatus::Ok);
            }
            ControlEventPayload::PropertyNotification { .. } => {
                event.complete(EventStatus::Ok);
            }
            ControlEventPayload::EngineNotification(ref notification) => {
                self.engine_notification_listeners.broadcast(|cb| cb(notification));
                event.complete(EventStatus::Ok);
            }
            _ => {
                event.complete(EventStatus::Unhandled);
            }
        }
    }

    /// Emit exactly one coalesced notification per changed (processor,
    /// parameter) pair accumulated since the last emission, if the interval
    /// has elapsed.
    fn maybe_emit_parameter_notifications(&self, now: Instant, report: &mut CycleReport) {
        let mut last = self.last_notification_emit.lock();
        if now.duration_since(*last) < self.config.parameter_notification_interval {
            return;
        }
        *last = now;
        drop(last);

        for (processor, param, value) in self.parameter_manager.drain() {
            self.parameter_listeners.broadcast(|cb| cb(processor, param, value));
            report.notifications_emitted += 1;
        }
    }

    /// Run the full body of one dispatcher cycle: drain the control queue,
    /// drain the RT->non-RT ring, re-evaluate the waiting list, and emit
    /// rate-limited parameter notifications (§4.3).
    pub fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        self.drain_rt_to_dispatcher(&mut report);

        while let Ok(event) = self.worker_feedback_rx.try_recv() {
            self.classify_and_handle(event, &mut report);
        }

        let waiting = std::mem::take(&mut *self.waiting.lock());
        for event in waiting {
            self.classify_and_handle(event, &mut report);
        }

        while let Ok(event) = self.control_rx.try_recv() {
            self.classify_and_handle(event, &mut report);
        }

        self.maybe_emit_parameter_notifications(Instant::now(), &mut report);
        report
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Spawn the dispatcher's periodic event loop on its own OS thread (§5: "one
/// dispatcher event-loop thread, period ~1ms"). Returns a handle whose drop
/// signals the thread to stop and joins it.
pub struct DispatcherThread {
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl DispatcherThread {
    pub fn spawn(dispatcher: std::sync::Arc<Dispatcher>) -> Self {
        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_clone = stop.clone();
        let period = dispatcher.config.dispatcher_period;
        let handle = std::thread::Builder::new()
            .name("sushi-dispatcher".into())
            .spawn(move || {
                while !stop_clone.load(Ordering::Relaxed) {
                    dispatcher.run_cycle();
                    std::thread::sleep(period);
                }
            })
            .expect("failed to spawn dispatcher thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for DispatcherThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the worker thread's periodic cadence (§5: "worker thread, ~1ms
/// cadence... runs an engine timing-update tick at ~1Hz").
pub struct WorkerThread {
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl WorkerThread {
    pub fn spawn(
        worker: Worker,
        period: Duration,
        timing_interval: Duration,
        on_timing_tick: impl Fn() + Send + 'static,
    ) -> Self {
        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_clone = stop.clone();
        let handle = std::thread::Builder::new()
            .name("sushi-worker".into())
            .spawn(move || {
                let mut last_tick = Instant::now();
                while !stop_clone.load(Ordering::Relaxed) {
                    worker.process_pending();
                    if last_tick.elapsed() >= timing_interval {
                        on_timing_tick();
                        last_tick = Instant::now();
                    }
                    std::thread::sleep(period);
                }
            })
            .expect("failed to spawn worker thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_event::ParamValue;
    use crate::rt_event::RtEventRing;

    fn test_dispatcher() -> (Dispatcher, Worker, RtEventProducer, RtEventConsumer) {
        let (non_rt_to_rt_tx, non_rt_to_rt_rx) = RtEventRing::channel(8);
        let (rt_to_non_rt_tx, rt_to_non_rt_rx) = RtEventRing::channel(8);
        let config = EngineConfig::default();
        let (dispatcher, worker) = Dispatcher::new(config, non_rt_to_rt_tx, rt_to_non_rt_rx);
        (dispatcher, worker, rt_to_non_rt_tx, non_rt_to_rt_rx)
    }

    #[test]
    fn duplicate_subscription_is_reported() {
        let (dispatcher, _worker, _p, _c) = test_dispatcher();
        let id = dispatcher.allocate_subscriber_id();
        assert_eq!(
            dispatcher.subscribe_keyboard(id, Box::new(|_, _, _, _| {})),
            SubscribeStatus::Subscribed
        );
        assert_eq!(
            dispatcher.subscribe_keyboard(id, Box::new(|_, _, _, _| {})),
            SubscribeStatus::AlreadySubscribed
        );
    }

    #[test]
    fn unknown_unsubscribe_is_reported() {
        let (dispatcher, _worker, _p, _c) = test_dispatcher();
        assert_eq!(
            dispatcher.unsubscribe_keyboard(999),
            UnsubscribeStatus::UnknownSubscriber
        );
    }

    #[test]
    fn parameter_change_maps_to_rt_event_within_chunk() {
        let (dispatcher, _worker, _p, mut rt_rx) = test_dispatcher();
        let event = ControlEvent::new(
            0,
            ControlEventPayload::ParameterChange {
                processor: 1,
                param: 2,
                value: ParamValue::Float(0.75),
            },
        );
        dispatcher.poster().send(event).unwrap();
        dispatcher.run_cycle();
        let rt = rt_rx.pop().expect("expected rt event");
        assert_eq!(rt.as_float_parameter_change(), Some((1, 2, 0.75)));
    }

    #[test]
    fn parameter_changes_coalesce_to_latest_value_per_interval() {
        let (dispatcher, _worker, _p, _c) = test_dispatcher();
        for i in 0..100 {
            dispatcher.parameter_manager.mark_changed(7, 3, i as f32);
        }
        let drained = dispatcher.parameter_manager.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0], (7, 3, 99.0));
    }

    #[test]
    fn queue_full_drop_invokes_completion_with_error() {
        let (non_rt_to_rt_tx, _non_rt_to_rt_rx) = RtEventRing::channel(1);
        let (_rt_to_non_rt_tx, rt_to_non_rt_rx) = RtEventRing::channel(1);
        let config = EngineConfig::default();
        let (dispatcher, _worker) = Dispatcher::new(config, non_rt_to_rt_tx, rt_to_non_rt_rx);

        // Fill the ring to capacity first.
        dispatcher
            .poster()
            .send(ControlEvent::new(
                0,
                ControlEventPayload::ParameterChange {
                    processor: 1,
                    param: 1,
                    value: ParamValue::Float(0.1),
                },
            ))
            .unwrap();
        dispatcher.run_cycle();

        let status = std::sync::Arc::new(std::sync::Mutex::new(None));
        let status2 = status.clone();
        dispatcher
            .poster()
            .send(
                ControlEvent::new(
                    0,
                    ControlEventPayload::ParameterChange {
                        processor: 1,
                        param: 1,
                        value: ParamValue::Float(0.2),
                    },
                )
                .with_completion(Box::new(move |s| {
                    *status2.lock().unwrap() = Some(s);
                })),
            )
            .unwrap();
        let report = dispatcher.run_cycle();
        assert_eq!(report.dropped_for_ring_full, 1);
        assert_eq!(*status.lock().unwrap(), Some(EventStatus::Error));
    }

    #[test]
    fn engine_notification_completes_and_broadcasts() {
        let (dispatcher, _worker, _p, _c) = test_dispatcher();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let id = dispatcher.allocate_subscriber_id();
        dispatcher.subscribe_engine_notifications(
            id,
            Box::new(move |n| seen2.lock().unwrap().push(format!("{n:?}"))),
        );

        let status = std::sync::Arc::new(std::sync::Mutex::new(None));
        let status2 = status.clone();
        dispatcher
            .poster()
            .send(
                ControlEvent::new(
                    0,
                    ControlEventPayload::EngineNotification(EngineNotification::GraphChanged),
                )
                .with_completion(Box::new(move |s| {
                    *status2.lock().unwrap() = Some(s);
                })),
            )
            .unwrap();
        dispatcher.run_cycle();

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(*status.lock().unwrap(), Some(EventStatus::Ok));
    }
}
