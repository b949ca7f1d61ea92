//! The engine: orders the audio graph and drives it through one chunk
//! (§3 "Audio Graph", §4.7), and the consolidated realtime controller
//! surface an embedder calls from its audio callback.

use crate::config::EngineConfig;
use crate::processor::{Chunk, Processor};
use crate::registry::{
    removal_channel, InsertReceiver, ProcessorRegistry, RemovalReceiver, RemovalSender,
};
use crate::rt_event::{
    EventStatus, PlayingModeValue, ProcessorId, RtEvent, RtEventConsumer, RtEventKind,
    RtEventProducer, SyncModeValue, TrackId,
};
use crate::track::Track;
use crate::transport::{PlayingMode, SyncMode, TransportManager};
use std::time::Instant;

/// One track plus its engine-channel <-> track-channel routing (§3 Track:
/// "audio input connections... and output connections"). An empty mapping
/// falls back to a straight identity mapping over `min(engine, track)`
/// channels, which covers the common mono/stereo case; explicit pairs
/// describe bus-level routing.
pub struct TrackSlot {
    pub track: Track,
    pub input_connections: Vec<(usize, usize)>,
    pub output_connections: Vec<(usize, usize)>,
    /// Pre-allocated per-chunk scratch for [`TrackSlot::route_input`]/
    /// [`TrackSlot::route_output`], sized off the RT thread at construction
    /// (and by [`TrackSlot::resize_io`] if the track's channel count ever
    /// changes). `Engine::process_audio` only clears and reuses these —
    /// never allocates, matching `Track`'s own `scratch_a`/`scratch_b`.
    input_buf: Chunk,
    output_buf: Chunk,
}

impl TrackSlot {
    pub fn new(track: Track) -> Self {
        let channel_count = track.channel_count();
        Self {
            track,
            input_connections: Vec::new(),
            output_connections: Vec::new(),
            input_buf: Chunk::new(channel_count),
            output_buf: Chunk::new(channel_count),
        }
    }

    pub fn with_connections(
        mut self,
        input_connections: Vec<(usize, usize)>,
        output_connections: Vec<(usize, usize)>,
    ) -> Self {
        self.input_connections = input_connections;
        self.output_connections = output_connections;
        self
    }

    /// Reallocate the routing scratch buffers to match the track's current
    /// channel count. Must be called off the RT thread, exactly like
    /// `Track::resize_scratch`.
    pub fn resize_io(&mut self, channel_count: usize) {
        self.input_buf = Chunk::new(channel_count);
        self.output_buf = Chunk::new(channel_count);
    }

    /// Associated function rather than a `&self` method: called with
    /// `&slot.input_connections`/`&mut slot.input_buf` as disjoint field
    /// borrows of the same `TrackSlot`, which a `&self` receiver (borrowing
    /// the whole slot) would not allow alongside a `&mut` field argument.
    fn route_input(connections: &[(usize, usize)], engine_input: &Chunk, track_input: &mut Chunk) {
        track_input.clear();
        if connections.is_empty() {
            let n = engine_input.channel_count().min(track_input.channel_count());
            for ch in 0..n {
                track_input.replace(ch, engine_input, ch);
            }
            return;
        }
        for &(engine_ch, track_ch) in connections {
            if engine_ch < engine_input.channel_count() && track_ch < track_input.channel_count() {
                let src = engine_input.channel(engine_ch);
                let dst = track_input.channel_mut(track_ch);
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += *s;
                }
            }
        }
    }

    fn route_output(connections: &[(usize, usize)], track_output: &Chunk, engine_output: &mut Chunk) {
        if connections.is_empty() {
            let n = track_output.channel_count().min(engine_output.channel_count());
            for ch in 0..n {
                let src = track_output.channel(ch);
                let dst = engine_output.channel_mut(ch);
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += *s;
                }
            }
            return;
        }
        for &(engine_ch, track_ch) in connections {
            if track_ch < track_output.channel_count() && engine_ch < engine_output.channel_count() {
                let src = track_output.channel(track_ch);
                let dst = engine_output.channel_mut(engine_ch);
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += *s;
                }
            }
        }
    }
}

/// A track awaiting insertion, built off the RT thread and claimed by id
/// from `AddTrack` the same way [`crate::registry::InsertReceiver`] hands
/// processors across.
pub struct PendingTrack {
    pub track_id: TrackId,
    pub slot: TrackSlot,
}

#[derive(Clone)]
pub struct TrackInsertSender(crossbeam_channel::Sender<PendingTrack>);
pub struct TrackInsertReceiver(crossbeam_channel::Receiver<PendingTrack>);

pub fn track_insert_channel() -> (TrackInsertSender, TrackInsertReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (TrackInsertSender(tx), TrackInsertReceiver(rx))
}

impl TrackInsertSender {
    pub fn send(&self, track_id: TrackId, slot: TrackSlot) {
        let _ = self.0.send(PendingTrack { track_id, slot });
    }
}

impl TrackInsertReceiver {
    fn drain_pending(&self) -> Vec<PendingTrack> {
        self.0.try_iter().collect()
    }
}

/// The single consolidated realtime controller surface (§9 Open Question:
/// the original exposes two overlapping interfaces, `rt_controller.h` and
/// `real_time_controller.h`, differing only in whether `process_audio`
/// takes an explicit sample count and in the naming of the transport
/// setters). This picks one signature, resolved in full in SPEC_FULL.md
/// §D: `sample_count` collapses into `Chunk`'s const generic, and the
/// transport setters are spelled `set_current_beats`/`set_current_bar_beats`.
///
/// Every method here is called only from the single realtime thread that
/// owns the `Engine`, so `&mut self` is sufficient — nothing here needs
/// interior mutability for thread-safety, only for the audio callback's own
/// call sequencing.
pub trait RtController {
    fn process_audio(&mut self, input: &Chunk, output: &mut Chunk, timestamp_us: i64);
    fn set_tempo(&mut self, bpm: f32);
    fn set_time_signature(&mut self, numerator: u32, denominator: u32);
    fn set_playing_mode(&mut self, mode: PlayingMode);
    fn set_current_beats(&mut self, beats: f64);
    fn set_current_bar_beats(&mut self, bar: i64, beat_in_bar: f64);
}

fn sync_mode_value(mode: SyncModeValue) -> SyncMode {
    match mode {
        SyncModeValue::Internal => SyncMode::Internal,
        SyncModeValue::Midi => SyncMode::Midi,
        SyncModeValue::Gate => SyncMode::Gate,
        SyncModeValue::ExternalLink => SyncMode::ExternalLink,
    }
}

fn playing_mode_value(mode: PlayingModeValue) -> PlayingMode {
    match mode {
        PlayingModeValue::Stopped => PlayingMode::Stopped,
        PlayingModeValue::Playing => PlayingMode::Playing,
        PlayingModeValue::Recording => PlayingMode::Recording,
    }
}

/// One clip-detected report, handed to the non-RT side through
/// [`ClipEventConsumer`]. Kept tiny and `Copy` so it can ride the same
/// wait-free ring discipline as [`RtEvent`] rather than a channel that
/// might allocate under load.
#[derive(Clone, Copy, Debug)]
pub struct ClipEvent {
    pub track: TrackId,
    pub channel: u8,
}

pub struct ClipEventProducer(ringbuf::HeapProd<ClipEvent>);
pub struct ClipEventConsumer(ringbuf::HeapCons<ClipEvent>);

pub fn clip_event_channel(capacity: usize) -> (ClipEventProducer, ClipEventConsumer) {
    use ringbuf::traits::Split;
    let rb = ringbuf::HeapRb::<ClipEvent>::new(capacity);
    let (p, c) = rb.split();
    (ClipEventProducer(p), ClipEventConsumer(c))
}

impl ClipEventConsumer {
    pub fn pop(&mut self) -> Option<ClipEvent> {
        use ringbuf::traits::Consumer;
        self.0.try_pop()
    }
}

/// Owns the audio graph and transport, and implements [`RtController`] —
/// the type an embedder's audio callback drives directly. Everything here
/// runs on the realtime thread; graph mutation arrives pre-built from the
/// non-RT side over the insert/removal side channels and is only spliced
/// into the live graph here, in response to the matching [`RtEvent`]
/// (§5 "mutated only from the RT thread in response to insert/remove RT
/// events").
pub struct Engine {
    transport: TransportManager,
    registry: ProcessorRegistry,
    processor_insert_rx: InsertReceiver,
    processor_removal_tx: RemovalSender,
    track_insert_rx: TrackInsertReceiver,
    tracks: Vec<TrackSlot>,
    pre_track: Option<Track>,
    post_track: Option<Track>,
    rt_consumer: RtEventConsumer,
    rt_producer: RtEventProducer,
    clip_producer: ClipEventProducer,
    realtime: bool,
    sample_rate: f64,
    scratch: Chunk,
}

/// Everything the non-RT side needs to drive and mutate an [`Engine`]: the
/// processor/track insert senders and the two ends of the RT boundary the
/// [`crate::dispatcher::Dispatcher`] does not itself own.
pub struct EngineHandles {
    pub processor_removal_rx: RemovalReceiver,
    pub track_insert_tx: TrackInsertSender,
    pub clip_consumer: ClipEventConsumer,
}

impl Engine {
    /// Build an engine wired to the given RT-boundary ring halves (the
    /// matching halves live in the [`crate::dispatcher::Dispatcher`]) and
    /// the processor-insert side channel (the matching sender is handed to
    /// whichever non-RT component constructs processors, e.g. an
    /// `EngineBuilder`).
    pub fn new(
        config: &EngineConfig,
        rt_consumer: RtEventConsumer,
        rt_producer: RtEventProducer,
        processor_insert_rx: InsertReceiver,
    ) -> (Self, EngineHandles) {
        let (processor_removal_tx, processor_removal_rx) = removal_channel();
        let (track_insert_tx, track_insert_rx) = track_insert_channel();
        let (clip_producer, clip_consumer) = clip_event_channel(64);
        let engine = Self {
            transport: TransportManager::new(config.sample_rate, config.chunk_size),
            registry: ProcessorRegistry::new(),
            processor_insert_rx,
            processor_removal_tx,
            track_insert_rx,
            tracks: Vec::new(),
            pre_track: None,
            post_track: None,
            rt_consumer,
            rt_producer,
            clip_producer,
            realtime: true,
            sample_rate: config.sample_rate,
            scratch: Chunk::new(2),
        };
        let handles = EngineHandles {
            processor_removal_rx,
            track_insert_tx,
            clip_consumer,
        };
        (engine, handles)
    }

    pub fn set_realtime(&mut self, realtime: bool) {
        self.realtime = realtime;
    }

    pub fn is_realtime(&self) -> bool {
        self.realtime
    }

    /// Drop every event still queued on the non-RT->RT ring without acting
    /// on it. Used when switching into offline/non-realtime rendering,
    /// where the embedder drives `process_audio` faster than real time and
    /// does not want stale control-plane events from a previous session
    /// applied mid-render.
    pub fn clear_rt_queues(&mut self) {
        while self.rt_consumer.pop().is_some() {}
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProcessorRegistry {
        &mut self.registry
    }

    pub fn tracks(&self) -> &[TrackSlot] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks
            .iter()
            .map(|slot| &slot.track)
            .find(|t| t.id() == id)
    }

    pub fn transport(&self) -> &TransportManager {
        &self.transport
    }

    pub fn enable_pre_track(&mut self, channel_count: usize) {
        self.pre_track = Some(Track::new("pre_track", channel_count));
    }

    pub fn enable_post_track(&mut self, channel_count: usize) {
        self.post_track = Some(Track::new("post_track", channel_count));
    }

    pub fn pre_track_mut(&mut self) -> Option<&mut Track> {
        self.pre_track.as_mut()
    }

    pub fn post_track_mut(&mut self) -> Option<&mut Track> {
        self.post_track.as_mut()
    }

    /// Resolve `id` against the pre/post-track slots, the ordered tracks,
    /// then the processor registry, in that order — a track is itself a
    /// [`Processor`] and is addressable by id the same way a plain
    /// processor is (§3).
    fn processor_mut(&mut self, id: ProcessorId) -> Option<&mut dyn Processor> {
        if let Some(pre) = &mut self.pre_track {
            if pre.id() == id {
                return Some(pre as &mut dyn Processor);
            }
        }
        if let Some(post) = &mut self.post_track {
            if post.id() == id {
                return Some(post as &mut dyn Processor);
            }
        }
        if let Some(slot) = self.tracks.iter_mut().find(|slot| slot.track.id() == id) {
            return Some(&mut slot.track as &mut dyn Processor);
        }
        self.registry.get_mut(id).map(|p| p.as_mut())
    }

    fn complete(&mut self, event_id: crate::rt_event::EventId, status: EventStatus) {
        self.rt_producer
            .push(RtEvent::from_kind(RtEventKind::AsyncWorkCompletion { event_id, status }));
    }

    /// Apply every control/mutation event waiting on the non-RT->RT ring.
    /// Runs once per chunk, before the graph is processed (§4.7 step 1).
    fn drain_control_events(&mut self) {
        while let Some(event) = self.rt_consumer.pop() {
            match event.kind {
                RtEventKind::Tempo { bpm } => self.transport.set_tempo(bpm),
                RtEventKind::TimeSignature { numerator, denominator } => {
                    self.transport.set_time_signature(numerator, denominator)
                }
                RtEventKind::PlayingMode { mode } => {
                    self.transport.set_playing_mode(playing_mode_value(mode))
                }
                RtEventKind::SyncMode { mode } => self.transport.set_sync_mode(sync_mode_value(mode)),

                RtEventKind::InsertProcessor { event_id, .. } => {
                    for pending in self.processor_insert_rx.drain_pending() {
                        self.registry.insert(pending.processor_id, pending.processor);
                    }
                    self.complete(event_id, EventStatus::Ok);
                }
                RtEventKind::RemoveProcessor { processor, event_id } => {
                    for slot in &mut self.tracks {
                        slot.track.remove_processor(processor);
                    }
                    match self.registry.remove(processor) {
                        Some(removed) => {
                            self.processor_removal_tx.send(removed);
                            self.complete(event_id, EventStatus::Ok);
                        }
                        None => self.complete(event_id, EventStatus::Error),
                    }
                }
                RtEventKind::AddTrack { event_id, .. } => {
                    for pending in self.track_insert_rx.drain_pending() {
                        self.tracks.push(pending.slot);
                    }
                    self.complete(event_id, EventStatus::Ok);
                }
                RtEventKind::RemoveTrack { track, event_id } => {
                    let before = self.tracks.len();
                    self.tracks.retain(|slot| slot.track.id() != track);
                    let status = if self.tracks.len() < before {
                        EventStatus::Ok
                    } else {
                        EventStatus::Error
                    };
                    self.complete(event_id, status);
                }
                RtEventKind::AddProcessorToTrack { track, processor, event_id } => {
                    let channel_count = self
                        .tracks
                        .iter()
                        .find(|slot| slot.track.id() == track)
                        .map(|slot| slot.track.channel_count());
                    let status = match channel_count {
                        Some(channels) => {
                            let resulting = self
                                .registry
                                .get_mut(processor)
                                .map(|p| p.set_input_channels(channels))
                                .unwrap_or(channels);
                            if let Some(slot) =
                                self.tracks.iter_mut().find(|slot| slot.track.id() == track)
                            {
                                slot.track.add_processor(processor, resulting);
                                EventStatus::Ok
                            } else {
                                EventStatus::Error
                            }
                        }
                        None => EventStatus::Error,
                    };
                    self.complete(event_id, status);
                }
                RtEventKind::RemoveProcessorFromTrack { track, processor, event_id } => {
                    let status = match self.tracks.iter_mut().find(|slot| slot.track.id() == track) {
                        Some(slot) => {
                            slot.track.remove_processor(processor);
                            EventStatus::Ok
                        }
                        None => EventStatus::Error,
                    };
                    self.complete(event_id, status);
                }

                RtEventKind::SetBypassed { processor, bypassed } => {
                    if let Some(p) = self.processor_mut(processor) {
                        p.set_bypassed(bypassed);
                    }
                }

                RtEventKind::NoteOn { processor, .. }
                | RtEventKind::NoteOff { processor, .. }
                | RtEventKind::NoteAftertouch { processor, .. }
                | RtEventKind::ChannelPressure { processor, .. }
                | RtEventKind::PitchBend { processor, .. }
                | RtEventKind::Modulation { processor, .. }
                | RtEventKind::WrappedMidi { processor, .. }
                | RtEventKind::FloatParameterChange { processor, .. }
                | RtEventKind::IntParameterChange { processor, .. }
                | RtEventKind::BoolParameterChange { processor, .. }
                | RtEventKind::DataParameterChange { processor, .. } => {
                    if let Some(p) = self.processor_mut(processor) {
                        p.process_event(&event);
                    } else {
                        log::debug!("event addressed to unknown processor {processor}, dropped");
                    }
                }

                RtEventKind::CvValue { .. } | RtEventKind::GateEdge { .. } => {
                    for processor in self.registry.iter_mut() {
                        processor.process_event(&event);
                    }
                }

                // Outbound-only kinds never arrive on this ring.
                RtEventKind::AsyncWorkRequest { .. }
                | RtEventKind::AsyncWorkCompletion { .. }
                | RtEventKind::SyncTick { .. }
                | RtEventKind::DeleteBlob { .. }
                | RtEventKind::DeleteString { .. }
                | RtEventKind::DeleteVoid { .. } => {}
            }
        }
    }

    /// Drain every child processor's queued outgoing events (parameter
    /// notifications, CV/gate output, sampler blob releases) into the
    /// RT->non-RT ring, dropping and logging if it is ever full.
    fn drain_processor_outgoing(&mut self) {
        for processor in self.registry.iter_mut() {
            for event in processor.drain_outgoing() {
                if !self.rt_producer.push(event) {
                    log::warn!("RT->non-RT ring full, dropping processor-originated event");
                }
            }
        }
    }

    fn report_clips(&mut self, track: TrackId, clipped: Vec<usize>) {
        for channel in clipped {
            let _ = self.clip_producer.push(ClipEvent {
                track,
                channel: channel as u8,
            });
        }
    }
}

impl RtController for Engine {
    fn process_audio(&mut self, input: &Chunk, output: &mut Chunk, timestamp_us: i64) {
        self.drain_control_events();
        self.transport.advance();

        let pre_out = if let Some(pre) = &mut self.pre_track {
            pre.process_audio(input, &mut self.scratch);
            &self.scratch
        } else {
            input
        };

        output.clear();
        let now = Instant::now();
        for i in 0..self.tracks.len() {
            let slot = &mut self.tracks[i];
            TrackSlot::route_input(&slot.input_connections, pre_out, &mut slot.input_buf);
            slot.track.process_chain(
                &mut self.registry,
                &slot.input_buf,
                &mut slot.output_buf,
                now,
            );

            let track_id = slot.track.id();
            let clipped = slot.track.drain_clipped_channels();
            if !clipped.is_empty() {
                self.report_clips(track_id, clipped);
            }

            let slot = &self.tracks[i];
            TrackSlot::route_output(&slot.output_connections, &slot.output_buf, output);
        }

        if let Some(post) = &mut self.post_track {
            self.scratch.replace_all(output);
            post.process_audio(&self.scratch, output);
        }

        self.drain_processor_outgoing();
        self.rt_producer
            .push(RtEvent::sync_tick(0, timestamp_us));
    }

    fn set_tempo(&mut self, bpm: f32) {
        self.transport.set_tempo(bpm);
    }

    fn set_time_signature(&mut self, numerator: u32, denominator: u32) {
        self.transport.set_time_signature(numerator, denominator);
    }

    fn set_playing_mode(&mut self, mode: PlayingMode) {
        self.transport.set_playing_mode(mode);
    }

    fn set_current_beats(&mut self, beats: f64) {
        self.transport.set_current_beats(beats);
    }

    fn set_current_bar_beats(&mut self, bar: i64, beat_in_bar: f64) {
        self.transport.set_current_bar_beats(bar, beat_in_bar);
    }
}

impl RtEvent {
    /// Construct a bare event at offset 0 — used internally for events the
    /// engine originates mid-chunk rather than at a specific sample.
    fn from_kind(kind: RtEventKind) -> Self {
        Self { offset: 0, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt_event::RtEventRing;

    fn test_engine() -> (
        Engine,
        EngineHandles,
        RtEventProducer,
        RtEventConsumer,
        crate::registry::InsertSender,
    ) {
        let config = EngineConfig::default();
        let (non_rt_to_rt_tx, non_rt_to_rt_rx) = RtEventRing::channel(16);
        let (rt_to_non_rt_tx, rt_to_non_rt_rx) = RtEventRing::channel(16);
        let (insert_tx, insert_rx) = crate::registry::insert_channel();
        let (engine, handles) = Engine::new(&config, non_rt_to_rt_rx, rt_to_non_rt_tx, insert_rx);
        (engine, handles, non_rt_to_rt_tx, rt_to_non_rt_rx, insert_tx)
    }

    #[test]
    fn empty_graph_produces_silence_and_a_sync_tick() {
        let (mut engine, _handles, _p, mut out_rx, _insert_tx) = test_engine();
        let mut input = Chunk::new(2);
        input.channel_mut(0).fill(0.3);
        let mut output = Chunk::new(2);
        engine.process_audio(&input, &mut output, 1_000_000);
        assert_eq!(output.channel(0), [0.0; 64]);
        let tick = out_rx.pop().expect("sync tick emitted");
        assert_eq!(tick.as_sync_tick(), Some(1_000_000));
    }

    #[test]
    fn add_track_then_route_passthrough() {
        let (mut engine, handles, mut in_tx, _out_rx, _insert_tx) = test_engine();
        let track = Track::new("main", 2);
        let track_id = track.id();
        handles.track_insert_tx.send(track_id, TrackSlot::new(track));
        assert!(in_tx.push(RtEvent::from_kind(RtEventKind::AddTrack { track: track_id, event_id: 0 })));

        let mut input = Chunk::new(2);
        input.channel_mut(0).fill(0.5);
        input.channel_mut(1).fill(0.25);
        let mut output = Chunk::new(2);
        engine.process_audio(&input, &mut output, 0);

        assert_eq!(output.channel(0), input.channel(0));
        assert_eq!(output.channel(1), input.channel(1));
    }

    #[test]
    fn insert_processor_then_add_to_track_runs_in_chain() {
        let (mut engine, handles, mut in_tx, mut out_rx, insert_tx) = test_engine();

        let track = Track::new("main", 1);
        let track_id = track.id();
        handles.track_insert_tx.send(track_id, TrackSlot::new(track));
        assert!(in_tx.push(RtEvent::from_kind(RtEventKind::AddTrack { track: track_id, event_id: 1 })));
        engine.process_audio(&Chunk::new(1), &mut Chunk::new(1), 0);
        assert!(matches!(
            out_rx.pop().unwrap().kind,
            RtEventKind::AsyncWorkCompletion { event_id: 1, status: EventStatus::Ok }
        ));
        out_rx.pop(); // drain the sync tick

        let mut gain = crate::plugins::gain::GainPlugin::new(1);
        gain.init(48000.0);
        let processor_id = gain.id();
        insert_tx.send(processor_id, Box::new(gain));
        assert!(in_tx.push(RtEvent::from_kind(RtEventKind::InsertProcessor {
            processor: processor_id,
            event_id: 2,
        })));
        assert!(in_tx.push(RtEvent::from_kind(RtEventKind::AddProcessorToTrack {
            track: track_id,
            processor: processor_id,
            event_id: 3,
        })));

        let mut input = Chunk::new(1);
        input.channel_mut(0).fill(1.0);
        let mut output = Chunk::new(1);
        engine.process_audio(&input, &mut output, 0);

        assert!(engine.registry().contains(processor_id));
        assert!(engine.track(track_id).unwrap().children().contains(&processor_id));
    }
}
