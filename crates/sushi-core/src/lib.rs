//! Realtime audio graph kernel: RT/non-RT event plumbing, transport, the
//! processor/track graph, and the parameter system.
//!
//! The control plane and the audio thread only ever talk to each other
//! through lock-free rings of fixed-size, `Copy` [`rt_event::RtEvent`]s;
//! anything that needs to allocate or block travels as a boxed
//! [`control_event::ControlEvent`] instead and gets projected onto the RT
//! ring once it is safe to do so (see [`dispatcher`]).

pub mod config;
pub mod control_event;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event_timer;
pub mod limiter;
pub mod lockfree;
pub mod parameter;
pub mod plugins;
pub mod processor;
pub mod registry;
pub mod rt_event;
pub mod sample_buffer;
pub mod track;
pub mod transport;

pub use config::{config_schema, EngineConfig};
pub use control_event::{
    AsyncWork, CompletionCallback, ControlEvent, ControlEventPayload, EngineCommand,
    EngineNotification, ParamValue,
};
pub use dispatcher::{
    CycleReport, Dispatcher, DispatcherThread, EngineNotificationCallback, KeyboardCallback,
    ParameterChangeCallback, ParameterManager, SubscribeStatus, SubscriberId, UnsubscribeStatus,
    Worker, WorkerThread,
};
pub use engine::{
    clip_event_channel, track_insert_channel, ClipEvent, ClipEventConsumer, ClipEventProducer,
    Engine, EngineHandles, RtController, TrackInsertReceiver, TrackInsertSender, TrackSlot,
};
pub use error::{Error, Result, SushiErrorCode};
pub use event_timer::EventTimer;
pub use limiter::TruePeakLimiter;
pub use lockfree::{AtomicDouble, AtomicFlag, AtomicFloat};
pub use parameter::{
    AutomationDirection, ParameterDescriptor, ParameterRange, ParameterScale, ParameterTable,
    ParameterType, Preprocessor,
};
pub use processor::{
    next_processor_id, process_audio_bypassed, Chunk, ChannelConfig, InternalPluginBase,
    Processor, ProcessorCore, ProcessorStatus,
};
pub use registry::{
    insert_channel, removal_channel, InsertReceiver, InsertSender, ProcessorRegistry,
    RemovalReceiver, RemovalSender,
};
pub use rt_event::{
    BlobHandle, EventId, EventIdGenerator, EventStatus, ParamId, ProcessorId, RtEvent,
    RtEventConsumer, RtEventKind, RtEventProducer, RtEventRing, StringHandle, TrackId, VoidHandle,
};
pub use sample_buffer::SampleBuffer;
pub use track::Track;
pub use transport::{
    ExternalUpdate, PlayingMode, PositionSource, StateChange, SyncLossDetector, SyncMode,
    TimeSignature, TransportManager, TransportTick, BBT,
};

/// Samples per audio chunk, fixed crate-wide because [`Processor::process_audio`]
/// is called across `Box<dyn Processor>` trait-object boundaries (§4.6).
pub const AUDIO_CHUNK_SIZE: usize = 64;
