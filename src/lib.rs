//! # Sushi
//!
//! A headless audio plugin host: a realtime graph engine that chains
//! processors onto tracks, mixes tracks into a master bus, and exposes a
//! control-plane [`Controller`] that a CLI, an RPC/OSC frontend, or a JSON
//! config loader can drive to build and mutate that graph without ever
//! touching the audio thread directly (§3, §7).
//!
//! ## Architecture
//!
//! - [`sushi_core`] — the realtime kernel: lock-free RT/non-RT event
//!   plumbing, transport, the processor/track graph, and the parameter
//!   system. Re-exported here as [`core`].
//! - [`sushi_midi`] — MIDI message parsing (note on/off, CC, program
//!   change, MPE-aware channel handling).
//! - [`sushi_midi_io`] (feature `midi`, default on) — routing raw MIDI
//!   into graph events: port/channel to track routing, CC-to-parameter
//!   mapping, program-change routing, outgoing MIDI clock.
//! - [`Controller`] / [`SushiBuilder`] — the facade this crate adds on top:
//!   wires a [`sushi_core::Dispatcher`] and [`sushi_core::Engine`] together
//!   and exposes the transactional graph-mutation API described in §6/§7.
//!
//! ## Quick start
//!
//! ```ignore
//! use sushi::SushiBuilder;
//!
//! let mut controller = SushiBuilder::new().sample_rate(48000.0).build();
//! let track = controller.create_track("main", 2)?;
//! controller.spawn_background_threads();
//! # Ok::<(), sushi::Error>(())
//! ```

pub use sushi_core as core;

pub use sushi_core::{
    AtomicDouble, AtomicFlag, AtomicFloat, Chunk, EngineConfig, ParameterDescriptor,
    ParameterRange, ParameterScale, ParameterTable, ParameterType, PlayingMode, Processor,
    ProcessorId, ProcessorStatus, SampleBuffer, SushiErrorCode, TimeSignature, Track, TrackId,
    TransportManager, AUDIO_CHUNK_SIZE, BBT,
};

pub use sushi_midi as midi;
pub use sushi_midi::MidiEvent;

#[cfg(feature = "midi")]
pub use sushi_midi_io as midi_io;

#[cfg(feature = "midi")]
pub use sushi_midi_io::{CcMappingManager, CcMode, MidiDispatcher};

mod builder;
mod controller;
mod error;

pub use builder::SushiBuilder;
pub use controller::{Controller, GraphBatch};
pub use error::{Error, Result};

/// Convenience prelude for common imports.
pub mod prelude {
    pub use crate::{Controller, Error, Result, SushiBuilder};
    pub use crate::core::{EngineConfig, PlayingMode, Processor, Track};

    #[cfg(feature = "midi")]
    pub use crate::midi_io::MidiDispatcher;
}
