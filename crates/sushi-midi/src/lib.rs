//! Wire-level MIDI event types.
//!
//! This crate carries only the message representation: a sample-accurate
//! [`MidiEvent`] and its raw 3-byte encoding. Routing, CC mapping and port
//! management live in `sushi-midi-io`; hardware device I/O is a host/backend
//! concern and is not implemented here.

pub mod error;
pub mod event;

pub use error::{Error, Result};
pub use event::{MidiEvent, RawMidiEvent};

pub use midi_msg::{Channel, ChannelVoiceMsg, ControlChange};
