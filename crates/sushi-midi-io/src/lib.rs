//! The MIDI dispatcher collaborator boundary (spec §4.8).
//!
//! Converts raw incoming MIDI into the RT events the realtime thread
//! consumes (keyboard events routed to a track, CC mapped to a
//! (processor, parameter) pair, program-change routed to a processor), and
//! forwards outgoing RT-originated MIDI to output ports with optional clock
//! generation. Routing tables are mutated only from the control plane and
//! read via atomically-swapped snapshots so the RT thread never locks.
//!
//! Hardware device enumeration and the actual audio/MIDI backend I/O are
//! out of scope here, per spec §1: this crate is the translation layer, not
//! the transport.

pub mod cc;
pub mod dispatcher;
pub mod error;
pub mod output;
pub mod program_change;
pub mod routing;

pub use cc::{CcMappingManager, CcMode};
pub use dispatcher::MidiDispatcher;
pub use error::{Error, Result};
pub use output::{ClockGenerator, OutgoingMidiForwarder, OutgoingMidiMessage, CLOCK_PPQN};
pub use program_change::{ProgramChangeRouter, PROGRAM_PARAM_ID};
pub use routing::{PortChannel, PortId, RoutingSnapshot, RoutingTable};
