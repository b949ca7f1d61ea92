//! Error type for the MIDI dispatcher collaborator.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown output port: {0}")]
    UnknownOutputPort(u16),

    #[error("cc mapping already exists for port {port:?} channel {channel} cc {cc}")]
    DuplicateCcMapping {
        port: Option<u16>,
        channel: u8,
        cc: u8,
    },

    #[error("unknown mapping id: {0}")]
    UnknownMapping(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
