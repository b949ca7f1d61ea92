//! Error type for wire-level MIDI decoding.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed midi message: {0} bytes")]
    Malformed(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
