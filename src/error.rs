//! Centralized error type for the sushi umbrella crate.
//!
//! Wraps subsystem errors so `?` propagates naturally across crate
//! boundaries; embedders that need the stable status-code taxonomy from
//! spec §6 should match on [`sushi_core::SushiErrorCode`] via [`Error::code`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] sushi_core::Error),

    #[cfg(feature = "midi")]
    #[error("midi: {0}")]
    Midi(#[from] sushi_midi_io::Error),
}

impl Error {
    /// The embedder-facing status code this error maps to (§6).
    pub fn code(&self) -> sushi_core::SushiErrorCode {
        match self {
            Error::Core(e) => e.code(),
            #[cfg(feature = "midi")]
            Error::Midi(_) => sushi_core::SushiErrorCode::FailedLoadMidiMapping,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
