//! Error types for sushi-core.

use thiserror::Error;

/// Status code surfaced to embedders (§6 "Error codes"). Distinct from
/// [`Error`]: this is the small, stable enum a host FFI boundary or config
/// loader reports, while `Error` carries the richer Rust-side detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SushiErrorCode {
    Ok,
    FailedInvalidFilePath,
    FailedInvalidConfigurationFile,
    FailedLoadHostConfig,
    FailedLoadTracks,
    FailedLoadMidiMapping,
    FailedLoadCvGate,
    FailedLoadProcessorStates,
    FailedLoadEventList,
    FailedLoadEvents,
    FailedLoadOsc,
    FailedAudioFrontendMissing,
    FailedAudioFrontendInitialization,
    FailedMidiFrontendInitialization,
    FailedOscFrontendInitialization,
    FailedToStartRpcServer,
    FrontendIsIncompatibleWithStandalone,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid tempo: {0}. must be between 20.0 and 999.0 bpm")]
    InvalidTempo(f32),

    #[error("invalid beat position: {0}. must be non-negative")]
    InvalidBeat(f64),

    #[error("invalid loop range: start={start}, end={end}")]
    InvalidLoopRange { start: f64, end: f64 },

    #[error("invalid time signature: {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u32, denominator: u32 },

    #[error("unknown track: {0}")]
    UnknownTrack(crate::rt_event::TrackId),

    #[error("unknown processor: {0}")]
    UnknownProcessor(crate::rt_event::ProcessorId),

    #[error("unknown parameter '{0}' on processor {1}")]
    UnknownParameter(String, crate::rt_event::ProcessorId),

    #[error("unknown plugin uid: {0}")]
    UnknownPluginUid(String),

    #[error("processor init failed: {0}")]
    ProcessorInitFailed(String),

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("{code:?}: {message}")]
    Status {
        code: SushiErrorCode,
        message: String,
    },
}

impl Error {
    pub fn code(&self) -> SushiErrorCode {
        match self {
            Error::Status { code, .. } => *code,
            Error::InvalidConfig(_) => SushiErrorCode::FailedInvalidConfigurationFile,
            _ => SushiErrorCode::FailedInvalidConfigurationFile,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
