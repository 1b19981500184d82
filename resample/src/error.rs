//! Error types for resampling sessions.

use std::io;

use thiserror::Error;

/// Errors returned by a resampling session.
///
/// Every error is terminal for the call that raised it. Nothing is retried
/// internally and no partial output accompanies an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResampleError {
    /// Input or output sample rate is not a positive finite number.
    #[error("resample: invalid sampling rates (input {input}, output {output})")]
    InvalidRate { input: f64, output: f64 },

    /// Channel count is zero.
    #[error("resample: invalid channels number")]
    InvalidChannels,

    /// Quality code outside the defined range.
    #[error("resample: invalid quality setting {0}")]
    InvalidQuality(u8),

    /// Sample format code outside the defined set.
    #[error("resample: invalid format setting {0}")]
    InvalidFormat(u8),

    /// A format or quality name that could not be parsed.
    #[error("resample: unknown {kind} {name:?}")]
    UnknownName { kind: &'static str, name: String },

    /// The engine refused the requested configuration.
    #[error("resample: engine init: {0}")]
    EngineInit(String),

    /// The session has no engine context (closed or never opened).
    #[error("resample: session is closed")]
    NullSession,

    /// The input did not contain a single whole frame.
    #[error("resample: incomplete input frame data")]
    IncompleteFrame,

    /// The input is not yet enough to produce an output frame.
    #[error("resample: not enough input to generate output")]
    InsufficientInput,

    /// The engine failed while converting.
    #[error("resample: engine process: {0}")]
    EngineProcess(String),

    /// Close was called on a session that is already closed.
    #[error("resample: session already closed")]
    AlreadyClosed,

    /// The stream was drained; no more input is accepted.
    #[error("resample: end of stream")]
    EndOfStream,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ResampleError>;

/// Error reported by a conversion engine.
///
/// The message is surfaced to callers unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<rubato::ResamplerConstructionError> for EngineError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        EngineError(e.to_string())
    }
}

impl From<rubato::ResampleError> for EngineError {
    fn from(e: rubato::ResampleError) -> Self {
        EngineError(e.to_string())
    }
}

impl From<ResampleError> for io::Error {
    fn from(e: ResampleError) -> Self {
        let kind = match e {
            ResampleError::NullSession | ResampleError::AlreadyClosed => io::ErrorKind::BrokenPipe,
            ResampleError::EndOfStream => io::ErrorKind::UnexpectedEof,
            ResampleError::EngineProcess(_) | ResampleError::EngineInit(_) => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, e)
    }
}
