//! Streaming PCM sample-rate conversion.
//!
//! This crate converts interleaved multichannel PCM from one sample rate to
//! another, one chunk at a time:
//!
//! - `session`: the [`Session`] that owns an engine context and turns
//!   byte buffers at the input rate into byte buffers at the output rate
//! - `engine`: the [`ConversionEngine`] capability and its rubato and
//!   (optional) libsoxr implementations
//! - `io`: [`ResampleWriter`], an `io::Write` adapter over a session
//!
//! # Example
//!
//! ```rust
//! use giztoy_resample::{Quality, SampleFormat, Session, SessionConfig};
//!
//! // 48kHz mono 16-bit to 8kHz
//! let config = SessionConfig::new(48000.0, 8000.0, 1, SampleFormat::I16)
//!     .with_quality(Quality::VeryHigh);
//! let mut session = Session::new(&config)?;
//!
//! // One second of silence
//! let pcm = vec![0u8; 96000];
//! let mut out = session.write(&pcm)?;
//! out.extend(session.drain()?);
//! assert_eq!(out.len(), 16000);
//!
//! session.close()?;
//! # Ok::<(), giztoy_resample::ResampleError>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod format;
mod frame;
pub mod io;
pub mod session;

pub use config::{SessionConfig, default_parallelism};
pub use engine::{ContextSpec, ConversionEngine, EngineContext, RubatoEngine};
#[cfg(feature = "soxr")]
pub use engine::SoxrEngine;
pub use error::{EngineError, ResampleError, Result};
pub use format::{Quality, SampleFormat};
pub use io::ResampleWriter;
pub use session::Session;
