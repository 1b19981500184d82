//! Conversion engines.
//!
//! A [`ConversionEngine`] creates stateful [`EngineContext`]s that do the
//! actual filtering. The session drives a context through four operations:
//! create, process, flush and release (drop).
//!
//! Two engines are available:
//!
//! - [`RubatoEngine`]: pure Rust, always available.
//! - `SoxrEngine`: binds the system libsoxr, behind the `soxr` feature.

use std::num::NonZeroUsize;

use crate::error::EngineError;
use crate::format::{Quality, SampleFormat};

pub mod pcm;
mod rubato_engine;

#[cfg(feature = "soxr")]
mod ffi;
#[cfg(feature = "soxr")]
mod soxr;

pub use rubato_engine::RubatoEngine;
#[cfg(feature = "soxr")]
pub use soxr::SoxrEngine;

/// Everything an engine needs to set up a context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextSpec {
    pub input_rate: f64,
    pub output_rate: f64,
    pub channels: usize,
    pub format: SampleFormat,
    pub quality: Quality,
    /// Worker threads the engine may use internally.
    pub parallelism: NonZeroUsize,
}

impl ContextSpec {
    /// Bytes in one interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.channels * self.format.bytes_per_sample()
    }

    /// Output rate divided by input rate.
    pub fn ratio(&self) -> f64 {
        self.output_rate / self.input_rate
    }
}

/// Factory for conversion contexts.
pub trait ConversionEngine {
    /// Creates a context for the given configuration.
    fn create_context(&self, spec: &ContextSpec) -> Result<Box<dyn EngineContext>, EngineError>;
}

/// A stateful conversion context.
///
/// Filter history carries over between calls, so successive calls form one
/// continuous stream. Dropping the context releases its resources.
pub trait EngineContext: Send {
    /// Converts `frames_in` interleaved frames from `input` and writes at
    /// most `frames_out` frames into `output`.
    ///
    /// Returns `(consumed, produced)` frame counts.
    fn process(
        &mut self,
        input: &[u8],
        frames_in: usize,
        output: &mut [u8],
        frames_out: usize,
    ) -> Result<(usize, usize), EngineError>;

    /// Writes at most `frames_out` frames that can be produced from
    /// buffered state alone. Returns the number of frames written.
    fn flush(&mut self, output: &mut [u8], frames_out: usize) -> Result<usize, EngineError>;

    /// Marks the end of input. Later flushes emit the filter tail until
    /// they return 0.
    fn end_input(&mut self) -> Result<(), EngineError>;
}
