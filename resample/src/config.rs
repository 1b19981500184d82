//! Session configuration.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::{ResampleError, Result};
use crate::format::{Quality, SampleFormat};

/// Parameters of a resampling session.
///
/// Deserializes from YAML or JSON, e.g.:
///
/// ```yaml
/// input_rate: 48000
/// output_rate: 8000
/// channels: 1
/// format: i16
/// quality: very_high
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Input sample rate in Hz.
    pub input_rate: f64,
    /// Output sample rate in Hz.
    pub output_rate: f64,
    /// Number of interleaved channels.
    #[serde(default = "default_channels")]
    pub channels: u32,
    /// Sample encoding of both input and output.
    #[serde(default = "default_format")]
    pub format: SampleFormat,
    #[serde(default)]
    pub quality: Quality,
    /// Worker threads the engine may use. `None` uses every available core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<NonZeroUsize>,
}

fn default_channels() -> u32 {
    1
}

fn default_format() -> SampleFormat {
    SampleFormat::I16
}

impl SessionConfig {
    /// Creates a configuration with the default quality and parallelism.
    pub fn new(input_rate: f64, output_rate: f64, channels: u32, format: SampleFormat) -> Self {
        Self {
            input_rate,
            output_rate,
            channels,
            format,
            quality: Quality::default(),
            parallelism: None,
        }
    }

    /// Builds a configuration from raw numeric codes, checking rates,
    /// channels, quality and format in that order.
    pub fn from_codes(
        input_rate: f64,
        output_rate: f64,
        channels: u32,
        format: u8,
        quality: u8,
    ) -> Result<Self> {
        let mut cfg = Self::new(input_rate, output_rate, channels, SampleFormat::I16);
        cfg.validate()?;
        cfg.quality = Quality::try_from(quality)?;
        cfg.format = SampleFormat::try_from(format)?;
        Ok(cfg)
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_parallelism(mut self, threads: NonZeroUsize) -> Self {
        self.parallelism = Some(threads);
        self
    }

    /// Checks rates and channel count.
    pub fn validate(&self) -> Result<()> {
        let valid = |rate: f64| rate.is_finite() && rate > 0.0;
        if !valid(self.input_rate) || !valid(self.output_rate) {
            return Err(ResampleError::InvalidRate {
                input: self.input_rate,
                output: self.output_rate,
            });
        }
        if self.channels == 0 {
            return Err(ResampleError::InvalidChannels);
        }
        Ok(())
    }

    /// Returns the configured parallelism, or the host default.
    pub fn resolved_parallelism(&self) -> NonZeroUsize {
        self.parallelism.unwrap_or_else(default_parallelism)
    }

    /// Bytes in one interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }
}

/// Number of processing units on this host, or 1 if unknown.
pub fn default_parallelism() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}
