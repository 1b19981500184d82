//! Sample formats and quality tiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ResampleError;

/// Encoding of a single PCM sample.
///
/// Samples are little-endian and interleaved by channel. The numeric codes
/// match the datatype codes used by the SoX resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 32-bit floating point.
    F32 = 0,
    /// 64-bit floating point.
    F64 = 1,
    /// 32-bit signed linear.
    I32 = 2,
    /// 16-bit signed linear.
    I16 = 3,
}

impl SampleFormat {
    /// Returns the number of bytes of one sample.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::F64 => 8,
            SampleFormat::F32 | SampleFormat::I32 => 4,
            SampleFormat::I16 => 2,
        }
    }

    /// Returns the numeric code of this format.
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            SampleFormat::F32 => "f32",
            SampleFormat::F64 => "f64",
            SampleFormat::I32 => "i32",
            SampleFormat::I16 => "i16",
        }
    }
}

impl TryFrom<u8> for SampleFormat {
    type Error = ResampleError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(SampleFormat::F32),
            1 => Ok(SampleFormat::F64),
            2 => Ok(SampleFormat::I32),
            3 => Ok(SampleFormat::I16),
            _ => Err(ResampleError::InvalidFormat(code)),
        }
    }
}

impl FromStr for SampleFormat {
    type Err = ResampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if let Ok(code) = name.parse::<u8>() {
            return SampleFormat::try_from(code);
        }
        match name.as_str() {
            "f32" | "float" | "float32" => Ok(SampleFormat::F32),
            "f64" | "double" | "float64" => Ok(SampleFormat::F64),
            "i32" | "s32" | "int32" => Ok(SampleFormat::I32),
            "i16" | "s16" | "int16" | "l16" => Ok(SampleFormat::I16),
            _ => Err(ResampleError::UnknownName {
                kind: "format",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Conversion quality tier, from fastest to most accurate.
///
/// The numeric codes are the SoX resampler recipe codes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Cubic interpolation.
    Quick = 0,
    /// 16-bit with a large rolloff.
    Low = 1,
    /// 16-bit with a medium rolloff.
    Medium = 2,
    /// 20-bit.
    #[default]
    High = 4,
    /// 28-bit.
    VeryHigh = 6,
}

impl Quality {
    /// All tiers in ascending order.
    pub const ALL: [Quality; 5] = [
        Quality::Quick,
        Quality::Low,
        Quality::Medium,
        Quality::High,
        Quality::VeryHigh,
    ];

    /// Returns the recipe code of this tier.
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Quality::Quick => "quick",
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::VeryHigh => "very_high",
        }
    }
}

impl TryFrom<u8> for Quality {
    type Error = ResampleError;

    /// Accepts the whole recipe range `0..=6`. Codes between two named
    /// tiers select the higher one.
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Quality::Quick),
            1 => Ok(Quality::Low),
            2 => Ok(Quality::Medium),
            3 | 4 => Ok(Quality::High),
            5 | 6 => Ok(Quality::VeryHigh),
            _ => Err(ResampleError::InvalidQuality(code)),
        }
    }
}

impl FromStr for Quality {
    type Err = ResampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase().replace('-', "_");
        if let Ok(code) = name.parse::<u8>() {
            return Quality::try_from(code);
        }
        match name.as_str() {
            "quick" | "qq" => Ok(Quality::Quick),
            "low" | "lq" => Ok(Quality::Low),
            "medium" | "mq" => Ok(Quality::Medium),
            "high" | "hq" => Ok(Quality::High),
            "very_high" | "veryhigh" | "vhq" => Ok(Quality::VeryHigh),
            _ => Err(ResampleError::UnknownName {
                kind: "quality",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
