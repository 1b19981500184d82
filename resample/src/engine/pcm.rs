//! Conversion between interleaved PCM bytes and planar `f64` samples.
//!
//! Integer samples are scaled to `[-1.0, 1.0)` on the way in and clamped to
//! their range on the way out. All encodings are little-endian.

use crate::format::SampleFormat;

const I16_SCALE: f64 = 32768.0;
const I32_SCALE: f64 = 2147483648.0;

/// Decodes one sample from the front of `bytes`.
fn decode_sample(format: SampleFormat, bytes: &[u8]) -> f64 {
    match format {
        SampleFormat::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64 / I16_SCALE,
        SampleFormat::I32 => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64 / I32_SCALE
        }
        SampleFormat::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        SampleFormat::F64 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[..8]);
            f64::from_le_bytes(b)
        }
    }
}

/// Encodes one sample into the front of `out`.
fn encode_sample(format: SampleFormat, value: f64, out: &mut [u8]) {
    match format {
        SampleFormat::I16 => {
            let s = (value * I16_SCALE).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            out[..2].copy_from_slice(&s.to_le_bytes());
        }
        SampleFormat::I32 => {
            let s = (value * I32_SCALE).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
            out[..4].copy_from_slice(&s.to_le_bytes());
        }
        SampleFormat::F32 => out[..4].copy_from_slice(&(value as f32).to_le_bytes()),
        SampleFormat::F64 => out[..8].copy_from_slice(&value.to_le_bytes()),
    }
}

/// Decodes `frames` interleaved frames and appends them to per-channel
/// buffers. `planar` must hold one buffer per channel.
pub fn deinterleave(format: SampleFormat, input: &[u8], frames: usize, planar: &mut [Vec<f64>]) {
    let width = format.bytes_per_sample();
    let channels = planar.len();
    for buf in planar.iter_mut() {
        buf.reserve(frames);
    }
    for bytes in input.chunks_exact(width * channels).take(frames) {
        for (ch, sample) in bytes.chunks_exact(width).enumerate() {
            planar[ch].push(decode_sample(format, sample));
        }
    }
}

/// Appends frames `start..end` of the per-channel buffers to `out` as
/// interleaved bytes.
pub fn interleave_into(
    format: SampleFormat,
    planar: &[Vec<f64>],
    start: usize,
    end: usize,
    out: &mut Vec<u8>,
) {
    let width = format.bytes_per_sample();
    let channels = planar.len();
    let base = out.len();
    out.resize(base + (end - start) * channels * width, 0);
    let mut offset = base;
    for frame in start..end {
        for buf in planar {
            encode_sample(format, buf[frame], &mut out[offset..offset + width]);
            offset += width;
        }
    }
}
