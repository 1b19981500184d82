//! Rubato-based conversion engine.
//!
//! This engine provides sample rate conversion using the rubato library, a
//! pure Rust implementation without any FFI dependencies.

use rubato::{
    FastFixedIn, PolynomialDegree, Resampler as RubatoResampler, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::{debug, trace};

use super::pcm;
use super::{ContextSpec, ConversionEngine, EngineContext};
use crate::error::EngineError;
use crate::format::{Quality, SampleFormat};

/// Largest number of frames fed to rubato at once.
const CHUNK_FRAMES: usize = 1024;

/// Creates contexts backed by rubato.
///
/// [`Quality::Quick`] uses cubic polynomial interpolation, every other tier
/// uses band-limited sinc interpolation with a longer filter per tier.
/// Equal input and output rates pass samples through untouched.
///
/// Rubato runs on the calling thread; the configured parallelism is not
/// used by this engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct RubatoEngine;

impl ConversionEngine for RubatoEngine {
    fn create_context(&self, spec: &ContextSpec) -> Result<Box<dyn EngineContext>, EngineError> {
        Ok(Box::new(RubatoContext::new(spec)?))
    }
}

fn sinc_parameters(quality: Quality) -> SincInterpolationParameters {
    let (sinc_len, f_cutoff, oversampling_factor, interpolation, window) = match quality {
        Quality::Quick | Quality::Low => (
            32,
            0.85,
            64,
            SincInterpolationType::Linear,
            WindowFunction::Hann2,
        ),
        Quality::Medium => (
            64,
            0.91,
            128,
            SincInterpolationType::Linear,
            WindowFunction::BlackmanHarris2,
        ),
        Quality::High => (
            128,
            0.94,
            256,
            SincInterpolationType::Cubic,
            WindowFunction::BlackmanHarris2,
        ),
        Quality::VeryHigh => (
            256,
            0.95,
            256,
            SincInterpolationType::Cubic,
            WindowFunction::BlackmanHarris2,
        ),
    };
    SincInterpolationParameters {
        sinc_len,
        f_cutoff,
        oversampling_factor,
        interpolation,
        window,
    }
}

/// The rubato resampler selected for a quality tier.
enum Kernel {
    Passthrough,
    Fast(FastFixedIn<f64>),
    Sinc(SincFixedIn<f64>),
}

impl Kernel {
    fn new(spec: &ContextSpec) -> Result<Self, EngineError> {
        if spec.input_rate == spec.output_rate {
            return Ok(Kernel::Passthrough);
        }
        let ratio = spec.ratio();
        if spec.quality == Quality::Quick {
            let r = FastFixedIn::<f64>::new(
                ratio,
                1.0,
                PolynomialDegree::Cubic,
                CHUNK_FRAMES,
                spec.channels,
            )?;
            return Ok(Kernel::Fast(r));
        }
        let r = SincFixedIn::<f64>::new(
            ratio,
            1.0,
            sinc_parameters(spec.quality),
            CHUNK_FRAMES,
            spec.channels,
        )?;
        Ok(Kernel::Sinc(r))
    }

    fn output_frames_max(&self) -> usize {
        match self {
            Kernel::Passthrough => 0,
            Kernel::Fast(r) => r.output_frames_max(),
            Kernel::Sinc(r) => r.output_frames_max(),
        }
    }

    /// Runs one chunk through the resampler and returns the frames written
    /// to `wave_out`.
    fn process(&mut self, wave_in: &[&[f64]], wave_out: &mut [Vec<f64>]) -> Result<usize, EngineError> {
        let (_, produced) = match self {
            Kernel::Passthrough => return Err(EngineError::new("rubato: no resampler in passthrough")),
            Kernel::Fast(r) => r.process_into_buffer(wave_in, wave_out, None)?,
            Kernel::Sinc(r) => r.process_into_buffer(wave_in, wave_out, None)?,
        };
        Ok(produced)
    }
}

/// One rubato stream.
///
/// The kernel always runs at `CHUNK_FRAMES`. Input frames that do not fill
/// a whole chunk stay staged until later input completes it; only
/// `end_input` pads the last chunk with silence. Converted frames that did
/// not fit the caller's request stay in `pending` until the next call.
struct RubatoContext {
    kernel: Kernel,
    format: SampleFormat,
    frame_bytes: usize,
    input_rate: f64,
    output_rate: f64,
    /// Planar input not yet run through the kernel, fewer than
    /// `CHUNK_FRAMES` frames between calls.
    staged: Vec<Vec<f64>>,
    /// Planar output staging.
    output: Vec<Vec<f64>>,
    /// Interleaved converted frames not yet handed out.
    pending: Vec<u8>,
    /// Total frames accepted.
    frames_in: u64,
    /// Total frames generated, including `pending`.
    frames_out: u64,
    ended: bool,
}

impl RubatoContext {
    fn new(spec: &ContextSpec) -> Result<Self, EngineError> {
        let kernel = Kernel::new(spec)?;
        let output_frames = kernel.output_frames_max();

        debug!(
            input_rate = spec.input_rate,
            output_rate = spec.output_rate,
            channels = spec.channels,
            format = %spec.format,
            quality = %spec.quality,
            "rubato context created"
        );

        Ok(Self {
            kernel,
            format: spec.format,
            frame_bytes: spec.frame_bytes(),
            input_rate: spec.input_rate,
            output_rate: spec.output_rate,
            staged: vec![Vec::with_capacity(CHUNK_FRAMES); spec.channels],
            output: vec![vec![0.0; output_frames]; spec.channels],
            pending: Vec::new(),
            frames_in: 0,
            frames_out: 0,
            ended: false,
        })
    }

    /// Output frames the whole input so far amounts to.
    fn target_frames(&self) -> u64 {
        (self.frames_in as f64 * self.output_rate / self.input_rate).floor() as u64
    }

    fn staged_frames(&self) -> usize {
        self.staged.first().map_or(0, Vec::len)
    }

    /// Runs the chunk of staged frames starting at `offset` through the
    /// kernel and returns the number of frames it produced.
    fn run_chunk(&mut self, offset: usize) -> Result<usize, EngineError> {
        let wave_in: Vec<&[f64]> = self
            .staged
            .iter()
            .map(|ch| &ch[offset..offset + CHUNK_FRAMES])
            .collect();
        let produced = self.kernel.process(&wave_in, &mut self.output)?;

        pcm::interleave_into(self.format, &self.output, 0, produced, &mut self.pending);
        self.frames_out += produced as u64;
        Ok(produced)
    }

    /// Runs every whole staged chunk and keeps the remainder staged.
    fn run_staged(&mut self) -> Result<(), EngineError> {
        let mut offset = 0;
        while self.staged_frames() - offset >= CHUNK_FRAMES {
            self.run_chunk(offset)?;
            offset += CHUNK_FRAMES;
        }
        if offset > 0 {
            for ch in &mut self.staged {
                ch.drain(..offset);
            }
        }
        Ok(())
    }

    /// Moves up to `frames` pending frames into `output`.
    fn take_pending(&mut self, output: &mut [u8], frames: usize) -> usize {
        let n = (self.pending.len() / self.frame_bytes).min(frames);
        let bytes = n * self.frame_bytes;
        output[..bytes].copy_from_slice(&self.pending[..bytes]);
        self.pending.drain(..bytes);
        n
    }

    fn check_output(&self, output: &[u8], frames: usize) -> Result<(), EngineError> {
        if output.len() < frames * self.frame_bytes {
            return Err(EngineError::new("rubato: output buffer too small"));
        }
        Ok(())
    }
}

impl EngineContext for RubatoContext {
    fn process(
        &mut self,
        input: &[u8],
        frames_in: usize,
        output: &mut [u8],
        frames_out: usize,
    ) -> Result<(usize, usize), EngineError> {
        if self.ended {
            return Err(EngineError::new("rubato: input already ended"));
        }
        let bytes = frames_in * self.frame_bytes;
        if input.len() < bytes {
            return Err(EngineError::new("rubato: input buffer too small"));
        }
        self.check_output(output, frames_out)?;

        if let Kernel::Passthrough = self.kernel {
            self.pending.extend_from_slice(&input[..bytes]);
            self.frames_out += frames_in as u64;
        } else {
            pcm::deinterleave(self.format, &input[..bytes], frames_in, &mut self.staged);
            self.run_staged()?;
        }
        self.frames_in += frames_in as u64;

        let produced = self.take_pending(output, frames_out);
        trace!(
            frames_in,
            frames_out,
            produced,
            staged = self.staged_frames(),
            pending = self.pending.len() / self.frame_bytes,
            "rubato process"
        );
        Ok((frames_in, produced))
    }

    fn flush(&mut self, output: &mut [u8], frames_out: usize) -> Result<usize, EngineError> {
        self.check_output(output, frames_out)?;
        Ok(self.take_pending(output, frames_out))
    }

    fn end_input(&mut self) -> Result<(), EngineError> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;

        let target = self.target_frames();
        if !matches!(self.kernel, Kernel::Passthrough) {
            // Pad the staged remainder, then push silence until the filter
            // tail covers the whole input.
            while self.frames_out < target {
                for ch in &mut self.staged {
                    ch.resize(CHUNK_FRAMES, 0.0);
                }
                let produced = self.run_chunk(0)?;
                for ch in &mut self.staged {
                    ch.clear();
                }
                if produced == 0 {
                    break;
                }
            }
            for ch in &mut self.staged {
                ch.clear();
            }
        }

        // Drop whatever the silence produced beyond the input's length.
        let excess = self.frames_out.saturating_sub(target) as usize;
        let pending = self.pending.len() / self.frame_bytes;
        let keep = pending.saturating_sub(excess);
        self.pending.truncate(keep * self.frame_bytes);
        self.frames_out -= (pending - keep) as u64;

        debug!(
            frames_in = self.frames_in,
            frames_out = self.frames_out,
            tail = keep,
            "rubato input ended"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    fn spec(input_rate: f64, output_rate: f64, channels: usize, quality: Quality) -> ContextSpec {
        ContextSpec {
            input_rate,
            output_rate,
            channels,
            format: SampleFormat::I16,
            quality,
            parallelism: NonZeroUsize::MIN,
        }
    }

    fn drain(ctx: &mut dyn EngineContext, frame_bytes: usize) -> usize {
        ctx.end_input().unwrap();
        let mut total = 0;
        let mut buf = vec![0u8; 4096 * frame_bytes];
        loop {
            let n = ctx.flush(&mut buf, 4096).unwrap();
            if n == 0 {
                return total;
            }
            total += n;
        }
    }

    #[test]
    fn test_create_every_quality() {
        for q in Quality::ALL {
            let ctx = RubatoEngine.create_context(&spec(48000.0, 8000.0, 2, q));
            assert!(ctx.is_ok(), "quality {}", q);
        }
    }

    #[test]
    fn test_passthrough_same_rate() {
        let mut ctx = RubatoEngine
            .create_context(&spec(16000.0, 16000.0, 1, Quality::High))
            .unwrap();
        let input: Vec<u8> = (0..100u8).collect();
        let mut output = vec![0u8; 100];
        let (consumed, produced) = ctx.process(&input, 50, &mut output, 50).unwrap();
        assert_eq!((consumed, produced), (50, 50));
        assert_eq!(output, input);
    }

    #[test]
    fn test_consumes_unaligned_chunk_sizes() {
        let mut ctx = RubatoEngine
            .create_context(&spec(48000.0, 16000.0, 1, Quality::Medium))
            .unwrap();
        let input = vec![0u8; 1500 * 2];
        let mut output = vec![0u8; 1000 * 2];
        let (consumed, _) = ctx.process(&input, 1500, &mut output, 500).unwrap();
        assert_eq!(consumed, 1500);
        let (consumed, _) = ctx.process(&input[..2 * 7], 7, &mut output, 2).unwrap();
        assert_eq!(consumed, 7);
    }

    #[test]
    fn test_drained_length_is_exact() {
        for q in [Quality::Quick, Quality::High] {
            let mut ctx = RubatoEngine
                .create_context(&spec(44100.0, 16000.0, 2, q))
                .unwrap();
            let frames = 10_000;
            let input = vec![0u8; frames * 4];
            let mut output = vec![0u8; frames * 4];
            let (_, produced) = ctx.process(&input, frames, &mut output, frames).unwrap();
            let tail = drain(ctx.as_mut(), 4);
            assert_eq!(produced + tail, 10_000 * 16000 / 44100, "quality {}", q);
        }
    }

    #[test]
    fn test_quick_accepts_any_length() {
        let mut ctx = RubatoEngine
            .create_context(&spec(48000.0, 8000.0, 1, Quality::Quick))
            .unwrap();
        let input = vec![0u8; 600 * 2];
        let mut output = vec![0u8; 100 * 2];
        let mut produced = 0;
        for frames in [600, 7, 333, 1] {
            let (consumed, p) = ctx.process(&input, frames, &mut output, 100).unwrap();
            assert_eq!(consumed, frames);
            produced += p;
        }
        let tail = drain(ctx.as_mut(), 2);
        assert_eq!(produced + tail, 941 / 6);
    }

    /// Converts `input` in `piece`-frame calls and returns every byte out.
    fn convert(quality: Quality, input: &[u8], piece: usize) -> Vec<u8> {
        let mut ctx = RubatoEngine
            .create_context(&spec(44100.0, 48000.0, 1, quality))
            .unwrap();
        let mut out = Vec::new();
        let mut buf = vec![0u8; 8192 * 2];
        for chunk in input.chunks(piece * 2) {
            let frames = chunk.len() / 2;
            let (_, p) = ctx.process(chunk, frames, &mut buf, 8192).unwrap();
            out.extend_from_slice(&buf[..p * 2]);
        }
        ctx.end_input().unwrap();
        loop {
            let n = ctx.flush(&mut buf, 8192).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n * 2]);
        }
    }

    #[test]
    fn test_call_size_does_not_change_output() {
        let mut input = Vec::new();
        for i in 0..5000 {
            let s = ((i as f64 * 0.07).sin() * 12000.0) as i16;
            input.extend_from_slice(&s.to_le_bytes());
        }
        for q in [Quality::Quick, Quality::High] {
            let whole = convert(q, &input, 5000);
            assert_eq!(whole.len(), 5000 * 48000 / 44100 * 2);
            for piece in [1, 333, 1024, 4800] {
                assert_eq!(convert(q, &input, piece), whole, "quality {q}, piece {piece}");
            }
        }
    }

    #[test]
    fn test_excess_output_is_kept() {
        let mut ctx = RubatoEngine
            .create_context(&spec(8000.0, 8000.0, 1, Quality::High))
            .unwrap();
        let input = vec![1u8; 20];
        let mut output = vec![0u8; 20];
        let (_, produced) = ctx.process(&input, 10, &mut output, 4).unwrap();
        assert_eq!(produced, 4);
        assert_eq!(ctx.flush(&mut output, 10).unwrap(), 6);
        assert_eq!(ctx.flush(&mut output, 10).unwrap(), 0);
    }

    #[test]
    fn test_process_after_end_fails() {
        let mut ctx = RubatoEngine
            .create_context(&spec(48000.0, 8000.0, 1, Quality::Low))
            .unwrap();
        ctx.end_input().unwrap();
        let mut output = vec![0u8; 8];
        let err = ctx.process(&[0u8; 8], 4, &mut output, 4).unwrap_err();
        assert!(err.to_string().contains("ended"));
    }

    #[test]
    fn test_small_output_buffer() {
        let mut ctx = RubatoEngine
            .create_context(&spec(48000.0, 8000.0, 1, Quality::Low))
            .unwrap();
        let mut output = vec![0u8; 2];
        assert!(ctx.process(&[0u8; 8], 4, &mut output, 4).is_err());
    }
}
