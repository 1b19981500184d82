//! Streaming resampler session.

use std::fmt;
use std::num::NonZeroUsize;

use tracing::{debug, trace};

use crate::config::SessionConfig;
use crate::engine::{ContextSpec, ConversionEngine, EngineContext, RubatoEngine};
use crate::error::{EngineError, ResampleError, Result};
use crate::format::{Quality, SampleFormat};
use crate::frame::FrameAligner;

/// Frames requested per flush while draining.
const DRAIN_BLOCK_FRAMES: usize = 4096;

/// Output room offered to an engine once the caller's request is full.
const HOLD_BLOCK_FRAMES: usize = 1024;

/// A resampling session over one continuous stream.
///
/// Each [`write`](Session::write) continues the stream of the previous one:
/// the engine keeps its filter history between calls. The session owns its
/// engine context exclusively and takes `&mut self` for every operation, so
/// sharing one session between threads needs external synchronization.
///
/// Output sizing is cumulative: after `n` input frames the session has asked
/// the engine for `floor(n * output_rate / input_rate)` output frames in
/// total, so rounding does not drift over many small writes.
pub struct Session {
    context: Option<Box<dyn EngineContext>>,
    input_rate: f64,
    output_rate: f64,
    channels: u32,
    format: SampleFormat,
    quality: Quality,
    parallelism: NonZeroUsize,
    aligner: FrameAligner,
    /// Converted frames beyond an earlier request, returned first.
    held: Vec<u8>,
    /// Frames handed to the engine so far.
    frames_in: u64,
    /// Frames returned to the caller so far.
    frames_out: u64,
    drained: bool,
}

impl Session {
    /// Opens a session backed by [`RubatoEngine`].
    pub fn new(config: &SessionConfig) -> Result<Self> {
        Self::with_engine(config, &RubatoEngine)
    }

    /// Opens a session backed by the given engine.
    pub fn with_engine<E>(config: &SessionConfig, engine: &E) -> Result<Self>
    where
        E: ConversionEngine + ?Sized,
    {
        config.validate()?;

        let parallelism = config.resolved_parallelism();
        let spec = ContextSpec {
            input_rate: config.input_rate,
            output_rate: config.output_rate,
            channels: config.channels as usize,
            format: config.format,
            quality: config.quality,
            parallelism,
        };
        let context = engine
            .create_context(&spec)
            .map_err(|EngineError(msg)| ResampleError::EngineInit(msg))?;

        debug!(
            input_rate = config.input_rate,
            output_rate = config.output_rate,
            channels = config.channels,
            format = %config.format,
            quality = %config.quality,
            parallelism = parallelism.get(),
            "resample session opened"
        );

        Ok(Self {
            context: Some(context),
            input_rate: config.input_rate,
            output_rate: config.output_rate,
            channels: config.channels,
            format: config.format,
            quality: config.quality,
            parallelism,
            aligner: FrameAligner::new(config.frame_bytes()),
            held: Vec::new(),
            frames_in: 0,
            frames_out: 0,
            drained: false,
        })
    }

    /// Resamples `input` and returns the converted bytes.
    ///
    /// Bytes that do not complete a frame are kept and prepended to the next
    /// write. The returned bytes always hold whole frames, possibly fewer
    /// than the rate ratio suggests while the engine is still filling up.
    ///
    /// # Errors
    ///
    /// - [`ResampleError::NullSession`] after [`close`](Session::close).
    /// - [`ResampleError::EndOfStream`] after [`drain`](Session::drain).
    /// - [`ResampleError::IncompleteFrame`] if no whole frame is available yet.
    /// - [`ResampleError::InsufficientInput`] if the stream so far is too
    ///   short for another output frame. The input is still handed to the
    ///   engine and counts towards later output.
    /// - [`ResampleError::EngineProcess`] if the engine fails.
    pub fn write(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let context = self.context.as_mut().ok_or(ResampleError::NullSession)?;
        if self.drained {
            return Err(ResampleError::EndOfStream);
        }
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let frame_bytes = self.format.bytes_per_sample() * self.channels as usize;
        let data = self.aligner.align(input);
        let frames_in = data.len() / frame_bytes;
        if frames_in == 0 {
            return Err(ResampleError::IncompleteFrame);
        }

        let total_in = self.frames_in + frames_in as u64;
        let expected = expected_frames(total_in, self.input_rate, self.output_rate);
        let frames_out = expected.saturating_sub(self.frames_out) as usize;

        let mut consumed = 0;
        let result = drive(
            context.as_mut(),
            &mut self.held,
            &data,
            frames_in,
            frames_out,
            frame_bytes,
            &mut consumed,
        );
        self.frames_in += consumed as u64;
        let output = result?;
        self.frames_out += (output.len() / frame_bytes) as u64;

        if frames_out == 0 {
            return Err(ResampleError::InsufficientInput);
        }
        Ok(output)
    }

    /// Ends the stream and returns everything the engine still holds.
    ///
    /// Bytes of an incomplete trailing frame are discarded. Afterwards
    /// `write` and `drain` fail with [`ResampleError::EndOfStream`]; the
    /// session still has to be closed.
    pub fn drain(&mut self) -> Result<Vec<u8>> {
        let context = self.context.as_mut().ok_or(ResampleError::NullSession)?;
        if self.drained {
            return Err(ResampleError::EndOfStream);
        }
        self.drained = true;

        let frame_bytes = self.format.bytes_per_sample() * self.channels as usize;
        let dropped = self.aligner.discard();
        context.end_input().map_err(process_error)?;

        let mut output = std::mem::take(&mut self.held);
        let mut block = vec![0u8; DRAIN_BLOCK_FRAMES * frame_bytes];
        loop {
            let n = context
                .flush(&mut block, DRAIN_BLOCK_FRAMES)
                .map_err(process_error)?;
            if n == 0 {
                break;
            }
            output.extend_from_slice(&block[..n.min(DRAIN_BLOCK_FRAMES) * frame_bytes]);
        }
        self.frames_out += (output.len() / frame_bytes) as u64;

        debug!(
            frames_in = self.frames_in,
            frames_out = self.frames_out,
            dropped_bytes = dropped,
            "resample session drained"
        );
        Ok(output)
    }

    /// Releases the engine context.
    ///
    /// Fails with [`ResampleError::AlreadyClosed`] if the session is
    /// already closed.
    pub fn close(&mut self) -> Result<()> {
        let context = self.context.take().ok_or(ResampleError::AlreadyClosed)?;
        drop(context);
        debug!(
            frames_in = self.frames_in,
            frames_out = self.frames_out,
            "resample session closed"
        );
        Ok(())
    }

    pub fn input_rate(&self) -> f64 {
        self.input_rate
    }

    pub fn output_rate(&self) -> f64 {
        self.output_rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Worker threads the engine was configured with.
    pub fn parallelism(&self) -> NonZeroUsize {
        self.parallelism
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.format.bytes_per_sample()
    }

    /// Bytes in one interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Total input frames handed to the engine.
    pub fn frames_in(&self) -> u64 {
        self.frames_in
    }

    /// Total output frames returned.
    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }

    /// Bytes of an incomplete frame waiting for the next write.
    pub fn pending_bytes(&self) -> usize {
        self.aligner.pending()
    }

    pub fn is_closed(&self) -> bool {
        self.context.is_none()
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.context.take().is_some() {
            debug!("resample session dropped without close");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("channels", &self.channels)
            .field("format", &self.format)
            .field("quality", &self.quality)
            .field("frames_in", &self.frames_in)
            .field("frames_out", &self.frames_out)
            .field("drained", &self.drained)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Output frames a stream of `frames_in` input frames amounts to.
fn expected_frames(frames_in: u64, input_rate: f64, output_rate: f64) -> u64 {
    (frames_in as f64 * output_rate / input_rate).floor() as u64
}

fn process_error(EngineError(msg): EngineError) -> ResampleError {
    ResampleError::EngineProcess(msg)
}

/// Feeds `frames_in` frames to the engine and collects up to `frames_out`
/// frames, starting with frames held back by an earlier call.
///
/// Once the request is full, an engine that still has input left gets a
/// scratch block and its output is held for the next call. When the engine
/// takes all input but returns short, one flush collects what its buffered
/// state can still give. `consumed` counts the input frames the engine
/// took, also when an error is returned.
fn drive(
    context: &mut dyn EngineContext,
    held: &mut Vec<u8>,
    input: &[u8],
    frames_in: usize,
    frames_out: usize,
    frame_bytes: usize,
    consumed: &mut usize,
) -> Result<Vec<u8>> {
    let mut output = vec![0u8; frames_out * frame_bytes];
    let reused = (held.len() / frame_bytes).min(frames_out);
    output[..reused * frame_bytes].copy_from_slice(&held[..reused * frame_bytes]);
    held.drain(..reused * frame_bytes);
    let mut produced = reused;
    let mut scratch = Vec::new();

    while *consumed < frames_in {
        let remaining = frames_in - *consumed;
        let room = frames_out - produced;
        let rest = &input[*consumed * frame_bytes..];
        let (c, p, limit) = if room > 0 {
            let (c, p) = context
                .process(rest, remaining, &mut output[produced * frame_bytes..], room)
                .map_err(process_error)?;
            (c, p, room)
        } else {
            scratch.resize(HOLD_BLOCK_FRAMES * frame_bytes, 0);
            let (c, p) = context
                .process(rest, remaining, &mut scratch, HOLD_BLOCK_FRAMES)
                .map_err(process_error)?;
            (c, p, HOLD_BLOCK_FRAMES)
        };
        if c > remaining || p > limit {
            return Err(ResampleError::EngineProcess(format!(
                "engine reported {c}/{p} frames for a {remaining}/{limit} request"
            )));
        }
        if c == 0 && p == 0 {
            return Err(ResampleError::EngineProcess(
                "engine made no progress".to_string(),
            ));
        }
        *consumed += c;
        if room > 0 {
            produced += p;
        } else {
            held.extend_from_slice(&scratch[..p * frame_bytes]);
        }
    }

    if produced < frames_out {
        trace!(produced, requested = frames_out, "flushing engine");
        let p = context
            .flush(&mut output[produced * frame_bytes..], frames_out - produced)
            .map_err(process_error)?;
        produced += p.min(frames_out - produced);
    }

    output.truncate(produced * frame_bytes);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counters shared between a scripted engine and the test.
    #[derive(Default)]
    struct Stats {
        processes: AtomicUsize,
        flushes: AtomicUsize,
        released: AtomicUsize,
    }

    /// Behaviour of the scripted engine.
    #[derive(Default, Clone)]
    struct Script {
        init_error: Option<String>,
        process_error: Option<String>,
        flush_error: Option<String>,
        /// Frames withheld from every process call until a flush.
        hold_back: usize,
        /// Largest number of frames consumed per process call.
        max_consume: Option<usize>,
        /// Takes only as much input as the output room can account for.
        room_limited: bool,
        stall: bool,
    }

    struct ScriptedEngine {
        script: Script,
        stats: Arc<Stats>,
    }

    impl ScriptedEngine {
        fn new(script: Script) -> Self {
            Self {
                script,
                stats: Arc::new(Stats::default()),
            }
        }
    }

    impl ConversionEngine for ScriptedEngine {
        fn create_context(
            &self,
            spec: &ContextSpec,
        ) -> std::result::Result<Box<dyn EngineContext>, EngineError> {
            if let Some(msg) = &self.script.init_error {
                return Err(EngineError::new(msg.clone()));
            }
            Ok(Box::new(ScriptedContext {
                script: self.script.clone(),
                stats: self.stats.clone(),
                spec: *spec,
                frames_in: 0,
                generated: 0,
                ready: 0,
            }))
        }
    }

    /// Emits frames of 0x5A at the exact rate ratio.
    struct ScriptedContext {
        script: Script,
        stats: Arc<Stats>,
        spec: ContextSpec,
        frames_in: u64,
        generated: u64,
        ready: usize,
    }

    impl ScriptedContext {
        fn emit(&mut self, output: &mut [u8], frames: usize) -> usize {
            let fb = self.spec.frame_bytes();
            output[..frames * fb].fill(0x5A);
            self.ready -= frames;
            frames
        }
    }

    impl EngineContext for ScriptedContext {
        fn process(
            &mut self,
            _input: &[u8],
            frames_in: usize,
            output: &mut [u8],
            frames_out: usize,
        ) -> std::result::Result<(usize, usize), EngineError> {
            self.stats.processes.fetch_add(1, Ordering::SeqCst);
            if let Some(msg) = &self.script.process_error {
                return Err(EngineError::new(msg.clone()));
            }
            if self.script.stall {
                return Ok((0, 0));
            }
            let mut consumed = self.script.max_consume.map_or(frames_in, |m| m.min(frames_in));
            if self.script.room_limited {
                let ratio = self.spec.input_rate / self.spec.output_rate;
                consumed = consumed.min((frames_out as f64 * ratio).ceil() as usize);
            }
            self.frames_in += consumed as u64;
            let total = expected_frames(self.frames_in, self.spec.input_rate, self.spec.output_rate);
            self.ready += (total - self.generated) as usize;
            self.generated = total;
            let n = self
                .ready
                .saturating_sub(self.script.hold_back)
                .min(frames_out);
            Ok((consumed, self.emit(output, n)))
        }

        fn flush(
            &mut self,
            output: &mut [u8],
            frames_out: usize,
        ) -> std::result::Result<usize, EngineError> {
            self.stats.flushes.fetch_add(1, Ordering::SeqCst);
            if let Some(msg) = &self.script.flush_error {
                return Err(EngineError::new(msg.clone()));
            }
            let n = self.ready.min(frames_out);
            Ok(self.emit(output, n))
        }

        fn end_input(&mut self) -> std::result::Result<(), EngineError> {
            Ok(())
        }
    }

    impl Drop for ScriptedContext {
        fn drop(&mut self) {
            self.stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::new(48000.0, 8000.0, 1, SampleFormat::I16)
    }

    #[test]
    fn test_write_without_flush() {
        let engine = ScriptedEngine::new(Script::default());
        let mut session = Session::with_engine(&config(), &engine).unwrap();
        let out = session.write(&vec![0u8; 600 * 2]).unwrap();
        assert_eq!(out.len(), 100 * 2);
        assert!(out.iter().all(|&b| b == 0x5A));
        assert_eq!(engine.stats.flushes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_short_output_triggers_one_flush() {
        let engine = ScriptedEngine::new(Script {
            hold_back: 3,
            ..Default::default()
        });
        let mut session = Session::with_engine(&config(), &engine).unwrap();
        let out = session.write(&vec![0u8; 600 * 2]).unwrap();
        assert_eq!(out.len(), 100 * 2);
        assert_eq!(engine.stats.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(session.frames_out(), 100);
    }

    #[test]
    fn test_partial_consume_is_resubmitted() {
        let engine = ScriptedEngine::new(Script {
            max_consume: Some(100),
            ..Default::default()
        });
        let mut session = Session::with_engine(&config(), &engine).unwrap();
        let out = session.write(&vec![0u8; 1000 * 2]).unwrap();
        assert_eq!(engine.stats.processes.load(Ordering::SeqCst), 10);
        assert_eq!(session.frames_in(), 1000);
        assert_eq!(out.len(), 166 * 2);
    }

    #[test]
    fn test_stalled_engine_fails() {
        let engine = ScriptedEngine::new(Script {
            stall: true,
            ..Default::default()
        });
        let mut session = Session::with_engine(&config(), &engine).unwrap();
        let err = session.write(&vec![0u8; 600]).unwrap_err();
        assert!(matches!(err, ResampleError::EngineProcess(_)));
        assert_eq!(session.frames_in(), 0);
    }

    #[test]
    fn test_engine_errors_pass_through() {
        let engine = ScriptedEngine::new(Script {
            init_error: Some("unsupported datatype".to_string()),
            ..Default::default()
        });
        let err = Session::with_engine(&config(), &engine).unwrap_err();
        assert_eq!(
            err,
            ResampleError::EngineInit("unsupported datatype".to_string())
        );

        let engine = ScriptedEngine::new(Script {
            process_error: Some("boom".to_string()),
            ..Default::default()
        });
        let mut session = Session::with_engine(&config(), &engine).unwrap();
        assert_eq!(
            session.write(&[0u8; 12]).unwrap_err(),
            ResampleError::EngineProcess("boom".to_string())
        );

        let engine = ScriptedEngine::new(Script {
            hold_back: 1,
            flush_error: Some("flush failed".to_string()),
            ..Default::default()
        });
        let mut session = Session::with_engine(&config(), &engine).unwrap();
        assert_eq!(
            session.write(&[0u8; 12]).unwrap_err(),
            ResampleError::EngineProcess("flush failed".to_string())
        );
        assert_eq!(session.frames_in(), 6);
        assert_eq!(session.frames_out(), 0);
    }

    #[test]
    fn test_room_limited_engine_takes_all_input() {
        let engine = ScriptedEngine::new(Script {
            room_limited: true,
            ..Default::default()
        });
        let mut session = Session::with_engine(&config(), &engine).unwrap();

        // Nothing requested, the engine still gets room to take the frames.
        assert_eq!(
            session.write(&[0u8; 2 * 3]),
            Err(ResampleError::InsufficientInput)
        );
        assert_eq!(session.frames_in(), 3);

        // One frame requested; input beyond it goes in once the request is full.
        let out = session.write(&[0u8; 2 * 8]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(session.frames_in(), 11);

        let out = session.write(&[0u8; 2 * 601]).unwrap();
        assert_eq!(out.len(), 2 * 101);
        assert_eq!(session.frames_in(), 612);
        assert_eq!(session.frames_out(), 102);
    }

    #[test]
    fn test_invalid_config_never_reaches_engine() {
        let engine = ScriptedEngine::new(Script::default());
        let cfg = SessionConfig::new(48000.0, 8000.0, 0, SampleFormat::I16);
        assert_eq!(
            Session::with_engine(&cfg, &engine).unwrap_err(),
            ResampleError::InvalidChannels
        );
        assert_eq!(engine.stats.released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_releases_once() {
        let engine = ScriptedEngine::new(Script::default());
        let mut session = Session::with_engine(&config(), &engine).unwrap();
        session.close().unwrap();
        assert_eq!(engine.stats.released.load(Ordering::SeqCst), 1);
        assert!(session.is_closed());

        assert_eq!(session.close(), Err(ResampleError::AlreadyClosed));
        assert_eq!(session.close(), Err(ResampleError::AlreadyClosed));
        assert_eq!(session.write(&[0u8; 12]), Err(ResampleError::NullSession));
        assert_eq!(session.write(&[]), Err(ResampleError::NullSession));
        assert_eq!(session.drain(), Err(ResampleError::NullSession));

        drop(session);
        assert_eq!(engine.stats.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_open_context() {
        let engine = ScriptedEngine::new(Script::default());
        let session = Session::with_engine(&config(), &engine).unwrap();
        drop(session);
        assert_eq!(engine.stats.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_insufficient_input_still_counts() {
        let engine = ScriptedEngine::new(Script::default());
        let mut session = Session::with_engine(&config(), &engine).unwrap();
        assert_eq!(
            session.write(&[0u8; 6]),
            Err(ResampleError::InsufficientInput)
        );
        assert_eq!(session.frames_in(), 3);
        let out = session.write(&[0u8; 6]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(session.frames_out(), 1);
    }

    #[test]
    fn test_cumulative_sizing_has_no_drift() {
        let engine = ScriptedEngine::new(Script::default());
        let cfg = SessionConfig::new(44100.0, 16000.0, 1, SampleFormat::I16);
        let mut session = Session::with_engine(&cfg, &engine).unwrap();
        let mut total = 0;
        for _ in 0..1000 {
            match session.write(&[0u8; 2 * 7]) {
                Ok(out) => total += out.len() / 2,
                Err(ResampleError::InsufficientInput) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(total as u64, 7000 * 16000 / 44100);
    }

    #[test]
    fn test_drain_state() {
        let engine = ScriptedEngine::new(Script {
            hold_back: 5,
            ..Default::default()
        });
        let mut session = Session::with_engine(&config(), &engine).unwrap();
        session.write(&[0u8; 2 * 600]).unwrap();
        assert_eq!(
            session.write(&[0u8; 3]),
            Err(ResampleError::InsufficientInput)
        );
        assert_eq!(session.pending_bytes(), 1);

        let tail = session.drain().unwrap();
        assert!(tail.is_empty());
        assert!(session.is_drained());
        assert_eq!(session.pending_bytes(), 0);
        assert_eq!(session.write(&[0u8; 12]), Err(ResampleError::EndOfStream));
        assert_eq!(session.drain(), Err(ResampleError::EndOfStream));
        assert!(session.close().is_ok());
    }

    #[test]
    fn test_debug_output() {
        let engine = ScriptedEngine::new(Script::default());
        let session = Session::with_engine(&config(), &engine).unwrap();
        let s = format!("{:?}", session);
        assert!(s.contains("Session"));
        assert!(s.contains("48000"));
    }
}
