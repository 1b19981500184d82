//! resample - Convert raw PCM between sample rates.
//!
//! Reads interleaved PCM from a file or stdin, streams it through a
//! resampling session in fixed-size chunks and writes the converted PCM to
//! a file or stdout.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use giztoy_resample::{Quality, ResampleWriter, SampleFormat, Session, SessionConfig};
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CHUNK: usize = 4096;

/// Convert raw PCM between sample rates.
///
/// Input and output are headerless interleaved little-endian PCM. Use `-`
/// (or omit the path) for stdin and stdout.
///
/// A YAML config file may supply the session parameters:
///
///   input_rate: 48000
///   output_rate: 16000
///   channels: 2
///   format: i16
///   quality: very_high
///
/// Flags given on the command line override the file.
#[derive(Parser, Debug)]
#[command(name = "resample")]
#[command(about = "Convert raw PCM between sample rates")]
#[command(version)]
struct Cli {
    /// Input file (default: stdin)
    input: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Input sample rate in Hz
    #[arg(long, value_name = "HZ")]
    from: Option<f64>,

    /// Output sample rate in Hz
    #[arg(long, value_name = "HZ")]
    to: Option<f64>,

    /// Number of interleaved channels (default: 1)
    #[arg(short = 'c', long)]
    channels: Option<u32>,

    /// Sample format: i16, i32, f32, f64 (default: i16)
    #[arg(short = 'f', long)]
    format: Option<SampleFormat>,

    /// Quality: quick, low, medium, high, very-high (default: high)
    #[arg(short = 'q', long)]
    quality: Option<Quality>,

    /// Engine worker threads (default: all cores)
    #[arg(long)]
    threads: Option<NonZeroUsize>,

    /// Bytes read and written per step
    #[arg(long, value_name = "BYTES")]
    chunk: Option<usize>,

    /// Conversion engine
    #[arg(long, value_enum)]
    engine: Option<Engine>,

    /// Session config file (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Engine {
    #[default]
    Rubato,
    Soxr,
}

/// Contents of a `--config` file.
#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(flatten)]
    session: SessionConfig,
    #[serde(default)]
    chunk: Option<usize>,
    #[serde(default)]
    engine: Option<Engine>,
}

/// What a run moved through the session.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    bytes_in: u64,
    bytes_out: u64,
    frames_in: u64,
    frames_out: u64,
}

/// Settings resolved from the config file and flags.
#[derive(Debug)]
struct Plan {
    session: SessionConfig,
    chunk: usize,
    engine: Engine,
}

impl Cli {
    fn plan(&self) -> Result<Plan> {
        let file = match &self.config {
            Some(path) => Some(load_config(path)?),
            None => None,
        };

        let (mut session, file_chunk, file_engine) = match file {
            Some(f) => (f.session, f.chunk, f.engine),
            None => {
                let (Some(from), Some(to)) = (self.from, self.to) else {
                    bail!("--from and --to are required without --config");
                };
                (SessionConfig::new(from, to, 1, SampleFormat::I16), None, None)
            }
        };

        if let Some(rate) = self.from {
            session.input_rate = rate;
        }
        if let Some(rate) = self.to {
            session.output_rate = rate;
        }
        if let Some(channels) = self.channels {
            session.channels = channels;
        }
        if let Some(format) = self.format {
            session.format = format;
        }
        if let Some(quality) = self.quality {
            session.quality = quality;
        }
        if let Some(threads) = self.threads {
            session.parallelism = Some(threads);
        }
        session.validate().context("invalid session config")?;

        let chunk = self.chunk.or(file_chunk).unwrap_or(DEFAULT_CHUNK);
        if chunk == 0 {
            bail!("--chunk must be greater than zero");
        }

        Ok(Plan {
            session,
            chunk,
            engine: self.engine.or(file_engine).unwrap_or_default(),
        })
    }
}

fn load_config(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn is_stdio(path: &Option<PathBuf>) -> bool {
    path.as_deref().is_none_or(|p| p == Path::new("-"))
}

fn open_input(path: &Option<PathBuf>) -> Result<Box<dyn Read>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let path = path.as_deref().unwrap_or(Path::new("-"));
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_output(path: &Option<PathBuf>) -> Result<Box<dyn Write>> {
    if is_stdio(path) {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let path = path.as_deref().unwrap_or(Path::new("-"));
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn open_session(plan: &Plan) -> Result<Session> {
    match plan.engine {
        Engine::Rubato => Session::new(&plan.session).context("failed to open session"),
        #[cfg(feature = "soxr")]
        Engine::Soxr => Session::with_engine(&plan.session, &giztoy_resample::SoxrEngine)
            .context("failed to open soxr session"),
        #[cfg(not(feature = "soxr"))]
        Engine::Soxr => bail!("soxr engine not compiled in (build with --features soxr)"),
    }
}

/// Counts bytes on their way to the output.
struct Counted<W> {
    inner: W,
    bytes: u64,
}

impl<W: Write> Write for Counted<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn resample(plan: &Plan, mut input: impl Read, output: impl Write) -> Result<Summary> {
    let session = open_session(plan)?;
    let frame_bytes = session.frame_bytes() as u64;
    let mut writer = ResampleWriter::new(session, Counted { inner: output, bytes: 0 });

    let mut buf = vec![0u8; plan.chunk];
    let mut bytes_in = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("failed to read input"),
        };
        writer.write_all(&buf[..n]).context("failed to resample")?;
        bytes_in += n as u64;
    }

    let frames_in = writer.session().frames_in();
    let pending = writer.session().pending_bytes();
    if pending > 0 {
        debug!(pending, "dropping incomplete trailing frame");
    }
    let output = writer.finish().context("failed to finish stream")?;

    Ok(Summary {
        bytes_in,
        bytes_out: output.bytes,
        frames_in,
        frames_out: output.bytes / frame_bytes,
    })
}

fn run(cli: &Cli) -> Result<Summary> {
    let plan = cli.plan()?;
    info!(
        from = plan.session.input_rate,
        to = plan.session.output_rate,
        channels = plan.session.channels,
        format = %plan.session.format,
        quality = %plan.session.quality,
        engine = ?plan.engine,
        chunk = plan.chunk,
        "resampling"
    );
    let input = open_input(&cli.input)?;
    let output = open_output(&cli.output)?;
    resample(&plan, input, output)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let summary = run(&cli)?;
    info!(
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        frames_in = summary.frames_in,
        frames_out = summary.frames_out,
        "done"
    );
    Ok(())
}
