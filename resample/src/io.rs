//! `io::Write` adapter over a resampling session.

use std::io::{self, Write};

use tracing::trace;

use crate::error::ResampleError;
use crate::session::Session;

/// Resamples everything written to it and forwards the result to `W`.
///
/// Writes of any size are accepted: incomplete frames are carried and short
/// inputs are buffered by the session, so neither is reported as an error.
/// Call [`finish`](ResampleWriter::finish) at the end of the stream to emit
/// the engine's tail and release the session.
///
/// Once the session has taken a buffer, `write` reports it as written even
/// if `W` fails. The converted bytes `W` did not accept are kept and retried
/// first by the next `write`, `flush` or `finish`, which then report the
/// error before taking any new input.
pub struct ResampleWriter<W: Write> {
    session: Session,
    inner: W,
    /// Converted bytes not yet accepted by `inner`.
    backlog: Vec<u8>,
}

impl<W: Write> ResampleWriter<W> {
    pub fn new(session: Session, inner: W) -> Self {
        Self {
            session,
            inner,
            backlog: Vec::new(),
        }
    }

    /// Gets the underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Gets a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Bytes converted but not yet accepted by the underlying writer.
    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }

    /// Drains and closes the session, then returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.write_backlog()?;
        let tail = self.session.drain()?;
        self.backlog = tail;
        self.write_backlog()?;
        self.inner.flush()?;
        self.session.close()?;
        Ok(self.inner)
    }

    /// Writes the backlog to `inner`, keeping what it did not accept.
    fn write_backlog(&mut self) -> io::Result<()> {
        let mut written = 0;
        let result = loop {
            if written == self.backlog.len() {
                break Ok(());
            }
            match self.inner.write(&self.backlog[written..]) {
                Ok(0) => break Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };
        self.backlog.drain(..written);
        result
    }
}

impl<W: Write> Write for ResampleWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_backlog()?;
        match self.session.write(buf) {
            Ok(out) => self.backlog = out,
            Err(ResampleError::IncompleteFrame | ResampleError::InsufficientInput) => {}
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = self.write_backlog() {
            trace!(error = %e, kept = self.backlog.len(), "output write failed");
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_backlog()?;
        self.inner.flush()
    }
}
