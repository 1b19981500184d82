//! Frame alignment across writes.

use std::borrow::Cow;

/// Keeps input aligned to whole frames across successive writes.
///
/// Bytes that do not complete a frame are held back (at most
/// `frame_bytes - 1` of them) and prepended to the next input.
#[derive(Debug)]
pub(crate) struct FrameAligner {
    /// Holds leftover bytes of an incomplete frame.
    carry: Vec<u8>,
    /// Bytes per interleaved frame.
    frame_bytes: usize,
}

impl FrameAligner {
    pub fn new(frame_bytes: usize) -> Self {
        Self {
            carry: Vec::with_capacity(frame_bytes.saturating_sub(1)),
            frame_bytes,
        }
    }

    /// Returns the whole frames available from the carried bytes plus
    /// `input`. Any unaligned tail is carried into the next call.
    pub fn align<'a>(&mut self, input: &'a [u8]) -> Cow<'a, [u8]> {
        if self.carry.is_empty() {
            let aligned = input.len() - input.len() % self.frame_bytes;
            self.carry.extend_from_slice(&input[aligned..]);
            return Cow::Borrowed(&input[..aligned]);
        }

        let mut joined = std::mem::take(&mut self.carry);
        joined.extend_from_slice(input);
        let aligned = joined.len() - joined.len() % self.frame_bytes;
        self.carry.extend_from_slice(&joined[aligned..]);
        joined.truncate(aligned);
        Cow::Owned(joined)
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Drops the carried bytes, returning how many there were.
    pub fn discard(&mut self) -> usize {
        let n = self.carry.len();
        self.carry.clear();
        n
    }
}
