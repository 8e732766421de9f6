//! Bounded capture of an arbitrary-length byte stream.
//!
//! [`BoundedCapture`] retains the first N and the last N bytes written to
//! it, so the stderr of a long-running build can be turned into a readable
//! diagnostic without holding the whole stream in memory. Writes are O(1)
//! amortized regardless of total stream length and never fail.

use std::io::{self, Write};

/// Retains the first `limit` bytes and the last `limit` bytes written.
///
/// Once more than `limit` bytes have been seen, the most recent bytes are
/// kept in a fixed-size ring buffer; [`BoundedCapture::bytes`] reconstructs
/// them in chronological order and inserts a marker noting how many bytes
/// in the middle were dropped.
#[derive(Debug)]
pub struct BoundedCapture {
    limit: usize,
    prefix: Vec<u8>,
    /// Ring buffer once it reaches `limit` bytes.
    suffix: Vec<u8>,
    /// Next write position within `suffix` once it is full.
    suffix_off: usize,
    skipped: u64,
}

impl BoundedCapture {
    /// Create a capture keeping at most `limit` bytes of prefix and suffix.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            prefix: Vec::new(),
            suffix: Vec::new(),
            suffix_off: 0,
            skipped: 0,
        }
    }

    /// Append a chunk to the capture.
    pub fn push(&mut self, mut chunk: &[u8]) {
        chunk = Self::fill(&mut self.prefix, chunk, self.limit);

        // Anything beyond the last `limit` bytes of this chunk can never be
        // part of the suffix.
        if chunk.len() > self.limit {
            let overage = chunk.len() - self.limit;
            self.skipped += overage as u64;
            chunk = &chunk[overage..];
        }

        chunk = Self::fill(&mut self.suffix, chunk, self.limit);

        // The suffix ring is full if any bytes remain. Overwrite in a circle.
        while !chunk.is_empty() {
            let n = chunk.len().min(self.limit - self.suffix_off);
            self.suffix[self.suffix_off..self.suffix_off + n].copy_from_slice(&chunk[..n]);
            chunk = &chunk[n..];
            self.skipped += n as u64;
            self.suffix_off += n;
            if self.suffix_off == self.limit {
                self.suffix_off = 0;
            }
        }
    }

    /// Append up to `limit - dst.len()` bytes of `chunk` to `dst`, returning
    /// the un-appended remainder.
    fn fill<'a>(dst: &mut Vec<u8>, chunk: &'a [u8], limit: usize) -> &'a [u8] {
        let remain = limit.saturating_sub(dst.len());
        let take = chunk.len().min(remain);
        dst.extend_from_slice(&chunk[..take]);
        &chunk[take..]
    }

    /// Reconstruct the captured stream.
    ///
    /// If everything fit in the prefix, this is exactly what was written.
    /// Otherwise the suffix follows in chronological order, preceded by an
    /// elision marker when bytes were dropped in the middle.
    pub fn bytes(&self) -> Vec<u8> {
        if self.suffix.is_empty() {
            return self.prefix.clone();
        }
        if self.skipped == 0 {
            let mut out = self.prefix.clone();
            out.extend_from_slice(&self.suffix);
            return out;
        }
        let marker = format!("\n... omitting {} bytes ...\n", self.skipped);
        let mut out = Vec::with_capacity(self.prefix.len() + marker.len() + self.suffix.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(marker.as_bytes());
        out.extend_from_slice(&self.suffix[self.suffix_off..]);
        out.extend_from_slice(&self.suffix[..self.suffix_off]);
        out
    }

    /// Total number of bytes dropped from the middle of the stream.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Write for BoundedCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
