//! Chunk framing.
//!
//! The feed is a plain concatenation of self-describing chunks. Each chunk
//! starts with a 41-byte ASCII header:
//!
//! | offset | width | field                          |
//! |-------:|------:|--------------------------------|
//! |      0 |     1 | marker                         |
//! |      1 |     6 | chunk size, header included    |
//! |      7 |    11 | reserved                       |
//! |     18 |     3 | marker                         |
//! |     21 |     1 | exchange code                  |
//! |     22 |     2 | session code                   |
//! |     24 |     4 | category code                  |
//! |     28 |    12 | security id, blank padded      |
//! |     40 |     1 | reserved                       |
//!
//! A chunk's length is only known at its own offset, so framing is strictly
//! sequential.

use std::io::{ErrorKind, Read};

use flex_core::{Error, RawChunk, Result};
use tracing::{debug, warn};

use crate::fields::{parse_digits, parse_text};

/// Size of the chunk header in bytes.
pub const HEADER_SIZE: usize = 41;

/// Frame delimiter padding the end of a payload.
pub const PAD_BYTE: u8 = 0x11;

/// Reads chunks off a byte stream.
pub struct ChunkFramer<R> {
    reader: R,
    bytes_read: u64,
    truncated: bool,
    done: bool,
}

impl<R: Read> ChunkFramer<R> {
    /// Create a framer positioned at the start of the chunk sequence.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            bytes_read: 0,
            truncated: false,
            done: false,
        }
    }

    /// Bytes consumed from the stream so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Whether the stream ended inside a chunk.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Read the next chunk. `None` marks the end of the stream.
    ///
    /// The stream ends at the first header that cannot be read in full. A
    /// chunk whose payload is cut short also ends the stream: truncated
    /// captures are common and everything before the cut is usable.
    pub fn next_chunk(&mut self) -> Result<Option<RawChunk>> {
        if self.done {
            return Ok(None);
        }
        match self.read_chunk() {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(err) if err.is_benign() => {
                warn!(error = %err, "stream truncated mid-chunk, stopping at last complete chunk");
                self.truncated = true;
                self.done = true;
                Ok(None)
            }
            Err(err) => {
                self.done = true;
                Err(err)
            }
        }
    }

    fn read_chunk(&mut self) -> Result<Option<RawChunk>> {
        let mut header = [0u8; HEADER_SIZE];
        let got = self.fill(&mut header)?;
        if got < HEADER_SIZE {
            if got > 0 {
                debug!(trailing_bytes = got, "ignoring partial header at end of stream");
            }
            return Ok(None);
        }

        let declared = parse_digits(&header[1..7], "chunk size")?;
        let declared_size = usize::try_from(declared)
            .ok()
            .filter(|&size| size >= HEADER_SIZE)
            .ok_or_else(|| {
                Error::malformed(format!(
                    "chunk size {declared} at byte {} is smaller than its header",
                    self.bytes_read - HEADER_SIZE as u64
                ))
            })?;

        let mut payload = vec![0u8; declared_size - HEADER_SIZE];
        let offset = self.bytes_read;
        let got = self.fill(&mut payload)?;
        if got < payload.len() {
            return Err(Error::Framing {
                offset,
                expected: payload.len(),
                got,
            });
        }
        while payload.last() == Some(&PAD_BYTE) {
            payload.pop();
        }

        Ok(Some(RawChunk {
            payload,
            exchange: parse_text(&header[21..22], "exchange")?,
            session: parse_text(&header[22..24], "session")?,
            category: parse_text(&header[24..28], "category")?,
            security: parse_text(&header[28..40], "security")?,
            declared_size,
        }))
    }

    /// Read until `buf` is full or the stream ends; returns bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        self.bytes_read += filled as u64;
        Ok(filled)
    }
}

impl<R: Read> Iterator for ChunkFramer<R> {
    type Item = Result<RawChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}
