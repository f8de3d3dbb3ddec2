//! Length-prefixed segment framing over byte streams.
//!
//! A dump is a sequence of segments: a 2-byte signed little-endian length
//! followed by that many payload bytes. A zero length is the end-of-data-block
//! sentinel; negative lengths are invalid. The writer's segment size and the
//! reader's buffer size are independent and may differ arbitrarily.

use std::io::{self, Read, Write};

use crate::error::Error;

pub mod aio;

/// Largest payload a single segment can carry.
pub const MAX_SEGMENT_SIZE: usize = i16::MAX as usize;

/// Default data segment payload size used by backup.
pub const DEFAULT_SEGMENT_SIZE: usize = 8192;

/// Default read-side buffer size used by restore.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

pub(crate) fn check_segment_size(segment_size: usize) -> Result<(), Error> {
    if segment_size == 0 || segment_size > MAX_SEGMENT_SIZE {
        return Err(Error::SegmentSizeOutOfRange(segment_size));
    }
    Ok(())
}

pub(crate) fn check_buffer_size(buffer_size: usize) -> Result<(), Error> {
    if buffer_size == 0 {
        return Err(Error::InvalidBufferSize);
    }
    Ok(())
}

/// Writes segments to an underlying byte sink.
pub struct SegmentWriter<W: Write> {
    out: W,
}

impl<W: Write> SegmentWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write one string segment. The UTF-8 encoding must fit a single
    /// segment (32767 bytes).
    pub fn write_string(&mut self, s: &str) -> Result<(), Error> {
        let bytes = s.as_bytes();
        if bytes.len() > MAX_SEGMENT_SIZE {
            return Err(Error::StringTooLarge(bytes.len()));
        }
        self.write_segment(bytes)
    }

    /// Copy `src` to the sink as one data block: data segments of exactly
    /// `segment_size` bytes (the last may be shorter), terminated by the
    /// zero-length sentinel. Short reads from `src` are accumulated, so the
    /// emitted bytes depend only on the source content and `segment_size`.
    ///
    /// Returns the number of payload bytes copied.
    pub fn copy_from_reader<R: Read>(
        &mut self,
        src: &mut R,
        segment_size: usize,
    ) -> Result<u64, Error> {
        check_segment_size(segment_size)?;
        let mut buf = vec![0u8; segment_size];
        let mut total = 0u64;
        loop {
            let filled = fill_from(src, &mut buf)?;
            if filled > 0 {
                self.write_segment(&buf[..filled])?;
                total += filled as u64;
            }
            if filled < segment_size {
                break;
            }
        }
        self.end_block()?;
        Ok(total)
    }

    /// Write the zero-length end-of-data-block sentinel.
    pub(crate) fn end_block(&mut self) -> Result<(), Error> {
        self.out.write_all(&0i16.to_le_bytes())?;
        Ok(())
    }

    fn write_segment(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.out.write_all(&(payload.len() as i16).to_le_bytes())?;
        self.out.write_all(payload)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Reads segments from an underlying byte source.
pub struct SegmentReader<R: Read> {
    input: R,
}

impl<R: Read> SegmentReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Read one string segment, or `None` if the stream ends cleanly where a
    /// length was expected. A partial length or payload is [`Error::Truncated`].
    pub fn read_string(&mut self) -> Result<Option<String>, Error> {
        let Some(len) = self.read_length()? else {
            return Ok(None);
        };
        if len < 0 {
            return Err(Error::InvalidSegmentLength(len));
        }
        let mut buf = vec![0u8; len as usize];
        read_full(&mut self.input, &mut buf)?;
        Ok(Some(String::from_utf8(buf)?))
    }

    /// A pull-based byte stream over the upcoming data block. Reads cross
    /// segment boundaries transparently and return `Ok(0)` exactly at the
    /// zero-length sentinel.
    pub fn block_reader(&mut self, buffer_size: usize) -> Result<BlockReader<'_, R>, Error> {
        check_buffer_size(buffer_size)?;
        Ok(BlockReader {
            source: self,
            buf: vec![0u8; buffer_size].into_boxed_slice(),
            pos: 0,
            len: 0,
            segment_remaining: 0,
            done: false,
        })
    }

    /// Read a segment length. `None` means the stream ended cleanly before
    /// the first length byte; this is the only place overall end-of-dump is
    /// detected.
    fn read_length(&mut self) -> Result<Option<i16>, Error> {
        let mut len = [0u8; 2];
        let n = loop {
            match self.input.read(&mut len[..1]) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        };
        if n == 0 {
            return Ok(None);
        }
        read_full(&mut self.input, &mut len[1..])?;
        Ok(Some(i16::from_le_bytes(len)))
    }
}

/// A [`Read`] view over one data block.
///
/// Explicit buffering state: `pos..len` is the unconsumed window of `buf`,
/// `segment_remaining` counts wire bytes left in the current segment, and
/// `done` is set once the sentinel has been consumed.
pub struct BlockReader<'a, R: Read> {
    source: &'a mut SegmentReader<R>,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    segment_remaining: usize,
    done: bool,
}

impl<R: Read> BlockReader<'_, R> {
    /// Next buffered chunk of the block, at most `buffer_size` bytes; `None`
    /// once the sentinel is reached.
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>, Error> {
        if self.pos == self.len {
            self.fill()?;
        }
        if self.len == 0 {
            return Ok(None);
        }
        let chunk = &self.buf[self.pos..self.len];
        self.pos = self.len;
        Ok(Some(chunk))
    }

    /// Refill the buffer, crossing into as many segments as needed. Stops at
    /// the sentinel; never reads wire bytes beyond it.
    fn fill(&mut self) -> Result<(), Error> {
        self.pos = 0;
        self.len = 0;
        while self.len < self.buf.len() {
            if self.segment_remaining == 0 {
                if self.done {
                    break;
                }
                let Some(len) = self.source.read_length()? else {
                    // EOF inside a data block: the sentinel never arrived.
                    return Err(Error::Truncated);
                };
                if len == 0 {
                    self.done = true;
                    break;
                }
                if len < 0 {
                    return Err(Error::InvalidSegmentLength(len));
                }
                self.segment_remaining = len as usize;
            }
            let want = (self.buf.len() - self.len).min(self.segment_remaining);
            read_full(&mut self.source.input, &mut self.buf[self.len..self.len + want])?;
            self.len += want;
            self.segment_remaining -= want;
        }
        Ok(())
    }
}

impl<R: Read> Read for BlockReader<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.pos == self.len {
            self.fill().map_err(Error::into_io)?;
        }
        if self.len == 0 {
            return Ok(0);
        }
        let n = out.len().min(self.len - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Read until `buf` is full or the source is exhausted; returns the filled
/// length.
fn fill_from<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<usize, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

/// Read exactly `buf.len()` bytes; EOF in the middle is [`Error::Truncated`].
fn read_full<R: Read>(src: &mut R, mut buf: &mut [u8]) -> Result<(), Error> {
    while !buf.is_empty() {
        match src.read(buf) {
            Ok(0) => return Err(Error::Truncated),
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
