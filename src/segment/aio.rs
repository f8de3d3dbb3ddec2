//! Suspension-capable forms of the segment codec.
//!
//! Same wire format and buffering rules as the blocking forms; the writer
//! consumes a stream of byte chunks and the reader yields [`Bytes`] chunks,
//! matching the shapes of the `tokio-postgres` copy API.

use std::io;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{MAX_SEGMENT_SIZE, check_buffer_size, check_segment_size};
use crate::error::Error;

/// Writes segments to an underlying async byte sink.
pub struct SegmentWriter<W: AsyncWrite + Unpin> {
    out: W,
}

impl<W: AsyncWrite + Unpin> SegmentWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write one string segment. The UTF-8 encoding must fit a single
    /// segment (32767 bytes).
    pub async fn write_string(&mut self, s: &str) -> Result<(), Error> {
        let bytes = s.as_bytes();
        if bytes.len() > MAX_SEGMENT_SIZE {
            return Err(Error::StringTooLarge(bytes.len()));
        }
        self.write_segment(bytes).await
    }

    /// Copy a chunk stream to the sink as one data block. Chunks are
    /// re-framed into segments of exactly `segment_size` bytes (the last may
    /// be shorter), so the emitted bytes depend only on the stream content
    /// and `segment_size`, never on how the source happened to chunk it.
    ///
    /// Returns the number of payload bytes copied.
    pub async fn copy_from_stream<S>(&mut self, mut src: S, segment_size: usize) -> Result<u64, Error>
    where
        S: Stream<Item = Result<Bytes, Error>> + Unpin,
    {
        check_segment_size(segment_size)?;
        let mut pending = BytesMut::new();
        let mut total = 0u64;
        while let Some(chunk) = src.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;
            pending.extend_from_slice(&chunk);
            while pending.len() >= segment_size {
                let segment = pending.split_to(segment_size);
                self.write_segment(&segment).await?;
            }
        }
        if !pending.is_empty() {
            self.write_segment(&pending).await?;
        }
        self.end_block().await?;
        Ok(total)
    }

    /// Write the zero-length end-of-data-block sentinel.
    pub(crate) async fn end_block(&mut self) -> Result<(), Error> {
        self.out.write_all(&0i16.to_le_bytes()).await?;
        Ok(())
    }

    async fn write_segment(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.out.write_all(&(payload.len() as i16).to_le_bytes()).await?;
        self.out.write_all(payload).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), Error> {
        self.out.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Reads segments from an underlying async byte source.
pub struct SegmentReader<R: AsyncRead + Unpin> {
    input: R,
}

impl<R: AsyncRead + Unpin> SegmentReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Read one string segment, or `None` if the stream ends cleanly where a
    /// length was expected.
    pub async fn read_string(&mut self) -> Result<Option<String>, Error> {
        let Some(len) = self.read_length().await? else {
            return Ok(None);
        };
        if len < 0 {
            return Err(Error::InvalidSegmentLength(len));
        }
        let mut buf = vec![0u8; len as usize];
        self.input
            .read_exact(&mut buf)
            .await
            .map_err(eof_as_truncated)?;
        Ok(Some(String::from_utf8(buf)?))
    }

    /// A chunk puller over the upcoming data block.
    pub fn block_reader(&mut self, buffer_size: usize) -> Result<BlockReader<'_, R>, Error> {
        check_buffer_size(buffer_size)?;
        Ok(BlockReader {
            source: self,
            buf: BytesMut::with_capacity(buffer_size),
            buffer_size,
            segment_remaining: 0,
            done: false,
        })
    }

    async fn read_length(&mut self) -> Result<Option<i16>, Error> {
        let mut len = [0u8; 2];
        let n = self.input.read(&mut len[..1]).await?;
        if n == 0 {
            return Ok(None);
        }
        self.input
            .read_exact(&mut len[1..])
            .await
            .map_err(eof_as_truncated)?;
        Ok(Some(i16::from_le_bytes(len)))
    }
}

/// Pulls a data block as chunks of at most `buffer_size` bytes.
///
/// Same state machine as the blocking [`super::BlockReader`]: bytes left in
/// the current segment, a done flag for the sentinel, and an accumulation
/// buffer that crosses segment boundaries without over-reading the block.
pub struct BlockReader<'a, R: AsyncRead + Unpin> {
    source: &'a mut SegmentReader<R>,
    buf: BytesMut,
    buffer_size: usize,
    segment_remaining: usize,
    done: bool,
}

impl<R: AsyncRead + Unpin> BlockReader<'_, R> {
    /// Next chunk of the block, at most `buffer_size` bytes; `None` once the
    /// sentinel is reached.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        while self.buf.len() < self.buffer_size {
            if self.segment_remaining == 0 {
                if self.done {
                    break;
                }
                let Some(len) = self.source.read_length().await? else {
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
            let want = (self.buffer_size - self.buf.len()).min(self.segment_remaining);
            let start = self.buf.len();
            self.buf.resize(start + want, 0);
            self.source
                .input
                .read_exact(&mut self.buf[start..start + want])
                .await
                .map_err(eof_as_truncated)?;
            self.segment_remaining -= want;
        }
        if self.buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.buf.split().freeze()))
    }
}

fn eof_as_truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Truncated
    } else {
        Error::Io(err)
    }
}
