//! Chunk headers and the bounded view over one chunk's payload.
//!
//! A [`Chunk`] mutably borrows the shared stream, so nothing else can read
//! from it while the view is alive. Releasing the view (explicitly with
//! [`Chunk::done`] or implicitly on drop) discards any unread payload, which
//! leaves the stream exactly at the end of the chunk no matter how much the
//! consumer read.

use std::io::{self, Read};

use super::endian::{self, Endian};
use super::error::{ContainerError, Result};
use super::formats::Dialect;
use super::fourcc::{ChunkRole, ChunkTag, FourCC};

/// Id and declared length of one chunk, plus where its payload starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: FourCC,
    /// Declared payload length; `None` means the chunk runs to end of stream
    pub size: Option<u64>,
    /// Stream offset of the first payload byte
    pub offset: u64,
}

impl ChunkHeader {
    pub fn tag(&self, dialect: Dialect) -> ChunkTag {
        ChunkTag::resolve(dialect, self.id)
    }

    pub fn role(&self, dialect: Dialect) -> ChunkRole {
        self.tag(dialect).role()
    }

    /// Payload length, treating a run-to-end chunk as unbounded
    pub fn len(&self) -> u64 {
        self.size.unwrap_or(u64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.size == Some(0)
    }

    /// Number of pad bytes following the payload
    pub fn pad_len(&self, dialect: Dialect) -> u64 {
        match self.size {
            Some(size) if dialect.pads_odd_chunks() && size % 2 == 1 => 1,
            _ => 0,
        }
    }

    /// Stream offset of the chunk header
    pub fn start(&self, dialect: Dialect) -> u64 {
        self.offset.saturating_sub(dialect.chunk_header_len())
    }

    /// Header, payload and pad bytes together
    pub fn total_len(&self, dialect: Dialect) -> u64 {
        dialect
            .chunk_header_len()
            .saturating_add(self.len())
            .saturating_add(self.pad_len(dialect))
    }

    /// Stream offset just past the payload and any pad byte
    pub fn end(&self, dialect: Dialect) -> u64 {
        self.offset
            .saturating_add(self.len())
            .saturating_add(self.pad_len(dialect))
    }
}

/// Reads a chunk header at `offset`
///
/// Returns `Ok(None)` on a clean end of stream (no bytes of the next header
/// available). A partially present header is a `TruncatedStream` error.
pub fn read_header<R: Read + ?Sized>(
    r: &mut R,
    dialect: Dialect,
    offset: u64,
) -> Result<Option<ChunkHeader>> {
    let mut id = [0u8; 4];
    let mut filled = 0;
    while filled < id.len() {
        match r.read(&mut id[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(ContainerError::TruncatedStream {
                    needed: 4,
                    available: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let size = match dialect {
        Dialect::Caf => {
            let raw = endian::read_i64(r, Endian::Big)?;
            if raw < 0 {
                None
            } else {
                Some(raw as u64)
            }
        }
        Dialect::Aiff | Dialect::Wav => Some(u64::from(endian::read_u32(r, dialect.byte_order())?)),
    };

    Ok(Some(ChunkHeader {
        id: FourCC(id),
        size,
        offset: offset + dialect.chunk_header_len(),
    }))
}

/// Bounded reader over exactly one chunk's payload
pub struct Chunk<'a, R: Read + ?Sized> {
    header: ChunkHeader,
    reader: &'a mut R,
    order: Endian,
    pos: u64,
    released: bool,
}

impl<'a, R: Read + ?Sized> Chunk<'a, R> {
    /// Wraps a stream positioned at the first payload byte of `header`
    pub fn new(reader: &'a mut R, header: ChunkHeader, order: Endian) -> Self {
        Self {
            header,
            reader,
            order,
            pos: 0,
            released: false,
        }
    }

    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    pub fn id(&self) -> FourCC {
        self.header.id
    }

    /// Declared payload length (`u64::MAX` for run-to-end chunks)
    pub fn size(&self) -> u64 {
        self.header.len()
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.size() - self.pos
    }

    pub fn byte_order(&self) -> Endian {
        self.order
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        endian::read_u8(self)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let order = self.order;
        endian::read_u16(self, order)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let order = self.order;
        endian::read_u32(self, order)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let order = self.order;
        endian::read_i64(self, order)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let order = self.order;
        endian::read_f64(self, order)
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        endian::read_fourcc(self)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        endian::read_array::<N, _>(self)
    }

    /// Skips `n` payload bytes (clamped to what remains)
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        let n = n.min(self.remaining());
        let skipped = io::copy(&mut self.by_ref().take(n), &mut io::sink())?;
        if skipped < n && self.header.size.is_some() {
            return Err(ContainerError::TruncatedStream {
                needed: n,
                available: skipped,
            });
        }
        Ok(skipped)
    }

    /// Releases the chunk, discarding unread payload
    ///
    /// Returns the number of bytes drained. Prefer this over dropping when the
    /// caller wants to see a truncated payload as an error.
    pub fn done(mut self) -> Result<u64> {
        self.released = true;
        self.drain()
    }

    fn drain(&mut self) -> Result<u64> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(0);
        }
        self.skip(remaining)
    }
}

impl<R: Read + ?Sized> Read for Chunk<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.reader.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + ?Sized> Drop for Chunk<'_, R> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.drain() {
            log::warn!("Failed to drain chunk {}: {}", self.header.id, e);
        }
    }
}
