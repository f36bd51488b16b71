//! Sequential chunk scanning.
//!
//! [`ChunkScanner`] walks the chunk list of an already-validated container,
//! one header at a time. Every chunk is either opened as a [`Chunk`] view or
//! skipped; either way the scanner only moves on once the previous chunk's
//! payload and pad byte have been consumed.
//!
//! [`ScanState`] is the rewind bookkeeping for dialects whose sound-data
//! chunk may precede the description chunk.

use std::io::{self, Read, Seek, SeekFrom};

use super::aiff;
use super::caf;
use super::chunk::{self, Chunk, ChunkHeader};
use super::endian;
use super::error::{ContainerError, Result};
use super::formats::{Container, Dialect, StreamMetadata};
use super::ieee80::ExtendedFloatMode;
use super::wav;

/// Reads and validates the container header, starting at the magic
///
/// With `expected` set, any other magic is rejected; otherwise the dialect is
/// sniffed from the magic.
pub fn read_container<R: Read + ?Sized>(r: &mut R, expected: Option<Dialect>) -> Result<Container> {
    let magic = endian::read_fourcc(r)?;
    let dialect = match (Dialect::sniff(magic.as_bytes()), expected) {
        (Some(found), Some(want)) if found != want => {
            return Err(ContainerError::UnsupportedFormat(format!(
                "expected {} magic {}, found {}",
                want,
                want.magic(),
                magic
            )))
        }
        (Some(found), _) => found,
        (None, _) => {
            return Err(ContainerError::UnsupportedFormat(format!(
                "unknown magic {}",
                magic
            )))
        }
    };

    match dialect {
        Dialect::Aiff => aiff::read_header_body(r),
        Dialect::Wav => wav::read_header_body(r),
        Dialect::Caf => caf::read_header_body(r),
    }
}

/// Decodes the dialect's description chunk from an open chunk view
pub fn read_description<R: Read + ?Sized>(
    chunk: &mut Chunk<'_, R>,
    container: &Container,
    mode: ExtendedFloatMode,
) -> Result<StreamMetadata> {
    match container.dialect {
        Dialect::Aiff => aiff::read_comm(chunk, container, mode),
        Dialect::Wav => wav::read_fmt(chunk),
        Dialect::Caf => caf::read_desc(chunk),
    }
}

/// Rewind bookkeeping while looking for the description chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    /// Description not seen yet and nothing passed over
    #[default]
    ScanningForDescription,
    /// Description not seen yet; `first_skipped` is the header offset of the
    /// first chunk passed over
    Skipping { first_skipped: u64 },
    DescriptionFound,
}

/// Input to [`ScanState::transition`], carrying the chunk's header offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// A non-description chunk was passed over
    Skipped { header_at: u64 },
    /// The description chunk was decoded
    Description { header_at: u64 },
}

/// What the caller must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    Continue,
    /// Description found with nothing skipped; the stream is already where
    /// chunk delivery should resume
    Stop,
    /// Seek back to the header of the first chunk skipped
    Rewind { to: u64 },
}

impl ScanState {
    pub fn transition(self, event: ScanEvent) -> (ScanState, ScanAction) {
        match (self, event) {
            (ScanState::ScanningForDescription, ScanEvent::Skipped { header_at }) => (
                ScanState::Skipping {
                    first_skipped: header_at,
                },
                ScanAction::Continue,
            ),
            (ScanState::Skipping { .. }, ScanEvent::Skipped { .. }) => (self, ScanAction::Continue),
            (ScanState::ScanningForDescription, ScanEvent::Description { .. }) => {
                (ScanState::DescriptionFound, ScanAction::Stop)
            }
            (ScanState::Skipping { first_skipped }, ScanEvent::Description { .. }) => (
                ScanState::DescriptionFound,
                ScanAction::Rewind { to: first_skipped },
            ),
            (ScanState::DescriptionFound, _) => (ScanState::DescriptionFound, ScanAction::Continue),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ScanState::DescriptionFound)
    }
}

/// Walks chunk headers over a byte stream
pub struct ChunkScanner<R> {
    reader: R,
    dialect: Dialect,
    position: u64,
    /// Header returned by `next_header` and not yet opened or skipped
    current: Option<ChunkHeader>,
    pending_pad: u64,
    exhausted: bool,
}

impl<R> ChunkScanner<R> {
    /// `position` is the stream offset of the first chunk header
    pub fn new(reader: R, dialect: Dialect, position: u64) -> Self {
        Self {
            reader,
            dialect,
            position,
            current: None,
            pending_pad: 0,
            exhausted: false,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Starts over at `position` with a different dialect; the reader is
    /// assumed to be there already
    pub fn reset(&mut self, dialect: Dialect, position: u64) {
        self.dialect = dialect;
        self.position = position;
        self.current = None;
        self.pending_pad = 0;
        self.exhausted = false;
    }

    /// Stream offset the scanner has consumed up to
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn after_payload(&mut self, header: &ChunkHeader) {
        match header.size {
            Some(size) => {
                self.position = header.offset.saturating_add(size);
                self.pending_pad = header.pad_len(self.dialect);
            }
            None => self.exhausted = true,
        }
    }
}

impl<R: Read> ChunkScanner<R> {
    /// Reads the next chunk header, first skipping whatever remains of the
    /// previous chunk
    ///
    /// Returns `Ok(None)` at end of stream.
    pub fn next_header(&mut self) -> Result<Option<ChunkHeader>> {
        self.settle()?;
        if self.exhausted {
            return Ok(None);
        }
        match chunk::read_header(&mut self.reader, self.dialect, self.position)? {
            Some(header) => {
                self.position = header.offset;
                self.current = Some(header);
                Ok(Some(header))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Opens a view over the chunk whose header was just read
    pub fn open(&mut self) -> Option<Chunk<'_, R>> {
        let header = self.current.take()?;
        self.after_payload(&header);
        let order = self.dialect.byte_order();
        Some(Chunk::new(&mut self.reader, header, order))
    }

    /// Reads the next header and opens it
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'_, R>>> {
        if self.next_header()?.is_none() {
            return Ok(None);
        }
        Ok(self.open())
    }

    /// Discards the current chunk without parsing it
    pub fn skip(&mut self) -> Result<()> {
        self.settle()
    }

    fn settle(&mut self) -> Result<()> {
        if let Some(header) = self.current.take() {
            self.after_payload(&header);
            let order = self.dialect.byte_order();
            Chunk::new(&mut self.reader, header, order).done()?;
        }
        if self.pending_pad > 0 {
            let mut pad = [0u8; 1];
            // A missing final pad byte is tolerated
            let n = loop {
                match self.reader.read(&mut pad) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            };
            self.position += n as u64;
            self.pending_pad = 0;
            if n == 0 {
                self.exhausted = true;
            }
        }
        Ok(())
    }
}

impl<R: Read + Seek> ChunkScanner<R> {
    /// Returns to an earlier chunk header, once the current chunk is settled
    pub fn rewind_to(&mut self, target: u64) -> Result<()> {
        self.settle()?;
        if target > self.position {
            return Err(ContainerError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "rewind target is ahead of the scanner",
            )));
        }
        log::debug!("Rewinding {} bytes to offset {}", self.position - target, target);
        self.seek_to(target)
    }

    /// Repositions at an absolute chunk-header offset
    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(position))?;
        self.position = position;
        self.current = None;
        self.pending_pad = 0;
        self.exhausted = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::error::ErrorKind;
    use crate::sound::fourcc::FourCC;
    use std::io::Cursor;

    fn chunk_list(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        for (id, payload) in chunks {
            data.extend_from_slice(*id);
            data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            data.extend_from_slice(payload);
            if payload.len() % 2 == 1 {
                data.push(0);
            }
        }
        data
    }

    #[test]
    fn test_transition_in_order() {
        let state = ScanState::default();
        let (state, action) = state.transition(ScanEvent::Description { header_at: 12 });
        assert_eq!(state, ScanState::DescriptionFound);
        assert_eq!(action, ScanAction::Stop);
    }

    #[test]
    fn test_transition_remembers_first_skipped() {
        let state = ScanState::default();
        let (state, action) = state.transition(ScanEvent::Skipped { header_at: 12 });
        assert_eq!(action, ScanAction::Continue);
        let (state, _) = state.transition(ScanEvent::Skipped { header_at: 120 });
        assert_eq!(state, ScanState::Skipping { first_skipped: 12 });
        let (state, action) = state.transition(ScanEvent::Description { header_at: 142 });
        assert!(state.is_found());
        assert_eq!(action, ScanAction::Rewind { to: 12 });
    }

    #[test]
    fn test_transition_after_found_never_rewinds() {
        let state = ScanState::DescriptionFound;
        let (state, action) = state.transition(ScanEvent::Description { header_at: 12 });
        assert_eq!(state, ScanState::DescriptionFound);
        assert_eq!(action, ScanAction::Continue);
        let (_, action) = state.transition(ScanEvent::Skipped { header_at: 40 });
        assert_eq!(action, ScanAction::Continue);
    }

    #[test]
    fn test_scanner_walks_and_pads() {
        let data = chunk_list(&[(b"fmt ", &[1, 2, 3]), (b"LIST", &[]), (b"data", &[9, 9])]);
        let mut scanner = ChunkScanner::new(Cursor::new(data), Dialect::Wav, 0);

        let h = scanner.next_header().unwrap().unwrap();
        assert_eq!(h.id, FourCC::FMT);
        assert_eq!(h.size, Some(3));

        // not opened: skipped by the next call, pad byte included
        let h = scanner.next_header().unwrap().unwrap();
        assert_eq!(h.id, FourCC(*b"LIST"));
        assert_eq!(h.offset, 20);

        let h = scanner.next_header().unwrap().unwrap();
        assert_eq!(h.id, FourCC::DATA);
        let mut chunk = scanner.open().unwrap();
        let mut buf = Vec::new();
        chunk.read_to_end(&mut buf).unwrap();
        drop(chunk);
        assert_eq!(buf, vec![9, 9]);

        assert!(scanner.next_header().unwrap().is_none());
        assert!(scanner.next_header().unwrap().is_none());
        assert_eq!(scanner.position(), 30);
    }

    #[test]
    fn test_open_then_partial_read_leaves_boundary() {
        let data = chunk_list(&[(b"JUNK", &[1, 2, 3, 4, 5]), (b"data", &[7])]);
        let mut scanner = ChunkScanner::new(Cursor::new(data), Dialect::Wav, 0);
        {
            let mut chunk = scanner.next_chunk().unwrap().unwrap();
            assert_eq!(chunk.read_u8().unwrap(), 1);
        }
        let chunk = scanner.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.id(), FourCC::DATA);
        assert_eq!(chunk.header().offset, 22);
    }

    #[test]
    fn test_truncated_header_is_fatal() {
        let mut data = chunk_list(&[(b"JUNK", &[0, 0])]);
        data.extend_from_slice(b"da");
        let mut scanner = ChunkScanner::new(Cursor::new(data), Dialect::Wav, 0);
        scanner.next_header().unwrap().unwrap();
        let err = scanner.next_header().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedStream);
    }

    #[test]
    fn test_rewind_replays_chunks() {
        let data = chunk_list(&[(b"JUNK", &[1, 2, 3]), (b"data", &[4, 5])]);
        let mut scanner = ChunkScanner::new(Cursor::new(data), Dialect::Wav, 0);
        let first = scanner.next_header().unwrap().unwrap();
        scanner.next_header().unwrap().unwrap();
        scanner.rewind_to(first.start(Dialect::Wav)).unwrap();
        assert_eq!(scanner.position(), 0);
        assert_eq!(scanner.next_header().unwrap().unwrap(), first);
    }

    #[test]
    fn test_rewind_after_missing_final_pad() {
        let mut data = chunk_list(&[(b"data", &[1, 2, 3, 4]), (b"fmt ", &[0; 17])]);
        data.pop();
        let mut scanner = ChunkScanner::new(Cursor::new(data), Dialect::Wav, 0);
        let first = scanner.next_header().unwrap().unwrap();
        scanner.next_header().unwrap().unwrap();
        assert!(scanner.next_header().unwrap().is_none());
        assert_eq!(scanner.position(), 37);

        scanner.rewind_to(first.start(Dialect::Wav)).unwrap();
        assert_eq!(scanner.position(), 0);
        assert_eq!(scanner.next_header().unwrap().unwrap(), first);
    }

    #[test]
    fn test_rewind_ahead_is_rejected() {
        let data = chunk_list(&[(b"JUNK", &[1, 2])]);
        let mut scanner = ChunkScanner::new(Cursor::new(data), Dialect::Wav, 0);
        assert!(scanner.rewind_to(4).is_err());
    }

    #[test]
    fn test_read_container_rejects_bad_magic() {
        let mut data = b"XXXX".to_vec();
        data.extend_from_slice(&[0u8; 8]);
        let err = read_container(&mut Cursor::new(&data), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

        let mut riff = b"RIFF".to_vec();
        riff.extend_from_slice(&4u32.to_le_bytes());
        riff.extend_from_slice(b"WAVE");
        let err = read_container(&mut Cursor::new(&riff), Some(Dialect::Aiff)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        let container = read_container(&mut Cursor::new(&riff), None).unwrap();
        assert_eq!(container.dialect, Dialect::Wav);
    }
}
