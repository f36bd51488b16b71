//! Container decoder
//!
//! [`Decoder`] drives a [`ChunkScanner`] over a seekable stream:
//!
//! - `read_header` validates the magic and container header
//! - `read_info` finds and decodes the description chunk, rewinding to the
//!   first chunk when it had to skip chunks to get there
//! - `next_chunk` hands every other chunk to the caller, in file order
//! - `pcm` opens a frame-counted cursor over the sound-data chunk
//!
//! Header and description errors are fatal: the decoder remembers the error
//! kind, drops its partial state and refuses every later call.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use super::aiff;
use super::caf;
use super::chunk::{Chunk, ChunkHeader};
use super::codec::SampleCodec;
use super::encoder::Encoder;
use super::error::{ContainerError, ErrorKind, Result};
use super::formats::{Container, Dialect, PcmFormat, StreamMetadata};
use super::fourcc::ChunkRole;
use super::ieee80::ExtendedFloatMode;
use super::pcm::{PcmCursor, PcmLayout};
use super::scanner::{self, ChunkScanner, ScanAction, ScanEvent, ScanState};

/// Frames moved per block by [`Decoder::frames`] and [`transcode`]
const BLOCK_FRAMES: usize = 4096;

/// Decoder settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    /// How AIFF 80-bit sample rates are turned into integers
    pub extended_float: ExtendedFloatMode,
}

/// Chunk-based audio container decoder
pub struct Decoder<R> {
    scanner: ChunkScanner<R>,
    options: DecoderOptions,
    forced: Option<Dialect>,
    container: Option<Container>,
    metadata: Option<StreamMetadata>,
    state: ScanState,
    /// Payload offset of the description chunk that was decoded
    description_at: Option<u64>,
    sound_data: Option<ChunkHeader>,
    first_checked: bool,
    /// The reader was moved outside the scanner
    needs_resync: bool,
    failed: Option<ErrorKind>,
}

impl Decoder<BufReader<File>> {
    /// Opens a file for decoding; the dialect is sniffed from its magic
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Decoder::new(BufReader::new(file)))
    }
}

impl<R: Read + Seek> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            scanner: ChunkScanner::new(reader, Dialect::Aiff, 0),
            options: DecoderOptions::default(),
            forced: None,
            container: None,
            metadata: None,
            state: ScanState::default(),
            description_at: None,
            sound_data: None,
            first_checked: false,
            needs_resync: false,
            failed: None,
        }
    }

    /// Accepts only `dialect`'s magic instead of sniffing
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.forced = Some(dialect);
        self
    }

    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Dialect of the container, once the header has been read
    pub fn dialect(&self) -> Option<Dialect> {
        self.container().map(|c| c.dialect)
    }

    /// Container header; `None` before `read_header` or after a fatal error
    pub fn container(&self) -> Option<&Container> {
        if self.failed.is_some() {
            return None;
        }
        self.container.as_ref()
    }

    /// Stream description; `None` until decoded or after a fatal error
    pub fn metadata(&self) -> Option<&StreamMetadata> {
        if self.failed.is_some() {
            return None;
        }
        self.metadata.as_ref()
    }

    /// Header of the sound-data chunk, if one has been seen
    pub fn sound_data_location(&self) -> Option<ChunkHeader> {
        self.sound_data
    }

    /// Error kind that made the decoder unusable
    pub fn failure(&self) -> Option<ErrorKind> {
        self.failed
    }

    /// Stream offset of the next chunk header the scanner will read
    pub fn position(&self) -> u64 {
        self.scanner.position()
    }

    pub fn get_ref(&self) -> &R {
        self.scanner.get_ref()
    }

    pub fn into_inner(self) -> R {
        self.scanner.into_inner()
    }

    fn check_failed(&self) -> Result<()> {
        match self.failed {
            Some(kind) => Err(ContainerError::Failed(kind)),
            None => Ok(()),
        }
    }

    /// Records a fatal error and drops everything decoded so far
    fn fail(&mut self, err: ContainerError) -> ContainerError {
        log::error!("Decoding failed: {}", err);
        self.failed = Some(err.kind());
        self.container = None;
        self.metadata = None;
        self.sound_data = None;
        err
    }

    fn resync(&mut self) -> Result<()> {
        if self.needs_resync {
            let position = self.scanner.position();
            self.scanner.seek_to(position)?;
            self.needs_resync = false;
        }
        Ok(())
    }

    /// Reads and validates the container header
    pub fn read_header(&mut self) -> Result<&Container> {
        self.check_failed()?;
        if self.container.is_none() {
            match self.load_header() {
                Ok(container) => self.container = Some(container),
                Err(e) => return Err(self.fail(e)),
            }
        }
        self.container
            .as_ref()
            .ok_or(ContainerError::Failed(ErrorKind::UnsupportedFormat))
    }

    fn load_header(&mut self) -> Result<Container> {
        let reader = self.scanner.get_mut();
        let container = scanner::read_container(reader, self.forced)?;
        let position = reader.stream_position()?;
        log::debug!(
            "{} container, form type {}, first chunk at {}",
            container.dialect,
            container.form_type,
            position
        );
        self.scanner.reset(container.dialect, position);
        Ok(container)
    }

    /// Finds and decodes the description chunk
    ///
    /// Chunks passed over on the way are not delivered; when there were any,
    /// the scanner is moved back to the first of them so that `next_chunk`
    /// still sees every chunk.
    pub fn read_info(&mut self) -> Result<&StreamMetadata> {
        self.read_header()?;
        if self.metadata.is_none() {
            if let Err(e) = self.scan_for_description() {
                return Err(self.fail(e));
            }
        }
        self.metadata
            .as_ref()
            .ok_or(ContainerError::Failed(ErrorKind::MissingChunk))
    }

    fn scan_for_description(&mut self) -> Result<()> {
        self.resync()?;
        let dialect = self.scanner.dialect();
        loop {
            let header = match self.scanner.next_header()? {
                Some(header) => header,
                None => return Err(ContainerError::MissingChunk(dialect.description_id())),
            };
            self.check_first(&header)?;

            match header.role(dialect) {
                ChunkRole::Description => {
                    self.decode_description(header)?;
                    let event = ScanEvent::Description {
                        header_at: header.start(dialect),
                    };
                    let (state, action) = self.state.transition(event);
                    self.state = state;
                    if let ScanAction::Rewind { to } = action {
                        self.scanner.rewind_to(to)?;
                    }
                    return Ok(());
                }
                ChunkRole::SoundData if self.sound_data.is_none() => {
                    self.sound_data = Some(header);
                }
                _ => {}
            }
            log::debug!("Skipping {} chunk while looking for {}", header.id, dialect.description_id());
            self.scanner.skip()?;
            let (state, _) = self.state.transition(ScanEvent::Skipped {
                header_at: header.start(dialect),
            });
            self.state = state;
        }
    }

    fn check_first(&mut self, header: &ChunkHeader) -> Result<()> {
        if !self.first_checked {
            self.first_checked = true;
            if self.scanner.dialect() == Dialect::Caf {
                caf::check_first_chunk(header)?;
            }
        }
        Ok(())
    }

    fn decode_description(&mut self, header: ChunkHeader) -> Result<()> {
        let container = self
            .container
            .clone()
            .ok_or(ContainerError::Failed(ErrorKind::UnsupportedFormat))?;
        let mode = self.options.extended_float;
        let mut chunk = self
            .scanner
            .open()
            .ok_or(ContainerError::MissingChunk(header.id))?;
        let metadata = scanner::read_description(&mut chunk, &container, mode)?;
        chunk.done()?;
        self.metadata = Some(metadata);
        self.description_at = Some(header.offset);
        Ok(())
    }

    /// Returns the next chunk other than the description chunk
    ///
    /// If the description has not been decoded yet it is decoded inline when
    /// reached. A second description chunk is logged and ignored. Unread
    /// payload is discarded when the returned view is dropped.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'_, R>>> {
        self.read_header()?;
        self.resync()?;
        let dialect = self.scanner.dialect();
        loop {
            let header = match self.scanner.next_header()? {
                Some(header) => header,
                None => return Ok(None),
            };
            if let Err(e) = self.check_first(&header) {
                return Err(self.fail(e));
            }

            match header.role(dialect) {
                ChunkRole::Description => {
                    if self.metadata.is_none() {
                        if let Err(e) = self.decode_description(header) {
                            return Err(self.fail(e));
                        }
                        self.state = ScanState::DescriptionFound;
                    } else if self.description_at != Some(header.offset) {
                        log::warn!(
                            "Ignoring duplicate {} chunk at offset {}",
                            header.id,
                            header.offset
                        );
                    }
                    continue;
                }
                ChunkRole::SoundData if self.sound_data.is_none() => {
                    self.sound_data = Some(header);
                }
                _ => {}
            }
            return Ok(self.scanner.open());
        }
    }

    /// Feeds every remaining chunk to `consumer`
    ///
    /// Non-fatal consumer errors are logged and the walk continues; fatal
    /// ones end it. Returns the number of chunks delivered.
    pub fn for_each_chunk<F>(&mut self, mut consumer: F) -> Result<usize>
    where
        F: FnMut(&mut Chunk<'_, R>) -> Result<()>,
    {
        let mut delivered = 0;
        while let Some(mut chunk) = self.next_chunk()? {
            delivered += 1;
            if let Err(e) = consumer(&mut chunk) {
                if e.is_fatal() {
                    return Err(e);
                }
                log::warn!("Chunk {} at offset {}: {}", chunk.id(), chunk.header().offset, e);
            }
        }
        Ok(delivered)
    }

    /// Locates the sound-data chunk without disturbing the chunk walk
    fn locate_sound_data(&mut self) -> Result<ChunkHeader> {
        if let Some(header) = self.sound_data {
            return Ok(header);
        }
        self.resync()?;
        self.scanner.skip()?;
        let resume = self.scanner.position();
        let dialect = self.scanner.dialect();
        let found = loop {
            match self.scanner.next_header()? {
                Some(header) if header.role(dialect) == ChunkRole::SoundData => break Some(header),
                Some(_) => continue,
                None => break None,
            }
        };
        self.scanner.seek_to(resume)?;
        match found {
            Some(header) => {
                self.sound_data = Some(header);
                Ok(header)
            }
            None => Err(ContainerError::MissingChunk(dialect.sound_data_id())),
        }
    }

    /// Works out where the frames are and positions nothing yet
    fn prepare_pcm(&mut self) -> Result<PcmLayout> {
        let meta = self.read_info()?.clone();
        if !meta.is_pcm() {
            return Err(ContainerError::UnsupportedCodec(meta.details.codec_name()));
        }
        if meta.channels == 0 {
            return Err(ContainerError::UnsupportedFormat("zero channels".to_string()));
        }
        let codec = SampleCodec::new(meta.bit_depth, meta.sample_order, meta.sample_format)?;
        let header = self.locate_sound_data()?;

        // Leave the scanner on a chunk boundary before moving the reader
        self.resync()?;
        self.scanner.skip()?;
        self.needs_resync = true;

        let dialect = self.scanner.dialect();
        let reader = self.scanner.get_mut();
        reader.seek(SeekFrom::Start(header.offset))?;
        let (data_start, declared_len) = match dialect {
            Dialect::Aiff => {
                let preamble = aiff::read_ssnd_preamble(reader)?;
                let skip = aiff::SSND_PREAMBLE_SIZE + u64::from(preamble.offset);
                (
                    header.offset + skip,
                    header.size.map(|size| size.saturating_sub(skip)),
                )
            }
            Dialect::Wav => (header.offset, header.size),
            Dialect::Caf => {
                let edits = caf::read_edit_count(reader)?;
                log::trace!("CAF edit count {}", edits);
                (
                    header.offset + caf::EDIT_COUNT_SIZE,
                    header.size.map(|size| size.saturating_sub(caf::EDIT_COUNT_SIZE)),
                )
            }
        };
        let data_len = match declared_len {
            Some(len) => len,
            None => reader.seek(SeekFrom::End(0))?.saturating_sub(data_start),
        };

        let frame_size = codec.bytes_per_sample() as u64 * u64::from(meta.channels);
        let total_frames = meta.frame_count.unwrap_or(data_len / frame_size);
        Ok(PcmLayout {
            data_start,
            data_len,
            total_frames,
            channels: meta.channels,
            sample_rate: meta.sample_rate,
            codec,
        })
    }

    /// Opens a PCM cursor borrowing the decoder's reader
    ///
    /// Chunk walking picks up where it left off once the cursor is dropped.
    pub fn pcm(&mut self) -> Result<PcmCursor<&mut R>> {
        let layout = self.prepare_pcm()?;
        PcmCursor::new(self.scanner.get_mut(), layout)
    }

    /// Opens a PCM cursor that owns the reader
    pub fn into_pcm(mut self) -> Result<PcmCursor<R>> {
        let layout = self.prepare_pcm()?;
        PcmCursor::new(self.scanner.into_inner(), layout)
    }

    /// Decodes every frame into one interleaved buffer
    pub fn frames(&mut self) -> Result<Vec<i32>> {
        let mut pcm = self.pcm()?;
        let channels = usize::from(pcm.channels());
        let mut block = vec![0i32; BLOCK_FRAMES * channels];
        let mut out = Vec::new();
        loop {
            let frames = pcm.read(&mut block)?;
            if frames == 0 {
                break;
            }
            out.extend_from_slice(&block[..frames * channels]);
        }
        Ok(out)
    }

    /// Frame count over sample rate
    pub fn duration(&mut self) -> Result<Duration> {
        let layout = self.prepare_pcm()?;
        if layout.sample_rate == 0 {
            return Ok(Duration::ZERO);
        }
        Ok(Duration::from_secs_f64(
            layout.total_frames as f64 / f64::from(layout.sample_rate),
        ))
    }
}

impl<R> std::fmt::Debug for Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("container", &self.container)
            .field("metadata", &self.metadata)
            .field("state", &self.state)
            .field("failed", &self.failed)
            .finish()
    }
}

/// Something that yields interleaved PCM frames
pub trait FrameSource {
    fn format(&self) -> PcmFormat;

    /// Fills `buf` with whole frames; returns frames read, 0 at the end
    fn read_frames_into(&mut self, buf: &mut [i32]) -> Result<usize>;

    /// Like `read_frames_into`, normalized to [-1, 1)
    fn read_frames_f64(&mut self, buf: &mut [f64]) -> Result<usize>;
}

/// Something that accepts interleaved PCM frames
pub trait FrameSink {
    fn format(&self) -> PcmFormat;

    fn write_frames(&mut self, samples: &[i32]) -> Result<usize>;

    fn write_frames_f64(&mut self, samples: &[f64]) -> Result<usize>;
}

impl<R: Read + Seek> FrameSource for PcmCursor<R> {
    fn format(&self) -> PcmFormat {
        PcmFormat {
            channels: self.channels(),
            sample_rate: self.sample_rate(),
            bit_depth: self.bit_depth(),
            sample_format: self.codec().format(),
        }
    }

    fn read_frames_into(&mut self, buf: &mut [i32]) -> Result<usize> {
        self.read(buf)
    }

    fn read_frames_f64(&mut self, buf: &mut [f64]) -> Result<usize> {
        self.read_f64(buf)
    }
}

impl<W: Write + Seek> FrameSink for Encoder<W> {
    fn format(&self) -> PcmFormat {
        *Encoder::format(self)
    }

    fn write_frames(&mut self, samples: &[i32]) -> Result<usize> {
        self.write(samples)
    }

    fn write_frames_f64(&mut self, samples: &[f64]) -> Result<usize> {
        self.write_f64(samples)
    }
}

/// Copies every remaining frame from `source` to `sink`
///
/// Samples pass through unchanged when both sides share bit depth and sample
/// format, and through the normalized float path otherwise. The sink is not
/// closed. Returns the number of frames copied.
pub fn transcode<S, K>(source: &mut S, sink: &mut K) -> Result<u64>
where
    S: FrameSource + ?Sized,
    K: FrameSink + ?Sized,
{
    let from = source.format();
    let to = sink.format();
    if from.channels != to.channels || from.channels == 0 {
        return Err(ContainerError::UnsupportedFormat(format!(
            "cannot copy {} channels into {}",
            from.channels, to.channels
        )));
    }
    let channels = usize::from(from.channels);
    let mut copied = 0u64;

    if from.bit_depth == to.bit_depth && from.sample_format == to.sample_format {
        let mut block = vec![0i32; BLOCK_FRAMES * channels];
        loop {
            let frames = source.read_frames_into(&mut block)?;
            if frames == 0 {
                break;
            }
            sink.write_frames(&block[..frames * channels])?;
            copied += frames as u64;
        }
    } else {
        let mut block = vec![0f64; BLOCK_FRAMES * channels];
        loop {
            let frames = source.read_frames_f64(&mut block)?;
            if frames == 0 {
                break;
            }
            sink.write_frames_f64(&block[..frames * channels])?;
            copied += frames as u64;
        }
    }
    log::debug!("Copied {} frames", copied);
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::formats::{FormatDetails, SampleFormat};
    use crate::sound::fourcc::FourCC;
    use crate::sound::ieee80;
    use rstest::rstest;
    use std::io::Cursor;

    fn be_chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn form(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut file = b"FORM".to_vec();
        file.extend_from_slice(&(4 + body.len() as u32).to_be_bytes());
        file.extend_from_slice(b"AIFF");
        file.extend_from_slice(&body);
        file
    }

    fn comm(channels: u16, frames: u32, bits: u16, rate: u32) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&channels.to_be_bytes());
        p.extend_from_slice(&frames.to_be_bytes());
        p.extend_from_slice(&bits.to_be_bytes());
        p.extend_from_slice(&ieee80::from_sample_rate(rate));
        be_chunk(b"COMM", &p)
    }

    fn ssnd(offset: u32, samples: &[i16]) -> Vec<u8> {
        let mut p = offset.to_be_bytes().to_vec();
        p.extend_from_slice(&0u32.to_be_bytes());
        p.extend(std::iter::repeat(0xAA).take(offset as usize));
        for s in samples {
            p.extend_from_slice(&s.to_be_bytes());
        }
        be_chunk(b"SSND", &p)
    }

    fn encode(dialect: Dialect, format: PcmFormat, samples: &[i32]) -> Vec<u8> {
        let mut enc = Encoder::new(Cursor::new(Vec::new()), dialect, format).unwrap();
        enc.write(samples).unwrap();
        enc.finish().unwrap().into_inner()
    }

    fn chunk_ids<R: Read + Seek>(decoder: &mut Decoder<R>) -> Vec<FourCC> {
        let mut ids = Vec::new();
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            ids.push(chunk.id());
        }
        ids
    }

    #[rstest]
    #[case(Dialect::Aiff, 1, 16)]
    #[case(Dialect::Aiff, 2, 8)]
    #[case(Dialect::Wav, 2, 16)]
    #[case(Dialect::Wav, 1, 24)]
    #[case(Dialect::Caf, 2, 32)]
    #[case(Dialect::Caf, 1, 16)]
    fn test_encoded_streams_decode(
        #[case] dialect: Dialect,
        #[case] channels: u16,
        #[case] bits: u16,
    ) {
        // 8-bit samples are unsigned
        let (scale, bias) = if bits == 8 { (1, 128) } else { (1i32 << (bits - 8), 0) };
        let samples: Vec<i32> = (0..channels as i32 * 5)
            .map(|i| (i - 4) * scale + bias)
            .collect();
        let data = encode(dialect, PcmFormat::new(channels, 22050, bits), &samples);

        let mut decoder = Decoder::new(Cursor::new(data));
        assert_eq!(decoder.read_header().unwrap().dialect, dialect);
        let meta = decoder.read_info().unwrap().clone();
        assert_eq!(meta.channels, channels);
        assert_eq!(meta.bit_depth, bits);
        assert_eq!(meta.sample_rate, 22050);
        assert_eq!(decoder.frames().unwrap(), samples);
        assert_eq!(decoder.pcm().unwrap().size(), 5);
    }

    #[test]
    fn test_late_description_matches_early() {
        let samples = [1i16, -2, 3, -4];
        let early = form(&[
            comm(1, 4, 16, 8000),
            be_chunk(b"NAME", b"hi!"),
            ssnd(0, &samples),
        ]);
        let late = form(&[
            ssnd(0, &samples),
            be_chunk(b"NAME", b"hi!"),
            comm(1, 4, 16, 8000),
        ]);

        let mut a = Decoder::new(Cursor::new(early));
        let mut b = Decoder::new(Cursor::new(late));
        assert_eq!(a.read_info().unwrap(), b.read_info().unwrap());
        // rewound to the first chunk
        assert_eq!(b.position(), 12);
        assert_eq!(a.frames().unwrap(), b.frames().unwrap());
        assert_eq!(b.frames().unwrap(), vec![1, -2, 3, -4]);
    }

    #[test]
    fn test_rewind_delivers_skipped_chunks() {
        let late = form(&[
            ssnd(0, &[7, 8]),
            be_chunk(b"NAME", b"odd"),
            comm(1, 2, 16, 8000),
            be_chunk(b"ANNO", b"x"),
        ]);
        let mut decoder = Decoder::new(Cursor::new(late));
        decoder.read_info().unwrap();
        assert_eq!(
            chunk_ids(&mut decoder),
            vec![FourCC::SSND, FourCC(*b"NAME"), FourCC(*b"ANNO")]
        );
    }

    #[test]
    fn test_rewind_past_unpadded_last_description() {
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&8000u32.to_le_bytes());
        fmt.extend_from_slice(&16000u32.to_le_bytes());
        fmt.extend_from_slice(&2u16.to_le_bytes());
        fmt.extend_from_slice(&16u16.to_le_bytes());
        fmt.push(0);

        let mut body = b"WAVE".to_vec();
        body.extend_from_slice(b"data");
        body.extend_from_slice(&4u32.to_le_bytes());
        body.extend_from_slice(&[1, 0, 2, 0]);
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
        body.extend_from_slice(&fmt);
        // no pad byte after the odd-sized fmt chunk
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);

        let mut decoder = Decoder::new(Cursor::new(data));
        assert_eq!(decoder.read_info().unwrap().sample_rate, 8000);
        assert_eq!(decoder.position(), 12);
        assert_eq!(chunk_ids(&mut decoder), vec![FourCC::DATA]);
        assert_eq!(decoder.frames().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_chunks_without_read_info() {
        let data = form(&[be_chunk(b"NAME", b"a"), comm(1, 0, 16, 8000), ssnd(0, &[])]);
        let mut decoder = Decoder::new(Cursor::new(data));
        assert_eq!(chunk_ids(&mut decoder), vec![FourCC(*b"NAME"), FourCC::SSND]);
        assert_eq!(decoder.metadata().unwrap().channels, 1);
    }

    #[test]
    fn test_duplicate_description_ignored() {
        let data = form(&[
            comm(1, 2, 16, 8000),
            comm(2, 9, 8, 44100),
            ssnd(0, &[5, 6]),
        ]);
        let mut decoder = Decoder::new(Cursor::new(data));
        decoder.read_info().unwrap();
        assert_eq!(chunk_ids(&mut decoder), vec![FourCC::SSND]);
        let meta = decoder.metadata().unwrap();
        assert_eq!(meta.channels, 1);
        assert_eq!(meta.sample_rate, 8000);
    }

    #[test]
    fn test_bad_magic_leaves_no_state() {
        let mut data = b"XXXX".to_vec();
        data.extend_from_slice(&[0u8; 32]);
        let mut decoder = Decoder::new(Cursor::new(data));
        let err = decoder.read_header().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert!(decoder.container().is_none());
        assert!(decoder.metadata().is_none());
        assert_eq!(decoder.failure(), Some(ErrorKind::UnsupportedFormat));
        match decoder.read_info().unwrap_err() {
            ContainerError::Failed(kind) => assert_eq!(kind, ErrorKind::UnsupportedFormat),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(decoder.next_chunk().is_err());
    }

    #[test]
    fn test_forced_dialect_rejects_other_magic() {
        let data = encode(Dialect::Wav, PcmFormat::new(1, 8000, 16), &[0]);
        let mut decoder = Decoder::new(Cursor::new(data)).with_dialect(Dialect::Aiff);
        assert_eq!(decoder.read_header().unwrap_err().kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_missing_description_is_fatal() {
        let data = form(&[ssnd(0, &[1])]);
        let mut decoder = Decoder::new(Cursor::new(data));
        assert_eq!(decoder.read_info().unwrap_err().kind(), ErrorKind::MissingChunk);
        assert!(decoder.container().is_none());
    }

    #[test]
    fn test_missing_sound_data() {
        let data = form(&[comm(1, 0, 16, 8000)]);
        let mut decoder = Decoder::new(Cursor::new(data));
        decoder.read_info().unwrap();
        assert_eq!(decoder.pcm().unwrap_err().kind(), ErrorKind::MissingChunk);
        // not fatal
        assert!(decoder.metadata().is_some());
    }

    #[test]
    fn test_truncated_description_is_fatal() {
        let mut data = form(&[comm(1, 4, 16, 8000)]);
        data.truncate(20);
        let mut decoder = Decoder::new(Cursor::new(data));
        assert_eq!(decoder.read_info().unwrap_err().kind(), ErrorKind::TruncatedStream);
        assert_eq!(decoder.failure(), Some(ErrorKind::TruncatedStream));
    }

    #[test]
    fn test_ssnd_offset_skipped() {
        let data = form(&[comm(1, 3, 16, 8000), ssnd(4, &[10, 20, 30])]);
        let mut decoder = Decoder::new(Cursor::new(data));
        assert_eq!(decoder.frames().unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_non_pcm_codec_rejected() {
        let mut data = encode(Dialect::Wav, PcmFormat::new(1, 8000, 8), &[128, 128]);
        // format tag 0x0007 (mu-law)
        data[20] = 7;
        let mut decoder = Decoder::new(Cursor::new(data));
        let meta = decoder.read_info().unwrap();
        assert!(!meta.is_pcm());
        assert_eq!(decoder.pcm().unwrap_err().kind(), ErrorKind::UnsupportedCodec);
    }

    #[test]
    fn test_caf_description_must_be_first() {
        let data = encode(Dialect::Caf, PcmFormat::new(1, 8000, 16), &[1, 2]);
        let mut swapped = data[..8].to_vec();
        swapped.extend_from_slice(b"free");
        swapped.extend_from_slice(&2i64.to_be_bytes());
        swapped.extend_from_slice(&[0, 0]);
        swapped.extend_from_slice(&data[8..]);
        let mut decoder = Decoder::new(Cursor::new(swapped));
        assert_eq!(decoder.read_info().unwrap_err().kind(), ErrorKind::UnexpectedChunk);
    }

    #[test]
    fn test_caf_data_to_end() {
        let mut data = encode(Dialect::Caf, PcmFormat::new(2, 8000, 16), &[1, 2, 3, 4]);
        data[56..64].copy_from_slice(&(-1i64).to_be_bytes());
        let mut decoder = Decoder::new(Cursor::new(data));
        assert_eq!(decoder.frames().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(decoder.sound_data_location().unwrap().size, None);
    }

    #[test]
    fn test_chunk_walk_resumes_after_pcm() {
        let data = form(&[comm(1, 2, 16, 8000), ssnd(0, &[1, 2]), be_chunk(b"ANNO", b"z")]);
        let mut decoder = Decoder::new(Cursor::new(data));
        decoder.read_info().unwrap();
        {
            let mut pcm = decoder.pcm().unwrap();
            assert_eq!(pcm.read_frames(1).unwrap(), vec![1]);
        }
        assert_eq!(chunk_ids(&mut decoder), vec![FourCC::SSND, FourCC(*b"ANNO")]);
    }

    #[test]
    fn test_for_each_chunk_continues_after_consumer_error() {
        let data = form(&[
            comm(1, 0, 16, 8000),
            be_chunk(b"NAME", b"ab"),
            be_chunk(b"ANNO", b"cd"),
        ]);
        let mut decoder = Decoder::new(Cursor::new(data));
        let mut seen = Vec::new();
        let count = decoder
            .for_each_chunk(|chunk| {
                seen.push(chunk.id());
                Err(ContainerError::UnsupportedCodec("ignored".to_string()))
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(seen, vec![FourCC(*b"NAME"), FourCC(*b"ANNO")]);
    }

    #[test]
    fn test_consumer_read_amount_does_not_move_boundaries() {
        let data = form(&[
            comm(1, 0, 16, 8000),
            be_chunk(b"NAME", b"hello"),
            be_chunk(b"ANNO", b"world!"),
        ]);
        let mut full = Decoder::new(Cursor::new(data.clone()));
        let mut none = Decoder::new(Cursor::new(data));
        full.read_info().unwrap();
        none.read_info().unwrap();
        loop {
            let a = match full.next_chunk().unwrap() {
                Some(mut chunk) => {
                    let mut buf = Vec::new();
                    chunk.read_to_end(&mut buf).unwrap();
                    Some(chunk.header().offset)
                }
                None => None,
            };
            let b = none.next_chunk().unwrap().map(|chunk| chunk.header().offset);
            assert_eq!(a, b);
            if a.is_none() {
                break;
            }
        }
        assert_eq!(full.position(), none.position());
    }

    #[test]
    fn test_duration() {
        let samples = vec![0i32; 2 * 11025];
        let data = encode(Dialect::Wav, PcmFormat::new(2, 22050, 16), &samples);
        let mut decoder = Decoder::new(Cursor::new(data));
        assert_eq!(decoder.duration().unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_transcode_between_dialects() {
        let samples = [100, -100, 2000, -2000, 0, 1];
        let data = encode(Dialect::Aiff, PcmFormat::new(2, 11025, 16), &samples);
        let mut pcm = Decoder::new(Cursor::new(data)).into_pcm().unwrap();
        let mut enc = Encoder::new(Cursor::new(Vec::new()), Dialect::Caf, pcm.format()).unwrap();
        assert_eq!(transcode(&mut pcm, &mut enc).unwrap(), 3);
        let out = enc.finish().unwrap().into_inner();

        let mut decoder = Decoder::new(Cursor::new(out));
        assert_eq!(decoder.frames().unwrap(), samples.to_vec());
    }

    #[test]
    fn test_transcode_to_float() {
        let data = encode(Dialect::Wav, PcmFormat::new(1, 8000, 16), &[16384, -16384]);
        let mut pcm = Decoder::new(Cursor::new(data)).into_pcm().unwrap();
        let mut enc =
            Encoder::new(Cursor::new(Vec::new()), Dialect::Aiff, PcmFormat::float(1, 8000)).unwrap();
        transcode(&mut pcm, &mut enc).unwrap();
        let out = enc.finish().unwrap().into_inner();

        let mut decoder = Decoder::new(Cursor::new(out));
        let meta = decoder.read_info().unwrap();
        assert_eq!(meta.sample_format, SampleFormat::Float);
        assert!(matches!(meta.details, FormatDetails::Aiff { .. }));
        let mut buf = [0f64; 2];
        decoder.pcm().unwrap().read_f64(&mut buf).unwrap();
        assert_eq!(buf, [0.5, -0.5]);
    }

    #[test]
    fn test_transcode_channel_mismatch() {
        let data = encode(Dialect::Wav, PcmFormat::new(1, 8000, 16), &[1]);
        let mut pcm = Decoder::new(Cursor::new(data)).into_pcm().unwrap();
        let mut enc =
            Encoder::new(Cursor::new(Vec::new()), Dialect::Wav, PcmFormat::new(2, 8000, 16)).unwrap();
        assert_eq!(
            transcode(&mut pcm, &mut enc).unwrap_err().kind(),
            ErrorKind::UnsupportedFormat
        );
    }
}
