//! Streaming encoder with size backpatching.
//!
//! The header goes out on the first write with zeroed size fields. Samples
//! are then streamed through the codec, and [`Encoder::close`] seeks back to
//! fill in the container size, the sound-data size and (AIFF) the frame count.

use std::io::{Seek, SeekFrom, Write};

use super::aiff;
use super::caf;
use super::codec::SampleCodec;
use super::endian::{self, Endian};
use super::error::{ContainerError, Result};
use super::formats::{Dialect, PcmFormat};
use super::wav;

/// Width of a backpatched size field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U32,
    I64,
}

/// A size field to fill in on close, relative to the start of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeField {
    pub at: u64,
    pub width: FieldWidth,
    pub order: Endian,
}

impl SizeField {
    pub fn new(at: u64, width: FieldWidth, order: Endian) -> Self {
        Self { at, width, order }
    }

    fn patch<W: Write + Seek>(&self, w: &mut W, base: u64, value: u64) -> Result<()> {
        w.seek(SeekFrom::Start(base + self.at))?;
        match self.width {
            FieldWidth::U32 => {
                let v = u32::try_from(value).map_err(|_| {
                    ContainerError::UnsupportedFormat(format!(
                        "{} does not fit a 32-bit size field",
                        value
                    ))
                })?;
                endian::write_u32(w, v, self.order)
            }
            FieldWidth::I64 => {
                let v = i64::try_from(value).map_err(|_| {
                    ContainerError::UnsupportedFormat(format!(
                        "{} does not fit a 64-bit size field",
                        value
                    ))
                })?;
                endian::write_i64(w, v, self.order)
            }
        }
    }
}

/// Offsets of the placeholder fields in a dialect's header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLayout {
    /// Overall size, patched to `total - 8`
    pub container_size: Option<SizeField>,
    /// Declared frame count
    pub frame_count: Option<SizeField>,
    /// Sound-data chunk size, patched to `data bytes + data_size_bias`
    pub data_size: SizeField,
    /// Preamble bytes counted in the sound-data chunk size
    pub data_size_bias: u64,
}

/// Running totals and the saved offsets needed on close
#[derive(Debug, Default)]
struct EncoderState {
    /// Stream offset where the header starts
    start: u64,
    header_len: u64,
    layout: Option<HeaderLayout>,
    data_bytes: u64,
    frames: u64,
}

/// Writes interleaved PCM frames into a container
pub struct Encoder<W: Write + Seek> {
    writer: W,
    dialect: Dialect,
    format: PcmFormat,
    codec: SampleCodec,
    state: EncoderState,
    closed: bool,
    scratch: Vec<u8>,
}

impl<W: Write + Seek> Encoder<W> {
    /// Validates the format; nothing is written until the first frame
    pub fn new(writer: W, dialect: Dialect, format: PcmFormat) -> Result<Self> {
        if format.channels == 0 {
            return Err(ContainerError::UnsupportedFormat(
                "zero channels".to_string(),
            ));
        }
        let codec = SampleCodec::new(format.bit_depth, dialect.byte_order(), format.sample_format)?;
        Ok(Self {
            writer,
            dialect,
            format,
            codec,
            state: EncoderState::default(),
            closed: false,
            scratch: Vec::new(),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn format(&self) -> &PcmFormat {
        &self.format
    }

    pub fn frames_written(&self) -> u64 {
        self.state.frames
    }

    /// Sample bytes written so far, headers excluded
    pub fn data_bytes(&self) -> u64 {
        self.state.data_bytes
    }

    /// Header and sample bytes written so far, pad byte excluded
    pub fn bytes_written(&self) -> u64 {
        self.state.header_len + self.state.data_bytes
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.state.layout.is_some() {
            return Ok(());
        }
        let (bytes, layout) = match self.dialect {
            Dialect::Aiff => aiff::header_bytes(&self.format)?,
            Dialect::Wav => wav::header_bytes(&self.format)?,
            Dialect::Caf => caf::header_bytes(&self.format)?,
        };
        self.state.start = self.writer.stream_position()?;
        self.writer.write_all(&bytes)?;
        self.state.header_len = bytes.len() as u64;
        self.state.layout = Some(layout);
        log::debug!(
            "Wrote {} header ({} bytes) at offset {}",
            self.dialect,
            bytes.len(),
            self.state.start
        );
        Ok(())
    }

    fn check_frames(&self, samples: usize) -> Result<usize> {
        if self.closed {
            return Err(ContainerError::EncoderClosed);
        }
        let channels = usize::from(self.format.channels);
        if samples % channels != 0 {
            return Err(ContainerError::PartialFrame {
                samples,
                channels: self.format.channels,
            });
        }
        Ok(samples / channels)
    }

    fn flush_scratch(&mut self, frames: usize) -> Result<usize> {
        self.writer.write_all(&self.scratch)?;
        self.state.data_bytes += self.scratch.len() as u64;
        self.state.frames += frames as u64;
        Ok(frames)
    }

    /// Writes interleaved integer samples; returns the number of frames
    pub fn write(&mut self, samples: &[i32]) -> Result<usize> {
        let frames = self.check_frames(samples.len())?;
        self.ensure_header()?;
        let width = self.codec.bytes_per_sample();
        self.scratch.resize(samples.len() * width, 0);
        for (sample, out) in samples.iter().zip(self.scratch.chunks_exact_mut(width)) {
            self.codec.encode_int(*sample, out);
        }
        self.flush_scratch(frames)
    }

    /// Writes interleaved normalized samples; returns the number of frames
    pub fn write_f64(&mut self, samples: &[f64]) -> Result<usize> {
        let frames = self.check_frames(samples.len())?;
        self.ensure_header()?;
        let width = self.codec.bytes_per_sample();
        self.scratch.resize(samples.len() * width, 0);
        for (sample, out) in samples.iter().zip(self.scratch.chunks_exact_mut(width)) {
            self.codec.encode_float(*sample, out);
        }
        self.flush_scratch(frames)
    }

    /// Pads, backpatches the size fields and flushes
    ///
    /// Writes a header even if no frames were written. Any later `write` or
    /// `close` returns `EncoderClosed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(ContainerError::EncoderClosed);
        }
        self.ensure_header()?;
        self.closed = true;

        let layout = match self.state.layout {
            Some(layout) => layout,
            None => return Err(ContainerError::EncoderClosed),
        };
        let data_size = self.state.data_bytes + layout.data_size_bias;
        if self.dialect.pads_odd_chunks() && data_size % 2 == 1 {
            self.writer.write_all(&[0])?;
        }
        let end = self.writer.stream_position()?;
        let base = self.state.start;

        if let Some(field) = layout.container_size {
            field.patch(&mut self.writer, base, end - base - 8)?;
        }
        if let Some(field) = layout.frame_count {
            field.patch(&mut self.writer, base, self.state.frames)?;
        }
        layout.data_size.patch(&mut self.writer, base, data_size)?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        log::debug!(
            "Closed {} stream: {} frames, {} data bytes",
            self.dialect,
            self.state.frames,
            self.state.data_bytes
        );
        Ok(())
    }

    /// Closes the encoder (if still open) and returns the writer
    pub fn finish(mut self) -> Result<W> {
        if !self.closed {
            self.close()?;
        }
        Ok(self.writer)
    }
}

impl<W: Write + Seek> std::fmt::Debug for Encoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("dialect", &self.dialect)
            .field("format", &self.format)
            .field("frames", &self.state.frames)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::error::ErrorKind;
    use std::io::{Cursor, Read};

    fn be_u32(b: &[u8], at: usize) -> u32 {
        u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    fn le_u32(b: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    #[test]
    fn test_aiff_backpatch() {
        let mut enc = Encoder::new(Cursor::new(Vec::new()), Dialect::Aiff, PcmFormat::new(2, 22050, 16)).unwrap();
        assert_eq!(enc.write(&[1, -1, 2, -2, 3, -3]).unwrap(), 3);
        assert_eq!(enc.bytes_written(), 54 + 12);
        let out = enc.finish().unwrap().into_inner();
        assert_eq!(out.len(), 54 + 12);
        assert_eq!(be_u32(&out, 4) as usize, out.len() - 8);
        assert_eq!(be_u32(&out, 22), 3);
        assert_eq!(be_u32(&out, 42), 8 + 12);
        assert_eq!(&out[54..58], &[0x00, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn test_wav_backpatch_and_little_endian_samples() {
        let mut enc = Encoder::new(Cursor::new(Vec::new()), Dialect::Wav, PcmFormat::new(1, 8000, 24)).unwrap();
        enc.write(&[0x123456, -2]).unwrap();
        enc.close().unwrap();
        let out = enc.get_ref().get_ref().clone();
        assert_eq!(le_u32(&out, 4) as usize, out.len() - 8);
        assert_eq!(le_u32(&out, 40), 6);
        assert_eq!(&out[44..50], &[0x56, 0x34, 0x12, 0xFE, 0xFF, 0xFF]);
    }

    #[test]
    fn test_odd_data_chunk_is_padded() {
        let mut enc = Encoder::new(Cursor::new(Vec::new()), Dialect::Wav, PcmFormat::new(1, 8000, 8)).unwrap();
        enc.write(&[128, 129, 130]).unwrap();
        let out = enc.finish().unwrap().into_inner();
        assert_eq!(out.len(), 44 + 3 + 1);
        assert_eq!(le_u32(&out, 40), 3);
        assert_eq!(le_u32(&out, 4) as usize, out.len() - 8);
    }

    #[test]
    fn test_caf_data_size_includes_edit_count() {
        let mut enc = Encoder::new(Cursor::new(Vec::new()), Dialect::Caf, PcmFormat::new(2, 44100, 16)).unwrap();
        enc.write(&[1, 2, 3, 4, 5, 6]).unwrap();
        let out = enc.finish().unwrap().into_inner();
        let size = i64::from_be_bytes(out[56..64].try_into().unwrap());
        assert_eq!(size, 4 + 12);
        assert_eq!(out.len(), 68 + 12);
    }

    #[test]
    fn test_write_after_close_fails() {
        let mut enc = Encoder::new(Cursor::new(Vec::new()), Dialect::Aiff, PcmFormat::new(1, 8000, 16)).unwrap();
        enc.write(&[1]).unwrap();
        enc.close().unwrap();
        assert_eq!(enc.write(&[2]).unwrap_err().kind(), ErrorKind::EncoderClosed);
        assert_eq!(enc.close().unwrap_err().kind(), ErrorKind::EncoderClosed);
        assert!(enc.is_closed());
    }

    #[test]
    fn test_partial_frame_rejected() {
        let mut enc = Encoder::new(Cursor::new(Vec::new()), Dialect::Wav, PcmFormat::new(2, 8000, 16)).unwrap();
        let err = enc.write(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialFrame);
        assert_eq!(enc.frames_written(), 0);
        assert!(enc.get_ref().get_ref().is_empty());
    }

    #[test]
    fn test_unsupported_depth_rejected_up_front() {
        let err = Encoder::new(Cursor::new(Vec::new()), Dialect::Aiff, PcmFormat::new(1, 8000, 12)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedBitDepth);
    }

    #[test]
    fn test_empty_stream_still_has_header() {
        let enc = Encoder::new(Cursor::new(Vec::new()), Dialect::Aiff, PcmFormat::new(1, 8000, 16)).unwrap();
        let out = enc.finish().unwrap().into_inner();
        assert_eq!(out.len(), 54);
        assert_eq!(be_u32(&out, 22), 0);
        assert_eq!(be_u32(&out, 42), 8);
    }

    #[test]
    fn test_header_after_existing_bytes() {
        let mut cursor = Cursor::new(Vec::new());
        cursor.write_all(b"prefix").unwrap();
        let mut enc = Encoder::new(cursor, Dialect::Wav, PcmFormat::new(1, 8000, 16)).unwrap();
        enc.write(&[7, 8]).unwrap();
        let out = enc.finish().unwrap().into_inner();
        assert_eq!(&out[..6], b"prefix");
        assert_eq!(&out[6..10], b"RIFF");
        assert_eq!(le_u32(&out, 10) as usize, out.len() - 6 - 8);
    }

    #[test]
    fn test_encode_to_file() {
        let mut file = tempfile::tempfile().unwrap();
        {
            let mut enc = Encoder::new(&mut file, Dialect::Aiff, PcmFormat::float(1, 44100)).unwrap();
            enc.write_f64(&[0.5, -0.25]).unwrap();
            enc.close().unwrap();
        }
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        assert_eq!(&bytes[8..12], b"AIFC");
        let tail = &bytes[bytes.len() - 8..];
        assert_eq!(&tail[..4], &0.5f32.to_be_bytes());
        assert_eq!(&tail[4..], &(-0.25f32).to_be_bytes());
    }
}
