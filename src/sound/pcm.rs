//! Frame-counted reader over the sound-data chunk.

use std::io::{self, Read, Seek, SeekFrom};
use std::time::Duration;

use super::codec::SampleCodec;
use super::error::{ContainerError, Result};

/// Where the samples live and how to decode them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    /// Stream offset of the first sample byte
    pub data_start: u64,
    /// Sample bytes available from `data_start`
    pub data_len: u64,
    /// Frames reported by `size()`
    pub total_frames: u64,
    pub channels: u16,
    pub sample_rate: u32,
    pub codec: SampleCodec,
}

impl PcmLayout {
    pub fn frame_size(&self) -> u64 {
        self.codec.bytes_per_sample() as u64 * u64::from(self.channels)
    }
}

/// Seekable PCM reader
///
/// Reads and seeks in whole frames only. Reads stop at the frame count, the
/// end of the data chunk or end of stream, whichever comes first; a trailing
/// partial frame is never returned.
pub struct PcmCursor<R> {
    reader: R,
    layout: PcmLayout,
    frame: u64,
    scratch: Vec<u8>,
}

impl<R: Read + Seek> PcmCursor<R> {
    /// Positions `reader` at the first frame
    pub fn new(mut reader: R, layout: PcmLayout) -> Result<Self> {
        if layout.channels == 0 {
            return Err(ContainerError::UnsupportedFormat(
                "zero channels".to_string(),
            ));
        }
        reader.seek(SeekFrom::Start(layout.data_start))?;
        Ok(Self {
            reader,
            layout,
            frame: 0,
            scratch: Vec::new(),
        })
    }

    pub fn layout(&self) -> &PcmLayout {
        &self.layout
    }

    pub fn codec(&self) -> &SampleCodec {
        &self.layout.codec
    }

    pub fn channels(&self) -> u16 {
        self.layout.channels
    }

    pub fn bit_depth(&self) -> u16 {
        self.layout.codec.bit_depth()
    }

    pub fn sample_rate(&self) -> u32 {
        self.layout.sample_rate
    }

    /// Total frame count
    pub fn size(&self) -> u64 {
        self.layout.total_frames
    }

    /// Current frame position
    pub fn offset(&self) -> u64 {
        self.frame
    }

    pub fn remaining(&self) -> u64 {
        self.layout.total_frames.saturating_sub(self.frame)
    }

    pub fn duration(&self) -> Duration {
        if self.layout.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.layout.total_frames as f64 / f64::from(self.layout.sample_rate))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Frames left before the frame count or the end of the data chunk
    fn readable(&self) -> u64 {
        let in_chunk = self.layout.data_len / self.layout.frame_size();
        self.layout.total_frames.min(in_chunk).saturating_sub(self.frame)
    }

    /// Reads raw sample bytes for as many whole frames as fit in `buf`
    ///
    /// Returns the number of frames read.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let frame_size = self.layout.frame_size() as usize;
        let wanted = ((buf.len() / frame_size) as u64).min(self.readable()) as usize;
        let frames = self.fill(&mut buf[..wanted * frame_size])?;
        Ok(frames)
    }

    /// Decodes whole frames into an interleaved integer buffer
    ///
    /// Returns the number of frames read; `frames * channels` samples of
    /// `buf` are written.
    pub fn read(&mut self, buf: &mut [i32]) -> Result<usize> {
        let channels = usize::from(self.layout.channels);
        let frames = self.read_into_scratch(buf.len() / channels)?;
        let width = self.layout.codec.bytes_per_sample();
        let codec = self.layout.codec;
        for (out, bytes) in buf
            .iter_mut()
            .zip(self.scratch.chunks_exact(width))
            .take(frames * channels)
        {
            *out = codec.decode_int(bytes);
        }
        Ok(frames)
    }

    /// Like [`read`](Self::read), normalizing integer samples to [-1, 1)
    pub fn read_f64(&mut self, buf: &mut [f64]) -> Result<usize> {
        let channels = usize::from(self.layout.channels);
        let frames = self.read_into_scratch(buf.len() / channels)?;
        let width = self.layout.codec.bytes_per_sample();
        let codec = self.layout.codec;
        for (out, bytes) in buf
            .iter_mut()
            .zip(self.scratch.chunks_exact(width))
            .take(frames * channels)
        {
            *out = codec.decode_float(bytes);
        }
        Ok(frames)
    }

    /// Reads up to `frames` frames into a new interleaved buffer
    pub fn read_frames(&mut self, frames: usize) -> Result<Vec<i32>> {
        let channels = usize::from(self.layout.channels);
        let mut out = vec![0i32; frames.saturating_mul(channels)];
        let got = self.read(&mut out)?;
        out.truncate(got * channels);
        Ok(out)
    }

    /// Repositions in frame units
    ///
    /// Follows `std::io::Seek` semantics: `End` is relative to the frame
    /// count, seeking before frame 0 is an error, and positions past the end
    /// are clamped to the end. Returns the new frame position.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(d) => self.frame.checked_add_signed(d),
            SeekFrom::End(d) => self.layout.total_frames.checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            ContainerError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing frame",
            ))
        })?;
        let target = target.min(self.layout.total_frames);
        let byte = self.layout.data_start + target * self.layout.frame_size();
        self.reader.seek(SeekFrom::Start(byte))?;
        self.frame = target;
        Ok(target)
    }

    fn read_into_scratch(&mut self, max_frames: usize) -> Result<usize> {
        let frame_size = self.layout.frame_size() as usize;
        let wanted = (max_frames as u64).min(self.readable()) as usize;
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(wanted * frame_size, 0);
        let result = self.fill(&mut scratch);
        self.scratch = scratch;
        result
    }

    /// Fills `buf` (a whole number of frames) until EOF; returns whole frames
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let frame_size = self.layout.frame_size() as usize;
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let frames = filled / frame_size;
        let partial = filled % frame_size;
        if partial > 0 {
            log::debug!("Discarding {} bytes of a partial frame", partial);
            self.reader.seek(SeekFrom::Current(-(partial as i64)))?;
        }
        self.frame += frames as u64;
        Ok(frames)
    }
}

impl<R> std::fmt::Debug for PcmCursor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmCursor")
            .field("layout", &self.layout)
            .field("frame", &self.frame)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::endian::Endian;
    use crate::sound::formats::SampleFormat;
    use std::io::Cursor;

    fn cursor(bytes: Vec<u8>, channels: u16, total: u64) -> PcmCursor<Cursor<Vec<u8>>> {
        let data_len = bytes.len() as u64 - 4;
        let layout = PcmLayout {
            data_start: 4,
            data_len,
            total_frames: total,
            channels,
            sample_rate: 8000,
            codec: SampleCodec::new(16, Endian::Big, SampleFormat::Int).unwrap(),
        };
        PcmCursor::new(Cursor::new(bytes), layout).unwrap()
    }

    fn stereo_ramp(frames: i16) -> Vec<u8> {
        let mut bytes = vec![0xEE; 4];
        for i in 0..frames {
            bytes.extend_from_slice(&i.to_be_bytes());
            bytes.extend_from_slice(&(-i).to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_read_whole_frames_only() {
        let mut pcm = cursor(stereo_ramp(4), 2, 4);
        let mut buf = [0i32; 5];
        assert_eq!(pcm.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..4], &[0, 0, 1, -1]);
        assert_eq!(buf[4], 0);
        assert_eq!(pcm.offset(), 2);
        assert_eq!(pcm.read_frames(10).unwrap(), vec![2, -2, 3, -3]);
        assert_eq!(pcm.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_debug_shows_progress() {
        let mut pcm = cursor(stereo_ramp(4), 2, 4);
        pcm.read_frames(1).unwrap();
        let text = format!("{:?}", pcm);
        assert!(text.starts_with("PcmCursor"));
        assert!(text.contains("frame: 1"));
    }

    #[test]
    fn test_read_bounded_by_frame_count() {
        let mut pcm = cursor(stereo_ramp(4), 2, 3);
        assert_eq!(pcm.read_frames(10).unwrap().len(), 6);
        assert_eq!(pcm.remaining(), 0);
    }

    #[test]
    fn test_read_bounded_by_eof_discards_partial_frame() {
        let mut bytes = stereo_ramp(2);
        bytes.extend_from_slice(&[0x7F, 0xFF]);
        let mut pcm = cursor(bytes, 2, 10);
        let frames = pcm.read_frames(10).unwrap();
        assert_eq!(frames, vec![0, 0, 1, -1]);
        assert_eq!(pcm.offset(), 2);
        assert!(pcm.read_frames(1).unwrap().is_empty());
    }

    #[test]
    fn test_seek_in_frames() {
        let mut pcm = cursor(stereo_ramp(4), 2, 4);
        assert_eq!(pcm.seek(SeekFrom::Start(2)).unwrap(), 2);
        assert_eq!(pcm.read_frames(1).unwrap(), vec![2, -2]);
        assert_eq!(pcm.seek(SeekFrom::Current(-3)).unwrap(), 0);
        assert_eq!(pcm.seek(SeekFrom::End(-1)).unwrap(), 3);
        assert_eq!(pcm.read_frames(5).unwrap(), vec![3, -3]);
        assert_eq!(pcm.seek(SeekFrom::Start(99)).unwrap(), 4);
        assert!(pcm.seek(SeekFrom::Current(-5)).is_err());
        assert_eq!(pcm.offset(), 4);
    }

    #[test]
    fn test_read_bytes_and_f64() {
        let mut pcm = cursor(stereo_ramp(2), 2, 2);
        let mut raw = [0u8; 7];
        assert_eq!(pcm.read_bytes(&mut raw).unwrap(), 1);
        assert_eq!(&raw[..4], &[0, 0, 0, 0]);
        let mut f = [0f64; 2];
        assert_eq!(pcm.read_f64(&mut f).unwrap(), 1);
        assert_eq!(f, [1.0 / 32768.0, -1.0 / 32768.0]);
    }

    #[test]
    fn test_duration_and_accessors() {
        let pcm = cursor(stereo_ramp(4), 2, 4000);
        assert_eq!(pcm.duration(), Duration::from_millis(500));
        assert_eq!(pcm.channels(), 2);
        assert_eq!(pcm.bit_depth(), 16);
        assert_eq!(pcm.size(), 4000);
    }

    #[test]
    fn test_zero_channels_rejected() {
        let layout = PcmLayout {
            data_start: 0,
            data_len: 0,
            total_frames: 0,
            channels: 0,
            sample_rate: 8000,
            codec: SampleCodec::new(16, Endian::Big, SampleFormat::Int).unwrap(),
        };
        assert!(PcmCursor::new(Cursor::new(Vec::new()), layout).is_err());
    }
}
