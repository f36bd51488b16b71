//! Core Audio Format container support
//!
//! CAF differs from the RIFF-style dialects in a few ways:
//! - the file header is `caff`, a 16-bit version (always 1) and 16-bit flags,
//!   with no overall size
//! - chunk sizes are signed 64-bit big-endian; `-1` on the `data` chunk
//!   means it runs to end of stream
//! - chunks are not padded to even lengths
//! - `desc` must be the first chunk
//! - `data` starts with a 32-bit edit count before the first frame

use std::io::Read;

use super::chunk::{Chunk, ChunkHeader};
use super::encoder::{FieldWidth, HeaderLayout, SizeField};
use super::endian::{self, Endian};
use super::error::{ContainerError, Result};
use super::formats::{
    Container, Dialect, FormatDetails, PcmFormat, SampleFormat, StreamMetadata, CAF_FLAG_FLOAT,
    CAF_FLAG_LITTLE_ENDIAN,
};
use super::fourcc::FourCC;

pub const CAF_VERSION: u16 = 1;
/// Payload length of the `desc` chunk
pub const DESC_SIZE: i64 = 32;
/// Edit count preceding the samples in `data`
pub const EDIT_COUNT_SIZE: u64 = 4;

/// Reads the file version and flags; the magic has already been consumed
pub fn read_header_body<R: Read + ?Sized>(r: &mut R) -> Result<Container> {
    let version = endian::read_u16(r, Endian::Big)?;
    let _flags = endian::read_u16(r, Endian::Big)?;
    if version != CAF_VERSION {
        return Err(ContainerError::UnsupportedFormat(format!(
            "CAF version {}",
            version
        )));
    }
    Ok(Container {
        dialect: Dialect::Caf,
        magic: FourCC::CAFF,
        size: None,
        form_type: FourCC::CAFF,
        version: Some(version),
    })
}

/// Rejects a file whose first chunk is not `desc`
pub fn check_first_chunk(header: &ChunkHeader) -> Result<()> {
    if header.id != FourCC::DESC {
        return Err(ContainerError::UnexpectedChunk {
            expected: FourCC::DESC,
            found: header.id,
        });
    }
    Ok(())
}

/// Decodes a `desc` chunk
pub fn read_desc<R: Read + ?Sized>(chunk: &mut Chunk<'_, R>) -> Result<StreamMetadata> {
    let rate = chunk.read_f64()?;
    let format_id = chunk.read_fourcc()?;
    let format_flags = chunk.read_u32()?;
    let bytes_per_packet = chunk.read_u32()?;
    let frames_per_packet = chunk.read_u32()?;
    let channels = chunk.read_u32()?;
    let bits = chunk.read_u32()?;

    let channels = u16::try_from(channels)
        .map_err(|_| ContainerError::UnsupportedFormat(format!("{} channels", channels)))?;
    let bit_depth = u16::try_from(bits)
        .map_err(|_| ContainerError::UnsupportedBitDepth(u16::MAX))?;
    // `as` saturates and maps NaN to zero
    let sample_rate = rate.round() as u32;

    log::debug!(
        "desc: {} {} ch, {} Hz, {} bit, flags 0x{:x}",
        format_id,
        channels,
        rate,
        bit_depth,
        format_flags
    );

    let sample_format = if format_flags & CAF_FLAG_FLOAT != 0 {
        SampleFormat::Float
    } else {
        SampleFormat::Int
    };
    let sample_order = if format_flags & CAF_FLAG_LITTLE_ENDIAN != 0 {
        Endian::Little
    } else {
        Endian::Big
    };

    Ok(StreamMetadata {
        channels,
        sample_rate,
        bit_depth,
        frame_count: None,
        avg_bytes_per_sec: 0,
        sample_format,
        sample_order,
        details: FormatDetails::Caf {
            format_id,
            format_flags,
            bytes_per_packet,
            frames_per_packet,
            sample_rate: rate,
        },
    })
}

pub fn read_edit_count<R: Read + ?Sized>(r: &mut R) -> Result<u32> {
    endian::read_u32(r, Endian::Big)
}

/// Builds the file header, `desc` chunk and `data` chunk header
///
/// Integer samples are written big-endian; float samples set the float flag.
pub fn header_bytes(format: &PcmFormat) -> Result<(Vec<u8>, HeaderLayout)> {
    let flags = match format.sample_format {
        SampleFormat::Float => CAF_FLAG_FLOAT,
        SampleFormat::Int => 0,
    };
    let frame_size = u32::try_from(format.frame_size()).map_err(|_| {
        ContainerError::UnsupportedFormat(format!("frame size {}", format.frame_size()))
    })?;

    let mut buf = Vec::with_capacity(68);
    endian::write_fourcc(&mut buf, FourCC::CAFF)?;
    endian::write_u16(&mut buf, CAF_VERSION, Endian::Big)?;
    endian::write_u16(&mut buf, 0, Endian::Big)?;

    endian::write_fourcc(&mut buf, FourCC::DESC)?;
    endian::write_i64(&mut buf, DESC_SIZE, Endian::Big)?;
    endian::write_f64(&mut buf, f64::from(format.sample_rate), Endian::Big)?;
    endian::write_fourcc(&mut buf, FourCC::LPCM)?;
    endian::write_u32(&mut buf, flags, Endian::Big)?;
    endian::write_u32(&mut buf, frame_size, Endian::Big)?;
    endian::write_u32(&mut buf, 1, Endian::Big)?;
    endian::write_u32(&mut buf, u32::from(format.channels), Endian::Big)?;
    endian::write_u32(&mut buf, u32::from(format.bit_depth), Endian::Big)?;

    endian::write_fourcc(&mut buf, FourCC::DATA)?;
    let data_size_at = buf.len() as u64;
    endian::write_i64(&mut buf, 0, Endian::Big)?;
    endian::write_u32(&mut buf, 0, Endian::Big)?;

    let layout = HeaderLayout {
        container_size: None,
        frame_count: None,
        data_size: SizeField::new(data_size_at, FieldWidth::I64, Endian::Big),
        data_size_bias: EDIT_COUNT_SIZE,
    };
    Ok((buf, layout))
}
