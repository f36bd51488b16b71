//! RIFF/WAVE container support
//!
//! Everything after the `RIFF` magic is little-endian. Supports:
//! - `WAVE_FORMAT_PCM` (8-bit unsigned, 16/24/32-bit signed)
//! - `WAVE_FORMAT_IEEE_FLOAT` (32-bit)
//! - `WAVE_FORMAT_EXTENSIBLE`, resolved through its sub-format GUID
//!
//! The `data` chunk has no preamble; samples start at its first byte.

use std::io::Read;

use super::chunk::Chunk;
use super::encoder::{FieldWidth, HeaderLayout, SizeField};
use super::endian::{self, Endian};
use super::error::{ContainerError, Result};
use super::formats::{
    Container, Dialect, FormatDetails, PcmFormat, SampleFormat, StreamMetadata, WavFormat,
};
use super::fourcc::FourCC;

/// Payload length of a basic `fmt ` chunk
pub const FMT_SIZE: u32 = 16;
/// Extension size that carries the sub-format GUID
const EXTENSIBLE_CB_SIZE: u16 = 22;

/// Reads the RIFF size and form type; the magic has already been consumed
pub fn read_header_body<R: Read + ?Sized>(r: &mut R) -> Result<Container> {
    let size = endian::read_u32(r, Endian::Little)?;
    let form_type = endian::read_fourcc(r)?;
    if form_type != FourCC::WAVE {
        return Err(ContainerError::UnsupportedFormat(format!(
            "RIFF type {} is not WAVE",
            form_type
        )));
    }
    Ok(Container {
        dialect: Dialect::Wav,
        magic: FourCC::RIFF,
        size: Some(u64::from(size)),
        form_type,
        version: None,
    })
}

/// Decodes a `fmt ` chunk; trailing bytes are left for the chunk view to drain
pub fn read_fmt<R: Read + ?Sized>(chunk: &mut Chunk<'_, R>) -> Result<StreamMetadata> {
    let tag = chunk.read_u16()?;
    let channels = chunk.read_u16()?;
    let sample_rate = chunk.read_u32()?;
    let avg_bytes_per_sec = chunk.read_u32()?;
    let block_align = chunk.read_u16()?;
    let bit_depth = chunk.read_u16()?;

    let extensible = tag == WavFormat::TAG_EXTENSIBLE;
    let format = if extensible && chunk.remaining() >= 2 {
        let cb_size = chunk.read_u16()?;
        if cb_size >= EXTENSIBLE_CB_SIZE && chunk.remaining() >= u64::from(EXTENSIBLE_CB_SIZE) {
            let _valid_bits = chunk.read_u16()?;
            let _channel_mask = chunk.read_u32()?;
            // The GUID starts with the classic format tag
            WavFormat::from_tag(chunk.read_u16()?)
        } else {
            WavFormat::Other(tag)
        }
    } else {
        WavFormat::from_tag(tag)
    };

    log::debug!(
        "fmt: tag 0x{:04x}, {} ch, {} Hz, {} bit, align {}",
        tag,
        channels,
        sample_rate,
        bit_depth,
        block_align
    );

    let sample_format = match format {
        WavFormat::IeeeFloat => SampleFormat::Float,
        _ => SampleFormat::Int,
    };

    Ok(StreamMetadata {
        channels,
        sample_rate,
        bit_depth,
        frame_count: None,
        avg_bytes_per_sec,
        sample_format,
        sample_order: Endian::Little,
        details: FormatDetails::Wav {
            format,
            extensible,
            block_align,
        },
    })
}

/// Builds the 44-byte canonical header written before the first sample
pub fn header_bytes(format: &PcmFormat) -> Result<(Vec<u8>, HeaderLayout)> {
    let tag = match format.sample_format {
        SampleFormat::Float => WavFormat::IeeeFloat,
        SampleFormat::Int => WavFormat::Pcm,
    };
    let block_align = format.frame_size();
    let block_align = u16::try_from(block_align).map_err(|_| {
        ContainerError::UnsupportedFormat(format!("frame size {} too large for WAV", block_align))
    })?;

    let mut buf = Vec::with_capacity(44);
    endian::write_fourcc(&mut buf, FourCC::RIFF)?;
    endian::write_u32(&mut buf, 0, Endian::Little)?;
    endian::write_fourcc(&mut buf, FourCC::WAVE)?;

    endian::write_fourcc(&mut buf, FourCC::FMT)?;
    endian::write_u32(&mut buf, FMT_SIZE, Endian::Little)?;
    endian::write_u16(&mut buf, tag.tag(), Endian::Little)?;
    endian::write_u16(&mut buf, format.channels, Endian::Little)?;
    endian::write_u32(&mut buf, format.sample_rate, Endian::Little)?;
    endian::write_u32(
        &mut buf,
        format.sample_rate.saturating_mul(u32::from(block_align)),
        Endian::Little,
    )?;
    endian::write_u16(&mut buf, block_align, Endian::Little)?;
    endian::write_u16(&mut buf, format.bit_depth, Endian::Little)?;

    endian::write_fourcc(&mut buf, FourCC::DATA)?;
    let data_size_at = buf.len() as u64;
    endian::write_u32(&mut buf, 0, Endian::Little)?;

    let layout = HeaderLayout {
        container_size: Some(SizeField::new(4, FieldWidth::U32, Endian::Little)),
        frame_count: None,
        data_size: SizeField::new(data_size_at, FieldWidth::U32, Endian::Little),
        data_size_bias: 0,
    };
    Ok((buf, layout))
}
