//! AIFF/AIFC container support
//!
//! Handles the pieces of an AIFF or AIFF-C file that differ from the other
//! dialects:
//! - `FORM` header validation (form type `AIFF` or `AIFC`)
//! - `COMM` description chunk, including the 80-bit extended sample rate and
//!   the AIFC encoding tag with its Pascal-string name
//! - the `SSND` offset/block-size preamble
//! - header layout for the encoder
//!
//! All fields are big-endian.

use std::io::Read;

use super::chunk::Chunk;
use super::encoder::{FieldWidth, HeaderLayout, SizeField};
use super::endian::{self, Endian};
use super::error::{ContainerError, Result};
use super::formats::{
    AiffEncoding, Container, Dialect, FormatDetails, PcmFormat, SampleFormat, StreamMetadata,
};
use super::fourcc::FourCC;
use super::ieee80::{self, ExtendedFloatMode};

/// Payload length of a plain AIFF `COMM` chunk
pub const COMM_SIZE: u32 = 18;
/// `SSND` offset + block size fields
pub const SSND_PREAMBLE_SIZE: u64 = 8;
/// AIFC version 1 timestamp stored in `FVER`
pub const AIFC_VERSION_1: u32 = 0xA280_5140;

const FVER: FourCC = FourCC(*b"FVER");

/// Reads the FORM size and form type; the magic has already been consumed
pub fn read_header_body<R: Read + ?Sized>(r: &mut R) -> Result<Container> {
    let size = endian::read_u32(r, Endian::Big)?;
    let form_type = endian::read_fourcc(r)?;
    if form_type != FourCC::AIFF && form_type != FourCC::AIFC {
        return Err(ContainerError::UnsupportedFormat(format!(
            "FORM type {} is not AIFF or AIFC",
            form_type
        )));
    }
    Ok(Container {
        dialect: Dialect::Aiff,
        magic: FourCC::FORM,
        size: Some(u64::from(size)),
        form_type,
        version: None,
    })
}

/// Decodes a `COMM` chunk
///
/// Plain AIFF files are always big-endian integer PCM. AIFC files carry an
/// encoding tag and, usually, a Pascal-string codec name after it.
pub fn read_comm<R: Read + ?Sized>(
    chunk: &mut Chunk<'_, R>,
    container: &Container,
    mode: ExtendedFloatMode,
) -> Result<StreamMetadata> {
    let channels = chunk.read_u16()?;
    let frames = chunk.read_u32()?;
    let bit_depth = chunk.read_u16()?;
    let rate = chunk.read_array::<10>()?;
    let sample_rate = ieee80::to_sample_rate(&rate, mode);

    let (encoding, encoding_name) = if container.is_aifc() && chunk.remaining() >= 4 {
        let encoding = AiffEncoding::from_fourcc(chunk.read_fourcc()?);
        let name = if chunk.remaining() > 0 {
            Some(read_pstring(chunk)?)
        } else {
            None
        };
        (encoding, name)
    } else {
        (AiffEncoding::None, None)
    };

    log::debug!(
        "COMM: {} ch, {} frames, {} bit, {} Hz, encoding {}",
        channels,
        frames,
        bit_depth,
        sample_rate,
        encoding.fourcc()
    );

    Ok(StreamMetadata {
        channels,
        sample_rate,
        bit_depth,
        frame_count: Some(u64::from(frames)),
        avg_bytes_per_sec: 0,
        sample_format: encoding.sample_format(),
        sample_order: encoding.byte_order(),
        details: FormatDetails::Aiff {
            encoding,
            encoding_name,
        },
    })
}

/// Pascal string: count byte, text, and a pad byte when the total is odd
fn read_pstring<R: Read + ?Sized>(chunk: &mut Chunk<'_, R>) -> Result<String> {
    let len = usize::from(chunk.read_u8()?);
    let mut text = vec![0u8; len];
    chunk.read_exact(&mut text)?;
    if (len + 1) % 2 == 1 && chunk.remaining() > 0 {
        chunk.skip(1)?;
    }
    Ok(String::from_utf8_lossy(&text).into_owned())
}

fn write_pstring(buf: &mut Vec<u8>, text: &str) {
    let bytes = &text.as_bytes()[..text.len().min(255)];
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
    if (bytes.len() + 1) % 2 == 1 {
        buf.push(0);
    }
}

/// `SSND` fields preceding the sample data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SsndPreamble {
    /// Bytes to skip before the first sample frame
    pub offset: u32,
    pub block_size: u32,
}

pub fn read_ssnd_preamble<R: Read + ?Sized>(r: &mut R) -> Result<SsndPreamble> {
    let offset = endian::read_u32(r, Endian::Big)?;
    let block_size = endian::read_u32(r, Endian::Big)?;
    Ok(SsndPreamble { offset, block_size })
}

/// Builds the header written before the first sample
///
/// Integer PCM is written as plain AIFF. Float PCM needs AIFC with an `FVER`
/// chunk and the `fl32` encoding.
pub fn header_bytes(format: &PcmFormat) -> Result<(Vec<u8>, HeaderLayout)> {
    let aifc = format.sample_format == SampleFormat::Float;
    let encoding = AiffEncoding::Fl32;

    let mut buf = Vec::with_capacity(96);
    endian::write_fourcc(&mut buf, FourCC::FORM)?;
    endian::write_u32(&mut buf, 0, Endian::Big)?;
    endian::write_fourcc(&mut buf, if aifc { FourCC::AIFC } else { FourCC::AIFF })?;

    if aifc {
        endian::write_fourcc(&mut buf, FVER)?;
        endian::write_u32(&mut buf, 4, Endian::Big)?;
        endian::write_u32(&mut buf, AIFC_VERSION_1, Endian::Big)?;
    }

    let mut comm = Vec::with_capacity(48);
    endian::write_u16(&mut comm, format.channels, Endian::Big)?;
    let frame_count_in_comm = comm.len() as u64;
    endian::write_u32(&mut comm, 0, Endian::Big)?;
    endian::write_u16(&mut comm, format.bit_depth, Endian::Big)?;
    comm.extend_from_slice(&ieee80::from_sample_rate(format.sample_rate));
    if aifc {
        endian::write_fourcc(&mut comm, encoding.fourcc())?;
        write_pstring(&mut comm, encoding.default_name());
    }

    endian::write_fourcc(&mut buf, FourCC::COMM)?;
    endian::write_u32(&mut buf, comm.len() as u32, Endian::Big)?;
    let frame_count_at = buf.len() as u64 + frame_count_in_comm;
    buf.extend_from_slice(&comm);

    endian::write_fourcc(&mut buf, FourCC::SSND)?;
    let data_size_at = buf.len() as u64;
    endian::write_u32(&mut buf, 0, Endian::Big)?;
    endian::write_u32(&mut buf, 0, Endian::Big)?;
    endian::write_u32(&mut buf, 0, Endian::Big)?;

    let layout = HeaderLayout {
        container_size: Some(SizeField::new(4, FieldWidth::U32, Endian::Big)),
        frame_count: Some(SizeField::new(frame_count_at, FieldWidth::U32, Endian::Big)),
        data_size: SizeField::new(data_size_at, FieldWidth::U32, Endian::Big),
        data_size_bias: SSND_PREAMBLE_SIZE,
    };
    Ok((buf, layout))
}
