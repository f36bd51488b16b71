//! Linear PCM sample codec.
//!
//! Maps a fixed-width byte window to one sample and back. The width is
//! `(bit_depth - 1) / 8 + 1` bytes. 8-bit samples are unsigned, wider integer
//! samples are signed two's complement, and 32-bit float samples are IEEE 754
//! singles.

use super::endian::Endian;
use super::error::{ContainerError, Result};
use super::formats::SampleFormat;

/// Byte width of one sample at `bit_depth`
pub fn bytes_per_sample(bit_depth: u16) -> usize {
    if bit_depth == 0 {
        0
    } else {
        usize::from((bit_depth - 1) / 8 + 1)
    }
}

/// Decodes one integer sample; `bytes` must hold at least one sample
pub fn decode_sample(bytes: &[u8], bit_depth: u16, order: Endian) -> Result<i32> {
    let codec = SampleCodec::new(bit_depth, order, SampleFormat::Int)?;
    let width = codec.bytes_per_sample();
    let window = bytes.get(..width).ok_or(ContainerError::TruncatedStream {
        needed: width as u64,
        available: bytes.len() as u64,
    })?;
    Ok(codec.decode_int(window))
}

/// Encodes one integer sample into exactly `bytes_per_sample(bit_depth)` bytes
pub fn encode_sample(value: i32, bit_depth: u16, order: Endian) -> Result<Vec<u8>> {
    let codec = SampleCodec::new(bit_depth, order, SampleFormat::Int)?;
    let mut out = vec![0u8; codec.bytes_per_sample()];
    codec.encode_int(value, &mut out);
    Ok(out)
}

/// Sample codec selected once per stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCodec {
    bit_depth: u16,
    width: usize,
    order: Endian,
    format: SampleFormat,
}

impl SampleCodec {
    /// Validates the depth/format pair
    ///
    /// Integer samples support 8, 16, 24 and 32 bits; float samples only 32.
    pub fn new(bit_depth: u16, order: Endian, format: SampleFormat) -> Result<Self> {
        let supported = match format {
            SampleFormat::Int => matches!(bit_depth, 8 | 16 | 24 | 32),
            SampleFormat::Float => bit_depth == 32,
        };
        if !supported {
            return Err(ContainerError::UnsupportedBitDepth(bit_depth));
        }
        Ok(Self {
            bit_depth,
            width: bytes_per_sample(bit_depth),
            order,
            format,
        })
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.width
    }

    pub fn byte_order(&self) -> Endian {
        self.order
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Decodes `bytes[..width]` to an integer sample
    ///
    /// Float samples are scaled by 2^31 and saturated.
    pub fn decode_int(&self, bytes: &[u8]) -> i32 {
        if self.format == SampleFormat::Float {
            return (f64::from(self.raw_f32(bytes)) * 2_147_483_648.0) as i32;
        }
        match (self.width, self.order) {
            (1, _) => i32::from(bytes[0]),
            (2, Endian::Big) => i32::from(i16::from_be_bytes([bytes[0], bytes[1]])),
            (2, Endian::Little) => i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            (3, Endian::Big) => sign_extend_24(
                (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]),
            ),
            (3, Endian::Little) => sign_extend_24(
                (u32::from(bytes[2]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[0]),
            ),
            (_, Endian::Big) => i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            (_, Endian::Little) => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Encodes an integer sample into `out[..width]`, saturating out-of-range values
    pub fn encode_int(&self, value: i32, out: &mut [u8]) {
        if self.format == SampleFormat::Float {
            let f = (f64::from(value) / 2_147_483_648.0) as f32;
            self.put_f32(f, out);
            return;
        }
        match self.width {
            1 => out[0] = value.clamp(0, 255) as u8,
            2 => {
                let v = value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
                let b = match self.order {
                    Endian::Big => v.to_be_bytes(),
                    Endian::Little => v.to_le_bytes(),
                };
                out[..2].copy_from_slice(&b);
            }
            3 => {
                let v = value.clamp(-(1 << 23), (1 << 23) - 1) as u32;
                let (hi, mid, lo) = ((v >> 16) as u8, (v >> 8) as u8, v as u8);
                match self.order {
                    Endian::Big => out[..3].copy_from_slice(&[hi, mid, lo]),
                    Endian::Little => out[..3].copy_from_slice(&[lo, mid, hi]),
                }
            }
            _ => {
                let b = match self.order {
                    Endian::Big => value.to_be_bytes(),
                    Endian::Little => value.to_le_bytes(),
                };
                out[..4].copy_from_slice(&b);
            }
        }
    }

    /// Decodes a sample as a float; integer samples are normalized to [-1, 1)
    pub fn decode_float(&self, bytes: &[u8]) -> f64 {
        if self.format == SampleFormat::Float {
            return f64::from(self.raw_f32(bytes));
        }
        let v = f64::from(self.decode_int(bytes));
        match self.width {
            1 => (v - 128.0) / 128.0,
            2 => v / 32_768.0,
            3 => v / 8_388_608.0,
            _ => v / 2_147_483_648.0,
        }
    }

    /// Inverse of [`decode_float`](Self::decode_float), saturating integer samples
    pub fn encode_float(&self, value: f64, out: &mut [u8]) {
        if self.format == SampleFormat::Float {
            self.put_f32(value as f32, out);
            return;
        }
        let scaled = match self.width {
            1 => (value * 128.0).round() + 128.0,
            2 => (value * 32_768.0).round(),
            3 => (value * 8_388_608.0).round(),
            _ => (value * 2_147_483_648.0).round(),
        };
        // `as` saturates at the i32 range; encode_int clamps to the depth
        self.encode_int(scaled as i32, out);
    }

    fn raw_f32(&self, bytes: &[u8]) -> f32 {
        let b = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self.order {
            Endian::Big => f32::from_be_bytes(b),
            Endian::Little => f32::from_le_bytes(b),
        }
    }

    fn put_f32(&self, value: f32, out: &mut [u8]) {
        let b = match self.order {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        };
        out[..4].copy_from_slice(&b);
    }
}

fn sign_extend_24(v: u32) -> i32 {
    ((v << 8) as i32) >> 8
}
