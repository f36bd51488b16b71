//! Fixed-width big/little-endian reads and writes over byte streams.

use std::io::{ErrorKind as IoErrorKind, Read, Write};

use super::error::{ContainerError, Result};
use super::fourcc::FourCC;

/// Byte order of a multi-byte field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Reads exactly `N` bytes, reporting how many were available on a short read
pub fn read_array<const N: usize, R: Read + ?Sized>(r: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    let mut filled = 0;
    while filled < N {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ContainerError::TruncatedStream {
                    needed: N as u64,
                    available: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(buf)
}

pub fn read_u8<R: Read + ?Sized>(r: &mut R) -> Result<u8> {
    Ok(read_array::<1, _>(r)?[0])
}

pub fn read_u16<R: Read + ?Sized>(r: &mut R, order: Endian) -> Result<u16> {
    let b = read_array::<2, _>(r)?;
    Ok(match order {
        Endian::Big => u16::from_be_bytes(b),
        Endian::Little => u16::from_le_bytes(b),
    })
}

pub fn read_u32<R: Read + ?Sized>(r: &mut R, order: Endian) -> Result<u32> {
    let b = read_array::<4, _>(r)?;
    Ok(match order {
        Endian::Big => u32::from_be_bytes(b),
        Endian::Little => u32::from_le_bytes(b),
    })
}

pub fn read_i64<R: Read + ?Sized>(r: &mut R, order: Endian) -> Result<i64> {
    let b = read_array::<8, _>(r)?;
    Ok(match order {
        Endian::Big => i64::from_be_bytes(b),
        Endian::Little => i64::from_le_bytes(b),
    })
}

pub fn read_f64<R: Read + ?Sized>(r: &mut R, order: Endian) -> Result<f64> {
    let b = read_array::<8, _>(r)?;
    Ok(match order {
        Endian::Big => f64::from_be_bytes(b),
        Endian::Little => f64::from_le_bytes(b),
    })
}

/// Chunk ids are raw bytes in every dialect, never byte-swapped
pub fn read_fourcc<R: Read + ?Sized>(r: &mut R) -> Result<FourCC> {
    Ok(FourCC(read_array::<4, _>(r)?))
}

pub fn write_u8<W: Write + ?Sized>(w: &mut W, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

pub fn write_u16<W: Write + ?Sized>(w: &mut W, v: u16, order: Endian) -> Result<()> {
    let b = match order {
        Endian::Big => v.to_be_bytes(),
        Endian::Little => v.to_le_bytes(),
    };
    w.write_all(&b)?;
    Ok(())
}

pub fn write_u32<W: Write + ?Sized>(w: &mut W, v: u32, order: Endian) -> Result<()> {
    let b = match order {
        Endian::Big => v.to_be_bytes(),
        Endian::Little => v.to_le_bytes(),
    };
    w.write_all(&b)?;
    Ok(())
}

pub fn write_i64<W: Write + ?Sized>(w: &mut W, v: i64, order: Endian) -> Result<()> {
    let b = match order {
        Endian::Big => v.to_be_bytes(),
        Endian::Little => v.to_le_bytes(),
    };
    w.write_all(&b)?;
    Ok(())
}

pub fn write_f64<W: Write + ?Sized>(w: &mut W, v: f64, order: Endian) -> Result<()> {
    let b = match order {
        Endian::Big => v.to_be_bytes(),
        Endian::Little => v.to_le_bytes(),
    };
    w.write_all(&b)?;
    Ok(())
}

pub fn write_fourcc<W: Write + ?Sized>(w: &mut W, id: FourCC) -> Result<()> {
    w.write_all(&id.0)?;
    Ok(())
}
