//! IEEE 754 80-bit extended precision floats, as used by the AIFF COMM
//! sample-rate field.
//!
//! Layout (big-endian, 10 bytes): bit 79 sign, bits 78..64 biased exponent
//! (bias 16383), bits 63..0 mantissa with an explicit integer bit.

/// How out-of-range sample rates are turned into integer Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendedFloatMode {
    /// Saturating decode kept for byte-for-byte compatibility with existing
    /// fixtures: negative -> 0, below 1.0 -> 1, huge exponents -> fixed caps.
    #[default]
    Reference,
    /// Full extended-float decode, rounded and clamped to `u32`
    Exact,
}

const EXPONENT_BIAS: i32 = 16383;

/// Sample rate reported by the reference decoder for exponents above 2^64
pub const SATURATED_RATE: u32 = 67_108_864;
/// Sample rate reported by the reference decoder for exponents in 2^29..2^64
pub const LARGE_RATE: u32 = 800_000_000;

/// Converts an extended float to an integer sample rate
pub fn to_sample_rate(bytes: &[u8; 10], mode: ExtendedFloatMode) -> u32 {
    match mode {
        ExtendedFloatMode::Reference => reference_sample_rate(bytes),
        ExtendedFloatMode::Exact => {
            let value = decode_f64(bytes);
            if !value.is_finite() || value <= 0.0 {
                0
            } else if value >= u32::MAX as f64 {
                u32::MAX
            } else {
                value.round() as u32
            }
        }
    }
}

fn reference_sample_rate(b: &[u8; 10]) -> u32 {
    if b[0] & 0x80 != 0 {
        return 0;
    }
    if b[0] <= 0x3F {
        return 1;
    }
    if b[0] > 0x40 {
        return SATURATED_RATE;
    }
    if b[0] == 0x40 && b[1] > 0x1C {
        return LARGE_RATE;
    }

    let mut i = (u32::from(b[2]) << 23)
        | (u32::from(b[3]) << 15)
        | (u32::from(b[4]) << 7)
        | (u32::from(b[5]) >> 1);
    i >>= 29 - u32::from(b[1]);
    i
}

/// Decodes the full extended float value
pub fn decode_f64(b: &[u8; 10]) -> f64 {
    let negative = b[0] & 0x80 != 0;
    let exponent = (i32::from(b[0] & 0x7F) << 8) | i32::from(b[1]);
    let mut mantissa_bytes = [0u8; 8];
    mantissa_bytes.copy_from_slice(&b[2..]);
    let mantissa = u64::from_be_bytes(mantissa_bytes);

    let magnitude = if exponent == 0 && mantissa == 0 {
        0.0
    } else if exponent == 0x7FFF {
        if mantissa << 1 == 0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else {
        // Denormals use an effective exponent of 1 - bias
        let e = if exponent == 0 { 1 } else { exponent };
        scale_pow2(mantissa as f64, e - EXPONENT_BIAS - 63)
    };

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// `x * 2^n`, applied in steps so no single factor leaves the f64 range
fn scale_pow2(mut x: f64, mut n: i32) -> f64 {
    const STEP: i32 = 1000;
    while n > STEP {
        x *= 2f64.powi(STEP);
        n -= STEP;
    }
    while n < -STEP {
        x *= 2f64.powi(-STEP);
        n += STEP;
    }
    x * 2f64.powi(n)
}

/// Encodes a double as an extended float (frexp-style normalization)
pub fn encode_f64(value: f64) -> [u8; 10] {
    let bits = value.to_bits();
    let sign: u16 = if value.is_sign_negative() { 0x8000 } else { 0 };

    let (exponent, mantissa): (u16, u64) = if value == 0.0 {
        (0, 0)
    } else if value.is_nan() {
        (0x7FFF, 0xC000_0000_0000_0000)
    } else if value.is_infinite() {
        (0x7FFF, 0x8000_0000_0000_0000)
    } else {
        let raw_exp = ((bits >> 52) & 0x7FF) as i32;
        let fraction = bits & ((1u64 << 52) - 1);
        if raw_exp == 0 {
            // f64 subnormal: normalize so the explicit integer bit is set
            let shift = fraction.leading_zeros();
            let e = 63 - 1074 - shift as i32;
            ((e + EXPONENT_BIAS) as u16, fraction << shift)
        } else {
            let e = raw_exp - 1023;
            ((e + EXPONENT_BIAS) as u16, (fraction | (1u64 << 52)) << 11)
        }
    };

    let mut out = [0u8; 10];
    out[..2].copy_from_slice(&(exponent | sign).to_be_bytes());
    out[2..].copy_from_slice(&mantissa.to_be_bytes());
    out
}

/// Encodes an integer sample rate
pub fn from_sample_rate(rate: u32) -> [u8; 10] {
    encode_f64(f64::from(rate))
}
