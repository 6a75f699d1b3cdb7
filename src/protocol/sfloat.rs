//! SFLOAT Numeric Codec
//!
//! Every fractional quantity in the CGM profile travels as a 16-bit
//! SFLOAT: a 4-bit two's-complement decimal exponent in the high nibble
//! and a 12-bit two's-complement mantissa below it, so the engineering
//! value is `mantissa * 10^exponent`. Five mantissa codes at the top of
//! the positive range are reserved for sentinel states and never carry a
//! numeric value.

use crate::error::EncodeError;

// Reserved 12-bit mantissa codes.
const MANTISSA_POS_INFINITY: u16 = 0x07FE;
const MANTISSA_NAN: u16 = 0x07FF;
const MANTISSA_NRES: u16 = 0x0800;
const MANTISSA_RESERVED: u16 = 0x0801;
const MANTISSA_NEG_INFINITY: u16 = 0x0802;

/// Largest usable mantissa magnitude once the reserved codes are excluded.
pub const MANTISSA_MAX: i32 = 2045;
pub const MANTISSA_MIN: i32 = -2045;

pub const EXPONENT_MAX: i8 = 7;
pub const EXPONENT_MIN: i8 = -8;

/// A decoded SFLOAT quantity.
///
/// `Value` holds the engineering form. The remaining variants are the
/// sentinel states a sensor may report in place of a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sfloat {
    Value(f64),
    NotANumber,
    PositiveInfinity,
    NegativeInfinity,
    /// The value exceeds the resolution the device can represent (NRes).
    ResolutionExceeded,
}

impl Sfloat {
    /// Decode a raw 16-bit SFLOAT.
    pub fn decode(raw: u16) -> Self {
        let mantissa_raw = raw & 0x0FFF;
        match mantissa_raw {
            // Sentinels are identified by the mantissa alone; the exponent
            // bits are don't-care on the wire.
            MANTISSA_NAN | MANTISSA_RESERVED => return Sfloat::NotANumber,
            MANTISSA_POS_INFINITY => return Sfloat::PositiveInfinity,
            MANTISSA_NEG_INFINITY => return Sfloat::NegativeInfinity,
            MANTISSA_NRES => return Sfloat::ResolutionExceeded,
            _ => {}
        }

        let mantissa = sign_extend_12(mantissa_raw);
        let exponent = sign_extend_4((raw >> 12) as u16);
        Sfloat::Value(scale(mantissa, exponent))
    }

    /// Decode from the two little-endian wire bytes.
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self::decode(u16::from_le_bytes(bytes))
    }

    /// Encode to the raw 16-bit form, placing a numeric value at the given
    /// decimal exponent. Values whose mantissa does not fit at that
    /// exponent are rejected rather than truncated. Sentinel states encode
    /// to their canonical codes and ignore the exponent.
    pub fn encode(&self, exponent: i8) -> Result<u16, EncodeError> {
        let value = match *self {
            Sfloat::NotANumber => return Ok(MANTISSA_NAN),
            Sfloat::PositiveInfinity => return Ok(MANTISSA_POS_INFINITY),
            Sfloat::NegativeInfinity => return Ok(MANTISSA_NEG_INFINITY),
            Sfloat::ResolutionExceeded => return Ok(MANTISSA_NRES),
            Sfloat::Value(value) => value,
        };

        if !(EXPONENT_MIN..=EXPONENT_MAX).contains(&exponent) {
            return Err(EncodeError::ExponentOutOfRange(exponent));
        }

        let mantissa = unscale(value, exponent).round();
        if !(MANTISSA_MIN as f64..=MANTISSA_MAX as f64).contains(&mantissa) {
            return Err(EncodeError::ValueOutOfRange { value, exponent });
        }

        let mantissa_bits = (mantissa as i16 as u16) & 0x0FFF;
        let exponent_bits = ((exponent as u16) & 0x000F) << 12;
        Ok(exponent_bits | mantissa_bits)
    }

    /// Encode to the two little-endian wire bytes.
    pub fn to_le_bytes(&self, exponent: i8) -> Result<[u8; 2], EncodeError> {
        Ok(self.encode(exponent)?.to_le_bytes())
    }

    /// The numeric value, if this is not a sentinel state.
    pub fn value(&self) -> Option<f64> {
        match *self {
            Sfloat::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Sfloat::NotANumber)
    }
}

impl From<f64> for Sfloat {
    fn from(value: f64) -> Self {
        Sfloat::Value(value)
    }
}

fn sign_extend_12(raw: u16) -> i32 {
    if raw & 0x0800 != 0 {
        raw as i32 - 0x1000
    } else {
        raw as i32
    }
}

fn sign_extend_4(raw: u16) -> i8 {
    if raw & 0x0008 != 0 {
        (raw & 0x000F) as i8 - 0x10
    } else {
        (raw & 0x000F) as i8
    }
}

/// `mantissa * 10^exponent`, computed by dividing for negative exponents
/// so round-tripping stays exact across the representable range.
fn scale(mantissa: i32, exponent: i8) -> f64 {
    if exponent >= 0 {
        mantissa as f64 * 10f64.powi(exponent as i32)
    } else {
        mantissa as f64 / 10f64.powi(-(exponent as i32))
    }
}

fn unscale(value: f64, exponent: i8) -> f64 {
    if exponent >= 0 {
        value / 10f64.powi(exponent as i32)
    } else {
        value * 10f64.powi(-(exponent as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_values() {
        // 75 mg/dl with exponent 0
        assert_eq!(Sfloat::decode(0x004B), Sfloat::Value(75.0));
        // 3.5 as mantissa 35, exponent -1 (0xF)
        assert_eq!(Sfloat::decode(0xF023), Sfloat::Value(3.5));
        // negative mantissa: -40 at exponent 0
        assert_eq!(Sfloat::decode(0x0FD8), Sfloat::Value(-40.0));
    }

    #[test]
    fn decodes_sentinels_regardless_of_exponent() {
        for exponent_bits in 0..=0xF_u16 {
            let base = exponent_bits << 12;
            assert_eq!(Sfloat::decode(base | MANTISSA_NAN), Sfloat::NotANumber);
            assert_eq!(
                Sfloat::decode(base | MANTISSA_POS_INFINITY),
                Sfloat::PositiveInfinity
            );
            assert_eq!(
                Sfloat::decode(base | MANTISSA_NEG_INFINITY),
                Sfloat::NegativeInfinity
            );
            assert_eq!(
                Sfloat::decode(base | MANTISSA_NRES),
                Sfloat::ResolutionExceeded
            );
            assert_eq!(Sfloat::decode(base | MANTISSA_RESERVED), Sfloat::NotANumber);
        }
    }

    #[test]
    fn round_trips_all_representable_pairs() {
        for exponent in EXPONENT_MIN..=EXPONENT_MAX {
            for mantissa in MANTISSA_MIN..=MANTISSA_MAX {
                let value = Sfloat::Value(scale(mantissa, exponent));
                let raw = value.encode(exponent).unwrap();
                assert_eq!(
                    Sfloat::decode(raw),
                    value,
                    "mantissa {mantissa} exponent {exponent}"
                );
            }
        }
    }

    #[test]
    fn rejects_unrepresentable_values() {
        assert!(matches!(
            Sfloat::Value(2046.0).encode(0),
            Err(EncodeError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            Sfloat::Value(-2046.0).encode(0),
            Err(EncodeError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            Sfloat::Value(1.0).encode(8),
            Err(EncodeError::ExponentOutOfRange(8))
        ));
    }

    #[test]
    fn sentinels_encode_to_canonical_codes() {
        assert_eq!(Sfloat::NotANumber.encode(3).unwrap(), MANTISSA_NAN);
        assert_eq!(
            Sfloat::PositiveInfinity.encode(0).unwrap(),
            MANTISSA_POS_INFINITY
        );
        assert_eq!(
            Sfloat::NegativeInfinity.encode(0).unwrap(),
            MANTISSA_NEG_INFINITY
        );
        assert_eq!(Sfloat::ResolutionExceeded.encode(0).unwrap(), MANTISSA_NRES);
    }

    #[test]
    fn wire_byte_order_is_little_endian() {
        let bytes = Sfloat::Value(75.0).to_le_bytes(0).unwrap();
        assert_eq!(bytes, [0x4B, 0x00]);
        assert_eq!(Sfloat::from_le_bytes(bytes), Sfloat::Value(75.0));
    }
}
