//! Purpose: Element types, their stable integer codes and byte-level element access.
//! Exports: `Dtype`, `Category`, `Scalar`, `Complex64`.
//! Role: Shared vocabulary between the C boundary (codes) and the engine (storage).
//! Invariants: Dtype codes are stable and C-visible; never renumber.
//! Invariants: `Complex64` is layout-compatible with C `double _Complex` (checked at compile time).
use std::fmt;
use std::mem::{align_of, size_of};

use crate::core::error::{Error, ErrorKind, Result};

/// Two `f64` components, real then imaginary.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

// C99 `double _Complex` is specified as `double[2]` (real, imaginary).
const _: () = assert!(size_of::<Complex64>() == 2 * size_of::<f64>());
const _: () = assert!(align_of::<Complex64>() == align_of::<f64>());

impl Complex64 {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(i8)]
pub enum Dtype {
    Byte = 0,
    Char = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Half = 5,
    Float = 6,
    Double = 7,
    ComplexHalf = 8,
    ComplexFloat = 9,
    ComplexDouble = 10,
    Bool = 11,
    QInt8 = 12,
    QUInt8 = 13,
    QInt32 = 14,
    BFloat16 = 15,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Category {
    Bool,
    Integer,
    Floating,
    Complex,
}

/// A single element lifted out of storage for arithmetic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex64),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(value) => f64::from(u8::from(value)),
            Scalar::Int(value) => value as f64,
            Scalar::Float(value) => value,
            Scalar::Complex(value) => value.re,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Bool(value) => i64::from(value),
            Scalar::Int(value) => value,
            Scalar::Float(value) => value as i64,
            Scalar::Complex(value) => value.re as i64,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Scalar::Bool(value) => value,
            Scalar::Int(value) => value != 0,
            Scalar::Float(value) => value != 0.0,
            Scalar::Complex(value) => value.re != 0.0 || value.im != 0.0,
        }
    }

    pub fn as_complex(self) -> Complex64 {
        match self {
            Scalar::Complex(value) => value,
            other => Complex64::new(other.as_f64(), 0.0),
        }
    }
}

impl Dtype {
    pub const ALL: [Dtype; 16] = [
        Dtype::Byte,
        Dtype::Char,
        Dtype::Short,
        Dtype::Int,
        Dtype::Long,
        Dtype::Half,
        Dtype::Float,
        Dtype::Double,
        Dtype::ComplexHalf,
        Dtype::ComplexFloat,
        Dtype::ComplexDouble,
        Dtype::Bool,
        Dtype::QInt8,
        Dtype::QUInt8,
        Dtype::QInt32,
        Dtype::BFloat16,
    ];

    pub fn from_code(code: i8) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or_else(|| {
                Error::new(ErrorKind::Construction).with_message(format!("unknown dtype code {code}"))
            })
    }

    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn name(self) -> &'static str {
        match self {
            Dtype::Byte => "uint8",
            Dtype::Char => "int8",
            Dtype::Short => "int16",
            Dtype::Int => "int32",
            Dtype::Long => "int64",
            Dtype::Half => "float16",
            Dtype::Float => "float32",
            Dtype::Double => "float64",
            Dtype::ComplexHalf => "complex32",
            Dtype::ComplexFloat => "complex64",
            Dtype::ComplexDouble => "complex128",
            Dtype::Bool => "bool",
            Dtype::QInt8 => "qint8",
            Dtype::QUInt8 => "quint8",
            Dtype::QInt32 => "qint32",
            Dtype::BFloat16 => "bfloat16",
        }
    }

    pub fn element_size(self) -> usize {
        match self {
            Dtype::Byte | Dtype::Char | Dtype::Bool | Dtype::QInt8 | Dtype::QUInt8 => 1,
            Dtype::Short | Dtype::Half | Dtype::BFloat16 => 2,
            Dtype::Int | Dtype::QInt32 | Dtype::ComplexHalf => 4,
            Dtype::Float => 4,
            Dtype::Long | Dtype::Double | Dtype::ComplexFloat => 8,
            Dtype::ComplexDouble => 16,
        }
    }

    pub fn category(self) -> Category {
        match self {
            Dtype::Bool => Category::Bool,
            Dtype::Byte
            | Dtype::Char
            | Dtype::Short
            | Dtype::Int
            | Dtype::Long
            | Dtype::QInt8
            | Dtype::QUInt8
            | Dtype::QInt32 => Category::Integer,
            Dtype::Half | Dtype::Float | Dtype::Double | Dtype::BFloat16 => Category::Floating,
            Dtype::ComplexHalf | Dtype::ComplexFloat | Dtype::ComplexDouble => Category::Complex,
        }
    }

    pub fn is_floating_point(self) -> bool {
        self.category() == Category::Floating
    }

    pub fn is_complex(self) -> bool {
        self.category() == Category::Complex
    }

    /// Fails for dtypes the reference engine can name but not store.
    pub fn ensure_supported(self) -> Result<Self> {
        match self {
            Dtype::ComplexHalf | Dtype::QInt8 | Dtype::QUInt8 | Dtype::QInt32 => Err(
                Error::unsupported(format!("dtype {} is not supported by the engine", self.name())),
            ),
            other => Ok(other),
        }
    }

    /// Result dtype of a binary operation between `self` and `other`.
    pub fn promote(self, other: Dtype) -> Dtype {
        if self == other {
            return self;
        }
        let (a, b) = (self.category(), other.category());
        if a != b {
            return if a > b { self } else { other };
        }
        match (self, other) {
            (Dtype::Byte, Dtype::Char) | (Dtype::Char, Dtype::Byte) => Dtype::Short,
            (Dtype::Half, Dtype::BFloat16) | (Dtype::BFloat16, Dtype::Half) => Dtype::Float,
            _ if self.element_size() >= other.element_size() => self,
            _ => other,
        }
    }

    /// Decode one element in host byte order; `bytes` must be exactly `element_size()` long.
    pub fn read(self, bytes: &[u8]) -> Scalar {
        match self {
            Dtype::Bool => Scalar::Bool(bytes[0] != 0),
            Dtype::Byte | Dtype::QUInt8 => Scalar::Int(i64::from(bytes[0])),
            Dtype::Char | Dtype::QInt8 => Scalar::Int(i64::from(bytes[0] as i8)),
            Dtype::Short => Scalar::Int(i64::from(i16::from_ne_bytes([bytes[0], bytes[1]]))),
            Dtype::Int | Dtype::QInt32 => Scalar::Int(i64::from(i32::from_ne_bytes(array4(bytes)))),
            Dtype::Long => Scalar::Int(i64::from_ne_bytes(array8(bytes))),
            Dtype::Half => Scalar::Float(f64::from(f16_to_f32(u16::from_ne_bytes([
                bytes[0], bytes[1],
            ])))),
            Dtype::BFloat16 => Scalar::Float(f64::from(bf16_to_f32(u16::from_ne_bytes([
                bytes[0], bytes[1],
            ])))),
            Dtype::Float => Scalar::Float(f64::from(f32::from_ne_bytes(array4(bytes)))),
            Dtype::Double => Scalar::Float(f64::from_ne_bytes(array8(bytes))),
            Dtype::ComplexHalf => Scalar::Complex(Complex64::new(
                f64::from(f16_to_f32(u16::from_ne_bytes([bytes[0], bytes[1]]))),
                f64::from(f16_to_f32(u16::from_ne_bytes([bytes[2], bytes[3]]))),
            )),
            Dtype::ComplexFloat => Scalar::Complex(Complex64::new(
                f64::from(f32::from_ne_bytes(array4(&bytes[0..4]))),
                f64::from(f32::from_ne_bytes(array4(&bytes[4..8]))),
            )),
            Dtype::ComplexDouble => Scalar::Complex(Complex64::new(
                f64::from_ne_bytes(array8(&bytes[0..8])),
                f64::from_ne_bytes(array8(&bytes[8..16])),
            )),
        }
    }

    /// Encode one element with C-style conversion; `out` must be `element_size()` long.
    pub fn write(self, value: Scalar, out: &mut [u8]) {
        match self {
            Dtype::Bool => out[0] = u8::from(value.as_bool()),
            Dtype::Byte | Dtype::QUInt8 => out[0] = integral(value) as u8,
            Dtype::Char | Dtype::QInt8 => out[0] = integral(value) as i8 as u8,
            Dtype::Short => out.copy_from_slice(&(integral(value) as i16).to_ne_bytes()),
            Dtype::Int | Dtype::QInt32 => {
                out.copy_from_slice(&(integral(value) as i32).to_ne_bytes())
            }
            Dtype::Long => out.copy_from_slice(&integral(value).to_ne_bytes()),
            Dtype::Half => out.copy_from_slice(&f32_to_f16(value.as_f64() as f32).to_ne_bytes()),
            Dtype::BFloat16 => {
                out.copy_from_slice(&f32_to_bf16(value.as_f64() as f32).to_ne_bytes())
            }
            Dtype::Float => out.copy_from_slice(&(value.as_f64() as f32).to_ne_bytes()),
            Dtype::Double => out.copy_from_slice(&value.as_f64().to_ne_bytes()),
            Dtype::ComplexHalf => {
                let c = value.as_complex();
                out[0..2].copy_from_slice(&f32_to_f16(c.re as f32).to_ne_bytes());
                out[2..4].copy_from_slice(&f32_to_f16(c.im as f32).to_ne_bytes());
            }
            Dtype::ComplexFloat => {
                let c = value.as_complex();
                out[0..4].copy_from_slice(&(c.re as f32).to_ne_bytes());
                out[4..8].copy_from_slice(&(c.im as f32).to_ne_bytes());
            }
            Dtype::ComplexDouble => {
                let c = value.as_complex();
                out[0..8].copy_from_slice(&c.re.to_ne_bytes());
                out[8..16].copy_from_slice(&c.im.to_ne_bytes());
            }
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Float to integer conversion truncates toward zero and saturates, like `as`.
fn integral(value: Scalar) -> i64 {
    value.as_i64()
}

fn array4(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes[..4]);
    out
}

fn array8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

pub fn f16_to_f32(half: u16) -> f32 {
    let sign = u32::from(half & 0x8000) << 16;
    let exp = u32::from((half >> 10) & 0x1f);
    let mant = u32::from(half & 0x3ff);
    if exp == 0 {
        let magnitude = mant as f32 * 2f32.powi(-24);
        return if sign != 0 { -magnitude } else { magnitude };
    }
    let bits = if exp == 0x1f {
        sign | 0x7f80_0000 | (mant << 13)
    } else {
        sign | ((exp + 112) << 23) | (mant << 13)
    };
    f32::from_bits(bits)
}

pub fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mant = bits & 0x7f_ffff;
    if exp == 0xff {
        return sign | 0x7c00 | if mant != 0 { 0x200 } else { 0 };
    }
    let half_exp = exp - 112;
    if half_exp >= 0x1f {
        return sign | 0x7c00;
    }
    if half_exp <= 0 {
        let shift = 14 - half_exp;
        if shift > 24 {
            return sign;
        }
        let full = mant | 0x80_0000;
        let rounded = (full + (1 << (shift - 1))) >> shift;
        return sign | rounded as u16;
    }
    let mut half = u32::from(sign) | ((half_exp as u32) << 10) | (mant >> 13);
    if mant & 0x1000 != 0 {
        half += 1;
    }
    half as u16
}

pub fn bf16_to_f32(value: u16) -> f32 {
    f32::from_bits(u32::from(value) << 16)
}

pub fn f32_to_bf16(value: f32) -> u16 {
    let bits = value.to_bits();
    if value.is_nan() {
        return ((bits >> 16) as u16) | 0x0040;
    }
    let rounding = 0x7fff + ((bits >> 16) & 1);
    (bits.wrapping_add(rounding) >> 16) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        for (index, dtype) in Dtype::ALL.iter().enumerate() {
            assert_eq!(dtype.code() as usize, index);
            assert_eq!(Dtype::from_code(index as i8).expect("known code"), *dtype);
        }
        assert_eq!(
            Dtype::from_code(16).expect_err("unknown").kind(),
            ErrorKind::Construction
        );
        assert_eq!(
            Dtype::from_code(-1).expect_err("negative").kind(),
            ErrorKind::Construction
        );
    }

    #[test]
    fn promotion_follows_category_then_width() {
        assert_eq!(Dtype::Int.promote(Dtype::Float), Dtype::Float);
        assert_eq!(Dtype::Bool.promote(Dtype::Long), Dtype::Long);
        assert_eq!(Dtype::Float.promote(Dtype::Double), Dtype::Double);
        assert_eq!(Dtype::Double.promote(Dtype::ComplexFloat), Dtype::ComplexFloat);
        assert_eq!(Dtype::Byte.promote(Dtype::Char), Dtype::Short);
        assert_eq!(Dtype::Half.promote(Dtype::BFloat16), Dtype::Float);
    }

    #[test]
    fn element_round_trip_through_bytes() {
        let mut buf = [0u8; 16];
        Dtype::Short.write(Scalar::Int(-1234), &mut buf[..2]);
        assert_eq!(Dtype::Short.read(&buf[..2]), Scalar::Int(-1234));

        Dtype::ComplexDouble.write(Scalar::Complex(Complex64::new(1.5, -2.0)), &mut buf);
        assert_eq!(
            Dtype::ComplexDouble.read(&buf),
            Scalar::Complex(Complex64::new(1.5, -2.0))
        );

        Dtype::Bool.write(Scalar::Float(0.25), &mut buf[..1]);
        assert_eq!(Dtype::Bool.read(&buf[..1]), Scalar::Bool(true));
    }

    #[test]
    fn half_precision_conversions_are_close() {
        for value in [0.0f32, 1.0, -2.5, 65504.0, 2f32.powi(-14), 2f32.powi(-20), 3.140625] {
            assert_eq!(f16_to_f32(f32_to_f16(value)), value);
        }
        assert!(f16_to_f32(f32_to_f16(f32::NAN)).is_nan());
        assert_eq!(f16_to_f32(f32_to_f16(1.0e6)), f32::INFINITY);
        assert_eq!(bf16_to_f32(f32_to_bf16(1.0)), 1.0);
        assert_eq!(bf16_to_f32(f32_to_bf16(-3.0)), -3.0);
    }

    #[test]
    fn unsupported_dtypes_are_reported() {
        let err = Dtype::QInt8.ensure_supported().expect_err("quantized");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(Dtype::BFloat16.ensure_supported().is_ok());
    }
}
