//! Sample decoding trait and implementations

use serde::{Deserialize, Serialize};

use super::{Number, SampleType};
use crate::{DaqError, Result};

/// Intermediate scalar used when converting between sample types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Signed(v) => v as f64,
            Scalar::Unsigned(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }
}

impl From<Number> for Scalar {
    fn from(value: Number) -> Self {
        match value {
            Number::Int(v) => Scalar::Signed(v),
            Number::Float(v) => Scalar::Float(v),
        }
    }
}

fn array<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(DaqError::Memory { offset })
}

/// Read one little-endian scalar of type `stored` from the start of `bytes`.
pub fn read_scalar(bytes: &[u8], stored: SampleType) -> Result<Scalar> {
    let scalar = match stored {
        SampleType::Int8 => Scalar::Signed(i8::from_le_bytes(array(bytes, 0)?) as i64),
        SampleType::Int16 => Scalar::Signed(i16::from_le_bytes(array(bytes, 0)?) as i64),
        SampleType::Int32 => Scalar::Signed(i32::from_le_bytes(array(bytes, 0)?) as i64),
        SampleType::Int64 => Scalar::Signed(i64::from_le_bytes(array(bytes, 0)?)),
        SampleType::UInt8 => Scalar::Unsigned(u8::from_le_bytes(array(bytes, 0)?) as u64),
        SampleType::UInt16 => Scalar::Unsigned(u16::from_le_bytes(array(bytes, 0)?) as u64),
        SampleType::UInt32 => Scalar::Unsigned(u32::from_le_bytes(array(bytes, 0)?) as u64),
        SampleType::UInt64 => Scalar::Unsigned(u64::from_le_bytes(array(bytes, 0)?)),
        SampleType::Float32 => Scalar::Float(f32::from_le_bytes(array(bytes, 0)?) as f64),
        SampleType::Float64 => Scalar::Float(f64::from_le_bytes(array(bytes, 0)?)),
        other => {
            return Err(DaqError::IncompatibleSampleType {
                expected: SampleType::Float64,
                found: other,
            });
        }
    };
    Ok(scalar)
}

/// Trait for types that readers can decode samples into.
pub trait SampleData: Copy + Default + Send + Sync + 'static {
    /// Sample type this Rust type represents natively.
    const SAMPLE_TYPE: SampleType;

    /// Decode one element stored as `stored` from the start of `bytes`.
    fn decode(bytes: &[u8], stored: SampleType) -> Result<Self>;

    /// Convert an intermediate scalar (implicit or post-scaled values).
    fn from_scalar(value: Scalar) -> Result<Self>;

    /// Append the little-endian encoding of this value.
    fn encode(&self, out: &mut Vec<u8>);
}

macro_rules! numeric_sample_data {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl SampleData for $ty {
                const SAMPLE_TYPE: SampleType = SampleType::$variant;

                #[inline]
                fn decode(bytes: &[u8], stored: SampleType) -> Result<Self> {
                    if stored == Self::SAMPLE_TYPE {
                        return Ok(<$ty>::from_le_bytes(array(bytes, 0)?));
                    }
                    Self::from_scalar(read_scalar(bytes, stored)?)
                }

                #[inline]
                fn from_scalar(value: Scalar) -> Result<Self> {
                    Ok(match value {
                        Scalar::Signed(v) => v as $ty,
                        Scalar::Unsigned(v) => v as $ty,
                        Scalar::Float(v) => v as $ty,
                    })
                }

                fn encode(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

numeric_sample_data! {
    f32 => Float32,
    f64 => Float64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
}

/// Complex sample value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

fn decode_complex(bytes: &[u8], stored: SampleType) -> Result<(f64, f64)> {
    match stored {
        SampleType::ComplexFloat32 => Ok((
            f32::from_le_bytes(array(bytes, 0)?) as f64,
            f32::from_le_bytes(array(bytes, 4)?) as f64,
        )),
        SampleType::ComplexFloat64 => {
            Ok((f64::from_le_bytes(array(bytes, 0)?), f64::from_le_bytes(array(bytes, 8)?)))
        }
        other => Err(DaqError::IncompatibleSampleType {
            expected: SampleType::ComplexFloat64,
            found: other,
        }),
    }
}

impl SampleData for Complex<f32> {
    const SAMPLE_TYPE: SampleType = SampleType::ComplexFloat32;

    fn decode(bytes: &[u8], stored: SampleType) -> Result<Self> {
        let (re, im) = decode_complex(bytes, stored)?;
        Ok(Complex::new(re as f32, im as f32))
    }

    fn from_scalar(_value: Scalar) -> Result<Self> {
        Err(DaqError::IncompatibleSampleType {
            expected: Self::SAMPLE_TYPE,
            found: SampleType::Float64,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.re.to_le_bytes());
        out.extend_from_slice(&self.im.to_le_bytes());
    }
}

impl SampleData for Complex<f64> {
    const SAMPLE_TYPE: SampleType = SampleType::ComplexFloat64;

    fn decode(bytes: &[u8], stored: SampleType) -> Result<Self> {
        let (re, im) = decode_complex(bytes, stored)?;
        Ok(Complex::new(re, im))
    }

    fn from_scalar(_value: Scalar) -> Result<Self> {
        Err(DaqError::IncompatibleSampleType {
            expected: Self::SAMPLE_TYPE,
            found: SampleType::Float64,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.re.to_le_bytes());
        out.extend_from_slice(&self.im.to_le_bytes());
    }
}

/// Range sample value (e.g. a time span).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RangeValue {
    pub start: i64,
    pub end: i64,
}

impl SampleData for RangeValue {
    const SAMPLE_TYPE: SampleType = SampleType::RangeInt64;

    fn decode(bytes: &[u8], stored: SampleType) -> Result<Self> {
        if stored != SampleType::RangeInt64 {
            return Err(DaqError::IncompatibleSampleType {
                expected: Self::SAMPLE_TYPE,
                found: stored,
            });
        }
        Ok(RangeValue {
            start: i64::from_le_bytes(array(bytes, 0)?),
            end: i64::from_le_bytes(array(bytes, 8)?),
        })
    }

    fn from_scalar(_value: Scalar) -> Result<Self> {
        Err(DaqError::IncompatibleSampleType {
            expected: Self::SAMPLE_TYPE,
            found: SampleType::Int64,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.start.to_le_bytes());
        out.extend_from_slice(&self.end.to_le_bytes());
    }
}
