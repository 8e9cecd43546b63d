//! Sample type definitions

use serde::{Deserialize, Serialize};

/// Supported sample data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// Pair of 32-bit floats (real, imaginary)
    ComplexFloat32,
    /// Pair of 64-bit floats (real, imaginary)
    ComplexFloat64,
    /// Pair of 64-bit signed integers (start, end)
    RangeInt64,
    /// Opaque bytes of variable length
    Binary,
    /// UTF-8 text of variable length
    String,
    /// Composite sample described by struct fields
    Struct,
    /// No type assigned
    Undefined,
}

impl SampleType {
    /// Returns the size in bytes of one element, or `None` when the size is not
    /// fixed by the type alone (variable-length and struct types).
    pub const fn size(&self) -> Option<usize> {
        match self {
            SampleType::Int8 | SampleType::UInt8 => Some(1),
            SampleType::Int16 | SampleType::UInt16 => Some(2),
            SampleType::Float32 | SampleType::Int32 | SampleType::UInt32 => Some(4),
            SampleType::Float64 | SampleType::Int64 | SampleType::UInt64 => Some(8),
            SampleType::ComplexFloat32 => Some(8),
            SampleType::ComplexFloat64 | SampleType::RangeInt64 => Some(16),
            SampleType::Binary | SampleType::String | SampleType::Struct => None,
            SampleType::Undefined => None,
        }
    }

    /// Scalar real-valued numeric types.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            SampleType::Float32
                | SampleType::Float64
                | SampleType::Int8
                | SampleType::Int16
                | SampleType::Int32
                | SampleType::Int64
                | SampleType::UInt8
                | SampleType::UInt16
                | SampleType::UInt32
                | SampleType::UInt64
        )
    }

    pub const fn is_complex(&self) -> bool {
        matches!(self, SampleType::ComplexFloat32 | SampleType::ComplexFloat64)
    }

    pub const fn is_variable_size(&self) -> bool {
        matches!(self, SampleType::Binary | SampleType::String)
    }

    /// Whether samples of this type can be decoded into `target`.
    ///
    /// Numeric types convert among themselves, complex types among
    /// themselves, and range types only to range types.
    pub fn is_convertible_to(&self, target: SampleType) -> bool {
        if self.is_numeric() && target.is_numeric() {
            return true;
        }
        if self.is_complex() && target.is_complex() {
            return true;
        }
        *self == SampleType::RangeInt64 && target == SampleType::RangeInt64
    }
}
