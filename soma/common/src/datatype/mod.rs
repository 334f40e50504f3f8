#[cfg(feature = "arrow")]
pub mod arrow;

#[cfg(any(test, feature = "proptest-strategies"))]
pub mod strategy;

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Unsupported element type for an NDArray: {0}")]
    UnsupportedArrowType(String),
    #[error("Invalid datatype name: '{0}'")]
    InvalidName(String),
}

/// The element type of the `soma_data` field of an NDArray.
///
/// This is deliberately narrower than the set of types an Arrow table can
/// carry: NDArray values are fixed-width primitives only.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum Datatype {
    /// Boolean
    Boolean,
    /// An 8-bit signed integer
    Int8,
    /// A 16-bit signed integer
    Int16,
    /// A 32-bit signed integer
    Int32,
    /// A 64-bit signed integer
    Int64,
    /// An 8-bit unsigned integer
    UInt8,
    /// A 16-bit unsigned integer
    UInt16,
    /// A 32-bit unsigned integer
    UInt32,
    /// A 64-bit unsigned integer
    UInt64,
    /// A 32-bit floating point value
    Float32,
    /// A 64-bit floating point value
    Float64,
    /// Timestamp with second resolution
    TimestampSecond,
    /// Timestamp with millisecond resolution
    TimestampMillisecond,
    /// Timestamp with microsecond resolution
    TimestampMicrosecond,
    /// Timestamp with nanosecond resolution
    TimestampNanosecond,
}

const DATATYPES: [Datatype; 15] = [
    Datatype::Boolean,
    Datatype::Int8,
    Datatype::Int16,
    Datatype::Int32,
    Datatype::Int64,
    Datatype::UInt8,
    Datatype::UInt16,
    Datatype::UInt32,
    Datatype::UInt64,
    Datatype::Float32,
    Datatype::Float64,
    Datatype::TimestampSecond,
    Datatype::TimestampMillisecond,
    Datatype::TimestampMicrosecond,
    Datatype::TimestampNanosecond,
];

impl Datatype {
    /// Returns the width in bytes of one value of this type.
    /// Booleans are reported as one byte even though Arrow bit-packs them.
    pub fn size(&self) -> usize {
        match self {
            Datatype::Boolean | Datatype::Int8 | Datatype::UInt8 => 1,
            Datatype::Int16 | Datatype::UInt16 => 2,
            Datatype::Int32 | Datatype::UInt32 | Datatype::Float32 => 4,
            Datatype::Int64
            | Datatype::UInt64
            | Datatype::Float64
            | Datatype::TimestampSecond
            | Datatype::TimestampMillisecond
            | Datatype::TimestampMicrosecond
            | Datatype::TimestampNanosecond => 8,
        }
    }

    pub fn is_integral_type(&self) -> bool {
        matches!(
            self,
            Datatype::Int8
                | Datatype::Int16
                | Datatype::Int32
                | Datatype::Int64
                | Datatype::UInt8
                | Datatype::UInt16
                | Datatype::UInt32
                | Datatype::UInt64
        )
    }

    pub fn is_real_type(&self) -> bool {
        matches!(self, Datatype::Float32 | Datatype::Float64)
    }

    pub fn is_timestamp_type(&self) -> bool {
        matches!(
            self,
            Datatype::TimestampSecond
                | Datatype::TimestampMillisecond
                | Datatype::TimestampMicrosecond
                | Datatype::TimestampNanosecond
        )
    }

    /// Returns an `Iterator` which yields each variant of `Datatype`
    /// exactly once in an unspecified order.
    pub fn iter() -> impl Iterator<Item = Datatype> {
        DATATYPES.iter().copied()
    }
}

impl Display for Datatype {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        Debug::fmt(self, f)
    }
}

impl FromStr for Datatype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_ref() {
            "bool" | "boolean" => Ok(Datatype::Boolean),
            "int8" => Ok(Datatype::Int8),
            "int16" => Ok(Datatype::Int16),
            "int32" => Ok(Datatype::Int32),
            "int64" => Ok(Datatype::Int64),
            "uint8" => Ok(Datatype::UInt8),
            "uint16" => Ok(Datatype::UInt16),
            "uint32" => Ok(Datatype::UInt32),
            "uint64" => Ok(Datatype::UInt64),
            "float32" => Ok(Datatype::Float32),
            "float64" => Ok(Datatype::Float64),
            "timestampsecond" => Ok(Datatype::TimestampSecond),
            "timestampmillisecond" => Ok(Datatype::TimestampMillisecond),
            "timestampmicrosecond" => Ok(Datatype::TimestampMicrosecond),
            "timestampnanosecond" => Ok(Datatype::TimestampNanosecond),
            _ => Err(Error::InvalidName(s.to_owned())),
        }
    }
}
