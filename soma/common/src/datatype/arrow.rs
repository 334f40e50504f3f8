use arrow_schema::{DataType as ADT, TimeUnit};

use super::{Datatype, Error};

impl Datatype {
    /// Returns the Arrow type used to carry values of this element type.
    pub fn arrow_type(&self) -> ADT {
        match self {
            Datatype::Boolean => ADT::Boolean,
            Datatype::Int8 => ADT::Int8,
            Datatype::Int16 => ADT::Int16,
            Datatype::Int32 => ADT::Int32,
            Datatype::Int64 => ADT::Int64,
            Datatype::UInt8 => ADT::UInt8,
            Datatype::UInt16 => ADT::UInt16,
            Datatype::UInt32 => ADT::UInt32,
            Datatype::UInt64 => ADT::UInt64,
            Datatype::Float32 => ADT::Float32,
            Datatype::Float64 => ADT::Float64,
            Datatype::TimestampSecond => ADT::Timestamp(TimeUnit::Second, None),
            Datatype::TimestampMillisecond => {
                ADT::Timestamp(TimeUnit::Millisecond, None)
            }
            Datatype::TimestampMicrosecond => {
                ADT::Timestamp(TimeUnit::Microsecond, None)
            }
            Datatype::TimestampNanosecond => {
                ADT::Timestamp(TimeUnit::Nanosecond, None)
            }
        }
    }
}

impl TryFrom<&ADT> for Datatype {
    type Error = Error;

    fn try_from(value: &ADT) -> Result<Self, Self::Error> {
        Ok(match value {
            ADT::Boolean => Datatype::Boolean,
            ADT::Int8 => Datatype::Int8,
            ADT::Int16 => Datatype::Int16,
            ADT::Int32 => Datatype::Int32,
            ADT::Int64 => Datatype::Int64,
            ADT::UInt8 => Datatype::UInt8,
            ADT::UInt16 => Datatype::UInt16,
            ADT::UInt32 => Datatype::UInt32,
            ADT::UInt64 => Datatype::UInt64,
            ADT::Float32 => Datatype::Float32,
            ADT::Float64 => Datatype::Float64,
            ADT::Timestamp(unit, None) => match unit {
                TimeUnit::Second => Datatype::TimestampSecond,
                TimeUnit::Millisecond => Datatype::TimestampMillisecond,
                TimeUnit::Microsecond => Datatype::TimestampMicrosecond,
                TimeUnit::Nanosecond => Datatype::TimestampNanosecond,
            },
            other => return Err(Error::UnsupportedArrowType(other.to_string())),
        })
    }
}

impl TryFrom<ADT> for Datatype {
    type Error = Error;

    fn try_from(value: ADT) -> Result<Self, Self::Error> {
        Self::try_from(&value)
    }
}
