pub mod shape;

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use thiserror::Error;

#[cfg(feature = "proptest-strategies")]
use proptest::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The mode an array handle is opened in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Read,
    Write,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ModeError {
    #[error("Invalid open mode '{0}': expected \"r\" or \"w\"")]
    InvalidName(String),
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Mode::Read => write!(f, "r"),
            Mode::Write => write!(f, "w"),
        }
    }
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(Mode::Read),
            "w" => Ok(Mode::Write),
            _ => Err(ModeError::InvalidName(s.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum ArrayType {
    Dense,
    Sparse,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ArrayTypeError {
    #[error("Invalid SOMA type name: '{0}'")]
    InvalidName(String),
}

impl ArrayType {
    /// Returns the SOMA object type name recorded for arrays of this type.
    pub fn soma_type(&self) -> &'static str {
        match self {
            ArrayType::Dense => "SOMADenseNDArray",
            ArrayType::Sparse => "SOMASparseNDArray",
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, ArrayType::Sparse)
    }
}

impl Display for ArrayType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.soma_type())
    }
}

impl FromStr for ArrayType {
    type Err = ArrayTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOMADenseNDArray" => Ok(ArrayType::Dense),
            "SOMASparseNDArray" => Ok(ArrayType::Sparse),
            _ => Err(ArrayTypeError::InvalidName(s.to_owned())),
        }
    }
}

#[cfg(feature = "proptest-strategies")]
impl Arbitrary for ArrayType {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![Just(ArrayType::Dense), Just(ArrayType::Sparse)].boxed()
    }
}

/// Order in which cells are returned from a read.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum ResultOrder {
    /// Let the array choose; both array types choose `RowMajor`.
    #[default]
    Auto,
    RowMajor,
    ColumnMajor,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ResultOrderError {
    #[error("Invalid result order: '{0}'")]
    InvalidName(String),
}

impl ResultOrder {
    /// Replaces `Auto` with `fallback`.
    pub fn or(self, fallback: ResultOrder) -> ResultOrder {
        match self {
            ResultOrder::Auto => fallback,
            other => other,
        }
    }
}

impl Display for ResultOrder {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            ResultOrder::Auto => write!(f, "auto"),
            ResultOrder::RowMajor => write!(f, "row-major"),
            ResultOrder::ColumnMajor => write!(f, "column-major"),
        }
    }
}

impl FromStr for ResultOrder {
    type Err = ResultOrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ResultOrder::Auto),
            "row-major" => Ok(ResultOrder::RowMajor),
            "column-major" => Ok(ResultOrder::ColumnMajor),
            _ => Err(ResultOrderError::InvalidName(s.to_owned())),
        }
    }
}

#[cfg(feature = "proptest-strategies")]
impl Arbitrary for ResultOrder {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            Just(ResultOrder::Auto),
            Just(ResultOrder::RowMajor),
            Just(ResultOrder::ColumnMajor)
        ]
        .boxed()
    }
}
