use std::path::PathBuf;

use arrow::error::ArrowError;
use soma_common::array::shape::ShapeError;
use soma_common::array::Mode;
use soma_common::datatype::Error as DatatypeError;
use soma_common::range::{DomainError, SelectorError};
use thiserror::Error;

/// Broad categories of failure.
///
/// Callers which only need to know *what kind* of mistake was made
/// (an unsupported type, a malformed argument, a violation of the
/// array's domain, or an unimplemented operation) match on this rather
/// than on [Error] itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// An element type or value type which arrays cannot hold.
    Type,
    /// A malformed argument: zero-length shapes, rank mismatches,
    /// inverted selectors, shrinking resizes.
    Value,
    /// A failure of the storage engine itself: domain violations,
    /// missing arrays, wrong open mode, I/O and format errors.
    Soma,
    /// An operation which arrays do not support.
    NotImplemented,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Datatype(#[from] DatatypeError),
    #[error("Element type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("Unsupported selector for dimension {dimension}: {reason}")]
    UnsupportedSelector { dimension: usize, reason: String },
    #[error("Invalid shape: {0}")]
    Shape(#[from] ShapeError),
    #[error("Invalid coordinates: {0}")]
    Selector(SelectorError),
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid value '{value}' for config key '{key}'")]
    InvalidConfig { key: String, value: String },
    #[error("Invalid URI '{0}': only local file URIs are supported")]
    InvalidUri(String),
    #[error("Array '{uri}' is opened in mode '{actual}' but {operation} requires mode '{required}'")]
    InvalidMode {
        uri: String,
        operation: &'static str,
        actual: Mode,
        required: Mode,
    },
    #[error("Array '{0}' is closed")]
    Closed(String),
    #[error("No SOMA array exists at '{0}'")]
    DoesNotExist(String),
    #[error("A SOMA array already exists at '{0}'")]
    AlreadyExists(String),
    #[error("Object at '{uri}' is a {found}, not a {expected}")]
    WrongArrayType {
        uri: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Array '{uri}' is not readable: {reason}")]
    Corrupt { uri: String, reason: String },
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Datatype(_)
            | Error::TypeMismatch { .. }
            | Error::UnsupportedSelector { .. } => ErrorKind::Type,
            Error::Arrow(ArrowError::CastError(_)) => ErrorKind::Type,
            Error::Shape(e) if e.is_domain_violation() => ErrorKind::Soma,
            Error::Shape(_)
            | Error::InvalidArgument(_)
            | Error::InvalidConfig { .. }
            | Error::InvalidUri(_) => ErrorKind::Value,
            Error::Selector(SelectorError::Domain(_)) => ErrorKind::Soma,
            Error::Selector(_) => ErrorKind::Value,
            Error::NotImplemented(_) => ErrorKind::NotImplemented,
            Error::Domain(_)
            | Error::InvalidMode { .. }
            | Error::Closed(_)
            | Error::DoesNotExist(_)
            | Error::AlreadyExists(_)
            | Error::WrongArrayType { .. }
            | Error::Corrupt { .. }
            | Error::MissingMetadata(_)
            | Error::Io { .. }
            | Error::Arrow(_)
            | Error::Serialization(_) => ErrorKind::Soma,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}

impl From<SelectorError> for Error {
    fn from(value: SelectorError) -> Self {
        match value {
            SelectorError::Domain(d) => Error::Domain(d),
            other => Error::Selector(other),
        }
    }
}
