//! Validation of the `shape` and `maxshape` of an NDArray.
//!
//! `shape` is the current logical extent of each dimension and bounds every
//! read and write. `maxshape` is the upper bound each dimension may later be
//! resized to.

use thiserror::Error;

/// The `maxshape` given to a dimension whose bound was left unspecified.
///
/// This is `2^31 - 2`: the largest extent whose highest coordinate stays
/// representable as a signed 32-bit integer with one slot to spare.
pub const MAXSHAPE_SENTINEL: i64 = (1 << 31) - 2;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ShapeError {
    #[error("NDArray shape must have at least one dimension")]
    Empty,
    #[error("NDArray shape must be a non-zero-length tuple of positive ints: dimension {dimension} has extent {extent}")]
    NonPositiveExtent { dimension: usize, extent: i64 },
    #[error("{what} has {actual} dimensions but the array shape has {expected}")]
    RankMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("maxshape {maxshape} of dimension {dimension} is smaller than its shape {shape}")]
    MaxShapeTooSmall {
        dimension: usize,
        shape: i64,
        maxshape: i64,
    },
    #[error("Cannot shrink dimension {dimension} from {current} to {requested}")]
    Shrink {
        dimension: usize,
        current: i64,
        requested: i64,
    },
    #[error("Cannot resize dimension {dimension} to {requested}: exceeds maxshape {maxshape}")]
    ExceedsMaxShape {
        dimension: usize,
        requested: i64,
        maxshape: i64,
    },
}

impl ShapeError {
    /// Returns whether this error is a violation of the bounds of the
    /// array's domain, as opposed to a malformed argument.
    pub fn is_domain_violation(&self) -> bool {
        matches!(self, ShapeError::MaxShapeTooSmall { .. })
    }
}

/// Checks that `shape` has at least one dimension and that every extent is
/// strictly positive.
pub fn validate_shape(shape: &[i64]) -> Result<(), ShapeError> {
    if shape.is_empty() {
        return Err(ShapeError::Empty);
    }
    if let Some((dimension, extent)) =
        shape.iter().enumerate().find(|(_, e)| **e <= 0)
    {
        return Err(ShapeError::NonPositiveExtent {
            dimension,
            extent: *extent,
        });
    }
    Ok(())
}

/// Computes the effective `maxshape` for a validated `shape`.
///
/// An absent `maxshape`, or an absent bound for one dimension, becomes
/// [MAXSHAPE_SENTINEL]. A `maxshape` of the wrong rank is a malformed
/// argument, while a bound below the shape is a domain violation.
pub fn resolve_maxshape(
    shape: &[i64],
    maxshape: Option<&[Option<i64>]>,
) -> Result<Vec<i64>, ShapeError> {
    validate_shape(shape)?;

    let Some(maxshape) = maxshape else {
        return Ok(shape.iter().map(|s| MAXSHAPE_SENTINEL.max(*s)).collect());
    };
    if maxshape.len() != shape.len() {
        return Err(ShapeError::RankMismatch {
            what: "maxshape",
            expected: shape.len(),
            actual: maxshape.len(),
        });
    }

    shape
        .iter()
        .zip(maxshape.iter())
        .enumerate()
        .map(|(dimension, (s, m))| match m {
            None => Ok(MAXSHAPE_SENTINEL.max(*s)),
            Some(m) if m < s => Err(ShapeError::MaxShapeTooSmall {
                dimension,
                shape: *s,
                maxshape: *m,
            }),
            Some(m) => Ok(*m),
        })
        .collect()
}

/// Checks that the array can grow from `current` to `requested` without
/// shrinking any dimension or exceeding `maxshape`.
pub fn validate_resize(
    current: &[i64],
    maxshape: &[i64],
    requested: &[i64],
) -> Result<(), ShapeError> {
    if requested.len() != current.len() {
        return Err(ShapeError::RankMismatch {
            what: "new shape",
            expected: current.len(),
            actual: requested.len(),
        });
    }
    for (dimension, ((c, m), r)) in current
        .iter()
        .zip(maxshape.iter())
        .zip(requested.iter())
        .enumerate()
    {
        if r < c {
            return Err(ShapeError::Shrink {
                dimension,
                current: *c,
                requested: *r,
            });
        }
        if r > m {
            return Err(ShapeError::ExceedsMaxShape {
                dimension,
                requested: *r,
                maxshape: *m,
            });
        }
    }
    Ok(())
}
