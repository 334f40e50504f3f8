//! Doubly-inclusive coordinate ranges and per-dimension selectors.
//!
//! All ranges in this module include both of their bounds: the range
//! `DimensionRange::new(2, 4)` addresses coordinates 2, 3 and 4.

use std::ops::{Deref, RangeFrom, RangeFull, RangeInclusive, RangeToInclusive};

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DomainError {
    #[error("Coordinate {coordinate} of dimension {dimension} is outside the domain [0, {extent})")]
    OutOfBounds {
        dimension: usize,
        coordinate: i64,
        extent: i64,
    },
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SelectorError {
    #[error("Selector for dimension {dimension} has start {start} greater than end {end}")]
    Inverted { dimension: usize, start: i64, end: i64 },
    #[error("Range [{start}, {end}] of dimension {dimension} does not overlap [0, {extent})")]
    NoOverlap {
        dimension: usize,
        start: i64,
        end: i64,
        extent: i64,
    },
    #[error("Too many selectors: {actual} given for an array of {expected} dimensions")]
    TooManySelectors { expected: usize, actual: usize },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// A range of coordinates including both `lower` and `upper`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct DimensionRange {
    pub lower: i64,
    pub upper: i64,
}

impl DimensionRange {
    /// # Panics
    ///
    /// Panics if `lower > upper`.
    pub fn new(lower: i64, upper: i64) -> Self {
        assert!(lower <= upper, "inverted range [{lower}, {upper}]");
        DimensionRange { lower, upper }
    }

    /// Returns the range of a single coordinate.
    pub fn point(coordinate: i64) -> Self {
        DimensionRange {
            lower: coordinate,
            upper: coordinate,
        }
    }

    /// Returns the number of coordinates in the range.
    /// ```
    /// use soma_common::range::DimensionRange;
    /// assert_eq!(1, DimensionRange::new(3, 3).num_cells());
    /// assert_eq!(6, DimensionRange::new(0, 5).num_cells());
    /// ```
    pub fn num_cells(&self) -> u64 {
        (self.upper - self.lower) as u64 + 1
    }

    pub fn contains(&self, coordinate: i64) -> bool {
        self.lower <= coordinate && coordinate <= self.upper
    }

    /// Returns the smallest range covering both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        DimensionRange {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Returns the coordinates in both `self` and `other`, if any.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        (lower <= upper).then_some(DimensionRange { lower, upper })
    }

    pub fn as_tuple(&self) -> (i64, i64) {
        (self.lower, self.upper)
    }

    pub fn iter(&self) -> RangeInclusive<i64> {
        self.lower..=self.upper
    }
}

impl From<(i64, i64)> for DimensionRange {
    fn from(value: (i64, i64)) -> Self {
        DimensionRange::new(value.0, value.1)
    }
}

/// The smallest box, per dimension, containing every written coordinate.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct NonEmptyDomain(Vec<DimensionRange>);

impl NonEmptyDomain {
    /// The domain reported by an array with no data: `(0, 0)` for every
    /// dimension.
    pub fn empty(ndim: usize) -> Self {
        NonEmptyDomain(vec![DimensionRange::point(0); ndim])
    }

    /// Returns the domain covering both `self` and `other`.
    ///
    /// # Panics
    ///
    /// Panics if the two domains have different numbers of dimensions.
    pub fn union(&self, other: &Self) -> Self {
        assert_eq!(self.0.len(), other.0.len());
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(l, r)| l.union(r))
            .collect()
    }

    pub fn as_tuples(&self) -> Vec<(i64, i64)> {
        self.0.iter().map(DimensionRange::as_tuple).collect()
    }
}

impl Deref for NonEmptyDomain {
    type Target = Vec<DimensionRange>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<DimensionRange>> for NonEmptyDomain {
    fn from(value: Vec<DimensionRange>) -> Self {
        NonEmptyDomain(value)
    }
}

impl FromIterator<DimensionRange> for NonEmptyDomain {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = DimensionRange>,
    {
        NonEmptyDomain(iter.into_iter().collect())
    }
}

/// Chooses which coordinates of one dimension take part in a read or write.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum DimSelector {
    /// Every coordinate of the dimension's current shape.
    #[default]
    All,
    /// One coordinate.
    Point(i64),
    /// A doubly-inclusive range. A missing bound extends to the edge of
    /// the current shape, and a bound past the edge is clamped to it.
    Range { start: Option<i64>, end: Option<i64> },
    /// An explicit set of coordinates.
    Points(Vec<i64>),
}

impl From<i64> for DimSelector {
    fn from(value: i64) -> Self {
        DimSelector::Point(value)
    }
}

impl From<RangeInclusive<i64>> for DimSelector {
    fn from(value: RangeInclusive<i64>) -> Self {
        DimSelector::Range {
            start: Some(*value.start()),
            end: Some(*value.end()),
        }
    }
}

impl From<RangeFrom<i64>> for DimSelector {
    fn from(value: RangeFrom<i64>) -> Self {
        DimSelector::Range {
            start: Some(value.start),
            end: None,
        }
    }
}

impl From<RangeToInclusive<i64>> for DimSelector {
    fn from(value: RangeToInclusive<i64>) -> Self {
        DimSelector::Range {
            start: None,
            end: Some(value.end),
        }
    }
}

impl From<RangeFull> for DimSelector {
    fn from(_: RangeFull) -> Self {
        DimSelector::All
    }
}

impl From<Vec<i64>> for DimSelector {
    fn from(value: Vec<i64>) -> Self {
        DimSelector::Points(value)
    }
}

/// A selector checked against the shape of its dimension.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResolvedSelector {
    Range(DimensionRange),
    /// Sorted and without duplicates.
    Points(Vec<i64>),
}

impl ResolvedSelector {
    pub fn contains(&self, coordinate: i64) -> bool {
        match self {
            ResolvedSelector::Range(r) => r.contains(coordinate),
            ResolvedSelector::Points(p) => p.binary_search(&coordinate).is_ok(),
        }
    }

    /// Returns the smallest range containing every selected coordinate,
    /// or `None` if nothing is selected.
    pub fn bounds(&self) -> Option<DimensionRange> {
        match self {
            ResolvedSelector::Range(r) => Some(*r),
            ResolvedSelector::Points(p) => match (p.first(), p.last()) {
                (Some(l), Some(u)) => Some(DimensionRange::new(*l, *u)),
                _ => None,
            },
        }
    }

    pub fn as_range(&self) -> Option<DimensionRange> {
        match self {
            ResolvedSelector::Range(r) => Some(*r),
            ResolvedSelector::Points(_) => None,
        }
    }
}

impl DimSelector {
    /// Checks this selector against a dimension of extent `extent`, i.e.
    /// with valid coordinates `[0, extent)`.
    pub fn resolve(
        &self,
        dimension: usize,
        extent: i64,
    ) -> Result<ResolvedSelector, SelectorError> {
        let check = |coordinate: i64| {
            if (0..extent).contains(&coordinate) {
                Ok(coordinate)
            } else {
                Err(DomainError::OutOfBounds {
                    dimension,
                    coordinate,
                    extent,
                })
            }
        };

        Ok(match self {
            DimSelector::All => {
                ResolvedSelector::Range(DimensionRange::new(0, extent - 1))
            }
            DimSelector::Point(p) => {
                ResolvedSelector::Range(DimensionRange::point(check(*p)?))
            }
            DimSelector::Range { start, end } => {
                if let (Some(s), Some(e)) = (start, end) {
                    if s > e {
                        return Err(SelectorError::Inverted {
                            dimension,
                            start: *s,
                            end: *e,
                        });
                    }
                }
                // range bounds are clamped to the shape, points are not
                let lower = start.map_or(0, |s| s.max(0));
                let upper = end.map_or(extent - 1, |e| e.min(extent - 1));
                if lower > upper {
                    return Err(SelectorError::NoOverlap {
                        dimension,
                        start: start.unwrap_or(0),
                        end: end.unwrap_or(extent - 1),
                        extent,
                    });
                }
                ResolvedSelector::Range(DimensionRange::new(lower, upper))
            }
            DimSelector::Points(points) => {
                let mut points = points
                    .iter()
                    .map(|p| check(*p))
                    .collect::<Result<Vec<_>, _>>()?;
                points.sort_unstable();
                points.dedup();
                ResolvedSelector::Points(points)
            }
        })
    }
}

/// Resolves one selector per dimension of `shape`. Dimensions without a
/// selector select everything.
pub fn resolve_selectors(
    selectors: &[DimSelector],
    shape: &[i64],
) -> Result<Vec<ResolvedSelector>, SelectorError> {
    if selectors.len() > shape.len() {
        return Err(SelectorError::TooManySelectors {
            expected: shape.len(),
            actual: selectors.len(),
        });
    }
    shape
        .iter()
        .enumerate()
        .map(|(dimension, extent)| {
            selectors
                .get(dimension)
                .unwrap_or(&DimSelector::All)
                .resolve(dimension, *extent)
        })
        .collect()
}
