use std::cmp::Ordering;
use std::iter::FusedIterator;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, UInt64Array};
use arrow::compute::kernels::aggregate::{max, min};
use arrow::compute::{
    can_cast_types, cast_with_options, concat_batches, filter_record_batch,
    lexsort_to_indices, take, CastOptions, SortColumn,
};
use arrow::datatypes::{DataType, Int64Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use log::debug;
use soma_common::array::{ArrayType, Mode, ResultOrder};
use soma_common::datatype::Datatype;
use soma_common::range::{
    resolve_selectors, DimSelector, DimensionRange, DomainError,
    NonEmptyDomain, ResolvedSelector,
};

use crate::array::{self, SomaArray};
use crate::context::{Context, ContextBound};
use crate::error::Error;
use crate::fragment::Fragment;
use crate::metadata::{domain_lower_key, domain_upper_key, Value};
use crate::schema::{dim_name, ArraySchema, DATA_FIELD};
use crate::Result as SomaResult;

/// A sparse N-dimensional array of one primitive element type.
///
/// Cells are written and read as Arrow record batches with one `Int64`
/// column per dimension, `soma_dim_0` onwards, and a `soma_data` column.
pub struct SparseNDArray {
    array: SomaArray,
}

impl Deref for SparseNDArray {
    type Target = SomaArray;
    fn deref(&self) -> &Self::Target {
        &self.array
    }
}

impl DerefMut for SparseNDArray {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.array
    }
}

impl ContextBound for SparseNDArray {
    fn context(&self) -> &Context {
        self.array.context()
    }
}

fn unchecked_cast() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        ..Default::default()
    }
}

impl SparseNDArray {
    pub const SOMA_TYPE: &'static str = "SOMASparseNDArray";

    /// Creates a new sparse array and returns it open for writing.
    ///
    /// A dimension without a `maxshape` may later grow to
    /// [MAXSHAPE_SENTINEL](soma_common::array::shape::MAXSHAPE_SENTINEL).
    pub fn create(
        ctx: &Context,
        uri: &str,
        element_type: &DataType,
        shape: &[i64],
        maxshape: Option<&[Option<i64>]>,
    ) -> SomaResult<Self> {
        let datatype = Datatype::try_from(element_type)?;
        let schema =
            ArraySchema::new(ArrayType::Sparse, datatype, shape, maxshape)?;
        Ok(SparseNDArray {
            array: SomaArray::create(ctx, uri, schema)?,
        })
    }

    pub fn open(ctx: &Context, uri: &str, mode: Mode) -> SomaResult<Self> {
        Ok(SparseNDArray {
            array: SomaArray::open(ctx, uri, mode, ArrayType::Sparse, None)?,
        })
    }

    /// Opens the array as of `timestamp`, in milliseconds since the epoch.
    pub fn open_at(
        ctx: &Context,
        uri: &str,
        mode: Mode,
        timestamp: u64,
    ) -> SomaResult<Self> {
        Ok(SparseNDArray {
            array: SomaArray::open(
                ctx,
                uri,
                mode,
                ArrayType::Sparse,
                Some(timestamp),
            )?,
        })
    }

    pub fn exists(ctx: &Context, uri: &str) -> SomaResult<bool> {
        Ok(array::object_type(ctx, uri)? == Some(ArrayType::Sparse))
    }

    pub fn delete(ctx: &Context, uri: &str) -> SomaResult<()> {
        array::delete(ctx, uri)
    }

    pub fn close(&mut self) -> SomaResult<()> {
        self.array.close()
    }

    /// Writes the cells in `batch`.
    ///
    /// Coordinate columns may be of any integer type. Every coordinate must
    /// lie within the current shape; otherwise nothing is written.
    pub fn write(&mut self, batch: &RecordBatch) -> SomaResult<()> {
        self.check_mode("write", Mode::Write)?;
        let batch = self.conform(batch)?;
        if batch.num_rows() == 0 {
            return Ok(());
        }

        let shape = self.shape();
        let mut mbr = Vec::with_capacity(shape.len());
        for (dimension, extent) in shape.iter().enumerate() {
            let coords = batch.column(dimension).as_primitive::<Int64Type>();
            let (Some(lower), Some(upper)) = (min(coords), max(coords)) else {
                return Err(Error::InvalidArgument(format!(
                    "Column '{}' has no values",
                    dim_name(dimension)
                )));
            };
            for coordinate in [lower, upper] {
                if !(0..*extent).contains(&coordinate) {
                    return Err(DomainError::OutOfBounds {
                        dimension,
                        coordinate,
                        extent: *extent,
                    }
                    .into());
                }
            }
            mbr.push(DimensionRange::new(lower, upper));
        }

        let batch = if self.context().sort_coords()? {
            sort_batch(&batch, self.ndim(), ResultOrder::RowMajor)?
        } else {
            batch
        };

        let fragment = Fragment::write(
            self.path(),
            &batch,
            self.write_timestamp(),
            &NonEmptyDomain::from(mbr.clone()),
            None,
        )?;
        debug!(
            "Wrote {} cells to sparse array '{}' in fragment {}",
            batch.num_rows(),
            self.uri(),
            fragment.path.display()
        );

        self.update_bounding_box(&mbr)?;

        if self.context().consolidate_and_vacuum()? {
            self.consolidate()?;
        }
        Ok(())
    }

    /// Reads the cells selected by `coords`.
    ///
    /// A coordinate written more than once reads as its most recent value.
    /// Cells are sorted by coordinate: by the first dimension first for
    /// row-major order, by the last dimension first for column-major.
    pub fn read(
        &self,
        coords: &[DimSelector],
        result_order: ResultOrder,
    ) -> SomaResult<RecordBatch> {
        self.check_mode("read", Mode::Read)?;
        let selectors = resolve_selectors(coords, &self.shape())?;
        let order = self.context().result_order(result_order)?;
        self.query(&selectors, order)
    }

    /// Reads the cells selected by `coords` as a sequence of record
    /// batches of at most `soma.read.batch_size` cells each.
    ///
    /// The cells are the same, in the same order, as those of
    /// [read](Self::read). Selector errors are reported here rather than
    /// by the returned reader.
    pub fn read_batches(
        &self,
        coords: &[DimSelector],
        result_order: ResultOrder,
    ) -> SomaResult<SparseReader<'_>> {
        self.check_mode("read_batches", Mode::Read)?;
        Ok(SparseReader {
            array: self,
            selectors: resolve_selectors(coords, &self.shape())?,
            order: self.context().result_order(result_order)?,
            batch_size: self.context().read_batch_size()?,
            cells: None,
            offset: 0,
            done: false,
        })
    }

    /// Returns the number of distinct cells stored in the array.
    pub fn nnz(&self) -> SomaResult<u64> {
        self.check_open()?;
        let selectors = resolve_selectors(&[], &self.shape())?;
        Ok(self.query(&selectors, ResultOrder::RowMajor)?.num_rows() as u64)
    }

    /// Returns the inclusive bounds of every coordinate ever written, as
    /// recorded by writes.
    pub fn used_shape(&self) -> SomaResult<Vec<(i64, i64)>> {
        self.check_open()?;
        let bounding_box = (0..self.ndim())
            .map(|i| {
                let lower = self.metadata_i64(&domain_lower_key(i))?;
                let upper = self.metadata_i64(&domain_upper_key(i))?;
                Ok(DimensionRange::new(lower.min(upper), upper))
            })
            .collect::<SomaResult<NonEmptyDomain>>()?;

        if self.fragments()?.is_empty() {
            return Ok(bounding_box.as_tuples());
        }
        Ok(bounding_box.union(&self.non_empty_domain()?).as_tuples())
    }

    /// Merges all fragments into one, keeping the newest value of each
    /// cell, and removes the merged fragments.
    pub fn consolidate(&mut self) -> SomaResult<()> {
        self.check_mode("consolidate", Mode::Write)?;
        let fragments = self.fragments()?;
        if fragments.len() < 2 {
            return Ok(());
        }

        let selectors = resolve_selectors(&[], &self.shape())?;
        let cells = self.query(&selectors, ResultOrder::RowMajor)?;
        let mbr = fragments
            .iter()
            .map(|f| f.mbr.clone())
            .reduce(|l, r| l.union(&r))
            .unwrap_or_else(|| NonEmptyDomain::empty(self.ndim()));
        let timestamp = fragments
            .iter()
            .map(|f| f.timestamp)
            .max()
            .unwrap_or_else(|| self.write_timestamp());

        Fragment::write(self.path(), &cells, timestamp, &mbr, None)?;
        for f in fragments.iter() {
            f.remove()?;
        }
        debug!(
            "Consolidated {} fragments of '{}' into {} cells",
            fragments.len(),
            self.uri(),
            cells.num_rows()
        );
        Ok(())
    }

    /// Checks the columns of `batch` and casts them to the array schema.
    fn conform(&self, batch: &RecordBatch) -> SomaResult<RecordBatch> {
        let schema = self.schema();
        for field in batch.schema().fields() {
            if schema.field_with_name(field.name()).is_err() {
                return Err(Error::InvalidArgument(format!(
                    "Unknown column '{}'",
                    field.name()
                )));
            }
        }

        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                let column =
                    batch.column_by_name(field.name()).ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "Missing column '{}'",
                            field.name()
                        ))
                    })?;
                if column.null_count() > 0 {
                    return Err(Error::InvalidArgument(format!(
                        "Column '{}' has null values",
                        field.name()
                    )));
                }
                let is_dimension = field.name() != DATA_FIELD;
                if (is_dimension && !column.data_type().is_integer())
                    || !can_cast_types(column.data_type(), field.data_type())
                {
                    return Err(Error::TypeMismatch {
                        expected: field.data_type().to_string(),
                        found: column.data_type().to_string(),
                    });
                }
                Ok(cast_with_options(
                    column,
                    field.data_type(),
                    &unchecked_cast(),
                )?)
            })
            .collect::<SomaResult<Vec<_>>>()?;

        Ok(RecordBatch::try_new(schema, columns)?)
    }

    fn update_bounding_box(&mut self, mbr: &[DimensionRange]) -> SomaResult<()> {
        for (i, range) in mbr.iter().enumerate() {
            let metadata = self.metadata_mut();
            let lower_key = domain_lower_key(i);
            if metadata.get(&lower_key).is_none() {
                metadata.set(&lower_key, Value::Int64(0));
            }
            let upper_key = domain_upper_key(i);
            let upper = metadata
                .get(&upper_key)
                .and_then(Value::as_i64)
                .map_or(range.upper, |u| u.max(range.upper));
            metadata.set(&upper_key, Value::Int64(upper));
        }
        Ok(())
    }

    fn metadata_i64(&self, key: &str) -> SomaResult<i64> {
        self.metadata_get(key)?
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::MissingMetadata(key.to_owned()))
    }

    /// Collects the selected cells of every visible fragment, keeps the
    /// newest value of each coordinate, and sorts them in `order`.
    fn query(
        &self,
        selectors: &[ResolvedSelector],
        order: ResultOrder,
    ) -> SomaResult<RecordBatch> {
        let schema = self.schema();
        let ndim = self.ndim();
        let Some(bounds) = selectors
            .iter()
            .map(ResolvedSelector::bounds)
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(RecordBatch::new_empty(schema));
        };

        let mut batches = vec![];
        for fragment in self.fragments()? {
            let overlaps = fragment
                .mbr
                .iter()
                .zip(bounds.iter())
                .all(|(m, b)| m.intersection(b).is_some());
            if !overlaps {
                continue;
            }
            let batch = fragment.read()?;
            let batch = RecordBatch::try_new(
                schema.clone(),
                batch.columns().to_vec(),
            )?;
            let mask = selection_mask(&batch, selectors, &fragment)?;
            batches.push(filter_record_batch(&batch, &mask)?);
        }

        // later fragments hold later writes
        let cells = concat_batches(&schema, &batches)?;
        let coords = coordinate_columns(&cells, ndim)?;
        let mut rows = (0..cells.num_rows()).collect::<Vec<_>>();
        rows.sort_by(|l, r| {
            compare_cells(&coords, *l, *r, order).then_with(|| r.cmp(l))
        });
        rows.dedup_by(|a, b| {
            compare_cells(&coords, *a, *b, order) == Ordering::Equal
        });

        let indices =
            UInt64Array::from_iter_values(rows.into_iter().map(|r| r as u64));
        take_batch(&cells, &indices, schema)
    }
}

/// The result of [SparseNDArray::read_batches].
pub struct SparseReader<'array> {
    array: &'array SparseNDArray,
    selectors: Vec<ResolvedSelector>,
    order: ResultOrder,
    batch_size: usize,
    cells: Option<RecordBatch>,
    offset: usize,
    done: bool,
}

impl ContextBound for SparseReader<'_> {
    fn context(&self) -> &Context {
        self.array.context()
    }
}

impl SparseReader<'_> {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The order of the cells, with `Auto` resolved.
    pub fn result_order(&self) -> ResultOrder {
        self.order
    }

    fn next_batch(&mut self) -> SomaResult<Option<RecordBatch>> {
        if self.cells.is_none() {
            self.cells = Some(self.array.query(&self.selectors, self.order)?);
        }
        let Some(cells) = self.cells.as_ref() else {
            return Ok(None);
        };
        if self.offset >= cells.num_rows() {
            return Ok(None);
        }
        let len = self.batch_size.min(cells.num_rows() - self.offset);
        let batch = cells.slice(self.offset, len);
        self.offset += len;
        Ok(Some(batch))
    }
}

impl Iterator for SparseReader<'_> {
    type Item = SomaResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                self.cells = None;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for SparseReader<'_> {}

fn coordinate_columns(
    batch: &RecordBatch,
    ndim: usize,
) -> SomaResult<Vec<&[i64]>> {
    (0..ndim)
        .map(|i| {
            batch
                .column(i)
                .as_primitive_opt::<Int64Type>()
                .map(|a| &a.values()[..])
                .ok_or_else(|| Error::TypeMismatch {
                    expected: DataType::Int64.to_string(),
                    found: batch.column(i).data_type().to_string(),
                })
        })
        .collect()
}

fn compare_cells(
    coords: &[&[i64]],
    l: usize,
    r: usize,
    order: ResultOrder,
) -> Ordering {
    let cmp = |dim: &&[i64]| dim[l].cmp(&dim[r]);
    match order {
        ResultOrder::ColumnMajor => coords
            .iter()
            .rev()
            .map(cmp)
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal),
        _ => coords
            .iter()
            .map(cmp)
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal),
    }
}

fn selection_mask(
    batch: &RecordBatch,
    selectors: &[ResolvedSelector],
    fragment: &Fragment,
) -> SomaResult<BooleanArray> {
    let coords =
        coordinate_columns(batch, selectors.len()).map_err(|e| Error::Corrupt {
            uri: fragment.path.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok((0..batch.num_rows())
        .map(|row| {
            Some(
                selectors
                    .iter()
                    .zip(coords.iter())
                    .all(|(s, c)| s.contains(c[row])),
            )
        })
        .collect())
}

fn take_batch(
    batch: &RecordBatch,
    indices: &UInt64Array,
    schema: SchemaRef,
) -> SomaResult<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .map(|c| take(c.as_ref(), indices, None))
        .collect::<Result<Vec<ArrayRef>, _>>()?;
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Sorts the cells of `batch` by their coordinates.
fn sort_batch(
    batch: &RecordBatch,
    ndim: usize,
    order: ResultOrder,
) -> SomaResult<RecordBatch> {
    let mut dims = (0..ndim).collect::<Vec<_>>();
    if order == ResultOrder::ColumnMajor {
        dims.reverse();
    }
    let columns = dims
        .into_iter()
        .map(|i| SortColumn {
            values: Arc::clone(batch.column(i)),
            options: None,
        })
        .collect::<Vec<_>>();
    let indices = lexsort_to_indices(&columns, None)?;
    let indices =
        UInt64Array::from_iter_values(indices.values().iter().map(|i| *i as u64));
    take_batch(batch, &indices, batch.schema())
}

#[cfg(test)]
mod tests {
    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{Field, Schema};

    use super::*;

    fn cells(d0: Vec<i64>, d1: Vec<i64>, data: Vec<f64>) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("soma_dim_0", DataType::Int64, false),
            Field::new("soma_dim_1", DataType::Int64, false),
            Field::new("soma_data", DataType::Float64, false),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(d0)),
                Arc::new(Int64Array::from(d1)),
                Arc::new(Float64Array::from(data)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn sort_orders() -> SomaResult<()> {
        let batch = cells(
            vec![1, 0, 1, 0],
            vec![0, 1, 1, 0],
            vec![10.0, 1.0, 11.0, 0.0],
        );

        let row = sort_batch(&batch, 2, ResultOrder::RowMajor)?;
        assert_eq!(
            &Float64Array::from(vec![0.0, 1.0, 10.0, 11.0]),
            row.column(2).as_primitive::<arrow::datatypes::Float64Type>()
        );

        let col = sort_batch(&batch, 2, ResultOrder::ColumnMajor)?;
        assert_eq!(
            &Float64Array::from(vec![0.0, 10.0, 1.0, 11.0]),
            col.column(2).as_primitive::<arrow::datatypes::Float64Type>()
        );
        Ok(())
    }

    #[test]
    fn cell_comparison() {
        let d0 = [0i64, 0, 1];
        let d1 = [5i64, 7, 5];
        let coords = [&d0[..], &d1[..]];
        assert_eq!(
            Ordering::Less,
            compare_cells(&coords, 0, 1, ResultOrder::RowMajor)
        );
        assert_eq!(
            Ordering::Greater,
            compare_cells(&coords, 1, 2, ResultOrder::ColumnMajor)
        );
        assert_eq!(
            Ordering::Less,
            compare_cells(&coords, 1, 2, ResultOrder::RowMajor)
        );
        assert_eq!(
            Ordering::Equal,
            compare_cells(&coords, 2, 2, ResultOrder::RowMajor)
        );
    }
}
