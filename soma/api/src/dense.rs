use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array};
use arrow::compute::kernels::interleave::interleave;
use arrow::compute::{can_cast_types, cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use log::debug;
use ndarray::ArrayD;
use soma_common::array::shape::ShapeError;
use soma_common::array::{ArrayType, Mode, ResultOrder};
use soma_common::datatype::Datatype;
use soma_common::range::{
    resolve_selectors, DimSelector, DimensionRange, NonEmptyDomain,
};

use crate::array::{self, SomaArray};
use crate::context::{Context, ContextBound};
use crate::error::Error;
use crate::fragment::Fragment;
use crate::schema::{ArraySchema, DATA_FIELD};
use crate::tensor::{row_major_strides, Tensor, TensorElement};
use crate::Result as SomaResult;

/// A dense N-dimensional array of one primitive element type.
///
/// Every cell in `[0, shape)` has a value; cells which were never written
/// read as zero.
pub struct DenseNDArray {
    array: SomaArray,
}

impl Deref for DenseNDArray {
    type Target = SomaArray;
    fn deref(&self) -> &Self::Target {
        &self.array
    }
}

impl DerefMut for DenseNDArray {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.array
    }
}

impl ContextBound for DenseNDArray {
    fn context(&self) -> &Context {
        self.array.context()
    }
}

impl DenseNDArray {
    pub const SOMA_TYPE: &'static str = "SOMADenseNDArray";

    /// Creates a new dense array and returns it open for writing.
    ///
    /// Nothing is created if `element_type`, `shape` or `maxshape` is
    /// invalid.
    pub fn create(
        ctx: &Context,
        uri: &str,
        element_type: &DataType,
        shape: &[i64],
        maxshape: Option<&[Option<i64>]>,
    ) -> SomaResult<Self> {
        let datatype = Datatype::try_from(element_type)?;
        let schema =
            ArraySchema::new(ArrayType::Dense, datatype, shape, maxshape)?;
        Ok(DenseNDArray {
            array: SomaArray::create(ctx, uri, schema)?,
        })
    }

    pub fn open(ctx: &Context, uri: &str, mode: Mode) -> SomaResult<Self> {
        Ok(DenseNDArray {
            array: SomaArray::open(ctx, uri, mode, ArrayType::Dense, None)?,
        })
    }

    /// Opens the array as of `timestamp`, in milliseconds since the epoch.
    pub fn open_at(
        ctx: &Context,
        uri: &str,
        mode: Mode,
        timestamp: u64,
    ) -> SomaResult<Self> {
        Ok(DenseNDArray {
            array: SomaArray::open(
                ctx,
                uri,
                mode,
                ArrayType::Dense,
                Some(timestamp),
            )?,
        })
    }

    /// Returns whether a dense array exists at `uri`.
    pub fn exists(ctx: &Context, uri: &str) -> SomaResult<bool> {
        Ok(array::object_type(ctx, uri)? == Some(ArrayType::Dense))
    }

    pub fn delete(ctx: &Context, uri: &str) -> SomaResult<()> {
        array::delete(ctx, uri)
    }

    /// Writes `tensor` to the region selected by `coords`.
    ///
    /// Each selector must be a point or a range, and the shape of
    /// `tensor` must equal the extents of the region.
    pub fn write_tensor(
        &mut self,
        coords: &[DimSelector],
        tensor: &Tensor,
    ) -> SomaResult<()> {
        self.check_mode("write_tensor", Mode::Write)?;
        if tensor.ndim() != self.ndim() {
            return Err(ShapeError::RankMismatch {
                what: "tensor",
                expected: self.ndim(),
                actual: tensor.ndim(),
            }
            .into());
        }

        let region = self.resolve_region(coords)?;
        let extents = region
            .iter()
            .map(|r| r.num_cells() as usize)
            .collect::<Vec<_>>();
        if extents != tensor.shape() {
            return Err(Error::InvalidArgument(format!(
                "Tensor of shape {:?} does not fit region {:?}",
                tensor.shape(),
                region.iter().map(DimensionRange::as_tuple).collect::<Vec<_>>()
            )));
        }

        let values = self.cast_values(tensor.values())?;
        let schema = Schema::new(vec![Field::new(
            DATA_FIELD,
            values.data_type().clone(),
            false,
        )]);
        let batch = RecordBatch::try_new(Arc::new(schema), vec![values])?;

        let fragment = Fragment::write(
            self.path(),
            &batch,
            self.write_timestamp(),
            &NonEmptyDomain::from(region.clone()),
            Some(&region),
        )?;
        debug!(
            "Wrote {} cells to dense array '{}' in fragment {}",
            tensor.len(),
            self.uri(),
            fragment.path.display()
        );
        Ok(())
    }

    /// Reads the region selected by `coords`.
    ///
    /// A row-major read returns a tensor whose shape is the extents of the
    /// region. A column-major read returns its transpose, with the axes in
    /// reverse order.
    pub fn read_tensor(
        &self,
        coords: &[DimSelector],
        result_order: ResultOrder,
    ) -> SomaResult<Tensor> {
        self.check_mode("read_tensor", Mode::Read)?;
        let region = self.resolve_region(coords)?;
        let shape = region
            .iter()
            .map(|r| r.num_cells() as usize)
            .collect::<Vec<_>>();
        let strides = row_major_strides(&shape);

        // every cell starts out pointing at the fill value
        let mut arrays: Vec<ArrayRef> = vec![self.fill_value()?];
        let mut sources = vec![(0usize, 0usize); shape.iter().product()];

        for fragment in self.fragments()? {
            let Some(subarray) = fragment.subarray.as_ref() else {
                continue;
            };
            let Some(overlap) = subarray
                .iter()
                .zip(region.iter())
                .map(|(s, r)| s.intersection(r))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };

            let batch = fragment.read()?;
            let values = batch
                .column_by_name(DATA_FIELD)
                .ok_or_else(|| Error::Corrupt {
                    uri: fragment.path.display().to_string(),
                    reason: format!("fragment has no '{DATA_FIELD}' column"),
                })?
                .clone();
            let fragment_shape = subarray
                .iter()
                .map(|r| r.num_cells() as usize)
                .collect::<Vec<_>>();
            let fragment_strides = row_major_strides(&fragment_shape);

            let source = arrays.len();
            arrays.push(values);
            for cell in overlap.iter().map(|r| r.iter()).multi_cartesian_product()
            {
                let dst = offset(&cell, &region, &strides);
                let src = offset(&cell, subarray, &fragment_strides);
                sources[dst] = (source, src);
            }
        }

        let arrays = arrays.iter().map(|a| a.as_ref()).collect::<Vec<_>>();
        let values = interleave(&arrays, &sources)?;
        let tensor = Tensor::try_new(shape, values)?;

        match self.context().result_order(result_order)? {
            ResultOrder::ColumnMajor => tensor.transpose(),
            _ => Ok(tensor),
        }
    }

    /// Reads the region selected by `coords` into an `ndarray` in row-major
    /// order.
    pub fn read_ndarray<T>(&self, coords: &[DimSelector]) -> SomaResult<ArrayD<T>>
    where
        T: TensorElement,
    {
        self.read_tensor(coords, ResultOrder::RowMajor)?.to_ndarray()
    }

    /// Changing the shape of a dense array is not supported.
    pub fn reshape(&mut self, _shape: &[i64]) -> SomaResult<()> {
        Err(Error::NotImplemented("reshape"))
    }

    pub fn close(&mut self) -> SomaResult<()> {
        self.array.close()
    }

    fn resolve_region(
        &self,
        coords: &[DimSelector],
    ) -> SomaResult<Vec<DimensionRange>> {
        if let Some(dimension) =
            coords.iter().position(|c| matches!(c, DimSelector::Points(_)))
        {
            return Err(Error::UnsupportedSelector {
                dimension,
                reason: "dense arrays are addressed by points and ranges only"
                    .to_owned(),
            });
        }
        resolve_selectors(coords, &self.shape())?
            .into_iter()
            .enumerate()
            .map(|(dimension, selector)| {
                selector.as_range().ok_or_else(|| Error::UnsupportedSelector {
                    dimension,
                    reason: "not a range".to_owned(),
                })
            })
            .collect()
    }

    /// Converts `values` to the element type of this array.
    fn cast_values(&self, values: &ArrayRef) -> SomaResult<ArrayRef> {
        let target = self.datatype().arrow_type();
        if !can_cast_types(values.data_type(), &target) {
            return Err(Error::TypeMismatch {
                expected: target.to_string(),
                found: values.data_type().to_string(),
            });
        }
        if values.null_count() > 0 {
            return Err(Error::InvalidArgument(
                "Dense arrays cannot hold null values".to_owned(),
            ));
        }
        let options = CastOptions {
            safe: false,
            ..Default::default()
        };
        Ok(cast_with_options(values, &target, &options)?)
    }

    /// One zero of the element type of this array.
    fn fill_value(&self) -> SomaResult<ArrayRef> {
        let zero = Int64Array::from(vec![0]);
        Ok(arrow::compute::cast(&zero, &self.datatype().arrow_type())?)
    }
}

/// Position of `cell` within `region`, laid out row-major with `strides`.
fn offset(cell: &[i64], region: &[DimensionRange], strides: &[usize]) -> usize {
    cell.iter()
        .zip(region.iter())
        .zip(strides.iter())
        .map(|((c, r), s)| (c - r.lower) as usize * s)
        .sum()
}
