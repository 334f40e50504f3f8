//! Dense N-dimensional blocks of cells exchanged with dense arrays.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, PrimitiveArray, UInt64Array};
use arrow::compute::take;
use arrow::datatypes::{ArrowNativeType, ArrowPrimitiveType};
use itertools::Itertools;
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};

use crate::error::Error;
use crate::Result as SomaResult;

/// Rust primitive types which can be moved in and out of a [Tensor].
pub trait TensorElement: ArrowNativeType {
    type ArrowPrimitiveType: ArrowPrimitiveType<Native = Self>;
}

macro_rules! tensor_element {
    ($($native:ty => $arrow:ty),+ $(,)?) => {
        $(
            impl TensorElement for $native {
                type ArrowPrimitiveType = $arrow;
            }
        )+
    };
}

tensor_element!(
    i8 => arrow::datatypes::Int8Type,
    i16 => arrow::datatypes::Int16Type,
    i32 => arrow::datatypes::Int32Type,
    i64 => arrow::datatypes::Int64Type,
    u8 => arrow::datatypes::UInt8Type,
    u16 => arrow::datatypes::UInt16Type,
    u32 => arrow::datatypes::UInt32Type,
    u64 => arrow::datatypes::UInt64Type,
    f32 => arrow::datatypes::Float32Type,
    f64 => arrow::datatypes::Float64Type,
);

/// A block of cells laid out in row-major order over `shape`.
#[derive(Clone, Debug)]
pub struct Tensor {
    shape: Vec<usize>,
    values: ArrayRef,
}

impl Tensor {
    pub fn try_new(shape: Vec<usize>, values: ArrayRef) -> SomaResult<Self> {
        let expected = shape.iter().product::<usize>();
        if shape.is_empty() || expected != values.len() {
            return Err(Error::InvalidArgument(format!(
                "Tensor of shape {:?} requires {} values, found {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Tensor { shape, values })
    }

    /// Builds a tensor from a `Vec` in row-major order.
    pub fn from_vec<T>(shape: Vec<usize>, values: Vec<T>) -> SomaResult<Self>
    where
        T: TensorElement,
    {
        let values =
            PrimitiveArray::<T::ArrowPrimitiveType>::from_iter_values(values);
        Self::try_new(shape, Arc::new(values))
    }

    pub fn from_ndarray<T, S, D>(array: &ArrayBase<S, D>) -> SomaResult<Self>
    where
        T: TensorElement,
        S: Data<Elem = T>,
        D: Dimension,
    {
        // `iter` visits elements in logical row-major order whatever the
        // memory layout
        let values = PrimitiveArray::<T::ArrowPrimitiveType>::from_iter_values(
            array.iter().copied(),
        );
        Self::try_new(array.shape().to_vec(), Arc::new(values))
    }

    pub fn to_ndarray<T>(&self) -> SomaResult<ArrayD<T>>
    where
        T: TensorElement,
    {
        let values = self
            .values
            .as_primitive_opt::<T::ArrowPrimitiveType>()
            .ok_or_else(|| Error::TypeMismatch {
                expected: T::ArrowPrimitiveType::DATA_TYPE.to_string(),
                found: self.values.data_type().to_string(),
            })?;
        if values.null_count() > 0 {
            return Err(Error::InvalidArgument(
                "Tensor has null values".to_owned(),
            ));
        }
        ArrayD::from_shape_vec(IxDyn(&self.shape), values.values().to_vec())
            .map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &ArrayRef {
        &self.values
    }

    pub fn into_values(self) -> ArrayRef {
        self.values
    }

    /// Returns the tensor with its axes reversed: element `[i, j, k]` of
    /// `self` is element `[k, j, i]` of the result.
    pub fn transpose(&self) -> SomaResult<Tensor> {
        if self.ndim() < 2 {
            return Ok(self.clone());
        }
        let strides = row_major_strides(&self.shape);
        let reversed = self.shape.iter().rev().copied().collect::<Vec<_>>();

        let indices = UInt64Array::from_iter_values(
            reversed
                .iter()
                .map(|extent| 0..*extent)
                .multi_cartesian_product()
                .map(|index| {
                    index
                        .iter()
                        .rev()
                        .zip(strides.iter())
                        .map(|(i, stride)| (i * stride) as u64)
                        .sum::<u64>()
                }),
        );

        let values = take(self.values.as_ref(), &indices, None)?;
        Ok(Tensor {
            shape: reversed,
            values,
        })
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape
            && self.values.as_ref() == other.values.as_ref()
    }
}

pub(crate) fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use arrow::array::{BooleanArray, Int32Array};
    use ndarray::{arr2, Array3};
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn try_new_checks_length() {
        let values: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3]));
        assert!(Tensor::try_new(vec![3], values.clone()).is_ok());
        assert!(Tensor::try_new(vec![1, 3], values.clone()).is_ok());
        assert!(Tensor::try_new(vec![2, 2], values.clone()).is_err());
        assert!(Tensor::try_new(vec![], values).is_err());
    }

    #[test]
    fn ndarray_conversions() -> SomaResult<()> {
        let a = arr2(&[[1i64, 2, 3], [4, 5, 6]]);
        let t = Tensor::from_ndarray(&a)?;
        assert_eq!(&[2, 3], t.shape());
        assert_eq!(a.clone().into_dyn(), t.to_ndarray::<i64>()?);

        // non-standard layout is flattened logically
        let t = Tensor::from_ndarray(&a.t())?;
        assert_eq!(&[3, 2], t.shape());
        assert_eq!(Tensor::from_vec(vec![3, 2], vec![1i64, 4, 2, 5, 3, 6])?, t);

        assert!(matches!(
            t.to_ndarray::<f64>(),
            Err(Error::TypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn transpose_2d() -> SomaResult<()> {
        let t = Tensor::from_vec(vec![2, 3], vec![0u8, 1, 2, 10, 11, 12])?;
        let expect =
            Tensor::from_vec(vec![3, 2], vec![0u8, 10, 1, 11, 2, 12])?;
        assert_eq!(expect, t.transpose()?);
        Ok(())
    }

    #[test]
    fn transpose_non_primitive() -> SomaResult<()> {
        let values: ArrayRef =
            Arc::new(BooleanArray::from(vec![true, false, false, false]));
        let t = Tensor::try_new(vec![1, 4], values)?;
        let transposed = t.transpose()?;
        assert_eq!(&[4, 1], transposed.shape());
        assert_eq!(t.values(), transposed.values());
        Ok(())
    }

    #[test]
    fn strides() {
        assert_eq!(vec![12, 4, 1], row_major_strides(&[2, 3, 4]));
        assert_eq!(vec![1], row_major_strides(&[7]));
    }

    proptest! {
        #[test]
        fn transpose_matches_ndarray(
            (d0, d1, d2) in (1usize..5, 1usize..5, 1usize..5)
        ) {
            let n = d0 * d1 * d2;
            let a = Array3::from_shape_vec(
                (d0, d1, d2),
                (0..n as i32).collect(),
            ).unwrap();
            let t = Tensor::from_ndarray(&a).unwrap().transpose().unwrap();
            assert_eq!(
                a.reversed_axes().into_dyn(),
                t.to_ndarray::<i32>().unwrap()
            );
        }

        #[test]
        fn transpose_twice_is_identity(
            shape in proptest::collection::vec(1usize..4, 1..=5)
        ) {
            let n = shape.iter().product::<usize>();
            let t = Tensor::from_vec(shape, (0..n as u32).collect()).unwrap();
            assert_eq!(t, t.transpose().unwrap().transpose().unwrap());
        }
    }
}
