//! Dense and sparse N-dimensional arrays stored in local directories.
//!
//! ```no_run
//! use arrow::datatypes::DataType;
//! use soma_api::context::Context;
//! use soma_api::dense::DenseNDArray;
//! use soma_api::tensor::Tensor;
//! use soma_common::range::DimSelector;
//! use soma_common::{Mode, ResultOrder};
//!
//! # fn main() -> soma_api::Result<()> {
//! let ctx = Context::new();
//! let mut a =
//!     DenseNDArray::create(&ctx, "file:///tmp/a", &DataType::Int32, &[2, 3], None)?;
//! a.write_tensor(&[], &Tensor::from_vec(vec![2, 3], vec![1i32, 2, 3, 4, 5, 6])?)?;
//! a.close()?;
//!
//! let a = DenseNDArray::open(&ctx, "file:///tmp/a", Mode::Read)?;
//! let row = a.read_tensor(&[DimSelector::Point(1)], ResultOrder::RowMajor)?;
//! assert_eq!(&[1, 3], row.shape());
//! # Ok(())
//! # }
//! ```

pub mod array;
pub mod config;
pub mod context;
pub mod dense;
pub mod error;
pub mod metadata;
pub mod schema;
pub mod sparse;
pub mod tensor;
pub mod vfs;

mod fragment;

pub use array::SomaArray;
pub use context::Context;
pub use dense::DenseNDArray;
pub use error::{Error, ErrorKind};
pub use soma_common::array::shape::MAXSHAPE_SENTINEL;
pub use soma_common::range::{DimSelector, NonEmptyDomain};
pub use soma_common::{ArrayType, Datatype, Mode, ResultOrder};
pub use sparse::{SparseNDArray, SparseReader};
pub use tensor::Tensor;

pub type Result<T> = std::result::Result<T, error::Error>;
