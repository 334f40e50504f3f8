use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, StringArray};
use arrow::datatypes::{DataType, Int64Type, TimeUnit};
use ndarray::{arr2, Array2, ArrayD, IxDyn};
use paste::paste;
use proptest::prelude::*;
use soma_api::config::{CommonOption, Config};
use soma_api::context::Context;
use soma_api::dense::DenseNDArray;
use soma_api::error::{Error, ErrorKind};
use soma_api::schema::DATA_FIELD;
use soma_api::tensor::Tensor;
use soma_common::datatype::strategy::DatatypeContext;
use soma_common::range::DimSelector;
use soma_common::{Datatype, Mode, ResultOrder};
use uri::TestArrayUri;

const SHAPES: [&[i64]; 6] = [
    &[10],
    &[1, 9],
    &[2, 3, 4],
    &[1, 1, 1, 1],
    &[3, 1, 4, 1, 5],
    &[100, 200],
];

fn check_create(element_type: DataType) -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let ctx = Context::new();

    for (i, shape) in SHAPES.iter().enumerate() {
        let uri = test_uri.with_path(&format!("dense_{i}"))?;
        let mut a = DenseNDArray::create(&ctx, &uri, &element_type, shape, None)?;
        assert_eq!(shape.to_vec(), a.shape());
        assert_eq!(shape.len(), a.ndim());
        assert!(!a.is_sparse());
        assert_eq!("SOMADenseNDArray", a.soma_type());

        let schema = a.schema();
        assert_eq!(shape.len() + 1, schema.fields().len());
        for (d, field) in schema.fields().iter().take(shape.len()).enumerate() {
            assert_eq!(&format!("soma_dim_{d}"), field.name());
            assert_eq!(&DataType::Int64, field.data_type());
        }
        let data = schema.field_with_name(DATA_FIELD)?;
        assert_eq!(&element_type, data.data_type());
        a.close()?;

        assert!(DenseNDArray::exists(&ctx, &uri)?);
        let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
        assert_eq!(element_type, a.datatype().arrow_type());
        assert_eq!(shape.to_vec(), a.shape());
    }
    Ok(())
}

macro_rules! create_tests {
    ($($name:ident: $element_type:expr),+ $(,)?) => {
        paste! {
            $(
                #[test]
                fn [<create_ $name>]() -> anyhow::Result<()> {
                    check_create($element_type)
                }
            )+
        }
    };
}

create_tests!(
    bool: DataType::Boolean,
    int8: DataType::Int8,
    int16: DataType::Int16,
    int32: DataType::Int32,
    int64: DataType::Int64,
    uint8: DataType::UInt8,
    uint16: DataType::UInt16,
    uint32: DataType::UInt32,
    uint64: DataType::UInt64,
    float32: DataType::Float32,
    float64: DataType::Float64,
    timestamp_s: DataType::Timestamp(TimeUnit::Second, None),
    timestamp_ms: DataType::Timestamp(TimeUnit::Millisecond, None),
    timestamp_us: DataType::Timestamp(TimeUnit::Microsecond, None),
    timestamp_ns: DataType::Timestamp(TimeUnit::Nanosecond, None),
);

#[test]
fn zero_length_shapes() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let ctx = Context::new();

    let shapes: [&[i64]; 5] = [&[], &[0], &[10, 0], &[0, 10], &[1, 2, 0]];
    for (i, shape) in shapes.iter().enumerate() {
        let uri = test_uri.with_path(&format!("zero_{i}"))?;
        let e = DenseNDArray::create(&ctx, &uri, &DataType::Float32, shape, None)
            .err()
            .unwrap();
        assert_eq!(ErrorKind::Value, e.kind(), "{shape:?}: {e}");
        assert!(!DenseNDArray::exists(&ctx, &uri)?);
    }
    Ok(())
}

#[test]
fn unsupported_element_types() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let ctx = Context::new();

    let unsupported = [
        DataType::Utf8,
        DataType::LargeUtf8,
        DataType::Binary,
        DataType::Float16,
        DataType::Date32,
        DataType::Timestamp(TimeUnit::Second, Some("UTC".into())),
        DataType::Dictionary(Box::new(DataType::Int8), Box::new(DataType::Utf8)),
    ];
    for (i, element_type) in unsupported.iter().enumerate() {
        let uri = test_uri.with_path(&format!("unsupported_{i}"))?;
        let e = DenseNDArray::create(&ctx, &uri, element_type, &[10], None)
            .err()
            .unwrap();
        assert_eq!(ErrorKind::Type, e.kind(), "{element_type}: {e}");
        assert!(!DenseNDArray::exists(&ctx, &uri)?);
    }
    Ok(())
}

/// Creates the 4x6 array where cell `[i, j]` holds `100 * i + j`.
fn create_hundreds(ctx: &Context, uri: &str) -> anyhow::Result<()> {
    let mut a = DenseNDArray::create(ctx, uri, &DataType::Int64, &[4, 6], None)?;
    let values = Array2::from_shape_fn((4, 6), |(i, j)| (100 * i + j) as i64);
    a.write_tensor(&[], &Tensor::from_ndarray(&values)?)?;
    a.close()?;
    Ok(())
}

#[test]
fn doubly_inclusive_slicing() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let uri = test_uri.with_path("hundreds")?;
    let ctx = Context::new();
    create_hundreds(&ctx, &uri)?;

    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    let read = |coords: &[DimSelector]| a.read_ndarray::<i64>(coords);

    assert_eq!(
        arr2(&[[203i64]]).into_dyn(),
        read(&[DimSelector::Point(2), DimSelector::Point(3)])?
    );
    assert_eq!(
        arr2(&[[3i64], [103], [203], [303]]).into_dyn(),
        read(&[DimSelector::All, DimSelector::Point(3)])?
    );
    assert_eq!(
        arr2(&[[200i64, 201, 202, 203, 204, 205]]).into_dyn(),
        read(&[DimSelector::Point(2), DimSelector::from(..)])?
    );
    assert_eq!(
        arr2(&[[5i64], [105], [205]]).into_dyn(),
        read(&[DimSelector::from(..=2), DimSelector::from(5..)])?
    );
    assert_eq!(
        arr2(&[[5i64], [105]]).into_dyn(),
        read(&[DimSelector::from(..=1), DimSelector::from(5..)])?
    );
    assert_eq!(
        arr2(&[[102i64, 103, 104], [202, 203, 204]]).into_dyn(),
        read(&[DimSelector::from(1..=2), DimSelector::from(2..=4)])?
    );
    Ok(())
}

#[test]
fn result_orders() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let uri = test_uri.with_path("hundreds")?;
    let ctx = Context::new();
    create_hundreds(&ctx, &uri)?;

    let expect = Array2::from_shape_fn((4, 6), |(i, j)| (100 * i + j) as i64);

    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    let row = a.read_tensor(&[], ResultOrder::RowMajor)?;
    assert_eq!(&[4, 6], row.shape());
    assert_eq!(expect.clone().into_dyn(), row.to_ndarray::<i64>()?);
    assert_eq!(row, a.read_tensor(&[], ResultOrder::Auto)?);

    let col = a.read_tensor(&[], ResultOrder::ColumnMajor)?;
    assert_eq!(&[6, 4], col.shape());
    assert_eq!(expect.t().to_owned().into_dyn(), col.to_ndarray::<i64>()?);

    // the configured order applies to `Auto` reads
    let cfg = Config::new()
        .with_common_option(&CommonOption::ResultOrder(ResultOrder::ColumnMajor));
    let ctx = Context::from_config(&cfg);
    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    assert_eq!(col, a.read_tensor(&[], ResultOrder::Auto)?);
    Ok(())
}

#[test]
fn single_cell_overwrite() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let uri = test_uri.with_path("hundreds")?;
    let ctx = Context::new();
    create_hundreds(&ctx, &uri)?;

    {
        let mut a = DenseNDArray::open(&ctx, &uri, Mode::Write)?;
        let one = Tensor::from_vec(vec![1, 1], vec![-1i64])?;
        a.write_tensor(&[DimSelector::Point(3), DimSelector::Point(0)], &one)?;
    }

    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    let mut expect = Array2::from_shape_fn((4, 6), |(i, j)| (100 * i + j) as i64);
    expect[[3, 0]] = -1;
    assert_eq!(expect.into_dyn(), a.read_ndarray::<i64>(&[])?);
    Ok(())
}

#[test]
fn unwritten_cells_are_zero() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let ctx = Context::new();

    let uri = test_uri.with_path("floats")?;
    let mut a = DenseNDArray::create(&ctx, &uri, &DataType::Float64, &[3, 3], None)?;
    a.write_tensor(
        &[DimSelector::from(1..=1), DimSelector::from(1..=2)],
        &Tensor::from_vec(vec![1, 2], vec![0.5f64, 1.5])?,
    )?;
    a.close()?;

    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    assert_eq!(
        arr2(&[[0.0f64, 0.0, 0.0], [0.0, 0.5, 1.5], [0.0, 0.0, 0.0]]).into_dyn(),
        a.read_ndarray::<f64>(&[])?
    );

    let uri = test_uri.with_path("bools")?;
    let a = DenseNDArray::create(&ctx, &uri, &DataType::Boolean, &[5], None)?;
    drop(a);
    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    let values = a.read_tensor(&[], ResultOrder::RowMajor)?.into_values();
    let values = values.as_boolean();
    assert_eq!(5, values.len());
    assert_eq!(0, values.true_count());
    Ok(())
}

#[test]
fn values_cast_to_element_type() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let uri = test_uri.with_path("cast")?;
    let ctx = Context::new();

    let mut a = DenseNDArray::create(&ctx, &uri, &DataType::Int16, &[3], None)?;
    a.write_tensor(&[], &Tensor::from_vec(vec![3], vec![1i64, 2, 3])?)?;

    let strings: ArrayRef = Arc::new(StringArray::from(vec!["a", "b", "c"]));
    let e = a
        .write_tensor(&[], &Tensor::try_new(vec![3], strings)?)
        .unwrap_err();
    assert_eq!(ErrorKind::Type, e.kind(), "{e}");

    let overflow = Tensor::from_vec(vec![3], vec![1i64, 2, 1 << 20])?;
    let e = a.write_tensor(&[], &overflow).unwrap_err();
    assert_eq!(ErrorKind::Type, e.kind(), "{e}");
    a.close()?;

    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    let expect = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1i16, 2, 3])?;
    assert_eq!(expect, a.read_ndarray::<i16>(&[])?);
    Ok(())
}

#[test]
fn invalid_writes() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let uri = test_uri.with_path("invalid")?;
    let ctx = Context::new();

    let mut a = DenseNDArray::create(&ctx, &uri, &DataType::Int32, &[4, 6], None)?;
    let cell = Tensor::from_vec(vec![1, 1], vec![7i32])?;

    // out of bounds, even though maxshape would allow it
    let e = a
        .write_tensor(&[DimSelector::Point(4), DimSelector::Point(0)], &cell)
        .unwrap_err();
    assert!(matches!(e, Error::Domain(_)));
    assert_eq!(ErrorKind::Soma, e.kind());

    let e = a
        .write_tensor(&[DimSelector::Point(0)], &Tensor::from_vec(vec![1], vec![7i32])?)
        .unwrap_err();
    assert_eq!(ErrorKind::Value, e.kind());

    let e = a
        .write_tensor(&[DimSelector::from(0..=1), DimSelector::Point(0)], &cell)
        .unwrap_err();
    assert_eq!(ErrorKind::Value, e.kind());

    let e = a
        .write_tensor(&[DimSelector::from(3..=2), DimSelector::Point(0)], &cell)
        .unwrap_err();
    assert_eq!(ErrorKind::Value, e.kind());

    let e = a
        .write_tensor(&[DimSelector::from(vec![0]), DimSelector::Point(0)], &cell)
        .unwrap_err();
    assert!(matches!(e, Error::UnsupportedSelector { dimension: 0, .. }));

    let e = a.read_tensor(&[], ResultOrder::RowMajor).unwrap_err();
    assert!(matches!(e, Error::InvalidMode { .. }));
    a.close()?;

    // nothing was written
    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    assert_eq!(vec![(0, 0), (0, 0)], a.non_empty_domain()?.as_tuples());
    assert_eq!(0, a.read_ndarray::<i32>(&[])?.iter().filter(|v| **v != 0).count());
    Ok(())
}

#[test]
fn out_of_bounds_reads() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let uri = test_uri.with_path("hundreds")?;
    let ctx = Context::new();
    create_hundreds(&ctx, &uri)?;

    let mut a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    for coords in [
        vec![DimSelector::Point(4)],
        vec![DimSelector::All, DimSelector::Point(6)],
        vec![DimSelector::Point(-1)],
    ] {
        let e = a.read_tensor(&coords, ResultOrder::RowMajor).unwrap_err();
        assert_eq!(ErrorKind::Soma, e.kind(), "{coords:?}: {e}");
    }

    // a range entirely outside the shape selects nothing
    for coords in [
        vec![DimSelector::from(4..=9)],
        vec![DimSelector::All, DimSelector::from(6..)],
        vec![DimSelector::from(..=-1)],
    ] {
        let e = a.read_tensor(&coords, ResultOrder::RowMajor).unwrap_err();
        assert_eq!(ErrorKind::Value, e.kind(), "{coords:?}: {e}");
    }

    let e = a
        .write_tensor(&[], &Tensor::from_vec(vec![4, 6], vec![0i64; 24])?)
        .unwrap_err();
    assert_eq!(ErrorKind::Soma, e.kind());

    assert_eq!(ErrorKind::NotImplemented, a.reshape(&[6, 4]).unwrap_err().kind());
    Ok(())
}

#[test]
fn ranges_clamp_to_shape() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let ctx = Context::new();

    for (i, shape) in SHAPES.iter().take(5).enumerate() {
        let uri = test_uri.with_path(&format!("clamped_{i}"))?;
        let extents = shape.iter().map(|s| *s as usize).collect::<Vec<_>>();
        let n = extents.iter().product::<usize>();
        let tensor =
            Tensor::from_vec(extents, (0..n as i64).collect::<Vec<_>>())?;

        // one past the last coordinate on every axis
        let coords = shape
            .iter()
            .map(|s| DimSelector::from(0..=*s))
            .collect::<Vec<_>>();
        let mut a = DenseNDArray::create(&ctx, &uri, &DataType::Int64, shape, None)?;
        a.write_tensor(&coords, &tensor)?;
        a.close()?;

        let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
        assert_eq!(tensor, a.read_tensor(&coords, ResultOrder::RowMajor)?);
        assert_eq!(tensor, a.read_tensor(&[], ResultOrder::RowMajor)?);
    }

    let uri = test_uri.with_path("hundreds")?;
    create_hundreds(&ctx, &uri)?;
    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    assert_eq!(
        arr2(&[[304i64, 305]]).into_dyn(),
        a.read_ndarray::<i64>(&[DimSelector::Point(3), DimSelector::from(4..=100)])?
    );
    Ok(())
}

#[test]
fn non_empty_domain() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let uri = test_uri.with_path("domain")?;
    let ctx = Context::new();

    let mut a = DenseNDArray::create(&ctx, &uri, &DataType::UInt8, &[10, 10], None)?;
    assert_eq!(vec![(0, 0), (0, 0)], a.non_empty_domain()?.as_tuples());
    a.write_tensor(
        &[DimSelector::from(2..=3), DimSelector::from(4..=6)],
        &Tensor::from_vec(vec![2, 3], vec![1u8; 6])?,
    )?;
    a.write_tensor(
        &[DimSelector::Point(7), DimSelector::Point(1)],
        &Tensor::from_vec(vec![1, 1], vec![1u8])?,
    )?;
    a.close()?;

    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    assert_eq!(vec![(2, 7), (1, 6)], a.non_empty_domain()?.as_tuples());
    Ok(())
}

#[test]
fn time_travel() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let uri = test_uri.with_path("time_travel")?;
    let ctx = Context::new();
    DenseNDArray::create(&ctx, &uri, &DataType::Int32, &[3], None)?;

    for (timestamp, value) in [(10, 1i32), (20, 2)] {
        let mut a = DenseNDArray::open_at(&ctx, &uri, Mode::Write, timestamp)?;
        a.write_tensor(
            &[DimSelector::from(0..=1)],
            &Tensor::from_vec(vec![2], vec![value; 2])?,
        )?;
    }

    let read_at = |timestamp| -> anyhow::Result<Vec<i32>> {
        let a = DenseNDArray::open_at(&ctx, &uri, Mode::Read, timestamp)?;
        Ok(a.read_ndarray::<i32>(&[])?.into_raw_vec())
    };
    assert_eq!(vec![0, 0, 0], read_at(5)?);
    assert_eq!(vec![1, 1, 0], read_at(15)?);
    assert_eq!(vec![2, 2, 0], read_at(20)?);

    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    assert_eq!(vec![2, 2, 0], a.read_ndarray::<i32>(&[])?.into_raw_vec());
    Ok(())
}

#[test]
fn idempotent_delete() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let ctx = Context::new();

    let uri = test_uri.with_path("deleted")?;
    create_hundreds(&ctx, &uri)?;
    assert!(DenseNDArray::exists(&ctx, &uri)?);
    DenseNDArray::delete(&ctx, &uri)?;
    assert!(!DenseNDArray::exists(&ctx, &uri)?);
    DenseNDArray::delete(&ctx, &uri)?;

    let never = test_uri.with_paths(&["never", "existed"])?;
    DenseNDArray::delete(&ctx, &never)?;
    assert!(!DenseNDArray::exists(&ctx, &never)?);

    // a fresh array can be created in the same place
    create_hundreds(&ctx, &uri)?;
    let a = DenseNDArray::open(&ctx, &uri, Mode::Read)?;
    assert_eq!(vec![(0, 3), (0, 5)], a.non_empty_domain()?.as_tuples());
    Ok(())
}

#[test]
fn bare_path_uris() -> anyhow::Result<()> {
    let test_uri = uri::get_uri_generator()?;
    let path = test_uri.bare_path(&["bare"])?;
    let ctx = Context::new();

    create_hundreds(&ctx, &path)?;
    assert!(DenseNDArray::exists(&ctx, &test_uri.with_path("bare")?)?);
    let a = DenseNDArray::open(&ctx, &path, Mode::Read)?;
    assert_eq!(
        arr2(&[[305i64]]).into_dyn(),
        a.read_ndarray::<i64>(&[DimSelector::Point(3), DimSelector::Point(5)])?
    );
    Ok(())
}

fn shape_and_values() -> impl Strategy<Value = (Vec<usize>, Vec<i32>)> {
    proptest::collection::vec(1usize..5, 1..=4).prop_flat_map(|shape| {
        let n = shape.iter().product::<usize>();
        (Just(shape), proptest::collection::vec(any::<i32>(), n))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn full_write_read((shape, values) in shape_and_values()) {
        let test_uri = uri::get_uri_generator().unwrap();
        let uri = test_uri.with_path("roundtrip").unwrap();
        let ctx = Context::new();

        let extents = shape.iter().map(|s| *s as i64).collect::<Vec<_>>();
        let tensor = Tensor::from_vec(shape.clone(), values).unwrap();
        {
            let mut a = DenseNDArray::create(
                &ctx, &uri, &DataType::Int32, &extents, None,
            ).unwrap();
            a.write_tensor(&[], &tensor).unwrap();
        }

        let a = DenseNDArray::open(&ctx, &uri, Mode::Read).unwrap();
        let row = a.read_tensor(&[], ResultOrder::RowMajor).unwrap();
        assert_eq!(tensor, row);

        let col = a.read_tensor(&[], ResultOrder::ColumnMajor).unwrap();
        let expect = tensor.to_ndarray::<i32>().unwrap().reversed_axes();
        assert_eq!(expect, col.to_ndarray::<i32>().unwrap());
    }

    #[test]
    fn numeric_cells_default_to_zero(
        dt in any_with::<Datatype>(DatatypeContext::Numeric)
    ) {
        let test_uri = uri::get_uri_generator().unwrap();
        let uri = test_uri.with_path("numeric").unwrap();
        let ctx = Context::new();

        let mut a = DenseNDArray::create(
            &ctx, &uri, &dt.arrow_type(), &[3, 4], None,
        ).unwrap();
        a.write_tensor(
            &[DimSelector::Point(1), DimSelector::Point(2)],
            &Tensor::from_vec(vec![1, 1], vec![7i64]).unwrap(),
        ).unwrap();
        a.close().unwrap();

        let a = DenseNDArray::open(&ctx, &uri, Mode::Read).unwrap();
        let tensor = a.read_tensor(&[], ResultOrder::RowMajor).unwrap();
        assert_eq!(&dt.arrow_type(), tensor.values().data_type());

        let values = arrow::compute::cast(tensor.values(), &DataType::Int64).unwrap();
        let mut expect = vec![0i64; 12];
        expect[6] = 7;
        assert_eq!(expect, values.as_primitive::<Int64Type>().values().to_vec());
    }
}
