use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use soma_common::array::shape::{resolve_maxshape, validate_resize};
use soma_common::array::ArrayType;
use soma_common::datatype::Datatype;

use crate::Result as SomaResult;

/// Name of the attribute holding cell values.
pub const DATA_FIELD: &str = "soma_data";

/// Version of the on-disk layout written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Returns the name of dimension `i`: `soma_dim_0`, `soma_dim_1`, ...
pub fn dim_name(i: usize) -> String {
    format!("soma_dim_{i}")
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DimensionSchema {
    pub name: String,
    /// Current extent. Valid coordinates are `[0, shape)`.
    pub shape: i64,
    pub maxshape: i64,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArraySchema {
    pub array_type: ArrayType,
    pub datatype: Datatype,
    pub dimensions: Vec<DimensionSchema>,
    pub format_version: u32,
}

impl ArraySchema {
    /// Validates `shape` and `maxshape` and builds the schema of a new
    /// array.
    pub fn new(
        array_type: ArrayType,
        datatype: Datatype,
        shape: &[i64],
        maxshape: Option<&[Option<i64>]>,
    ) -> SomaResult<Self> {
        let maxshape = resolve_maxshape(shape, maxshape)?;
        let dimensions = shape
            .iter()
            .zip(maxshape)
            .enumerate()
            .map(|(i, (shape, maxshape))| DimensionSchema {
                name: dim_name(i),
                shape: *shape,
                maxshape,
            })
            .collect();
        Ok(ArraySchema {
            array_type,
            datatype,
            dimensions,
            format_version: FORMAT_VERSION,
        })
    }

    pub fn ndim(&self) -> usize {
        self.dimensions.len()
    }

    pub fn shape(&self) -> Vec<i64> {
        self.dimensions.iter().map(|d| d.shape).collect()
    }

    pub fn maxshape(&self) -> Vec<i64> {
        self.dimensions.iter().map(|d| d.maxshape).collect()
    }

    /// Grows the current shape, leaving `maxshape` alone.
    pub fn resize(&mut self, new_shape: &[i64]) -> SomaResult<()> {
        validate_resize(&self.shape(), &self.maxshape(), new_shape)?;
        for (d, s) in self.dimensions.iter_mut().zip(new_shape.iter()) {
            d.shape = *s;
        }
        Ok(())
    }

    /// Returns the Arrow schema of the cells of this array: one `Int64`
    /// field per dimension followed by `soma_data`.
    pub fn arrow_schema(&self) -> SchemaRef {
        let mut fields = self
            .dimensions
            .iter()
            .map(|d| Field::new(&d.name, DataType::Int64, false))
            .collect::<Vec<_>>();
        fields.push(Field::new(DATA_FIELD, self.datatype.arrow_type(), false));
        Arc::new(Schema::new_with_metadata(
            fields,
            HashMap::from([(
                "soma_type".to_owned(),
                self.array_type.soma_type().to_owned(),
            )]),
        ))
    }

    pub(crate) fn to_json(&self) -> SomaResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub(crate) fn from_json(bytes: &[u8]) -> SomaResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
