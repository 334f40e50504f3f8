use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::vfs;
use crate::Result as SomaResult;

/// File holding the metadata of an array, relative to the array directory.
pub const METADATA_FILE: &str = "__metadata.json";

/// Metadata key recording the SOMA object type of an array.
pub const SOMA_OBJECT_TYPE_KEY: &str = "soma_object_type";
/// Metadata key recording the version of the SOMA encoding.
pub const SOMA_ENCODING_VERSION_KEY: &str = "soma_encoding_version";
pub const SOMA_ENCODING_VERSION: &str = "1.1.0";

/// Key of the lower bound of the bounding box of sparse dimension `i`.
pub fn domain_lower_key(i: usize) -> String {
    format!("soma_dim_{i}_domain_lower")
}

/// Key of the upper bound of the bounding box of sparse dimension `i`.
pub fn domain_upper_key(i: usize) -> String {
    format!("soma_dim_{i}_domain_upper")
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    String(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// Key/value metadata of one open array.
///
/// Changes are buffered until [Metadata::flush].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    entries: BTreeMap<String, Value>,
    dirty: bool,
}

impl Metadata {
    /// Loads the metadata stored in `array_dir`. An array without a
    /// metadata file has no metadata.
    pub(crate) fn load(array_dir: &Path) -> SomaResult<Self> {
        let path = array_dir.join(METADATA_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let bytes = vfs::read(&path)?;
        Ok(Metadata {
            entries: serde_json::from_slice(&bytes)?,
            dirty: false,
        })
    }

    /// Writes pending changes to `array_dir`.
    pub(crate) fn flush(&mut self, array_dir: &Path) -> SomaResult<()> {
        if self.dirty {
            let bytes = serde_json::to_vec_pretty(&self.entries)?;
            vfs::write_atomic(&array_dir.join(METADATA_FILE), &bytes)?;
            self.dirty = false;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        if self.entries.get(key) != Some(&value) {
            self.entries.insert(key.to_owned(), value);
            self.dirty = true;
        }
    }

    pub fn delete(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.dirty = true;
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
