//! The handle shared by dense and sparse arrays.
//!
//! An array is a directory holding its schema, its metadata and one
//! fragment per write. A handle is opened for reading or for writing; the
//! typed wrappers in [crate::dense] and [crate::sparse] add the cell I/O.

use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use log::{debug, warn};
use soma_common::array::{ArrayType, Mode};
use soma_common::datatype::Datatype;
use soma_common::range::NonEmptyDomain;

use crate::context::{now_ms, Context, ContextBound};
use crate::error::Error;
use crate::fragment::{self, Fragment, FRAGMENTS_DIR};
use crate::metadata::{
    Metadata, Value, METADATA_FILE, SOMA_ENCODING_VERSION,
    SOMA_ENCODING_VERSION_KEY, SOMA_OBJECT_TYPE_KEY,
};
use crate::schema::ArraySchema;
use crate::vfs::{self, uri_to_path};
use crate::Result as SomaResult;

/// File holding the schema of an array, relative to the array directory.
pub const SCHEMA_FILE: &str = "__schema.json";

fn load_schema(path: &Path) -> SomaResult<Option<ArraySchema>> {
    let schema_path = path.join(SCHEMA_FILE);
    if !schema_path.is_file() {
        return Ok(None);
    }
    let bytes = vfs::read(&schema_path)?;
    ArraySchema::from_json(&bytes)
        .map(Some)
        .map_err(|e| Error::Corrupt {
            uri: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Returns the type of the array at `uri`, or `None` if there is no array.
pub fn object_type(_ctx: &Context, uri: &str) -> SomaResult<Option<ArrayType>> {
    Ok(load_schema(&uri_to_path(uri)?)?.map(|s| s.array_type))
}

/// Returns whether an array of any type exists at `uri`.
pub fn exists(ctx: &Context, uri: &str) -> SomaResult<bool> {
    Ok(object_type(ctx, uri)?.is_some())
}

/// Removes the array at `uri`.
///
/// Only the files of the array are removed; the directory itself is
/// removed if nothing else is left in it. Deleting an array which does not
/// exist succeeds.
pub fn delete(_ctx: &Context, uri: &str) -> SomaResult<()> {
    let path = uri_to_path(uri)?;
    vfs::remove_file(&path.join(SCHEMA_FILE))?;
    vfs::remove_dir_all(&path.join(FRAGMENTS_DIR))?;
    vfs::remove_file(&path.join(METADATA_FILE))?;
    vfs::remove_dir_if_empty(&path)?;
    debug!("Deleted array '{}'", uri);
    Ok(())
}

pub struct SomaArray {
    context: Context,
    uri: String,
    path: PathBuf,
    mode: Mode,
    timestamp: Option<u64>,
    schema: ArraySchema,
    metadata: Metadata,
    open: bool,
}

impl ContextBound for SomaArray {
    fn context(&self) -> &Context {
        &self.context
    }
}

impl SomaArray {
    /// Creates a new array from an already validated schema and returns a
    /// handle to it open for writing.
    pub(crate) fn create(
        ctx: &Context,
        uri: &str,
        schema: ArraySchema,
    ) -> SomaResult<Self> {
        let path = uri_to_path(uri)?;
        if load_schema(&path)?.is_some() {
            return Err(Error::AlreadyExists(uri.to_owned()));
        }

        let existed = path.is_dir();
        let metadata = match Self::initialize(&path, &schema) {
            Ok(metadata) => metadata,
            Err(e) => {
                // leave nothing behind that `exists` would find
                let _ = vfs::remove_file(&path.join(SCHEMA_FILE));
                let _ = vfs::remove_file(&path.join(METADATA_FILE));
                if !existed {
                    let _ = vfs::remove_dir_if_empty(&path);
                }
                return Err(e);
            }
        };

        debug!(
            "Created {} '{}' with shape {:?} and element type {}",
            schema.array_type,
            uri,
            schema.shape(),
            schema.datatype
        );

        Ok(SomaArray {
            context: ctx.clone(),
            uri: uri.to_owned(),
            path,
            mode: Mode::Write,
            timestamp: None,
            schema,
            metadata,
            open: true,
        })
    }

    fn initialize(path: &Path, schema: &ArraySchema) -> SomaResult<Metadata> {
        std::fs::create_dir_all(path).map_err(Error::io(path))?;

        let mut metadata = Metadata::default();
        metadata.set(
            SOMA_OBJECT_TYPE_KEY,
            Value::from(schema.array_type.soma_type()),
        );
        metadata.set(SOMA_ENCODING_VERSION_KEY, Value::from(SOMA_ENCODING_VERSION));
        metadata.flush(path)?;

        // the schema file marks the array as existing, so it goes last
        vfs::write_atomic(&path.join(SCHEMA_FILE), &schema.to_json()?)?;
        Ok(metadata)
    }

    /// Opens the array at `uri`, which must be of type `expected`.
    pub(crate) fn open(
        ctx: &Context,
        uri: &str,
        mode: Mode,
        expected: ArrayType,
        timestamp: Option<u64>,
    ) -> SomaResult<Self> {
        let path = uri_to_path(uri)?;
        let schema = load_schema(&path)?
            .ok_or_else(|| Error::DoesNotExist(uri.to_owned()))?;
        if schema.array_type != expected {
            return Err(Error::WrongArrayType {
                uri: uri.to_owned(),
                expected: expected.soma_type(),
                found: schema.array_type.soma_type(),
            });
        }
        let metadata = Metadata::load(&path)?;

        // reads see the array as of when it was opened
        let timestamp = match (mode, timestamp) {
            (_, Some(t)) => Some(t),
            (Mode::Read, None) => Some(now_ms()),
            (Mode::Write, None) => None,
        };

        debug!("Opened {} '{}' in mode '{}'", schema.array_type, uri, mode);

        Ok(SomaArray {
            context: ctx.clone(),
            uri: uri.to_owned(),
            path,
            mode,
            timestamp,
            schema,
            metadata,
            open: true,
        })
    }

    /// Closes the handle, writing pending metadata changes.
    ///
    /// Closing a closed handle does nothing.
    pub fn close(&mut self) -> SomaResult<()> {
        if !self.open {
            return Ok(());
        }
        if self.mode == Mode::Write {
            self.metadata.flush(&self.path)?;
        }
        self.open = false;
        debug!("Closed array '{}'", self.uri);
        Ok(())
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The timestamp the handle was opened at, if any. Writes through a
    /// handle with a timestamp are stamped with it.
    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn array_type(&self) -> ArrayType {
        self.schema.array_type
    }

    pub fn soma_type(&self) -> &'static str {
        self.schema.array_type.soma_type()
    }

    pub fn is_sparse(&self) -> bool {
        self.schema.array_type.is_sparse()
    }

    /// Returns the Arrow schema of the cells of the array.
    pub fn schema(&self) -> SchemaRef {
        self.schema.arrow_schema()
    }

    pub fn array_schema(&self) -> &ArraySchema {
        &self.schema
    }

    pub fn datatype(&self) -> Datatype {
        self.schema.datatype
    }

    pub fn ndim(&self) -> usize {
        self.schema.ndim()
    }

    pub fn shape(&self) -> Vec<i64> {
        self.schema.shape()
    }

    pub fn maxshape(&self) -> Vec<i64> {
        self.schema.maxshape()
    }

    /// Returns the per-dimension inclusive bounds of all written cells, or
    /// `(0, 0)` for every dimension if nothing has been written.
    pub fn non_empty_domain(&self) -> SomaResult<NonEmptyDomain> {
        self.check_open()?;
        Ok(self
            .fragments()?
            .iter()
            .map(|f| f.mbr.clone())
            .reduce(|l, r| l.union(&r))
            .unwrap_or_else(|| NonEmptyDomain::empty(self.ndim())))
    }

    /// Grows the current shape of the array up to its `maxshape`.
    pub fn resize(&mut self, new_shape: &[i64]) -> SomaResult<()> {
        self.check_mode("resize", Mode::Write)?;
        let mut schema = self.schema.clone();
        schema.resize(new_shape)?;
        vfs::write_atomic(&self.path.join(SCHEMA_FILE), &schema.to_json()?)?;
        debug!(
            "Resized array '{}' from {:?} to {:?}",
            self.uri,
            self.schema.shape(),
            new_shape
        );
        self.schema = schema;
        Ok(())
    }

    pub fn metadata_get(&self, key: &str) -> SomaResult<Option<&Value>> {
        self.check_open()?;
        Ok(self.metadata.get(key))
    }

    pub fn metadata_set<V>(&mut self, key: &str, value: V) -> SomaResult<()>
    where
        V: Into<Value>,
    {
        self.check_mode("metadata_set", Mode::Write)?;
        self.metadata.set(key, value.into());
        Ok(())
    }

    pub fn metadata_delete(&mut self, key: &str) -> SomaResult<()> {
        self.check_mode("metadata_delete", Mode::Write)?;
        self.metadata.delete(key);
        Ok(())
    }

    pub fn metadata_keys(&self) -> SomaResult<Vec<String>> {
        self.check_open()?;
        Ok(self.metadata.keys().map(str::to_owned).collect())
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Returns the number of fragments visible to this handle.
    pub fn fragment_count(&self) -> SomaResult<usize> {
        self.check_open()?;
        Ok(self.fragments()?.len())
    }

    /// Fragments visible to this handle, oldest first.
    pub(crate) fn fragments(&self) -> SomaResult<Vec<Fragment>> {
        fragment::list(&self.path, self.timestamp)
    }

    /// The timestamp to stamp a new fragment with.
    pub(crate) fn write_timestamp(&self) -> u64 {
        self.timestamp.unwrap_or_else(now_ms)
    }

    pub(crate) fn check_open(&self) -> SomaResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::Closed(self.uri.clone()))
        }
    }

    pub(crate) fn check_mode(
        &self,
        operation: &'static str,
        required: Mode,
    ) -> SomaResult<()> {
        self.check_open()?;
        if self.mode == required {
            Ok(())
        } else {
            Err(Error::InvalidMode {
                uri: self.uri.clone(),
                operation,
                actual: self.mode,
                required,
            })
        }
    }
}

impl Drop for SomaArray {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing array '{}' on drop: {}", self.uri, e);
        }
    }
}
