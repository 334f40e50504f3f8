//! Immutable files holding the cells of one write.
//!
//! Each write produces one Arrow IPC file under `__fragments/`. Its name
//! orders it among the other fragments of the array; its schema metadata
//! records the bounding box of the cells it holds and, for dense writes,
//! the region it covers.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arrow::compute::concat_batches;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use soma_common::range::{DimensionRange, NonEmptyDomain};

use crate::error::Error;
use crate::vfs;
use crate::Result as SomaResult;

pub(crate) const FRAGMENTS_DIR: &str = "__fragments";

const FRAGMENT_EXTENSION: &str = "arrow";
const MBR_KEY: &str = "soma.fragment.mbr";
const SUBARRAY_KEY: &str = "soma.fragment.subarray";
const TIMESTAMP_KEY: &str = "soma.fragment.timestamp";

static LAST_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Returns a number larger than any previously returned by this process,
/// close to the current time in nanoseconds so that fragments written by
/// different processes also interleave by time.
fn next_sequence() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let prev = LAST_SEQUENCE
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(prev + 1)
}

#[derive(Clone, Debug)]
pub(crate) struct Fragment {
    pub path: PathBuf,
    pub timestamp: u64,
    pub sequence: u64,
    /// Bounding box of the cells in this fragment.
    pub mbr: NonEmptyDomain,
    /// Region written by a dense write.
    pub subarray: Option<Vec<DimensionRange>>,
}

fn corrupt(path: &Path, reason: impl ToString) -> Error {
    Error::Corrupt {
        uri: path.display().to_string(),
        reason: reason.to_string(),
    }
}

impl Fragment {
    fn file_name(timestamp: u64, sequence: u64) -> String {
        format!("__{timestamp:020}_{sequence:020}.{FRAGMENT_EXTENSION}")
    }

    /// Parses the name of a fragment file into its timestamp and sequence.
    fn parse_file_name(name: &str) -> Option<(u64, u64)> {
        let stem = name
            .strip_prefix("__")?
            .strip_suffix(FRAGMENT_EXTENSION)?
            .strip_suffix('.')?;
        let (timestamp, sequence) = stem.split_once('_')?;
        Some((timestamp.parse().ok()?, sequence.parse().ok()?))
    }

    /// Writes `batch` as a new fragment of the array in `array_dir`.
    pub fn write(
        array_dir: &Path,
        batch: &RecordBatch,
        timestamp: u64,
        mbr: &NonEmptyDomain,
        subarray: Option<&[DimensionRange]>,
    ) -> SomaResult<Fragment> {
        let dir = array_dir.join(FRAGMENTS_DIR);
        std::fs::create_dir_all(&dir).map_err(Error::io(&dir))?;

        let mut metadata = HashMap::from([
            (MBR_KEY.to_owned(), serde_json::to_string(mbr)?),
            (TIMESTAMP_KEY.to_owned(), timestamp.to_string()),
        ]);
        if let Some(subarray) = subarray {
            metadata
                .insert(SUBARRAY_KEY.to_owned(), serde_json::to_string(subarray)?);
        }
        let schema = Arc::new(
            batch.schema().as_ref().clone().with_metadata(metadata),
        );
        let batch = RecordBatch::try_new(schema.clone(), batch.columns().to_vec())?;

        let mut writer = FileWriter::try_new(Vec::new(), &schema)?;
        writer.write(&batch)?;
        writer.finish()?;
        let bytes = writer.into_inner()?;

        let sequence = next_sequence();
        let path = dir.join(Self::file_name(timestamp, sequence));
        vfs::write_atomic(&path, &bytes)?;

        Ok(Fragment {
            path,
            timestamp,
            sequence,
            mbr: mbr.clone(),
            subarray: subarray.map(|s| s.to_vec()),
        })
    }

    /// Reads the footer of the fragment at `path`.
    fn open(path: PathBuf, timestamp: u64, sequence: u64) -> SomaResult<Self> {
        let file = File::open(&path).map_err(Error::io(&path))?;
        let reader =
            FileReader::try_new(file, None).map_err(|e| corrupt(&path, e))?;
        let schema = reader.schema();
        let metadata = schema.metadata();

        let mbr = metadata
            .get(MBR_KEY)
            .ok_or_else(|| corrupt(&path, "fragment has no bounding box"))
            .and_then(|mbr| {
                serde_json::from_str(mbr).map_err(|e| corrupt(&path, e))
            })?;
        let subarray = metadata
            .get(SUBARRAY_KEY)
            .map(|s| serde_json::from_str(s).map_err(|e| corrupt(&path, e)))
            .transpose()?;

        Ok(Fragment {
            path,
            timestamp,
            sequence,
            mbr,
            subarray,
        })
    }

    /// Reads all the cells of this fragment.
    pub fn read(&self) -> SomaResult<RecordBatch> {
        let file = File::open(&self.path).map_err(Error::io(&self.path))?;
        let reader = FileReader::try_new(file, None)
            .map_err(|e| corrupt(&self.path, e))?;
        let schema = reader.schema();
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }

    pub fn remove(&self) -> SomaResult<()> {
        vfs::remove_file(&self.path)
    }
}

/// Lists the fragments of the array in `array_dir`, oldest first.
///
/// If `timestamp` is given, fragments written after it are skipped.
pub(crate) fn list(
    array_dir: &Path,
    timestamp: Option<u64>,
) -> SomaResult<Vec<Fragment>> {
    let mut fragments = vfs::list(&array_dir.join(FRAGMENTS_DIR))?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let (ts, seq) = Fragment::parse_file_name(name)?;
            Some((path, ts, seq))
        })
        .filter(|(_, ts, _)| timestamp.map(|t| *ts <= t).unwrap_or(true))
        .map(|(path, ts, seq)| Fragment::open(path, ts, seq))
        .collect::<SomaResult<Vec<_>>>()?;
    fragments.sort_by_key(|f| (f.timestamp, f.sequence));
    Ok(fragments)
}
