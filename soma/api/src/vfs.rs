//! Local filesystem access by URI.
//!
//! Arrays live in directories addressed either by `file://` URIs or by
//! bare paths. Every file is written to a sibling temporary file and then
//! persisted into place, so readers never observe a partial file.

use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::context::{Context, ContextBound};
use crate::error::Error;
use crate::Result as SomaResult;

const FILE_SCHEME: &str = "file://";

/// Converts `uri` into a local path.
///
/// Bare paths are returned unchanged. URIs with a scheme other than
/// `file` are rejected.
pub fn uri_to_path(uri: &str) -> SomaResult<PathBuf> {
    if let Some(path) = uri.strip_prefix(FILE_SCHEME) {
        if path.is_empty() {
            return Err(Error::InvalidUri(uri.to_owned()));
        }
        return Ok(PathBuf::from(path));
    }
    if uri.is_empty() || uri.contains("://") {
        return Err(Error::InvalidUri(uri.to_owned()));
    }
    Ok(PathBuf::from(uri))
}

pub struct Vfs<'ctx> {
    context: &'ctx Context,
}

impl ContextBound for Vfs<'_> {
    fn context(&self) -> &Context {
        self.context
    }
}

impl<'ctx> Vfs<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Vfs { context }
    }

    pub fn is_dir(&self, uri: &str) -> SomaResult<bool> {
        Ok(uri_to_path(uri)?.is_dir())
    }

    pub fn is_file(&self, uri: &str) -> SomaResult<bool> {
        Ok(uri_to_path(uri)?.is_file())
    }

    /// Creates the directory and any missing parents.
    pub fn create_dir(&self, uri: &str) -> SomaResult<()> {
        let path = uri_to_path(uri)?;
        fs::create_dir_all(&path).map_err(Error::io(path))
    }

    /// Removes a directory and everything below it. Missing directories
    /// are not an error.
    pub fn remove_dir(&self, uri: &str) -> SomaResult<()> {
        remove_dir_all(&uri_to_path(uri)?)
    }

    /// Removes a file. Missing files are not an error.
    pub fn remove_file(&self, uri: &str) -> SomaResult<()> {
        remove_file(&uri_to_path(uri)?)
    }

    pub fn read(&self, uri: &str) -> SomaResult<Vec<u8>> {
        read(&uri_to_path(uri)?)
    }

    pub fn write(&self, uri: &str, contents: &[u8]) -> SomaResult<()> {
        write_atomic(&uri_to_path(uri)?, contents)
    }

    /// Lists the names of the entries of a directory in sorted order.
    pub fn ls(&self, uri: &str) -> SomaResult<Vec<String>> {
        Ok(list(&uri_to_path(uri)?)?
            .into_iter()
            .filter_map(|p| {
                p.file_name().and_then(|n| n.to_str()).map(str::to_owned)
            })
            .collect())
    }
}

pub(crate) fn read(path: &Path) -> SomaResult<Vec<u8>> {
    fs::read(path).map_err(Error::io(path))
}

/// Writes `contents` to `path` by way of a temporary file in the same
/// directory.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> SomaResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".soma")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(Error::io(dir))?;
    tmp.write_all(contents).map_err(Error::io(tmp.path()))?;
    tmp.persist(path).map_err(|e| Error::io(path)(e.error))?;
    Ok(())
}

/// Returns the paths of the entries of `dir`, sorted. A missing directory
/// has no entries.
pub(crate) fn list(dir: &Path) -> SomaResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(Error::io(dir)(e)),
    };
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::io(dir))?;
    paths.sort();
    Ok(paths)
}

pub(crate) fn remove_file(path: &Path) -> SomaResult<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != IoErrorKind::NotFound => Err(Error::io(path)(e)),
        _ => Ok(()),
    }
}

pub(crate) fn remove_dir_all(path: &Path) -> SomaResult<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != IoErrorKind::NotFound => Err(Error::io(path)(e)),
        _ => Ok(()),
    }
}

/// Removes `path` if it is an empty directory.
pub(crate) fn remove_dir_if_empty(path: &Path) -> SomaResult<()> {
    if path.is_dir() && list(path)?.is_empty() {
        match fs::remove_dir(path) {
            Err(e) if e.kind() != IoErrorKind::NotFound => {
                return Err(Error::io(path)(e))
            }
            _ => (),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn file_uri(dir: &TempDir, name: &str) -> String {
        format!("{}{}", FILE_SCHEME, dir.path().join(name).display())
    }

    #[test]
    fn uri_resolution() {
        assert_eq!(
            PathBuf::from("/tmp/a"),
            uri_to_path("file:///tmp/a").unwrap()
        );
        assert_eq!(PathBuf::from("rel/a"), uri_to_path("rel/a").unwrap());

        for bad in ["", "file://", "s3://bucket/a", "gs://bucket/a"] {
            let e = uri_to_path(bad).unwrap_err();
            assert!(matches!(e, Error::InvalidUri(_)), "{bad}: {e}");
            assert_eq!(crate::error::ErrorKind::Value, e.kind());
        }
    }

    #[test]
    fn vfs_directory_operations() -> SomaResult<()> {
        let ctx = Context::new();
        let vfs = ctx.vfs();
        let tmp_dir = TempDir::new().unwrap();

        let dir1 = file_uri(&tmp_dir, "vfs_test_dir_1/nested");
        assert!(!vfs.is_dir(&dir1)?);
        vfs.create_dir(&dir1)?;
        assert!(vfs.is_dir(&dir1)?);

        let dir1_parent = file_uri(&tmp_dir, "vfs_test_dir_1");
        vfs.remove_dir(&dir1_parent)?;
        assert!(!vfs.is_dir(&dir1)?);

        // twice is fine
        vfs.remove_dir(&dir1_parent)?;
        Ok(())
    }

    #[test]
    fn vfs_file_operations() -> SomaResult<()> {
        let ctx = Context::new();
        let vfs = ctx.vfs();
        let tmp_dir = TempDir::new().unwrap();

        let file1 = file_uri(&tmp_dir, "vfs_test_file_1");
        assert!(!vfs.is_file(&file1)?);

        vfs.write(&file1, &[42; 1024])?;
        assert!(vfs.is_file(&file1)?);
        assert_eq!(vec![42u8; 1024], vfs.read(&file1)?);

        vfs.write(&file1, b"overwritten")?;
        assert_eq!(b"overwritten".to_vec(), vfs.read(&file1)?);

        // no temporary files left behind
        assert_eq!(
            vec!["vfs_test_file_1".to_owned()],
            vfs.ls(&file_uri(&tmp_dir, ""))?
        );

        vfs.remove_file(&file1)?;
        assert!(!vfs.is_file(&file1)?);
        vfs.remove_file(&file1)?;

        assert!(matches!(vfs.read(&file1), Err(Error::Io { .. })));
        Ok(())
    }

    #[test]
    fn atomic_write_cleans_up() -> SomaResult<()> {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("schema.json");

        write_atomic(&path, b"{}")?;
        write_atomic(&path, b"{\"a\": 1}")?;
        assert_eq!(b"{\"a\": 1}".to_vec(), read(&path)?);
        assert_eq!(vec![path.clone()], list(tmp_dir.path())?);

        // renaming over a directory fails and leaves no temporary file
        let blocked = tmp_dir.path().join("blocked");
        fs::create_dir_all(blocked.join("inner")).unwrap();
        assert!(matches!(
            write_atomic(&blocked, b"x"),
            Err(Error::Io { .. })
        ));
        assert_eq!(vec![blocked, path], list(tmp_dir.path())?);

        let missing = tmp_dir.path().join("missing").join("file");
        assert!(matches!(
            write_atomic(&missing, b"x"),
            Err(Error::Io { .. })
        ));
        Ok(())
    }

    #[test]
    fn vfs_ls() -> SomaResult<()> {
        let ctx = Context::new();
        let vfs = ctx.vfs();
        let tmp_dir = TempDir::new().unwrap();

        for name in ["c", "a", "b"] {
            vfs.write(&file_uri(&tmp_dir, name), name.as_bytes())?;
        }
        assert_eq!(vec!["a", "b", "c"], vfs.ls(&file_uri(&tmp_dir, ""))?);
        assert!(vfs.ls(&file_uri(&tmp_dir, "missing"))?.is_empty());
        Ok(())
    }

    #[test]
    fn remove_empty_dir_only() -> SomaResult<()> {
        let tmp_dir = TempDir::new().unwrap();
        let full = tmp_dir.path().join("full");
        let empty = tmp_dir.path().join("empty");
        fs::create_dir(&full).unwrap();
        fs::create_dir(&empty).unwrap();
        write_atomic(&full.join("f"), b"x")?;

        remove_dir_if_empty(&full)?;
        remove_dir_if_empty(&empty)?;
        assert!(full.is_dir());
        assert!(!empty.exists());
        Ok(())
    }
}
