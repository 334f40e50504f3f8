use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tempfile::TempDir;

use super::TestArrayUri;

const FILE_SCHEME: &str = "file://";

/// A [TestArrayUri] backed by a temporary directory which is removed when
/// the value is dropped or closed.
pub struct TestDirectory {
    base_dir: TempDir,
}

impl TestDirectory {
    pub fn new() -> Result<Self> {
        let base_dir = tempfile::Builder::new()
            .prefix("soma-test-")
            .tempdir()
            .context("Error creating temporary directory")?;
        Ok(Self { base_dir })
    }

    fn join(&self, paths: &[&str]) -> Result<String> {
        let path = paths
            .iter()
            .fold(PathBuf::from(self.base_dir.path()), |path, part| {
                path.join(part)
            });
        path.to_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("Non UTF-8 test path: {}", path.display()))
    }
}

impl TestArrayUri for TestDirectory {
    fn base_dir(&self) -> Result<String> {
        Ok(format!("{}{}", FILE_SCHEME, self.join(&[])?))
    }

    fn with_paths(&self, paths: &[&str]) -> Result<String> {
        Ok(format!("{}{}", FILE_SCHEME, self.join(paths)?))
    }

    fn bare_path(&self, paths: &[&str]) -> Result<String> {
        self.join(paths)
    }

    fn close(self) -> Result<()> {
        self.base_dir
            .close()
            .context("Error removing temporary directory")
    }
}
