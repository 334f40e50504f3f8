//! Temporary locations for arrays created by tests.

mod tempdir;

pub use tempdir::TestDirectory;

use anyhow::Result;

/// Hands out URIs below a location which is cleaned up afterwards.
pub trait TestArrayUri {
    /// The `file://` URI of the root of the location.
    fn base_dir(&self) -> Result<String>;

    /// The `file://` URI of `paths` joined below the root.
    fn with_paths(&self, paths: &[&str]) -> Result<String>;

    /// The plain filesystem path of `paths` joined below the root, for
    /// tests of URIs without a scheme.
    fn bare_path(&self, paths: &[&str]) -> Result<String>;

    fn close(self) -> Result<()>;

    fn with_path(&self, path: &str) -> Result<String> {
        self.with_paths(&[path])
    }
}

pub fn get_uri_generator() -> Result<impl TestArrayUri> {
    TestDirectory::new()
}
