//! Test-only scaffolding: a throwaway dataset directory, mirroring the
//! teacher crate's `TestDb` (temp handle + owned object, dropped together).

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use tempfile::TempDir;

use crate::dataset::Dataset;
use crate::errors::Result;

/// A `Dataset` rooted in a fresh temp directory that is removed on drop.
pub(crate) struct TestDataset {
    dir: TempDir,
    dataset: Dataset,
}

impl Deref for TestDataset {
    type Target = Dataset;

    fn deref(&self) -> &Self::Target {
        &self.dataset
    }
}

impl DerefMut for TestDataset {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.dataset
    }
}

impl TestDataset {
    pub(crate) fn create(name: &str, length: usize) -> Result<Self> {
        let dir = TempDir::with_prefix("coldataset-").expect("tempdir");
        let dataset = Dataset::create(dir.path().join("ds"), name.to_string(), length)?;
        Ok(Self { dir, dataset })
    }

    pub(crate) fn path(&self) -> PathBuf {
        self.dir.path().join("ds")
    }

    /// Drops the inner `Dataset`, releasing its advisory lock, while keeping
    /// the temp directory alive so a test can reopen the same path. The
    /// caller must hold onto the returned `TempDir` for as long as it wants
    /// the directory to survive.
    pub(crate) fn close(self) -> TempDir {
        self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derefs_to_a_working_dataset_rooted_at_path() {
        let mut ds = TestDataset::create("t", 1).unwrap();
        assert_eq!(ds.path(), ds.path());
        let id = ds.column_create("c".into(), crate::dataset::ColumnType::String).unwrap();
        ds.set_string(&id, 0, b"hi").unwrap();
        assert_eq!(ds.get_string(&id, 0).unwrap(), b"hi");
        assert_eq!(ds.get_info().name, "t");
    }
}
