//! `RealColumn`: a fixed-length vector of IEEE-754 doubles, stored as a flat
//! memory-mapped array with no free-list machinery (spec §4.3).

use std::fs::OpenOptions;
use std::mem::size_of;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::errors::{Result, StoreError};

pub struct RealColumn {
    mmap: MmapMut,
    path: PathBuf,
    row_count: usize,
}

impl RealColumn {
    pub fn create<P: AsRef<Path>>(path: P, row_count: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| StoreError::StorageFailure(format!("create {}: {e}", path.display())))?;
        let size = row_count * size_of::<f64>();
        file.set_len(size as u64).map_err(|e| {
            StoreError::StorageFailure(format!("ftruncate {}: {e}", path.display()))
        })?;
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .map_err(|e| StoreError::StorageFailure(format!("mmap {}: {e}", path.display())))?
        };
        log::info!(
            "created real column store {} ({row_count} rows, {size} bytes)",
            path.display()
        );
        Ok(Self {
            mmap,
            path,
            row_count,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, row_count: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| StoreError::StorageFailure(format!("open {}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| StoreError::StorageFailure(format!("stat {}: {e}", path.display())))?
            .len() as usize;
        let expect = row_count * size_of::<f64>();
        if len != expect {
            return Err(StoreError::ManifestCorrupt(format!(
                "real column {} has size {len}, expected {expect} for {row_count} rows",
                path.display()
            )));
        }
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .map_err(|e| StoreError::StorageFailure(format!("mmap {}: {e}", path.display())))?
        };
        Ok(Self {
            mmap,
            path,
            row_count,
        })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    fn in_range(&self, i: usize) -> bool {
        i < self.row_count
    }

    /// Reads row `i`. Out-of-range `i` is the caller's contract violation,
    /// not a checked error (spec §4.3): the slice index panics in any
    /// profile; the `debug_assert!` only gets the panic message in first,
    /// before the raw slice bounds check would.
    pub fn get(&self, i: usize) -> f64 {
        debug_assert!(self.in_range(i), "RealColumn::get index {i} out of range");
        let off = i * size_of::<f64>();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.mmap[off..off + 8]);
        f64::from_le_bytes(buf)
    }

    /// Writes row `i` and flushes asynchronously. Out-of-range `i` is the
    /// caller's contract violation, same as [`Self::get`]: it panics in any
    /// profile, not just a debug one.
    pub fn set(&mut self, i: usize, value: f64) -> Result<()> {
        debug_assert!(self.in_range(i), "RealColumn::set index {i} out of range");
        let off = i * size_of::<f64>();
        self.mmap[off..off + 8].copy_from_slice(&value.to_le_bytes());
        self.mmap
            .flush_async()
            .map_err(|e| StoreError::StorageFailure(format!("msync {}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_zero_initializes() {
        let dir = tempdir().unwrap();
        let col = RealColumn::create(dir.path().join("r"), 4).unwrap();
        for i in 0..4 {
            assert_eq!(col.get(i), 0.0);
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let mut col = RealColumn::create(dir.path().join("r"), 3).unwrap();
        col.set(0, 3.5).unwrap();
        col.set(1, -1.25).unwrap();
        col.set(2, f64::NAN).unwrap();
        assert_eq!(col.get(0), 3.5);
        assert_eq!(col.get(1), -1.25);
        assert!(col.get(2).is_nan());
    }

    #[test]
    fn reopen_recovers_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r");
        {
            let mut col = RealColumn::create(&path, 2).unwrap();
            col.set(0, 1.0).unwrap();
            col.set(1, 2.0).unwrap();
        }
        let reopened = RealColumn::open(&path, 2).unwrap();
        assert_eq!(reopened.get(0), 1.0);
        assert_eq!(reopened.get(1), 2.0);
    }

    #[test]
    fn open_rejects_size_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r");
        RealColumn::create(&path, 2).unwrap();
        assert!(RealColumn::open(&path, 3).is_err());
    }
}
