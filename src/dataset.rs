//! `Dataset`: a directory holding one manifest and one file per column
//! (spec §4.4).

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StoreError};
use crate::store::{RealColumn, StringColumn};
use crate::watcher::WatcherRegistry;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 6;
const MANIFEST_FILE: &str = "info.json";
const LOCK_FILE: &str = ".lock";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Real,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub length: usize,
    pub columns: BTreeMap<String, ColumnInfo>,
}

enum ColumnBacking {
    String(StringColumn),
    Real(RealColumn),
}

struct ColumnSlot {
    info: ColumnInfo,
    backing: Option<ColumnBacking>,
    generation: u64,
}

/// A dataset directory: manifest plus lazily-mapped column files.
///
/// Columns hold only a weak, lookup-only relationship to their owning
/// dataset — the length and path they need come from methods on `Dataset`,
/// never from a reference a `Column` keeps for itself (Design Notes §9).
pub struct Dataset {
    path: PathBuf,
    manifest: Manifest,
    columns: BTreeMap<String, ColumnSlot>,
    pub watchers: WatcherRegistry,
    /// Advisory exclusive lock on `<path>/.lock`, held for the dataset's
    /// whole lifetime and released on drop. Opening the same dataset twice
    /// concurrently is documented as undefined (spec §5); this turns the
    /// undefined case into an explicit `StorageFailure` instead of letting
    /// two mappings silently race each other.
    _lock: File,
}

fn acquire_lock(dataset_path: &Path) -> Result<File> {
    let lock_path = dataset_path.join(LOCK_FILE);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(&lock_path)
        .map_err(|e| StoreError::StorageFailure(format!("open {}: {e}", lock_path.display())))?;
    file.try_lock_exclusive().map_err(|e| {
        StoreError::StorageFailure(format!(
            "dataset {} is already open in another process: {e}",
            dataset_path.display()
        ))
    })?;
    Ok(file)
}

/// Generates a fresh `ID_LEN`-character id from the file-system-safe
/// alphabet (spec §6), checked against `existing` for collisions. Used both
/// for column ids within a dataset and, by the server layer, for dataset
/// ids within the configured root.
pub(crate) fn random_id(existing: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let id: String = (0..ID_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        if !existing(&id) {
            return id;
        }
    }
}

impl Dataset {
    /// Creates the dataset directory at `path` and writes its manifest.
    /// Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>, name: String, length: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir(&path).map_err(|e| {
            StoreError::StorageFailure(format!("mkdir {}: {e}", path.display()))
        })?;
        let lock = acquire_lock(&path)?;
        let manifest = Manifest {
            name,
            length,
            columns: BTreeMap::new(),
        };
        let dataset = Self {
            path,
            manifest,
            columns: BTreeMap::new(),
            watchers: WatcherRegistry::new(),
            _lock: lock,
        };
        dataset.write_manifest()?;
        log::info!("created dataset at {}", dataset.path.display());
        Ok(dataset)
    }

    /// Opens an existing dataset, parsing its manifest. Column files are not
    /// mapped until first access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock = acquire_lock(&path)?;
        let manifest_path = path.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&manifest_path).map_err(|e| {
            StoreError::ManifestCorrupt(format!("read {}: {e}", manifest_path.display()))
        })?;
        let manifest: Manifest = serde_json::from_str(&raw).map_err(|e| {
            StoreError::ManifestCorrupt(format!("parse {}: {e}", manifest_path.display()))
        })?;
        let columns = manifest
            .columns
            .iter()
            .map(|(id, info)| {
                (
                    id.clone(),
                    ColumnSlot {
                        info: info.clone(),
                        backing: None,
                        generation: 0,
                    },
                )
            })
            .collect();
        log::info!("opened dataset at {} ({} columns)", path.display(), manifest.columns.len());
        Ok(Self {
            path,
            manifest,
            columns,
            watchers: WatcherRegistry::new(),
            _lock: lock,
        })
    }

    fn write_manifest(&self) -> Result<()> {
        let body = serde_json::to_vec_pretty(&self.manifest).map_err(|e| {
            StoreError::ManifestCorrupt(format!("serialize manifest: {e}"))
        })?;
        let final_path = self.path.join(MANIFEST_FILE);
        let tmp_path = self.path.join(format!("{MANIFEST_FILE}.tmp"));
        fs::write(&tmp_path, &body).map_err(|e| {
            StoreError::StorageFailure(format!("write {}: {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &final_path).map_err(|e| {
            StoreError::StorageFailure(format!("rename {}: {e}", final_path.display()))
        })?;
        Ok(())
    }

    fn column_path(&self, id: &str) -> PathBuf {
        self.path.join(id)
    }

    fn slot(&self, id: &str) -> Result<&ColumnSlot> {
        self.columns
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("column {id}")))
    }

    fn slot_mut(&mut self, id: &str) -> Result<&mut ColumnSlot> {
        self.columns
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("column {id}")))
    }

    /// Maps the column file on first access. A no-op once mapped.
    fn ensure_mapped(&mut self, id: &str) -> Result<()> {
        let length = self.manifest.length;
        let path = self.column_path(id);
        let slot = self.slot_mut(id)?;
        if slot.backing.is_some() {
            return Ok(());
        }
        let backing = match slot.info.kind {
            ColumnType::String => ColumnBacking::String(StringColumn::open(&path, length)?),
            ColumnType::Real => ColumnBacking::Real(RealColumn::open(&path, length)?),
        };
        slot.backing = Some(backing);
        Ok(())
    }

    /// Generates a fresh id, creates and maps the column file, and persists
    /// the updated manifest (spec §4.4).
    pub fn column_create(&mut self, name: String, kind: ColumnType) -> Result<String> {
        let id = random_id(|candidate| self.columns.contains_key(candidate));
        let path = self.column_path(&id);
        let backing = match kind {
            ColumnType::String => {
                ColumnBacking::String(StringColumn::create(&path, self.manifest.length)?)
            }
            ColumnType::Real => {
                ColumnBacking::Real(RealColumn::create(&path, self.manifest.length)?)
            }
        };
        let info = ColumnInfo {
            name,
            kind,
        };
        self.manifest.columns.insert(id.clone(), info.clone());
        self.write_manifest()?;
        self.columns.insert(
            id.clone(),
            ColumnSlot {
                info,
                backing: Some(backing),
                generation: 0,
            },
        );
        log::info!("created column {id} in dataset {}", self.path.display());
        Ok(id)
    }

    /// Maps the column's file if it isn't already, failing if `id` is unknown.
    pub fn column_open(&mut self, id: &str) -> Result<()> {
        self.ensure_mapped(id)
    }

    pub fn get_info(&self) -> &Manifest {
        &self.manifest
    }

    pub fn get_length(&self) -> usize {
        self.manifest.length
    }

    pub fn get_column_count(&self) -> usize {
        self.manifest.columns.len()
    }

    pub fn get_column_name(&self, id: &str) -> Result<&str> {
        Ok(self.slot(id)?.info.name.as_str())
    }

    pub fn get_column_type(&self, id: &str) -> Result<ColumnType> {
        Ok(self.slot(id)?.info.kind)
    }

    pub fn get_column_info(&self, id: &str) -> Result<&ColumnInfo> {
        Ok(&self.slot(id)?.info)
    }

    pub fn generation(&self, id: &str) -> Result<u64> {
        Ok(self.slot(id)?.generation)
    }

    /// Bumps and returns column `id`'s generation counter. Exposed to the
    /// server layer so a batch `column/values/set` call can bump it once
    /// per call rather than once per row (spec §4.5: "incremented on every
    /// notified mutation" — the notified mutation is the whole batch).
    pub(crate) fn bump_generation(&mut self, id: &str) -> Result<u64> {
        let slot = self.slot_mut(id)?;
        slot.generation += 1;
        Ok(slot.generation)
    }

    /// Reads the byte value at row `i` of a string column `id`. Out-of-range
    /// `i` returns an empty value, per `StringColumn::get_value` (spec §4.2).
    pub fn get_string(&mut self, id: &str, i: usize) -> Result<Vec<u8>> {
        self.ensure_mapped(id)?;
        let slot = self.slot_mut(id)?;
        match slot.backing.as_mut() {
            Some(ColumnBacking::String(col)) => {
                let mut out = Vec::new();
                col.get_value(i, &mut out);
                Ok(out)
            }
            _ => Err(StoreError::InvalidArgument(format!("column {id} is not a string column"))),
        }
    }

    /// Writes row `i` of string column `id`. Bumps and returns the column's
    /// generation counter (spec §4.5).
    pub fn set_string(&mut self, id: &str, i: usize, value: &[u8]) -> Result<u64> {
        self.ensure_mapped(id)?;
        {
            let slot = self.slot_mut(id)?;
            match slot.backing.as_mut() {
                Some(ColumnBacking::String(col)) => col.set(i, value)?,
                _ => {
                    return Err(StoreError::InvalidArgument(format!(
                        "column {id} is not a string column"
                    )))
                }
            }
        }
        self.bump_generation(id)
    }

    /// Reads row `i` of a real column `id`. `i` must already be validated
    /// against the dataset length by the caller: `RealColumn::get` has no
    /// bounds check of its own (spec §4.3).
    pub fn get_real(&mut self, id: &str, i: usize) -> Result<f64> {
        self.ensure_mapped(id)?;
        let slot = self.slot_mut(id)?;
        match slot.backing.as_ref() {
            Some(ColumnBacking::Real(col)) => Ok(col.get(i)),
            _ => Err(StoreError::InvalidArgument(format!("column {id} is not a real column"))),
        }
    }

    /// Writes row `i` of real column `id`. Same caller-validated bounds
    /// contract as [`Self::get_real`].
    pub fn set_real(&mut self, id: &str, i: usize, value: f64) -> Result<u64> {
        self.ensure_mapped(id)?;
        {
            let slot = self.slot_mut(id)?;
            match slot.backing.as_mut() {
                Some(ColumnBacking::Real(col)) => col.set(i, value)?,
                _ => {
                    return Err(StoreError::InvalidArgument(format!(
                        "column {id} is not a real column"
                    )))
                }
            }
        }
        self.bump_generation(id)
    }

    /// Writes `values[k]` to row `indices[k]` of string column `id` for
    /// every `k`, without touching the generation counter. Used by the
    /// server layer for the indices-omitted `column/values/set` form, which
    /// spec §6 documents as returning `null` (no generation, no notification).
    pub fn set_string_rows(&mut self, id: &str, indices: &[usize], values: &[Vec<u8>]) -> Result<()> {
        self.ensure_mapped(id)?;
        let slot = self.slot_mut(id)?;
        match slot.backing.as_mut() {
            Some(ColumnBacking::String(col)) => {
                for (i, v) in indices.iter().zip(values) {
                    col.set(*i, v)?;
                }
                Ok(())
            }
            _ => Err(StoreError::InvalidArgument(format!("column {id} is not a string column"))),
        }
    }

    /// Real-column counterpart of [`Self::set_string_rows`].
    pub fn set_real_rows(&mut self, id: &str, indices: &[usize], values: &[f64]) -> Result<()> {
        self.ensure_mapped(id)?;
        let slot = self.slot_mut(id)?;
        match slot.backing.as_mut() {
            Some(ColumnBacking::Real(col)) => {
                for (i, v) in indices.iter().zip(values) {
                    col.set(*i, *v)?;
                }
                Ok(())
            }
            _ => Err(StoreError::InvalidArgument(format!("column {id} is not a real column"))),
        }
    }

    /// Reads `indices` from string column `id`, in order.
    pub fn get_string_rows(&mut self, id: &str, indices: &[usize]) -> Result<Vec<Vec<u8>>> {
        self.ensure_mapped(id)?;
        let slot = self.slot_mut(id)?;
        match slot.backing.as_mut() {
            Some(ColumnBacking::String(col)) => {
                let mut out = Vec::with_capacity(indices.len());
                for &i in indices {
                    let mut buf = Vec::new();
                    col.get_value(i, &mut buf);
                    out.push(buf);
                }
                Ok(out)
            }
            _ => Err(StoreError::InvalidArgument(format!("column {id} is not a string column"))),
        }
    }

    /// Real-column counterpart of [`Self::get_string_rows`].
    pub fn get_real_rows(&mut self, id: &str, indices: &[usize]) -> Result<Vec<f64>> {
        self.ensure_mapped(id)?;
        let slot = self.slot_mut(id)?;
        match slot.backing.as_ref() {
            Some(ColumnBacking::Real(col)) => Ok(indices.iter().map(|&i| col.get(i)).collect()),
            _ => Err(StoreError::InvalidArgument(format!("column {id} is not a real column"))),
        }
    }
}
