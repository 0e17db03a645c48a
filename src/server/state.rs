//! `ServerState`: the explicit, passed-by-reference replacement for the
//! original's process-wide dataset/client/method maps (Design Notes §9).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use fnv::FnvHashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::dataset::{random_id, Dataset};
use crate::errors::{Result, StoreError};
use crate::watcher::Scope;

/// A connected client's push channel: frames sent here are written to its
/// socket by that connection's writer task, whether they are this client's
/// own responses or a notification fanned out from someone else's mutation.
pub type ClientSender = mpsc::UnboundedSender<Bytes>;

/// Everything the dispatch table needs that is global to the server rather
/// than scoped to one connection: the dataset map and the live client
/// registry used for notification delivery.
pub struct ServerState {
    root: PathBuf,
    datasets: BTreeMap<String, Dataset>,
    clients: FnvHashMap<String, ClientSender>,
}

/// Per-connection state: which client this is, and which dataset (if any)
/// is "current" on this connection — the original's single `client_t ::
/// Dataset` pointer, generalized to an id lookup against `ServerState`
/// (SPEC_FULL §10.5).
pub struct ClientState {
    pub id: String,
    pub current_dataset: Option<String>,
}

impl ServerState {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            datasets: BTreeMap::new(),
            clients: FnvHashMap::default(),
        }
    }

    /// Walks `root`, opening every subdirectory as a dataset keyed by its
    /// directory name (SPEC_FULL §10.5's `datasets_load`). A subdirectory
    /// that fails to open as a dataset is logged and skipped, not fatal —
    /// unlike the missing-root case, which is the caller's problem.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut state = Self::new(root.clone());
        let entries = std::fs::read_dir(&root).map_err(|e| {
            StoreError::StorageFailure(format!("read dataset root {}: {e}", root.display()))
        })?;
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("skipping unreadable directory entry in {}: {e}", root.display());
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }
            match Dataset::open(&path) {
                Ok(dataset) => {
                    log::info!("loaded dataset {id} from {}", path.display());
                    state.datasets.insert(id.to_string(), dataset);
                }
                Err(e) => {
                    log::warn!("skipping {} as a dataset: {e}", path.display());
                }
            }
        }
        Ok(state)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn register_client(&mut self, id: String, sender: ClientSender) {
        self.clients.insert(id, sender);
    }

    /// Drops `id` from the client registry and from every dataset's and
    /// column's subscriber sets (connection close).
    pub fn forget_client(&mut self, id: &str) {
        self.clients.remove(id);
        for dataset in self.datasets.values_mut() {
            dataset.watchers.remove(id);
        }
    }

    pub fn dataset(&self, id: &str) -> Result<&Dataset> {
        self.datasets.get(id).ok_or_else(|| StoreError::NotFound(format!("dataset {id}")))
    }

    pub fn dataset_mut(&mut self, id: &str) -> Result<&mut Dataset> {
        self.datasets.get_mut(id).ok_or_else(|| StoreError::NotFound(format!("dataset {id}")))
    }

    pub fn list_datasets(&self) -> Value {
        let entries: Vec<Value> = self
            .datasets
            .iter()
            .map(|(id, ds)| json!({ "id": id, "info": ds.get_info() }))
            .collect();
        Value::Array(entries)
    }

    /// Creates a fresh dataset directory under `root`, with a generated id
    /// collision-checked against the currently loaded set (mirrors
    /// `Dataset::column_create`'s id generation one level up).
    pub fn create_dataset(&mut self, name: String, length: usize) -> Result<String> {
        let id = random_id(|candidate| self.datasets.contains_key(candidate));
        let path = self.root.join(&id);
        let dataset = Dataset::create(path, name, length)?;
        self.datasets.insert(id.clone(), dataset);
        Ok(id)
    }

    fn send_to(&self, token: &str, payload: Vec<u8>) {
        if let Some(sender) = self.clients.get(token) {
            if sender.send(Bytes::from(payload)).is_err() {
                log::warn!("dropping notification for disconnected client {token}");
            }
        }
    }

    /// Fans a `column/created` notification out to every dataset subscriber
    /// except `exclude` (spec §4.5).
    pub fn notify_column_created(&self, dataset_id: &str, exclude: &str, column_id: &str, column_info: Value) {
        let Ok(dataset) = self.dataset(dataset_id) else { return };
        let payload = super::wire::build_notification(
            "column/created",
            json!([column_id, column_info]),
        );
        dataset.watchers.foreach_dataset(exclude, |token| self.send_to(token, payload.clone()));
    }

    /// Fans a `column/values/set` notification out to every column
    /// subscriber except `exclude` (spec §4.5).
    pub fn notify_values_set(
        &self,
        dataset_id: &str,
        column_id: &str,
        exclude: &str,
        generation: u64,
        indices: &[usize],
        values: &Value,
    ) {
        let Ok(dataset) = self.dataset(dataset_id) else { return };
        let payload = super::wire::build_notification(
            "column/values/set",
            json!([column_id, generation, indices, values]),
        );
        dataset
            .watchers
            .foreach_column(column_id, exclude, |token| self.send_to(token, payload.clone()));
    }

    pub fn subscribe_dataset(&mut self, dataset_id: &str, token: &str) -> Result<()> {
        self.dataset_mut(dataset_id)?.watchers.add(Scope::Dataset, token);
        Ok(())
    }

    pub fn subscribe_column(&mut self, dataset_id: &str, column_id: &str, token: &str) -> Result<()> {
        self.dataset_mut(dataset_id)?.watchers.add(Scope::Column(column_id), token);
        Ok(())
    }

    pub fn unsubscribe_dataset(&mut self, dataset_id: &str, token: &str) -> Result<()> {
        self.dataset_mut(dataset_id)?.watchers.remove_from_dataset(token);
        Ok(())
    }

    pub fn unsubscribe_column(&mut self, dataset_id: &str, column_id: &str, token: &str) -> Result<()> {
        self.dataset_mut(dataset_id)?.watchers.remove_from_column(column_id, token);
        Ok(())
    }
}
