//! Subscriber bookkeeping for dataset- and column-level change notifications
//! (spec §4.5).

use fnv::{FnvHashMap, FnvHashSet};

/// Which subscriber set an `add` call targets.
pub enum Scope<'a> {
    Dataset,
    Column(&'a str),
}

/// Per-dataset and per-column subscriber sets, keyed by opaque token (the
/// request layer's client id). Keys are short ids, not attacker-controlled
/// at any untrusted boundary, so `fnv`'s faster non-cryptographic hash
/// replaces the default hasher here, same role it plays for checksums in
/// the teacher crate's `meta` module.
#[derive(Default)]
pub struct WatcherRegistry {
    dataset: FnvHashSet<String>,
    columns: FnvHashMap<String, FnvHashSet<String>>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, scope: Scope, token: &str) {
        match scope {
            Scope::Dataset => {
                self.dataset.insert(token.to_string());
            }
            Scope::Column(id) => {
                self.columns
                    .entry(id.to_string())
                    .or_default()
                    .insert(token.to_string());
            }
        }
    }

    /// Drops `token` from the dataset set and from every column's set.
    pub fn remove(&mut self, token: &str) {
        self.dataset.remove(token);
        for set in self.columns.values_mut() {
            set.remove(token);
        }
    }

    /// Drops a single token from one column's set, leaving the dataset set
    /// and every other column's set untouched (`column/close`).
    pub fn remove_from_column(&mut self, id: &str, token: &str) {
        if let Some(set) = self.columns.get_mut(id) {
            set.remove(token);
        }
    }

    /// Drops a single token from the dataset set, leaving every column's
    /// set untouched (`dataset/close`).
    pub fn remove_from_dataset(&mut self, token: &str) {
        self.dataset.remove(token);
    }

    /// Visits every dataset subscriber except `exclude`.
    pub fn foreach_dataset(&self, exclude: &str, mut visit: impl FnMut(&str)) {
        for token in &self.dataset {
            if token != exclude {
                visit(token);
            }
        }
    }

    /// Visits every subscriber of column `id` except `exclude`.
    pub fn foreach_column(&self, id: &str, exclude: &str, mut visit: impl FnMut(&str)) {
        if let Some(set) = self.columns.get(id) {
            for token in set {
                if token != exclude {
                    visit(token);
                }
            }
        }
    }
}
