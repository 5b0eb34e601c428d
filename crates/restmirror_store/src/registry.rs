//! Shared store handles.

use crate::error::StoreResult;
use crate::memory::MemoryStore;
use crate::snapshot::{self, LoadReport};
use crate::store::DocumentStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const SNAPSHOT_EXTENSION: &str = "jsonl";

/// Maps store names to shared handles.
///
/// Whoever owns the root store connection creates one registry and passes
/// it to every mirror that should share stores. Handles live until
/// [`close`](Self::close) or [`shutdown`](Self::shutdown).
#[derive(Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Arc<dyn DocumentStore>>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store named `name`, creating a [`MemoryStore`] if absent.
    pub fn open(&self, name: &str) -> Arc<dyn DocumentStore> {
        if let Some(store) = self.stores.read().get(name) {
            return Arc::clone(store);
        }
        let mut stores = self.stores.write();
        let store = stores.entry(name.to_string()).or_insert_with(|| {
            debug!(store = name, "Opening memory store");
            let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new(name));
            store
        });
        Arc::clone(store)
    }

    /// Registers an externally built store, replacing any previous handle.
    pub fn insert(&self, store: Arc<dyn DocumentStore>) -> Option<Arc<dyn DocumentStore>> {
        let name = store.name().to_string();
        self.stores.write().insert(name, store)
    }

    /// Returns the store named `name` without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DocumentStore>> {
        self.stores.read().get(name).cloned()
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Closes and forgets one store. Returns false if it was not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to close.
    pub fn close(&self, name: &str) -> StoreResult<bool> {
        let removed = self.stores.write().remove(name);
        match removed {
            Some(store) => {
                store.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes and forgets every store.
    ///
    /// # Errors
    ///
    /// Returns the first close error; remaining stores are still closed.
    pub fn shutdown(&self) -> StoreResult<()> {
        let stores: Vec<_> = self.stores.write().drain().collect();
        let mut first_err = None;
        for (name, store) in stores {
            if let Err(err) = store.close() {
                first_err.get_or_insert(err);
            }
            debug!(store = %name, "Store released");
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Saves every store to `<dir>/<name>.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an error if any snapshot cannot be written.
    pub fn persist(&self, dir: &Path) -> StoreResult<usize> {
        fs::create_dir_all(dir)?;
        let stores: Vec<_> = self
            .stores
            .read()
            .iter()
            .map(|(name, store)| (name.clone(), Arc::clone(store)))
            .collect();

        let mut total = 0;
        for (name, store) in stores {
            let path = dir.join(format!("{}.{}", name, SNAPSHOT_EXTENSION));
            total += snapshot::save(store.as_ref(), &path)?;
        }
        info!(dir = %dir.display(), records = total, "Registry persisted");
        Ok(total)
    }

    /// Loads every `<dir>/*.jsonl` snapshot into the store of that name.
    ///
    /// Existing stores are reused, so records merge into them by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a snapshot cannot be read.
    pub fn restore(&self, dir: &Path) -> StoreResult<LoadReport> {
        let mut total = LoadReport::default();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXTENSION))
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let store = self.open(name);
            let report = snapshot::load_into(store.as_ref(), &path)?;
            total.loaded += report.loaded;
            total.skipped += report.skipped;
        }
        info!(
            dir = %dir.display(),
            loaded = total.loaded,
            skipped = total.skipped,
            "Registry restored"
        );
        Ok(total)
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.names())
            .finish()
    }
}
