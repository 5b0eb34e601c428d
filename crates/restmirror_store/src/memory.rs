//! In-memory document store with live queries.

use crate::error::{StoreError, StoreResult};
use crate::record::{Record, RecordPatch};
use crate::selector::Selector;
use crate::store::{Change, Decide, DocumentStore, LiveRecord, LiveRecords};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::debug;

enum Watcher {
    One {
        key: String,
        tx: watch::Sender<Option<Record>>,
    },
    Many {
        selector: Selector,
        tx: watch::Sender<Vec<Record>>,
    },
}

impl Watcher {
    fn is_closed(&self) -> bool {
        match self {
            Watcher::One { tx, .. } => tx.is_closed(),
            Watcher::Many { tx, .. } => tx.is_closed(),
        }
    }

    /// Re-evaluates the watcher after `changed` was written or removed.
    fn refresh(&self, records: &BTreeMap<String, Record>, changed: &str) {
        match self {
            Watcher::One { key, tx } => {
                if key != changed {
                    return;
                }
                let next = records.get(key).cloned();
                tx.send_if_modified(|current| replace_if_changed(current, next));
            }
            Watcher::Many { selector, tx } => {
                let next = selector.apply(records.values());
                tx.send_if_modified(|current| replace_if_changed(current, next));
            }
        }
    }
}

fn replace_if_changed<T: PartialEq>(current: &mut T, next: T) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

/// An in-memory [`DocumentStore`].
///
/// Records live in a key-ordered map. Every mutation re-evaluates the
/// open live queries and wakes only those whose result changed; watchers
/// whose receivers were all dropped are pruned on the same pass.
///
/// # Thread Safety
///
/// Writes are serialized per store. Locks are always taken records first,
/// then watchers.
///
/// # Example
///
/// ```rust
/// use restmirror_store::{DocumentStore, MemoryStore, Record};
///
/// let store = MemoryStore::new("items");
/// let live = store.find_one("t____/items/1/").unwrap();
/// assert!(live.borrow().is_none());
///
/// store.upsert(Record::synced("t____/items/1/", None, 0)).unwrap();
/// assert!(live.borrow().is_some());
/// ```
pub struct MemoryStore {
    name: String,
    records: RwLock<BTreeMap<String, Record>>,
    watchers: Mutex<Vec<Watcher>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(BTreeMap::new()),
            watchers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a store pre-filled with `records`.
    #[must_use]
    pub fn with_records(name: impl Into<String>, records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new(name);
        {
            let mut map = store.records.write();
            for record in records {
                map.insert(record.key.clone(), record);
            }
        }
        store
    }

    /// Returns the number of live queries still held by someone.
    pub fn watcher_count(&self) -> usize {
        let mut watchers = self.watchers.lock();
        watchers.retain(|w| !w.is_closed());
        watchers.len()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn notify(&self, records: &BTreeMap<String, Record>, changed: &str) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|watcher| {
            if watcher.is_closed() {
                return false;
            }
            watcher.refresh(records, changed);
            true
        });
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("records", &self.records.read().len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn upsert(&self, record: Record) -> StoreResult<Record> {
        self.ensure_open()?;
        let mut records = self.records.write();
        let key = record.key.clone();
        records.insert(key.clone(), record.clone());
        self.notify(&records, &key);
        Ok(record)
    }

    fn patch(&self, key: &str, patch: RecordPatch) -> StoreResult<Record> {
        self.ensure_open()?;
        let mut records = self.records.write();
        let record = records.get_mut(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        patch.apply(record);
        let updated = record.clone();
        self.notify(&records, key);
        Ok(updated)
    }

    fn update(&self, key: &str, decide: Decide<'_>) -> StoreResult<Option<Record>> {
        self.ensure_open()?;
        let mut records = self.records.write();
        match decide(records.get(key)) {
            Change::Keep => Ok(records.get(key).cloned()),
            Change::Upsert(mut record) => {
                record.key = key.to_string();
                records.insert(record.key.clone(), record.clone());
                self.notify(&records, key);
                Ok(Some(record))
            }
            Change::Remove => {
                if records.remove(key).is_some() {
                    self.notify(&records, key);
                }
                Ok(None)
            }
        }
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let mut records = self.records.write();
        let removed = records.remove(key).is_some();
        if removed {
            self.notify(&records, key);
        }
        Ok(removed)
    }

    fn get(&self, key: &str) -> StoreResult<Option<Record>> {
        self.ensure_open()?;
        Ok(self.records.read().get(key).cloned())
    }

    fn snapshot(&self, selector: &Selector) -> StoreResult<Vec<Record>> {
        self.ensure_open()?;
        Ok(selector.apply(self.records.read().values()))
    }

    fn find_one(&self, key: &str) -> StoreResult<LiveRecord> {
        self.ensure_open()?;
        let records = self.records.read();
        let (tx, rx) = watch::channel(records.get(key).cloned());
        self.watchers.lock().push(Watcher::One {
            key: key.to_string(),
            tx,
        });
        Ok(rx)
    }

    fn find(&self, selector: &Selector) -> StoreResult<LiveRecords> {
        self.ensure_open()?;
        let records = self.records.read();
        let (tx, rx) = watch::channel(selector.apply(records.values()));
        self.watchers.lock().push(Watcher::Many {
            selector: selector.clone(),
            tx,
        });
        Ok(rx)
    }

    fn len(&self) -> StoreResult<usize> {
        self.ensure_open()?;
        Ok(self.records.read().len())
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Dropping the senders ends every live query.
        self.watchers.lock().clear();
        debug!(store = %self.name, "Store closed");
        Ok(())
    }
}
