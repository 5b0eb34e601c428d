//! Shared live reads.
//!
//! Callers reading the same `(tenant, url)` share one store subscription.
//! The cache holds only weak handles: when the last [`Live`] handle for a
//! key is dropped, the shared subscription is released and its entry is
//! removed.

use parking_lot::Mutex;
use restmirror_query::{Page, Query, QueryParams};
use restmirror_store::{Record, StoreResult};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

type Entries<T> = Mutex<HashMap<String, Weak<Shared<T>>>>;

struct Shared<T> {
    key: String,
    rx: watch::Receiver<T>,
    entries: Weak<Entries<T>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let Some(entries) = self.entries.upgrade() else {
            return;
        };
        let mut entries = entries.lock();
        // A new subscriber may already have replaced the entry.
        if entries
            .get(&self.key)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            entries.remove(&self.key);
        }
    }
}

/// A reference-counted cache of live subscriptions keyed by string.
pub(crate) struct SubscriptionCache<T> {
    entries: Arc<Entries<T>>,
}

impl<T> SubscriptionCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the shared handle for `key`, subscribing on first use.
    pub(crate) fn get_or_subscribe<F>(&self, key: String, subscribe: F) -> StoreResult<Live<T>>
    where
        F: FnOnce() -> StoreResult<watch::Receiver<T>>,
    {
        let mut entries = self.entries.lock();
        if let Some(shared) = entries.get(&key).and_then(Weak::upgrade) {
            let rx = shared.rx.clone();
            return Ok(Live { shared, rx });
        }

        let rx = subscribe()?;
        let shared = Arc::new(Shared {
            key: key.clone(),
            rx: rx.clone(),
            entries: Arc::downgrade(&self.entries),
        });
        entries.insert(key, Arc::downgrade(&shared));
        Ok(Live { shared, rx })
    }

    /// Returns the number of keys with at least one live handle.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// A handle on a shared live value.
///
/// Each handle tracks its own "seen" version, so [`changed`](Self::changed)
/// works independently per handle while the underlying subscription is
/// shared.
pub struct Live<T> {
    shared: Arc<Shared<T>>,
    rx: watch::Receiver<T>,
}

impl<T> Live<T> {
    /// Borrows the current value.
    pub fn borrow(&self) -> watch::Ref<'_, T> {
        self.rx.borrow()
    }

    /// Waits until the value changes after the last call.
    ///
    /// # Errors
    ///
    /// Fails once the store closes the subscription.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }

    /// Returns true if the value changed since it was last seen.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Returns the cache key this handle shares.
    pub fn key(&self) -> &str {
        &self.shared.key
    }

    /// Returns how many handles share this subscription.
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Returns true if both handles share one subscription.
    pub fn shares_with(&self, other: &Live<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T: Clone> Live<T> {
    /// Returns a copy of the current value and marks it seen.
    pub fn get(&mut self) -> T {
        self.rx.borrow_and_update().clone()
    }
}

impl<T> Clone for Live<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            rx: self.rx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Live<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Live")
            .field("key", &self.shared.key)
            .field("shares", &self.share_count())
            .finish()
    }
}

/// A live single-record read.
pub type LiveGet = Live<Option<Record>>;

/// A live list read: a shared collection subscription plus this caller's
/// query, applied whenever the page is read.
#[derive(Clone, Debug)]
pub struct LiveList {
    records: Live<Vec<Record>>,
    query: Query,
    base_url: String,
    params: QueryParams,
}

impl LiveList {
    pub(crate) fn new(
        records: Live<Vec<Record>>,
        query: Query,
        base_url: String,
        params: QueryParams,
    ) -> Self {
        Self {
            records,
            query,
            base_url,
            params,
        }
    }

    /// Evaluates the query against the current collection.
    pub fn page(&self) -> Page<Record> {
        let records = self.records.borrow();
        self.query.run(&records, &self.base_url, &self.params)
    }

    /// Waits until the collection changes.
    ///
    /// # Errors
    ///
    /// Fails once the store closes the subscription.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.records.changed().await
    }

    /// Returns true if the collection changed since it was last seen.
    pub fn has_changed(&self) -> bool {
        self.records.has_changed()
    }

    /// Returns the underlying shared handle.
    pub fn records(&self) -> &Live<Vec<Record>> {
        &self.records
    }
}
