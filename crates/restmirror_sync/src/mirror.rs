//! The local mirror of one REST resource.

use crate::config::RetentionPolicy;
use crate::error::{SyncError, SyncResult};
use crate::live::{LiveGet, LiveList, SubscriptionCache};
use crate::outbox::OutboxEntry;
use crate::transition::{self, WriteOptions};
use restmirror_query::{Page, Query, QueryParams};
use restmirror_store::{
    Change, Clock, DocumentStore, Record, Selector, StoreRegistry, SystemClock,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Separates the tenant from the URL in record keys.
pub const TENANT_SEPARATOR: &str = "____";

/// Local cache for one resource.
///
/// Maps `(tenant, url)` pairs to store keys, serves reads from the store,
/// and records local writes as dirty records for the outbox. It never
/// talks to the network.
///
/// # Example
///
/// ```rust
/// use restmirror_store::{Method, StoreRegistry};
/// use restmirror_sync::LocalMirror;
/// use serde_json::json;
///
/// let registry = StoreRegistry::new();
/// let mirror = LocalMirror::open(&registry, "items");
///
/// mirror.create("acme", "/items/1/", json!({"name": "a"})).unwrap();
/// let record = mirror.get("acme", "/items/1/").unwrap().unwrap();
/// assert_eq!(record.method(), Method::Post);
/// ```
pub struct LocalMirror {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    records: SubscriptionCache<Option<Record>>,
    lists: SubscriptionCache<Vec<Record>>,
}

impl LocalMirror {
    /// Creates a mirror over `store` using the system clock.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            records: SubscriptionCache::new(),
            lists: SubscriptionCache::new(),
        }
    }

    /// Creates a mirror over the registry's store named `name`.
    pub fn open(registry: &StoreRegistry, name: &str) -> Self {
        Self::new(registry.open(name))
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the resource (store) name.
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Returns the mirror's clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the current time in milliseconds.
    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Returns the store key for `(tenant, url)`.
    pub fn key_for(tenant: &str, url: &str) -> String {
        format!("{}{}{}", tenant, TENANT_SEPARATOR, url)
    }

    /// Reads one record. A missing record is `None`, not an error.
    pub fn get(&self, tenant: &str, url: &str) -> SyncResult<Option<Record>> {
        Ok(self.store.get(&Self::key_for(tenant, url))?)
    }

    /// Subscribes to one record. Callers for the same `(tenant, url)` share
    /// a single store subscription.
    pub fn get_reactive(&self, tenant: &str, url: &str) -> SyncResult<LiveGet> {
        let key = Self::key_for(tenant, url);
        let live = self
            .records
            .get_or_subscribe(format!("get__{}{}", tenant, url), || {
                self.store.find_one(&key)
            })?;
        Ok(live)
    }

    /// Lists the collection at `url`, shaped by the allowed query params.
    ///
    /// Cursors are synthesized locally against the filtered length.
    pub fn list<S: AsRef<str>>(
        &self,
        tenant: &str,
        url: &str,
        params: &QueryParams,
        allowed: &[S],
    ) -> SyncResult<Page<Record>> {
        let params = params.allowed(allowed);
        let query = Query::parse(&params);
        let records = self
            .store
            .snapshot(&Selector::prefix(Self::key_for(tenant, url)))?;
        Ok(query.run(&records, url, &params))
    }

    /// Subscribes to the collection at `url`.
    ///
    /// The collection subscription is shared per `(tenant, url)`; each
    /// handle applies its own query when read.
    pub fn list_reactive<S: AsRef<str>>(
        &self,
        tenant: &str,
        url: &str,
        params: &QueryParams,
        allowed: &[S],
    ) -> SyncResult<LiveList> {
        let params = params.allowed(allowed);
        let prefix = Self::key_for(tenant, url);
        let live = self
            .lists
            .get_or_subscribe(format!("list__{}{}", tenant, url), || {
                self.store.find(&Selector::prefix(prefix))
            })?;
        Ok(LiveList::new(live, Query::parse(&params), url.to_string(), params))
    }

    /// Returns the number of shared subscriptions still held by callers.
    pub fn live_subscriptions(&self) -> usize {
        self.records.len() + self.lists.len()
    }

    /// Records a local create (POST).
    pub fn create(&self, tenant: &str, url: &str, data: Value) -> SyncResult<Record> {
        self.create_with(tenant, url, data, WriteOptions::default())
    }

    /// Records a local create with replay metadata.
    pub fn create_with(
        &self,
        tenant: &str,
        url: &str,
        data: Value,
        options: WriteOptions,
    ) -> SyncResult<Record> {
        let key = Self::key_for(tenant, url);
        let now = self.now();
        let stored = transition::apply(self.store.as_ref(), &key, |existing| {
            Ok(Change::Upsert(transition::create(existing, &key, data, options, now)))
        })?;
        debug!(key = %key, "Local create");
        stored.ok_or(SyncError::LocalNotFound { key })
    }

    /// Records a local update.
    pub fn update(&self, tenant: &str, url: &str, data: Value) -> SyncResult<Record> {
        self.update_with(tenant, url, data, WriteOptions::default())
    }

    /// Records a local update with replay metadata.
    pub fn update_with(
        &self,
        tenant: &str,
        url: &str,
        data: Value,
        options: WriteOptions,
    ) -> SyncResult<Record> {
        let key = Self::key_for(tenant, url);
        let now = self.now();
        let stored = transition::apply(self.store.as_ref(), &key, |existing| {
            Ok(Change::Upsert(transition::update(existing, &key, data, options, now)))
        })?;
        let record = stored.ok_or(SyncError::LocalNotFound { key })?;
        debug!(key = %record.key, method = %record.method(), "Local update");
        Ok(record)
    }

    /// Records a local delete.
    ///
    /// Returns the pending DELETE record, or `None` when the record never
    /// reached the server and was removed outright.
    pub fn delete(&self, tenant: &str, url: &str) -> SyncResult<Option<Record>> {
        self.delete_with(tenant, url, WriteOptions::default())
    }

    /// Records a local delete with replay metadata.
    pub fn delete_with(
        &self,
        tenant: &str,
        url: &str,
        options: WriteOptions,
    ) -> SyncResult<Option<Record>> {
        let key = Self::key_for(tenant, url);
        let now = self.now();
        let stored = transition::apply(self.store.as_ref(), &key, |existing| {
            transition::delete(existing, &key, options, now).map(Change::from)
        })?;
        debug!(key = %key, "Local delete");
        Ok(stored)
    }

    /// Re-queues a stuck PUT or DELETE as a fresh create.
    pub fn create_new(&self, tenant: &str, url: &str) -> SyncResult<Record> {
        let key = Self::key_for(tenant, url);
        let now = self.now();
        let stored = transition::apply(self.store.as_ref(), &key, |existing| {
            transition::create_new(existing, &key, now).map(Change::Upsert)
        })?;
        debug!(key = %key, "Conflict re-queued as create");
        stored.ok_or(SyncError::LocalNotFound { key })
    }

    /// Discards a dirty record locally.
    pub fn delete_conflict(&self, tenant: &str, url: &str) -> SyncResult<()> {
        let key = Self::key_for(tenant, url);
        transition::apply(self.store.as_ref(), &key, |existing| {
            transition::delete_conflict(existing, &key).map(Change::from)
        })?;
        debug!(key = %key, "Conflict discarded");
        Ok(())
    }

    /// Stores a network result as a synced record.
    ///
    /// A dirty local record wins: it is returned untouched.
    pub fn store_remote(&self, tenant: &str, url: &str, data: Value) -> SyncResult<Record> {
        let key = Self::key_for(tenant, url);
        let now = self.now();
        let mut kept_local = false;
        let stored = transition::apply(self.store.as_ref(), &key, |existing| {
            Ok(match transition::store_remote(existing, &key, data, now) {
                Some(record) => Change::Upsert(record),
                None => {
                    kept_local = true;
                    Change::Keep
                }
            })
        })?;
        if kept_local {
            debug!(key = %key, "Keeping dirty local record over network copy");
        }
        stored.ok_or(SyncError::LocalNotFound { key })
    }

    /// Returns the outbox registration for this mirror.
    pub fn registration(&self, retention: RetentionPolicy) -> OutboxEntry {
        OutboxEntry::new(Arc::clone(&self.store), retention)
    }
}

impl std::fmt::Debug for LocalMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMirror")
            .field("name", &self.name())
            .field("live_subscriptions", &self.live_subscriptions())
            .finish()
    }
}
