//! Outbox synchronizer.
//!
//! Replays dirty records against the remote API, one request at a time,
//! in global time order across every registered mirror. A failed replay
//! records its error on the record and pauses the queue until
//! [`OutboxSynchronizer::start_sync`] is called again.

use crate::config::{OutboxConfig, RetentionPolicy};
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteClient, RequestBody};
use crate::transition::{self, Transition};
use parking_lot::{Mutex, RwLock};
use restmirror_query::QueryParams;
use restmirror_store::{
    parent_path, Change, Clock, DocumentStore, Method, MethodFilter, Record, Selector, SyncState,
    SystemClock, TimeOrder,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A mirror registered with the synchronizer.
#[derive(Clone)]
pub struct OutboxEntry {
    store: Arc<dyn DocumentStore>,
    retention: RetentionPolicy,
}

impl OutboxEntry {
    /// Creates an entry for `store`.
    pub fn new(store: Arc<dyn DocumentStore>, retention: RetentionPolicy) -> Self {
        Self { store, retention }
    }

    /// Returns the resource name.
    pub fn resource_name(&self) -> &str {
        self.store.name()
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Returns the retention policy.
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }
}

impl std::fmt::Debug for OutboxEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxEntry")
            .field("resource_name", &self.resource_name())
            .field("retention", &self.retention)
            .finish()
    }
}

/// A dirty record and the mirror it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    /// Resource name of the owning mirror.
    pub resource: String,
    /// The dirty record.
    pub record: Record,
}

/// Sorts dirty records into replay order: oldest first, ties by key.
pub fn replay_order(pending: &mut [PendingRecord]) {
    pending.sort_by(|a, b| {
        a.record
            .time
            .cmp(&b.record.time)
            .then_with(|| a.record.key.cmp(&b.record.key))
    });
}

/// The current state of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxState {
    /// Ready to replay.
    Idle,
    /// A request is in flight.
    Replaying,
    /// Stopped by `stop_sync`.
    Paused,
    /// Stopped by a failed replay.
    Halted,
}

impl OutboxState {
    /// Returns true if replay can proceed.
    pub fn can_replay(&self) -> bool {
        matches!(self, OutboxState::Idle)
    }
}

/// Statistics about replay and retention.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Records that became synced.
    pub replayed: u64,
    /// Records removed after a successful DELETE.
    pub removed: u64,
    /// Failed replays.
    pub failures: u64,
    /// Records removed by eviction.
    pub evicted: u64,
    /// Records removed by skip-trim.
    pub trimmed: u64,
    /// Last successful replay.
    pub last_sync_time: Option<Instant>,
    /// Last replay failure.
    pub last_error: Option<String>,
}

/// Result of draining the outbox.
#[derive(Debug, Clone, Default)]
pub struct SyncCycleResult {
    /// Records that became synced.
    pub replayed: u64,
    /// Records removed after a successful DELETE.
    pub removed: u64,
    /// Duration of the cycle.
    pub duration: Duration,
}

/// What a single replay step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The head record was sent and is now synced (or was rewritten
    /// locally while in flight).
    Replayed {
        /// The record key.
        key: String,
    },
    /// The head record was a DELETE and is gone.
    Removed {
        /// The record key.
        key: String,
    },
    /// Nothing to replay.
    Idle,
    /// Replay is paused or halted.
    Paused,
    /// Another replay is in flight.
    Busy,
}

/// The outbox synchronizer.
///
/// # Example
///
/// ```rust
/// use restmirror_store::{Method, StoreRegistry};
/// use restmirror_sync::{LocalMirror, MockRemote, OutboxSynchronizer, RetentionPolicy};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let registry = StoreRegistry::new();
/// let mirror = LocalMirror::open(&registry, "items");
/// let remote = Arc::new(MockRemote::new());
/// remote.respond(Method::Post, "/items/", json!({"id": 1}));
///
/// let outbox = OutboxSynchronizer::new(remote.clone());
/// outbox.register(mirror.registration(RetentionPolicy::default()));
///
/// mirror.create("acme", "/items/1/", json!({"name": "a"})).unwrap();
/// let result = outbox.sync().unwrap();
/// assert_eq!(result.replayed, 1);
/// assert_eq!(mirror.get("acme", "/items/1/").unwrap().unwrap().method(), Method::Get);
/// ```
pub struct OutboxSynchronizer<R: RemoteClient> {
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    config: OutboxConfig,
    entries: RwLock<Vec<OutboxEntry>>,
    trigger: watch::Sender<bool>,
    halted: AtomicBool,
    in_flight: Mutex<()>,
    stats: RwLock<SyncStats>,
}

impl<R: RemoteClient> OutboxSynchronizer<R> {
    /// Creates a synchronizer with the default configuration.
    pub fn new(remote: Arc<R>) -> Self {
        Self::with_config(remote, OutboxConfig::default())
    }

    /// Creates a synchronizer with the given configuration.
    pub fn with_config(remote: Arc<R>, config: OutboxConfig) -> Self {
        let (trigger, _) = watch::channel(!config.start_paused);
        Self {
            remote,
            clock: Arc::new(SystemClock),
            config,
            entries: RwLock::new(Vec::new()),
            trigger,
            halted: AtomicBool::new(false),
            in_flight: Mutex::new(()),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// Registers a mirror. A registration with the same resource name is
    /// replaced.
    pub fn register(&self, entry: OutboxEntry) {
        let mut entries = self.entries.write();
        entries.retain(|e| e.resource_name() != entry.resource_name());
        debug!(resource = entry.resource_name(), "Mirror registered");
        entries.push(entry);
    }

    /// Removes a registration. Returns false if it was not registered.
    pub fn unregister(&self, resource: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.resource_name() != resource);
        entries.len() != before
    }

    /// Changes the retention policy of a registration.
    pub fn set_retention(&self, resource: &str, retention: RetentionPolicy) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.resource_name() == resource) {
            Some(entry) => {
                entry.retention = retention;
                true
            }
            None => false,
        }
    }

    /// Returns the registered resource names, in registration order.
    pub fn registrations(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|e| e.resource_name().to_string())
            .collect()
    }

    /// Resumes replay and clears a halt.
    pub fn start_sync(&self) {
        self.halted.store(false, Ordering::SeqCst);
        self.trigger.send_replace(true);
        info!("Outbox replay started");
    }

    /// Pauses replay. A request already in flight completes.
    pub fn stop_sync(&self) {
        self.trigger.send_replace(false);
        info!("Outbox replay stopped");
    }

    /// Subscribes to the pause/resume flag. New subscribers see the
    /// current value at once.
    pub fn trigger(&self) -> watch::Receiver<bool> {
        self.trigger.subscribe()
    }

    /// Returns true if replay is enabled.
    pub fn is_triggered(&self) -> bool {
        *self.trigger.borrow()
    }

    /// Returns the current state.
    pub fn state(&self) -> OutboxState {
        if self.in_flight.is_locked() {
            OutboxState::Replaying
        } else if self.is_triggered() {
            OutboxState::Idle
        } else if self.halted.load(Ordering::SeqCst) {
            OutboxState::Halted
        } else {
            OutboxState::Paused
        }
    }

    /// Returns the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn entries(&self) -> Vec<OutboxEntry> {
        self.entries.read().clone()
    }

    /// Returns every dirty record across registered mirrors, in replay
    /// order.
    pub fn outbox(&self) -> SyncResult<Vec<PendingRecord>> {
        let mut pending = Vec::new();
        for entry in self.entries() {
            let records = entry.store.snapshot(&Selector::dirty())?;
            pending.extend(records.into_iter().map(|record| PendingRecord {
                resource: entry.resource_name().to_string(),
                record,
            }));
        }
        replay_order(&mut pending);
        Ok(pending)
    }

    /// Returns the number of dirty records.
    pub fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.outbox()?.len())
    }

    /// Replays the head of the outbox.
    ///
    /// # Errors
    ///
    /// Returns `Remote` if the request failed. The record keeps its state,
    /// the error is stored on it, and replay halts until `start_sync`.
    pub fn replay_next(&self) -> SyncResult<ReplayOutcome> {
        let Some(_guard) = self.in_flight.try_lock() else {
            return Ok(ReplayOutcome::Busy);
        };
        if !self.is_triggered() {
            return Ok(ReplayOutcome::Paused);
        }

        let Some(head) = self.outbox()?.into_iter().next() else {
            return Ok(ReplayOutcome::Idle);
        };
        let Some(entry) = self
            .entries()
            .into_iter()
            .find(|e| e.resource_name() == head.resource)
        else {
            return Ok(ReplayOutcome::Idle);
        };

        self.replay(&entry, head.record)
    }

    /// Replays until the outbox is empty or replay pauses.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failed replay.
    pub fn sync(&self) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        let mut result = SyncCycleResult::default();

        loop {
            match self.replay_next()? {
                ReplayOutcome::Replayed { .. } => result.replayed += 1,
                ReplayOutcome::Removed { .. } => result.removed += 1,
                ReplayOutcome::Idle | ReplayOutcome::Paused | ReplayOutcome::Busy => break,
            }
        }

        result.duration = start.elapsed();
        if result.replayed + result.removed > 0 {
            info!(
                replayed = result.replayed,
                removed = result.removed,
                "Outbox drained"
            );
        }
        Ok(result)
    }

    fn replay(&self, entry: &OutboxEntry, record: Record) -> SyncResult<ReplayOutcome> {
        let path = record.path().to_string();
        let timeout = self.config.write_timeout;
        let store = entry.store.as_ref();

        let response = match &record.state {
            SyncState::Get => return Ok(ReplayOutcome::Idle),
            SyncState::Post {
                outbound,
                file_fields,
            } => self.remote.post(
                &parent_path(&path),
                RequestBody::from_payload(record.data.as_ref(), file_fields),
                &outbound.params.iter().collect::<QueryParams>(),
                &outbound.headers,
                timeout,
            ),
            SyncState::Put {
                outbound,
                file_fields,
            } => self.remote.put(
                &path,
                RequestBody::from_payload(record.data.as_ref(), file_fields),
                &outbound.params.iter().collect::<QueryParams>(),
                &outbound.headers,
                timeout,
            ),
            SyncState::Delete { outbound } => self.remote.delete(
                &path,
                &outbound.params.iter().collect::<QueryParams>(),
                &outbound.headers,
                timeout,
            ),
        };

        match response {
            Ok(body) => self.settle(store, &record, body),
            Err(err) => {
                let message = err.to_string();
                transition::apply(store, &record.key, |current| {
                    Ok(match transition::replay_failed(&record, current, &message) {
                        Some(failed) => Change::Upsert(failed),
                        None => Change::Keep,
                    })
                })?;
                self.halted.store(true, Ordering::SeqCst);
                self.trigger.send_replace(false);
                {
                    let mut stats = self.stats.write();
                    stats.failures += 1;
                    stats.last_error = Some(message.clone());
                }
                warn!(
                    key = %record.key,
                    method = %record.method(),
                    error = %message,
                    "Replay failed, outbox halted"
                );
                Err(SyncError::Remote {
                    key: record.key,
                    source: err,
                })
            }
        }
    }

    fn settle(
        &self,
        store: &dyn DocumentStore,
        sent: &Record,
        response: Value,
    ) -> SyncResult<ReplayOutcome> {
        let now = self.clock.now_millis();
        let mut removed = false;
        let mut kept_local = false;
        transition::apply(store, &sent.key, |current| {
            Ok(match transition::replay_succeeded(sent, current, response, now) {
                Some(Transition::Upsert(record)) => Change::Upsert(record),
                Some(Transition::Remove(_)) => {
                    removed = true;
                    Change::Remove
                }
                None => {
                    kept_local = true;
                    Change::Keep
                }
            })
        })?;

        let key = sent.key.clone();
        let outcome = if removed {
            self.stats.write().removed += 1;
            ReplayOutcome::Removed { key }
        } else {
            if kept_local {
                debug!(key = %sent.key, "Record changed during replay, keeping local write");
            }
            self.stats.write().replayed += 1;
            ReplayOutcome::Replayed { key }
        };

        self.stats.write().last_sync_time = Some(Instant::now());
        info!(key = %sent.key, method = %sent.method(), "Replayed");
        Ok(outcome)
    }

    /// Removes synced records older than each registration's eviction age.
    ///
    /// Dirty records are never evicted. Returns the number removed.
    pub fn evict(&self) -> SyncResult<usize> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        for entry in self.entries() {
            let cutoff = now.saturating_sub(entry.retention.evict_after_millis());
            let stale = entry
                .store
                .snapshot(&Selector::all().with_method(MethodFilter::Is(Method::Get)))?;
            for record in stale.iter().filter(|r| r.time < cutoff) {
                if remove_if_synced(entry.store.as_ref(), &record.key, |r| r.time < cutoff)? {
                    removed += 1;
                }
            }
        }
        self.stats.write().evicted += removed as u64;
        info!(removed, "Eviction finished");
        Ok(removed)
    }

    /// Keeps only the newest synced records of each registration.
    ///
    /// Dirty records are never trimmed. Returns the number removed.
    pub fn skip_trim(&self) -> SyncResult<usize> {
        let mut removed = 0;
        for entry in self.entries() {
            let surplus = entry.store.snapshot(
                &Selector::all()
                    .with_method(MethodFilter::Is(Method::Get))
                    .with_order(TimeOrder::Descending)
                    .with_skip(entry.retention.trim_keep_count),
            )?;
            for record in &surplus {
                if remove_if_synced(entry.store.as_ref(), &record.key, |_| true)? {
                    removed += 1;
                }
            }
        }
        self.stats.write().trimmed += removed as u64;
        info!(removed, "Skip-trim finished");
        Ok(removed)
    }
}

/// Removes `key` only if it is still synced and `still_stale` agrees, so a
/// local write landing after the candidate scan survives.
fn remove_if_synced(
    store: &dyn DocumentStore,
    key: &str,
    still_stale: impl FnOnce(&Record) -> bool,
) -> SyncResult<bool> {
    let mut removed = false;
    transition::apply(store, key, |current| {
        Ok(match current {
            Some(record) if !record.is_dirty() && still_stale(record) => {
                removed = true;
                Change::Remove
            }
            _ => Change::Keep,
        })
    })?;
    Ok(removed)
}

impl<R: RemoteClient> std::fmt::Debug for OutboxSynchronizer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxSynchronizer")
            .field("registrations", &self.registrations())
            .field("state", &self.state())
            .finish()
    }
}
