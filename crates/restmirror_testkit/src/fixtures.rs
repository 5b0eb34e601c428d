//! Test fixtures and mirror helpers.
//!
//! Provides a fully wired mirror setup driven by a manual clock, plus
//! builders for records in each sync state.

use restmirror_store::{
    Clock, DocumentStore, FileField, ManualClock, Method, Outbound, Record, StoreRegistry, SyncState,
};
use restmirror_sync::{
    LocalMirror, MirrorConfig, MockRemote, NetworkOverlay, OutboxSynchronizer, RetentionPolicy,
    TENANT_SEPARATOR,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Clock reading every harness starts at (ms).
pub const START_MILLIS: i64 = 1_700_000_000_000;

/// Tenant used by the harness helpers.
pub const TENANT: &str = "acme";

/// A registry, a set of mirrors and the sync machinery around them.
///
/// Every component shares one [`ManualClock`] and one [`MockRemote`].
pub struct MirrorHarness {
    /// The shared clock.
    pub clock: Arc<ManualClock>,
    /// The scripted remote.
    pub remote: Arc<MockRemote>,
    /// The store registry.
    pub registry: StoreRegistry,
    /// The outbox, with every mirror registered.
    pub outbox: OutboxSynchronizer<MockRemote>,
    mirrors: BTreeMap<String, (Arc<LocalMirror>, NetworkOverlay<MockRemote>)>,
}

impl MirrorHarness {
    /// Creates a harness with one mirror per resource name.
    pub fn new(resources: &[&str]) -> Self {
        Self::with_config(resources, MirrorConfig::default())
    }

    /// Creates a harness using `config` for every component.
    pub fn with_config(resources: &[&str], config: MirrorConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let remote = Arc::new(MockRemote::new());
        let registry = StoreRegistry::new();
        let outbox = OutboxSynchronizer::with_config(Arc::clone(&remote), config.outbox.clone())
            .with_clock(clock.clone());

        let mut mirrors = BTreeMap::new();
        for name in resources {
            let mirror =
                Arc::new(LocalMirror::open(&registry, name).with_clock(clock.clone()));
            outbox.register(mirror.registration(config.retention));
            let overlay = NetworkOverlay::with_config(
                Arc::clone(&mirror),
                Arc::clone(&remote),
                config.overlay.clone(),
            );
            mirrors.insert(name.to_string(), (mirror, overlay));
        }

        Self {
            clock,
            remote,
            registry,
            outbox,
            mirrors,
        }
    }

    /// Returns the mirror for `resource`.
    ///
    /// # Panics
    ///
    /// Panics if the harness was not built with that resource.
    pub fn mirror(&self, resource: &str) -> &Arc<LocalMirror> {
        &self.entry(resource).0
    }

    /// Returns the network overlay for `resource`.
    ///
    /// # Panics
    ///
    /// Panics if the harness was not built with that resource.
    pub fn overlay(&self, resource: &str) -> &NetworkOverlay<MockRemote> {
        &self.entry(resource).1
    }

    /// Returns the store behind `resource`.
    pub fn store(&self, resource: &str) -> Arc<dyn DocumentStore> {
        Arc::clone(self.mirror(resource).store())
    }

    /// Current clock reading (ms).
    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock
            .advance_millis(i64::try_from(by.as_millis()).expect("duration fits in i64"));
    }

    /// Replaces the retention policy of every registration.
    pub fn set_retention(&self, retention: RetentionPolicy) {
        for name in self.mirrors.keys() {
            self.outbox.set_retention(name, retention);
        }
    }

    fn entry(&self, resource: &str) -> &(Arc<LocalMirror>, NetworkOverlay<MockRemote>) {
        self.mirrors
            .get(resource)
            .unwrap_or_else(|| panic!("harness has no mirror named {resource}"))
    }
}

impl Default for MirrorHarness {
    fn default() -> Self {
        Self::new(&["items"])
    }
}

/// Returns a fresh temporary directory for snapshot tests.
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Builds a store key from a tenant and a URL.
pub fn key(tenant: &str, url: &str) -> String {
    format!("{}{}{}", tenant, TENANT_SEPARATOR, url)
}

/// Builds a synced record.
pub fn synced_record(key: &str, data: Value, time: i64) -> Record {
    Record::synced(key, Some(data), time)
}

/// Builds a dirty record in the given state with empty replay metadata.
///
/// # Panics
///
/// Panics when `method` is GET.
pub fn dirty_record(key: &str, method: Method, data: Option<Value>, time: i64) -> Record {
    let outbound = Outbound::default();
    let state = match method {
        Method::Post => SyncState::Post {
            outbound,
            file_fields: Vec::new(),
        },
        Method::Put => SyncState::Put {
            outbound,
            file_fields: Vec::new(),
        },
        Method::Delete => SyncState::Delete { outbound },
        Method::Get => panic!("dirty_record needs a dirty method"),
    };
    let mut record = Record::synced(key, data, time).with_state(state);
    record.created_at = time;
    record.updated_at = time;
    record
}

/// Builds a small text attachment.
pub fn text_file(field: &str, file_name: &str, content: &str) -> FileField {
    FileField::new(field, file_name, content.as_bytes().to_vec()).with_content_type("text/plain")
}
