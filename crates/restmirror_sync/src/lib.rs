//! # RestMirror Sync
//!
//! Local mirror, network overlay and outbox synchronizer for RestMirror.
//!
//! This crate provides:
//! - Local mirror (tenant-scoped reads, optimistic writes, live queries)
//! - Sync state transitions for every local write and replay result
//! - Network overlay (read-through with TTL, list merge around dirty records)
//! - Outbox synchronizer (ordered replay, head-of-line halt, eviction, trim)
//! - Remote client abstraction with a JSON/multipart REST adapter over
//!   blocking `reqwest`
//!
//! ## Architecture
//!
//! Writes land in the mirror first and mark the record dirty (`POST`,
//! `PUT` or `DELETE`). The outbox gathers dirty records across every
//! registered mirror, oldest first, and replays them one at a time:
//! 1. Send the remote call implied by the record's state
//! 2. On success, settle the record back to `GET` (or remove it)
//! 3. On failure, record the error and halt until sync is restarted
//!
//! ## Key Invariants
//!
//! - A dirty record is never overwritten by a network read
//! - Replay is serial and ordered by `(time, key)`
//! - A failed replay blocks every later record
//! - Eviction and trimming only ever remove synced (`GET`) records
//!
//! ## Example
//!
//! ```rust
//! use restmirror_store::{Method, StoreRegistry};
//! use restmirror_sync::{LocalMirror, MockRemote, OutboxSynchronizer, RetentionPolicy};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let registry = StoreRegistry::new();
//! let mirror = LocalMirror::open(&registry, "items");
//! let remote = Arc::new(MockRemote::new());
//! let outbox = OutboxSynchronizer::new(remote.clone());
//! outbox.register(mirror.registration(RetentionPolicy::default()));
//!
//! mirror.create("acme", "/items/draft-1/", json!({"name": "widget"})).unwrap();
//! remote.respond(Method::Post, "/items/", json!({"id": 7, "name": "widget"}));
//!
//! let result = outbox.sync().unwrap();
//! assert_eq!(result.replayed, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod live;
mod mirror;
mod outbox;
mod overlay;
mod remote;
pub mod transition;

pub use config::{MirrorConfig, OutboxConfig, OverlayConfig, RetentionPolicy};
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
pub use http::{HttpBody, HttpClient, HttpRequest, HttpResponse, ReqwestClient, RestClient};
pub use live::{Live, LiveGet, LiveList};
pub use mirror::{LocalMirror, TENANT_SEPARATOR};
pub use outbox::{
    replay_order, OutboxEntry, OutboxState, OutboxSynchronizer, PendingRecord, ReplayOutcome,
    SyncCycleResult, SyncStats,
};
pub use overlay::{NetworkOverlay, EXCLUDE_IDS_KEY};
pub use remote::{MockRemote, RemoteClient, RemoteRequest, RequestBody, DEFAULT_TIMEOUT};
pub use transition::{Transition, WriteOptions};
