//! # RestMirror Store
//!
//! Record model and reactive document store for RestMirror.
//!
//! This crate provides the lowest layer of the mirror: cached records
//! and the store that holds them. The store does not interpret sync
//! states; it only persists records and notifies live queries.
//!
//! ## Design Principles
//!
//! - Records are upserted by key (the store enforces key uniqueness)
//! - Live queries are hot: new subscribers see the latest value at once
//! - Stores must be `Send + Sync` for concurrent access
//! - Store handles are shared through an explicit `StoreRegistry`
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - In-memory store with live queries and JSON snapshots
//!
//! ## Example
//!
//! ```rust
//! use restmirror_store::{DocumentStore, MemoryStore, Record, Selector};
//! use serde_json::json;
//!
//! let store = MemoryStore::new("items");
//! let live = store.find(&Selector::prefix("t____/items/")).unwrap();
//!
//! store.upsert(Record::synced("t____/items/1/", Some(json!({"id": 1})), 1_000)).unwrap();
//! assert_eq!(live.borrow().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod memory;
mod record;
mod registry;
mod selector;
pub mod snapshot;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use record::{
    identifier, parent_path, FileField, Method, Outbound, Record, RecordPatch, SyncState,
};
pub use registry::StoreRegistry;
pub use selector::{MethodFilter, Selector, TimeOrder};
pub use snapshot::LoadReport;
pub use store::{Change, Decide, DocumentStore, LiveRecord, LiveRecords};
