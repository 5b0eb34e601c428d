//! Document store trait definition.

use crate::error::StoreResult;
use crate::record::{Record, RecordPatch};
use crate::selector::Selector;
use tokio::sync::watch;

/// A live single-record query. `None` while the key has no record.
pub type LiveRecord = watch::Receiver<Option<Record>>;

/// A live multi-record query.
pub type LiveRecords = watch::Receiver<Vec<Record>>;

/// What [`DocumentStore::update`] should do with a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Leave the key as it is.
    Keep,
    /// Store this record under the key.
    Upsert(Record),
    /// Remove the key.
    Remove,
}

/// Decides a [`Change`] from the record currently stored under a key.
pub type Decide<'a> = Box<dyn FnOnce(Option<&Record>) -> Change + 'a>;

/// A reactive key-value store of [`Record`]s.
///
/// Stores hold records and notify live queries. They never interpret sync
/// states; that is the mirror's job.
///
/// # Invariants
///
/// - `upsert` replaces any record with the same key
/// - `update` reads and writes one key without interleaving other writes
/// - Live queries are hot: a new receiver sees the current value at once
/// - A receiver is only woken when its result actually changed
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryStore`] - In-memory store with JSON snapshots
pub trait DocumentStore: Send + Sync {
    /// Returns the store (resource) name.
    fn name(&self) -> &str;

    /// Inserts or replaces the record with `record.key`.
    ///
    /// Returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    fn upsert(&self, record: Record) -> StoreResult<Record>;

    /// Applies a partial update to an existing record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has this key.
    fn patch(&self, key: &str, patch: RecordPatch) -> StoreResult<Record>;

    /// Reads the record at `key`, lets `decide` pick a change, and applies
    /// it as one step. No other write to the store can land in between.
    ///
    /// `decide` runs exactly once, while the store is locked, so it must
    /// not call back into the store. Returns what the key holds afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed. `decide` is not run then.
    fn update(&self, key: &str, decide: Decide<'_>) -> StoreResult<Option<Record>>;

    /// Removes a record. Returns true if one was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    fn remove(&self, key: &str) -> StoreResult<bool>;

    /// Reads one record without subscribing.
    fn get(&self, key: &str) -> StoreResult<Option<Record>>;

    /// Runs a selector once without subscribing.
    fn snapshot(&self, selector: &Selector) -> StoreResult<Vec<Record>>;

    /// Subscribes to one key.
    fn find_one(&self, key: &str) -> StoreResult<LiveRecord>;

    /// Subscribes to a selector.
    fn find(&self, selector: &Selector) -> StoreResult<LiveRecords>;

    /// Returns the number of records.
    fn len(&self) -> StoreResult<usize>;

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Closes the store. Later calls fail with `Closed`.
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
