//! Sync-state transitions.
//!
//! Every change of a record's sync state is decided here. The functions
//! are pure: they take the current record (if any) and return what the
//! store should do. [`apply`] runs one of them against a store as a
//! single locked step, so the mirror and the synchronizer never write
//! back a record they read earlier.
//!
//! | Event          | From            | To      |
//! |----------------|-----------------|---------|
//! | create         | any             | POST    |
//! | update         | GET             | PUT     |
//! | update         | POST            | POST    |
//! | update         | PUT, DELETE     | PUT     |
//! | update         | missing         | PUT     |
//! | delete         | POST            | removed |
//! | delete         | GET, PUT, DELETE| DELETE  |
//! | createNew      | PUT, DELETE     | POST    |
//! | deleteConflict | POST, PUT, DELETE | removed |
//! | replay ok      | POST, PUT       | GET     |
//! | replay ok      | DELETE          | removed |
//! | replay failed  | any dirty       | unchanged, error set |

use crate::error::{SyncError, SyncResult};
use restmirror_store::{parent_path, Change, DocumentStore, FileField, Outbound, Record, SyncState};
use serde_json::Value;
use std::collections::BTreeMap;

/// Replay metadata attached to a local write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Query parameters for the replayed request.
    pub params: BTreeMap<String, String>,
    /// Headers for the replayed request.
    pub headers: BTreeMap<String, String>,
    /// Attachments sent as multipart parts.
    pub file_fields: Vec<FileField>,
}

impl WriteOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds an attachment.
    pub fn with_file(mut self, file: FileField) -> Self {
        self.file_fields.push(file);
        self
    }

    fn is_empty(&self) -> bool {
        self.params.is_empty() && self.headers.is_empty() && self.file_fields.is_empty()
    }

    /// Merges into existing replay metadata. Non-empty options replace the
    /// stored params, headers and attachments; the last error is kept.
    fn merge(self, previous: Outbound, previous_files: Vec<FileField>) -> (Outbound, Vec<FileField>) {
        if self.is_empty() {
            return (previous, previous_files);
        }
        (
            Outbound {
                params: self.params,
                headers: self.headers,
                error: previous.error,
            },
            self.file_fields,
        )
    }
}

/// Runs `decide` against the record at `key` while the store is locked
/// and applies the change it returns. Returns what the key holds
/// afterwards.
///
/// # Errors
///
/// Returns the store's error, or the one `decide` failed with. Nothing is
/// written in either case.
pub(crate) fn apply(
    store: &dyn DocumentStore,
    key: &str,
    decide: impl FnOnce(Option<&Record>) -> SyncResult<Change>,
) -> SyncResult<Option<Record>> {
    let mut failure = None;
    let stored = store.update(
        key,
        Box::new(|current: Option<&Record>| match decide(current) {
            Ok(change) => change,
            Err(err) => {
                failure = Some(err);
                Change::Keep
            }
        }),
    )?;
    match failure {
        Some(err) => Err(err),
        None => Ok(stored),
    }
}

/// What the store must do after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Write this record.
    Upsert(Record),
    /// Remove the record with this key.
    Remove(String),
}

impl From<Transition> for Change {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::Upsert(record) => Change::Upsert(record),
            Transition::Remove(_) => Change::Remove,
        }
    }
}

impl Transition {
    /// Returns the record to write, if any.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Transition::Upsert(record) => Some(record),
            Transition::Remove(_) => None,
        }
    }
}

fn fresh(key: &str, data: Value, state: SyncState, now: i64) -> Record {
    Record {
        key: key.to_string(),
        match_key: parent_path(key),
        data: Some(data),
        time: now,
        created_at: now,
        updated_at: now,
        state,
    }
}

/// Local create: always POST with a fresh timestamp.
pub fn create(
    existing: Option<&Record>,
    key: &str,
    data: Value,
    options: WriteOptions,
    now: i64,
) -> Record {
    let state = SyncState::Post {
        outbound: Outbound::new(options.params, options.headers),
        file_fields: options.file_fields,
    };
    let mut record = fresh(key, data, state, now);
    if let Some(existing) = existing {
        record.created_at = existing.created_at;
    }
    record
}

/// Local update.
///
/// A pending delete is resurrected into PUT. A pending create stays POST
/// and keeps its replay position.
pub fn update(
    existing: Option<&Record>,
    key: &str,
    data: Value,
    options: WriteOptions,
    now: i64,
) -> Record {
    let Some(existing) = existing else {
        let state = SyncState::Put {
            outbound: Outbound::new(options.params, options.headers),
            file_fields: options.file_fields,
        };
        return fresh(key, data, state, now);
    };

    let mut record = existing.clone();
    record.data = Some(data);
    record.updated_at = now;
    record.state = match existing.state.clone() {
        SyncState::Get => {
            record.time = now;
            SyncState::Put {
                outbound: Outbound::new(options.params, options.headers),
                file_fields: options.file_fields,
            }
        }
        SyncState::Post {
            outbound,
            file_fields,
        } => {
            let (outbound, file_fields) = options.merge(outbound, file_fields);
            SyncState::Post {
                outbound,
                file_fields,
            }
        }
        state @ (SyncState::Put { .. } | SyncState::Delete { .. }) => {
            let (outbound, file_fields) = state.into_parts();
            let (outbound, file_fields) = options.merge(outbound, file_fields);
            SyncState::Put {
                outbound,
                file_fields,
            }
        }
    };
    record
}

/// Local delete.
///
/// A record that never reached the server is removed outright.
///
/// # Errors
///
/// Returns `LocalNotFound` if there is no record.
pub fn delete(
    existing: Option<&Record>,
    key: &str,
    options: WriteOptions,
    now: i64,
) -> SyncResult<Transition> {
    let existing = existing.ok_or_else(|| SyncError::LocalNotFound {
        key: key.to_string(),
    })?;

    let mut record = existing.clone();
    record.updated_at = now;
    record.state = match existing.state.clone() {
        SyncState::Post { .. } => return Ok(Transition::Remove(key.to_string())),
        SyncState::Get => {
            record.time = now;
            SyncState::Delete {
                outbound: Outbound::new(options.params, options.headers),
            }
        }
        state @ (SyncState::Put { .. } | SyncState::Delete { .. }) => {
            let (outbound, _) = state.into_parts();
            let (outbound, _) = WriteOptions {
                file_fields: Vec::new(),
                ..options
            }
            .merge(outbound, Vec::new());
            SyncState::Delete { outbound }
        }
    };
    Ok(Transition::Upsert(record))
}

/// Conflict escalation: resend a stuck PUT or DELETE as a fresh create.
///
/// # Errors
///
/// Returns `LocalNotFound` for a missing record and `InvalidTransition`
/// for a GET or POST record.
pub fn create_new(existing: Option<&Record>, key: &str, now: i64) -> SyncResult<Record> {
    let existing = existing.ok_or_else(|| SyncError::LocalNotFound {
        key: key.to_string(),
    })?;

    match existing.state.clone() {
        SyncState::Get | SyncState::Post { .. } => Err(SyncError::InvalidTransition {
            key: key.to_string(),
            method: existing.method(),
            operation: "create_new",
        }),
        state @ (SyncState::Put { .. } | SyncState::Delete { .. }) => {
            let (mut outbound, file_fields) = state.into_parts();
            outbound.error = None;
            let mut record = existing.clone();
            record.state = SyncState::Post {
                outbound,
                file_fields,
            };
            record.time = now;
            record.updated_at = now;
            Ok(record)
        }
    }
}

/// Conflict escalation: discard a dirty record locally.
///
/// # Errors
///
/// Returns `LocalNotFound` for a missing record and `InvalidTransition`
/// for a synced one.
pub fn delete_conflict(existing: Option<&Record>, key: &str) -> SyncResult<Transition> {
    let existing = existing.ok_or_else(|| SyncError::LocalNotFound {
        key: key.to_string(),
    })?;
    if !existing.is_dirty() {
        return Err(SyncError::InvalidTransition {
            key: key.to_string(),
            method: existing.method(),
            operation: "delete_conflict",
        });
    }
    Ok(Transition::Remove(key.to_string()))
}

/// A network read landing in the mirror. Dirty records are left alone.
pub fn store_remote(existing: Option<&Record>, key: &str, data: Value, now: i64) -> Option<Record> {
    match existing {
        Some(record) if record.is_dirty() => None,
        Some(record) => {
            let mut record = record.clone();
            record.data = Some(data);
            record.time = now;
            record.updated_at = now;
            Some(record)
        }
        None => Some(fresh(key, data, SyncState::Get, now)),
    }
}

/// A replay the server accepted.
///
/// `sent` is the record as it was replayed and `current` is what the
/// store holds now. If the record was rewritten while the request was in
/// flight, the newer local write wins and stays dirty; a created record
/// then continues as PUT because the server now knows it.
pub fn replay_succeeded(
    sent: &Record,
    current: Option<&Record>,
    response: Value,
    now: i64,
) -> Option<Transition> {
    let current = current?;
    if rewritten(sent, current) {
        if let SyncState::Post {
            outbound,
            file_fields,
        } = &current.state
        {
            let mut record = current.clone();
            record.state = SyncState::Put {
                outbound: outbound.clone(),
                file_fields: file_fields.clone(),
            };
            return Some(Transition::Upsert(record));
        }
        return None;
    }

    match &sent.state {
        SyncState::Delete { .. } => Some(Transition::Remove(sent.key.clone())),
        SyncState::Get => None,
        SyncState::Post { .. } | SyncState::Put { .. } => {
            let mut record = current.clone();
            if !response.is_null() {
                record.data = Some(response);
            }
            record.state = SyncState::Get;
            record.time = now;
            record.updated_at = now;
            Some(Transition::Upsert(record))
        }
    }
}

/// A replay that failed: the error is recorded, nothing else changes.
///
/// `sent` is the record as it was replayed and `current` is what the
/// store holds now. A write made while the request was in flight keeps
/// its data and only gains the error. A record removed in the meantime
/// stays removed.
pub fn replay_failed(sent: &Record, current: Option<&Record>, error: &str) -> Option<Record> {
    let current = current?;
    let mut record = if rewritten(sent, current) {
        current.clone()
    } else {
        sent.clone()
    };
    record.state.outbound_mut()?.error = Some(error.to_string());
    Some(record)
}

fn rewritten(sent: &Record, current: &Record) -> bool {
    current != sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use restmirror_store::Method;
    use serde_json::json;

    const KEY: &str = "t____/items/1/";

    fn synced() -> Record {
        Record::synced(KEY, Some(json!({"id": 1, "v": 0})), 100)
    }

    fn with(method: Method) -> Record {
        let state = match method {
            Method::Get => SyncState::Get,
            Method::Post => SyncState::Post {
                outbound: Outbound::default(),
                file_fields: vec![],
            },
            Method::Put => SyncState::Put {
                outbound: Outbound::default(),
                file_fields: vec![],
            },
            Method::Delete => SyncState::Delete {
                outbound: Outbound::default(),
            },
        };
        synced().with_state(state)
    }

    fn upserted(t: Transition) -> Record {
        match t {
            Transition::Upsert(r) => r,
            Transition::Remove(k) => panic!("unexpected removal of {}", k),
        }
    }

    #[test]
    fn create_is_post_with_fresh_time() {
        for prior in [None, Some(with(Method::Get)), Some(with(Method::Delete))] {
            let r = create(prior.as_ref(), KEY, json!({"v": 1}), WriteOptions::new(), 500);
            assert_eq!(r.method(), Method::Post);
            assert_eq!(r.time, 500);
            assert_eq!(r.data, Some(json!({"v": 1})));
            assert_eq!(r.match_key, "t____/items/");
            assert_eq!(r.created_at, if prior.is_some() { 100 } else { 500 });
        }
    }

    #[test]
    fn update_get_becomes_put_with_fresh_time() {
        let r = update(Some(&with(Method::Get)), KEY, json!({"v": 2}), WriteOptions::new(), 500);
        assert_eq!(r.method(), Method::Put);
        assert_eq!(r.time, 500);
    }

    #[test]
    fn update_post_stays_post_and_keeps_time() {
        let r = update(Some(&with(Method::Post)), KEY, json!({"v": 2}), WriteOptions::new(), 500);
        assert_eq!(r.method(), Method::Post);
        assert_eq!(r.time, 100);
        assert_eq!(r.data, Some(json!({"v": 2})));
    }

    #[test]
    fn update_put_or_delete_becomes_put() {
        for method in [Method::Put, Method::Delete] {
            let r = update(Some(&with(method)), KEY, json!({"v": 2}), WriteOptions::new(), 500);
            assert_eq!(r.method(), Method::Put);
            assert_eq!(r.time, 100);
        }
    }

    #[test]
    fn update_missing_is_put() {
        let options = WriteOptions::new().with_param("expand", "tags");
        let r = update(None, KEY, json!({"v": 2}), options, 500);
        assert_eq!(r.method(), Method::Put);
        assert_eq!(r.time, 500);
        assert_eq!(r.state.outbound().unwrap().params["expand"], "tags");
    }

    #[test]
    fn update_keeps_metadata_without_options() {
        let prior = with(Method::Put);
        let prior = replay_failed(&prior, Some(&prior), "HTTP 500").unwrap();
        let r = update(Some(&prior), KEY, json!({}), WriteOptions::new(), 500);
        assert_eq!(r.error(), Some("HTTP 500"));

        let r = update(
            Some(&prior),
            KEY,
            json!({}),
            WriteOptions::new().with_header("If-Match", "1"),
            500,
        );
        assert_eq!(r.state.outbound().unwrap().headers["If-Match"], "1");
    }

    #[test]
    fn delete_post_removes() {
        let t = delete(Some(&with(Method::Post)), KEY, WriteOptions::new(), 500).unwrap();
        assert_eq!(t, Transition::Remove(KEY.to_string()));
    }

    #[test]
    fn delete_dirty_keeps_time() {
        for method in [Method::Put, Method::Delete] {
            let r = upserted(delete(Some(&with(method)), KEY, WriteOptions::new(), 500).unwrap());
            assert_eq!(r.method(), Method::Delete);
            assert_eq!(r.time, 100);
            assert!(r.data.is_some());
        }
    }

    #[test]
    fn delete_get_refreshes_time() {
        let r = upserted(delete(Some(&with(Method::Get)), KEY, WriteOptions::new(), 500).unwrap());
        assert_eq!(r.method(), Method::Delete);
        assert_eq!(r.time, 500);
    }

    #[test]
    fn delete_missing_fails() {
        let err = delete(None, KEY, WriteOptions::new(), 500).unwrap_err();
        assert!(matches!(err, SyncError::LocalNotFound { .. }));
    }

    #[test]
    fn create_new_from_put_or_delete() {
        for method in [Method::Put, Method::Delete] {
            let sent = with(method);
            let failed = replay_failed(&sent, Some(&sent), "HTTP 404").unwrap();
            let r = create_new(Some(&failed), KEY, 500).unwrap();
            assert_eq!(r.method(), Method::Post);
            assert_eq!(r.error(), None);
            assert_eq!(r.time, 500);
        }
    }

    #[test]
    fn create_new_rejects_get_post_and_missing() {
        for method in [Method::Get, Method::Post] {
            let err = create_new(Some(&with(method)), KEY, 500).unwrap_err();
            assert!(matches!(err, SyncError::InvalidTransition { operation: "create_new", .. }));
        }
        assert!(matches!(
            create_new(None, KEY, 500),
            Err(SyncError::LocalNotFound { .. })
        ));
    }

    #[test]
    fn delete_conflict_rows() {
        for method in [Method::Post, Method::Put, Method::Delete] {
            assert_eq!(
                delete_conflict(Some(&with(method)), KEY).unwrap(),
                Transition::Remove(KEY.to_string())
            );
        }
        assert!(matches!(
            delete_conflict(Some(&with(Method::Get)), KEY),
            Err(SyncError::InvalidTransition { method: Method::Get, .. })
        ));
        assert!(matches!(
            delete_conflict(None, KEY),
            Err(SyncError::LocalNotFound { .. })
        ));
    }

    #[test]
    fn store_remote_skips_dirty() {
        assert!(store_remote(Some(&with(Method::Put)), KEY, json!({}), 500).is_none());
        let r = store_remote(Some(&with(Method::Get)), KEY, json!({"v": 9}), 500).unwrap();
        assert_eq!(r.time, 500);
        assert_eq!(r.created_at, 100);
        let r = store_remote(None, KEY, json!({}), 500).unwrap();
        assert_eq!(r.method(), Method::Get);
    }

    #[test]
    fn replay_success_settles_record() {
        let sent = with(Method::Post);
        let t = replay_succeeded(&sent, Some(&sent), json!({"id": 1, "v": 5}), 900).unwrap();
        let r = upserted(t);
        assert_eq!(r.method(), Method::Get);
        assert_eq!(r.data, Some(json!({"id": 1, "v": 5})));
        assert_eq!(r.time, 900);

        let sent = with(Method::Put);
        let r = upserted(replay_succeeded(&sent, Some(&sent), Value::Null, 900).unwrap());
        assert_eq!(r.data, sent.data);

        let sent = with(Method::Delete);
        assert_eq!(
            replay_succeeded(&sent, Some(&sent), Value::Null, 900),
            Some(Transition::Remove(KEY.to_string()))
        );
    }

    #[test]
    fn replay_success_respects_concurrent_writes() {
        let sent = with(Method::Post);
        let rewritten = update(Some(&sent), KEY, json!({"v": 7}), WriteOptions::new(), 800);
        let r = upserted(replay_succeeded(&sent, Some(&rewritten), json!({"id": 1}), 900).unwrap());
        assert_eq!(r.method(), Method::Put);
        assert_eq!(r.data, Some(json!({"v": 7})));

        let sent = with(Method::Put);
        let rewritten = update(Some(&sent), KEY, json!({"v": 7}), WriteOptions::new(), 800);
        assert!(replay_succeeded(&sent, Some(&rewritten), json!({}), 900).is_none());
        assert!(replay_succeeded(&sent, None, json!({}), 900).is_none());
    }

    #[test]
    fn replay_failure_records_error() {
        let sent = with(Method::Put);
        let r = replay_failed(&sent, Some(&sent), "HTTP 500: boom").unwrap();
        assert_eq!(r.method(), Method::Put);
        assert_eq!(r.error(), Some("HTTP 500: boom"));
        assert_eq!(r.time, 100);
        assert_eq!(r.data, sent.data);
    }

    #[test]
    fn replay_failure_keeps_writes_made_in_flight() {
        let sent = with(Method::Put);
        let rewritten = update(Some(&sent), KEY, json!({"v": "newer"}), WriteOptions::new(), 800);
        let r = replay_failed(&sent, Some(&rewritten), "connection reset").unwrap();
        assert_eq!(r.data, Some(json!({"v": "newer"})));
        assert_eq!(r.updated_at, 800);
        assert_eq!(r.method(), Method::Put);
        assert_eq!(r.error(), Some("connection reset"));

        let sent = with(Method::Put);
        let deleting = upserted(delete(Some(&sent), KEY, WriteOptions::new(), 800).unwrap());
        let r = replay_failed(&sent, Some(&deleting), "timeout").unwrap();
        assert_eq!(r.method(), Method::Delete);
        assert_eq!(r.error(), Some("timeout"));
    }

    #[test]
    fn replay_failure_leaves_removed_records_removed() {
        let sent = with(Method::Post);
        assert!(replay_failed(&sent, None, "HTTP 502").is_none());
    }

    #[test]
    fn transitions_map_to_store_changes() {
        assert_eq!(Change::from(Transition::Remove(KEY.to_string())), Change::Remove);
        let record = with(Method::Put);
        assert_eq!(
            Change::from(Transition::Upsert(record.clone())),
            Change::Upsert(record)
        );
    }
}
