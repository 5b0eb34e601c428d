//! Cached records and their sync states.

use crate::error::StoreError;
use restmirror_query::{lookup_path, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// The sync state tag of a record.
///
/// This is what the record still owes the server, not the last HTTP verb
/// used on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Synced; safe to overwrite from the network.
    Get,
    /// Created locally, not yet sent.
    Post,
    /// Modified locally, not yet sent.
    Put,
    /// Deleted locally, not yet sent.
    Delete,
}

impl Method {
    /// Returns the upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Parses an upper-case wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }

    /// Returns true for states that owe the server a request.
    pub fn is_dirty(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binary attachment that must be sent as a multipart part on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileField {
    /// The payload field the attachment replaces.
    pub field: String,
    /// File name sent in the part's content disposition.
    pub file_name: String,
    /// MIME type of the content, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Raw file bytes.
    pub content: Vec<u8>,
}

impl FileField {
    /// Creates a new attachment.
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content_type: None,
            content,
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Replay metadata shared by every dirty state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outbound {
    /// Query parameters attached to the replayed request.
    pub params: BTreeMap<String, String>,
    /// Headers attached to the replayed request.
    pub headers: BTreeMap<String, String>,
    /// Last replay failure, if any.
    pub error: Option<String>,
}

impl Outbound {
    /// Creates outbound metadata from params and headers.
    pub fn new(params: BTreeMap<String, String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            params,
            headers,
            error: None,
        }
    }
}

/// The sync state of a record, carrying only what each state needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Synced with the server.
    Get,
    /// New record awaiting a remote create.
    Post {
        /// Replay metadata.
        outbound: Outbound,
        /// Attachments sent as multipart parts.
        file_fields: Vec<FileField>,
    },
    /// Modified record awaiting a remote update.
    Put {
        /// Replay metadata.
        outbound: Outbound,
        /// Attachments sent as multipart parts.
        file_fields: Vec<FileField>,
    },
    /// Deleted record awaiting a remote delete.
    Delete {
        /// Replay metadata.
        outbound: Outbound,
    },
}

impl SyncState {
    /// Returns the state tag.
    pub fn method(&self) -> Method {
        match self {
            SyncState::Get => Method::Get,
            SyncState::Post { .. } => Method::Post,
            SyncState::Put { .. } => Method::Put,
            SyncState::Delete { .. } => Method::Delete,
        }
    }

    /// Returns true for states that owe the server a request.
    pub fn is_dirty(&self) -> bool {
        self.method().is_dirty()
    }

    /// Returns the replay metadata of a dirty state.
    pub fn outbound(&self) -> Option<&Outbound> {
        match self {
            SyncState::Get => None,
            SyncState::Post { outbound, .. }
            | SyncState::Put { outbound, .. }
            | SyncState::Delete { outbound } => Some(outbound),
        }
    }

    /// Returns the replay metadata of a dirty state, mutably.
    pub fn outbound_mut(&mut self) -> Option<&mut Outbound> {
        match self {
            SyncState::Get => None,
            SyncState::Post { outbound, .. }
            | SyncState::Put { outbound, .. }
            | SyncState::Delete { outbound } => Some(outbound),
        }
    }

    /// Returns the attachments of a POST or PUT state.
    pub fn file_fields(&self) -> &[FileField] {
        match self {
            SyncState::Post { file_fields, .. } | SyncState::Put { file_fields, .. } => {
                file_fields
            }
            _ => &[],
        }
    }

    /// Returns the last replay failure.
    pub fn error(&self) -> Option<&str> {
        self.outbound().and_then(|o| o.error.as_deref())
    }

    /// Consumes the state and returns its parts, for re-tagging.
    pub fn into_parts(self) -> (Outbound, Vec<FileField>) {
        match self {
            SyncState::Get => (Outbound::default(), Vec::new()),
            SyncState::Post {
                outbound,
                file_fields,
            }
            | SyncState::Put {
                outbound,
                file_fields,
            } => (outbound, file_fields),
            SyncState::Delete { outbound } => (outbound, Vec::new()),
        }
    }
}

/// A cached REST resource and its sync status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RecordWire", try_from = "RecordWire")]
pub struct Record {
    /// `tenant + "____" + url`; unique per store.
    pub key: String,
    /// Collection prefix used by list queries.
    pub match_key: String,
    /// The payload.
    pub data: Option<Value>,
    /// Freshness and replay-ordering timestamp (ms).
    pub time: i64,
    /// First write (ms).
    pub created_at: i64,
    /// Last write (ms).
    pub updated_at: i64,
    /// Sync state.
    pub state: SyncState,
}

impl Record {
    /// Creates a synced record whose match key is derived from its key.
    pub fn synced(key: impl Into<String>, data: Option<Value>, now: i64) -> Self {
        let key = key.into();
        Self {
            match_key: parent_path(&key),
            key,
            data,
            time: now,
            created_at: now,
            updated_at: now,
            state: SyncState::Get,
        }
    }

    /// Replaces the sync state.
    #[must_use]
    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = state;
        self
    }

    /// Returns the state tag.
    pub fn method(&self) -> Method {
        self.state.method()
    }

    /// Returns true if the record owes the server a request.
    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    /// Returns the last replay failure.
    pub fn error(&self) -> Option<&str> {
        self.state.error()
    }

    /// Returns the key without its tenant prefix, or the whole key if it
    /// carries none.
    pub fn path(&self) -> &str {
        self.key
            .split_once("____")
            .map(|(_, path)| path)
            .unwrap_or(&self.key)
    }
}

/// Returns `path` with its trailing identifier segment removed.
///
/// `"t____/items/5/"` and `"t____/items/5"` both become `"t____/items/"`.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rsplit_once('/') {
        Some((head, _)) => format!("{}/", head),
        None => String::new(),
    }
}

/// Returns the trailing identifier segment of `path`.
pub fn identifier(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    trimmed
        .rsplit_once('/')
        .map(|(_, id)| id)
        .unwrap_or(trimmed)
}

impl Document for Record {
    fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        if let Some(value) = self.data.as_ref().and_then(|d| lookup_path(d, path)) {
            return Some(Cow::Borrowed(value));
        }
        let meta = match path {
            "key" => Value::from(self.key.as_str()),
            "matchKey" => Value::from(self.match_key.as_str()),
            "time" => Value::from(self.time),
            "createdAt" => Value::from(self.created_at),
            "updatedAt" => Value::from(self.updated_at),
            "method" => Value::from(self.method().as_str()),
            "error" => self.error().map(Value::from).unwrap_or(Value::Null),
            _ => return None,
        };
        Some(Cow::Owned(meta))
    }

    fn retain_fields(&mut self, fields: &[String]) {
        if let Some(data) = self.data.as_mut() {
            data.retain_fields(fields);
        }
    }
}

/// A partial update applied by `DocumentStore::patch`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    /// New payload (`Some(None)` clears it).
    pub data: Option<Option<Value>>,
    /// New timestamp.
    pub time: Option<i64>,
    /// New sync state.
    pub state: Option<SyncState>,
    /// New `updated_at`.
    pub updated_at: Option<i64>,
}

impl RecordPatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload.
    #[must_use]
    pub fn data(mut self, data: Option<Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    /// Sets the sync state.
    #[must_use]
    pub fn state(mut self, state: SyncState) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets `updated_at`.
    #[must_use]
    pub fn updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Applies the patch in place.
    pub fn apply(self, record: &mut Record) {
        if let Some(data) = self.data {
            record.data = data;
        }
        if let Some(time) = self.time {
            record.time = time;
        }
        if let Some(state) = self.state {
            record.state = state;
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = updated_at;
        }
    }
}

/// Flat persisted layout of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordWire {
    key: String,
    match_key: String,
    method: String,
    #[serde(default)]
    data: Option<Value>,
    time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    file_fields: Vec<FileField>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
}

impl From<Record> for RecordWire {
    fn from(record: Record) -> Self {
        let method = record.method().as_str().to_string();
        let (outbound, file_fields) = record.state.into_parts();
        Self {
            key: record.key,
            match_key: record.match_key,
            method,
            data: record.data,
            time: record.time,
            error: outbound.error,
            created_at: record.created_at,
            updated_at: record.updated_at,
            file_fields,
            params: outbound.params,
            headers: outbound.headers,
        }
    }
}

impl TryFrom<RecordWire> for Record {
    type Error = StoreError;

    fn try_from(wire: RecordWire) -> Result<Self, Self::Error> {
        let outbound = Outbound {
            params: wire.params,
            headers: wire.headers,
            error: wire.error,
        };
        let state = match Method::from_name(&wire.method) {
            Some(Method::Get) => SyncState::Get,
            Some(Method::Post) => SyncState::Post {
                outbound,
                file_fields: wire.file_fields,
            },
            Some(Method::Put) => SyncState::Put {
                outbound,
                file_fields: wire.file_fields,
            },
            Some(Method::Delete) => SyncState::Delete { outbound },
            None => {
                return Err(StoreError::InvalidState {
                    key: wire.key,
                    method: wire.method,
                })
            }
        };

        Ok(Self {
            key: wire.key,
            match_key: wire.match_key,
            data: wire.data,
            time: wire.time,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_helpers() {
        assert_eq!(parent_path("t____/items/5/"), "t____/items/");
        assert_eq!(parent_path("t____/items/5"), "t____/items/");
        assert_eq!(parent_path("/items/"), "/");
        assert_eq!(identifier("t____/items/5/"), "5");
        assert_eq!(identifier("/items/abc"), "abc");
    }

    #[test]
    fn path_strips_tenant() {
        let record = Record::synced("acme____/api/items/1/", None, 0);
        assert_eq!(record.path(), "/api/items/1/");
        assert_eq!(record.match_key, "acme____/api/items/");
    }

    #[test]
    fn serializes_flat_layout() {
        let record = Record::synced("t____/items/1/", Some(json!({"id": 1})), 10).with_state(
            SyncState::Put {
                outbound: Outbound {
                    params: BTreeMap::from([("expand".to_string(), "tags".to_string())]),
                    headers: BTreeMap::new(),
                    error: Some("HTTP 500".into()),
                },
                file_fields: vec![],
            },
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["method"], "PUT");
        assert_eq!(value["matchKey"], "t____/items/");
        assert_eq!(value["error"], "HTTP 500");
        assert_eq!(value["params"]["expand"], "tags");
        assert!(value.get("headers").is_none());

        let back: Record = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let raw = json!({"key": "k", "matchKey": "", "method": "PATCH", "time": 1});
        let err = serde_json::from_value::<Record>(raw).unwrap_err();
        assert!(err.to_string().contains("unknown sync state"));
    }

    #[test]
    fn document_falls_back_to_metadata() {
        let record = Record::synced("t____/items/1/", Some(json!({"time": "payload"})), 42);
        assert_eq!(record.field("time").unwrap().as_ref(), &json!("payload"));
        assert_eq!(record.field("createdAt").unwrap().as_ref(), &json!(42));
        assert_eq!(record.field("method").unwrap().as_ref(), &json!("GET"));
        assert!(record.field("nope").is_none());
    }

    #[test]
    fn state_accessors() {
        let state = SyncState::Post {
            outbound: Outbound::default(),
            file_fields: vec![FileField::new("avatar", "a.png", vec![1, 2])],
        };
        assert_eq!(state.method(), Method::Post);
        assert!(state.is_dirty());
        assert_eq!(state.file_fields().len(), 1);
        assert!(!SyncState::Get.is_dirty());
        assert!(SyncState::Get.outbound().is_none());
    }
}
