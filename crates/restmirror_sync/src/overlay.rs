//! Read-through network overlay.
//!
//! Backfills the local mirror from the remote API. Local dirty records
//! always win over network copies, and list fetches leave room for the
//! records the user is editing so a page never shows a stale server copy
//! next to its pending local version.

use crate::config::OverlayConfig;
use crate::error::{SyncError, SyncResult};
use crate::live::{LiveGet, LiveList};
use crate::mirror::LocalMirror;
use crate::remote::RemoteClient;
use parking_lot::Mutex;
use restmirror_query::{Page, Query, QueryParams, LIMIT_KEY};
use restmirror_store::{identifier, Method, Record};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Query key used to keep locally edited records out of a remote page.
pub const EXCLUDE_IDS_KEY: &str = "exclude:id.in";

/// Read-through access to a [`LocalMirror`].
pub struct NetworkOverlay<R: RemoteClient> {
    mirror: Arc<LocalMirror>,
    remote: Arc<R>,
    config: OverlayConfig,
    /// Last fetch time (ms) per tenant, URL and params.
    list_fetches: Mutex<HashMap<String, i64>>,
}

impl<R: RemoteClient> NetworkOverlay<R> {
    /// Creates an overlay with the default configuration.
    pub fn new(mirror: Arc<LocalMirror>, remote: Arc<R>) -> Self {
        Self::with_config(mirror, remote, OverlayConfig::default())
    }

    /// Creates an overlay with the given configuration.
    pub fn with_config(mirror: Arc<LocalMirror>, remote: Arc<R>, config: OverlayConfig) -> Self {
        Self {
            mirror,
            remote,
            config,
            list_fetches: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the mirror.
    pub fn mirror(&self) -> &Arc<LocalMirror> {
        &self.mirror
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    fn ttl_millis(&self) -> i64 {
        i64::try_from(self.config.cache_ttl.as_millis()).unwrap_or(i64::MAX)
    }

    fn list_window_millis(&self) -> i64 {
        i64::try_from(self.config.list_cache_time.as_millis()).unwrap_or(i64::MAX)
    }

    /// Reads one record, fetching it when missing or stale.
    ///
    /// A dirty local record is returned without touching the network. If
    /// the fetch fails, a stale local copy is returned instead.
    ///
    /// # Errors
    ///
    /// Returns `RemoteRead` if the fetch failed and nothing is cached.
    pub fn get(&self, tenant: &str, url: &str) -> SyncResult<Option<Record>> {
        let local = self.mirror.get(tenant, url)?;
        if let Some(record) = &local {
            if record.is_dirty() {
                debug!(key = %record.key, method = %record.method(), "Serving dirty local record");
                return Ok(local);
            }
            if record.time >= self.mirror.now().saturating_sub(self.ttl_millis()) {
                debug!(key = %record.key, "Cache hit");
                return Ok(local);
            }
        }

        match self
            .remote
            .get(url, &QueryParams::new(), self.config.read_timeout)
        {
            Ok(data) => Ok(Some(self.mirror.store_remote(tenant, url, data)?)),
            Err(err) => match local {
                Some(record) => {
                    warn!(key = %record.key, error = %err, "Fetch failed, serving stale record");
                    Ok(Some(record))
                }
                None => Err(SyncError::RemoteRead {
                    url: url.to_string(),
                    source: err,
                }),
            },
        }
    }

    /// Backfills like [`get`](Self::get), then returns the live record.
    ///
    /// A failed fetch is logged; the handle still updates once the record
    /// arrives by other means.
    pub fn get_reactive(&self, tenant: &str, url: &str) -> SyncResult<LiveGet> {
        match self.get(tenant, url) {
            Ok(_) => {}
            Err(SyncError::RemoteRead { url, source }) => {
                warn!(url = %url, error = %source, "Fetch failed, live record starts empty");
            }
            Err(err) => return Err(err),
        }
        self.mirror.get_reactive(tenant, url)
    }

    /// Lists a collection, merging a remote page into the mirror.
    ///
    /// Records with pending edits or deletes are excluded from the remote
    /// request and the remote limit shrinks by their count. If they fill
    /// the whole page, the network is skipped. A failed fetch is logged
    /// and the local page returned.
    pub fn list<S: AsRef<str>>(
        &self,
        tenant: &str,
        url: &str,
        params: &QueryParams,
        allowed: &[S],
    ) -> SyncResult<Page<Record>> {
        let local = self.mirror.list(tenant, url, params, allowed)?;
        let allowed_params = params.allowed(allowed);
        let limit = Query::parse(&allowed_params).limit();
        let dirty_ids = dirty_ids(&local.results);

        if let Some(limit) = limit {
            if dirty_ids.len() >= limit {
                debug!(url, dirty = dirty_ids.len(), "Page is all local edits, skipping fetch");
                return Ok(local);
            }
        }

        let mut remote_params = allowed_params;
        if let Some(limit) = limit {
            remote_params.set(LIMIT_KEY, (limit - dirty_ids.len()).to_string());
        }
        if !dirty_ids.is_empty() {
            remote_params.push(EXCLUDE_IDS_KEY, dirty_ids.join(","));
        }

        let fetch_key = format!(
            "{}?{}",
            LocalMirror::key_for(tenant, url),
            remote_params.to_query_string()
        );
        let now = self.mirror.now();
        if self.recently_fetched(&fetch_key, now) {
            debug!(url, "List fetched recently, serving local page");
            return Ok(local);
        }

        let body = match self.remote.get(url, &remote_params, self.config.read_timeout) {
            Ok(body) => body,
            Err(err) => {
                warn!(url, error = %err, "List fetch failed, serving local page");
                return Ok(local);
            }
        };
        self.mark_fetched(fetch_key, now);

        let remote_page = RemotePage::from_body(body);
        for item in remote_page.results {
            let Some(id) = item.get("id").and_then(id_text) else {
                continue;
            };
            self.mirror
                .store_remote(tenant, &item_url(url, &id), item)?;
        }

        let mut page = self.mirror.list(tenant, url, params, allowed)?;
        if remote_page.next.is_some() {
            page.next = remote_page.next;
        }
        if remote_page.previous.is_some() {
            page.previous = remote_page.previous;
        }
        Ok(page)
    }

    /// Backfills like [`list`](Self::list), then returns the live list.
    pub fn list_reactive<S: AsRef<str>>(
        &self,
        tenant: &str,
        url: &str,
        params: &QueryParams,
        allowed: &[S],
    ) -> SyncResult<LiveList> {
        self.list(tenant, url, params, allowed)?;
        self.mirror.list_reactive(tenant, url, params, allowed)
    }

    fn recently_fetched(&self, key: &str, now: i64) -> bool {
        let window = self.list_window_millis();
        let mut fetches = self.list_fetches.lock();
        fetches.retain(|_, at| now.saturating_sub(*at) < window);
        fetches.contains_key(key)
    }

    fn mark_fetched(&self, key: String, now: i64) {
        if self.list_window_millis() > 0 {
            self.list_fetches.lock().insert(key, now);
        }
    }
}

impl<R: RemoteClient> std::fmt::Debug for NetworkOverlay<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkOverlay")
            .field("mirror", &self.mirror)
            .field("config", &self.config)
            .finish()
    }
}

/// Identifiers of pending PUT/DELETE records that still carry data.
fn dirty_ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter(|r| matches!(r.method(), Method::Put | Method::Delete))
        .filter(|r| r.data.as_ref().is_some_and(|d| !d.is_null()))
        .map(|r| identifier(r.path()).to_string())
        .collect()
}

fn id_text(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn item_url(collection: &str, id: &str) -> String {
    if collection.ends_with('/') {
        format!("{}{}/", collection, id)
    } else {
        format!("{}/{}/", collection, id)
    }
}

/// A remote list response: either a paginated envelope or a bare array.
struct RemotePage {
    results: Vec<Value>,
    next: Option<String>,
    previous: Option<String>,
}

impl RemotePage {
    fn from_body(body: Value) -> Self {
        match body {
            Value::Array(results) => Self {
                results,
                next: None,
                previous: None,
            },
            Value::Object(mut map) => {
                let cursor = |v: Option<Value>| match v {
                    Some(Value::String(s)) => Some(s),
                    _ => None,
                };
                let results = match map.remove("results") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                Self {
                    results,
                    next: cursor(map.remove("next")),
                    previous: cursor(map.remove("previous")),
                }
            }
            _ => Self {
                results: Vec::new(),
                next: None,
                previous: None,
            },
        }
    }
}
