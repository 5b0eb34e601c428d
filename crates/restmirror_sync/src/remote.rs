//! Remote REST client abstraction.

use crate::error::{RemoteError, RemoteResult};
use parking_lot::Mutex;
use restmirror_query::QueryParams;
use restmirror_store::{FileField, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for requests built without one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The body of an outgoing write.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/json`.
    Json(Value),
    /// `multipart/form-data` with text and file parts.
    Multipart {
        /// Text parts, in order.
        fields: Vec<(String, String)>,
        /// File parts.
        files: Vec<FileField>,
    },
}

impl RequestBody {
    /// Builds the body for a record payload.
    ///
    /// Without attachments the payload goes out as JSON. With attachments,
    /// the payload keys they replace are dropped, the remaining keys become
    /// text parts (strings verbatim, other values as JSON text, nulls
    /// omitted) and each attachment becomes a file part.
    pub fn from_payload(data: Option<&Value>, file_fields: &[FileField]) -> Self {
        if file_fields.is_empty() {
            return RequestBody::Json(data.cloned().unwrap_or(Value::Null));
        }

        let mut fields = Vec::new();
        if let Some(Value::Object(map)) = data {
            for (key, value) in map {
                if file_fields.iter().any(|f| &f.field == key) {
                    continue;
                }
                match value {
                    Value::Null => {}
                    Value::String(s) => fields.push((key.clone(), s.clone())),
                    other => fields.push((key.clone(), other.to_string())),
                }
            }
        }

        RequestBody::Multipart {
            fields,
            files: file_fields.to_vec(),
        }
    }
}

/// A request to the remote REST API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// HTTP method.
    pub method: Method,
    /// Resource path, relative to the client's base URL.
    pub url: String,
    /// Query parameters.
    pub params: QueryParams,
    /// Extra headers.
    pub headers: BTreeMap<String, String>,
    /// Body, for POST and PUT.
    pub body: Option<RequestBody>,
    /// Time after which the request counts as failed.
    pub timeout: Duration,
}

impl RemoteRequest {
    /// Creates a bodiless request with the default timeout.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: QueryParams::new(),
            headers: BTreeMap::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the query parameters.
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// Sets the headers.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A remote REST client.
///
/// Implementations perform one request and return the decoded JSON
/// response (`Null` for an empty body). The verb helpers are provided on
/// top of [`execute`](Self::execute).
pub trait RemoteClient: Send + Sync {
    /// Performs a request.
    fn execute(&self, request: RemoteRequest) -> RemoteResult<Value>;

    /// Fetches a resource or collection.
    fn get(&self, url: &str, params: &QueryParams, timeout: Duration) -> RemoteResult<Value> {
        self.execute(
            RemoteRequest::new(Method::Get, url)
                .with_params(params.clone())
                .with_timeout(timeout),
        )
    }

    /// Creates a resource in a collection.
    fn post(
        &self,
        url: &str,
        body: RequestBody,
        params: &QueryParams,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> RemoteResult<Value> {
        self.execute(
            RemoteRequest::new(Method::Post, url)
                .with_body(body)
                .with_params(params.clone())
                .with_headers(headers.clone())
                .with_timeout(timeout),
        )
    }

    /// Replaces a resource.
    fn put(
        &self,
        url: &str,
        body: RequestBody,
        params: &QueryParams,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> RemoteResult<Value> {
        self.execute(
            RemoteRequest::new(Method::Put, url)
                .with_body(body)
                .with_params(params.clone())
                .with_headers(headers.clone())
                .with_timeout(timeout),
        )
    }

    /// Deletes a resource.
    fn delete(
        &self,
        url: &str,
        params: &QueryParams,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> RemoteResult<Value> {
        self.execute(
            RemoteRequest::new(Method::Delete, url)
                .with_params(params.clone())
                .with_headers(headers.clone())
                .with_timeout(timeout),
        )
    }
}

impl<R: RemoteClient + ?Sized> RemoteClient for Arc<R> {
    fn execute(&self, request: RemoteRequest) -> RemoteResult<Value> {
        (**self).execute(request)
    }
}

struct Rule {
    method: Method,
    prefix: String,
    response: RemoteResult<Value>,
    remaining: Option<usize>,
}

/// A scriptable remote for testing.
///
/// Responses are matched by method and URL prefix, most recently added
/// rule first. Every request is recorded, including failed ones.
#[derive(Default)]
pub struct MockRemote {
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<RemoteRequest>>,
    offline: AtomicBool,
}

impl MockRemote {
    /// Creates a mock with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every matching request with `response`.
    pub fn respond(&self, method: Method, prefix: impl Into<String>, response: Value) {
        self.push_rule(method, prefix.into(), Ok(response), None);
    }

    /// Answers the next matching request with `response`, then expires.
    pub fn respond_once(&self, method: Method, prefix: impl Into<String>, response: Value) {
        self.push_rule(method, prefix.into(), Ok(response), Some(1));
    }

    /// Fails every matching request with `error`.
    pub fn fail(&self, method: Method, prefix: impl Into<String>, error: RemoteError) {
        self.push_rule(method, prefix.into(), Err(error), None);
    }

    /// Fails the next matching request with `error`, then expires.
    pub fn fail_once(&self, method: Method, prefix: impl Into<String>, error: RemoteError) {
        self.push_rule(method, prefix.into(), Err(error), Some(1));
    }

    /// Drops every rule.
    pub fn clear_rules(&self) {
        self.rules.lock().clear();
    }

    /// Makes every request fail with a network error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Returns the recorded requests.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of recorded requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the recorded requests with this method.
    pub fn requests_for(&self, method: Method) -> Vec<RemoteRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Forgets the recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn push_rule(
        &self,
        method: Method,
        prefix: String,
        response: RemoteResult<Value>,
        remaining: Option<usize>,
    ) {
        self.rules.lock().push(Rule {
            method,
            prefix,
            response,
            remaining,
        });
    }
}

impl RemoteClient for MockRemote {
    fn execute(&self, request: RemoteRequest) -> RemoteResult<Value> {
        let method = request.method;
        let url = request.url.clone();
        self.requests.lock().push(request);

        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("offline".into()));
        }

        let mut rules = self.rules.lock();
        let index = rules
            .iter()
            .rposition(|r| r.method == method && url.starts_with(&r.prefix))
            .ok_or_else(|| RemoteError::Network(format!("no mock response for {} {}", method, url)))?;

        let rule = &mut rules[index];
        let response = rule.response.clone();
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                rules.remove(index);
            }
        }
        response
    }
}

impl std::fmt::Debug for MockRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRemote")
            .field("rules", &self.rules.lock().len())
            .field("requests", &self.requests.lock().len())
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body_without_attachments() {
        let data = json!({"name": "a"});
        assert_eq!(
            RequestBody::from_payload(Some(&data), &[]),
            RequestBody::Json(data.clone())
        );
        assert_eq!(RequestBody::from_payload(None, &[]), RequestBody::Json(Value::Null));
    }

    #[test]
    fn multipart_body_drops_placeholders() {
        let data = json!({"name": "a", "count": 2, "avatar": "blob:local", "gone": null});
        let files = vec![FileField::new("avatar", "a.png", vec![1])];
        let RequestBody::Multipart { fields, files } = RequestBody::from_payload(Some(&data), &files)
        else {
            panic!("expected multipart");
        };
        assert_eq!(
            fields,
            vec![
                ("count".to_string(), "2".to_string()),
                ("name".to_string(), "a".to_string())
            ]
        );
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn mock_matches_latest_rule() {
        let remote = MockRemote::new();
        remote.respond(Method::Get, "/items/", json!([1]));
        remote.respond_once(Method::Get, "/items/", json!([2]));

        let params = QueryParams::new();
        assert_eq!(remote.get("/items/", &params, DEFAULT_TIMEOUT).unwrap(), json!([2]));
        assert_eq!(remote.get("/items/", &params, DEFAULT_TIMEOUT).unwrap(), json!([1]));
        assert_eq!(remote.request_count(), 2);
    }

    #[test]
    fn mock_without_rule_is_network_error() {
        let remote = MockRemote::new();
        let err = remote
            .delete("/x/1/", &QueryParams::new(), &BTreeMap::new(), DEFAULT_TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));
        assert_eq!(remote.requests_for(Method::Delete).len(), 1);
    }

    #[test]
    fn offline_mock_fails() {
        let remote = MockRemote::new();
        remote.respond(Method::Get, "/", Value::Null);
        remote.set_offline(true);
        assert!(remote.get("/a/", &QueryParams::new(), DEFAULT_TIMEOUT).is_err());
        remote.set_offline(false);
        assert!(remote.get("/a/", &QueryParams::new(), DEFAULT_TIMEOUT).is_ok());
    }
}
