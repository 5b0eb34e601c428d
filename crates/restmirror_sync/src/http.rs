//! HTTP adapter for the remote client.
//!
//! [`RestClient`] turns [`RemoteRequest`]s into [`HttpRequest`]s: it
//! builds the URL, merges headers, encodes JSON bodies, and decodes JSON
//! responses. The transport sits behind [`HttpClient`]; [`ReqwestClient`]
//! is the blocking `reqwest` implementation.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::{RemoteClient, RemoteRequest, RequestBody};
use parking_lot::RwLock;
use reqwest::blocking::multipart::{Form, Part};
use restmirror_store::{FileField, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// The body of an [`HttpRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpBody {
    /// No body.
    Empty,
    /// Encoded bytes, typed by the request's `Content-Type` header.
    Bytes(Vec<u8>),
    /// A `multipart/form-data` form. The transport encodes it and sets the
    /// content type with its boundary.
    Multipart {
        /// Text parts, in order.
        fields: Vec<(String, String)>,
        /// File parts.
        files: Vec<FileField>,
    },
}

/// A raw HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: HttpBody,
    /// Time after which the client must give up with `RemoteError::Timeout`.
    pub timeout: Duration,
}

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. The client
/// must enforce `request.timeout` and report it as `RemoteError::Timeout`;
/// transport failures are `RemoteError::Network`. Error statuses are not
/// errors at this level.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: HttpRequest) -> RemoteResult<HttpResponse>;
}

/// A blocking [`HttpClient`] over `reqwest`.
///
/// `reqwest::blocking` runs its own runtime, so create and call this
/// client off async worker threads (e.g. inside `spawn_blocking`).
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client with reqwest's default settings.
    ///
    /// # Errors
    ///
    /// Returns `Network` if the TLS backend cannot be initialized.
    pub fn new() -> RemoteResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self::from_client(client))
    }

    /// Wraps a preconfigured client (proxies, TLS roots, pooling).
    pub fn from_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, request: HttpRequest) -> RemoteResult<HttpResponse> {
        let timeout = request.timeout;
        let mut builder = self
            .client
            .request(reqwest_method(request.method), request.url.as_str())
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            HttpBody::Empty => builder,
            HttpBody::Bytes(bytes) => builder.body(bytes),
            HttpBody::Multipart { fields, files } => builder.multipart(form(fields, files)?),
        };

        let response = builder.send().map_err(|e| transport_error(&e, timeout))?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| transport_error(&e, timeout))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn form(fields: Vec<(String, String)>, files: Vec<FileField>) -> RemoteResult<Form> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for file in files {
        let mut part = Part::bytes(file.content).file_name(file.file_name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;
        }
        form = form.part(file.field, part);
    }
    Ok(form)
}

fn transport_error(err: &reqwest::Error, timeout: Duration) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout(timeout)
    } else if err.is_builder() {
        RemoteError::InvalidRequest(err.to_string())
    } else {
        if err.is_connect() {
            debug!(error = %err, "Connection failed");
        }
        RemoteError::Network(err.to_string())
    }
}

/// A [`RemoteClient`] over an [`HttpClient`].
pub struct RestClient<C: HttpClient> {
    /// Base URL of the API (e.g., "https://api.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Headers sent with every request.
    default_headers: BTreeMap<String, String>,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> RestClient<C> {
    /// Creates a new REST client.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            default_headers: BTreeMap::new(),
            last_error: RwLock::new(None),
        }
    }

    /// Adds a header sent with every request (e.g., authorization).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns the wrapped HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn url_for(&self, request: &RemoteRequest) -> String {
        let mut url = if request.url.starts_with("http://") || request.url.starts_with("https://")
        {
            request.url.clone()
        } else {
            format!("{}{}", self.base_url, request.url)
        };
        if !request.params.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&request.params.to_query_string());
        }
        url
    }

    fn build(&self, request: RemoteRequest) -> RemoteResult<HttpRequest> {
        let url = self.url_for(&request);
        let mut headers: BTreeMap<String, String> = self.default_headers.clone();
        headers.insert("Accept".into(), "application/json".into());
        headers.extend(request.headers);

        let body = match request.body {
            None => HttpBody::Empty,
            Some(RequestBody::Json(value)) => {
                headers.insert("Content-Type".into(), "application/json".into());
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;
                HttpBody::Bytes(bytes)
            }
            Some(RequestBody::Multipart { fields, files }) => HttpBody::Multipart { fields, files },
        };

        Ok(HttpRequest {
            method: request.method,
            url,
            headers: headers.into_iter().collect(),
            body,
            timeout: request.timeout,
        })
    }
}

impl<C: HttpClient> RemoteClient for RestClient<C> {
    fn execute(&self, request: RemoteRequest) -> RemoteResult<Value> {
        let http = self.build(request)?;
        debug!(method = %http.method, url = %http.url, "Sending request");

        let result = self.client.send(http).and_then(decode_response);
        match &result {
            Ok(_) => *self.last_error.write() = None,
            Err(e) => *self.last_error.write() = Some(e.to_string()),
        }
        result
    }
}

fn decode_response(response: HttpResponse) -> RemoteResult<Value> {
    if response.status >= 400 {
        return Err(RemoteError::Application {
            status: response.status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        });
    }
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body).map_err(|e| RemoteError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use restmirror_query::QueryParams;
    use serde_json::json;

    struct TestClient {
        response: Mutex<RemoteResult<HttpResponse>>,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl TestClient {
        fn answering(status: u16, body: &str) -> Self {
            Self {
                response: Mutex::new(Ok(HttpResponse {
                    status,
                    body: body.as_bytes().to_vec(),
                })),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn last(&self) -> HttpRequest {
            self.sent.lock().last().cloned().unwrap()
        }

        fn header(&self, name: &str) -> Option<String> {
            self.last()
                .headers
                .into_iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v)
        }
    }

    impl HttpClient for TestClient {
        fn send(&self, request: HttpRequest) -> RemoteResult<HttpResponse> {
            self.sent.lock().push(request);
            self.response.lock().clone()
        }
    }

    #[test]
    fn builds_url_with_params() {
        let client = RestClient::new("https://api.test/", TestClient::answering(200, "[]"));
        let params = QueryParams::new()
            .with("limit", "10")
            .with("exclude:id.in", "1,2");
        client.get("/items/", &params, Duration::from_secs(3)).unwrap();

        let sent = client.client().last();
        assert_eq!(
            sent.url,
            "https://api.test/items/?limit=10&exclude%3Aid.in=1%2C2"
        );
        assert_eq!(sent.method, Method::Get);
        assert_eq!(sent.timeout, Duration::from_secs(3));
        assert_eq!(sent.body, HttpBody::Empty);
    }

    #[test]
    fn json_body_and_headers() {
        let client = RestClient::new("https://api.test", TestClient::answering(201, "{\"id\": 7}"))
            .with_header("Authorization", "Token abc");
        let headers = BTreeMap::from([("X-Tenant".to_string(), "acme".to_string())]);
        let response = client
            .post(
                "/items/",
                RequestBody::Json(json!({"name": "a"})),
                &QueryParams::new(),
                &headers,
                Duration::from_secs(30),
            )
            .unwrap();

        assert_eq!(response, json!({"id": 7}));
        assert_eq!(client.client().header("Authorization").as_deref(), Some("Token abc"));
        assert_eq!(client.client().header("X-Tenant").as_deref(), Some("acme"));
        assert_eq!(
            client.client().header("Content-Type").as_deref(),
            Some("application/json")
        );
        assert_eq!(
            client.client().last().body,
            HttpBody::Bytes(br#"{"name":"a"}"#.to_vec())
        );
    }

    #[test]
    fn multipart_body() {
        let client = RestClient::new("https://api.test", TestClient::answering(200, ""));
        let body = RequestBody::Multipart {
            fields: vec![("name".into(), "a".into())],
            files: vec![FileField::new("doc", "a.txt", b"hello".to_vec()).with_content_type("text/plain")],
        };
        let response = client
            .put("/items/1/", body, &QueryParams::new(), &BTreeMap::new(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(response, Value::Null);

        // The transport owns the boundary, so no content type is set here.
        assert_eq!(client.client().header("Content-Type"), None);
        match client.client().last().body {
            HttpBody::Multipart { fields, files } => {
                assert_eq!(fields, vec![("name".to_string(), "a".to_string())]);
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].file_name, "a.txt");
                assert_eq!(files[0].content_type.as_deref(), Some("text/plain"));
            }
            other => panic!("expected a multipart body, got {:?}", other),
        }
    }

    #[test]
    fn form_rejects_a_malformed_content_type() {
        let file = FileField::new("doc", "a.txt", b"x".to_vec()).with_content_type("not a mime");
        assert!(matches!(
            form(Vec::new(), vec![file]),
            Err(RemoteError::InvalidRequest(_))
        ));
    }

    #[test]
    fn error_status_is_application_error() {
        let client = RestClient::new("https://api.test", TestClient::answering(409, "conflict"));
        let err = client
            .get("/items/1/", &QueryParams::new(), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Application {
                status: 409,
                body: "conflict".into()
            }
        );
        assert_eq!(client.last_error().as_deref(), Some("HTTP 409: conflict"));
    }

    #[test]
    fn invalid_json_is_decode_error() {
        let client = RestClient::new("https://api.test", TestClient::answering(200, "<html>"));
        let err = client
            .get("/items/", &QueryParams::new(), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[test]
    fn transport_errors_pass_through() {
        let client = TestClient::answering(200, "");
        *client.response.lock() = Err(RemoteError::Timeout(Duration::from_secs(1)));
        let client = RestClient::new("https://api.test", client);
        let err = client
            .delete("/items/1/", &QueryParams::new(), &BTreeMap::new(), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err, RemoteError::Timeout(Duration::from_secs(1)));
    }
}
