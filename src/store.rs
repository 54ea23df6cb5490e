//! Remote file store client.
//!
//! Wraps a git-backed contents API (`GET`/`PUT`/`DELETE` against
//! `repos/{owner}/{repo}/contents/{path}`, base64 payloads inside a JSON
//! envelope, optimistic-concurrency version tokens) with the resilience the
//! site admin needs: bounded timeouts, exponential backoff with jitter,
//! rate-limit compliance, conditional GETs backed by an ETag cache, minimum
//! spacing between state-changing requests, and a bounded
//! refresh-and-retry loop when a write loses a version-token race.
//!
//! Every operation funnels through [`RemoteStore::request`]. The HTTP layer
//! sits behind the [`Transport`] trait so tests can drive the client with a
//! scripted transport and a paused clock.
//!
//! Each [`RemoteStore`] owns its cache and throttle state; independent
//! clients do not interfere. The ETag cache is never evicted — the workload
//! is a small fixed set of content URLs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::Rng;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{ClientConfig, StoreConfig};
use crate::models::{DirEntry, RemoteFile};

/// HTTP methods the contents API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// State-changing methods are throttled; reads are not.
    pub fn is_mutative(self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handed to the transport. Header names are lowercase.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A response from the transport. Header names are lowercase.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Transport-level failure. Both variants are retryable.
#[derive(Debug)]
pub enum TransportError {
    Timeout,
    Network(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Network(e) => write!(f, "network error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

/// Seam between the retry machinery and the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Production transport over `reqwest` with a fixed per-attempt timeout.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

/// Response payload, parsed per content type.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Text(_) => None,
        }
    }
}

/// Store client failure classes.
///
/// Transient trouble (timeouts, 5xx, rate limits) is retried internally and
/// only surfaces as [`StoreError::Exhausted`]; a version-token mismatch gets
/// its own class so writers can refresh and retry.
#[derive(Debug)]
pub enum StoreError {
    /// Non-retryable client error, raised immediately.
    Status {
        method: Method,
        path: String,
        status: u16,
        body: String,
    },
    /// The store rejected a write because the supplied version token is stale.
    Conflict { method: Method, path: String },
    /// Retry budget exhausted.
    Exhausted {
        method: Method,
        path: String,
        attempts: u32,
        last_status: Option<u16>,
        message: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Status {
                method,
                path,
                status,
                body,
            } => write!(f, "{} {} failed: {} {}", method, path, status, body),
            StoreError::Conflict { method, path } => {
                write!(f, "{} {} rejected: version token is stale", method, path)
            }
            StoreError::Exhausted {
                method,
                path,
                attempts,
                last_status,
                message,
            } => {
                write!(f, "{} {} failed after {} attempts", method, path, attempts)?;
                if let Some(status) = last_status {
                    write!(f, " (last status: {})", status)?;
                }
                write!(f, ": {}", message)
            }
        }
    }
}

impl std::error::Error for StoreError {}

struct CacheEntry {
    etag: String,
    payload: Payload,
}

/// Client for the remote content repository.
pub struct RemoteStore {
    store: StoreConfig,
    client: ClientConfig,
    token: Option<String>,
    transport: Arc<dyn Transport>,
    etag_cache: Mutex<HashMap<String, CacheEntry>>,
    last_mutative: Mutex<Option<Instant>>,
}

impl RemoteStore {
    /// Build a client over HTTPS with the configured timeout.
    pub fn new(store: StoreConfig, client: ClientConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(client.request_timeout_secs);
        let transport = Arc::new(HttpTransport::new(timeout)?);
        Ok(Self::with_transport(store, client, transport))
    }

    /// Build a client over an arbitrary transport.
    pub fn with_transport(
        store: StoreConfig,
        client: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let token = store.token();
        Self {
            store,
            client,
            token,
            transport,
            etag_cache: Mutex::new(HashMap::new()),
            last_mutative: Mutex::new(None),
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.store.api_base,
            self.store.repo,
            encode_path(path)
        )
    }

    /// The single chokepoint all operations funnel through.
    ///
    /// Applies, in order: mutative throttling, conditional-GET headers, the
    /// transport call, 304 short-circuiting, rate-limit waits (which re-issue
    /// the same attempt), payload parsing and ETag caching on success,
    /// exponential backoff for retryable failures, and immediate errors for
    /// the rest. May suspend for many seconds across retries.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Payload, StoreError> {
        let url = match method {
            Method::Get => format!(
                "{}?ref={}",
                self.contents_url(path),
                encode_component(&self.store.branch)
            ),
            _ => self.contents_url(path),
        };

        self.throttle_mutative(method).await;

        let mut attempt: u32 = 0;
        let mut rate_limit_waits: u32 = 0;
        let mut last_status: Option<u16> = None;
        let mut last_message = String::new();

        loop {
            let request = self.build_request(method, &url, &body);
            match self.transport.send(request).await {
                Err(err) => {
                    last_message = err.to_string();
                    debug!("{} {}: {}", method, path, last_message);
                }
                Ok(response) => {
                    self.log_rate_limit(&response, method, path);

                    if response.status == 304 {
                        if let Some(payload) = self.cached_payload(&url) {
                            debug!("{} {}: 304 Not Modified, using cached payload", method, path);
                            return Ok(payload);
                        }
                        // A 304 we cannot satisfy from cache is a server bug;
                        // drop the validator path and retry plain.
                        last_status = Some(304);
                        last_message = "304 Not Modified with no cached payload".to_string();
                        self.etag_cache.lock().expect("etag cache lock").remove(&url);
                    } else if is_rate_limited(&response) {
                        last_status = Some(response.status);
                        last_message = truncate_body(&response.body);
                        if rate_limit_waits <= self.client.max_retries {
                            if let Some(wait) = rate_limit_wait(&response) {
                                rate_limit_waits += 1;
                                debug!(
                                    "{} {}: rate limited, waiting {}ms before re-issuing",
                                    method,
                                    path,
                                    wait.as_millis()
                                );
                                tokio::time::sleep(wait).await;
                                // Re-issue the same logical attempt: rate-limit
                                // waits do not consume the retry budget.
                                continue;
                            }
                        }
                        // No usable wait hint (or too many waits): fall through
                        // to the generic retryable path.
                    } else if (200..300).contains(&response.status) {
                        match parse_payload(&response) {
                            Ok(payload) => {
                                if method == Method::Get {
                                    if let Some(etag) = response.header("etag") {
                                        self.store_cache(&url, etag, &payload);
                                    }
                                }
                                return Ok(payload);
                            }
                            Err(e) => {
                                last_status = Some(response.status);
                                last_message = e;
                            }
                        }
                    } else if response.status == 409 {
                        return Err(StoreError::Conflict {
                            method,
                            path: path.to_string(),
                        });
                    } else if is_retryable_status(response.status) {
                        last_status = Some(response.status);
                        last_message = truncate_body(&response.body);
                    } else {
                        return Err(StoreError::Status {
                            method,
                            path: path.to_string(),
                            status: response.status,
                            body: truncate_body(&response.body),
                        });
                    }
                }
            }

            if attempt >= self.client.max_retries {
                return Err(StoreError::Exhausted {
                    method,
                    path: path.to_string(),
                    attempts: attempt + 1,
                    last_status,
                    message: last_message,
                });
            }
            let delay = self.backoff_delay(attempt);
            debug!(
                "{} {}: retryable failure, backing off {}ms (attempt {}/{})",
                method,
                path,
                delay.as_millis(),
                attempt + 1,
                self.client.max_retries
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// List a directory. A payload that is not a listing (e.g. the path names
    /// a file) is an empty listing, not an error.
    pub async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, StoreError> {
        let payload = self.request(Method::Get, path, None).await?;
        let Payload::Json(Value::Array(items)) = payload else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    /// Fetch a file: version token plus content decoded from the store's
    /// base64 transport encoding.
    pub async fn get_file(&self, path: &str) -> Result<RemoteFile, StoreError> {
        let payload = self.request(Method::Get, path, None).await?;
        let json = match payload.as_json() {
            Some(v) => v.clone(),
            None => Value::Null,
        };
        let sha = json
            .get("sha")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let encoded = json.get("content").and_then(Value::as_str).unwrap_or_default();
        Ok(RemoteFile {
            sha,
            content: decode_content(encoded),
        })
    }

    /// Write a UTF-8 file. Read-modify-write: the current version token is
    /// fetched first; a missing file is tolerated and the write creates it.
    pub async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<Payload, StoreError> {
        self.put_encoded(path, BASE64.encode(content.as_bytes()), message)
            .await
    }

    /// Write opaque bytes. Same semantics as [`RemoteStore::put_file`].
    pub async fn put_binary(
        &self,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<Payload, StoreError> {
        self.put_encoded(path, BASE64.encode(bytes), message).await
    }

    async fn put_encoded(
        &self,
        path: &str,
        encoded: String,
        message: &str,
    ) -> Result<Payload, StoreError> {
        let mut conflict_attempts: u32 = 0;
        loop {
            // Best-effort token fetch: a missing file means "create".
            let sha = match self.get_file(path).await {
                Ok(file) if !file.sha.is_empty() => Some(file.sha),
                _ => None,
            };

            let mut body = serde_json::json!({
                "message": message,
                "content": encoded,
                "branch": self.store.branch,
            });
            if let Some(sha) = sha {
                body["sha"] = Value::String(sha);
            }

            match self.request(Method::Put, path, Some(body)).await {
                Err(StoreError::Conflict { .. })
                    if conflict_attempts < self.client.conflict_retries =>
                {
                    conflict_attempts += 1;
                    warn!(
                        "version conflict writing {}, refreshing token (attempt {}/{})",
                        path, conflict_attempts, self.client.conflict_retries
                    );
                }
                other => return other,
            }
        }
    }

    /// Delete a file. The target must exist: the version token is taken from
    /// a required `get_file`, and its failure propagates.
    pub async fn delete_file(&self, path: &str, message: &str) -> Result<Payload, StoreError> {
        let mut conflict_attempts: u32 = 0;
        loop {
            let current = self.get_file(path).await?;
            let body = serde_json::json!({
                "message": message,
                "branch": self.store.branch,
                "sha": current.sha,
            });

            match self.request(Method::Delete, path, Some(body)).await {
                Err(StoreError::Conflict { .. })
                    if conflict_attempts < self.client.conflict_retries =>
                {
                    conflict_attempts += 1;
                    warn!(
                        "version conflict deleting {}, refreshing token (attempt {}/{})",
                        path, conflict_attempts, self.client.conflict_retries
                    );
                }
                other => return other,
            }
        }
    }

    async fn throttle_mutative(&self, method: Method) {
        if !method.is_mutative() {
            return;
        }
        // Check-sleep-update is not atomic: two concurrent mutative calls can
        // both observe enough elapsed time and dispatch unspaced. Known race,
        // acceptable for the single-editor workload (see DESIGN.md).
        let min = Duration::from_millis(self.client.mutative_throttle_ms);
        let wait = {
            let last = self.last_mutative.lock().expect("throttle lock");
            last.map(|t| min.saturating_sub(t.elapsed()))
                .unwrap_or(Duration::ZERO)
        };
        if !wait.is_zero() {
            debug!("throttling {} request for {}ms", method, wait.as_millis());
            tokio::time::sleep(wait).await;
        }
        *self.last_mutative.lock().expect("throttle lock") = Some(Instant::now());
    }

    fn build_request(&self, method: Method, url: &str, body: &Option<Value>) -> TransportRequest {
        let mut headers = vec![(
            "accept".to_string(),
            "application/vnd.github+json".to_string(),
        )];
        if let Some(token) = &self.token {
            headers.push(("authorization".to_string(), format!("Bearer {}", token)));
        }
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        if method == Method::Get {
            if let Some(etag) = self.cached_etag(url) {
                headers.push(("if-none-match".to_string(), etag));
            }
        }
        TransportRequest {
            method,
            url: url.to_string(),
            headers,
            body: body.clone(),
        }
    }

    fn cached_etag(&self, url: &str) -> Option<String> {
        self.etag_cache
            .lock()
            .expect("etag cache lock")
            .get(url)
            .map(|e| e.etag.clone())
    }

    fn cached_payload(&self, url: &str) -> Option<Payload> {
        self.etag_cache
            .lock()
            .expect("etag cache lock")
            .get(url)
            .map(|e| e.payload.clone())
    }

    fn store_cache(&self, url: &str, etag: &str, payload: &Payload) {
        self.etag_cache.lock().expect("etag cache lock").insert(
            url.to_string(),
            CacheEntry {
                etag: etag.to_string(),
                payload: payload.clone(),
            },
        );
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .client
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.client.max_backoff_ms);
        let jitter = rand::thread_rng().gen_range(-0.3..0.3f64);
        Duration::from_millis((exp as f64 * (1.0 + jitter)).max(0.0) as u64)
    }

    fn log_rate_limit(&self, response: &TransportResponse, method: Method, path: &str) {
        let remaining = response.header("x-ratelimit-remaining");
        let limit = response.header("x-ratelimit-limit");
        let reset = response.header("x-ratelimit-reset");
        let retry_after = response.header("retry-after");
        if remaining.is_some() || limit.is_some() || reset.is_some() || retry_after.is_some() {
            debug!(
                "{} {}: rate limit {}/{} reset={} retry-after={}",
                method,
                path,
                remaining.unwrap_or("-"),
                limit.unwrap_or("-"),
                reset.unwrap_or("-"),
                retry_after.unwrap_or("-"),
            );
        }
    }
}

fn is_rate_limited(response: &TransportResponse) -> bool {
    response.status == 429
        || (response.status == 403 && response.header("x-ratelimit-remaining") == Some("0"))
}

/// How long the server asked us to wait, if it said.
fn rate_limit_wait(response: &TransportResponse) -> Option<Duration> {
    if let Some(secs) = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }
    if response.header("x-ratelimit-remaining") == Some("0") {
        if let Some(reset) = response
            .header("x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok())
        {
            let now = chrono::Utc::now().timestamp();
            // 1s buffer past the reset epoch.
            let wait = (reset - now).max(0) as u64 + 1;
            return Some(Duration::from_secs(wait));
        }
    }
    None
}

/// Timeouts and 5xx retry; 408/429 retry; 403 is ambiguous (often a rate
/// limit in disguise) and retries too. Everything else 4xx is the caller's
/// fault and fails fast.
fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429 || status == 403
}

/// Error bodies can be huge HTML pages; keep messages readable.
fn truncate_body(body: &str) -> String {
    body.chars().take(500).collect()
}

fn parse_payload(response: &TransportResponse) -> Result<Payload, String> {
    let content_type = response.header("content-type").unwrap_or("");
    if content_type.contains("application/json") {
        serde_json::from_str(&response.body)
            .map(Payload::Json)
            .map_err(|e| format!("invalid JSON payload: {}", e))
    } else {
        Ok(Payload::Text(response.body.clone()))
    }
}

fn decode_content(encoded: &str) -> String {
    // The store wraps base64 at 60 columns; strip the line breaks first.
    let compact: String = encoded.split_whitespace().collect();
    match BASE64.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

/// Percent-encode a path, preserving `/` separators.
fn encode_path(path: &str) -> String {
    encode(path, true)
}

/// Percent-encode a single query component.
fn encode_component(component: &str) -> String {
    encode(component, false)
}

fn encode(s: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_preserves_separators() {
        assert_eq!(
            encode_path("src/content/pages/om oss.sv.html"),
            "src/content/pages/om%20oss.sv.html"
        );
        assert_eq!(encode_component("feature/x"), "feature%2Fx");
    }

    #[test]
    fn test_decode_content_tolerates_line_wrapping() {
        let encoded = "PGgxPkhl\nbGxvPC9o\nMT4=\n";
        assert_eq!(decode_content(encoded), "<h1>Hello</h1>");
    }

    #[test]
    fn test_decode_content_bad_base64_is_empty() {
        assert_eq!(decode_content("!!not base64!!"), "");
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [500, 502, 503, 408, 429, 403] {
            assert!(is_retryable_status(status), "{} should retry", status);
        }
        for status in [400, 401, 404, 410, 422] {
            assert!(!is_retryable_status(status), "{} should not retry", status);
        }
    }

    #[test]
    fn test_rate_limit_wait_prefers_retry_after() {
        let response = TransportResponse {
            status: 429,
            headers: HashMap::from([
                ("retry-after".to_string(), "7".to_string()),
                ("x-ratelimit-remaining".to_string(), "0".to_string()),
                ("x-ratelimit-reset".to_string(), "0".to_string()),
            ]),
            body: String::new(),
        };
        assert_eq!(rate_limit_wait(&response), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_rate_limit_wait_none_without_hints() {
        let response = TransportResponse {
            status: 429,
            headers: HashMap::new(),
            body: String::new(),
        };
        assert_eq!(rate_limit_wait(&response), None);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let store = StoreConfig {
            repo: "acme/site".to_string(),
            branch: "main".to_string(),
            api_base: "https://api.github.com".to_string(),
        };
        let client = ClientConfig::default();
        let remote = RemoteStore::with_transport(
            store,
            client.clone(),
            Arc::new(NullTransport),
        );
        for attempt in 0u32..8 {
            let exp = (client.initial_backoff_ms * (1u64 << attempt)).min(client.max_backoff_ms);
            let delay = remote.backoff_delay(attempt).as_millis() as f64;
            assert!(delay >= exp as f64 * 0.7 - 1.0, "attempt {}: {}", attempt, delay);
            assert!(delay <= exp as f64 * 1.3 + 1.0, "attempt {}: {}", attempt, delay);
        }
    }

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(
            &self,
            _request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Network("unused".to_string()))
        }
    }
}
