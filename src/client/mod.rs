//! # Request Client
//!
//! ## Responsibility
//! Turn a [`Payload`] into a POST against one of the OpenAI-compatible
//! endpoints, and record what the response says about itself (status,
//! latency, token usage) into the [`MetricSink`] and the Prometheus mirror.
//!
//! ## Guarantees
//! - Non-retrying: a transport failure is returned to the caller unchanged
//! - Non-fatal decoding: a body that is not JSON still yields the raw
//!   [`Response`], with a diagnostic attached and a preview logged
//! - `tokens_per_second` is only recorded for a positive send-to-last-byte time
//!
//! ## NOT Responsible For
//! - Backoff and retry policy (that belongs to the iteration body)
//! - Connection pooling and TLS (that belongs to the [`Transport`])

pub mod decode;
pub mod payload;

pub use decode::{get_content, get_embeddings, Content, Usage};
pub use payload::{Message, Payload};

use crate::sink::{labels, Labels, MetricSink};
use crate::{metrics, HarnessError};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// `POST /v1/completions`
    Completion,
    /// `POST /v1/chat/completions`
    ChatCompletion,
    /// `POST /v1/embeddings`
    Embedding,
}

impl EndpointKind {
    /// URL path appended to the base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::Completion => "/v1/completions",
            Self::ChatCompletion => "/v1/chat/completions",
            Self::Embedding => "/v1/embeddings",
        }
    }

    /// Low-cardinality label for metrics.
    pub fn label(self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::ChatCompletion => "chat_completion",
            Self::Embedding => "embedding",
        }
    }

    /// `true` for the two completion endpoints.
    pub fn is_completion(self) -> bool {
        matches!(self, Self::Completion | Self::ChatCompletion)
    }
}

/// Timing breakdown of one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    /// Time spent writing the request.
    pub sending: Duration,
    /// Time from request written to first response byte.
    pub waiting: Duration,
    /// Time spent reading the response body.
    pub receiving: Duration,
    /// Total request time.
    pub duration: Duration,
}

/// A raw HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes.
    pub body: Bytes,
    /// Timing breakdown.
    pub timings: Timings,
}

impl Response {
    /// `true` for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: reqwest::Method,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Bytes,
}

/// Sends one HTTP request.
///
/// Implementations must be thread-safe (Send + Sync) so a single transport can
/// be shared by every worker via `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and read the full response body.
    ///
    /// A non-2xx status is a successful send. Connection failures, DNS
    /// failures and timeouts are [`HarnessError::Transport`].
    async fn send(&self, request: TransportRequest) -> Result<Response, HarnessError>;
}

/// [`Transport`] backed by `reqwest`.
///
/// `waiting` is measured up to the response headers and `receiving` covers the
/// body read. `reqwest` does not expose write completion, so `sending` is
/// reported as zero.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Transport`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, HarnessError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarnessError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<Response, HarnessError> {
        let TransportRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let started = Instant::now();
        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|e| HarnessError::Transport(format!("request to {url} failed: {e}")))?;
        let waiting = started.elapsed();

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| HarnessError::Transport(format!("reading body from {url} failed: {e}")))?;
        let duration = started.elapsed();

        Ok(Response {
            status,
            body,
            timings: Timings {
                sending: Duration::ZERO,
                waiting,
                receiving: duration.saturating_sub(waiting),
                duration,
            },
        })
    }
}

/// A response plus what the client could decode from it.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    /// The raw response.
    pub response: Response,
    /// Decoded `usage`, when the body carried one.
    pub usage: Option<Usage>,
    /// Set when the body could not be decoded as JSON.
    pub diagnostic: Option<String>,
}

impl ClientResponse {
    /// See [`get_content`].
    ///
    /// # Errors
    ///
    /// [`HarnessError::Decode`] when the body has none of the known shapes.
    pub fn content(&self) -> Result<Content, HarnessError> {
        get_content(&self.response)
    }

    /// See [`get_embeddings`].
    ///
    /// # Errors
    ///
    /// [`HarnessError::Decode`] when the body is not an embeddings response.
    pub fn embeddings(&self) -> Result<Vec<Vec<f64>>, HarnessError> {
        get_embeddings(&self.response)
    }
}

/// Typed operations over a [`Transport`] for one API base URL.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use tokio_prompt_loadtest::client::{payload, HttpTransport, RequestClient};
/// use tokio_prompt_loadtest::MetricSink;
///
/// # async fn demo() -> Result<(), tokio_prompt_loadtest::HarnessError> {
/// let sink = Arc::new(MetricSink::new());
/// let client = RequestClient::new(
///     Arc::new(HttpTransport::new(std::time::Duration::from_secs(30))?),
///     "https://api.openai.com",
///     sink,
/// )
/// .with_bearer("sk-...")
/// .with_option("model", json!("gpt-3.5-turbo"));
///
/// let reply = client
///     .chat_complete(payload::chat_completion(&[payload::Message::user("hi")], json!({})))
///     .await?;
/// println!("{:?}", reply.content()?);
/// # Ok(())
/// # }
/// ```
pub struct RequestClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    headers: Vec<(String, String)>,
    options: Map<String, Value>,
    sink: Arc<MetricSink>,
    network_debug: bool,
}

impl RequestClient {
    /// Create a client for `base_url` that records into `sink`.
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        sink: Arc<MetricSink>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: Vec::new(),
            options: Map::new(),
            sink,
            network_debug: false,
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_bearer(self, key: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {key}"))
    }

    /// Send an extra header with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Merge `key: value` into every payload, after caller overrides.
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Log method, URL and status of every request at `debug` level.
    pub fn with_network_debug(mut self, enabled: bool) -> Self {
        self.network_debug = enabled;
        self
    }

    /// The sink this client records into.
    pub fn sink(&self) -> &Arc<MetricSink> {
        &self.sink
    }

    /// `POST /v1/completions`.
    ///
    /// # Errors
    ///
    /// See [`RequestClient::send`].
    pub async fn complete(&self, payload: Payload) -> Result<ClientResponse, HarnessError> {
        self.send(EndpointKind::Completion, payload).await
    }

    /// `POST /v1/chat/completions`.
    ///
    /// # Errors
    ///
    /// See [`RequestClient::send`].
    pub async fn chat_complete(&self, payload: Payload) -> Result<ClientResponse, HarnessError> {
        self.send(EndpointKind::ChatCompletion, payload).await
    }

    /// `POST /v1/embeddings`.
    ///
    /// # Errors
    ///
    /// See [`RequestClient::send`].
    pub async fn embed(&self, payload: Payload) -> Result<ClientResponse, HarnessError> {
        self.send(EndpointKind::Embedding, payload).await
    }

    /// Send `payload` to `kind` and record request and usage metrics.
    ///
    /// Every request records `http_req_duration` (ms) and `http_req_failed`.
    /// When the body carries `usage`, completion endpoints record
    /// `prompt_tokens`, `completion_tokens`, `total_tokens` and
    /// `tokens_per_second`; the embedding endpoint records `embedding_tokens`
    /// and `total_tokens`.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Transport`] from the transport, unchanged. A non-2xx
    /// status or an undecodable body is not an error.
    pub async fn send(
        &self,
        kind: EndpointKind,
        payload: Payload,
    ) -> Result<ClientResponse, HarnessError> {
        let body = payload.merged_with(&self.options).into_value();
        let body = serde_json::to_vec(&body)
            .map_err(|e| HarnessError::Other(format!("payload serialization failed: {e}")))?;

        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        headers.extend(self.headers.iter().cloned());

        let url = format!("{}{}", self.base_url, kind.path());
        let request = TransportRequest {
            method: reqwest::Method::POST,
            url: url.clone(),
            headers,
            body: Bytes::from(body),
        };

        let endpoint = labels(&[("endpoint", kind.label())]);
        metrics::inc_request(kind.label());

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.sink.add_rate("http_req_failed", true, endpoint);
                metrics::inc_error(kind.label(), e.kind());
                if self.network_debug {
                    debug!(method = "POST", url = %url, error = %e, "HTTP request failed");
                }
                return Err(e);
            }
        };

        if self.network_debug {
            debug!(method = "POST", url = %url, status = response.status, "HTTP");
        }

        let elapsed = response.timings.duration;
        self.sink
            .add_trend("http_req_duration", millis(elapsed), endpoint.clone());
        self.sink
            .add_rate("http_req_failed", !response.is_success(), endpoint);
        metrics::record_request_latency(kind.label(), elapsed);
        if !response.is_success() {
            metrics::inc_error(kind.label(), "status");
        }

        let (usage, diagnostic) = match decode::parse_json(&response.body) {
            Some(body) => (decode::usage_of(&body), None),
            None => {
                warn!(
                    status = response.status,
                    endpoint = kind.label(),
                    preview = %decode::preview(&response.body),
                    "response body is not JSON"
                );
                (None, Some(format!("status {}: body is not JSON", response.status)))
            }
        };

        if let Some(usage) = usage {
            self.record_usage(kind, &usage, &response.timings);
        }

        Ok(ClientResponse {
            response,
            usage,
            diagnostic,
        })
    }

    fn record_usage(&self, kind: EndpointKind, usage: &Usage, timings: &Timings) {
        let none = Labels::new;
        if kind.is_completion() {
            self.sink
                .add_trend("prompt_tokens", usage.prompt_tokens as f64, none());
            self.sink
                .add_trend("completion_tokens", usage.completion_tokens as f64, none());
            self.sink
                .add_trend("total_tokens", usage.total_tokens as f64, none());

            let secs = timings.duration.as_secs_f64() - timings.sending.as_secs_f64();
            if secs > 0.0 {
                self.sink.add_trend(
                    "tokens_per_second",
                    usage.completion_tokens as f64 / secs,
                    none(),
                );
            }
        } else {
            self.sink
                .add_trend("embedding_tokens", usage.prompt_tokens as f64, none());
            self.sink
                .add_trend("total_tokens", usage.total_tokens as f64, none());
        }
    }
}

/// Duration as fractional milliseconds.
pub(crate) fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
