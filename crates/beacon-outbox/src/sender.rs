//! Batch transport over HTTP.

use crate::{OutboxResult, TransportError};
use async_trait::async_trait;
use beacon_core::{Config, EventPayload};
use chrono::{SecondsFormat, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Largest body a teardown send may carry.
pub const UNLOAD_BODY_LIMIT: usize = 64 * 1024;

/// Timeout for the blocking teardown request.
const UNLOAD_TIMEOUT: Duration = Duration::from_secs(5);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-send options chosen by the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Gzip the request body.
    pub compression: bool,
}

/// Delivers one batch to the ingestion endpoint.
///
/// `send` resolves to `Ok(true)` when the batch was accepted, `Ok(false)` for a
/// soft rejection that should be retried, or one of the [`TransportError`]
/// kinds. `send_unload` must return immediately; its outcome is never observed.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &[EventPayload], options: SendOptions) -> Result<bool, TransportError>;

    fn send_unload(&self, batch: Vec<EventPayload>);
}

/// Wire body of a batch request.
#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    events: &'a [EventPayload],
    sent_at: String,
}

fn sent_at_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build `{host}/batch/` from an API host, ignoring trailing slashes.
pub fn batch_endpoint(host: &Url) -> OutboxResult<Url> {
    let base = host.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/batch/"))?)
}

/// Map an HTTP response onto the delivery verdict.
///
/// | Status | Result |
/// |--------|--------|
/// | 2xx | `Ok(true)` |
/// | 429 with a quota flag in the body | `QuotaExhausted` |
/// | other 4xx | `NonRetryable` |
/// | 5xx | `Retryable` |
/// | anything else | `Ok(false)` |
pub fn classify_response(status: u16, body: &str) -> Result<bool, TransportError> {
    match status {
        200..=299 => Ok(true),
        429 if is_quota_exhausted(body) => Err(TransportError::QuotaExhausted),
        400..=499 => Err(TransportError::NonRetryable {
            status,
            body: body.to_string(),
        }),
        500..=599 => Err(TransportError::Retryable(format!("HTTP {status}: {body}"))),
        _ => Ok(false),
    }
}

/// Accepts `{"quota_exhausted": true}` and `{"error": "quota_exhausted"}`.
fn is_quota_exhausted(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };

    value.get("quota_exhausted").and_then(|v| v.as_bool()) == Some(true)
        || value.get("error").and_then(|v| v.as_str()) == Some("quota_exhausted")
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Encode an uncompressed batch body no larger than `limit`.
///
/// Events are taken oldest-first until the next one would not fit. Returns the
/// body (if any event fit) and how many events it carries.
pub(crate) fn unload_body(batch: &[EventPayload], sent_at: &str, limit: usize) -> (Option<Vec<u8>>, usize) {
    let suffix = format!("],\"sent_at\":\"{sent_at}\"}}");
    let mut body = b"{\"events\":[".to_vec();
    let mut included = 0;

    for event in batch {
        let Ok(encoded) = serde_json::to_vec(event) else {
            break;
        };
        let separator = usize::from(included > 0);
        if body.len() + separator + encoded.len() + suffix.len() > limit {
            break;
        }
        if included > 0 {
            body.push(b',');
        }
        body.extend_from_slice(&encoded);
        included += 1;
    }

    if included == 0 {
        return (None, 0);
    }
    body.extend_from_slice(suffix.as_bytes());
    (Some(body), included)
}

/// Transport posting batches to `{host}/batch/`.
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl HttpTransport {
    /// Create a transport for the host and key in `config`.
    pub fn new(config: &Config) -> OutboxResult<Self> {
        let endpoint = batch_endpoint(&config.api_url()?)?;
        Self::with_endpoint(endpoint, &config.api_key)
    }

    /// Create a transport posting to an explicit endpoint.
    pub fn with_endpoint(endpoint: Url, api_key: &str) -> OutboxResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("beacon-rust/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[EventPayload], options: SendOptions) -> Result<bool, TransportError> {
        let request = BatchRequest {
            events: batch,
            sent_at: sent_at_now(),
        };
        // Status 0: the request never left the process.
        let json = serde_json::to_vec(&request).map_err(|e| TransportError::NonRetryable {
            status: 0,
            body: e.to_string(),
        })?;

        let builder = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, self.bearer());

        let builder = if options.compression {
            let compressed = gzip(&json).map_err(|e| TransportError::NonRetryable {
                status: 0,
                body: e.to_string(),
            })?;
            builder
                .header(CONTENT_ENCODING, "gzip")
                .header(CONTENT_TYPE, "text/plain")
                .body(compressed)
        } else {
            builder.header(CONTENT_TYPE, "application/json").body(json)
        };

        debug!(
            url = %self.endpoint,
            events = batch.len(),
            compression = options.compression,
            "Sending batch"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Retryable(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        classify_response(status, &body)
    }

    fn send_unload(&self, batch: Vec<EventPayload>) {
        let (body, included) = unload_body(&batch, &sent_at_now(), UNLOAD_BODY_LIMIT);
        if included < batch.len() {
            warn!(
                dropped = batch.len() - included,
                limit = UNLOAD_BODY_LIMIT,
                "Unload body limit reached, dropping newest events"
            );
        }
        let Some(body) = body else {
            return;
        };

        let endpoint = self.endpoint.clone();
        let bearer = self.bearer();

        // A plain OS thread with a blocking client outlives the async runtime.
        let spawned = std::thread::Builder::new()
            .name("beacon-unload".to_string())
            .spawn(move || {
                let client = match reqwest::blocking::Client::builder()
                    .timeout(UNLOAD_TIMEOUT)
                    .build()
                {
                    Ok(client) => client,
                    Err(e) => {
                        debug!(error = %e, "Unload client unavailable");
                        return;
                    }
                };

                match client
                    .post(endpoint)
                    .header(AUTHORIZATION, bearer)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body)
                    .send()
                {
                    Ok(response) => debug!(status = response.status().as_u16(), "Unload send finished"),
                    Err(e) => debug!(error = %e, "Unload send failed"),
                }
            });

        if let Err(e) = spawned {
            debug!(error = %e, "Could not start unload thread");
        }
    }
}
