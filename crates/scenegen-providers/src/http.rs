//! Shared HTTP plumbing for provider adapters.
//!
//! Each adapter owns one [`HttpTransport`]: a tuned `reqwest` client, the
//! per-operation timeouts, request instrumentation and the atomic download
//! routine.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, warn, Instrument};

use crate::error::{ProviderError, ProviderResult};
use crate::metrics::{record_download, record_request};

// =============================================================================
// Configuration
// =============================================================================

/// Per-operation HTTP timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub submit: Duration,
    pub query: Duration,
    pub download: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            submit: Duration::from_secs(60),
            query: Duration::from_secs(30),
            download: Duration::from_secs(120),
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// HTTP client shared by one adapter's operations.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    provider: &'static str,
    client: Client,
    timeouts: HttpTimeouts,
}

impl HttpTransport {
    pub fn new(provider: &'static str, timeouts: HttpTimeouts) -> ProviderResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("scenegen-providers/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self {
            provider,
            client,
            timeouts,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn timeouts(&self) -> &HttpTimeouts {
        &self.timeouts
    }

    /// Run one request future inside a span and record its metrics.
    pub async fn observe<T, F>(&self, operation: &str, fut: F) -> ProviderResult<T>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        let span = info_span!(
            "provider_request",
            provider = %self.provider,
            operation = %operation
        );

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        record_request(self.provider, operation, outcome, latency_ms);

        result
    }

    /// Stream `url` into `dest`; see [`download_to_file`].
    pub async fn download(&self, url: &str, dest: &Path) -> bool {
        let result = self
            .observe(
                "download",
                download_to_file(&self.client, url, dest, self.timeouts.download),
            )
            .await;

        match result {
            Ok(bytes) => {
                record_download(self.provider, bytes);
                debug!(
                    provider = self.provider,
                    bytes = bytes,
                    "Downloaded {} -> {}",
                    url,
                    dest.display()
                );
                true
            }
            Err(e) => {
                warn!(
                    provider = self.provider,
                    "Download of {} to {} failed: {}",
                    url,
                    dest.display(),
                    e
                );
                false
            }
        }
    }
}

// =============================================================================
// Response helpers
// =============================================================================

/// Read a response body as JSON, classifying non-success statuses.
pub async fn read_json(response: reqwest::Response) -> ProviderResult<Value> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::from_http_status(
            status.as_u16(),
            truncate(&body, 200),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        ProviderError::invalid_response(format!("{} (body: {})", e, truncate(&body, 200)))
    })
}

/// Numeric envelope `code`, accepting numbers and numeric strings.
pub fn envelope_code(body: &Value) -> Option<i64> {
    match body.get("code")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A job id that may be encoded as a string or a number.
pub fn json_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer status that may be encoded as a string or a number.
pub fn json_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First non-empty human-readable error among the usual field names.
pub fn error_message(value: &Value) -> Option<String> {
    ["msg", "error", "reason", "message"]
        .iter()
        .filter_map(|field| value.get(*field))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(_) => v.get("message").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

// =============================================================================
// Downloads
// =============================================================================

/// Sibling temp path a download is streamed into before the final rename.
pub fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    dest.with_file_name(format!("{}.part", name))
}

/// Stream `url` into `dest` atomically.
///
/// The body goes to a sibling `.part` file which is renamed over `dest` only
/// after the whole body (and the advertised `Content-Length`, if any) has
/// been written and synced. On any failure the temp file is removed and
/// `dest` is left untouched.
pub async fn download_to_file(
    client: &Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> ProviderResult<u64> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = part_path(dest);

    let written = match stream_to(client, url, &tmp, timeout).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
    };

    if let Err(e) = tokio::fs::rename(&tmp, dest).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    Ok(written)
}

async fn stream_to(
    client: &Client,
    url: &str,
    tmp: &Path,
    timeout: Duration,
) -> ProviderResult<u64> {
    let response = client.get(url).timeout(timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::from_http_status(
            status.as_u16(),
            format!("download of {} failed", url),
        ));
    }

    let expected = response.content_length();
    let mut file = tokio::fs::File::create(tmp).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;

    if let Some(expected) = expected {
        if expected != written {
            return Err(ProviderError::Truncated {
                expected,
                actual: written,
            });
        }
    }

    if written == 0 {
        return Err(ProviderError::invalid_response("empty download body"));
    }

    Ok(written)
}
