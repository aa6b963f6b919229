//! Remote parsing: upload a document and fetch its element list.
//!
//! This is the only stage with network I/O. One call to
//! [`RemoteParseClient::parse`] sends the file as `multipart/form-data` to
//! the configured endpoint and decodes the JSON answer into a [`Document`].
//!
//! ## Retry Strategy
//!
//! Failures are split in two:
//!
//! * **transient**: timeouts, refused or reset connections, a body that
//!   breaks off mid-read, HTTP 5xx, 408 and 429. Retried with exponential
//!   backoff (`retry_backoff_ms * 2^(n-1)`, capped at `max_backoff_ms`). A
//!   `Retry-After` header can lengthen the next wait but never shorten it.
//! * **terminal**: any other non-success status. Returned at once as
//!   [`ConversionError::RequestRejected`]; retrying a bad key or a rejected
//!   upload cannot help.
//!
//! A success status with an undecodable body is
//! [`ConversionError::MalformedResponse`] and is not retried either.
//!
//! ## Resources and cancellation
//!
//! Each `parse` builds its own `reqwest::Client`, so connections are closed
//! when the call returns. Dropping the future (e.g. because the uploader
//! disconnected) aborts the in-flight request.

use crate::config::{strategy_for_file, ConversionConfig, ParseStrategy};
use crate::element::Document;
use crate::error::ConversionError;
use crate::pipeline::decode::decode_elements;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode, Url};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Longest error body excerpt carried into an error message.
const MAX_ERROR_DETAIL_CHARS: usize = 200;

/// How many times, how long, and how patiently to call the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Bound for a single attempt.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_backoff: Duration,
    /// Ceiling for any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            timeout: config.api_timeout,
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.retry_backoff_ms.max(1)),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(1)),
        }
    }

    /// Total number of requests the policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// Never shorter than `previous`, never zero, never above `max_backoff`
    /// unless `previous` already was.
    pub fn delay_before(&self, retry: u32, previous: Duration, hint: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        let exponential = self.base_backoff.saturating_mul(factor);
        let wanted = hint.map_or(exponential, |h| exponential.max(h));
        wanted
            .min(self.max_backoff)
            .max(previous)
            .max(Duration::from_millis(1))
    }
}

/// Client for an Unstructured-style partition endpoint.
#[derive(Debug, Clone)]
pub struct RemoteParseClient {
    endpoint: Url,
    api_key: Option<String>,
    api_key_header: String,
    strategy: ParseStrategy,
    ocr: bool,
    policy: RetryPolicy,
}

/// Why one attempt failed.
#[derive(Debug)]
enum AttemptError {
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },
    Terminal(ConversionError),
}

impl RemoteParseClient {
    /// Build a client from a validated configuration.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, ConversionError> {
        config.validate()?;
        let endpoint = Url::parse(&config.api_url)
            .map_err(|e| ConversionError::InvalidConfig(format!("api_url: {e}")))?;
        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            api_key_header: config.api_key_header.clone(),
            strategy: config.strategy,
            ocr: config.ocr,
            policy: RetryPolicy::from_config(config),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upload the file at `path` and return its elements.
    pub async fn parse(&self, path: &Path) -> Result<Document, ConversionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ConversionError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.parse_bytes(&file_name, &bytes).await
    }

    /// Upload an in-memory document. `file_name` picks the content type and
    /// is reported to the service.
    pub async fn parse_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Document, ConversionError> {
        let strategy = strategy_for_file(self.strategy, self.ocr, file_name);
        info!(
            "Parsing '{}' ({} bytes, strategy {}) via {}",
            file_name,
            bytes.len(),
            strategy,
            self.endpoint
        );

        let http = reqwest::Client::builder()
            .connect_timeout(self.policy.timeout)
            .build()
            .map_err(|e| ConversionError::Internal(format!("HTTP client: {e}")))?;

        let start = Instant::now();
        let mut last_error = String::from("no attempt made");
        let mut delay = Duration::ZERO;
        let mut hint: Option<Duration> = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                delay = self.policy.delay_before(attempt, delay, hint.take());
                warn!(
                    "'{}': retry {}/{} after {}ms",
                    file_name,
                    attempt,
                    self.policy.max_retries,
                    delay.as_millis()
                );
                sleep(delay).await;
            }

            match self.send_once(&http, file_name, bytes, strategy).await {
                Ok(body) => {
                    debug!(
                        "'{}': {} byte response after {} attempt(s) in {:?}",
                        file_name,
                        body.len(),
                        attempt + 1,
                        start.elapsed()
                    );
                    return decode_elements(&body);
                }
                Err(AttemptError::Terminal(e)) => {
                    warn!("'{}': request rejected: {}", file_name, e);
                    return Err(e);
                }
                Err(AttemptError::Transient {
                    reason,
                    retry_after,
                }) => {
                    warn!(
                        "'{}': attempt {} failed: {}",
                        file_name,
                        attempt + 1,
                        reason
                    );
                    last_error = reason;
                    hint = retry_after;
                }
            }
        }

        Err(ConversionError::ServiceUnavailable {
            attempts: self.policy.max_attempts(),
            last_error,
        })
    }

    async fn send_once(
        &self,
        http: &reqwest::Client,
        file_name: &str,
        bytes: &[u8],
        strategy: ParseStrategy,
    ) -> Result<Vec<u8>, AttemptError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(content_type_for(file_name))
            .map_err(|e| AttemptError::Terminal(ConversionError::Internal(e.to_string())))?;
        let form = Form::new()
            .part("files", part)
            .text("strategy", strategy.as_str());

        let mut request = http
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .timeout(self.policy.timeout)
            .multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.header(self.api_key_header.as_str(), key.as_str());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await.map_err(transport_error)?;
            return Ok(body.to_vec());
        }

        let retry_after = retry_after(&response);
        let detail = error_detail(&response.text().await.unwrap_or_default());

        if is_transient_status(status) {
            Err(AttemptError::Transient {
                reason: format!("HTTP {}: {}", status.as_u16(), detail),
                retry_after,
            })
        } else {
            Err(AttemptError::Terminal(ConversionError::RequestRejected {
                status: status.as_u16(),
                detail,
            }))
        }
    }
}

/// Statuses worth retrying.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Content type sent for the uploaded file, by extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        _ => "application/octet-stream",
    }
}

/// Classify a reqwest failure that happened before a status was available.
fn transport_error(e: reqwest::Error) -> AttemptError {
    if e.is_builder() {
        return AttemptError::Terminal(ConversionError::InvalidConfig(error_chain(&e)));
    }
    // Redirect loops and undecodable success bodies fail the same way on
    // every attempt. TLS handshake failures surface as connect errors.
    if e.is_redirect() {
        return AttemptError::Terminal(ConversionError::InvalidConfig(format!(
            "redirect: {}",
            error_chain(&e)
        )));
    }
    if e.is_decode() {
        return AttemptError::Terminal(ConversionError::MalformedResponse {
            detail: error_chain(&e),
        });
    }
    let reason = if e.is_timeout() {
        format!("timed out: {}", error_chain(&e))
    } else if e.is_connect() {
        format!("connection failed: {}", error_chain(&e))
    } else {
        error_chain(&e)
    };
    AttemptError::Transient {
        reason,
        retry_after: None,
    }
}

/// `e` and its sources joined, so "connection reset" survives wrapping.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        msg.push_str(": ");
        msg.push_str(&inner.to_string());
        source = inner.source();
    }
    msg
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Human-readable excerpt of an error body.
///
/// FastAPI-style `{"detail": …}` bodies yield the detail; anything else is
/// truncated text.
fn error_detail(body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned())
        .map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.trim().to_string());

    if detail.chars().count() > MAX_ERROR_DETAIL_CHARS {
        let mut cut: String = detail.chars().take(MAX_ERROR_DETAIL_CHARS).collect();
        cut.push('…');
        cut
    } else if detail.is_empty() {
        "<empty body>".to_string()
    } else {
        detail
    }
}
