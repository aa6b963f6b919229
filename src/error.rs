//! Error types for the edgequake-doc2md library.
//!
//! Every conversion failure surfaces as one [`ConversionError`]. The three
//! remote-service variants form the core taxonomy the HTTP layer maps to
//! status codes:
//!
//! * [`ConversionError::RequestRejected`]: the service refused the request
//!   (bad credential, malformed upload). Terminal; never retried.
//! * [`ConversionError::ServiceUnavailable`]: the service kept failing
//!   transiently until the retry budget ran out.
//! * [`ConversionError::MalformedResponse`]: the service answered with a
//!   success status but the body is not a list of element records.
//!
//! Rendering never produces an error: an element the renderer cannot
//! classify degrades to a verbatim paragraph instead.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-doc2md library.
#[derive(Debug, Error)]
pub enum ConversionError {
    // ── Remote service errors ─────────────────────────────────────────────
    /// The parsing service rejected the request with a non-transient status.
    #[error("Parsing service rejected the request (HTTP {status}): {detail}")]
    RequestRejected { status: u16, detail: String },

    /// The parsing service stayed unreachable or erroring for every attempt.
    #[error("Parsing service unavailable after {attempts} attempt(s): {last_error}")]
    ServiceUnavailable { attempts: u32, last_error: String },

    /// A success response whose body is not a sequence of element records.
    #[error("Parsing service returned a malformed response: {detail}")]
    MalformedResponse { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The input document could not be read.
    #[error("Failed to read input file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder, file or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    /// HTTP status the upload layer should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ConversionError::RequestRejected { .. } => 400,
            ConversionError::ServiceUnavailable { .. } => 503,
            ConversionError::MalformedResponse { .. } => 502,
            ConversionError::FileRead { .. }
            | ConversionError::OutputWriteFailed { .. }
            | ConversionError::InvalidConfig(_)
            | ConversionError::Internal(_) => 500,
        }
    }

    /// Whether resubmitting the same document later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConversionError::ServiceUnavailable { .. })
    }
}
