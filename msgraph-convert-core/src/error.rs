//! Error taxonomy for the conversion pipeline.
//!
//! * [`AuthenticationError`]: the client-credentials exchange failed. Raised
//!   before any drive call is made.
//! * [`TransportError`]: a drive request (upload, download, delete, slice)
//!   failed on the wire or returned a non-2xx status.
//! * [`ConversionError`]: what callers of [`crate::convert::PdfConverter`]
//!   see. Every failure of one `convert` call is folded into a single variant
//!   that keeps the original cause as its `source()`.
//! * [`ConfigError`]: converter settings that the remote API would reject.

use thiserror::Error;

/// Boxed cause used where the underlying HTTP stack's error type must not leak into core.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// A required credential field was empty or absent.
    #[error("credential field `{0}` is missing or blank")]
    MissingField(&'static str),

    /// The token endpoint could not be reached.
    #[error("token request failed: {0}")]
    Request(#[source] BoxError),

    /// The token endpoint answered with a non-2xx status.
    #[error("token endpoint rejected the client credentials (HTTP {status}): {error}{}", describe(.description))]
    Rejected {
        status: u16,
        error: String,
        description: Option<String>,
    },

    /// The token endpoint answered 2xx but the body was not a usable token.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" - {d}"))
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{operation} request failed: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// HTTP 401; the bearer token is expired or revoked.
    #[error("{operation} was rejected as unauthorized (HTTP 401)")]
    Unauthorized { operation: &'static str },

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation} returned an unreadable response: {detail}")]
    MalformedResponse {
        operation: &'static str,
        detail: String,
    },
}

impl TransportError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("slice_size must be a positive multiple of {multiple} bytes, got {got}")]
    SliceSize { got: usize, multiple: usize },

    #[error("max_slice_attempts must be at least 1")]
    ZeroAttempts,

    #[error("graph_base_url must not be empty")]
    EmptyBaseUrl,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("unsupported document extension `{0}`")]
    UnsupportedExtension(String),

    #[error("failed to read conversion input: {0}")]
    Input(#[from] std::io::Error),

    #[error("upload of temporary item `{temp_name}` failed: {source}")]
    Upload {
        temp_name: String,
        #[source]
        source: TransportError,
    },

    #[error("slice at offset {offset} of `{temp_name}` failed after {attempts} attempt(s): {source}")]
    SliceUploadFailed {
        temp_name: String,
        offset: u64,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("download of converted `{temp_name}` failed: {source}")]
    Download {
        temp_name: String,
        #[source]
        source: TransportError,
    },

    /// Non-2xx on the `format=pdf` GET: the service could not render the document.
    #[error("remote service could not render `{temp_name}` (HTTP {status}): {body}")]
    Rejected {
        temp_name: String,
        status: u16,
        body: String,
    },

    #[error("converted output is not a PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    #[error("invalid converter settings: {0}")]
    Config(#[from] ConfigError),
}
