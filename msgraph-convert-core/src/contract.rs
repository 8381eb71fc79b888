//! # contract: the two capabilities the converter is built on
//!
//! The conversion pipeline needs exactly two things from the outside world:
//!
//! - a [`CredentialProvider`] that turns an [`crate::config::AuthConfig`] into a
//!   bearer token (OAuth2 client-credentials grant), and
//! - a [`FileTransferClient`] that moves bytes to and from a site drive: plain PUT,
//!   `format=pdf` GET, DELETE, and the upload-session protocol for large files.
//!
//! Production implementations live in the `msgraph-convert` crate and speak HTTPS.
//! Both traits are annotated for `mockall`, so the pipeline can be exercised
//! deterministically in tests without a tenant.
//!
//! ## Error contract
//! - Credential failures are [`AuthenticationError`]s.
//! - Drive failures are [`TransportError`]s; HTTP 401 must be reported as
//!   [`TransportError::Unauthorized`] so the converter can refresh the token.

use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};

#[allow(unused_imports)]
use mockall::{automock, predicate::*};

use crate::error::{AuthenticationError, TransportError};

/// A bearer token and the instant it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expires_at: Instant,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Token issued now and valid for `lifetime`.
    pub fn expiring_in(secret: impl Into<String>, lifetime: Duration) -> Self {
        Self::new(secret, Instant::now() + lifetime)
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Remaining lifetime, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// True when the token expires within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.remaining() <= margin
    }

    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.secret)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Server-issued handle for a resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Pre-authenticated URL; slices are PUT here without an Authorization header.
    pub upload_url: String,
    pub expiration: Option<String>,
}

/// What the service said about one uploaded slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceOutcome {
    /// More bytes are expected (HTTP 202).
    Accepted { next_expected_ranges: Vec<String> },
    /// The last byte arrived and the drive item now exists (HTTP 200/201).
    Completed,
}

/// OAuth2 client-credentials exchange.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns a bearer token valid for the drive API.
    async fn get_token(&self) -> Result<AccessToken, AuthenticationError>;

    /// Forget any cached token so the next `get_token` performs a fresh exchange.
    async fn invalidate(&self) {}
}

/// Remote drive operations, addressed by temporary item name under the drive root.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FileTransferClient: Send + Sync {
    /// Single PUT of the whole content. Only valid for small files.
    async fn upload(
        &self,
        token: &AccessToken,
        temp_name: &str,
        media_type: &str,
        content: &[u8],
    ) -> Result<(), TransportError>;

    /// GET the item with `format=pdf`; the service renders on read.
    async fn download_converted(
        &self,
        token: &AccessToken,
        temp_name: &str,
    ) -> Result<Vec<u8>, TransportError>;

    /// Remove the temporary item (moves it to the site recycle bin).
    async fn delete(&self, token: &AccessToken, temp_name: &str) -> Result<(), TransportError>;

    /// Open an upload session for an item that will be sent in slices.
    async fn create_upload_session(
        &self,
        token: &AccessToken,
        temp_name: &str,
    ) -> Result<UploadSession, TransportError>;

    /// PUT bytes `[offset, offset + content.len())` of a `total`-byte upload.
    async fn upload_slice(
        &self,
        session: &UploadSession,
        offset: u64,
        total: u64,
        content: &[u8],
    ) -> Result<SliceOutcome, TransportError>;

    /// Abandon an upload session so no partial upload lingers server-side.
    async fn cancel_upload_session(&self, session: &UploadSession) -> Result<(), TransportError>;
}
