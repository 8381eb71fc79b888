//! Token caching in front of any [`CredentialProvider`].

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::contract::{AccessToken, CredentialProvider};
use crate::error::AuthenticationError;

/// Reuses a token until it is within `refresh_margin` of expiry.
///
/// Concurrent callers serialise on the cache lock, so at most one exchange is in
/// flight per cache.
pub struct CachedCredential<P> {
    inner: P,
    refresh_margin: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl<P: CredentialProvider> CachedCredential<P> {
    pub fn new(inner: P, refresh_margin: Duration) -> Self {
        Self {
            inner,
            refresh_margin,
            cached: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: CredentialProvider> CredentialProvider for CachedCredential<P> {
    async fn get_token(&self) -> Result<AccessToken, AuthenticationError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.expires_within(self.refresh_margin) {
                debug!(remaining = ?token.remaining(), "[AUTH] Reusing cached token");
                return Ok(token.clone());
            }
            debug!("[AUTH] Cached token is near expiry, refreshing");
        }
        let token = self.inner.get_token().await?;
        info!(lifetime = ?token.remaining(), "[AUTH] Acquired new access token");
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self) {
        debug!("[AUTH] Dropping cached token");
        *self.cached.lock().await = None;
        self.inner.invalidate().await;
    }
}
