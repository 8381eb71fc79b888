use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Upload-session slices must be a multiple of this many bytes.
pub const SLICE_ALIGNMENT: usize = 320 * 1024;
/// Simple PUT uploads are limited to 4 MiB by the service.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 4 * 1024 * 1024;
pub const DEFAULT_SLICE_SIZE: usize = 10 * SLICE_ALIGNMENT;
pub const DEFAULT_MAX_SLICE_ATTEMPTS: u32 = 3;
pub const DEFAULT_TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Which Azure AD token endpoint the client-credentials grant is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenEndpoint {
    /// `/{tenant}/oauth2/token` with a `resource` parameter.
    V1,
    /// `/{tenant}/oauth2/v2.0/token` with the `/.default` scope.
    #[default]
    V2,
}

/// Credentials and target site for one converter instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: String,
    pub site_id: String,
    #[serde(default)]
    pub token_endpoint: TokenEndpoint,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

impl AuthConfig {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        site_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            site_id: site_id.into(),
            token_endpoint: TokenEndpoint::default(),
            authority_host: default_authority_host(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            tenant_id = %self.tenant_id,
            client_id = %self.client_id,
            site_id = %self.site_id,
            token_endpoint = ?self.token_endpoint,
            secret_set = !self.client_secret.is_empty(),
            "Loaded AuthConfig"
        );
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("site_id", &self.site_id)
            .field("token_endpoint", &self.token_endpoint)
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

/// Tunables for the upload/convert/download pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterSettings {
    /// Drive API root, e.g. `https://graph.microsoft.com/v1.0`.
    pub graph_base_url: String,
    /// Inputs strictly larger than this go through an upload session.
    pub large_file_threshold: u64,
    pub slice_size: usize,
    pub max_slice_attempts: u32,
    /// Cached tokens are refreshed this long before they expire.
    pub token_refresh_margin: Duration,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
            slice_size: DEFAULT_SLICE_SIZE,
            max_slice_attempts: DEFAULT_MAX_SLICE_ATTEMPTS,
            token_refresh_margin: DEFAULT_TOKEN_REFRESH_MARGIN,
        }
    }
}

impl ConverterSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slice_size == 0 || self.slice_size % SLICE_ALIGNMENT != 0 {
            return Err(ConfigError::SliceSize {
                got: self.slice_size,
                multiple: SLICE_ALIGNMENT,
            });
        }
        if self.max_slice_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.graph_base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            graph_base_url = %self.graph_base_url,
            large_file_threshold = self.large_file_threshold,
            slice_size = self.slice_size,
            max_slice_attempts = self.max_slice_attempts,
            "Loaded ConverterSettings"
        );
        debug!(?self, "ConverterSettings loaded (full debug)");
    }
}
