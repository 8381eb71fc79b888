/// `load_config` module: Loads a static YAML config and injects the client secret from the environment.
///
/// This module is the only place where untrusted YAML is parsed and mapped to the
/// strongly-typed [`AuthConfig`] and [`ConverterSettings`] of the core crate.
///
/// # Responsibilities
/// - Parse the `auth` section (tenant, client, site, endpoint generation)
/// - Apply defaults for the optional `converter` section and validate it
/// - Inject `MSGRAPH_CLIENT_SECRET` from the environment; the secret never lives in YAML
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::Result;
use msgraph_convert_core::config::{AuthConfig, ConverterSettings, TokenEndpoint, DEFAULT_AUTHORITY_HOST};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

pub const CLIENT_SECRET_ENV: &str = "MSGRAPH_CLIENT_SECRET";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug)]
pub struct CliConfig {
    pub auth: AuthConfig,
    pub converter: ConverterSettings,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthSection {
    tenant_id: String,
    client_id: String,
    site_id: String,
    #[serde(default)]
    token_endpoint: TokenEndpoint,
    #[serde(default)]
    authority_host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConverterSection {
    graph_base_url: Option<String>,
    large_file_threshold: Option<u64>,
    slice_size: Option<usize>,
    max_slice_attempts: Option<u32>,
    token_refresh_margin_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    auth: AuthSection,
    #[serde(default)]
    converter: ConverterSection,
}

/// Loads a static YAML config file (no secrets) and injects the client secret from env.
/// Returns a validated CLI config.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let client_secret = match std::env::var(CLIENT_SECRET_ENV) {
        Ok(secret) if !secret.trim().is_empty() => {
            info!("{} found in env", CLIENT_SECRET_ENV);
            secret
        }
        Ok(_) => {
            error!("{} is set but empty", CLIENT_SECRET_ENV);
            anyhow::bail!("{CLIENT_SECRET_ENV} environment variable is empty");
        }
        Err(e) => {
            error!(error = ?e, "{} environment variable not set", CLIENT_SECRET_ENV);
            return Err(anyhow::anyhow!(
                "{CLIENT_SECRET_ENV} environment variable not set: {e}"
            ));
        }
    };

    let auth = AuthConfig {
        tenant_id: raw.auth.tenant_id,
        client_id: raw.auth.client_id,
        client_secret,
        site_id: raw.auth.site_id,
        token_endpoint: raw.auth.token_endpoint,
        authority_host: raw
            .auth
            .authority_host
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
    };

    let defaults = ConverterSettings::default();
    let section = raw.converter;
    let converter = ConverterSettings {
        graph_base_url: section.graph_base_url.unwrap_or(defaults.graph_base_url),
        large_file_threshold: section
            .large_file_threshold
            .unwrap_or(defaults.large_file_threshold),
        slice_size: section.slice_size.unwrap_or(defaults.slice_size),
        max_slice_attempts: section
            .max_slice_attempts
            .unwrap_or(defaults.max_slice_attempts),
        token_refresh_margin: section
            .token_refresh_margin_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.token_refresh_margin),
    };
    if let Err(e) = converter.validate() {
        error!(error = %e, "Invalid converter section in config");
        anyhow::bail!("Invalid converter settings: {e}");
    }

    let request_timeout = section
        .request_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

    auth.trace_loaded();
    info!(
        site_id = %auth.site_id,
        graph_base_url = %converter.graph_base_url,
        "Config loaded and merged successfully"
    );

    Ok(CliConfig {
        auth,
        converter,
        request_timeout,
    })
}
