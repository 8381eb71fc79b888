#![doc = "Drive transfer over Microsoft Graph: bridges the core FileTransferClient contract to HTTPS calls against a SharePoint site drive."]
//
//! # Graph drive client
//!
//! [`GraphClient`] implements [`FileTransferClient`] for the drive of one
//! SharePoint site. Every temporary item lives directly under the drive root and
//! is addressed by path, so no item ids need to be tracked:
//!
//! - upload: `PUT {base}/sites/{site}/drive/items/root:/{name}:/content`
//! - convert: `GET {base}/sites/{site}/drive/items/root:/{name}:/content?format=pdf`
//! - delete: `DELETE {base}/sites/{site}/drive/items/root:/{name}:`
//! - large files: `POST …/root:/{name}:/createUploadSession`, then ranged PUTs to
//!   the returned pre-authenticated URL.
//!
//! HTTP 401 is reported as [`TransportError::Unauthorized`] so the converter can
//! refresh its token; any other non-2xx becomes [`TransportError::Status`].
//!
//! [`build_converter`] wires a [`GraphClient`] and a cached
//! [`ClientSecretCredential`] into a ready-to-use [`PdfConverter`].

use anyhow::Context;
use async_trait::async_trait;
use msgraph_convert_core::config::{AuthConfig, ConverterSettings};
use msgraph_convert_core::contract::{AccessToken, FileTransferClient, SliceOutcome, UploadSession};
use msgraph_convert_core::convert::PdfConverter;
use msgraph_convert_core::error::TransportError;
use msgraph_convert_core::token_cache::CachedCredential;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::auth::ClientSecretCredential;

/// The production converter: cached client-secret credential plus Graph drive transfer.
pub type GraphPdfConverter = PdfConverter<CachedCredential<ClientSecretCredential>, GraphClient>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    upload_url: String,
    #[serde(default)]
    expiration_date_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SliceAcceptedResponse {
    #[serde(default)]
    next_expected_ranges: Vec<String>,
}

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    site_id: String,
}

impl GraphClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, site_id: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let site_id = site_id.into();
        tracing::info!(base_url = %base_url, site_id = %site_id, "Initialized GraphClient");
        Self {
            http,
            base_url,
            site_id,
        }
    }

    /// `…/drive/items/root:/{name}:`
    pub fn item_url(&self, temp_name: &str) -> String {
        format!(
            "{}/sites/{}/drive/items/root:/{}:",
            self.base_url, self.site_id, temp_name
        )
    }

    pub fn content_url(&self, temp_name: &str) -> String {
        format!("{}/content", self.item_url(temp_name))
    }

    async fn send(
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, TransportError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(error = ?e, operation, "Drive request failed to send");
            TransportError::Request {
                operation,
                source: Box::new(e),
            }
        })?;
        check_status(operation, response).await
    }
}

async fn check_status(operation: &'static str, response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        tracing::warn!(operation, "Drive rejected the bearer token");
        return Err(TransportError::Unauthorized { operation });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(operation, status = status.as_u16(), body = %body, "Drive returned an error status");
        return Err(TransportError::Status {
            operation,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[async_trait]
impl FileTransferClient for GraphClient {
    async fn upload(
        &self,
        token: &AccessToken,
        temp_name: &str,
        media_type: &str,
        content: &[u8],
    ) -> Result<(), TransportError> {
        tracing::info!(temp_name, bytes = content.len(), "Uploading temporary item");
        let request = self
            .http
            .put(self.content_url(temp_name))
            .header(AUTHORIZATION, token.authorization_header())
            .header(CONTENT_TYPE, media_type)
            .body(content.to_vec());
        Self::send("upload", request).await?;
        tracing::info!(temp_name, "Successfully uploaded temporary item");
        Ok(())
    }

    async fn download_converted(
        &self,
        token: &AccessToken,
        temp_name: &str,
    ) -> Result<Vec<u8>, TransportError> {
        tracing::info!(temp_name, "Downloading PDF rendition");
        let request = self
            .http
            .get(self.content_url(temp_name))
            .query(&[("format", "pdf")])
            .header(AUTHORIZATION, token.authorization_header());
        let response = Self::send("download converted", request).await?;
        let bytes = response.bytes().await.map_err(|e| TransportError::Request {
            operation: "download converted",
            source: Box::new(e),
        })?;
        tracing::info!(temp_name, bytes = bytes.len(), "Downloaded PDF rendition");
        Ok(bytes.to_vec())
    }

    async fn delete(&self, token: &AccessToken, temp_name: &str) -> Result<(), TransportError> {
        tracing::info!(temp_name, "Deleting temporary item");
        let request = self
            .http
            .delete(self.item_url(temp_name))
            .header(AUTHORIZATION, token.authorization_header());
        Self::send("delete", request).await?;
        tracing::info!(temp_name, "Successfully deleted temporary item");
        Ok(())
    }

    async fn create_upload_session(
        &self,
        token: &AccessToken,
        temp_name: &str,
    ) -> Result<UploadSession, TransportError> {
        tracing::info!(temp_name, "Creating upload session");
        let body = serde_json::json!({
            "item": { "@microsoft.graph.conflictBehavior": "replace" }
        });
        let request = self
            .http
            .post(format!("{}/createUploadSession", self.item_url(temp_name)))
            .header(AUTHORIZATION, token.authorization_header())
            .json(&body);
        let response = Self::send("create upload session", request).await?;
        let parsed: UploadSessionResponse =
            response
                .json()
                .await
                .map_err(|e| TransportError::MalformedResponse {
                    operation: "create upload session",
                    detail: e.to_string(),
                })?;
        tracing::info!(
            temp_name,
            expiration = ?parsed.expiration_date_time,
            "Upload session created"
        );
        Ok(UploadSession {
            upload_url: parsed.upload_url,
            expiration: parsed.expiration_date_time,
        })
    }

    async fn upload_slice(
        &self,
        session: &UploadSession,
        offset: u64,
        total: u64,
        content: &[u8],
    ) -> Result<SliceOutcome, TransportError> {
        let last = offset + content.len() as u64 - 1;
        let range = format!("bytes {offset}-{last}/{total}");
        tracing::debug!(range = %range, "Uploading slice");
        // The session URL is pre-authenticated; sending a bearer token here is rejected.
        let request = self
            .http
            .put(&session.upload_url)
            .header(CONTENT_RANGE, range.as_str())
            .body(content.to_vec());
        let response = Self::send("upload slice", request).await?;
        if response.status() == StatusCode::ACCEPTED {
            let accepted: SliceAcceptedResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(error = %e, range = %range, "Unreadable slice acknowledgement, assuming no expected ranges");
                    SliceAcceptedResponse::default()
                }
            };
            return Ok(SliceOutcome::Accepted {
                next_expected_ranges: accepted.next_expected_ranges,
            });
        }
        Ok(SliceOutcome::Completed)
    }

    async fn cancel_upload_session(&self, session: &UploadSession) -> Result<(), TransportError> {
        tracing::info!("Cancelling upload session");
        Self::send("cancel upload session", self.http.delete(&session.upload_url)).await?;
        Ok(())
    }
}

/// Builds the HTTP client, credential and drive transfer for one converter.
pub fn build_converter(
    auth: AuthConfig,
    settings: ConverterSettings,
    request_timeout: Option<Duration>,
) -> anyhow::Result<GraphPdfConverter> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    let http = builder.build().context("Failed to build HTTP client")?;
    let transfer = GraphClient::new(http.clone(), settings.graph_base_url.clone(), auth.site_id.clone());
    let credential = CachedCredential::new(
        ClientSecretCredential::new(auth, http),
        settings.token_refresh_margin,
    );
    PdfConverter::new(credential, transfer, settings).context("Invalid converter settings")
}
