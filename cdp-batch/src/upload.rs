#![doc = "Batch API client: implements the core `BatchUploader` trait over HTTP with reqwest."]
//
//! # Batch Client
//!
//! [`BatchClient`] speaks the two-step batch protocol:
//!
//! 1. `PUT {API_ENDPOINT}/v2/batches/{uuid}` with basic auth (client key / API token) and a
//!    JSON body `{checksum, size}`; a 2xx answer carries `ref` and `location.href`.
//! 2. `PUT {location.href}` with the gzip bytes as the raw body and the
//!    `x-amz-server-side-encryption` and `Content-Md5` headers.
//!
//! The body of step 2 is handed to reqwest as an owned byte buffer and sent untouched, so
//! `Content-Md5` always describes the bytes on the wire.
//!
//! Missing endpoint or credentials surface as presign failures without any request being sent.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;

use cdp_batch_core::payload::CompressedPayload;
use cdp_batch_core::uploader::{
    BatchError, BatchHandle, BatchUploader, PayloadInfo, PresignedLocation, UploadReceipt,
};

pub const SSE_HEADER: &str = "x-amz-server-side-encryption";
pub const CONTENT_MD5_HEADER: &str = "Content-Md5";

/// Endpoint and credentials for the batch API. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSettings {
    pub endpoint: Option<String>,
    pub client_key: Option<String>,
    pub api_token: Option<String>,
}

pub struct BatchClient {
    http: Client,
    settings: ApiSettings,
}

impl BatchClient {
    pub fn new(settings: ApiSettings) -> Result<Self, reqwest::Error> {
        let http = Client::builder().build()?;
        tracing::info!(
            endpoint = settings.endpoint.as_deref().unwrap_or(""),
            client_key_set = settings.client_key.is_some(),
            api_token_set = settings.api_token.is_some(),
            "Initialized BatchClient"
        );
        Ok(BatchClient { http, settings })
    }

    fn presign_target(&self, handle: &BatchHandle) -> Result<(String, &str, &str), BatchError> {
        let endpoint = self.settings.endpoint.as_deref().ok_or_else(|| {
            tracing::error!("API_ENDPOINT missing; cannot presign");
            BatchError::presign("API_ENDPOINT is not set")
        })?;
        let client_key = self.settings.client_key.as_deref().ok_or_else(|| {
            tracing::error!("CLIENT_KEY missing; cannot presign");
            BatchError::presign("CLIENT_KEY is not set")
        })?;
        let api_token = self.settings.api_token.as_deref().ok_or_else(|| {
            tracing::error!("API_TOKEN missing; cannot presign");
            BatchError::presign("API_TOKEN is not set")
        })?;
        Ok((handle.presign_url(endpoint), client_key, api_token))
    }
}

#[async_trait]
impl BatchUploader for BatchClient {
    async fn presign(
        &self,
        handle: &BatchHandle,
        info: &PayloadInfo,
    ) -> Result<PresignedLocation, BatchError> {
        let (url, client_key, api_token) = self.presign_target(handle)?;
        tracing::info!(url = %url, uuid = %handle, "Sending presign request");

        let response = self
            .http
            .put(&url)
            .basic_auth(client_key, Some(api_token))
            .header(ACCEPT, "application/json")
            .json(info)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %url, "Presign request could not be sent");
                BatchError::presign(e.to_string())
            })?;

        let status = response.status();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("<non-ascii>").to_string(),
                )
            })
            .collect();
        let body = response.text().await.map_err(|e| BatchError::Presign {
            message: format!("failed to read presign response body: {e}"),
            status: Some(status.as_u16()),
            body: None,
            headers: headers.clone(),
        })?;

        if !status.is_success() {
            return Err(BatchError::Presign {
                message: format!("presign returned HTTP {status}"),
                status: Some(status.as_u16()),
                body: Some(body),
                headers,
            });
        }

        match serde_json::from_str::<PresignedLocation>(&body) {
            Ok(location) => {
                tracing::debug!(body = %body, "Batch presigned info");
                Ok(location)
            }
            Err(e) => Err(BatchError::Presign {
                message: format!("presign response is missing ref or location.href: {e}"),
                status: Some(status.as_u16()),
                body: Some(body),
                headers,
            }),
        }
    }

    async fn upload(
        &self,
        location: &PresignedLocation,
        payload: &CompressedPayload,
    ) -> Result<UploadReceipt, BatchError> {
        let url = location.upload_url();
        tracing::info!(
            url = %url,
            bytes = payload.bytes().len(),
            "Uploading batch file"
        );

        let response = self
            .http
            .put(url)
            .header(ACCEPT, "application/json")
            .header(SSE_HEADER, "AES256")
            .header(CONTENT_MD5_HEADER, payload.content_md5())
            .body(payload.bytes().to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %url, "Upload request could not be sent");
                BatchError::upload(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = ?e, url = %url, status, "Failed to read upload response body");
                String::new()
            }
        };
        Ok(UploadReceipt { status, body })
    }
}
