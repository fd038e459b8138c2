//! # uploader: the batch API seam
//!
//! This module defines the [`BatchUploader`] trait and the plain data types that travel
//! across it: the client-generated [`BatchHandle`], the [`PayloadInfo`] sent with the
//! presign request, the server's [`PresignedLocation`] and the [`UploadReceipt`] of the
//! final PUT.
//!
//! ## Interface & Extensibility
//! - The real HTTP client lives in the `cdp-batch` binary crate; the pipeline only sees this trait.
//! - The trait is annotated for `mockall` so pipeline tests can script presign/upload outcomes.
//!
//! ## Errors
//! - Every failure is a [`BatchError`]. Presign failures keep the HTTP status, body and
//!   headers when the server produced a response, so they can be logged in full.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::payload::CompressedPayload;

/// Identifies one upload attempt. Generated on the client before the presign call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchHandle(Uuid);

impl BatchHandle {
    /// A fresh random (v4) handle.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn id(&self) -> Uuid {
        self.0
    }

    /// `{base_url}/v2/batches/{uuid}`; a trailing slash on `base_url` is ignored.
    pub fn presign_url(&self, base_url: &str) -> String {
        format!("{}/v2/batches/{}", base_url.trim_end_matches('/'), self.0)
    }
}

impl std::fmt::Display for BatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checksum and size of the compressed payload, sent as the presign request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadInfo {
    /// Hex-encoded MD5 of the compressed bytes.
    pub checksum: String,
    /// Length of the compressed bytes.
    pub size: u64,
}

/// Where the server wants the payload PUT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedLocation {
    #[serde(rename = "ref")]
    pub reference: String,
    pub location: UploadTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub href: String,
}

impl PresignedLocation {
    pub fn upload_url(&self) -> &str {
        &self.location.href
    }
}

/// Response of the upload PUT. The status is recorded, not enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status: u16,
    pub body: String,
}

impl UploadReceipt {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    /// The presign call failed: transport error, non-2xx status, bad body or missing settings.
    #[error("presign request failed: {message}")]
    Presign {
        message: String,
        status: Option<u16>,
        body: Option<String>,
        headers: Vec<(String, String)>,
    },

    /// The upload PUT could not be delivered.
    #[error("upload request failed: {message}")]
    Upload { message: String },
}

impl BatchError {
    /// A presign failure that never reached the server.
    pub fn presign(message: impl Into<String>) -> Self {
        BatchError::Presign {
            message: message.into(),
            status: None,
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn upload(message: impl Into<String>) -> Self {
        BatchError::Upload {
            message: message.into(),
        }
    }
}

/// Trait for the two-step batch protocol: presign, then upload.
///
/// Implemented by the HTTP client in the CLI crate and by `MockBatchUploader` in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BatchUploader: Send + Sync {
    /// Ask the API for a signed upload location for `handle`, declaring the payload's checksum and size.
    async fn presign(
        &self,
        handle: &BatchHandle,
        info: &PayloadInfo,
    ) -> Result<PresignedLocation, BatchError>;

    /// PUT the compressed payload to the presigned location.
    async fn upload(
        &self,
        location: &PresignedLocation,
        payload: &CompressedPayload,
    ) -> Result<UploadReceipt, BatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presign_url_joins_base_and_uuid() {
        let id = Uuid::parse_str("6f1c0e4a-8a43-4b8e-9a55-0c3f7f2b9d11").unwrap();
        let handle = BatchHandle::from_uuid(id);
        assert_eq!(
            handle.presign_url("https://api.example.com/"),
            "https://api.example.com/v2/batches/6f1c0e4a-8a43-4b8e-9a55-0c3f7f2b9d11"
        );
        assert_eq!(
            handle.presign_url("https://api.example.com"),
            "https://api.example.com/v2/batches/6f1c0e4a-8a43-4b8e-9a55-0c3f7f2b9d11"
        );
    }

    #[test]
    fn presigned_location_reads_ref_and_href() {
        let body = r#"{"ref":"abc-123","location":{"href":"https://s3.example.com/put?sig=1"},"extra":true}"#;
        let loc: PresignedLocation = serde_json::from_str(body).unwrap();
        assert_eq!(loc.reference, "abc-123");
        assert_eq!(loc.upload_url(), "https://s3.example.com/put?sig=1");
    }

    #[test]
    fn presigned_location_without_href_is_rejected() {
        let body = r#"{"ref":"abc-123","location":{}}"#;
        assert!(serde_json::from_str::<PresignedLocation>(body).is_err());
    }

    #[test]
    fn payload_info_serializes_as_presign_body() {
        let info = PayloadInfo {
            checksum: "d41d8cd98f00b204e9800998ecf8427e".into(),
            size: 20,
        };
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            r#"{"checksum":"d41d8cd98f00b204e9800998ecf8427e","size":20}"#
        );
    }
}
