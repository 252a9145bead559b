//! Conversion backend abstraction.
//!
//! The [`ConversionBackend`] trait is the boundary to the external service
//! that stores uploads, converts them and serves the results. The orchestration
//! in [`crate::pipeline`] only talks to this trait, so it runs unchanged
//! against the real HTTP API ([`HttpBackend`]) or a scripted
//! [`MockBackend`].

mod http;
mod mock;

pub use http::HttpBackend;
pub use mock::{MockBackend, MockCall};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::formats::FormatCatalog;
use crate::item::{FileId, FileSelection, UploadReceipt};

/// Operations offered by the conversion service.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Fetch the catalog of accepted input and producible output formats.
    async fn formats(&self) -> Result<FormatCatalog, BackendError>;

    /// Upload one file.
    async fn upload(&self, file: &FileSelection) -> Result<UploadReceipt, BackendError>;

    /// Convert previously uploaded files to one target format in a single
    /// request. `Ok` means the request itself succeeded; individual files
    /// may still have failed.
    async fn batch_convert(
        &self,
        file_ids: &[FileId],
        target_format: &str,
    ) -> Result<Vec<BatchRecord>, BackendError>;

    /// Fetch the content of a finished conversion.
    async fn download(&self, conversion_id: &str) -> Result<Bytes, BackendError>;
}

/// Per-file entry of a batch conversion response, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub file_id: FileId,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Error,
}

impl BatchRecord {
    pub fn success(
        file_id: impl Into<FileId>,
        conversion_id: impl Into<String>,
        converted_file: impl Into<String>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            status: RecordStatus::Success,
            conversion_id: Some(conversion_id.into()),
            converted_file: Some(converted_file.into()),
            download_url: None,
            error: None,
        }
    }

    pub fn failure(file_id: impl Into<FileId>, error: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            status: RecordStatus::Error,
            conversion_id: None,
            converted_file: None,
            download_url: None,
            error: Some(error.into()),
        }
    }
}

/// Body of `POST /batch-convert`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct BatchConvertRequest {
    pub file_ids: Vec<FileId>,
    pub target_format: String,
}

/// Response of `POST /batch-convert`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct BatchConvertResponse {
    pub results: Vec<BatchRecord>,
}
