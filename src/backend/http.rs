//! reqwest implementation of [`ConversionBackend`].

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{BatchConvertRequest, BatchConvertResponse, BatchRecord, ConversionBackend};
use crate::config::BatchConfig;
use crate::error::BackendError;
use crate::formats::FormatCatalog;
use crate::item::{FileId, FileSelection, UploadReceipt};

/// Client for the conversion service's HTTP API.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: BatchConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    file_id: FileId,
    file_type: String,
}

impl HttpBackend {
    pub fn new(config: &BatchConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Use a pre-configured reqwest client (proxies, default headers, ...).
    pub fn with_client(client: Client, config: &BatchConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl ConversionBackend for HttpBackend {
    async fn formats(&self) -> Result<FormatCatalog, BackendError> {
        let url = self.config.endpoint("/formats");
        // Plain GET, shares the download timeout.
        let secs = self.config.download_timeout_secs;
        debug!(url = %url, "Fetching format catalog");

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(secs))
            .send()
            .await
            .map_err(|e| transport_error(&url, secs, e))?;
        let response = ensure_success("format catalog request", response).await?;

        let catalog: FormatCatalog = response.json().await.map_err(|e| BackendError::Malformed {
            operation: "format catalog".into(),
            detail: e.to_string(),
        })?;
        Ok(FormatCatalog::new(catalog.input, catalog.output))
    }

    #[tracing::instrument(skip(self, file), fields(name = %file.name, size = file.size_bytes()))]
    async fn upload(&self, file: &FileSelection) -> Result<UploadReceipt, BackendError> {
        let url = self.config.endpoint("/upload");
        let secs = self.config.upload_timeout_secs;

        let part = Part::bytes(file.content.to_vec()).file_name(file.name.clone());
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(secs))
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(&url, secs, e))?;
        let response = ensure_success(&format!("upload of '{}'", file.name), response).await?;

        let body: UploadResponse = response.json().await.map_err(|e| BackendError::Malformed {
            operation: format!("upload of '{}'", file.name),
            detail: e.to_string(),
        })?;

        debug!(file_id = %body.file_id, file_type = %body.file_type, "Upload accepted");
        Ok(UploadReceipt {
            file_id: body.file_id,
            file_type: body.file_type,
        })
    }

    async fn batch_convert(
        &self,
        file_ids: &[FileId],
        target_format: &str,
    ) -> Result<Vec<BatchRecord>, BackendError> {
        let url = self.config.endpoint("/batch-convert");
        let secs = self.config.convert_timeout_secs;
        let body = BatchConvertRequest {
            file_ids: file_ids.to_vec(),
            target_format: target_format.to_string(),
        };

        info!(
            url = %url,
            files = file_ids.len(),
            target_format = %target_format,
            "Sending batch conversion request"
        );

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&url, secs, e))?;
        let response = ensure_success("batch conversion", response).await?;

        let parsed: BatchConvertResponse =
            response.json().await.map_err(|e| BackendError::Malformed {
                operation: "batch conversion".into(),
                detail: e.to_string(),
            })?;
        Ok(parsed.results)
    }

    async fn download(&self, conversion_id: &str) -> Result<Bytes, BackendError> {
        let url = self.config.endpoint(&format!("/download/{conversion_id}"));
        let secs = self.config.download_timeout_secs;
        debug!(url = %url, "Downloading conversion");

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(secs))
            .send()
            .await
            .map_err(|e| transport_error(&url, secs, e))?;
        let response =
            ensure_success(&format!("download of conversion '{conversion_id}'"), response).await?;

        response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout { url, secs }
            } else {
                BackendError::Network {
                    url,
                    reason: e.to_string(),
                }
            }
        })
    }
}

fn transport_error(url: &str, secs: u64, e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout {
            url: url.to_string(),
            secs,
        }
    } else {
        BackendError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Turn a non-2xx response into [`BackendError::Status`], keeping the
/// server's `detail` message when the body carries one.
async fn ensure_success(operation: &str, response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
        detail: error_detail(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
    })
}

/// Extract a readable message from an error body.
fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(body.to_string()),
        },
        _ => Some(truncate(body, 200)),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars - 1).collect();
        format!("{cut}\u{2026}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_from_json_string() {
        assert_eq!(
            error_detail(r#"{"detail": "Conversion not found"}"#).as_deref(),
            Some("Conversion not found")
        );
    }

    #[test]
    fn detail_from_structured_json() {
        let detail = error_detail(r#"{"detail": [{"loc": ["body"], "msg": "field required"}]}"#)
            .unwrap();
        assert!(detail.contains("field required"));
    }

    #[test]
    fn detail_from_plain_text_is_truncated() {
        let long = "x".repeat(500);
        let detail = error_detail(&long).unwrap();
        assert_eq!(detail.chars().count(), 200);
        assert!(detail.ends_with('\u{2026}'));
    }

    #[test]
    fn empty_body_has_no_detail() {
        assert_eq!(error_detail("   "), None);
    }
}
