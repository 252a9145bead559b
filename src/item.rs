//! Per-file records tracked through a batch.
//!
//! A [`BatchItem`] is created once per selected file by intake and afterwards
//! only changes status through reconciliation:
//!
//! ```text
//! (new) ──upload ok──▶ Uploaded ──dispatch ok──▶ Converted
//!   │                     │
//!   └──upload failed──▶ Error ◀──dispatch item failed
//! ```
//!
//! `Converted` and `Error` are terminal.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::BatchError;

/// Type reported for files the backend never accepted.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Error message for an upload whose id is already held by another item.
pub const DUPLICATE_FILE_ID: &str = "duplicate file id from server";

/// Backend-assigned identifier of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One file picked by the user: its name and raw content.
#[derive(Debug, Clone)]
pub struct FileSelection {
    pub name: String,
    pub content: Bytes,
}

impl FileSelection {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a selection from disk, naming it after the file's last component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| BatchError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, content))
    }

    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }

    /// Lowercased text after the last `.`, if any.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// What the upload endpoint reports for an accepted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub file_id: FileId,
    pub file_type: String,
}

/// A finished conversion that can be downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub conversion_id: String,
    /// Filename the converted document is saved under.
    pub output_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// Result for one submitted id in a batch conversion response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Success {
        file_id: FileId,
        #[serde(flatten)]
        result: ConversionResult,
    },
    Failure { file_id: FileId, error: String },
}

impl ConversionOutcome {
    pub fn file_id(&self) -> &FileId {
        match self {
            ConversionOutcome::Success { file_id, .. } | ConversionOutcome::Failure { file_id, .. } => {
                file_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }
}

/// Lifecycle state of a [`BatchItem`].
///
/// The payload of the terminal states carries the conversion result or the
/// error message, so an item can never hold both or neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Uploaded,
    Converted(ConversionResult),
    Error { message: String },
}

impl ItemStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::Uploaded => "uploaded",
            ItemStatus::Converted(_) => "converted",
            ItemStatus::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemStatus::Uploaded)
    }
}

/// One selected file tracked through upload, conversion and download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// `None` until the upload succeeds.
    pub id: Option<FileId>,
    pub name: String,
    pub size_bytes: u64,
    pub detected_type: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl BatchItem {
    /// Item for a file the backend accepted.
    pub fn uploaded(selection: &FileSelection, receipt: UploadReceipt) -> Self {
        Self {
            id: Some(receipt.file_id),
            name: selection.name.clone(),
            size_bytes: selection.size_bytes(),
            detected_type: receipt.file_type,
            status: ItemStatus::Uploaded,
        }
    }

    /// Item for a file whose upload failed.
    pub fn failed(selection: &FileSelection, message: impl Into<String>) -> Self {
        Self {
            id: None,
            name: selection.name.clone(),
            size_bytes: selection.size_bytes(),
            detected_type: UNKNOWN_TYPE.to_string(),
            status: ItemStatus::Error {
                message: message.into(),
            },
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self.status, ItemStatus::Uploaded)
    }

    pub fn is_converted(&self) -> bool {
        matches!(self.status, ItemStatus::Converted(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, ItemStatus::Error { .. })
    }

    pub fn conversion_result(&self) -> Option<&ConversionResult> {
        match &self.status {
            ItemStatus::Converted(result) => Some(result),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Id of an item that can take part in a dispatch.
    pub fn dispatchable_id(&self) -> Option<&FileId> {
        if self.is_uploaded() {
            self.id.as_ref()
        } else {
            None
        }
    }

    /// Apply a dispatch outcome. Terminal items are left untouched.
    pub(crate) fn apply_outcome(&mut self, outcome: &ConversionOutcome) {
        if self.status.is_terminal() {
            return;
        }
        self.status = match outcome {
            ConversionOutcome::Success { result, .. } => ItemStatus::Converted(result.clone()),
            ConversionOutcome::Failure { error, .. } => ItemStatus::Error {
                message: error.clone(),
            },
        };
    }
}

/// Filename used when a success record omits one: the source name with its
/// last extension replaced by the target format.
pub fn default_output_name(source_name: &str, target_format: &str) -> String {
    let stem = match source_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => source_name,
    };
    format!("{stem}.{target_format}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(name: &str) -> FileSelection {
        FileSelection::new(name, vec![0u8; 2048])
    }

    #[test]
    fn uploaded_item_has_id_and_no_result() {
        let item = BatchItem::uploaded(
            &selection("a.docx"),
            UploadReceipt {
                file_id: "f1".into(),
                file_type: "docx".into(),
            },
        );
        assert_eq!(item.id, Some(FileId::from("f1")));
        assert_eq!(item.size_bytes, 2048);
        assert!(item.conversion_result().is_none());
        assert!(item.error_message().is_none());
        assert_eq!(item.dispatchable_id(), Some(&FileId::from("f1")));
    }

    #[test]
    fn failed_item_has_message_and_unknown_type() {
        let item = BatchItem::failed(&selection("b.pdf"), "upload failed");
        assert_eq!(item.id, None);
        assert_eq!(item.detected_type, UNKNOWN_TYPE);
        assert_eq!(item.error_message(), Some("upload failed"));
        assert!(item.dispatchable_id().is_none());
    }

    #[test]
    fn terminal_items_ignore_outcomes() {
        let mut item = BatchItem::failed(&selection("b.pdf"), "upload failed");
        item.apply_outcome(&ConversionOutcome::Success {
            file_id: "f2".into(),
            result: ConversionResult {
                conversion_id: "cv2".into(),
                output_file: "b.txt".into(),
                download_url: None,
            },
        });
        assert_eq!(item.error_message(), Some("upload failed"));
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(selection("Brief.DOCX").extension().as_deref(), Some("docx"));
        assert_eq!(selection("README").extension(), None);
        assert_eq!(selection("trailing.").extension(), None);
    }

    #[test]
    fn default_output_name_replaces_last_extension() {
        assert_eq!(default_output_name("a.docx", "pdf"), "a.pdf");
        assert_eq!(default_output_name("contract.v2.doc", "txt"), "contract.v2.txt");
        assert_eq!(default_output_name("notes", "html"), "notes.html");
        assert_eq!(default_output_name(".env", "txt"), ".env.txt");
    }

    #[test]
    fn item_serialises_with_flat_status() {
        let item = BatchItem::failed(&selection("b.pdf"), "timeout");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "timeout");
    }

    #[tokio::test]
    async fn from_path_reads_name_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.txt");
        std::fs::write(&path, b"hello").unwrap();

        let sel = FileSelection::from_path(&path).await.unwrap();
        assert_eq!(sel.name, "memo.txt");
        assert_eq!(sel.size_bytes(), 5);
    }

    #[test]
    fn from_path_missing_file_is_read_error() {
        let err = tokio_test::block_on(FileSelection::from_path("/definitely/not/here.pdf"))
            .unwrap_err();
        assert!(matches!(err, BatchError::ReadFailed { .. }));
    }
}
