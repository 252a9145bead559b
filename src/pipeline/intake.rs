//! Intake: upload each selected file and record one item per file.
//!
//! Uploads run strictly one after another, so items are appended in
//! selection order without any sorting afterwards. A failed upload becomes an
//! `error` item and the loop moves on to the next file. So does an upload
//! whose server id is already held by another item in the batch.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::InFlightGuard;
use crate::backend::ConversionBackend;
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::item::{BatchItem, FileSelection, DUPLICATE_FILE_ID};
use crate::session::{Operation, SharedSession};

/// What one intake call recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeReport {
    /// Items appended as `uploaded`.
    pub uploaded: usize,
    /// Items appended as `error`.
    pub failed: usize,
    /// Selections not recorded because the session was reset mid-way.
    pub discarded: usize,
}

impl IntakeReport {
    pub fn was_discarded(&self) -> bool {
        self.discarded > 0
    }
}

/// Upload `files` in order and append their items to the session.
pub(crate) async fn run(
    session: &SharedSession,
    backend: &dyn ConversionBackend,
    config: &BatchConfig,
    files: &[FileSelection],
) -> Result<IntakeReport, BatchError> {
    let mut report = IntakeReport::default();
    if files.is_empty() {
        return Ok(report);
    }

    let epoch = {
        let mut s = session.lock();
        let epoch = s.begin(Operation::Upload)?;
        s.clear_error();
        epoch
    };
    let guard = InFlightGuard::new(session, Operation::Upload, epoch);

    let total = files.len();
    info!("Uploading {} files", total);

    for (i, file) in files.iter().enumerate() {
        let index = i + 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_upload_start(index, total, &file.name);
        }

        let mut item = upload_one(backend, config, file).await;
        if let Some(id) = item.id.clone() {
            if session.lock().contains_id(&id) {
                warn!(file_id = %id, "Server returned an id already in the batch for '{}'", file.name);
                item = BatchItem::failed(file, DUPLICATE_FILE_ID);
            }
        }

        if let Some(ref cb) = config.progress_callback {
            match item.error_message() {
                None => cb.on_upload_complete(index, total, &item.name, &item.detected_type),
                Some(e) => cb.on_upload_error(index, total, &item.name, e),
            }
        }

        let mut s = session.lock();
        if !s.is_current(epoch) {
            report.discarded = total - i;
            warn!(
                "Batch was reset during upload; discarding '{}' and {} remaining files",
                file.name,
                total - index
            );
            return Ok(report);
        }
        if item.is_uploaded() {
            report.uploaded += 1;
        } else {
            report.failed += 1;
        }
        s.append(item);
    }

    guard.finish(&mut session.lock());
    info!(
        "Upload finished: {} accepted, {} failed",
        report.uploaded, report.failed
    );
    Ok(report)
}

/// Upload a single file, folding every failure into an `error` item.
async fn upload_one(
    backend: &dyn ConversionBackend,
    config: &BatchConfig,
    file: &FileSelection,
) -> BatchItem {
    if config.validate_inputs {
        let accepted = file
            .extension()
            .is_some_and(|ext| config.formats.accepts_input(&ext));
        if !accepted {
            let message = format!(
                "Unsupported file type. Supported formats: {}",
                config.formats.input.join(", ")
            );
            warn!("Skipping upload of '{}': {}", file.name, message);
            return BatchItem::failed(file, message);
        }
    }

    match backend.upload(file).await {
        Ok(receipt) => {
            debug!("Uploaded '{}' as {}", file.name, receipt.file_id);
            BatchItem::uploaded(file, receipt)
        }
        Err(e) => {
            warn!("Upload of '{}' failed: {}", file.name, e);
            BatchItem::failed(file, e.to_string())
        }
    }
}
