//! The batch conversion client.
//!
//! [`BatchConverter`] is a cheap-to-clone handle over one batch session and a
//! conversion backend. Clones share the session, so a UI can keep one handle
//! for rendering while another drives an upload or a conversion.
//!
//! [`convert_files`] runs a whole batch in one call (upload, convert,
//! download everything) for scripts and the CLI.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{ConversionBackend, HttpBackend};
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::formats::FormatCatalog;
use crate::item::{BatchItem, ConversionResult, FileId, FileSelection};
use crate::pipeline::delivery::{self, DownloadSummary};
use crate::pipeline::dispatch::{self, DispatchOutcome};
use crate::pipeline::intake::{self, IntakeReport};
use crate::session::{BatchSession, BatchSummary, SharedSession};

/// Client for converting a batch of documents to one target format.
///
/// # Example
/// ```rust,no_run
/// use docbatch::{BatchConfig, BatchConverter, FileSelection};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), docbatch::BatchError> {
/// let batch = BatchConverter::new(BatchConfig::default());
/// batch.add_files(vec![FileSelection::from_path("brief.docx").await?]).await?;
/// batch.select_format("pdf")?;
/// batch.convert().await?;
/// let downloads = batch.download_all().await;
/// println!("saved {} files", downloads.saved.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BatchConverter {
    backend: Arc<dyn ConversionBackend>,
    config: Arc<BatchConfig>,
    catalog: Arc<RwLock<FormatCatalog>>,
    session: SharedSession,
}

impl BatchConverter {
    /// Client talking HTTP to `config.base_url`.
    pub fn new(config: BatchConfig) -> Self {
        let backend = Arc::new(HttpBackend::new(&config));
        Self::with_backend(backend, config)
    }

    pub fn with_backend(backend: Arc<dyn ConversionBackend>, config: BatchConfig) -> Self {
        Self {
            backend,
            catalog: Arc::new(RwLock::new(config.formats.clone())),
            config: Arc::new(config),
            session: Arc::new(Mutex::new(BatchSession::new())),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    // ── Formats ──────────────────────────────────────────────────────────

    /// Formats currently offered for selection.
    pub fn formats(&self) -> FormatCatalog {
        self.catalog.read().clone()
    }

    /// Replace the catalog with the backend's. A chosen target format that is
    /// no longer offered is cleared.
    pub async fn refresh_formats(&self) -> Result<FormatCatalog, BatchError> {
        let catalog = self.backend.formats().await?;
        debug!(
            "Format catalog: input [{}], output [{}]",
            catalog.input.join(", "),
            catalog.output.join(", ")
        );
        *self.catalog.write() = catalog.clone();

        let mut s = self.session.lock();
        let stale = s
            .target_format()
            .filter(|current| catalog.select_output(current).is_err())
            .map(str::to_string);
        if let Some(current) = stale {
            info!("Target format '{}' no longer offered; clearing it", current);
            s.clear_target_format();
        }
        Ok(catalog)
    }

    /// Choose the format every file is converted to.
    ///
    /// Returns the normalised (lowercase) label.
    pub fn select_format(&self, format: &str) -> Result<String, BatchError> {
        let selected = self.catalog.read().select_output(format)?;
        self.session.lock().set_target_format(selected.clone());
        Ok(selected)
    }

    pub fn target_format(&self) -> Option<String> {
        self.session.lock().target_format().map(str::to_string)
    }

    // ── Intake ───────────────────────────────────────────────────────────

    /// Upload files one after another, appending one item per file in order.
    ///
    /// Per-file failures are recorded on the items; `Err` is returned only
    /// when another upload is already running.
    pub async fn add_files(&self, files: Vec<FileSelection>) -> Result<IntakeReport, BatchError> {
        let config = self.intake_config();
        intake::run(&self.session, self.backend.as_ref(), &config, &files).await
    }

    /// Remove an item that has not been converted yet.
    pub fn remove(&self, id: &FileId) -> Result<BatchItem, BatchError> {
        let removed = self.session.lock().remove(id)?;
        debug!("Removed '{}' ({}) from batch", removed.name, id);
        Ok(removed)
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    /// Convert every `uploaded` item to the chosen format in one request.
    ///
    /// Without a chosen format or an uploaded item nothing is sent and
    /// [`DispatchOutcome::Skipped`] is returned. If the request itself fails
    /// no item changes, the message is kept as [`Self::last_error`] and the
    /// error is returned.
    pub async fn convert(&self) -> Result<DispatchOutcome, BatchError> {
        dispatch::run(&self.session, self.backend.as_ref(), &self.config).await
    }

    /// Whether [`Self::convert`] would currently send a request.
    pub fn can_convert(&self) -> bool {
        self.session.lock().can_convert()
    }

    // ── Delivery ─────────────────────────────────────────────────────────

    /// Save one conversion under `filename` in the output directory.
    pub async fn download(&self, conversion_id: &str, filename: &str) -> Result<PathBuf, BatchError> {
        delivery::download(self.backend.as_ref(), &self.config, conversion_id, filename).await
    }

    /// Save the result of a converted item.
    pub async fn download_result(&self, result: &ConversionResult) -> Result<PathBuf, BatchError> {
        self.download(&result.conversion_id, &result.output_file).await
    }

    /// Save every converted item, in list order. Failures do not stop later
    /// downloads.
    pub async fn download_all(&self) -> DownloadSummary {
        delivery::download_all(&self.session, self.backend.as_ref(), &self.config).await
    }

    // ── Session ──────────────────────────────────────────────────────────

    pub fn items(&self) -> Vec<BatchItem> {
        self.session.lock().items().to_vec()
    }

    /// A copy of the whole session state.
    pub fn session(&self) -> BatchSession {
        self.session.lock().clone()
    }

    pub fn summary(&self) -> BatchSummary {
        self.session.lock().summary()
    }

    pub fn is_uploading(&self) -> bool {
        self.session.lock().is_uploading()
    }

    pub fn is_converting(&self) -> bool {
        self.session.lock().is_converting()
    }

    /// Session-level error of the last failed batch request.
    pub fn last_error(&self) -> Option<String> {
        self.session.lock().last_error().map(str::to_string)
    }

    pub fn clear_error(&self) {
        self.session.lock().clear_error();
    }

    /// Empty the batch. Responses to requests still in flight are dropped
    /// when they arrive.
    pub fn reset(&self) {
        self.session.lock().reset();
    }

    /// Config with the current catalog, used for client-side input checks.
    fn intake_config(&self) -> BatchConfig {
        let mut config = (*self.config).clone();
        config.formats = self.formats();
        config
    }
}

/// Everything a one-shot [`convert_files`] run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub intake: IntakeReport,
    pub dispatch: DispatchOutcome,
    pub downloads: DownloadSummary,
    pub items: Vec<BatchItem>,
}

/// Upload `files`, convert them to `target_format` and download every
/// converted file into `config.output_dir`.
///
/// # Errors
/// Returns `Err` when the format is not offered or the batch request fails.
/// Per-file upload, conversion and download failures are in the returned
/// [`BatchRun`].
pub async fn convert_files(
    files: Vec<FileSelection>,
    target_format: &str,
    config: BatchConfig,
) -> Result<BatchRun, BatchError> {
    let batch = BatchConverter::new(config);
    run_batch(&batch, files, target_format).await
}

/// [`convert_files`] on an existing client.
pub async fn run_batch(
    batch: &BatchConverter,
    files: Vec<FileSelection>,
    target_format: &str,
) -> Result<BatchRun, BatchError> {
    batch.select_format(target_format)?;
    let intake = batch.add_files(files).await?;
    let dispatch = batch.convert().await?;
    let downloads = batch.download_all().await;
    Ok(BatchRun {
        intake,
        dispatch,
        downloads,
        items: batch.items(),
    })
}
