//! Progress-callback trait for batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as files are uploaded, the batch is converted and results are downloaded.
//!
//! [`BatchProgressCallback::on_batch_complete`] is also the hand-off point for
//! the full per-item outcome list after a successful dispatch (analytics,
//! notifications). It is a one-way notification; nothing it does feeds back
//! into the session.
//!
//! # Example
//!
//! ```rust
//! use docbatch::{BatchConfig, BatchProgressCallback, ConversionOutcome};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Converted(AtomicUsize);
//!
//! impl BatchProgressCallback for Converted {
//!     fn on_batch_complete(&self, outcomes: &[ConversionOutcome]) {
//!         let ok = outcomes.iter().filter(|o| o.is_success()).count();
//!         self.0.fetch_add(ok, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(Converted(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

use crate::item::ConversionOutcome;

/// Called by [`crate::BatchConverter`] as a batch moves through its phases.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `index` arguments are 1-based positions within the
/// current call.
pub trait BatchProgressCallback: Send + Sync {
    /// Called before each upload request is sent.
    fn on_upload_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a file was accepted by the backend.
    fn on_upload_complete(&self, index: usize, total: usize, name: &str, file_type: &str) {
        let _ = (index, total, name, file_type);
    }

    /// Called when a file could not be uploaded.
    fn on_upload_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Called just before the batch conversion request is sent.
    fn on_dispatch_start(&self, file_count: usize, target_format: &str) {
        let _ = (file_count, target_format);
    }

    /// Called with every per-file outcome of a batch that came back.
    fn on_batch_complete(&self, outcomes: &[ConversionOutcome]) {
        let _ = outcomes;
    }

    /// Called when the batch request itself failed; no item changed.
    fn on_dispatch_failed(&self, error: &str) {
        let _ = error;
    }

    /// Called after a converted file was saved.
    fn on_download_complete(&self, filename: &str, bytes: u64) {
        let _ = (filename, bytes);
    }

    /// Called when a download failed.
    fn on_download_error(&self, filename: &str, error: &str) {
        let _ = (filename, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
