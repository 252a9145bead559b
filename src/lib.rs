//! # docbatch
//!
//! Upload a batch of documents to a conversion server, convert all of them to
//! one target format in a single request, and download the results.
//!
//! ## Flow
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Intake    upload each file in order; one item per file
//!  ├─ 2. Format    pick the target format from the server's catalog
//!  ├─ 3. Dispatch  one batch request for every uploaded item
//!  ├─ 4. Reconcile per-file outcomes back into the list
//!  └─ 5. Delivery  save converted files to the output directory
//! ```
//!
//! Each item moves through a one-way status machine:
//!
//! ```text
//! ──▶ uploaded ──▶ converted
//!  │      └──────▶ error
//!  └─────────────▶ error      (upload failed)
//! ```
//!
//! A failed upload or conversion only marks its own item. A failure of the
//! batch request itself leaves every item unchanged and is reported as the
//! session error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docbatch::{convert_files, BatchConfig, FileSelection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .base_url("http://localhost:8001")
//!         .output_dir("converted")
//!         .build()?;
//!
//!     let files = vec![
//!         FileSelection::from_path("report.docx").await?,
//!         FileSelection::from_path("notes.txt").await?,
//!     ];
//!     let run = convert_files(files, "pdf", config).await?;
//!     for item in &run.items {
//!         println!("{:<24} {}", item.name, item.status.label());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docbatch` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docbatch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod formats;
pub mod item;
pub mod pipeline;
pub mod progress;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BatchRecord, ConversionBackend, HttpBackend, MockBackend};
pub use batch::{convert_files, run_batch, BatchConverter, BatchRun};
pub use config::{BatchConfig, BatchConfigBuilder, UnmatchedPolicy};
pub use error::{BackendError, BatchError};
pub use formats::FormatCatalog;
pub use item::{
    BatchItem, ConversionOutcome, ConversionResult, FileId, FileSelection, ItemStatus,
    UploadReceipt,
};
pub use pipeline::delivery::{DownloadFailure, DownloadSummary};
pub use pipeline::dispatch::{DispatchOutcome, DispatchReport};
pub use pipeline::intake::IntakeReport;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{BatchSession, BatchSummary, SkipReason};
