//! Configuration types for a batch conversion client.
//!
//! All client behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Callers set only what they care about and rely on
//! the documented defaults for the rest.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::BatchError;
use crate::formats::FormatCatalog;
use crate::progress::{BatchProgressCallback, ProgressCallback};

/// Configuration for a [`crate::BatchConverter`].
///
/// # Example
/// ```rust
/// use docbatch::{BatchConfig, UnmatchedPolicy};
///
/// let config = BatchConfig::builder()
///     .base_url("https://convert.example.com")
///     .output_dir("converted")
///     .unmatched(UnmatchedPolicy::KeepUploaded)
///     .build()
///     .unwrap();
/// assert_eq!(config.endpoint("/upload"), "https://convert.example.com/api/upload");
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Backend origin, e.g. `https://convert.example.com`. Default: `http://localhost:8001`.
    pub base_url: String,

    /// Path prefix of every API route. Default: `/api`.
    pub api_prefix: String,

    /// Per-file upload timeout in seconds. Default: 120.
    pub upload_timeout_secs: u64,

    /// Timeout of the single batch conversion request in seconds. Default: 300.
    ///
    /// The backend converts every file before answering, so this must cover
    /// the whole batch.
    pub convert_timeout_secs: u64,

    /// Timeout in seconds for every GET: each file download and the format
    /// catalog fetch. Default: 120.
    pub download_timeout_secs: u64,

    /// Directory downloaded files are written to. Default: current directory.
    pub output_dir: PathBuf,

    /// Formats offered by the backend. Default: [`FormatCatalog::default`].
    pub formats: FormatCatalog,

    /// Reject files whose extension is not in the catalog input set before
    /// uploading them. Default: false (the backend decides).
    pub validate_inputs: bool,

    /// What to do with submitted files the conversion response does not
    /// mention. Default: [`UnmatchedPolicy::MarkError`].
    pub unmatched: UnmatchedPolicy,

    /// Receives upload, dispatch and download events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            api_prefix: "/api".to_string(),
            upload_timeout_secs: 120,
            convert_timeout_secs: 300,
            download_timeout_secs: 120,
            output_dir: PathBuf::from("."),
            formats: FormatCatalog::default(),
            validate_inputs: false,
            unmatched: UnmatchedPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("base_url", &self.base_url)
            .field("api_prefix", &self.api_prefix)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("convert_timeout_secs", &self.convert_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("output_dir", &self.output_dir)
            .field("formats", &self.formats)
            .field("validate_inputs", &self.validate_inputs)
            .field("unmatched", &self.unmatched)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Full URL of an API route, e.g. `endpoint("/upload")`.
    pub fn endpoint(&self, route: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_end_matches('/'),
            route
        )
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.config.api_prefix = if prefix.is_empty() || prefix.starts_with('/') {
            prefix
        } else {
            format!("/{prefix}")
        };
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn formats(mut self, catalog: FormatCatalog) -> Self {
        self.config.formats = catalog;
        self
    }

    pub fn validate_inputs(mut self, v: bool) -> Self {
        self.config.validate_inputs = v;
        self
    }

    pub fn unmatched(mut self, policy: UnmatchedPolicy) -> Self {
        self.config.unmatched = policy;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn BatchProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        let url = c.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BatchError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        for (name, secs) in [
            ("upload", c.upload_timeout_secs),
            ("convert", c.convert_timeout_secs),
            ("download", c.download_timeout_secs),
        ] {
            if secs == 0 {
                return Err(BatchError::InvalidConfig(format!(
                    "{name} timeout must be ≥ 1 second"
                )));
            }
        }
        if c.formats.output.is_empty() {
            return Err(BatchError::InvalidConfig(
                "format catalog has no output formats".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Handling of files that were submitted for conversion but are absent from
/// the backend's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnmatchedPolicy {
    /// Mark them `error` with [`MISSING_FROM_RESPONSE`]. (default)
    #[default]
    MarkError,
    /// Leave them `uploaded` so the next dispatch resubmits them.
    KeepUploaded,
}

/// Error message given to unmatched files under [`UnmatchedPolicy::MarkError`].
pub const MISSING_FROM_RESPONSE: &str = "missing from conversion response";
