//! Delivery: save converted files to the output directory.
//!
//! Downloads only read the session. A failed download is reported to the
//! caller and the progress callback, and can be repeated at will. Within one
//! download-all call, results sharing a file name are saved as `name (n).ext`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::backend::ConversionBackend;
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::item::ConversionResult;
use crate::session::SharedSession;

/// A download that did not produce a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFailure {
    pub conversion_id: String,
    pub output_file: String,
    pub error: String,
}

/// Outcome of [`crate::BatchConverter::download_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSummary {
    pub saved: Vec<PathBuf>,
    pub failed: Vec<DownloadFailure>,
}

impl DownloadSummary {
    pub fn attempted(&self) -> usize {
        self.saved.len() + self.failed.len()
    }
}

/// Fetch one conversion and write it to `output_dir/filename`.
pub(crate) async fn download(
    backend: &dyn ConversionBackend,
    config: &BatchConfig,
    conversion_id: &str,
    filename: &str,
) -> Result<PathBuf, BatchError> {
    let result = fetch_and_save(backend, config, conversion_id, filename).await;
    if let Some(ref cb) = config.progress_callback {
        match &result {
            Ok((_, bytes)) => cb.on_download_complete(filename, *bytes),
            Err(e) => cb.on_download_error(filename, &e.to_string()),
        }
    }
    match result {
        Ok((path, _)) => Ok(path),
        Err(e) => {
            warn!("Download of '{}' failed: {}", filename, e);
            Err(e)
        }
    }
}

/// Download every converted item in list order, continuing past failures.
pub(crate) async fn download_all(
    session: &SharedSession,
    backend: &dyn ConversionBackend,
    config: &BatchConfig,
) -> DownloadSummary {
    let targets: Vec<ConversionResult> = session
        .lock()
        .converted_items()
        .filter_map(|item| item.conversion_result().cloned())
        .collect();

    let mut summary = DownloadSummary::default();
    if targets.is_empty() {
        debug!("No converted files to download");
        return summary;
    }

    info!("Downloading {} converted files", targets.len());
    let mut used = HashSet::new();
    for target in targets {
        let name = unique_name(
            safe_file_name(&target.output_file, &target.conversion_id),
            &mut used,
        );
        match download(backend, config, &target.conversion_id, &name).await {
            Ok(path) => summary.saved.push(path),
            Err(e) => summary.failed.push(DownloadFailure {
                conversion_id: target.conversion_id,
                output_file: target.output_file,
                error: e.to_string(),
            }),
        }
    }
    info!(
        "Downloads finished: {} saved, {} failed",
        summary.saved.len(),
        summary.failed.len()
    );
    summary
}

async fn fetch_and_save(
    backend: &dyn ConversionBackend,
    config: &BatchConfig,
    conversion_id: &str,
    filename: &str,
) -> Result<(PathBuf, u64), BatchError> {
    let bytes = backend.download(conversion_id).await?;
    let path = config.output_dir.join(safe_file_name(filename, conversion_id));
    write_atomic(&path, &bytes).await?;
    debug!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok((path, bytes.len() as u64))
}

/// Reduce a backend-supplied name to its final component so it cannot point
/// outside the output directory.
fn safe_file_name(filename: &str, fallback: &str) -> String {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        fallback.to_string()
    } else {
        last.to_string()
    }
}

/// Claim `name` in `used`, numbering it `stem (n).ext` if already taken.
fn unique_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name.as_str(), ""),
    };
    let mut n = 1;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Write via a temp file + rename so readers never see a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BatchError> {
    let write_err = |source| BatchError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".part");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}
