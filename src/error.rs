//! Error types for the docbatch library.
//!
//! Two error types mirror the two scopes a failure can have:
//!
//! * [`BatchError`]: a whole call failed (the batch request never came back,
//!   the requested format is not in the catalog, an output file could not be
//!   written). Returned as `Err(BatchError)` from [`crate::BatchConverter`]
//!   methods. Transport failures during dispatch are also recorded on the
//!   session so a UI can show them until cleared.
//!
//! * [`BackendError`]: one backend call failed. During intake and
//!   reconciliation its `Display` text becomes the item's error message and
//!   the batch carries on with the next file.

use std::path::PathBuf;
use thiserror::Error;

use crate::item::FileId;

/// Failure of a single call to the conversion backend.
///
/// The variants keep network, status and decoding failures apart for logging,
/// but items store only the rendered message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The request never produced an HTTP response.
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// The request exceeded its configured timeout.
    #[error("request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// The backend answered with a non-success status.
    #[error("{operation} failed with HTTP {status}: {detail}")]
    Status {
        operation: String,
        status: u16,
        detail: String,
    },

    /// The response body could not be decoded.
    #[error("malformed {operation} response: {detail}")]
    Malformed { operation: String, detail: String },

    /// The backend refused the request with a plain message.
    #[error("{0}")]
    Rejected(String),
}

/// Errors returned by [`crate::BatchConverter`] operations.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Backend ───────────────────────────────────────────────────────────
    /// A whole-call backend failure (batch transport, format catalog, download).
    #[error(transparent)]
    Backend(#[from] BackendError),

    // ── Session ───────────────────────────────────────────────────────────
    /// The requested target format is not in the catalog's output set.
    #[error("Unsupported target format '{format}'. Supported formats: {supported}")]
    UnsupportedFormat { format: String, supported: String },

    /// No item with this id is in the session.
    #[error("No item with id '{id}' in this batch")]
    ItemNotFound { id: FileId },

    /// Only items still waiting for conversion can be removed.
    #[error("Item '{id}' is {status} and cannot be removed")]
    NotRemovable { id: FileId, status: &'static str },

    /// A conflicting operation of the same kind is still running.
    #[error("A {0} is already in progress for this batch")]
    OperationInFlight(&'static str),

    // ── I/O ───────────────────────────────────────────────────────────────
    /// A selected file could not be read from disk.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A downloaded file could not be written.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config ────────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
