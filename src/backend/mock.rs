//! Scriptable in-memory backend for tests and demos.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use super::{BatchRecord, ConversionBackend};
use crate::error::BackendError;
use crate::formats::FormatCatalog;
use crate::item::{FileId, FileSelection, UploadReceipt, UNKNOWN_TYPE};

/// Mock conversion backend.
///
/// Responses are queued per key and consumed in FIFO order:
///
/// * uploads are keyed by file name. A file with nothing queued is accepted
///   with id `id{n}`, where `n` is the 1-based number of the upload call, and
///   its extension as detected type.
/// * batch conversions have a single queue. An empty queue is an error.
/// * downloads are keyed by conversion id. Nothing queued answers HTTP 404.
///
/// # Example
/// ```rust
/// use docbatch::backend::{BatchRecord, MockBackend};
/// use docbatch::BackendError;
///
/// let mock = MockBackend::new();
/// mock.fail_upload("b.docx", BackendError::Rejected("upload failed".into()));
/// mock.add_batch_response(Ok(vec![BatchRecord::success("id1", "cv1", "a.pdf")]));
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    upload_counter: Arc<AtomicUsize>,
}

#[derive(Default)]
struct MockState {
    formats: Option<Result<FormatCatalog, BackendError>>,
    uploads: HashMap<String, VecDeque<MockResponse<UploadReceipt>>>,
    batches: VecDeque<MockResponse<Vec<BatchRecord>>>,
    downloads: HashMap<String, VecDeque<MockResponse<Bytes>>>,
}

/// A queued response that can optionally wait for a trigger before completing.
enum MockResponse<T> {
    Immediate(Result<T, BackendError>),
    Triggered {
        response: Result<T, BackendError>,
        trigger: oneshot::Receiver<()>,
    },
}

impl<T> MockResponse<T> {
    async fn resolve(self) -> Result<T, BackendError> {
        match self {
            MockResponse::Immediate(response) => response,
            MockResponse::Triggered { response, trigger } => {
                // A dropped sender releases the response as well.
                let _ = trigger.await;
                response
            }
        }
    }
}

/// Record of a call made to the mock backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Formats,
    Upload { name: String, size_bytes: u64 },
    BatchConvert {
        file_ids: Vec<FileId>,
        target_format: String,
    },
    Download { conversion_id: String },
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_formats(&self, response: Result<FormatCatalog, BackendError>) {
        self.state.lock().formats = Some(response);
    }

    pub fn add_upload_response(&self, name: &str, response: Result<UploadReceipt, BackendError>) {
        self.state
            .lock()
            .uploads
            .entry(name.to_string())
            .or_default()
            .push_back(MockResponse::Immediate(response));
    }

    /// Accept `name` with a fixed id and type.
    pub fn accept_upload(&self, name: &str, file_id: &str, file_type: &str) {
        self.add_upload_response(
            name,
            Ok(UploadReceipt {
                file_id: file_id.into(),
                file_type: file_type.to_string(),
            }),
        );
    }

    pub fn fail_upload(&self, name: &str, error: BackendError) {
        self.add_upload_response(name, Err(error));
    }

    /// Queue an upload response that completes only once the returned sender
    /// fires (or is dropped).
    pub fn add_upload_response_with_trigger(
        &self,
        name: &str,
        response: Result<UploadReceipt, BackendError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .uploads
            .entry(name.to_string())
            .or_default()
            .push_back(MockResponse::Triggered {
                response,
                trigger: rx,
            });
        tx
    }

    pub fn add_batch_response(&self, response: Result<Vec<BatchRecord>, BackendError>) {
        self.state
            .lock()
            .batches
            .push_back(MockResponse::Immediate(response));
    }

    pub fn add_batch_response_with_trigger(
        &self,
        response: Result<Vec<BatchRecord>, BackendError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().batches.push_back(MockResponse::Triggered {
            response,
            trigger: rx,
        });
        tx
    }

    pub fn add_download_response(&self, conversion_id: &str, response: Result<Bytes, BackendError>) {
        self.state
            .lock()
            .downloads
            .entry(conversion_id.to_string())
            .or_default()
            .push_back(MockResponse::Immediate(response));
    }

    /// Get all calls that have been made to this mock backend.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// The `file_ids` of every batch conversion call, in call order.
    pub fn batch_payloads(&self) -> Vec<Vec<FileId>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                MockCall::BatchConvert { file_ids, .. } => Some(file_ids.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ConversionBackend for MockBackend {
    async fn formats(&self) -> Result<FormatCatalog, BackendError> {
        self.record(MockCall::Formats);
        self.state
            .lock()
            .formats
            .clone()
            .unwrap_or_else(|| Ok(FormatCatalog::default()))
    }

    async fn upload(&self, file: &FileSelection) -> Result<UploadReceipt, BackendError> {
        let n = self.upload_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(MockCall::Upload {
            name: file.name.clone(),
            size_bytes: file.size_bytes(),
        });

        let queued = self
            .state
            .lock()
            .uploads
            .get_mut(&file.name)
            .and_then(|queue| queue.pop_front());

        match queued {
            Some(response) => response.resolve().await,
            None => Ok(UploadReceipt {
                file_id: FileId::from(format!("id{n}")),
                file_type: file.extension().unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
            }),
        }
    }

    async fn batch_convert(
        &self,
        file_ids: &[FileId],
        target_format: &str,
    ) -> Result<Vec<BatchRecord>, BackendError> {
        self.record(MockCall::BatchConvert {
            file_ids: file_ids.to_vec(),
            target_format: target_format.to_string(),
        });

        let queued = self.state.lock().batches.pop_front();
        match queued {
            Some(response) => response.resolve().await,
            None => Err(BackendError::Rejected(
                "no mock batch response configured".into(),
            )),
        }
    }

    async fn download(&self, conversion_id: &str) -> Result<Bytes, BackendError> {
        self.record(MockCall::Download {
            conversion_id: conversion_id.to_string(),
        });

        let queued = self
            .state
            .lock()
            .downloads
            .get_mut(conversion_id)
            .and_then(|queue| queue.pop_front());

        match queued {
            Some(response) => response.resolve().await,
            None => Err(BackendError::Status {
                operation: format!("download of conversion '{conversion_id}'"),
                status: 404,
                detail: "Conversion not found".into(),
            }),
        }
    }
}
