//! Dispatch: one conversion request for every uploaded item.
//!
//! The request covers the items that are `uploaded` when dispatch starts;
//! files added while it is in flight wait for the next dispatch. A failure
//! of the request itself leaves every item unchanged and is recorded as the
//! session error. A response that did arrive is reconciled item by item.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use super::InFlightGuard;
use crate::backend::{BatchRecord, ConversionBackend, RecordStatus};
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::item::{default_output_name, ConversionOutcome, ConversionResult, FileId};
use crate::session::{DispatchPlan, Operation, SharedSession, SkipReason};

/// Result of a [`crate::BatchConverter::convert`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Nothing was sent.
    Skipped { reason: SkipReason },
    /// The backend answered and the list was reconciled.
    Completed(DispatchReport),
    /// The session was reset while the request was in flight; the response
    /// was dropped.
    Discarded,
}

/// Details of a reconciled dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub target_format: String,
    /// Ids sent to the backend, in list order.
    pub submitted: Vec<FileId>,
    /// Per-file outcomes as returned by the backend.
    pub outcomes: Vec<ConversionOutcome>,
    pub converted: usize,
    pub failed: usize,
    /// Submitted ids the response did not mention.
    pub unmatched: Vec<FileId>,
}

/// Send the batch request and reconcile its response.
pub(crate) async fn run(
    session: &SharedSession,
    backend: &dyn ConversionBackend,
    config: &BatchConfig,
) -> Result<DispatchOutcome, BatchError> {
    let plan = {
        let mut s = session.lock();
        if s.is_converting() {
            return Err(BatchError::OperationInFlight(Operation::Conversion.label()));
        }
        match s.dispatch_plan() {
            Ok(plan) => {
                s.begin(Operation::Conversion)?;
                s.clear_error();
                plan
            }
            Err(reason) => {
                info!("Nothing dispatched: {:?}", reason);
                return Ok(DispatchOutcome::Skipped { reason });
            }
        }
    };
    let guard = InFlightGuard::new(session, Operation::Conversion, plan.epoch);

    let file_ids = plan.file_ids();
    info!(
        "Converting {} files to {}",
        file_ids.len(),
        plan.target_format
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_dispatch_start(file_ids.len(), &plan.target_format);
    }

    let response = backend.batch_convert(&file_ids, &plan.target_format).await;

    let mut s = session.lock();
    if !s.is_current(plan.epoch) {
        warn!("Batch was reset during conversion; discarding response");
        return Ok(DispatchOutcome::Discarded);
    }

    match response {
        Err(e) => {
            let message = e.to_string();
            warn!("Batch conversion request failed: {}", message);
            s.set_error(message.clone());
            guard.finish(&mut s);
            drop(s);
            if let Some(ref cb) = config.progress_callback {
                cb.on_dispatch_failed(&message);
            }
            Err(e.into())
        }
        Ok(records) => {
            let outcomes = to_outcomes(records, &plan);
            let reconciled = s.reconcile(&file_ids, &outcomes, config.unmatched);
            guard.finish(&mut s);
            drop(s);

            if !reconciled.unmatched.is_empty() {
                warn!(
                    "{} submitted files missing from conversion response",
                    reconciled.unmatched.len()
                );
            }
            info!(
                "Conversion finished: {} converted, {} failed",
                reconciled.converted, reconciled.failed
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_batch_complete(&outcomes);
            }

            Ok(DispatchOutcome::Completed(DispatchReport {
                target_format: plan.target_format,
                submitted: file_ids,
                outcomes,
                converted: reconciled.converted,
                failed: reconciled.failed,
                unmatched: reconciled.unmatched,
            }))
        }
    }
}

/// Turn wire records into typed outcomes.
///
/// A success record without a conversion id cannot be downloaded and counts
/// as a failure. A missing output filename is derived from the source name.
fn to_outcomes(records: Vec<BatchRecord>, plan: &DispatchPlan) -> Vec<ConversionOutcome> {
    let names: HashMap<&FileId, &str> = plan
        .entries
        .iter()
        .map(|(id, name)| (id, name.as_str()))
        .collect();

    records
        .into_iter()
        .map(|record| match (record.status, record.conversion_id) {
            (RecordStatus::Success, Some(conversion_id)) => {
                let output_file = record.converted_file.unwrap_or_else(|| {
                    let source = names
                        .get(&record.file_id)
                        .copied()
                        .unwrap_or(conversion_id.as_str());
                    default_output_name(source, &plan.target_format)
                });
                ConversionOutcome::Success {
                    file_id: record.file_id,
                    result: ConversionResult {
                        conversion_id,
                        output_file,
                        download_url: record.download_url,
                    },
                }
            }
            (RecordStatus::Success, None) => ConversionOutcome::Failure {
                file_id: record.file_id,
                error: "malformed conversion result: missing conversion_id".into(),
            },
            (RecordStatus::Error, _) => ConversionOutcome::Failure {
                file_id: record.file_id,
                error: record.error.unwrap_or_else(|| "Conversion failed".into()),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> DispatchPlan {
        DispatchPlan {
            epoch: 0,
            target_format: "pdf".into(),
            entries: vec![
                ("f1".into(), "a.docx".into()),
                ("f3".into(), "c.txt".into()),
            ],
        }
    }

    #[test]
    fn success_keeps_backend_filename() {
        let out = to_outcomes(vec![BatchRecord::success("f1", "cv1", "custom.pdf")], &plan());
        match &out[0] {
            ConversionOutcome::Success { result, .. } => assert_eq!(result.output_file, "custom.pdf"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn success_without_filename_derives_one() {
        let mut record = BatchRecord::success("f3", "cv3", "ignored");
        record.converted_file = None;
        record.download_url = Some("/api/download/cv3".into());
        let out = to_outcomes(vec![record], &plan());
        match &out[0] {
            ConversionOutcome::Success { result, .. } => {
                assert_eq!(result.output_file, "c.pdf");
                assert_eq!(result.download_url.as_deref(), Some("/api/download/cv3"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn success_without_conversion_id_is_failure() {
        let mut record = BatchRecord::success("f1", "cv1", "a.pdf");
        record.conversion_id = None;
        let out = to_outcomes(vec![record], &plan());
        assert!(!out[0].is_success());
    }

    #[test]
    fn error_without_message_gets_default() {
        let mut record = BatchRecord::failure("f1", "x");
        record.error = None;
        let out = to_outcomes(vec![record], &plan());
        assert_eq!(
            out[0],
            ConversionOutcome::Failure {
                file_id: "f1".into(),
                error: "Conversion failed".into()
            }
        );
    }
}
