//! Per-session batch state.
//!
//! A [`BatchSession`] owns the ordered item list plus the target format,
//! in-flight flags and the session-level error. Operations in
//! [`crate::pipeline`] lock it briefly, release it across every network
//! call and lock it again to apply the response.
//!
//! Every reset bumps the session **epoch**. Operations remember the epoch
//! they started under and drop their response if it changed, so a late reply
//! never lands in a fresh session.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{UnmatchedPolicy, MISSING_FROM_RESPONSE};
use crate::error::BatchError;
use crate::item::{BatchItem, ConversionOutcome, FileId, ItemStatus};

pub(crate) type SharedSession = Arc<Mutex<BatchSession>>;

/// Kind of long-running operation tracked by an in-flight flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Upload,
    Conversion,
}

impl Operation {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Conversion => "conversion",
        }
    }
}

/// State of one open batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSession {
    items: Vec<BatchItem>,
    target_format: Option<String>,
    uploading: bool,
    converting: bool,
    last_error: Option<String>,
    #[serde(skip)]
    epoch: u64,
}

/// Why a dispatch request was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No target format has been chosen.
    NoTargetFormat,
    /// No item is waiting for conversion.
    NothingToConvert,
}

/// Item counts as shown next to the file list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Uploaded and waiting for conversion.
    pub ready: usize,
    pub converted: usize,
    pub failed: usize,
}

/// Snapshot taken when a dispatch starts.
#[derive(Debug, Clone)]
pub(crate) struct DispatchPlan {
    pub epoch: u64,
    pub target_format: String,
    /// Id and file name of every submitted item, in list order.
    pub entries: Vec<(FileId, String)>,
}

impl DispatchPlan {
    pub fn file_ids(&self) -> Vec<FileId> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }
}

/// What reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Reconciled {
    pub converted: usize,
    pub failed: usize,
    /// Submitted ids the response did not mention.
    pub unmatched: Vec<FileId>,
}

impl BatchSession {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Read access ──────────────────────────────────────────────────────

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn target_format(&self) -> Option<&str> {
        self.target_format.as_deref()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    pub fn is_converting(&self) -> bool {
        self.converting
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.items.len(),
            ..BatchSummary::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Uploaded => summary.ready += 1,
                ItemStatus::Converted(_) => summary.converted += 1,
                ItemStatus::Error { .. } => summary.failed += 1,
            }
        }
        summary
    }

    /// Whether a dispatch would currently send a request.
    pub fn can_convert(&self) -> bool {
        !self.converting && self.dispatch_plan().is_ok()
    }

    /// Whether any item in the list carries `id`.
    pub fn contains_id(&self, id: &FileId) -> bool {
        self.items.iter().any(|item| item.id.as_ref() == Some(id))
    }

    /// Converted items in list order.
    pub fn converted_items(&self) -> impl Iterator<Item = &BatchItem> {
        self.items.iter().filter(|item| item.is_converted())
    }

    // ── Mutation ─────────────────────────────────────────────────────────

    pub(crate) fn append(&mut self, item: BatchItem) {
        self.items.push(item);
    }

    pub(crate) fn set_target_format(&mut self, format: String) {
        self.target_format = Some(format);
    }

    pub(crate) fn clear_target_format(&mut self) {
        self.target_format = None;
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Clear list, format, errors and flags, and start a new epoch.
    pub(crate) fn reset(&mut self) {
        let epoch = self.epoch.wrapping_add(1);
        *self = Self {
            epoch,
            ..Self::default()
        };
        debug!(epoch, "Batch session reset");
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Set the flag for `op`, failing if one is already running.
    pub(crate) fn begin(&mut self, op: Operation) -> Result<u64, BatchError> {
        let flag = self.flag_mut(op);
        if *flag {
            return Err(BatchError::OperationInFlight(op.label()));
        }
        *flag = true;
        Ok(self.epoch)
    }

    /// Clear the flag for `op` unless the session was reset since `epoch`.
    pub(crate) fn end(&mut self, op: Operation, epoch: u64) {
        if self.is_current(epoch) {
            *self.flag_mut(op) = false;
        }
    }

    fn flag_mut(&mut self, op: Operation) -> &mut bool {
        match op {
            Operation::Upload => &mut self.uploading,
            Operation::Conversion => &mut self.converting,
        }
    }

    /// Remove an item that is still waiting for conversion.
    pub(crate) fn remove(&mut self, id: &FileId) -> Result<BatchItem, BatchError> {
        let pos = self
            .items
            .iter()
            .position(|item| item.id.as_ref() == Some(id))
            .ok_or_else(|| BatchError::ItemNotFound { id: id.clone() })?;

        let item = &self.items[pos];
        if !item.is_uploaded() {
            return Err(BatchError::NotRemovable {
                id: id.clone(),
                status: item.status.label(),
            });
        }
        Ok(self.items.remove(pos))
    }

    /// Collect the ids of all uploaded items and the target format.
    pub(crate) fn dispatch_plan(&self) -> Result<DispatchPlan, SkipReason> {
        let target_format = self
            .target_format
            .clone()
            .ok_or(SkipReason::NoTargetFormat)?;

        let entries: Vec<(FileId, String)> = self
            .items
            .iter()
            .filter_map(|item| item.dispatchable_id().map(|id| (id.clone(), item.name.clone())))
            .collect();

        if entries.is_empty() {
            return Err(SkipReason::NothingToConvert);
        }
        Ok(DispatchPlan {
            epoch: self.epoch,
            target_format,
            entries,
        })
    }

    /// Fan dispatch outcomes back into the list.
    ///
    /// Only items whose id was `submitted` and which are still `uploaded`
    /// change. The first outcome for an id wins. Submitted ids without an
    /// outcome are returned as unmatched and handled per `policy`.
    pub(crate) fn reconcile(
        &mut self,
        submitted: &[FileId],
        outcomes: &[ConversionOutcome],
        policy: UnmatchedPolicy,
    ) -> Reconciled {
        let submitted: HashSet<&FileId> = submitted.iter().collect();
        let mut by_id: HashMap<&FileId, &ConversionOutcome> = HashMap::new();
        for outcome in outcomes {
            if submitted.contains(outcome.file_id()) {
                by_id.entry(outcome.file_id()).or_insert(outcome);
            } else {
                debug!(file_id = %outcome.file_id(), "Ignoring outcome for an id that was not submitted");
            }
        }

        let mut reconciled = Reconciled::default();
        for item in self.items.iter_mut() {
            let Some(id) = item.dispatchable_id().cloned() else {
                continue;
            };
            if !submitted.contains(&id) {
                continue;
            }
            match by_id.get(&id) {
                Some(outcome) => {
                    item.apply_outcome(outcome);
                    if outcome.is_success() {
                        reconciled.converted += 1;
                    } else {
                        reconciled.failed += 1;
                    }
                }
                None => {
                    warn!(file_id = %id, name = %item.name, "Conversion response did not mention submitted file");
                    if policy == UnmatchedPolicy::MarkError {
                        item.status = ItemStatus::Error {
                            message: MISSING_FROM_RESPONSE.to_string(),
                        };
                    }
                    reconciled.unmatched.push(id);
                }
            }
        }
        reconciled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ConversionResult, FileSelection, UploadReceipt};

    fn uploaded(name: &str, id: &str) -> BatchItem {
        BatchItem::uploaded(
            &FileSelection::new(name, "data"),
            UploadReceipt {
                file_id: id.into(),
                file_type: "docx".into(),
            },
        )
    }

    fn success(id: &str, cv: &str, file: &str) -> ConversionOutcome {
        ConversionOutcome::Success {
            file_id: id.into(),
            result: ConversionResult {
                conversion_id: cv.into(),
                output_file: file.into(),
                download_url: None,
            },
        }
    }

    fn failure(id: &str, msg: &str) -> ConversionOutcome {
        ConversionOutcome::Failure {
            file_id: id.into(),
            error: msg.into(),
        }
    }

    fn session_with(items: Vec<BatchItem>) -> BatchSession {
        let mut s = BatchSession::new();
        for item in items {
            s.append(item);
        }
        s
    }

    #[test]
    fn plan_requires_format() {
        let s = session_with(vec![uploaded("a.docx", "f1")]);
        assert_eq!(s.dispatch_plan().unwrap_err(), SkipReason::NoTargetFormat);
        assert!(!s.can_convert());
    }

    #[test]
    fn plan_requires_uploaded_item() {
        let mut s = session_with(vec![BatchItem::failed(
            &FileSelection::new("b.pdf", "x"),
            "upload failed",
        )]);
        s.set_target_format("pdf".into());
        assert_eq!(s.dispatch_plan().unwrap_err(), SkipReason::NothingToConvert);
    }

    #[test]
    fn plan_lists_only_uploaded_ids_in_order() {
        let mut s = session_with(vec![
            uploaded("a.docx", "f1"),
            BatchItem::failed(&FileSelection::new("b.pdf", "x"), "upload failed"),
            uploaded("c.txt", "f3"),
        ]);
        s.set_target_format("pdf".into());
        let plan = s.dispatch_plan().unwrap();
        assert_eq!(plan.file_ids(), vec![FileId::from("f1"), FileId::from("f3")]);
        assert_eq!(plan.entries[1].1, "c.txt");
    }

    #[test]
    fn reconcile_applies_success_and_failure() {
        let mut s = session_with(vec![uploaded("a.docx", "f1"), uploaded("c.txt", "f3")]);
        let submitted = vec![FileId::from("f1"), FileId::from("f3")];
        let r = s.reconcile(
            &submitted,
            &[success("f1", "cv1", "a.pdf"), failure("f3", "timeout")],
            UnmatchedPolicy::KeepUploaded,
        );
        assert_eq!(r.converted, 1);
        assert_eq!(r.failed, 1);
        assert!(r.unmatched.is_empty());
        assert_eq!(s.items()[0].conversion_result().unwrap().conversion_id, "cv1");
        assert_eq!(s.items()[1].error_message(), Some("timeout"));
    }

    #[test]
    fn reconcile_can_keep_unmatched_uploaded() {
        let mut s = session_with(vec![uploaded("a.docx", "f1"), uploaded("c.txt", "f3")]);
        let submitted = vec![FileId::from("f1"), FileId::from("f3")];
        let r = s.reconcile(&submitted, &[success("f1", "cv1", "a.pdf")], UnmatchedPolicy::KeepUploaded);
        assert_eq!(r.unmatched, vec![FileId::from("f3")]);
        assert!(s.items()[1].is_uploaded());
    }

    #[test]
    fn reconcile_marks_unmatched_as_error() {
        let mut s = session_with(vec![uploaded("a.docx", "f1")]);
        let r = s.reconcile(&[FileId::from("f1")], &[], UnmatchedPolicy::MarkError);
        assert_eq!(r.unmatched.len(), 1);
        assert_eq!(s.items()[0].error_message(), Some(MISSING_FROM_RESPONSE));
    }

    #[test]
    fn reconcile_ignores_items_added_after_dispatch() {
        let mut s = session_with(vec![uploaded("a.docx", "f1")]);
        s.append(uploaded("late.docx", "f9"));
        let r = s.reconcile(
            &[FileId::from("f1")],
            &[success("f1", "cv1", "a.pdf"), success("f9", "cv9", "late.pdf")],
            UnmatchedPolicy::KeepUploaded,
        );
        assert_eq!(r.converted, 1);
        assert!(s.items()[1].is_uploaded());
    }

    #[test]
    fn reconcile_first_outcome_for_id_wins() {
        let mut s = session_with(vec![uploaded("a.docx", "f1")]);
        s.reconcile(
            &[FileId::from("f1")],
            &[failure("f1", "first"), success("f1", "cv1", "a.pdf")],
            UnmatchedPolicy::KeepUploaded,
        );
        assert_eq!(s.items()[0].error_message(), Some("first"));
    }

    #[test]
    fn contains_id_ignores_failed_items() {
        let s = session_with(vec![
            uploaded("a.docx", "f1"),
            BatchItem::failed(&FileSelection::new("b.pdf", "x"), "upload failed"),
        ]);
        assert!(s.contains_id(&FileId::from("f1")));
        assert!(!s.contains_id(&FileId::from("f2")));
    }

    #[test]
    fn remove_only_uploaded_items() {
        let mut s = session_with(vec![uploaded("a.docx", "f1"), uploaded("c.txt", "f3")]);
        s.reconcile(&[FileId::from("f3")], &[success("f3", "cv3", "c.pdf")], UnmatchedPolicy::KeepUploaded);

        let removed = s.remove(&FileId::from("f1")).unwrap();
        assert_eq!(removed.name, "a.docx");
        assert!(matches!(
            s.remove(&FileId::from("f3")),
            Err(BatchError::NotRemovable { status: "converted", .. })
        ));
        assert!(matches!(
            s.remove(&FileId::from("nope")),
            Err(BatchError::ItemNotFound { .. })
        ));
        assert_eq!(s.items().len(), 1);
    }

    #[test]
    fn begin_rejects_second_operation_of_same_kind() {
        let mut s = BatchSession::new();
        let epoch = s.begin(Operation::Upload).unwrap();
        assert!(s.is_uploading());
        assert!(matches!(
            s.begin(Operation::Upload),
            Err(BatchError::OperationInFlight("upload"))
        ));
        assert!(s.begin(Operation::Conversion).is_ok());
        s.end(Operation::Upload, epoch);
        assert!(!s.is_uploading());
    }

    #[test]
    fn reset_clears_state_and_bumps_epoch() {
        let mut s = session_with(vec![uploaded("a.docx", "f1")]);
        s.set_target_format("pdf".into());
        s.set_error("Batch conversion failed");
        let old = s.begin(Operation::Conversion).unwrap();

        s.reset();

        assert!(s.items().is_empty());
        assert_eq!(s.target_format(), None);
        assert_eq!(s.last_error(), None);
        assert!(!s.is_converting());
        assert!(!s.is_current(old));

        // A late end() from the old epoch must not touch the new session.
        s.begin(Operation::Conversion).unwrap();
        s.end(Operation::Conversion, old);
        assert!(s.is_converting());
    }

    #[test]
    fn summary_counts_statuses() {
        let mut s = session_with(vec![
            uploaded("a.docx", "f1"),
            BatchItem::failed(&FileSelection::new("b.pdf", "x"), "upload failed"),
            uploaded("c.txt", "f3"),
        ]);
        s.reconcile(&[FileId::from("f1")], &[success("f1", "cv1", "a.pdf")], UnmatchedPolicy::KeepUploaded);
        assert_eq!(
            s.summary(),
            BatchSummary {
                total: 3,
                ready: 1,
                converted: 1,
                failed: 1
            }
        );
    }
}
