//! Batch phases.
//!
//! ```text
//! intake ──▶ dispatch ──▶ delivery
//! (upload)   (convert)    (download)
//! ```
//!
//! 1. [`intake`]: upload selections one at a time and append an item per file
//! 2. [`dispatch`]: send one conversion request for every uploaded item and
//!    reconcile the per-file results into the list
//! 3. [`delivery`]: save converted files; never touches the list
//!
//! Each phase releases the session lock while waiting on the backend.

pub mod delivery;
pub mod dispatch;
pub mod intake;

use crate::session::{BatchSession, Operation, SharedSession};

/// Clears an in-flight flag when the operation ends, including when its
/// future is dropped half-way.
pub(crate) struct InFlightGuard<'a> {
    session: &'a SharedSession,
    op: Operation,
    epoch: u64,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    pub(crate) fn new(session: &'a SharedSession, op: Operation, epoch: u64) -> Self {
        Self {
            session,
            op,
            epoch,
            armed: true,
        }
    }

    /// Clear the flag through an already held lock.
    pub(crate) fn finish(mut self, session: &mut BatchSession) {
        session.end(self.op, self.epoch);
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.lock().end(self.op, self.epoch);
        }
    }
}
