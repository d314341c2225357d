//! Per-stream projection cursors.
//!
//! Tracks the last applied sequence number per `(department, aggregate)`
//! stream so replays are ignored and gaps are detected.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use borrowdesk_core::{AggregateId, DepartmentId};

use super::ProjectionError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    department_id: DepartmentId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: Mutex<HashMap<CursorKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    // Written only after `apply` returns, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<CursorKey, u64>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `apply` if `seq` is the next position of the stream.
    ///
    /// Positions at or below the cursor are duplicates and are skipped. The
    /// first event seen for a stream may sit at any positive position; after
    /// that increments must be exactly one. The cursor advances only when
    /// `apply` succeeds, and stays locked while it runs.
    pub fn apply_in_order(
        &self,
        department_id: DepartmentId,
        aggregate_id: AggregateId,
        seq: u64,
        apply: impl FnOnce() -> Result<(), ProjectionError>,
    ) -> Result<(), ProjectionError> {
        let mut cursors = self.lock();

        let key = CursorKey {
            department_id,
            aggregate_id,
        };
        let last = cursors.get(&key).copied().unwrap_or(0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        apply()?;
        cursors.insert(key, seq);
        Ok(())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
