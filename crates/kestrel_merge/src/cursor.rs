//! Physical per-shard result cursors.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kestrel_common::datum::{Datum, OwnedRow};
use kestrel_common::error::{BindingError, ExecutionError, KestrelResult};

/// A forward-only cursor over one data node's result set.
pub trait ShardCursor: Send {
    /// Move to the next row. `Ok(false)` once the result set is exhausted.
    fn advance(&mut self) -> KestrelResult<bool>;

    /// Column `index` of the current row.
    fn datum(&self, index: usize) -> KestrelResult<&Datum>;

    fn column_count(&self) -> usize;

    fn column_label(&self, index: usize) -> Option<&str>;

    fn close(&mut self) -> KestrelResult<()>;
}

/// A cursor over rows already held in memory. Used for buffered results and
/// in tests; can be told to fail after a number of rows.
#[derive(Debug)]
pub struct MemoryCursor {
    labels: Vec<String>,
    pending: VecDeque<OwnedRow>,
    current: Option<OwnedRow>,
    fail_after: Option<(usize, String)>,
    delivered: usize,
    closed: Arc<AtomicBool>,
}

impl MemoryCursor {
    pub fn new(labels: Vec<String>, rows: Vec<OwnedRow>) -> Self {
        Self {
            labels,
            pending: rows.into(),
            current: None,
            fail_after: None,
            delivered: 0,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Convenience constructor from plain value vectors.
    pub fn from_rows(labels: &[&str], rows: Vec<Vec<Datum>>) -> Self {
        Self::new(
            labels.iter().map(|l| l.to_string()).collect(),
            rows.into_iter().map(OwnedRow::new).collect(),
        )
    }

    /// Fail with `reason` on the advance after `rows` rows were delivered.
    pub fn failing_after(mut self, rows: usize, reason: impl Into<String>) -> Self {
        self.fail_after = Some((rows, reason.into()));
        self
    }

    /// Shared flag that flips to `true` once the cursor is closed.
    pub fn close_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl ShardCursor for MemoryCursor {
    fn advance(&mut self) -> KestrelResult<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecutionError::Closed.into());
        }
        if let Some((limit, reason)) = &self.fail_after {
            if self.delivered >= *limit {
                self.current = None;
                return Err(ExecutionError::CursorFailed {
                    shard: "memory".into(),
                    reason: reason.clone(),
                }
                .into());
            }
        }
        self.current = self.pending.pop_front();
        if self.current.is_some() {
            self.delivered += 1;
        }
        Ok(self.current.is_some())
    }

    fn datum(&self, index: usize) -> KestrelResult<&Datum> {
        let row = self.current.as_ref().ok_or(ExecutionError::NotPositioned)?;
        row.get(index).ok_or_else(|| {
            BindingError::ColumnOutOfBounds {
                index,
                width: row.len(),
            }
            .into()
        })
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    fn close(&mut self) -> KestrelResult<()> {
        self.current = None;
        self.pending.clear();
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
