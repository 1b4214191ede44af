//! Adapter over one shard's cursor: type-directed value access, label
//! resolution and close-once semantics.

use std::io::Read;

use chrono::FixedOffset;
use kestrel_common::datum::Datum;
use kestrel_common::error::{BindingError, ExecutionError, KestrelError, KestrelResult};

use crate::cursor::ShardCursor;
use crate::value::{self, StreamKind, Value, ValueType};

pub struct ResultStreamAdapter {
    target: String,
    cursor: Box<dyn ShardCursor>,
    closed: bool,
}

impl ResultStreamAdapter {
    /// `target` names the routed data source, used in error messages.
    pub fn new(target: impl Into<String>, cursor: Box<dyn ShardCursor>) -> Self {
        Self {
            target: target.into(),
            cursor,
            closed: false,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn advance(&mut self) -> KestrelResult<bool> {
        if self.closed {
            return Err(ExecutionError::Closed.into());
        }
        self.cursor.advance().map_err(|e| self.attribute(e))
    }

    pub fn datum(&self, index: usize) -> KestrelResult<&Datum> {
        if self.closed {
            return Err(ExecutionError::Closed.into());
        }
        self.cursor.datum(index)
    }

    /// Copy of the current row.
    pub fn row(&self) -> KestrelResult<Vec<Datum>> {
        (0..self.column_count())
            .map(|i| self.datum(i).cloned())
            .collect()
    }

    pub fn value(&self, index: usize, value_type: ValueType) -> KestrelResult<Option<Value>> {
        Ok(value::convert(self.datum(index)?, index, value_type)?)
    }

    pub fn calendar_value(
        &self,
        index: usize,
        value_type: ValueType,
        offset: FixedOffset,
    ) -> KestrelResult<Option<Value>> {
        Ok(value::convert_calendar(self.datum(index)?, index, value_type, offset)?)
    }

    pub fn input_stream(&self, index: usize, kind: StreamKind) -> KestrelResult<Option<Box<dyn Read>>> {
        Ok(value::stream(self.datum(index)?, index, kind)?)
    }

    pub fn column_count(&self) -> usize {
        self.cursor.column_count()
    }

    pub fn column_label(&self, index: usize) -> Option<&str> {
        self.cursor.column_label(index)
    }

    /// Case-insensitive label lookup.
    pub fn find_column(&self, label: &str) -> KestrelResult<usize> {
        (0..self.column_count())
            .find(|i| {
                self.column_label(*i)
                    .is_some_and(|l| l.eq_ignore_ascii_case(label))
            })
            .ok_or_else(|| BindingError::UnknownLabel(label.to_string()).into())
    }

    pub fn labels(&self) -> Vec<String> {
        (0..self.column_count())
            .map(|i| self.column_label(i).unwrap_or_default().to_string())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the cursor. Later calls are no-ops.
    pub fn close(&mut self) -> KestrelResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cursor.close().map_err(|e| self.attribute(e))
    }

    /// Name the target in cursor failures that do not carry one.
    fn attribute(&self, err: KestrelError) -> KestrelError {
        match err {
            KestrelError::Execution(ExecutionError::CursorFailed { reason, .. }) => {
                ExecutionError::CursorFailed {
                    shard: self.target.clone(),
                    reason,
                }
                .into()
            }
            other => other,
        }
    }
}

impl Drop for ResultStreamAdapter {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("result from {} dropped without close, closing", self.target);
            if let Err(e) = self.close() {
                tracing::warn!("closing result from {} failed: {}", self.target, e);
            }
        }
    }
}

impl std::fmt::Debug for ResultStreamAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStreamAdapter")
            .field("target", &self.target)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Close every adapter, attempting all of them, and report the first failure.
pub(crate) fn close_all(adapters: &mut [ResultStreamAdapter]) -> KestrelResult<()> {
    let mut first_err = None;
    for adapter in adapters.iter_mut() {
        if let Err(e) = adapter.close() {
            tracing::warn!("failed to close result from {}: {}", adapter.target(), e);
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
