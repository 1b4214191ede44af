//! LIMIT/OFFSET applied on top of any merged result. Row-number pagination
//! (Oracle ROWNUM, SQL Server TOP with ROW_NUMBER()) maps onto the same
//! window of skipped and passed rows.

use kestrel_common::datum::Datum;
use kestrel_common::error::{ExecutionError, KestrelResult};

use crate::{Merger, WasNull};

/// One side of a row-number predicate such as `ROWNUM > 2` or `rn <= 10`.
/// Row numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowNumberBound {
    pub value: u64,
    /// `>=` / `<=` rather than `>` / `<`.
    pub inclusive: bool,
}

impl RowNumberBound {
    pub fn inclusive(value: u64) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: u64) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }

    /// Rows before the first admitted one, read as a lower bound.
    fn rows_before(self) -> u64 {
        if self.inclusive {
            self.value.saturating_sub(1)
        } else {
            self.value
        }
    }

    /// Last admitted row number, read as an upper bound.
    fn last_row(self) -> u64 {
        if self.inclusive {
            self.value
        } else {
            self.value.saturating_sub(1)
        }
    }
}

pub struct LimitDecorator {
    inner: Box<dyn Merger>,
    offset: u64,
    row_count: Option<u64>,
    skipped: bool,
    emitted: u64,
    exhausted: bool,
}

impl LimitDecorator {
    pub fn new(inner: Box<dyn Merger>, offset: Option<u64>, row_count: Option<u64>) -> Self {
        Self {
            inner,
            offset: offset.unwrap_or(0),
            row_count,
            skipped: false,
            emitted: 0,
            exhausted: false,
        }
    }

    /// Oracle `ROWNUM` bounds. Both bounds count rows of the merged result.
    pub fn row_number(
        inner: Box<dyn Merger>,
        offset: Option<RowNumberBound>,
        row_count: Option<RowNumberBound>,
    ) -> Self {
        let skip = offset.map_or(0, RowNumberBound::rows_before);
        let row_count = row_count.map(|b| b.last_row().saturating_sub(skip));
        Self::new(inner, Some(skip), row_count)
    }

    /// SQL Server `TOP top` with an optional `ROW_NUMBER()` lower bound.
    pub fn top_and_row_number(
        inner: Box<dyn Merger>,
        top: Option<u64>,
        offset: Option<RowNumberBound>,
    ) -> Self {
        Self::row_number(inner, offset, top.map(RowNumberBound::inclusive))
    }

    fn finish(&mut self) -> KestrelResult<bool> {
        self.exhausted = true;
        Ok(false)
    }
}

impl Merger for LimitDecorator {
    fn next(&mut self) -> KestrelResult<bool> {
        if self.exhausted {
            return Ok(false);
        }
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.offset {
                if !self.inner.next()? {
                    return self.finish();
                }
            }
        }
        if self.row_count.is_some_and(|n| self.emitted >= n) {
            return self.finish();
        }
        if self.inner.next()? {
            self.emitted += 1;
            Ok(true)
        } else {
            self.finish()
        }
    }

    fn datum(&self, index: usize) -> KestrelResult<&Datum> {
        // Past the last row the inner merger may still sit on a row we cut off.
        if self.exhausted {
            return Err(ExecutionError::NotPositioned.into());
        }
        self.inner.datum(index)
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, index: usize) -> Option<&str> {
        self.inner.column_label(index)
    }

    fn null_flag(&self) -> &WasNull {
        self.inner.null_flag()
    }

    fn close(&mut self) -> KestrelResult<()> {
        self.exhausted = true;
        self.inner.close()
    }
}
