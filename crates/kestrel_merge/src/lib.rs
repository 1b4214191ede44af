//! Cross-shard result merging.
//!
//! Every routed data node returns its own result set; the mergers here turn
//! those independent streams into the one result a single database would have
//! produced: ordered (k-way merge), grouped and aggregated (in memory or
//! streaming) and paginated.

pub mod adapter;
pub mod aggregation;
pub mod cursor;
pub mod group;
pub mod group_stream;
pub mod limit;
pub mod order;
pub mod selector;
pub mod stream;
pub mod value;

use std::cell::Cell;
use std::io::Read;

use chrono::FixedOffset;
use kestrel_common::datum::Datum;
use kestrel_common::error::{BindingError, KestrelResult};

pub use adapter::ResultStreamAdapter;
pub use aggregation::{AggregationItem, AggregationKind};
pub use cursor::{MemoryCursor, ShardCursor};
pub use group::MemoryGroupMerger;
pub use group_stream::GroupByStreamMerger;
pub use limit::{LimitDecorator, RowNumberBound};
pub use order::{GroupByItem, NullOrdering, OrderByItem, OrderDirection};
pub use selector::{MergeEngineSelector, MergeStrategy, Pagination, SelectContext};
pub use stream::StreamMerger;
pub use value::{StreamKind, Value, ValueType};

/// Whether the last value read through a [`Merger`] was SQL NULL.
#[derive(Debug, Default)]
pub struct WasNull(Cell<bool>);

impl WasNull {
    pub fn set(&self, was_null: bool) {
        self.0.set(was_null);
    }

    pub fn get(&self) -> bool {
        self.0.get()
    }
}

/// A merged result, iterated row by row. Column indexes are 0-based.
///
/// Implementors supply row positioning, raw datum access and metadata; typed
/// access and label resolution are shared.
pub trait Merger {
    /// Move to the next merged row. `Ok(false)` once exhausted, and forever
    /// after.
    fn next(&mut self) -> KestrelResult<bool>;

    /// Column `index` of the current merged row.
    fn datum(&self, index: usize) -> KestrelResult<&Datum>;

    fn column_count(&self) -> usize;

    fn column_label(&self, index: usize) -> Option<&str>;

    fn null_flag(&self) -> &WasNull;

    /// Close every underlying shard result.
    fn close(&mut self) -> KestrelResult<()>;

    fn value(&self, index: usize, value_type: ValueType) -> KestrelResult<Option<Value>> {
        let v = value::convert(self.datum(index)?, index, value_type)?;
        self.null_flag().set(v.is_none());
        Ok(v)
    }

    fn calendar_value(
        &self,
        index: usize,
        value_type: ValueType,
        offset: FixedOffset,
    ) -> KestrelResult<Option<Value>> {
        let v = value::convert_calendar(self.datum(index)?, index, value_type, offset)?;
        self.null_flag().set(v.is_none());
        Ok(v)
    }

    fn input_stream(&self, index: usize, kind: StreamKind) -> KestrelResult<Option<Box<dyn Read>>> {
        let v = value::stream(self.datum(index)?, index, kind)?;
        self.null_flag().set(v.is_none());
        Ok(v)
    }

    /// Case-insensitive label lookup.
    fn find_column(&self, label: &str) -> KestrelResult<usize> {
        (0..self.column_count())
            .find(|i| {
                self.column_label(*i)
                    .is_some_and(|l| l.eq_ignore_ascii_case(label))
            })
            .ok_or_else(|| BindingError::UnknownLabel(label.to_string()).into())
    }

    fn value_by_label(&self, label: &str, value_type: ValueType) -> KestrelResult<Option<Value>> {
        self.value(self.find_column(label)?, value_type)
    }

    fn calendar_value_by_label(
        &self,
        label: &str,
        value_type: ValueType,
        offset: FixedOffset,
    ) -> KestrelResult<Option<Value>> {
        self.calendar_value(self.find_column(label)?, value_type, offset)
    }

    fn input_stream_by_label(&self, label: &str, kind: StreamKind) -> KestrelResult<Option<Box<dyn Read>>> {
        self.input_stream(self.find_column(label)?, kind)
    }

    fn was_null(&self) -> bool {
        self.null_flag().get()
    }
}

#[cfg(test)]
mod tests;
