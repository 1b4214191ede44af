//! In-memory grouping: drain every shard result, fold rows into groups and
//! serve the merged groups from a buffer.

use std::collections::{HashMap, VecDeque};

use kestrel_common::datum::Datum;
use kestrel_common::error::{BindingError, ExecutionError, KestrelResult};
use tracing::debug;

use crate::adapter::{close_all, ResultStreamAdapter};
use crate::aggregation::{encode_group_key, AggregationItem, AggregationPlan, GroupAccumulator};
use crate::order::{GroupByItem, OrderByItem, RowComparator};
use crate::{Merger, WasNull};

pub struct MemoryGroupMerger {
    rows: VecDeque<Vec<Datum>>,
    current: Option<Vec<Datum>>,
    labels: Vec<String>,
    null_flag: WasNull,
    closed: bool,
}

impl MemoryGroupMerger {
    /// Drains and closes `adapters`. At most `max_rows_buffered` groups are
    /// materialized.
    pub fn new(
        mut adapters: Vec<ResultStreamAdapter>,
        group_by: &[GroupByItem],
        order_by: &[OrderByItem],
        aggregations: &[AggregationItem],
        max_rows_buffered: usize,
    ) -> KestrelResult<Self> {
        let labels = adapters.first().map(ResultStreamAdapter::labels).unwrap_or_default();
        let rows = match materialize(&mut adapters, group_by, order_by, aggregations, max_rows_buffered) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("memory group merge aborted: {}", e);
                let _ = close_all(&mut adapters);
                return Err(e);
            }
        };
        close_all(&mut adapters)?;
        debug!("memory group merge buffered {} rows from {} shards", rows.len(), adapters.len());
        kestrel_observability::record_merged_rows("memory_group", rows.len());
        Ok(Self {
            rows: rows.into(),
            current: None,
            labels,
            null_flag: WasNull::default(),
            closed: false,
        })
    }
}

fn materialize(
    adapters: &mut [ResultStreamAdapter],
    group_by: &[GroupByItem],
    order_by: &[OrderByItem],
    aggregations: &[AggregationItem],
    max_rows_buffered: usize,
) -> KestrelResult<Vec<Vec<Datum>>> {
    let key_indexes: Vec<usize> = RowComparator::new(group_by, "GROUP BY")?.indexes().collect();
    let order = RowComparator::new(order_by, "ORDER BY")?;
    let plan = AggregationPlan::new(aggregations)?;
    // Nothing to fold: every row stands alone and is only re-sorted.
    let passthrough = key_indexes.is_empty() && plan.is_empty();

    let mut positions: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut groups: Vec<GroupAccumulator> = Vec::new();
    let mut plain: Vec<Vec<Datum>> = Vec::new();
    let mut width = 0;
    for adapter in adapters.iter_mut() {
        width = width.max(adapter.column_count());
        while adapter.advance()? {
            let row = adapter.row()?;
            let buffered = if passthrough { plain.len() } else { groups.len() };
            if passthrough {
                check_limit(buffered, max_rows_buffered)?;
                plain.push(row);
                continue;
            }
            let key = encode_group_key(&key_indexes, &row);
            match positions.get(&key) {
                Some(&pos) => groups[pos].accumulate(&row),
                None => {
                    check_limit(buffered, max_rows_buffered)?;
                    positions.insert(key, groups.len());
                    groups.push(GroupAccumulator::new(row, &plan));
                }
            }
        }
    }

    if groups.is_empty() && key_indexes.is_empty() && !plan.is_empty() {
        groups.push(GroupAccumulator::empty(width, &plan));
    }
    let mut rows = if passthrough {
        plain
    } else {
        groups.into_iter().map(GroupAccumulator::finish).collect()
    };
    if !order.is_empty() {
        rows.sort_by(|a, b| order.compare_rows(a, b));
    }
    Ok(rows)
}

fn check_limit(buffered: usize, limit: usize) -> KestrelResult<()> {
    if buffered >= limit {
        return Err(ExecutionError::RowLimitExceeded {
            buffered: buffered + 1,
            limit,
        }
        .into());
    }
    Ok(())
}

impl Merger for MemoryGroupMerger {
    fn next(&mut self) -> KestrelResult<bool> {
        if self.closed {
            return Err(ExecutionError::Closed.into());
        }
        self.current = self.rows.pop_front();
        Ok(self.current.is_some())
    }

    fn datum(&self, index: usize) -> KestrelResult<&Datum> {
        if self.closed {
            return Err(ExecutionError::Closed.into());
        }
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

    fn null_flag(&self) -> &WasNull {
        &self.null_flag
    }

    /// The shard results were closed once drained; this releases the buffer.
    fn close(&mut self) -> KestrelResult<()> {
        self.closed = true;
        self.current = None;
        self.rows.clear();
        Ok(())
    }
}
