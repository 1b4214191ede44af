//! Streaming grouping over shard results already sorted by the group key.
//!
//! Rows of one group arrive contiguously from the ordered stream merge, so a
//! group is complete as soon as a row with a different key shows up. Only
//! the current group is held in memory.

use kestrel_common::datum::Datum;
use kestrel_common::error::{BindingError, ExecutionError, KestrelError, KestrelResult};

use crate::adapter::{close_all, ResultStreamAdapter};
use crate::aggregation::{encode_group_key, AggregationItem, AggregationPlan, GroupAccumulator};
use crate::order::{GroupByItem, RowComparator};
use crate::stream::StreamMerger;
use crate::{Merger, WasNull};

pub struct GroupByStreamMerger {
    stream: StreamMerger,
    key_indexes: Vec<usize>,
    plan: AggregationPlan,
    /// First row of the next group, already pulled from the stream.
    pending: Option<Vec<Datum>>,
    current: Option<Vec<Datum>>,
    started: bool,
    closed: bool,
    null_flag: WasNull,
}

impl GroupByStreamMerger {
    pub fn new(
        mut adapters: Vec<ResultStreamAdapter>,
        group_by: &[GroupByItem],
        aggregations: &[AggregationItem],
    ) -> KestrelResult<Self> {
        let resolved = RowComparator::new(group_by, "GROUP BY")
            .and_then(|keys| Ok((keys, AggregationPlan::new(aggregations)?)));
        let (keys, plan) = match resolved {
            Ok(r) => r,
            Err(e) => {
                let _ = close_all(&mut adapters);
                return Err(e.into());
            }
        };
        let stream = StreamMerger::ordered(adapters, group_by)?;
        Ok(Self {
            stream,
            key_indexes: keys.indexes().collect(),
            plan,
            pending: None,
            current: None,
            started: false,
            closed: false,
            null_flag: WasNull::default(),
        })
    }

    fn pull(&mut self) -> KestrelResult<Option<Vec<Datum>>> {
        if self.stream.next()? {
            Ok(Some(self.stream.current_row()?))
        } else {
            Ok(None)
        }
    }

    fn fold_next_group(&mut self) -> KestrelResult<Option<Vec<Datum>>> {
        if !self.started {
            self.started = true;
            self.pending = self.pull()?;
            if self.pending.is_none() && self.key_indexes.is_empty() && !self.plan.is_empty() {
                let width = self.stream.column_count();
                return Ok(Some(GroupAccumulator::empty(width, &self.plan).finish()));
            }
        }
        let Some(first) = self.pending.take() else {
            return Ok(None);
        };
        let key = encode_group_key(&self.key_indexes, &first);
        let mut acc = GroupAccumulator::new(first, &self.plan);
        loop {
            match self.pull()? {
                Some(row) if encode_group_key(&self.key_indexes, &row) == key => acc.accumulate(&row),
                next => {
                    self.pending = next;
                    break;
                }
            }
        }
        Ok(Some(acc.finish()))
    }
}

impl Merger for GroupByStreamMerger {
    fn next(&mut self) -> KestrelResult<bool> {
        if self.closed {
            return Err(ExecutionError::Closed.into());
        }
        match self.fold_next_group() {
            Ok(row) => {
                self.current = row;
                Ok(self.current.is_some())
            }
            Err(e) => {
                self.current = None;
                self.pending = None;
                let _ = self.stream.close();
                Err(e)
            }
        }
    }

    fn datum(&self, index: usize) -> KestrelResult<&Datum> {
        if self.closed {
            return Err(ExecutionError::Closed.into());
        }
        let row = self.current.as_ref().ok_or(ExecutionError::NotPositioned)?;
        row.get(index).ok_or_else(|| {
            KestrelError::from(BindingError::ColumnOutOfBounds {
                index,
                width: row.len(),
            })
        })
    }

    fn column_count(&self) -> usize {
        self.stream.column_count()
    }

    fn column_label(&self, index: usize) -> Option<&str> {
        self.stream.column_label(index)
    }

    fn null_flag(&self) -> &WasNull {
        &self.null_flag
    }

    fn close(&mut self) -> KestrelResult<()> {
        self.closed = true;
        self.current = None;
        self.pending = None;
        self.stream.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::MemoryCursor;

    fn shard(name: &str, rows: Vec<Vec<Datum>>) -> ResultStreamAdapter {
        ResultStreamAdapter::new(name, Box::new(MemoryCursor::from_rows(&["dept", "cnt"], rows)))
    }

    fn row(d: &str, cnt: i64) -> Vec<Datum> {
        vec![Datum::Text(d.into()), Datum::Int64(cnt)]
    }

    #[test]
    fn test_folds_groups_spanning_shards() {
        let mut m = GroupByStreamMerger::new(
            vec![
                shard("ds_0", vec![row("A", 1), row("C", 2)]),
                shard("ds_1", vec![row("A", 4), row("B", 1), row("C", 1)]),
            ],
            &[GroupByItem::asc("dept", 0)],
            &[AggregationItem::count("COUNT(*)", 1)],
        )
        .unwrap();
        let mut out = Vec::new();
        while m.next().unwrap() {
            out.push(vec![m.datum(0).unwrap().clone(), m.datum(1).unwrap().clone()]);
        }
        assert_eq!(out, vec![row("A", 5), row("B", 1), row("C", 3)]);
        assert!(!m.next().unwrap());
        assert_eq!(m.column_label(1), Some("cnt"));
        m.close().unwrap();
    }

    #[test]
    fn test_unresolved_group_item() {
        let err = GroupByStreamMerger::new(
            vec![shard("ds_0", vec![])],
            &[GroupByItem::new("dept", crate::order::OrderDirection::Asc)],
            &[],
        )
        .err()
        .unwrap();
        assert!(matches!(err, KestrelError::Binding(BindingError::UnresolvedIndex { item: "GROUP BY", .. })));
    }
}
