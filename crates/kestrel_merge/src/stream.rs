//! Streaming merge: k-way merge of pre-sorted shard results, or plain
//! concatenation when no order is required.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use kestrel_common::datum::Datum;
use kestrel_common::error::{ExecutionError, KestrelError, KestrelResult};

use crate::adapter::{close_all, ResultStreamAdapter};
use crate::order::{OrderByItem, RowComparator};
use crate::{Merger, WasNull};

/// Head row of one shard result, ordered by sort key then shard position so
/// equal keys come out in shard order.
struct HeapEntry {
    keys: Vec<Datum>,
    source: usize,
    comparator: Arc<RowComparator>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare_keys(&self.keys, &other.keys)
            .then_with(|| self.source.cmp(&other.source))
    }
}

enum Mode {
    Ordered {
        heap: BinaryHeap<Reverse<HeapEntry>>,
        comparator: Arc<RowComparator>,
    },
    Iterative {
        source: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Positioned,
    Exhausted,
    Closed,
}

pub struct StreamMerger {
    adapters: Vec<ResultStreamAdapter>,
    mode: Mode,
    state: State,
    current: Option<usize>,
    labels: Vec<String>,
    null_flag: WasNull,
}

impl StreamMerger {
    /// K-way merge by `order_by`. Every adapter is advanced once here so the
    /// smallest head row is known before the first `next()`. Empty `order_by`
    /// degrades to concatenation.
    pub fn ordered(mut adapters: Vec<ResultStreamAdapter>, order_by: &[OrderByItem]) -> KestrelResult<Self> {
        let comparator = match RowComparator::new(order_by, "ORDER BY") {
            Ok(c) => c,
            Err(e) => {
                let _ = close_all(&mut adapters);
                return Err(e.into());
            }
        };
        if comparator.is_empty() {
            return Ok(Self::iterative(adapters));
        }
        let mut merger = Self::with_mode(
            adapters,
            Mode::Ordered {
                heap: BinaryHeap::new(),
                comparator: Arc::new(comparator),
            },
        );
        for source in 0..merger.adapters.len() {
            if let Err(e) = merger.push_next(source) {
                return Err(merger.abort(e));
            }
        }
        Ok(merger)
    }

    /// Drain each adapter in turn.
    pub fn iterative(adapters: Vec<ResultStreamAdapter>) -> Self {
        Self::with_mode(adapters, Mode::Iterative { source: 0 })
    }

    fn with_mode(adapters: Vec<ResultStreamAdapter>, mode: Mode) -> Self {
        let labels = adapters.first().map(ResultStreamAdapter::labels).unwrap_or_default();
        Self {
            adapters,
            mode,
            state: State::Uninitialized,
            current: None,
            labels,
            null_flag: WasNull::default(),
        }
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self.mode, Mode::Ordered { .. })
    }

    /// Copy of the current merged row.
    pub fn current_row(&self) -> KestrelResult<Vec<Datum>> {
        self.current_adapter()?.row()
    }

    fn current_adapter(&self) -> KestrelResult<&ResultStreamAdapter> {
        match (self.state, self.current) {
            (State::Positioned, Some(source)) => Ok(&self.adapters[source]),
            (State::Closed, _) => Err(ExecutionError::Closed.into()),
            _ => Err(ExecutionError::NotPositioned.into()),
        }
    }

    /// Advance `source` and queue its next row, if any.
    fn push_next(&mut self, source: usize) -> KestrelResult<()> {
        let Mode::Ordered { heap, comparator } = &mut self.mode else {
            return Ok(());
        };
        let adapter = &mut self.adapters[source];
        if adapter.advance()? {
            let keys = comparator
                .indexes()
                .map(|i| adapter.datum(i).cloned())
                .collect::<KestrelResult<Vec<_>>>()?;
            heap.push(Reverse(HeapEntry {
                keys,
                source,
                comparator: Arc::clone(comparator),
            }));
        }
        Ok(())
    }

    fn advance_ordered(&mut self) -> KestrelResult<Option<usize>> {
        if self.state == State::Positioned {
            let popped = match &mut self.mode {
                Mode::Ordered { heap, .. } => heap.pop(),
                Mode::Iterative { .. } => None,
            };
            if let Some(Reverse(entry)) = popped {
                self.push_next(entry.source)?;
            }
        }
        Ok(match &self.mode {
            Mode::Ordered { heap, .. } => heap.peek().map(|Reverse(e)| e.source),
            Mode::Iterative { .. } => None,
        })
    }

    fn advance_iterative(&mut self) -> KestrelResult<Option<usize>> {
        let Mode::Iterative { source } = &mut self.mode else {
            return Ok(None);
        };
        while let Some(adapter) = self.adapters.get_mut(*source) {
            if adapter.advance()? {
                return Ok(Some(*source));
            }
            *source += 1;
        }
        Ok(None)
    }

    /// Stop the merge after a failure: close everything, keep the first error.
    fn abort(&mut self, err: KestrelError) -> KestrelError {
        tracing::warn!("stream merge aborted: {}", err);
        self.state = State::Exhausted;
        self.current = None;
        let _ = close_all(&mut self.adapters);
        err
    }
}

impl Merger for StreamMerger {
    fn next(&mut self) -> KestrelResult<bool> {
        match self.state {
            State::Exhausted => return Ok(false),
            State::Closed => return Err(ExecutionError::Closed.into()),
            State::Uninitialized | State::Positioned => {}
        }
        let positioned = if self.is_ordered() {
            self.advance_ordered()
        } else {
            self.advance_iterative()
        };
        match positioned {
            Ok(Some(source)) => {
                self.current = Some(source);
                self.state = State::Positioned;
                Ok(true)
            }
            Ok(None) => {
                self.current = None;
                self.state = State::Exhausted;
                Ok(false)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn datum(&self, index: usize) -> KestrelResult<&Datum> {
        self.current_adapter()?.datum(index)
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

    fn close(&mut self) -> KestrelResult<()> {
        self.state = State::Closed;
        self.current = None;
        close_all(&mut self.adapters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::MemoryCursor;
    use crate::value::{Value, ValueType};
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn shard(name: &str, ids: &[i64]) -> ResultStreamAdapter {
        let rows = ids
            .iter()
            .map(|id| vec![Datum::Int64(*id), Datum::Text(name.to_string())])
            .collect();
        ResultStreamAdapter::new(name, Box::new(MemoryCursor::from_rows(&["id", "shard"], rows)))
    }

    fn drain(m: &mut dyn Merger) -> Vec<(i64, String)> {
        let mut out = Vec::new();
        while m.next().unwrap() {
            let id = match m.value(0, ValueType::Int64).unwrap() {
                Some(Value::Int64(v)) => v,
                other => panic!("unexpected {:?}", other),
            };
            let shard = match m.value_by_label("SHARD", ValueType::Text).unwrap() {
                Some(Value::Text(s)) => s,
                other => panic!("unexpected {:?}", other),
            };
            out.push((id, shard));
        }
        out
    }

    #[test]
    fn test_ordered_merge_with_stable_ties() {
        let mut m = StreamMerger::ordered(
            vec![shard("ds_0", &[1, 4, 7]), shard("ds_1", &[2, 4, 8]), shard("ds_2", &[])],
            &[OrderByItem::asc("id", 0)],
        )
        .unwrap();
        let rows = drain(&mut m);
        let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![1, 2, 4, 4, 7, 8]);
        assert_eq!(rows[2].1, "ds_0");
        assert_eq!(rows[3].1, "ds_1");
        assert!(!m.next().unwrap());
        assert!(!m.next().unwrap());
        m.close().unwrap();
    }

    #[test]
    fn test_descending_merge() {
        let mut m = StreamMerger::ordered(
            vec![shard("ds_0", &[9, 3]), shard("ds_1", &[5, 4, 1])],
            &[OrderByItem::desc("id", 0)],
        )
        .unwrap();
        let ids: Vec<i64> = drain(&mut m).into_iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![9, 5, 4, 3, 1]);
        m.close().unwrap();
    }

    #[test]
    fn test_iterative_concatenates_in_shard_order() {
        let mut m = StreamMerger::iterative(vec![shard("ds_0", &[3, 1]), shard("ds_1", &[]), shard("ds_2", &[2])]);
        let ids: Vec<i64> = drain(&mut m).into_iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        m.close().unwrap();
    }

    #[test]
    fn test_not_positioned_before_next() {
        let mut m = StreamMerger::ordered(vec![shard("ds_0", &[1])], &[OrderByItem::asc("id", 0)]).unwrap();
        assert!(m.datum(0).is_err());
        assert!(m.next().unwrap());
        assert_eq!(m.datum(0).unwrap(), &Datum::Int64(1));
        assert!(!m.was_null());
        m.close().unwrap();
        assert!(matches!(m.next(), Err(KestrelError::Execution(ExecutionError::Closed))));
    }

    #[test]
    fn test_failure_closes_every_adapter() {
        let healthy = MemoryCursor::from_rows(&["id", "shard"], vec![vec![Datum::Int64(1), Datum::Null]]);
        let healthy_closed = healthy.close_flag();
        let failing = MemoryCursor::from_rows(
            &["id", "shard"],
            vec![vec![Datum::Int64(2), Datum::Null], vec![Datum::Int64(3), Datum::Null]],
        )
        .failing_after(1, "socket closed");
        let failing_closed = failing.close_flag();
        let mut m = StreamMerger::ordered(
            vec![
                ResultStreamAdapter::new("ds_0", Box::new(healthy)),
                ResultStreamAdapter::new("ds_1", Box::new(failing)),
            ],
            &[OrderByItem::asc("id", 0)],
        )
        .unwrap();
        assert!(m.next().unwrap()); // 1 from ds_0
        assert!(m.next().unwrap()); // 2 from ds_1
        let err = m.next().unwrap_err(); // ds_1 fails advancing past 2
        assert!(err.to_string().contains("ds_1"));
        assert!(healthy_closed.load(AtomicOrdering::Acquire));
        assert!(failing_closed.load(AtomicOrdering::Acquire));
        assert!(!m.next().unwrap());
    }

    #[test]
    fn test_unresolved_order_item_closes_adapters() {
        let cursor = MemoryCursor::from_rows(&["id"], vec![]);
        let closed = cursor.close_flag();
        let res = StreamMerger::ordered(
            vec![ResultStreamAdapter::new("ds_0", Box::new(cursor))],
            &[OrderByItem::new("id", crate::order::OrderDirection::Asc)],
        );
        assert!(res.is_err());
        assert!(closed.load(AtomicOrdering::Acquire));
    }
}
