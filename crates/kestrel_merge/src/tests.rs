#[cfg(test)]
mod selector_tests {
    use kestrel_common::config::MergeConfig;
    use kestrel_common::datum::Datum;

    use crate::adapter::ResultStreamAdapter;
    use crate::aggregation::AggregationItem;
    use crate::cursor::MemoryCursor;
    use crate::limit::RowNumberBound;
    use crate::order::{GroupByItem, NullOrdering, OrderByItem};
    use crate::selector::{MergeEngineSelector, MergeStrategy, Pagination, SelectContext};
    use crate::value::{Value, ValueType};
    use crate::Merger;

    fn selector() -> MergeEngineSelector {
        MergeEngineSelector::new(&MergeConfig::default())
    }

    fn shard(name: &str, ids: &[i64]) -> ResultStreamAdapter {
        let rows = ids.iter().map(|id| vec![Datum::Int64(*id)]).collect();
        ResultStreamAdapter::new(name, Box::new(MemoryCursor::from_rows(&["id"], rows)))
    }

    fn ids(m: &mut dyn Merger) -> Vec<i64> {
        let mut out = Vec::new();
        while m.next().unwrap() {
            match m.value(0, ValueType::Int64).unwrap() {
                Some(Value::Int64(v)) => out.push(v),
                other => panic!("unexpected {:?}", other),
            }
        }
        out
    }

    #[test]
    fn test_strategy_choice() {
        let s = selector();
        let plain = SelectContext::default();
        assert_eq!(s.strategy(3, &plain), MergeStrategy::Iterative);

        let ordered = SelectContext::default().with_order_by(vec![OrderByItem::asc("id", 0)]);
        assert_eq!(s.strategy(3, &ordered), MergeStrategy::OrderedStream);
        assert_eq!(s.strategy(1, &ordered), MergeStrategy::Iterative);

        let grouped = SelectContext::default()
            .with_group_by(vec![GroupByItem::asc("dept", 0)])
            .with_order_by(vec![OrderByItem::asc("dept", 0)])
            .with_aggregations(vec![AggregationItem::count("COUNT(*)", 1)]);
        assert_eq!(s.strategy(3, &grouped), MergeStrategy::GroupByStream);
        assert_eq!(s.strategy(1, &grouped), MergeStrategy::GroupByStream);

        let reordered = grouped.clone().with_order_by(vec![OrderByItem::desc("dept", 0)]);
        assert_eq!(s.strategy(3, &reordered), MergeStrategy::MemoryGroup);

        let nulls_last = grouped.clone().with_order_by(vec![
            OrderByItem::asc("dept", 0).with_null_ordering(NullOrdering::Last)
        ]);
        assert_eq!(s.strategy(3, &nulls_last), MergeStrategy::MemoryGroup);

        let by_count = grouped.clone().with_order_by(vec![OrderByItem::desc("COUNT(*)", 1)]);
        assert_eq!(s.strategy(3, &by_count), MergeStrategy::MemoryGroup);

        let aggregate_only =
            SelectContext::default().with_aggregations(vec![AggregationItem::count("COUNT(*)", 0)]);
        assert_eq!(s.strategy(2, &aggregate_only), MergeStrategy::MemoryGroup);
    }

    #[test]
    fn test_select_applies_pagination() {
        let ctx = SelectContext::default()
            .with_order_by(vec![OrderByItem::asc("id", 0)])
            .with_pagination(Pagination::new(Some(1), Some(2)));
        let mut m = selector()
            .select(vec![shard("ds_0", &[1, 3, 5]), shard("ds_1", &[2, 4])], &ctx)
            .unwrap();
        assert_eq!(ids(m.as_mut()), vec![2, 3]);
        m.close().unwrap();
    }

    #[test]
    fn test_select_applies_row_number_pagination() {
        let ordered = SelectContext::default().with_order_by(vec![OrderByItem::asc("id", 0)]);
        let shards = || vec![shard("ds_0", &[1, 3, 5, 7]), shard("ds_1", &[2, 4, 6])];

        // ROWNUM > 2 AND ROWNUM <= 5
        let rownum = ordered.clone().with_pagination(Pagination::row_number(
            Some(RowNumberBound::exclusive(2)),
            Some(RowNumberBound::inclusive(5)),
        ));
        let mut m = selector().select(shards(), &rownum).unwrap();
        assert_eq!(ids(m.as_mut()), vec![3, 4, 5]);
        m.close().unwrap();

        // TOP 4 ... WHERE rn >= 2, over unordered shards
        let top = SelectContext::default().with_pagination(Pagination::top_and_row_number(
            Some(4),
            Some(RowNumberBound::inclusive(2)),
        ));
        let mut m = selector().select(shards(), &top).unwrap();
        assert_eq!(ids(m.as_mut()), vec![3, 5, 7]);
        m.close().unwrap();
    }

    #[test]
    fn test_row_number_pagination_over_groups() {
        let labels = ["dept", "COUNT(*)"];
        let rows = |depts: &[&str]| {
            depts
                .iter()
                .map(|d| vec![Datum::Text(d.to_string()), Datum::Int64(1)])
                .collect::<Vec<_>>()
        };
        let shards = || {
            vec![
                ResultStreamAdapter::new(
                    "ds_0",
                    Box::new(MemoryCursor::from_rows(&labels, rows(&["a", "b", "d"]))),
                ),
                ResultStreamAdapter::new(
                    "ds_1",
                    Box::new(MemoryCursor::from_rows(&labels, rows(&["b", "c", "d"]))),
                ),
            ]
        };
        let grouped = SelectContext::default()
            .with_group_by(vec![GroupByItem::asc("dept", 0)])
            .with_aggregations(vec![AggregationItem::count("COUNT(*)", 1)]);
        let pagination = Pagination::top_and_row_number(Some(3), Some(RowNumberBound::exclusive(1)));
        for ctx in [
            grouped.clone().with_order_by(vec![OrderByItem::asc("dept", 0)]),
            grouped.clone().with_order_by(vec![OrderByItem::desc("COUNT(*)", 1)]),
        ] {
            let ctx = ctx.with_pagination(pagination);
            let mut m = selector().select(shards(), &ctx).unwrap();
            let mut out = Vec::new();
            while m.next().unwrap() {
                out.push((m.datum(0).unwrap().clone(), m.datum(1).unwrap().clone()));
            }
            assert_eq!(out.len(), 2);
            m.close().unwrap();
        }
    }

    #[test]
    fn test_single_shard_result_is_passed_through() {
        // The shard already applied LIMIT 1, 2 itself.
        let ctx = SelectContext::default()
            .with_order_by(vec![OrderByItem::asc("id", 0)])
            .with_pagination(Pagination::new(Some(1), Some(2)));
        let mut m = selector().select(vec![shard("ds_0", &[7, 8])], &ctx).unwrap();
        assert_eq!(ids(m.as_mut()), vec![7, 8]);
        m.close().unwrap();
    }

    #[test]
    fn test_labels_survive_decoration() {
        let ctx = SelectContext::default().with_pagination(Pagination::new(None, Some(1)));
        let mut m = selector()
            .select(vec![shard("ds_0", &[1]), shard("ds_1", &[2])], &ctx)
            .unwrap();
        assert_eq!(m.column_count(), 1);
        assert!(m.next().unwrap());
        assert_eq!(m.value_by_label("ID", ValueType::Int64).unwrap(), Some(Value::Int64(1)));
        assert!(!m.next().unwrap());
        m.close().unwrap();
    }

    #[test]
    fn test_group_by_with_differently_placed_nulls() {
        // GROUP BY dept ORDER BY dept ASC NULLS LAST over shards sorted NULLS FIRST.
        let labels = ["dept", "COUNT(*)"];
        let row = |dept: Datum| vec![dept, Datum::Int64(1)];
        let adapters = vec![
            ResultStreamAdapter::new(
                "ds_0",
                Box::new(MemoryCursor::from_rows(
                    &labels,
                    vec![row(Datum::Null), row(Datum::Text("A".into()))],
                )),
            ),
            ResultStreamAdapter::new(
                "ds_1",
                Box::new(MemoryCursor::from_rows(&labels, vec![row(Datum::Null)])),
            ),
        ];
        let ctx = SelectContext::default()
            .with_group_by(vec![GroupByItem::asc("dept", 0)])
            .with_order_by(vec![OrderByItem::asc("dept", 0).with_null_ordering(NullOrdering::Last)])
            .with_aggregations(vec![AggregationItem::count("COUNT(*)", 1)]);
        let mut m = selector().select(adapters, &ctx).unwrap();
        assert!(m.next().unwrap());
        assert_eq!(m.datum(0).unwrap(), &Datum::Text("A".into()));
        assert_eq!(m.datum(1).unwrap(), &Datum::Int64(1));
        assert!(m.next().unwrap());
        assert!(m.datum(0).unwrap().is_null());
        assert_eq!(m.datum(1).unwrap(), &Datum::Int64(2));
        assert!(!m.next().unwrap());
        m.close().unwrap();
    }
}
