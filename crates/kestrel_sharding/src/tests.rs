#[cfg(test)]
mod builder_tests {
    use std::ops::Bound;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use kestrel_common::config::ShardingConfig;
    use kestrel_common::datum::Datum;
    use kestrel_common::error::DerivationError;
    use kestrel_common::types::DataType;

    use crate::builder::{GeneratedKey, InsertValues, ShardingConditionBuilder};
    use crate::clock::FixedTimeService;
    use crate::column::{Column, ShardingColumnRegistry};
    use crate::expr::{CompareOp, Operand, Predicate};
    use crate::value::{ConditionValue, ListValue, RangeValue};

    fn builder_with(config: ShardingConfig) -> ShardingConditionBuilder {
        let registry = ShardingColumnRegistry::new()
            .with_typed_column(Column::new("order_id", "t_order"), DataType::Int64)
            .with_typed_column(Column::new("user_id", "t_order"), DataType::Int64);
        let clock = FixedTimeService::new(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        ShardingConditionBuilder::new(registry, &config, Arc::new(clock))
    }

    fn builder() -> ShardingConditionBuilder {
        builder_with(ShardingConfig::default())
    }

    fn order_id() -> Operand {
        Operand::column("order_id", "t_order")
    }

    fn user_id() -> Operand {
        Operand::column("user_id", "t_order")
    }

    fn ints(values: &[i64]) -> ConditionValue {
        ConditionValue::List(ListValue::new(
            values.iter().map(|v| Datum::Int64(*v)).collect(),
            vec![],
        ))
    }

    #[test]
    fn test_no_where_clause_is_unconstrained() {
        let conditions = builder().build_where(None, &[]).unwrap();
        assert!(conditions.is_empty());
        assert!(!conditions.is_always_false());
    }

    #[test]
    fn test_two_columns_one_group() {
        let p = Predicate::And(vec![
            Predicate::eq(order_id(), Datum::Int64(1)),
            Predicate::eq(user_id(), Datum::Int64(10)),
            Predicate::eq(Operand::column("status", "t_order"), Datum::Text("paid".into())),
        ]);
        let conditions = builder().build_where(Some(&p), &[]).unwrap();
        assert_eq!(conditions.len(), 1);
        let c = conditions.get(0).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.get(&Column::new("order_id", "t_order")), Some(&ints(&[1])));
        assert_eq!(c.get(&Column::new("user_id", "t_order")), Some(&ints(&[10])));
        assert_eq!(c.source_start_index(), None);
    }

    #[test]
    fn test_or_yields_one_condition_per_branch() {
        let p = Predicate::Or(vec![
            Predicate::eq(order_id(), Datum::Int64(1)),
            Predicate::eq(order_id(), Datum::Int64(2)),
        ]);
        let conditions = builder().build_where(Some(&p), &[]).unwrap();
        assert_eq!(conditions.len(), 2);
        let column = Column::new("order_id", "t_order");
        assert_eq!(conditions.get(0).unwrap().get(&column), Some(&ints(&[1])));
        assert_eq!(conditions.get(1).unwrap().get(&column), Some(&ints(&[2])));
    }

    #[test]
    fn test_or_with_unconstrained_branch_routes_everywhere() {
        let p = Predicate::Or(vec![
            Predicate::eq(order_id(), Datum::Int64(1)),
            Predicate::eq(Operand::column("name", "t_order"), Datum::Text("x".into())),
        ]);
        assert!(builder().build_where(Some(&p), &[]).unwrap().is_empty());
    }

    #[test]
    fn test_between_then_greater_than() {
        let p = Predicate::And(vec![
            Predicate::between(order_id(), Datum::Int64(5), Datum::Int64(20)),
            Predicate::compare(order_id(), CompareOp::Gt, Datum::Int64(10)),
        ]);
        let conditions = builder().build_where(Some(&p), &[]).unwrap();
        let value = conditions
            .get(0)
            .unwrap()
            .get(&Column::new("order_id", "t_order"))
            .cloned()
            .unwrap();
        assert_eq!(
            value,
            ConditionValue::Range(RangeValue::new(
                Bound::Excluded(Datum::Int64(10)),
                Bound::Included(Datum::Int64(20)),
            ))
        );
    }

    #[test]
    fn test_contradiction_routes_nowhere() {
        let p = Predicate::And(vec![
            Predicate::eq(order_id(), Datum::Int64(1)),
            Predicate::eq(order_id(), Datum::Int64(2)),
        ]);
        let conditions = builder().build_where(Some(&p), &[]).unwrap();
        assert_eq!(conditions.len(), 1);
        assert!(conditions.is_always_false());
        assert_eq!(conditions.routable().count(), 0);
    }

    #[test]
    fn test_type_mismatch_is_fatal() {
        let p = Predicate::And(vec![
            Predicate::eq(order_id(), Datum::Int64(1)),
            Predicate::eq(order_id(), Datum::Text("a".into())),
        ]);
        let err = builder().build_where(Some(&p), &[]).unwrap_err();
        assert!(matches!(err, DerivationError::TypeMismatch { ref column, .. } if column == "t_order.order_id"));
    }

    #[test]
    fn test_type_mismatch_after_contradiction_is_fatal() {
        let p = Predicate::And(vec![
            Predicate::eq(order_id(), Datum::Int64(1)),
            Predicate::eq(order_id(), Datum::Int64(2)),
            Predicate::eq(order_id(), Datum::Text("a".into())),
        ]);
        let err = builder().build_where(Some(&p), &[]).unwrap_err();
        assert!(matches!(err, DerivationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_or_expansion_overflow_falls_back_to_full_route() {
        let config = ShardingConfig {
            max_and_groups: 3,
            ..ShardingConfig::default()
        };
        let disjunction = || {
            Predicate::Or(vec![
                Predicate::eq(order_id(), Datum::Int64(1)),
                Predicate::eq(order_id(), Datum::Int64(2)),
            ])
        };
        let p = Predicate::And(vec![disjunction(), disjunction()]);
        assert!(builder_with(config).build_where(Some(&p), &[]).unwrap().is_empty());
        assert_eq!(builder().build_where(Some(&p), &[]).unwrap().len(), 4);
    }

    #[test]
    fn test_parameters_feed_conditions() {
        let p = Predicate::in_list(order_id(), vec![Operand::Parameter(0), Operand::Parameter(1)]);
        let conditions = builder()
            .build_where(Some(&p), &[Datum::Int32(8), Datum::Int32(3)])
            .unwrap();
        match conditions.get(0).unwrap().get(&Column::new("order_id", "t_order")) {
            Some(ConditionValue::List(list)) => {
                assert_eq!(list.values(), &[Datum::Int64(3), Datum::Int64(8)]);
                assert_eq!(list.parameter_indexes(), &[0, 1]);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    fn insert(rows: Vec<Vec<Operand>>) -> InsertValues {
        InsertValues {
            table_name: "t_order".into(),
            columns: vec!["user_id".into(), "status".into()],
            rows,
            generated_key: None,
        }
    }

    #[test]
    fn test_insert_one_condition_per_row() {
        let stmt = insert(vec![
            vec![Datum::Int64(1).into(), Datum::Text("a".into()).into()],
            vec![Datum::Int64(2).into(), Datum::Text("b".into()).into()],
            vec![Datum::Int64(3).into(), Datum::Text("c".into()).into()],
        ]);
        let conditions = builder().build_insert(&stmt, &[]).unwrap();
        let column = Column::new("user_id", "t_order");
        let values: Vec<ConditionValue> = conditions
            .iter()
            .map(|c| c.get(&column).cloned().unwrap())
            .collect();
        assert_eq!(values, vec![ints(&[1]), ints(&[2]), ints(&[3])]);
    }

    #[test]
    fn test_insert_source_start_index_counts_parameters() {
        let stmt = insert(vec![
            vec![Operand::Parameter(0), Operand::Parameter(1)],
            vec![Operand::Parameter(2), Datum::Text("b".into()).into()],
            vec![Operand::Parameter(3), Operand::Parameter(4)],
        ]);
        let params = vec![
            Datum::Int64(1),
            Datum::Text("a".into()),
            Datum::Int64(2),
            Datum::Int64(3),
            Datum::Text("c".into()),
        ];
        let conditions = builder().build_insert(&stmt, &params).unwrap();
        let starts: Vec<Option<usize>> = conditions.iter().map(|c| c.source_start_index()).collect();
        assert_eq!(starts, vec![Some(0), Some(2), Some(3)]);
    }

    #[test]
    fn test_insert_null_routing_value() {
        let stmt = insert(vec![
            vec![Datum::Int64(1).into(), Datum::Null.into()],
            vec![Datum::Null.into(), Datum::Text("b".into()).into()],
        ]);
        let err = builder().build_insert(&stmt, &[]).unwrap_err();
        assert_eq!(
            err,
            DerivationError::NullShardingValue {
                column: "t_order.user_id".into(),
                row: 1,
            }
        );
    }

    #[test]
    fn test_insert_generated_key_fills_missing_column() {
        let mut stmt = insert(vec![
            vec![Datum::Int64(1).into(), Datum::Text("a".into()).into()],
            vec![Datum::Int64(2).into(), Datum::Text("b".into()).into()],
        ]);
        stmt.generated_key = Some(GeneratedKey {
            column: "order_id".into(),
            values: vec![Datum::Int64(100), Datum::Int64(101)],
        });
        let conditions = builder().build_insert(&stmt, &[]).unwrap();
        let order_id = Column::new("order_id", "t_order");
        assert_eq!(conditions.get(0).unwrap().get(&order_id), Some(&ints(&[100])));
        assert_eq!(conditions.get(1).unwrap().get(&order_id), Some(&ints(&[101])));
        // column order: listed columns first, generated key last
        let names: Vec<&str> = conditions.get(0).unwrap().columns().map(Column::name).collect();
        assert_eq!(names, vec!["user_id", "order_id"]);
    }
}
