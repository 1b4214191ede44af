//! Builds the statement's `ShardingConditions` from WHERE predicates or
//! INSERT value rows.

use std::sync::Arc;

use kestrel_common::config::ShardingConfig;
use kestrel_common::datum::Datum;
use kestrel_common::error::DerivationError;

use crate::clock::TimeService;
use crate::column::{Column, ShardingColumnRegistry};
use crate::condition::{ShardingCondition, ShardingConditions};
use crate::expr::{Operand, Predicate};
use crate::extractor::ConditionExtractor;
use crate::merger;
use crate::value::{ConditionValue, ListValue};

/// Bound INSERT ... VALUES statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertValues {
    pub table_name: String,
    /// Target column names, in the order the value rows list them.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Operand>>,
    pub generated_key: Option<GeneratedKey>,
}

/// Values generated by the key generator for a column absent from the
/// statement's column list, one per value row.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKey {
    pub column: String,
    pub values: Vec<Datum>,
}

pub struct ShardingConditionBuilder {
    extractor: ConditionExtractor,
    max_and_groups: usize,
}

impl ShardingConditionBuilder {
    pub fn new(
        registry: ShardingColumnRegistry,
        config: &ShardingConfig,
        time_service: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            extractor: ConditionExtractor::new(registry, time_service)
                .with_coercion(config.coerce_to_column_type),
            max_and_groups: config.max_and_groups,
        }
    }

    pub fn extractor(&self) -> &ConditionExtractor {
        &self.extractor
    }

    /// One condition per AND-group of the WHERE clause. Returns no conditions
    /// (full route) when there is no WHERE clause, when the OR expansion is too
    /// large, or when some AND-group does not constrain any routing column.
    pub fn build_where(
        &self,
        predicate: Option<&Predicate>,
        parameters: &[Datum],
    ) -> Result<ShardingConditions, DerivationError> {
        let Some(predicate) = predicate else {
            return Ok(self.finish("where", ShardingConditions::unconstrained()));
        };
        let Some(groups) = predicate.and_groups(self.max_and_groups) else {
            tracing::warn!(
                "OR expansion exceeds {} AND-groups, routing without constraints",
                self.max_and_groups
            );
            return Ok(self.finish("where", ShardingConditions::unconstrained()));
        };

        let bindings = self.extractor.bind(parameters);
        let mut conditions = Vec::with_capacity(groups.len());
        for (i, group) in groups.iter().enumerate() {
            let extracted = self.extractor.extract_group(group, &bindings)?;
            if extracted.is_empty() {
                tracing::debug!("AND-group {} has no routing values, routing without constraints", i);
                return Ok(self.finish("where", ShardingConditions::unconstrained()));
            }
            conditions.push(merge_group(extracted)?);
        }
        Ok(self.finish("where", ShardingConditions::new(conditions)))
    }

    /// One condition per value row. Routing columns missing from the column
    /// list take the generated key when one is supplied.
    pub fn build_insert(
        &self,
        insert: &InsertValues,
        parameters: &[Datum],
    ) -> Result<ShardingConditions, DerivationError> {
        let bindings = self.extractor.bind(parameters);
        let registry = self.extractor.registry();
        let generated = insert.generated_key.as_ref().and_then(|key| {
            let column = Column::new(key.column.as_str(), insert.table_name.as_str());
            let listed = insert
                .columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&key.column));
            (!listed && registry.is_sharding_column(&column)).then_some((column, &key.values))
        });

        let mut conditions = Vec::with_capacity(insert.rows.len());
        let mut consumed_parameters = 0usize;
        for (row_index, row) in insert.rows.iter().enumerate() {
            let mut condition = ShardingCondition::new().with_source_start_index(consumed_parameters);
            for (name, operand) in insert.columns.iter().zip(row) {
                let column = Column::new(name.as_str(), insert.table_name.as_str());
                if !registry.is_sharding_column(&column) {
                    continue;
                }
                if let Some(value) =
                    self.extractor
                        .extract_insert_value(&column, operand, row_index, &bindings)?
                {
                    condition.set(column, value);
                }
            }
            if let Some((column, values)) = &generated {
                if let Some(value) = values.get(row_index) {
                    if value.is_null() {
                        return Err(DerivationError::NullShardingValue {
                            column: column.to_string(),
                            row: row_index,
                        });
                    }
                    let value = ConditionValue::List(ListValue::single(value.clone(), None));
                    condition.set(column.clone(), value);
                }
            }
            consumed_parameters += row
                .iter()
                .filter(|o| matches!(o, Operand::Parameter(_)))
                .count();
            conditions.push(condition);
        }
        Ok(self.finish("insert", ShardingConditions::new(conditions)))
    }

    fn finish(&self, statement: &str, conditions: ShardingConditions) -> ShardingConditions {
        let always_false = conditions.iter().filter(|c| c.is_always_false()).count();
        tracing::debug!(
            "derived {} {} sharding condition(s), {} always false",
            conditions.len(),
            statement,
            always_false
        );
        kestrel_observability::record_sharding_conditions(statement, conditions.len(), always_false);
        conditions
    }
}

/// Fold the values of each column in first-seen column order.
fn merge_group(extracted: Vec<(Column, ConditionValue)>) -> Result<ShardingCondition, DerivationError> {
    let mut by_column: Vec<(Column, Vec<ConditionValue>)> = Vec::new();
    for (column, value) in extracted {
        match by_column.iter_mut().find(|(c, _)| *c == column) {
            Some((_, values)) => values.push(value),
            None => by_column.push((column, vec![value])),
        }
    }
    let mut condition = ShardingCondition::new();
    for (column, values) in by_column {
        if let Some(value) = merger::merge_all(&column, values)? {
            condition.set(column, value);
        }
    }
    Ok(condition)
}
