//! Per-predicate extraction of routing condition values.
//!
//! The extractor looks at one atom of an AND-group at a time; combining several
//! atoms on the same column is the merger's job.

use std::ops::Bound;
use std::sync::Arc;

use chrono::NaiveDateTime;
use kestrel_common::datum::Datum;
use kestrel_common::error::DerivationError;

use crate::clock::TimeService;
use crate::column::{Column, ShardingColumnRegistry};
use crate::expr::{CompareOp, CurrentTimeKind, Operand, Predicate};
use crate::value::{ConditionValue, ListValue, RangeValue};

/// Statement-scoped inputs: the bound parameters and the instant "now" is
/// pinned to for the whole statement.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'p> {
    parameters: &'p [Datum],
    now: NaiveDateTime,
}

impl<'p> Bindings<'p> {
    pub fn parameters(&self) -> &'p [Datum] {
        self.parameters
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }
}

/// A resolved operand: the value plus the parameter it was read from, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedValue {
    pub value: Datum,
    pub parameter_index: Option<usize>,
}

pub struct ConditionExtractor {
    registry: ShardingColumnRegistry,
    time_service: Arc<dyn TimeService>,
    coerce_to_column_type: bool,
}

impl ConditionExtractor {
    pub fn new(registry: ShardingColumnRegistry, time_service: Arc<dyn TimeService>) -> Self {
        Self {
            registry,
            time_service,
            coerce_to_column_type: true,
        }
    }

    pub fn with_coercion(mut self, enabled: bool) -> Self {
        self.coerce_to_column_type = enabled;
        self
    }

    pub fn registry(&self) -> &ShardingColumnRegistry {
        &self.registry
    }

    /// Pin parameters and the clock for one statement.
    pub fn bind<'p>(&self, parameters: &'p [Datum]) -> Bindings<'p> {
        Bindings {
            parameters,
            now: self.time_service.now(),
        }
    }

    /// Extract the condition value one atom places on a routing column.
    /// `Ok(None)` when the atom does not constrain any routing column.
    pub fn extract(
        &self,
        atom: &Predicate,
        bindings: &Bindings<'_>,
    ) -> Result<Option<(Column, ConditionValue)>, DerivationError> {
        match atom {
            Predicate::Compare { left, op, right } => self.extract_compare(left, *op, right, bindings),
            Predicate::Between {
                expr,
                low,
                high,
                negated: false,
            } => self.extract_between(expr, low, high, bindings),
            Predicate::InList {
                expr,
                list,
                negated: false,
            } => self.extract_in_list(expr, list, bindings),
            Predicate::Between { negated: true, .. }
            | Predicate::InList { negated: true, .. }
            | Predicate::Not(_)
            | Predicate::Opaque => Ok(None),
            // Callers expand to AND-groups first; a nested connective here
            // constrains nothing on its own.
            Predicate::And(_) | Predicate::Or(_) => Ok(None),
        }
    }

    /// Extract every atom of one AND-group, in predicate order.
    pub fn extract_group(
        &self,
        group: &[&Predicate],
        bindings: &Bindings<'_>,
    ) -> Result<Vec<(Column, ConditionValue)>, DerivationError> {
        let mut out = Vec::new();
        for atom in group {
            if let Some(pair) = self.extract(atom, bindings)? {
                out.push(pair);
            }
        }
        Ok(out)
    }

    /// Value of a routing column in one INSERT row. NULL is rejected; an
    /// operand that is not a constant yields no value.
    pub fn extract_insert_value(
        &self,
        column: &Column,
        operand: &Operand,
        row: usize,
        bindings: &Bindings<'_>,
    ) -> Result<Option<ConditionValue>, DerivationError> {
        let Some(resolved) = self.resolve(operand, bindings)? else {
            return Ok(None);
        };
        if resolved.value.is_null() {
            return Err(DerivationError::NullShardingValue {
                column: column.to_string(),
                row,
            });
        }
        let value = self.coerce(column, resolved.value);
        Ok(Some(ConditionValue::List(ListValue::single(
            value,
            resolved.parameter_index,
        ))))
    }

    fn extract_compare(
        &self,
        left: &Operand,
        op: CompareOp,
        right: &Operand,
        bindings: &Bindings<'_>,
    ) -> Result<Option<(Column, ConditionValue)>, DerivationError> {
        let (column, op, other) = match (self.routing_column(left), self.routing_column(right)) {
            (Some(c), _) => (c, op, right),
            (None, Some(c)) => (c, op.mirror(), left),
            (None, None) => return Ok(None),
        };
        if op == CompareOp::NotEq {
            return Ok(None);
        }
        let Some(resolved) = self.resolve(other, bindings)? else {
            return Ok(None);
        };
        if resolved.value.is_null() {
            return Ok(None);
        }
        let value = self.coerce(column, resolved.value);
        let condition = match op {
            CompareOp::Eq => ConditionValue::List(ListValue::single(value, resolved.parameter_index)),
            CompareOp::Lt => ConditionValue::Range(RangeValue::less_than(value)),
            CompareOp::LtEq => ConditionValue::Range(RangeValue::at_most(value)),
            CompareOp::Gt => ConditionValue::Range(RangeValue::greater_than(value)),
            CompareOp::GtEq => ConditionValue::Range(RangeValue::at_least(value)),
            CompareOp::NotEq => return Ok(None),
        };
        Ok(Some((column.clone(), condition)))
    }

    fn extract_between(
        &self,
        expr: &Operand,
        low: &Operand,
        high: &Operand,
        bindings: &Bindings<'_>,
    ) -> Result<Option<(Column, ConditionValue)>, DerivationError> {
        let Some(column) = self.routing_column(expr) else {
            return Ok(None);
        };
        let low = self.resolve(low, bindings)?;
        let high = self.resolve(high, bindings)?;
        let (Some(low), Some(high)) = (low, high) else {
            return Ok(None);
        };
        if low.value.is_null() || high.value.is_null() {
            return Ok(None);
        }
        let range = RangeValue::new(
            Bound::Included(self.coerce(column, low.value)),
            Bound::Included(self.coerce(column, high.value)),
        );
        Ok(Some((column.clone(), ConditionValue::Range(range))))
    }

    fn extract_in_list(
        &self,
        expr: &Operand,
        list: &[Operand],
        bindings: &Bindings<'_>,
    ) -> Result<Option<(Column, ConditionValue)>, DerivationError> {
        let Some(column) = self.routing_column(expr) else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(list.len());
        let mut parameter_indexes = Vec::new();
        for item in list {
            // One opaque element means the column could take any value.
            let Some(resolved) = self.resolve(item, bindings)? else {
                return Ok(None);
            };
            if resolved.value.is_null() {
                continue;
            }
            if let Some(index) = resolved.parameter_index {
                parameter_indexes.push(index);
            }
            values.push(self.coerce(column, resolved.value));
        }
        Ok(Some((
            column.clone(),
            ConditionValue::List(ListValue::new(values, parameter_indexes)),
        )))
    }

    fn routing_column<'a>(&self, operand: &'a Operand) -> Option<&'a Column> {
        operand
            .as_column()
            .filter(|c| self.registry.is_sharding_column(c))
    }

    /// Turn a non-column operand into a datum. `Ok(None)` for operands that
    /// cannot be evaluated before execution.
    pub fn resolve(
        &self,
        operand: &Operand,
        bindings: &Bindings<'_>,
    ) -> Result<Option<ResolvedValue>, DerivationError> {
        let resolved = match operand {
            Operand::Literal(d) => ResolvedValue {
                value: d.clone(),
                parameter_index: None,
            },
            Operand::Parameter(index) => {
                let value = bindings
                    .parameters
                    .get(*index)
                    .cloned()
                    .ok_or(DerivationError::ParameterMissing(*index))?;
                ResolvedValue {
                    value,
                    parameter_index: Some(*index),
                }
            }
            Operand::CurrentTime(kind) => ResolvedValue {
                value: current_time(*kind, bindings.now),
                parameter_index: None,
            },
            Operand::Column(_) | Operand::Expression(_) => return Ok(None),
        };
        Ok(Some(resolved))
    }

    fn coerce(&self, column: &Column, value: Datum) -> Datum {
        if !self.coerce_to_column_type {
            return value;
        }
        match self.registry.declared_type(column) {
            Some(target) => match value.convert_to(target) {
                Some(converted) => converted,
                None => {
                    tracing::trace!("keeping {} as {:?} for column {}", value, value.data_type(), column);
                    value
                }
            },
            None => value,
        }
    }
}

fn current_time(kind: CurrentTimeKind, now: NaiveDateTime) -> Datum {
    match kind {
        CurrentTimeKind::Timestamp => Datum::from_naive_datetime(now),
        CurrentTimeKind::Date => Datum::from_naive_date(now.date()),
        CurrentTimeKind::Time => Datum::from_naive_time(now.time()),
    }
}
