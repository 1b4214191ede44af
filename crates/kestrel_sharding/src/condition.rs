//! Derived routing conditions handed to the router.

use std::fmt;

use crate::column::Column;
use crate::value::ConditionValue;

/// The routing values of one AND-group (WHERE) or one value row (INSERT).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    values: Vec<(Column, ConditionValue)>,
    /// For INSERT rows: how many parameters the preceding rows consumed.
    source_start_index: Option<usize>,
}

impl ShardingCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_start_index(mut self, index: usize) -> Self {
        self.source_start_index = Some(index);
        self
    }

    /// Set the value for `column`, replacing an earlier one while keeping the
    /// column's first-seen position.
    pub fn set(&mut self, column: Column, value: ConditionValue) {
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((column, value)),
        }
    }

    pub fn get(&self, column: &Column) -> Option<&ConditionValue> {
        self.values.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn values(&self) -> &[(Column, ConditionValue)] {
        &self.values
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.values.iter().map(|(c, _)| c)
    }

    pub fn source_start_index(&self) -> Option<usize> {
        self.source_start_index
    }

    /// Any contradictory column makes the whole condition match nothing.
    pub fn is_always_false(&self) -> bool {
        self.values.iter().any(|(_, v)| v.is_always_false())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for ShardingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (column, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{} IN {}", column, value)?;
        }
        Ok(())
    }
}

/// All conditions derived for one statement. An empty list carries no routing
/// constraint: the statement goes to every shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingConditions {
    conditions: Vec<ShardingCondition>,
}

impl ShardingConditions {
    pub fn new(conditions: Vec<ShardingCondition>) -> Self {
        Self { conditions }
    }

    /// No routing constraint.
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// True when there are conditions and none of them can match a row, so the
    /// statement routes to zero shards.
    pub fn is_always_false(&self) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(ShardingCondition::is_always_false)
    }

    /// Conditions that can match at least one row.
    pub fn routable(&self) -> impl Iterator<Item = &ShardingCondition> {
        self.conditions.iter().filter(|c| !c.is_always_false())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ShardingCondition> {
        self.conditions.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ShardingCondition> {
        self.conditions.get(index)
    }

    pub fn into_inner(self) -> Vec<ShardingCondition> {
        self.conditions
    }
}

impl IntoIterator for ShardingConditions {
    type Item = ShardingCondition;
    type IntoIter = std::vec::IntoIter<ShardingCondition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.into_iter()
    }
}

impl<'a> IntoIterator for &'a ShardingConditions {
    type Item = &'a ShardingCondition;
    type IntoIter = std::slice::Iter<'a, ShardingCondition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}
