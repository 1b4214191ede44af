//! Routing column identity and the per-statement registry of routing columns.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use kestrel_common::types::DataType;

/// A column identified by name and owning (logical) table.
///
/// SQL identifiers are case-insensitive, so equality and hashing ignore ASCII
/// case while the original spelling is kept for messages.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    table_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.table_name.eq_ignore_ascii_case(&other.table_name)
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.name.bytes() {
            b.to_ascii_lowercase().hash(state);
        }
        0xffu8.hash(state);
        for b in self.table_name.bytes() {
            b.to_ascii_lowercase().hash(state);
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_name, self.name)
    }
}

/// The routing columns of the tables a statement touches, as configured by the
/// sharding rule. Columns not registered here never produce conditions.
#[derive(Debug, Clone, Default)]
pub struct ShardingColumnRegistry {
    columns: HashMap<Column, Option<DataType>>,
}

impl ShardingColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routing column with an unknown declared type.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.insert(column, None);
        self
    }

    /// Register a routing column together with its declared type.
    pub fn with_typed_column(mut self, column: Column, data_type: DataType) -> Self {
        self.columns.insert(column, Some(data_type));
        self
    }

    pub fn register(&mut self, column: Column, data_type: Option<DataType>) {
        self.columns.insert(column, data_type);
    }

    pub fn is_sharding_column(&self, column: &Column) -> bool {
        self.columns.contains_key(column)
    }

    pub fn declared_type(&self, column: &Column) -> Option<DataType> {
        self.columns.get(column).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
