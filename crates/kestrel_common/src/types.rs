use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared SQL type of a column, as reported by the binding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float64,
    /// DECIMAL(precision, scale).
    Decimal(u8, u8),
    Text,
    Bytea,
    Date,
    Time,
    Timestamp,
}

impl DataType {
    pub fn family(&self) -> TypeFamily {
        match self {
            DataType::Boolean => TypeFamily::Boolean,
            DataType::Int32 | DataType::Int64 | DataType::Float64 | DataType::Decimal(_, _) => {
                TypeFamily::Numeric
            }
            DataType::Text => TypeFamily::Text,
            DataType::Bytea => TypeFamily::Binary,
            DataType::Date => TypeFamily::Date,
            DataType::Time => TypeFamily::Time,
            DataType::Timestamp => TypeFamily::Timestamp,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.family() == TypeFamily::Numeric
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Int32 => write!(f, "INT"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float64 => write!(f, "FLOAT8"),
            DataType::Decimal(p, s) => write!(f, "DECIMAL({},{})", p, s),
            DataType::Text => write!(f, "TEXT"),
            DataType::Bytea => write!(f, "BYTEA"),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// Groups of mutually comparable datums. Two non-null datums can be ordered
/// against each other only when they belong to the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeFamily {
    Boolean,
    Numeric,
    Text,
    Binary,
    Date,
    Time,
    Timestamp,
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeFamily::Boolean => "boolean",
            TypeFamily::Numeric => "numeric",
            TypeFamily::Text => "text",
            TypeFamily::Binary => "binary",
            TypeFamily::Date => "date",
            TypeFamily::Time => "time",
            TypeFamily::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}
