use thiserror::Error;

use crate::types::TypeFamily;

/// Convenience alias for `Result<T, KestrelError>`.
pub type KestrelResult<T> = Result<T, KestrelError>;

/// Error classification for retry/escalation decisions.
///
/// - `UserError`   — the statement itself cannot be routed (bad values, bad config)
/// - `Transient`   — a data node cursor failed; the session MAY retry the statement
/// - `InternalBug` — the binding layer handed over inconsistent metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Transient,
    InternalBug,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum KestrelError {
    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl KestrelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KestrelError::Derivation(_) | KestrelError::Config(_) => ErrorKind::UserError,
            KestrelError::Binding(_) => ErrorKind::InternalBug,
            KestrelError::Execution(_) => ErrorKind::Transient,
        }
    }
}

/// Errors raised while deriving sharding conditions. The statement is
/// aborted before any data node is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("Sharding column {column} cannot be null in INSERT value row {row}")]
    NullShardingValue { column: String, row: usize },

    #[error("Sharding value type mismatch on column {column}: cannot intersect {left} with {right}")]
    TypeMismatch {
        column: String,
        left: TypeFamily,
        right: TypeFamily,
    },

    #[error("Parameter ${0} not provided")]
    ParameterMissing(usize),
}

/// Metadata handed to a merger that should have been resolved upstream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("{item} item '{expression}' has no resolved column index")]
    UnresolvedIndex {
        item: &'static str,
        expression: String,
    },

    #[error("Cannot convert column {index} ({actual}) to {requested}")]
    UnsupportedConversion {
        index: usize,
        requested: String,
        actual: String,
    },

    #[error("Column index out of bounds: {index} (row has {width} columns)")]
    ColumnOutOfBounds { index: usize, width: usize },

    #[error("Unknown column label: {0}")]
    UnknownLabel(String),
}

/// Failures while iterating data node cursors.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Cursor on {shard} failed: {reason}")]
    CursorFailed { shard: String, reason: String },

    #[error("Row limit exceeded: {buffered} rows buffered, limit is {limit}")]
    RowLimitExceeded { buffered: usize, limit: usize },

    #[error("Result is not positioned on a row")]
    NotPositioned,

    #[error("Result already closed")]
    Closed,
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
