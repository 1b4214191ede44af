//! Shared building blocks for Kestrel: the datum model exchanged with data
//! nodes, declared column types, the error taxonomy, and engine configuration.

pub mod config;
pub mod datum;
pub mod error;
pub mod types;

pub use config::{KestrelConfig, LoggingConfig, MergeConfig, ShardingConfig};
pub use datum::{Datum, OwnedRow};
pub use error::{
    BindingError, ConfigError, DerivationError, ErrorKind, ExecutionError, KestrelError,
    KestrelResult,
};
pub use types::{DataType, TypeFamily};
