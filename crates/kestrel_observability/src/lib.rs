//! Observability setup: structured logging and metrics recording.
//!
//! The library crates only emit `tracing` events and `metrics` samples; the
//! embedding process decides where they go. No exporter is installed here.

use kestrel_common::config::LoggingConfig;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with structured logging.
/// `RUST_LOG` wins over `config.filter`.
pub fn init_tracing(config: &LoggingConfig) {
    if let Err(e) = try_init_tracing(config) {
        eprintln!("tracing already initialized: {}", e);
    }
}

/// Like [`init_tracing`] but reports a subscriber that is already installed,
/// so tests can call it repeatedly.
pub fn try_init_tracing(config: &LoggingConfig) -> Result<(), TryInitError> {
    let env_filter = resolve_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), config);

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}

/// A parseable `RUST_LOG` value, otherwise the configured directives.
fn resolve_filter(env: Option<String>, config: &LoggingConfig) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(&config.filter))
}

/// Record the outcome of deriving sharding conditions for one statement.
/// `statement` is "where" for predicate derivation, "insert" for value rows.
pub fn record_sharding_conditions(statement: &str, conditions: usize, always_false: usize) {
    metrics::counter!("kestrel_sharding_derivations_total", "statement" => statement.to_string())
        .increment(1);
    metrics::histogram!("kestrel_sharding_conditions", "statement" => statement.to_string())
        .record(conditions as f64);
    if always_false > 0 {
        metrics::counter!("kestrel_sharding_always_false_total").increment(always_false as u64);
    }
}

/// Record which merge strategy was chosen and over how many shard results.
pub fn record_merge_strategy(strategy: &str, shards: usize, limited: bool) {
    metrics::counter!(
        "kestrel_merge_total",
        "strategy" => strategy.to_string(),
        "limited" => limited.to_string()
    )
    .increment(1);
    metrics::histogram!("kestrel_merge_shards", "strategy" => strategy.to_string())
        .record(shards as f64);
}

/// Record rows materialized by a memory merge.
pub fn record_merged_rows(strategy: &str, rows: usize) {
    metrics::histogram!("kestrel_merge_buffered_rows", "strategy" => strategy.to_string())
        .record(rows as f64);
}
