use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level engine configuration (`kestrel.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KestrelConfig {
    pub sharding: ShardingConfig,
    pub merge: MergeConfig,
    pub logging: LoggingConfig,
}

/// Condition derivation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    /// Upper bound on AND-groups produced when distributing OR over AND.
    /// Past this the statement is routed without constraints.
    pub max_and_groups: usize,
    /// Convert derived values to the routing column's declared type.
    pub coerce_to_column_type: bool,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            max_and_groups: 64,
            coerce_to_column_type: true,
        }
    }
}

/// Result merge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Maximum number of rows a memory merge may buffer.
    pub max_rows_buffered: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_rows_buffered: 1_000_000, // 1M rows
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,kestrel=debug".to_string(),
        }
    }
}

impl KestrelConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: KestrelConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults; an unreadable or
    /// malformed file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sharding.max_and_groups == 0 {
            return Err(ConfigError::Invalid {
                key: "sharding.max_and_groups",
                reason: "must be at least 1".into(),
            });
        }
        if self.merge.max_rows_buffered == 0 {
            return Err(ConfigError::Invalid {
                key: "merge.max_rows_buffered",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = KestrelConfig::from_toml_str("").unwrap();
        assert_eq!(config, KestrelConfig::default());
        assert_eq!(config.sharding.max_and_groups, 64);
        assert!(config.sharding.coerce_to_column_type);
        assert_eq!(config.merge.max_rows_buffered, 1_000_000);
    }

    #[test]
    fn test_partial_sections() {
        let config = KestrelConfig::from_toml_str(
            r#"
            [merge]
            max_rows_buffered = 500

            [logging]
            filter = "warn"
            "#,
        )
        .unwrap();
        assert_eq!(config.merge.max_rows_buffered, 500);
        assert_eq!(config.logging.filter, "warn");
        assert_eq!(config.sharding, ShardingConfig::default());
    }

    #[test]
    fn test_rejects_zero_limits() {
        let err = KestrelConfig::from_toml_str("[sharding]\nmax_and_groups = 0\n").unwrap_err();
        assert!(err.to_string().contains("sharding.max_and_groups"));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            KestrelConfig::from_toml_str("[merge\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = KestrelConfig::load("/nonexistent/kestrel.toml").unwrap();
        assert_eq!(config, KestrelConfig::default());
    }
}
