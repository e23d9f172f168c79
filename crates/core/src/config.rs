//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Controller daemon configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Bind address for the metrics/health listener (e.g., "0.0.0.0:3370").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:3370".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Object store configuration for document-based metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// In-process memory. Contents are lost on restart.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/crd"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("storage.path cannot be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Metadata backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database with native transactions.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only: slow statements are logged, not cancelled).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// Custom-resource style document store; atomicity is emulated with rollback entries.
    Crd {
        /// Where the documents live.
        #[serde(default)]
        storage: StorageConfig,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(60)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/ferrostor.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite {
                query_timeout_secs: Some(0),
                ..
            } => Err("metadata.query_timeout_secs must be greater than 0".to_string()),
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Crd { storage } => storage.validate(),
        }
    }
}

/// Backup shipping configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShippingConfig {
    /// First TCP port handed out to receiving shipping sessions.
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,
    /// Last TCP port (inclusive).
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,
}

fn default_port_range_start() -> u16 {
    12000
}

fn default_port_range_end() -> u16 {
    12999
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
        }
    }
}

impl ShippingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.port_range_start == 0 {
            return Err("shipping.port_range_start cannot be 0".to_string());
        }
        if self.port_range_start > self.port_range_end {
            return Err(format!(
                "shipping.port_range_start {} is greater than port_range_end {}",
                self.port_range_start, self.port_range_end
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub shipping: ShippingConfig,
}

impl AppConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** Uses an in-memory document store so no files are touched.
    pub fn for_testing() -> Self {
        Self {
            controller: ControllerConfig::default(),
            metadata: MetadataConfig::Crd {
                storage: StorageConfig::Memory,
            },
            shipping: ShippingConfig::default(),
        }
    }

    /// Validate every section, reporting the first problem.
    pub fn validate(&self) -> Result<(), String> {
        self.metadata.validate()?;
        self.shipping.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.controller.bind, "127.0.0.1:3370");
        assert_eq!(config.shipping.port_range_start, 12000);
        assert_eq!(config.shipping.port_range_end, 12999);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shipping_range_validation() {
        let config = ShippingConfig {
            port_range_start: 13000,
            port_range_end: 12000,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metadata_config_tagged() {
        let config: MetadataConfig =
            serde_json::from_str(r#"{"type":"crd","storage":{"type":"memory"}}"#).unwrap();
        assert!(matches!(
            config,
            MetadataConfig::Crd {
                storage: StorageConfig::Memory
            }
        ));

        let config: MetadataConfig =
            serde_json::from_str(r#"{"type":"sqlite","path":"/tmp/x.db"}"#).unwrap();
        match config {
            MetadataConfig::Sqlite {
                query_timeout_secs, ..
            } => assert_eq!(query_timeout_secs, Some(60)),
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn test_empty_filesystem_path_rejected() {
        let config = MetadataConfig::Crd {
            storage: StorageConfig::Filesystem {
                path: PathBuf::new(),
            },
        };
        assert!(config.validate().is_err());
    }
}
