use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{
    CUSTOMERS_FILE, DEFAULT_DATA_DIR, DEFAULT_DB_PATH, DEFAULT_LOG_DIR, PRODUCTS_FILE, SALES_FILE,
};
use crate::error::{EtlError, Result};

/// Run configuration, built once at process start and passed down
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub extracts: ExtractsConfig,
    pub logging: LoggingConfig,
}

/// Connection settings for the relational sink
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    /// Create missing tables when the sink is opened
    pub create_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            busy_timeout_ms: 5_000,
            create_schema: false,
        }
    }
}

/// Locations of the three extracts. Relative file names resolve against
/// `data_dir`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractsConfig {
    pub data_dir: PathBuf,
    pub customers: PathBuf,
    pub products: PathBuf,
    pub sales: PathBuf,
}

impl Default for ExtractsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            customers: PathBuf::from(CUSTOMERS_FILE),
            products: PathBuf::from(PRODUCTS_FILE),
            sales: PathBuf::from(SALES_FILE),
        }
    }
}

impl ExtractsConfig {
    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.data_dir.join(file)
        }
    }

    pub fn customers_path(&self) -> PathBuf {
        self.resolve(&self.customers)
    }

    pub fn products_path(&self) -> PathBuf {
        self.resolve(&self.products)
    }

    pub fn sales_path(&self) -> PathBuf {
        self.resolve(&self.sales)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl Config {
    /// Load `config_path` (defaults when the file does not exist), then apply
    /// environment overrides. `.env` is read first if present.
    pub fn load(config_path: &Path) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path).map_err(|e| {
                EtlError::Config(format!(
                    "Failed to read config file '{}': {}",
                    config_path.display(),
                    e
                ))
            })?;
            Self::from_toml(&content)?
        } else {
            debug!("No config file at {}, using defaults", config_path.display());
            Self::default()
        };

        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `FLEXIMART_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty("FLEXIMART_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(dir) = non_empty("FLEXIMART_DATA_DIR") {
            self.extracts.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("FLEXIMART_LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_toml_partial_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [database]
            path = "/tmp/etl.db"
            create_schema = true

            [extracts]
            data_dir = "/srv/extracts"
            sales = "/archive/sales.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/etl.db"));
        assert!(config.database.create_schema);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(
            config.extracts.customers_path(),
            PathBuf::from("/srv/extracts/customers_raw.csv")
        );
        assert_eq!(
            config.extracts.sales_path(),
            PathBuf::from("/archive/sales.csv")
        );
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml("[database\npath = 1"),
            Err(EtlError::Toml(_))
        ));
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLEXIMART_DB_PATH", "/var/lib/fleximart.db"),
            ("FLEXIMART_DATA_DIR", "  "),
            ("FLEXIMART_LOG_DIR", "/var/log/fleximart"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/var/lib/fleximart.db"));
        assert_eq!(config.extracts.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.logging.dir, PathBuf::from("/var/log/fleximart"));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.extracts.customers, PathBuf::from(CUSTOMERS_FILE));
    }
}
