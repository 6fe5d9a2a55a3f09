use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::db::TransactionBehavior;
use crate::core::{Result, SafeSqlError};

const IN_MEMORY_PATH: &str = ":memory:";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DataSource,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection descriptor for one database.
///
/// For the embedded engine the `path` locates the schema; `:memory:` opens a
/// private in-memory database.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataSource {
    pub path: String,
    pub read_only: bool,
    pub create_if_missing: bool,
    pub busy_timeout_ms: u64,
    pub statement_timeout_ms: Option<u64>,
    pub foreign_keys: bool,
    pub transaction_behavior: TransactionBehavior,
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource {
            path: IN_MEMORY_PATH.to_string(),
            read_only: false,
            create_if_missing: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            statement_timeout_ms: None,
            foreign_keys: true,
            transaction_behavior: TransactionBehavior::default(),
        }
    }
}

impl DataSource {
    pub fn in_memory() -> Self {
        DataSource::default()
    }

    pub fn file(path: impl Into<String>) -> Self {
        DataSource {
            path: path.into(),
            ..DataSource::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Timeout for each engine call; `None` or `0` disables it.
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(SafeSqlError::Config(
                "database.path must not be empty".to_string(),
            ));
        }
        if self.read_only && self.is_in_memory() {
            return Err(SafeSqlError::Config(
                "an in-memory database cannot be opened read-only".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging-related configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Maximum level emitted by the binary (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> Result<tracing::Level> {
        match &self.level {
            None => Ok(tracing::Level::INFO),
            Some(level) => level
                .parse()
                .map_err(|_| SafeSqlError::Config(format!("unknown log level '{}'", level))),
        }
    }
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| SafeSqlError::Config(e.to_string()))?;
        config.database.validate()?;
        config.logging.level()?;
        Ok(config)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = safesql::config::load_config("safesql.toml").expect("Failed to load config");
/// println!("{:?}", config.database);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml(&content)
}
