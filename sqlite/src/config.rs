//! Database configuration files.
//!
//! A [`DatabaseConfig`] names the database file and the application schema
//! version a session should open with.
//!
//! # Example YAML
//!
//! ```yaml
//! name: inventory
//! path: data/inventory.db
//! version: "1.2"
//! busy_timeout_ms: 1000
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SqliteError};

/// Path that opens an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Session configuration.
///
/// # Examples
///
/// ```
/// use quickmodel_sqlite::DatabaseConfig;
///
/// let config: DatabaseConfig = serde_yaml::from_str("name: shop\nversion: \"2\"").unwrap();
/// assert_eq!(config.database_path().to_str(), Some("shop_db.sqlite3"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name; the file defaults to `<name>_db.sqlite3`.
    pub name: String,
    /// Explicit file path, or `:memory:`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Application schema version.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            version: version.into(),
            busy_timeout_ms: None,
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](SqliteError::IoError) if the file cannot be read,
    /// [`YamlError`](SqliteError::YamlError) if parsing fails, or
    /// [`ConfigError`](SqliteError::ConfigError) if a required value is empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: DatabaseConfig = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// The file the session opens: `path` if set, else `<name>_db.sqlite3`.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_db.sqlite3", self.name)))
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path().as_os_str() == IN_MEMORY
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() && self.path.is_none() {
            return Err(SqliteError::ConfigError(
                "either 'name' or 'path' must be set".to_string(),
            ));
        }
        if self.version.trim().is_empty() {
            return Err(SqliteError::ConfigError("'version' must not be empty".to_string()));
        }
        Ok(())
    }
}
