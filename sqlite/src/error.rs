//! Error types for the SQLite session.
//!
//! Wraps engine failures, model-layer failures, and per-table migration
//! failures in one error type.

use quickmodel_core::ModelError;
use thiserror::Error;

/// Errors that can occur while opening, migrating, or querying a database.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite statement failure, propagated unchanged.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Model definition, coercion, or filter compilation failure.
    #[error(transparent)]
    ModelError(#[from] ModelError),

    /// A statement failed while synchronizing one table; that table's
    /// changes were rolled back.
    #[error("migration of '{table}' failed: {source}")]
    MigrationError {
        table: String,
        #[source]
        source: Box<SqliteError>,
    },

    /// A write was attempted through a read-only handle (views).
    #[error("model '{0}' is read-only")]
    ReadOnly(String),

    /// No model, table, or view with that name exists.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Invalid database configuration.
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl SqliteError {
    pub(crate) fn migration(table: &str, source: SqliteError) -> Self {
        SqliteError::MigrationError {
            table: table.to_string(),
            source: Box::new(source),
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
