//! The database session: connection, version tracking, migration state,
//! and the single active transaction.
//!
//! # Lifecycle
//!
//! Opening a session reads SQLite's `user_version` marker. A marker that
//! differs from [`META_VERSION`] resynchronizes the internal version table.
//! The stored [`VersionRecord`] is then compared with the application
//! version: a new version, or one never confirmed, puts the session in
//! [`SessionState::Migrating`]. While migrating,
//! [`define_model`](Database::define_model) and
//! [`define_view`](Database::define_view) bring the live schema in line
//! with each declaration; otherwise they only register the declaration.
//! [`confirm_migration`](Database::confirm_migration) ends the migration and
//! drops tables that no declared model backs.
//!
//! ```
//! use quickmodel_core::{FieldSpec, ModelSpec};
//! use quickmodel_sqlite::{Database, SessionState};
//!
//! let db = Database::open_in_memory("1.0").unwrap();
//! assert_eq!(db.state(), SessionState::Migrating);
//!
//! let person = db
//!     .define_model(ModelSpec::new("person").field("name", FieldSpec::string()))
//!     .unwrap();
//! db.confirm_migration().unwrap();
//! assert_eq!(db.state(), SessionState::Ready);
//!
//! let ann = person.create([("name", "Ann")]).unwrap();
//! assert_eq!(ann.id(), Some(1));
//! ```

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quickmodel_core::{FieldSpec, ModelRegistry, ModelSpec, SqlValue, coerce, validate_identifier};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::convert;
use crate::error::{Result, SqliteError};
use crate::introspect;
use crate::migration::{self, SyncReport};
use crate::query::Model;

/// Version of the internal bookkeeping layout, stored in `PRAGMA user_version`.
pub const META_VERSION: i64 = 1;

/// Table holding the [`VersionRecord`].
pub const VERSION_TABLE: &str = "__quickmodel_version__";

/// Phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Closed,
    Opening,
    /// Declarations synchronize the live schema.
    Migrating,
    Ready,
}

/// The application schema version stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    pub version: String,
    /// Whether the migration to this version was confirmed.
    pub migrated: bool,
}

/// Columns, rows, and counters of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows changed by an `INSERT`, `UPDATE`, or `DELETE`.
    pub rows_affected: usize,
    /// Rowid of the most recent successful insert on the connection.
    pub insert_id: i64,
}

impl ResultSet {
    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| {
                        let value = coerce::decode(value.clone(), None).unwrap_or_default();
                        (column.clone(), value.to_json())
                    })
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            })
            .collect::<Vec<serde_json::Value>>()
            .into()
    }
}

fn version_model() -> ModelSpec {
    ModelSpec::new(VERSION_TABLE)
        .field("version", FieldSpec::string().not_null())
        .field("migrated", FieldSpec::boolean().not_null().default_value(false))
}

/// A session over one SQLite connection.
///
/// Not thread-safe; share it only behind external serialization.
pub struct Database {
    conn: Connection,
    version: Option<String>,
    state: Cell<SessionState>,
    registry: RefCell<ModelRegistry>,
    in_transaction: Cell<bool>,
    reports: RefCell<Vec<SyncReport>>,
}

impl Database {
    fn new(conn: Connection, version: Option<String>) -> Self {
        Self {
            conn,
            version,
            state: Cell::new(SessionState::Closed),
            registry: RefCell::new(ModelRegistry::new()),
            in_transaction: Cell::new(false),
            reports: RefCell::new(Vec::new()),
        }
    }

    /// Opens (or creates) a database file for the given application version.
    pub fn open(path: impl AsRef<Path>, version: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, version)
    }

    pub fn open_in_memory(version: impl Into<String>) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, version)
    }

    /// Opens the database described by a configuration file.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(config.database_path())?
        };
        if let Some(ms) = config.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }
        Self::with_connection(conn, config.version.clone())
    }

    /// Starts a versioned session on an existing connection.
    pub fn with_connection(conn: Connection, version: impl Into<String>) -> Result<Self> {
        let db = Self::new(conn, Some(version.into()));
        db.enter(SessionState::Opening)?;
        db.initialize()?;
        Ok(db)
    }

    /// Starts an unversioned session that never changes the schema.
    ///
    /// Declarations only register models; used for inspecting databases
    /// owned by another application.
    pub fn attach(conn: Connection) -> Result<Self> {
        let db = Self::new(conn, None);
        db.enter(SessionState::Ready)?;
        Ok(db)
    }

    /// Closes the connection.
    pub fn close(self) -> Result<()> {
        debug!("Closing database");
        self.conn.close().map_err(|(_, e)| SqliteError::DatabaseError(e))
    }

    fn initialize(&self) -> Result<()> {
        let version = self.version.clone().unwrap_or_default();
        let version_model = version_model().prepare(&self.registry.borrow())?;

        let meta = self.pragma_integer("user_version")?;
        let meta_changed = meta != META_VERSION;
        if meta_changed {
            info!(from = meta, to = META_VERSION, "Meta version changed");
        }
        if meta_changed || introspect::stored_sql(self, "table", VERSION_TABLE)?.is_none() {
            let report = migration::sync_table(self, &version_model)?;
            self.reports.borrow_mut().push(report);
            self.exec_batch(&format!("PRAGMA user_version = {META_VERSION}"))?;
        }
        self.registry.borrow_mut().register(version_model);

        let migrated = match self.version_record()? {
            Some(current) if current.version == version && !meta_changed => current.migrated,
            Some(current) if current.version == version => {
                self.exec(
                    &format!("UPDATE {VERSION_TABLE} SET migrated = 0"),
                    &[],
                )?;
                false
            }
            previous => {
                info!(
                    from = previous.as_ref().map(|r| r.version.as_str()),
                    to = %version,
                    "Schema version changed"
                );
                self.transaction(|db| {
                    db.exec(&format!("DELETE FROM {VERSION_TABLE}"), &[])?;
                    db.exec(
                        &format!("INSERT INTO {VERSION_TABLE} (version, migrated) VALUES (?, 0)"),
                        &[SqlValue::Text(version.clone())],
                    )?;
                    Ok(())
                })?;
                false
            }
        };

        self.enter(if migrated {
            SessionState::Ready
        } else {
            SessionState::Migrating
        })
    }

    /// Switches state; foreign keys are enforced only outside migrations.
    fn enter(&self, state: SessionState) -> Result<()> {
        match state {
            SessionState::Migrating => self.exec_batch("PRAGMA foreign_keys = OFF")?,
            SessionState::Ready => self.exec_batch("PRAGMA foreign_keys = ON")?,
            SessionState::Closed | SessionState::Opening => {}
        }
        debug!(from = ?self.state.get(), to = ?state, "Session state");
        self.state.set(state);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn is_migrating(&self) -> bool {
        self.state.get() == SessionState::Migrating
    }

    /// The application version this session was opened with.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The stored version row, if the version table exists.
    pub fn version_record(&self) -> Result<Option<VersionRecord>> {
        if introspect::stored_sql(self, "table", VERSION_TABLE)?.is_none() {
            return Ok(None);
        }
        let result = self.select(
            &format!("SELECT version, migrated FROM {VERSION_TABLE} ORDER BY id DESC LIMIT 1"),
            &[],
        )?;
        let Some(row) = result.rows.into_iter().next() else {
            return Ok(None);
        };
        let mut values = row.into_iter();
        let version = coerce::decode(values.next().unwrap_or(SqlValue::Null), None)?;
        let migrated = coerce::decode(
            values.next().unwrap_or(SqlValue::Null),
            Some(&FieldSpec::boolean()),
        )?;
        Ok(Some(VersionRecord {
            version: version.as_str().unwrap_or_default().to_string(),
            migrated: migrated.as_bool().unwrap_or(false),
        }))
    }

    /// Reports of every synchronization run by this session.
    pub fn sync_reports(&self) -> Vec<SyncReport> {
        self.reports.borrow().clone()
    }

    /// Declares a model and returns its handle.
    ///
    /// While migrating, the live table, its indexes, and its triggers are
    /// synchronized with the declaration first.
    ///
    /// # Errors
    ///
    /// [`ModelError`](SqliteError::ModelError) for invalid declarations,
    /// [`MigrationError`](SqliteError::MigrationError) when synchronization
    /// fails.
    pub fn define_model(&self, spec: ModelSpec) -> Result<Model<'_>> {
        let spec = spec.prepare(&self.registry.borrow())?;
        if self.is_migrating() {
            let report = migration::sync_table(self, &spec)?;
            self.reports.borrow_mut().push(report);
        }
        let spec = self.registry.borrow_mut().register(spec);
        Ok(Model::new(self, spec))
    }

    /// Declares a read-only view over `select`.
    ///
    /// The view's fields are read back from the database.
    pub fn define_view(&self, name: &str, select: &str) -> Result<Model<'_>> {
        validate_identifier(name)?;
        if self.is_migrating() {
            let report = migration::sync_view(self, name, select)?;
            self.reports.borrow_mut().push(report);
        }
        let spec = introspect::model(self, name)?
            .ok_or_else(|| SqliteError::ModelNotFound(name.to_string()))?
            .read_only();
        let spec = self.registry.borrow_mut().register(spec);
        Ok(Model::new(self, spec))
    }

    /// Handle of a declared model.
    pub fn model(&self, name: &str) -> Result<Model<'_>> {
        let spec = self
            .registry
            .borrow()
            .get(name)
            .ok_or_else(|| SqliteError::ModelNotFound(name.to_string()))?;
        Ok(Model::new(self, spec))
    }

    /// Open handle of an existing table or view, typed by introspection.
    ///
    /// The handle is not registered, so it does not protect the table from
    /// pruning.
    pub fn table(&self, name: &str) -> Result<Model<'_>> {
        let spec = introspect::model(self, name)?
            .ok_or_else(|| SqliteError::ModelNotFound(name.to_string()))?;
        Ok(Model::new(self, Arc::new(spec)))
    }

    /// Names of the user tables in the database.
    pub fn table_names(&self) -> Result<Vec<String>> {
        introspect::table_names(self)
    }

    /// Stored DDL of a table or view.
    pub fn object_sql(&self, name: &str) -> Result<Option<String>> {
        Ok(introspect::object(self, name)?.map(|(_, sql)| sql))
    }

    /// SQLite's schema cookie, which changes with every DDL statement.
    pub fn schema_version(&self) -> Result<i64> {
        introspect::schema_version(self)
    }

    /// Ends the migration: marks the version row migrated and drops every
    /// table no registered model backs.
    ///
    /// Returns the dropped tables. Does nothing outside a migration.
    pub fn confirm_migration(&self) -> Result<Vec<String>> {
        if !self.is_migrating() {
            return Ok(Vec::new());
        }
        let dropped = self.transaction(|db| {
            if let Some(version) = &db.version {
                db.exec(
                    &format!("UPDATE {VERSION_TABLE} SET migrated = 1 WHERE version = ?"),
                    &[SqlValue::Text(version.clone())],
                )?;
            }
            let registry = db.registry.borrow().clone();
            migration::prune(db, |table| registry.contains(table))
        })?;
        self.enter(SessionState::Ready)?;
        info!(version = ?self.version, dropped = dropped.len(), "Migration confirmed");
        Ok(dropped)
    }

    /// Runs `f` inside the session's transaction.
    ///
    /// A call made while a transaction is already open joins it; only the
    /// outermost call commits, or rolls back when `f` returns an error or
    /// panics.
    ///
    /// ```
    /// use quickmodel_sqlite::{Database, SqliteError};
    ///
    /// let db = Database::open_in_memory("1").unwrap();
    /// db.execute_sql("CREATE TABLE t (x INTEGER)", &[]).unwrap();
    ///
    /// let result: Result<(), SqliteError> = db.transaction(|db| {
    ///     db.execute_sql("INSERT INTO t VALUES (1)", &[])?;
    ///     Err(SqliteError::ModelNotFound("abort".into()))
    /// });
    /// assert!(result.is_err());
    /// assert!(db.execute_sql("SELECT * FROM t", &[]).unwrap().rows.is_empty());
    /// ```
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        if self.in_transaction.get() {
            return f(self);
        }
        let tx = ActiveTransaction::begin(self)?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    /// Executes one raw statement.
    ///
    /// Statements that return columns are read fully into the result set;
    /// others report rows affected and the last insert id.
    pub fn execute_sql(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        let returns_rows = self.conn.prepare(sql)?.column_count() > 0;
        if returns_rows {
            return self.select(sql, params);
        }
        let rows_affected = self.exec(sql, params)?;
        Ok(ResultSet {
            rows_affected,
            insert_id: self.conn.last_insert_rowid(),
            ..ResultSet::default()
        })
    }

    pub(crate) fn exec(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        debug!(sql, params = ?params, "Executing statement");
        let mut stmt = self.conn.prepare(sql)?;
        Ok(stmt.execute(convert::params(params))?)
    }

    pub(crate) fn exec_batch(&self, sql: &str) -> Result<()> {
        debug!(sql, "Executing batch");
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub(crate) fn select(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        debug!(sql, params = ?params, "Executing query");
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = stmt.query(convert::params(params))?;
        let mut loaded = Vec::new();
        while let Some(row) = rows.next()? {
            loaded.push(
                (0..width)
                    .map(|index| convert::load(row, index))
                    .collect::<Result<Vec<_>>>()?,
            );
        }
        Ok(ResultSet {
            columns,
            rows: loaded,
            rows_affected: 0,
            insert_id: self.conn.last_insert_rowid(),
        })
    }

    pub(crate) fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn pragma_integer(&self, pragma: &str) -> Result<i64> {
        let result = self.select(&format!("PRAGMA {pragma}"), &[])?;
        match result.rows.first().and_then(|row| row.first()) {
            Some(SqlValue::Integer(value)) => Ok(*value),
            _ => Ok(0),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("version", &self.version)
            .field("state", &self.state.get())
            .field("in_transaction", &self.in_transaction.get())
            .finish_non_exhaustive()
    }
}

/// Rolls back on drop unless committed.
struct ActiveTransaction<'a> {
    db: &'a Database,
    open: bool,
}

impl<'a> ActiveTransaction<'a> {
    fn begin(db: &'a Database) -> Result<Self> {
        db.exec_batch("BEGIN")?;
        db.in_transaction.set(true);
        Ok(Self { db, open: true })
    }

    fn commit(mut self) -> Result<()> {
        self.db.exec_batch("COMMIT")?;
        self.open = false;
        self.db.in_transaction.set(false);
        Ok(())
    }
}

impl Drop for ActiveTransaction<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        debug!("Rolling back transaction");
        if let Err(e) = self.db.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "Rollback failed");
        }
        self.db.in_transaction.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_database_is_migrating() {
        let db = Database::open_in_memory("1").unwrap();
        assert_eq!(db.state(), SessionState::Migrating);
        assert_eq!(
            db.version_record().unwrap(),
            Some(VersionRecord {
                version: "1".into(),
                migrated: false
            })
        );
        assert_eq!(db.pragma_integer("user_version").unwrap(), META_VERSION);
        assert_eq!(db.pragma_integer("foreign_keys").unwrap(), 0);
    }

    #[test]
    fn test_confirm_migration_marks_version_and_enables_foreign_keys() {
        let db = Database::open_in_memory("1").unwrap();
        assert!(db.confirm_migration().unwrap().is_empty());
        assert_eq!(db.state(), SessionState::Ready);
        assert!(db.version_record().unwrap().unwrap().migrated);
        assert_eq!(db.pragma_integer("foreign_keys").unwrap(), 1);
        assert!(db.confirm_migration().unwrap().is_empty());
    }

    #[test]
    fn test_confirm_prunes_unregistered_tables() {
        let db = Database::open_in_memory("1").unwrap();
        db.execute_sql("CREATE TABLE stale (x)", &[]).unwrap();
        db.define_model(ModelSpec::new("kept").field("x", FieldSpec::integer()))
            .unwrap();
        assert_eq!(db.confirm_migration().unwrap(), vec!["stale".to_string()]);
        assert_eq!(
            db.table_names().unwrap(),
            vec![VERSION_TABLE.to_string(), "kept".to_string()]
        );
    }

    #[test]
    fn test_nested_transaction_joins_outer() {
        let db = Database::open_in_memory("1").unwrap();
        db.execute_sql("CREATE TABLE t (x INTEGER)", &[]).unwrap();
        let result: Result<()> = db.transaction(|db| {
            db.transaction(|db| {
                assert!(db.in_transaction());
                db.execute_sql("INSERT INTO t VALUES (1)", &[])?;
                Ok(())
            })?;
            Err(SqliteError::ModelNotFound("stop".into()))
        });
        assert!(result.is_err());
        assert!(!db.in_transaction());
        assert!(db.execute_sql("SELECT x FROM t", &[]).unwrap().rows.is_empty());
    }

    #[test]
    fn test_panic_in_transaction_rolls_back() {
        let db = Database::open_in_memory("1").unwrap();
        db.execute_sql("CREATE TABLE t (x INTEGER)", &[]).unwrap();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = db.transaction(|db| {
                db.execute_sql("INSERT INTO t VALUES (1)", &[])?;
                panic!("boom");
            });
        }));
        assert!(outcome.is_err());
        assert!(!db.in_transaction());
        assert!(db.execute_sql("SELECT x FROM t", &[]).unwrap().rows.is_empty());
    }

    #[test]
    fn test_execute_sql_reports_counts() {
        let db = Database::open_in_memory("1").unwrap();
        db.execute_sql("CREATE TABLE t (x INTEGER)", &[]).unwrap();
        let inserted = db
            .execute_sql("INSERT INTO t VALUES (?), (?)", &[SqlValue::Integer(1), SqlValue::Integer(2)])
            .unwrap();
        assert_eq!(inserted.rows_affected, 2);
        assert_eq!(inserted.insert_id, 2);

        let selected = db.execute_sql("SELECT x FROM t ORDER BY x", &[]).unwrap();
        assert_eq!(selected.columns, vec!["x".to_string()]);
        assert_eq!(selected.to_json(), serde_json::json!([{"x": 1}, {"x": 2}]));
    }

    #[test]
    fn test_attach_never_migrates() {
        let conn = Connection::open_in_memory().unwrap();
        let db = Database::attach(conn).unwrap();
        assert_eq!(db.state(), SessionState::Ready);
        assert!(db.version_record().unwrap().is_none());
        db.define_model(ModelSpec::new("ghost").field("x", FieldSpec::integer()))
            .unwrap();
        assert!(db.object_sql("ghost").unwrap().is_none());
    }

    #[test]
    fn test_table_and_model_lookup() {
        let db = Database::open_in_memory("1").unwrap();
        assert!(matches!(db.model("nope"), Err(SqliteError::ModelNotFound(_))));
        assert!(matches!(db.table("nope"), Err(SqliteError::ModelNotFound(_))));
        assert!(db.model(VERSION_TABLE).is_ok());
        let table = db.table(VERSION_TABLE).unwrap();
        assert!(!table.spec().is_closed());
    }
}
