//! Schema synchronization for declared models and views.
//!
//! [`sync_table`] brings one live table in line with its declaration. The
//! canonical `CREATE TABLE` text is compared with the DDL SQLite stored for
//! the table; any difference rebuilds the table, carrying every row over
//! with the columns that still exist. Indexes and triggers are compared the
//! same way and recreated when their DDL differs. All of it runs in one
//! transaction per table: a failure leaves that table untouched and is
//! reported as [`SqliteError::MigrationError`].
//!
//! Tables synchronized earlier in the same session stay migrated when a
//! later table fails.

use std::collections::BTreeMap;

use quickmodel_core::{ModelSpec, SqlValue, coerce};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SqliteError};
use crate::introspect;
use crate::schema::{
    create_index_sql, create_table_sql, create_view_sql, normalize_trigger, quote_identifier,
};
use crate::session::Database;

/// What one synchronization did to a table or view.
///
/// Returned by [`Database::define_model`](crate::Database::define_model)
/// while migrating and kept in
/// [`Database::sync_reports`](crate::Database::sync_reports).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub table: String,
    /// The table was created or rebuilt from its canonical DDL.
    pub rebuilt: bool,
    /// Rows carried over from the previous table.
    pub rows_copied: usize,
    /// Old columns that no longer exist and were dropped with their values.
    pub dropped_columns: Vec<String>,
    pub indexes_rebuilt: bool,
    pub triggers_rebuilt: bool,
    /// Number of DDL and DML statements executed.
    pub statements: usize,
}

impl SyncReport {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// Whether the live schema already matched the declaration.
    pub fn is_noop(&self) -> bool {
        self.statements == 0
    }

    fn run(&mut self, db: &Database, sql: &str, params: &[SqlValue]) -> Result<usize> {
        self.statements += 1;
        db.exec(sql, params)
    }

    fn run_batch(&mut self, db: &Database, sql: &str) -> Result<()> {
        self.statements += 1;
        db.exec_batch(sql)
    }
}

/// Synchronizes one table with its declaration.
pub(crate) fn sync_table(db: &Database, model: &ModelSpec) -> Result<SyncReport> {
    db.transaction(|db| {
        let mut report = SyncReport::new(model.name());
        sync_columns(db, model, &mut report)?;
        sync_indexes(db, model, &mut report)?;
        sync_triggers(db, model, &mut report)?;
        if report.is_noop() {
            debug!(table = model.name(), "Schema up to date");
        }
        Ok(report)
    })
    .map_err(|e| SqliteError::migration(model.name(), e))
}

fn sync_columns(db: &Database, model: &ModelSpec, report: &mut SyncReport) -> Result<()> {
    let canonical = create_table_sql(model);
    let live = introspect::stored_sql(db, "table", model.name())?;
    if live.as_deref() == Some(canonical.as_str()) {
        return Ok(());
    }

    report.rebuilt = true;
    let Some(live) = live else {
        info!(table = model.name(), "Creating table");
        report.run(db, &canonical, &[])?;
        return Ok(());
    };

    info!(table = model.name(), "Rebuilding table");
    debug!(table = model.name(), old = %live, new = %canonical, "Table DDL changed");

    let old_columns = introspect::columns(db, model.name())?;
    report.dropped_columns = old_columns
        .iter()
        .filter(|(name, _)| {
            !matches!(model.find_field(name), Some((_, field)) if !field.is_computed())
        })
        .map(|(name, _)| name.clone())
        .collect();
    if !report.dropped_columns.is_empty() {
        warn!(
            table = model.name(),
            columns = ?report.dropped_columns,
            "Dropping columns no longer declared"
        );
    }

    let old = db.select(&format!("SELECT * FROM {}", quote_identifier(model.name())), &[])?;

    report.run(db, &format!("DROP TABLE {}", quote_identifier(model.name())), &[])?;
    report.run(db, &canonical, &[])?;

    for row in old.rows {
        let (sql, params) = copy_statement(model, &old.columns, row);
        report.run(db, &sql, &params)?;
        report.rows_copied += 1;
    }
    info!(table = model.name(), rows = report.rows_copied, "Table rebuilt");
    Ok(())
}

/// `INSERT` carrying one old row's surviving columns, primary key included.
///
/// Stored values are converted to the new field's type when they parse as
/// it and copied unchanged otherwise.
fn copy_statement(
    model: &ModelSpec,
    columns: &[String],
    row: Vec<SqlValue>,
) -> (String, Vec<SqlValue>) {
    let mut names = Vec::new();
    let mut params = Vec::new();
    for (column, raw) in columns.iter().zip(row) {
        let Some((name, field)) = model.find_field(column) else {
            continue;
        };
        if field.is_computed() {
            continue;
        }
        names.push(name);
        params.push(match coerce::decode(raw.clone(), Some(field)) {
            Ok(value) => coerce::encode(&value, Some(field)),
            Err(_) => raw,
        });
    }
    let sql = if names.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", model.name())
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            model.name(),
            names.join(", "),
            vec!["?"; names.len()].join(", ")
        )
    };
    (sql, params)
}

fn sync_indexes(db: &Database, model: &ModelSpec, report: &mut SyncReport) -> Result<()> {
    let declared: BTreeMap<String, String> = model
        .indexes()
        .iter()
        .map(|index| {
            (
                index.resolved_name(model.name()),
                create_index_sql(model.name(), index),
            )
        })
        .collect();
    let live = introspect::indexes(db, model.name())?;
    if live == declared {
        return Ok(());
    }

    info!(table = model.name(), count = declared.len(), "Recreating indexes");
    report.indexes_rebuilt = true;
    for name in live.keys() {
        report.run(db, &format!("DROP INDEX IF EXISTS {}", quote_identifier(name)), &[])?;
    }
    for sql in declared.values() {
        report.run(db, sql, &[])?;
    }
    Ok(())
}

fn sync_triggers(db: &Database, model: &ModelSpec, report: &mut SyncReport) -> Result<()> {
    let mut declared: Vec<String> = model.triggers().iter().map(|t| normalize_trigger(t)).collect();
    declared.sort();
    let live = introspect::triggers(db, model.name())?;
    let mut live_sql: Vec<String> = live.iter().map(|(_, sql)| normalize_trigger(sql)).collect();
    live_sql.sort();
    if live_sql == declared {
        return Ok(());
    }

    info!(table = model.name(), count = declared.len(), "Recreating triggers");
    report.triggers_rebuilt = true;
    for (name, _) in &live {
        report.run(db, &format!("DROP TRIGGER IF EXISTS {}", quote_identifier(name)), &[])?;
    }
    for sql in model.triggers() {
        report.run_batch(db, sql)?;
    }
    Ok(())
}

/// Recreates a view when its stored definition differs.
pub(crate) fn sync_view(db: &Database, name: &str, select: &str) -> Result<SyncReport> {
    db.transaction(|db| {
        let mut report = SyncReport::new(name);
        let canonical = create_view_sql(name, select);
        if introspect::stored_sql(db, "view", name)?.as_deref() == Some(canonical.as_str()) {
            return Ok(report);
        }
        info!(view = name, "Recreating view");
        report.rebuilt = true;
        report.run(db, &format!("DROP VIEW IF EXISTS {}", quote_identifier(name)), &[])?;
        report.run(db, &canonical, &[])?;
        Ok(report)
    })
    .map_err(|e| SqliteError::migration(name, e))
}

/// Drops every table not backed by a registered model.
pub(crate) fn prune(db: &Database, keep: impl Fn(&str) -> bool) -> Result<Vec<String>> {
    let mut dropped = Vec::new();
    for table in introspect::table_names(db)? {
        if keep(&table) {
            continue;
        }
        info!(table = %table, "Dropping orphan table");
        db.exec(&format!("DROP TABLE {}", quote_identifier(&table)), &[])?;
        dropped.push(table);
    }
    Ok(dropped)
}
