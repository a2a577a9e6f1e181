//! Reading the live schema back from `sqlite_master` and `table_info`.

use std::collections::BTreeMap;

use quickmodel_core::{FieldSpec, FieldType, ModelSpec, SqlValue};

use crate::error::Result;
use crate::session::Database;

fn text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Text(s) => Some(s.clone()),
        _ => None,
    }
}

fn integer(value: &SqlValue) -> i64 {
    match value {
        SqlValue::Integer(i) => *i,
        _ => 0,
    }
}

/// Stored DDL of an object of the given kind (`table`, `index`, `view`, `trigger`).
pub(crate) fn stored_sql(db: &Database, kind: &str, name: &str) -> Result<Option<String>> {
    let result = db.select(
        "SELECT sql FROM sqlite_master WHERE type = ? AND name = ? COLLATE NOCASE",
        &[SqlValue::Text(kind.into()), SqlValue::Text(name.into())],
    )?;
    Ok(result.rows.first().and_then(|row| text(&row[0])))
}

/// Kind and stored DDL of a table or view.
pub(crate) fn object(db: &Database, name: &str) -> Result<Option<(String, String)>> {
    let result = db.select(
        "SELECT type, sql FROM sqlite_master \
         WHERE type IN ('table', 'view') AND name = ? COLLATE NOCASE",
        &[SqlValue::Text(name.into())],
    )?;
    Ok(result
        .rows
        .first()
        .and_then(|row| Some((text(&row[0])?, text(&row[1]).unwrap_or_default()))))
}

/// User tables, excluding SQLite's internal ones.
pub(crate) fn table_names(db: &Database) -> Result<Vec<String>> {
    let result = db.select(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
        &[],
    )?;
    Ok(result.rows.iter().filter_map(|row| text(&row[0])).collect())
}

/// Columns of a table or view, typed from their declared type tokens.
///
/// An `INTEGER` primary key column reads back as a primary key field.
pub(crate) fn columns(db: &Database, table: &str) -> Result<Vec<(String, FieldSpec)>> {
    let result = db.select(
        "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?) ORDER BY cid",
        &[SqlValue::Text(table.into())],
    )?;
    Ok(result
        .rows
        .iter()
        .filter_map(|row| {
            let name = text(&row[0])?;
            let field_type = FieldType::from_native(&text(&row[1]).unwrap_or_default());
            let field = if integer(&row[3]) > 0 && field_type == FieldType::Integer {
                FieldSpec::primary_key()
            } else {
                FieldSpec::new(field_type)
            };
            let field = field.nullable(integer(&row[2]) == 0);
            Some((name, field))
        })
        .collect())
}

/// An open model describing an existing table, or a read-only one for a view.
pub(crate) fn model(db: &Database, name: &str) -> Result<Option<ModelSpec>> {
    let Some((kind, _)) = object(db, name)? else {
        return Ok(None);
    };
    let spec = ModelSpec::introspected(name, columns(db, name)?);
    Ok(Some(if kind == "view" { spec.read_only() } else { spec }))
}

/// Name → DDL of the explicitly created indexes on a table.
///
/// Indexes SQLite creates for `UNIQUE` and `PRIMARY KEY` constraints have
/// no stored DDL and are left out.
pub(crate) fn indexes(db: &Database, table: &str) -> Result<BTreeMap<String, String>> {
    let result = db.select(
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'index' AND tbl_name = ? COLLATE NOCASE AND sql IS NOT NULL",
        &[SqlValue::Text(table.into())],
    )?;
    Ok(result
        .rows
        .iter()
        .filter_map(|row| Some((text(&row[0])?, text(&row[1])?)))
        .collect())
}

/// Name and DDL of the triggers on a table.
pub(crate) fn triggers(db: &Database, table: &str) -> Result<Vec<(String, String)>> {
    let result = db.select(
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'trigger' AND tbl_name = ? COLLATE NOCASE ORDER BY name",
        &[SqlValue::Text(table.into())],
    )?;
    Ok(result
        .rows
        .iter()
        .filter_map(|row| Some((text(&row[0])?, text(&row[1])?)))
        .collect())
}

/// `PRAGMA schema_version`; bumped by SQLite on every schema change.
pub(crate) fn schema_version(db: &Database) -> Result<i64> {
    let result = db.select("PRAGMA schema_version", &[])?;
    Ok(result.rows.first().map(|row| integer(&row[0])).unwrap_or(0))
}
