//! Canonical DDL generation for declared models.
//!
//! The text produced here is compared byte-for-byte with the DDL SQLite
//! stores in `sqlite_master`, so the output must be stable: one space
//! between clauses, no trailing semicolon, columns in declaration order.
//!
//! ```text
//! CREATE TABLE pet (id INTEGER PRIMARY KEY, name TEXT NOT NULL, owner INTEGER,
//!     FOREIGN KEY(owner) REFERENCES person(id) ON DELETE CASCADE ON UPDATE CASCADE)
//! ```

use quickmodel_core::{FieldSpec, IndexSpec, ModelSpec, coerce};

/// The `CREATE TABLE` statement for a model.
pub(crate) fn create_table_sql(model: &ModelSpec) -> String {
    let mut clauses: Vec<String> = model
        .stored_fields()
        .map(|(name, field)| column_clause(name, field))
        .collect();

    for (name, field) in model.stored_fields() {
        if let (true, Some(target)) = (field.is_foreign_key(), field.reference()) {
            clauses.push(format!(
                "FOREIGN KEY({name}) REFERENCES {}({}) ON DELETE CASCADE ON UPDATE CASCADE",
                target.table, target.field
            ));
        }
    }

    format!("CREATE TABLE {} ({})", model.name(), clauses.join(", "))
}

fn column_clause(name: &str, field: &FieldSpec) -> String {
    let mut clause = format!("{name} {}", field.field_type().native_token());
    if field.is_primary_key() {
        clause.push_str(" PRIMARY KEY");
    }
    if !field.is_nullable() {
        clause.push_str(" NOT NULL");
    }
    if field.is_unique() {
        clause.push_str(" UNIQUE");
    }
    if let Some(default) = field.default() {
        clause.push_str(" DEFAULT ");
        clause.push_str(&coerce::literal(default, Some(field)));
    }
    clause
}

/// The `CREATE INDEX` statement for one declared index.
pub(crate) fn create_index_sql(table: &str, index: &IndexSpec) -> String {
    let mut sql = format!(
        "CREATE {}INDEX {} ON {table} ({})",
        if index.unique { "UNIQUE " } else { "" },
        index.resolved_name(table),
        index.columns.join(", ")
    );
    if let Some(predicate) = &index.predicate {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
    sql
}

/// The `CREATE VIEW` statement for a view definition.
pub(crate) fn create_view_sql(name: &str, select: &str) -> String {
    format!("CREATE VIEW {name} AS {}", select.trim().trim_end_matches(';').trim_end())
}

/// Trigger text as SQLite stores it.
///
/// SQLite keeps `CREATE TRIGGER` followed by the statement text from the
/// trigger name on: `IF NOT EXISTS` and a schema qualifier are dropped. The
/// final semicolon is removed here and whitespace before the name collapsed.
pub(crate) fn normalize_trigger(sql: &str) -> String {
    let text = sql.trim().trim_end_matches(';').trim_end();
    match trigger_body(text) {
        Some(body) => format!("CREATE TRIGGER {body}"),
        None => text.to_string(),
    }
}

/// The text after `CREATE TRIGGER [IF NOT EXISTS] [schema.]`.
fn trigger_body(text: &str) -> Option<String> {
    let (create, rest) = next_word(text)?;
    let (trigger, mut rest) = next_word(rest)?;
    if !create.eq_ignore_ascii_case("CREATE") || !trigger.eq_ignore_ascii_case("TRIGGER") {
        return None;
    }
    if let Some((_, tail)) = next_word(rest).filter(|(word, _)| word.eq_ignore_ascii_case("IF")) {
        let (not, tail) = next_word(tail)?;
        let (exists, tail) = next_word(tail)?;
        if !not.eq_ignore_ascii_case("NOT") || !exists.eq_ignore_ascii_case("EXISTS") {
            return None;
        }
        rest = tail;
    }
    let (name, tail) = next_word(rest)?;
    let name = name.split_once('.').map_or(name, |(_, name)| name);
    Some(format!("{name} {}", tail.trim_start()))
}

fn next_word(text: &str) -> Option<(&str, &str)> {
    text.trim_start().split_once(char::is_whitespace)
}

/// Quotes a name read back from the database for use in a `DROP` statement.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
