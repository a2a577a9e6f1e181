//! Identifier and model-definition validation.
//!
//! Table, column, and index names are interpolated into SQL text, so every
//! name is checked before it reaches a statement. Model validation catches
//! structural problems (duplicate columns, dangling foreign keys, several
//! primary keys) at declaration time.
//!
//! # Examples
//!
//! ```
//! use quickmodel_core::validate_identifier;
//!
//! assert!(validate_identifier("person_2").is_ok());
//! assert!(validate_identifier("drop;--").is_err());
//! assert!(validate_identifier("order").is_err());
//! ```

use std::collections::HashSet;

use crate::error::{ModelError, Result};
use crate::model::{ModelRegistry, ModelSpec};
use crate::types::FieldType;

/// SQLite keywords, sorted. Names are interpolated unquoted, so none of
/// these may name a table, column, or index.
const KEYWORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ALWAYS", "ANALYZE", "AND", "AS", "ASC",
    "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST",
    "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DEFAULT",
    "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH", "DISTINCT", "DO", "DROP", "EACH",
    "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUDE", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL",
    "FILTER", "FIRST", "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL", "GENERATED", "GLOB",
    "GROUP", "GROUPS", "HAVING", "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED",
    "INITIALLY", "INNER", "INSERT", "INSTEAD", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN",
    "KEY", "LAST", "LEFT", "LIKE", "LIMIT", "MATCH", "MATERIALIZED", "NATURAL", "NO", "NOT",
    "NOTHING", "NOTNULL", "NULL", "NULLS", "OF", "OFFSET", "ON", "OR", "ORDER", "OTHERS",
    "OUTER", "OVER", "PARTITION", "PLAN", "PRAGMA", "PRECEDING", "PRIMARY", "QUERY", "RAISE",
    "RANGE", "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE",
    "RESTRICT", "RETURNING", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT", "SELECT", "SET",
    "TABLE", "TEMP", "TEMPORARY", "THEN", "TIES", "TO", "TRANSACTION", "TRIGGER", "UNBOUNDED",
    "UNION", "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL", "WHEN",
    "WHERE", "WINDOW", "WITH", "WITHOUT",
];

/// Checks that a name is a plain SQL identifier.
///
/// Accepts ASCII letters, digits, and underscores, not starting with a digit.
/// SQLite keywords are rejected in any letter case.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(ModelError::DefinitionError(format!(
            "invalid identifier '{name}': must contain only ASCII letters, digits and underscores"
        )));
    }
    if KEYWORDS.binary_search(&name.to_ascii_uppercase().as_str()).is_ok() {
        return Err(ModelError::DefinitionError(format!(
            "invalid identifier '{name}': reserved SQL keyword"
        )));
    }
    Ok(())
}

/// Validates a model against the registry it is about to join.
///
/// Expects the primary key to be injected already.
pub(crate) fn validate_model(model: &ModelSpec, registry: &ModelRegistry) -> Result<()> {
    validate_identifier(model.name())?;

    let mut seen = HashSet::new();
    let mut primary_keys = 0;
    for (name, field) in model.fields() {
        validate_identifier(name)?;
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(ModelError::DefinitionError(format!(
                "duplicate field '{name}' in model '{}'",
                model.name()
            )));
        }

        match field.field_type() {
            FieldType::PrimaryKey => primary_keys += 1,
            FieldType::ForeignKey => validate_reference(model, name, registry)?,
            FieldType::Calculated if field.compute().is_none() => {
                return Err(ModelError::DefinitionError(format!(
                    "calculated field '{name}' has no compute function"
                )));
            }
            FieldType::Custom(token) => validate_type_token(name, token)?,
            _ => {}
        }
    }

    if primary_keys > 1 {
        return Err(ModelError::DefinitionError(format!(
            "model '{}' declares {primary_keys} primary keys",
            model.name()
        )));
    }

    for trigger in model.triggers() {
        validate_trigger(model.name(), trigger)?;
    }

    for index in model.indexes() {
        if index.columns.is_empty() {
            return Err(ModelError::DefinitionError(format!(
                "index on '{}' has no columns",
                model.name()
            )));
        }
        if let Some(name) = &index.name {
            validate_identifier(name)?;
        }
        for column in &index.columns {
            match model.find_field(column) {
                Some((_, field)) if !field.is_computed() => {}
                _ => {
                    return Err(ModelError::DefinitionError(format!(
                        "index column '{column}' is not a stored field of '{}'",
                        model.name()
                    )));
                }
            }
        }
    }

    Ok(())
}

fn validate_reference(model: &ModelSpec, field: &str, registry: &ModelRegistry) -> Result<()> {
    let spec = model
        .find_field(field)
        .map(|(_, spec)| spec)
        .ok_or_else(|| ModelError::unknown_field(model.name(), field))?;
    let Some(reference) = spec.reference() else {
        return Err(ModelError::DefinitionError(format!(
            "foreign key '{field}' on '{}' has no reference target",
            model.name()
        )));
    };
    validate_identifier(&reference.table)?;
    validate_identifier(&reference.field)?;

    let self_reference = reference.table.eq_ignore_ascii_case(model.name());
    if !self_reference && !registry.contains(&reference.table) {
        return Err(ModelError::DefinitionError(format!(
            "foreign key '{field}' on '{}' references undeclared table '{}'",
            model.name(),
            reference.table
        )));
    }
    Ok(())
}

/// Accepts `CREATE TRIGGER` statements only; temporary triggers are not part
/// of the table's stored schema.
fn validate_trigger(table: &str, sql: &str) -> Result<()> {
    let mut words = sql.split_whitespace();
    let create = words.next().is_some_and(|w| w.eq_ignore_ascii_case("CREATE"));
    let trigger = words.next().is_some_and(|w| w.eq_ignore_ascii_case("TRIGGER"));
    if create && trigger {
        Ok(())
    } else {
        Err(ModelError::DefinitionError(format!(
            "trigger on '{table}' must start with CREATE TRIGGER: {sql}"
        )))
    }
}

fn validate_type_token(field: &str, token: &str) -> Result<()> {
    let valid = !token.trim().is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | ','));
    if valid {
        Ok(())
    } else {
        Err(ModelError::DefinitionError(format!(
            "invalid type '{token}' for field '{field}'"
        )))
    }
}
