//! Bridging between core values and `rusqlite` parameters and rows.
//!
//! Statements bind [`SqlValue`]s through [`value_from_param`]; result
//! columns are read back with [`load`] and turned into [`Record`]s by
//! [`materialize`].

use std::sync::Arc;

use quickmodel_core::{ModelSpec, Record, SqlValue, coerce};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};

use crate::error::Result;

pub(crate) fn value_from_param(value: &SqlValue) -> ToSqlOutput<'_> {
    match value {
        SqlValue::Null => ToSqlOutput::Owned(Value::Null),
        SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
        SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
        SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        SqlValue::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
    }
}

pub(crate) fn params(values: &[SqlValue]) -> impl rusqlite::Params + '_ {
    rusqlite::params_from_iter(values.iter().map(value_from_param))
}

pub(crate) fn load(row: &rusqlite::Row<'_>, index: usize) -> Result<SqlValue> {
    Ok(match row.get_ref(index)? {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
    })
}

/// Builds a record from one result row.
///
/// A column named `name:suffix` is stored as `name`, and a NULL never
/// overwrites a value already read for the same field. Columns unknown to a
/// closed model are skipped, as are columns shadowing calculated fields.
pub(crate) fn materialize(
    model: &Arc<ModelSpec>,
    columns: &[String],
    row: Vec<SqlValue>,
) -> Result<Record> {
    let mut record = Record::new(Arc::clone(model));
    for (column, raw) in columns.iter().zip(row) {
        let name = column.split_once(':').map_or(column.as_str(), |(name, _)| name);
        let (key, value) = match model.find_field(name) {
            Some((_, field)) if field.is_computed() => continue,
            Some((declared, field)) => (declared, coerce::decode(raw, Some(field))?),
            None if model.is_closed() => continue,
            None => (name, coerce::decode(raw, None)?),
        };
        if value.is_null() && record.contains(key) {
            continue;
        }
        record.set(key, value)?;
    }
    Ok(record)
}
