//! Conversion between logical [`Value`]s and SQLite storage values.
//!
//! Every value that reaches a statement, whether a bound parameter, a
//! `DEFAULT` literal, or an inlined filter operand, goes through [`encode`].
//! Every column read from a result row goes through [`decode`] with the
//! metadata of the column's declared field, if any.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDate;
//! use quickmodel_core::{FieldSpec, SqlValue, Value, coerce};
//!
//! let field = FieldSpec::date();
//! let day = Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
//!
//! let stored = coerce::encode(&day, Some(&field));
//! assert_eq!(stored, SqlValue::Text("2024-02-29".into()));
//! assert_eq!(coerce::decode(stored, Some(&field)).unwrap(), day);
//!
//! assert_eq!(coerce::literal(&Value::from("it's"), None), "'it''s'");
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};

use crate::error::{ModelError, Result};
use crate::types::{FieldSpec, FieldType};
use crate::value::{SqlValue, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const SQLITE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Encodes a value into its storage form for the given field.
pub fn encode(value: &Value, field: Option<&FieldSpec>) -> SqlValue {
    let date_only = field.is_some_and(|f| *f.field_type() == FieldType::Date);
    let json_field = field.is_some_and(|f| *f.field_type() == FieldType::Json);
    match value {
        Value::Null => SqlValue::Null,
        Value::Json(json) => SqlValue::Text(json.to_string()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) if json_field => {
            SqlValue::Text(serde_json::Value::from(s.as_str()).to_string())
        }
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Date(d) if date_only => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
        Value::Date(d) => SqlValue::Text(timestamp(&d.and_time(NaiveTime::MIN).and_utc())),
        Value::DateTime(dt) if date_only => {
            SqlValue::Text(dt.date_naive().format(DATE_FORMAT).to_string())
        }
        Value::DateTime(dt) => SqlValue::Text(timestamp(dt)),
        Value::Time(t) => SqlValue::Text(t.format(TIME_FORMAT).to_string()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
    }
}

/// Encodes a value and renders it as SQL literal text.
pub fn literal(value: &Value, field: Option<&FieldSpec>) -> String {
    encode(value, field).to_literal()
}

/// Decodes a stored value according to the field's logical type.
///
/// Null values and values without field metadata pass through with their
/// storage class mapped one-to-one.
///
/// # Errors
///
/// Returns [`ModelError::ConversionError`] when text stored in a numeric,
/// temporal, or JSON column cannot be parsed as that type.
pub fn decode(raw: SqlValue, field: Option<&FieldSpec>) -> Result<Value> {
    let Some(field) = field else {
        return Ok(passthrough(raw));
    };
    if raw.is_null() {
        return Ok(Value::Null);
    }

    match field.field_type() {
        FieldType::Integer | FieldType::PrimaryKey | FieldType::ForeignKey => match raw {
            SqlValue::Text(s) => parse_number(&s)
                .ok_or_else(|| conversion(&s, field.field_type())),
            other => Ok(passthrough(other)),
        },
        FieldType::Float | FieldType::Real => match raw {
            SqlValue::Integer(i) => Ok(Value::Float(i as f64)),
            SqlValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| conversion(&s, field.field_type())),
            other => Ok(passthrough(other)),
        },
        FieldType::Numeric => match raw {
            SqlValue::Text(s) => Ok(parse_number(&s).unwrap_or(Value::Text(s))),
            other => Ok(passthrough(other)),
        },
        FieldType::Date => match raw {
            SqlValue::Text(s) => parse_date(&s).ok_or_else(|| conversion(&s, field.field_type())),
            other => Ok(passthrough(other)),
        },
        FieldType::DateTime => match raw {
            SqlValue::Text(s) => {
                parse_datetime(&s).ok_or_else(|| conversion(&s, field.field_type()))
            }
            other => Ok(passthrough(other)),
        },
        FieldType::Time => match raw {
            SqlValue::Text(s) => parse_time(&s).ok_or_else(|| conversion(&s, field.field_type())),
            other => Ok(passthrough(other)),
        },
        FieldType::Boolean => Ok(match raw {
            SqlValue::Integer(i) => Value::Bool(i != 0),
            SqlValue::Real(f) => Value::Bool(f != 0.0),
            SqlValue::Text(s) => Value::Bool(truthy(&s)),
            other => passthrough(other),
        }),
        FieldType::Json => match raw {
            SqlValue::Text(s) => Ok(Value::Json(serde_json::from_str(&s)?)),
            SqlValue::Integer(i) => Ok(Value::Json(i.into())),
            SqlValue::Real(f) => Ok(Value::Json(
                serde_json::Number::from_f64(f)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            )),
            other => Ok(passthrough(other)),
        },
        FieldType::String | FieldType::Blob | FieldType::Calculated | FieldType::Custom(_) => {
            Ok(passthrough(raw))
        }
    }
}

fn passthrough(raw: SqlValue) -> Value {
    match raw {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(i),
        SqlValue::Real(f) => Value::Float(f),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Blob(b),
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion(text: &str, field_type: &FieldType) -> ModelError {
    ModelError::ConversionError(format!("cannot read '{text}' as {field_type:?}"))
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    s.parse::<i64>()
        .map(Value::Integer)
        .or_else(|_| s.parse::<f64>().map(Value::Float))
        .ok()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    SQLITE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}

fn parse_date(s: &str) -> Option<Value> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(s).map(|dt| dt.date_naive()))
        .map(Value::Date)
}

/// A bare `YYYY-MM-DD` reads as midnight UTC.
fn parse_datetime(s: &str) -> Option<Value> {
    parse_timestamp(s)
        .or_else(|| {
            NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        })
        .map(Value::DateTime)
}

fn parse_time(s: &str) -> Option<Value> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
        .map(Value::Time)
}

fn truthy(s: &str) -> bool {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "true" | "1" | "on" | "yes" => true,
        _ if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.bytes().any(|b| b != b'0')
        }
        _ => false,
    }
}
