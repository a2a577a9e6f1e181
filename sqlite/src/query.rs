//! Model handles and the query builder.
//!
//! A [`Model`] is returned by [`Database::define_model`] and carries the
//! record operations for one table. [`Query`] narrows a model's rows with
//! filters, ordering, and paging, then reads or changes them in bulk.
//!
//! # Example
//!
//! ```
//! use quickmodel_core::{Condition, FieldSpec, ModelSpec, Value};
//! use quickmodel_sqlite::Database;
//!
//! let db = Database::open_in_memory("1").unwrap();
//! let person = db
//!     .define_model(
//!         ModelSpec::new("person")
//!             .field("name", FieldSpec::string())
//!             .field("age", FieldSpec::integer()),
//!     )
//!     .unwrap();
//!
//! person.create([("name", Value::from("Ann")), ("age", Value::from(30))]).unwrap();
//! person.create([("name", Value::from("Bob")), ("age", Value::from(12))]).unwrap();
//!
//! let adults = person
//!     .filter(Condition::field("age").gte(18))
//!     .order("-age")
//!     .unwrap()
//!     .all()
//!     .unwrap();
//! assert_eq!(adults.len(), 1);
//! ```

use std::sync::Arc;

use quickmodel_core::{
    Condition, ModelError, ModelSpec, Predicate, Record, SqlValue, Value, coerce, compile,
};
use tracing::debug;

use crate::convert;
use crate::error::{Result, SqliteError};
use crate::session::Database;

/// Handle for reading and writing the rows of one model.
#[derive(Clone)]
pub struct Model<'db> {
    db: &'db Database,
    spec: Arc<ModelSpec>,
}

impl<'db> Model<'db> {
    pub(crate) fn new(db: &'db Database, spec: Arc<ModelSpec>) -> Self {
        Self { db, spec }
    }

    pub fn spec(&self) -> &Arc<ModelSpec> {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// A query over every row.
    pub fn query(&self) -> Query<'db> {
        Query::new(self.clone())
    }

    pub fn filter(&self, condition: impl Into<Condition>) -> Query<'db> {
        self.query().filter(condition)
    }

    /// Filters with a JSON condition such as `{"age": {"gte": 18}}`.
    pub fn filter_json(&self, condition: &serde_json::Value) -> Result<Query<'db>> {
        self.query().filter_json(condition)
    }

    /// The first row matching `condition`.
    pub fn filter_one(&self, condition: impl Into<Condition>) -> Result<Option<Record>> {
        self.filter(condition).get()
    }

    pub fn order(&self, keys: &str) -> Result<Query<'db>> {
        self.query().order(keys)
    }

    pub fn all(&self) -> Result<Vec<Record>> {
        self.query().all()
    }

    pub fn count(&self) -> Result<usize> {
        self.query().count()
    }

    /// An empty record of this model; nothing is written until it is saved.
    pub fn new_record(&self) -> Record {
        Record::new(Arc::clone(&self.spec))
    }

    /// Inserts a row built from `values` and reads it back.
    ///
    /// The returned record carries the generated id and column defaults.
    /// The insert is rolled back when the row cannot be read back.
    pub fn create<I, K, V>(&self, values: I) -> Result<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Record::with_values(Arc::clone(&self.spec), values)?;
        self.db.transaction(|_| {
            let id = self.insert(&mut record)?;
            Ok(self.find(id)?.unwrap_or(record))
        })
    }

    /// The row with the given primary key.
    pub fn find(&self, id: i64) -> Result<Option<Record>> {
        let pk = self.primary_key()?;
        self.filter(Condition::eq(pk, id)).get()
    }

    /// Writes a record: updates the row with its id, or inserts it when it
    /// has no id or no row was updated.
    ///
    /// Returns the record's id.
    pub fn save(&self, record: &mut Record) -> Result<i64> {
        if let Some(id) = record.id() {
            if self.update(record)? > 0 || self.find(id)?.is_some() {
                return Ok(id);
            }
        }
        self.insert(record)
    }

    /// Inserts a record even when it already has an id, keeping that id.
    pub fn save_forced_insert(&self, record: &mut Record) -> Result<i64> {
        self.insert(record)
    }

    /// Inserts every stored value of the record and assigns the new id to it.
    ///
    /// # Errors
    ///
    /// [`ReadOnly`](SqliteError::ReadOnly) for views, or the database error
    /// of a violated constraint.
    pub fn insert(&self, record: &mut Record) -> Result<i64> {
        self.writable()?;
        let (columns, params) = self.assignments(record)?;
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.name())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.name(),
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            )
        };
        self.db.exec(&sql, &params)?;
        let id = record.id().unwrap_or_else(|| self.db.last_insert_id());
        record.set_id(id);
        debug!(model = self.name(), id, "Inserted record");
        Ok(id)
    }

    /// Inserts the record, or updates the columns it carries when a row
    /// with its id already exists.
    pub fn upsert(&self, record: &mut Record) -> Result<i64> {
        self.writable()?;
        let pk = self.primary_key()?.to_string();
        let (columns, params) = self.assignments(record)?;
        if columns.is_empty() {
            return self.insert(record);
        }
        let updates: Vec<String> = columns
            .iter()
            .filter(|column| **column != pk)
            .map(|column| format!("{column} = excluded.{column}"))
            .collect();
        let action = if updates.is_empty() {
            "NOTHING".to_string()
        } else {
            format!("UPDATE SET {}", updates.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({pk}) DO {action}",
            self.name(),
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        self.db.exec(&sql, &params)?;
        let id = record.id().unwrap_or_else(|| self.db.last_insert_id());
        record.set_id(id);
        Ok(id)
    }

    /// Updates the row with the record's id from its stored values.
    ///
    /// Returns the number of rows changed; 0 when the record has no id.
    pub fn update(&self, record: &Record) -> Result<usize> {
        self.writable()?;
        let pk = self.primary_key()?;
        let Some(id) = record.id() else {
            return Ok(0);
        };
        let (columns, params) = self.assignments(record)?;
        let mut sets = Vec::new();
        let mut values = Vec::new();
        for (column, param) in columns.into_iter().zip(params) {
            if column != pk {
                sets.push(format!("{column} = ?"));
                values.push(param);
            }
        }
        if sets.is_empty() {
            return Ok(0);
        }
        values.push(SqlValue::Integer(id));
        let sql = format!("UPDATE {} SET {} WHERE {pk} = ?", self.name(), sets.join(", "));
        self.db.exec(&sql, &values)
    }

    /// Deletes the row with the given id; returns the number of rows deleted.
    pub fn remove(&self, id: i64) -> Result<usize> {
        self.writable()?;
        let pk = self.primary_key()?;
        self.db.exec(
            &format!("DELETE FROM {} WHERE {pk} = ?", self.name()),
            &[SqlValue::Integer(id)],
        )
    }

    /// Deletes the record's row; 0 when the record has no id.
    pub fn remove_record(&self, record: &Record) -> Result<usize> {
        match record.id() {
            Some(id) => self.remove(id),
            None => Ok(0),
        }
    }

    fn writable(&self) -> Result<()> {
        if self.spec.is_read_only() {
            return Err(SqliteError::ReadOnly(self.name().to_string()));
        }
        Ok(())
    }

    fn primary_key(&self) -> Result<&str> {
        self.spec.primary_key().ok_or_else(|| {
            ModelError::DefinitionError(format!("model '{}' has no primary key", self.name()))
                .into()
        })
    }

    /// Column names and encoded values of a record's stored fields.
    fn assignments(&self, record: &Record) -> Result<(Vec<String>, Vec<SqlValue>)> {
        let mut columns = Vec::with_capacity(record.values().len());
        let mut params = Vec::with_capacity(record.values().len());
        for (name, value) in record.values() {
            let (column, field) = self.spec.resolve_column(name)?;
            params.push(coerce::encode(value, field));
            columns.push(column);
        }
        Ok((columns, params))
    }
}

impl std::fmt::Debug for Model<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model").field("name", &self.name()).finish()
    }
}

/// A filtered, ordered, paged selection of a model's rows.
///
/// Successive [`filter`](Query::filter) calls are combined with `AND`.
#[derive(Debug, Clone)]
pub struct Query<'db> {
    model: Model<'db>,
    conditions: Vec<Condition>,
    order: Vec<(String, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'db> Query<'db> {
    fn new(model: Model<'db>) -> Self {
        Self {
            model,
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, condition: impl Into<Condition>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn filter_json(self, condition: &serde_json::Value) -> Result<Self> {
        Ok(self.filter(Condition::from_json(condition)?))
    }

    /// Adds comma-separated ordering keys; a leading `-` sorts descending.
    ///
    /// # Errors
    ///
    /// [`ModelError::UnknownField`] for undeclared fields of a closed model.
    pub fn order(mut self, keys: &str) -> Result<Self> {
        for key in keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            let (name, descending) = match key.strip_prefix('-') {
                Some(name) => (name.trim(), true),
                None => (key, false),
            };
            let (column, _) = self.model.spec.resolve_column(name)?;
            self.order.push((column, descending));
        }
        Ok(self)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The `SELECT` statement and its parameters.
    pub fn to_sql(&self) -> Result<(String, Vec<SqlValue>)> {
        let mut sql = format!("SELECT * FROM {}", self.model.name());
        let mut params = Vec::new();
        if let Some(predicate) = self.predicate()? {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.sql);
            params = predicate.params;
        }
        if !self.order.is_empty() {
            let keys: Vec<String> = self
                .order
                .iter()
                .map(|(column, descending)| {
                    format!("{column} {}", if *descending { "DESC" } else { "ASC" })
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        Ok((sql, params))
    }

    pub fn all(&self) -> Result<Vec<Record>> {
        let (sql, params) = self.to_sql()?;
        let result = self.model.db.select(&sql, &params)?;
        result
            .rows
            .into_iter()
            .map(|row| convert::materialize(&self.model.spec, &result.columns, row))
            .collect()
    }

    /// The first matching row.
    pub fn get(&self) -> Result<Option<Record>> {
        let mut first = self.clone();
        first.limit = Some(1);
        Ok(first.all()?.into_iter().next())
    }

    pub fn count(&self) -> Result<usize> {
        let (sql, params) = if self.is_paged() {
            let (select, params) = self.to_sql()?;
            (format!("SELECT COUNT(*) FROM ({select})"), params)
        } else {
            let mut sql = format!("SELECT COUNT(*) FROM {}", self.model.name());
            let mut params = Vec::new();
            if let Some(predicate) = self.predicate()? {
                sql.push_str(" WHERE ");
                sql.push_str(&predicate.sql);
                params = predicate.params;
            }
            (sql, params)
        };
        let result = self.model.db.select(&sql, &params)?;
        match result.rows.first().and_then(|row| row.first()) {
            Some(SqlValue::Integer(count)) => Ok(usize::try_from(*count).unwrap_or(0)),
            _ => Ok(0),
        }
    }

    /// Sets columns on every matching row; returns the number changed.
    ///
    /// # Errors
    ///
    /// [`ModelError::UnknownField`] for undeclared fields of a closed model,
    /// [`ModelError::ComputedField`] for calculated fields.
    pub fn update<I, K, V>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.model.writable()?;
        let mut sets = Vec::new();
        let mut params = Vec::new();
        for (name, value) in values {
            let (column, field) = self.model.spec.resolve_column(name.as_ref())?;
            sets.push(format!("{column} = ?"));
            params.push(coerce::encode(&value.into(), field));
        }
        if sets.is_empty() {
            return Ok(0);
        }
        let (scope, scope_params) = self.scope()?;
        params.extend(scope_params);
        let sql = format!("UPDATE {} SET {}{scope}", self.model.name(), sets.join(", "));
        self.model.db.exec(&sql, &params)
    }

    /// Deletes every matching row; returns the number deleted.
    pub fn remove(&self) -> Result<usize> {
        self.model.writable()?;
        let (scope, params) = self.scope()?;
        let sql = format!("DELETE FROM {}{scope}", self.model.name());
        self.model.db.exec(&sql, &params)
    }

    fn is_paged(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    fn predicate(&self) -> Result<Option<Predicate>> {
        let condition = match self.conditions.as_slice() {
            [] => return Ok(None),
            [single] => single.clone(),
            many => Condition::And(many.to_vec()),
        };
        Ok(Some(compile(&condition, &self.model.spec)?))
    }

    /// `WHERE` clause for bulk changes; paged queries select rows by rowid.
    fn scope(&self) -> Result<(String, Vec<SqlValue>)> {
        if self.is_paged() {
            let (sql, params) = self.to_sql()?;
            let sql = sql.replacen("SELECT *", "SELECT rowid", 1);
            return Ok((format!(" WHERE rowid IN ({sql})"), params));
        }
        Ok(match self.predicate()? {
            Some(predicate) => (format!(" WHERE {}", predicate.sql), predicate.params),
            None => (String::new(), Vec::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickmodel_core::{FieldSpec, ModelSpec};
    use serde_json::json;

    fn setup() -> Database {
        let db = Database::open_in_memory("1").unwrap();
        db.define_model(
            ModelSpec::new("person")
                .field("name", FieldSpec::string().not_null())
                .field("age", FieldSpec::integer())
                .field("active", FieldSpec::boolean().default_value(true)),
        )
        .unwrap();
        db.confirm_migration().unwrap();
        db
    }

    fn seed(person: &Model<'_>) {
        for (name, age) in [("Ann", 30), ("Bob", 12), ("Cid", 45), ("Dee", 30)] {
            person
                .create([("name", Value::from(name)), ("age", Value::from(age))])
                .unwrap();
        }
    }

    fn names(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.get("name").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_create_reads_back_defaults() {
        let db = setup();
        let person = db.model("person").unwrap();
        let ann = person.create([("name", "Ann")]).unwrap();
        assert_eq!(ann.id(), Some(1));
        assert_eq!(ann.get("active").unwrap(), Value::Bool(true));
        assert_eq!(ann.get("age").unwrap(), Value::Null);
    }

    #[test]
    fn test_filter_order_and_paging() {
        let db = setup();
        let person = db.model("person").unwrap();
        seed(&person);

        let adults = person
            .filter(Condition::field("age").gte(18))
            .order("-age, name")
            .unwrap()
            .all()
            .unwrap();
        assert_eq!(names(&adults), vec!["Cid", "Ann", "Dee"]);

        let page = person.order("name").unwrap().limit(2).offset(1).all().unwrap();
        assert_eq!(names(&page), vec!["Bob", "Cid"]);

        let tail = person.order("name").unwrap().offset(3).all().unwrap();
        assert_eq!(names(&tail), vec!["Dee"]);
    }

    #[test]
    fn test_filters_combine_with_and() {
        let db = setup();
        let person = db.model("person").unwrap();
        seed(&person);
        let query = person
            .filter(Condition::eq("age", 30))
            .filter(Condition::field("name").starts_with("D"));
        assert_eq!(query.count().unwrap(), 1);
        assert_eq!(
            query.to_sql().unwrap().0,
            "SELECT * FROM person WHERE ((age = ?) AND (name LIKE ?))"
        );
    }

    #[test]
    fn test_filter_json_and_count() {
        let db = setup();
        let person = db.model("person").unwrap();
        seed(&person);
        let query = person
            .filter_json(&json!({"OR": [{"name": "Ann"}, {"age": {"lt": 18}}]}))
            .unwrap();
        assert_eq!(query.count().unwrap(), 2);
        assert_eq!(person.count().unwrap(), 4);
        assert_eq!(person.query().limit(3).count().unwrap(), 3);
    }

    #[test]
    fn test_save_updates_then_inserts() {
        let db = setup();
        let person = db.model("person").unwrap();
        let mut record = person.new_record();
        record.set("name", "Eve").unwrap();
        let id = person.save(&mut record).unwrap();
        assert_eq!(record.id(), Some(id));

        record.set("age", 22).unwrap();
        assert_eq!(person.save(&mut record).unwrap(), id);
        assert_eq!(person.count().unwrap(), 1);
        let loaded = person.find(id).unwrap().unwrap();
        assert_eq!(loaded.get("age").unwrap(), Value::Integer(22));

        let mut forced = person.new_record();
        forced.set("name", "Fay").unwrap();
        forced.set_id(40);
        assert_eq!(person.save(&mut forced).unwrap(), 40);
        assert!(person.find(40).unwrap().is_some());
    }

    #[test]
    fn test_upsert_updates_existing_row() {
        let db = setup();
        let person = db.model("person").unwrap();
        let ann = person.create([("name", "Ann")]).unwrap();

        let mut changed = person.new_record();
        changed.set_id(ann.id().unwrap());
        changed.set("name", "Anne").unwrap();
        person.upsert(&mut changed).unwrap();

        let mut fresh = person.new_record();
        fresh.set("name", "Gus").unwrap();
        let gus = person.upsert(&mut fresh).unwrap();

        assert_eq!(person.count().unwrap(), 2);
        let ann = person.find(ann.id().unwrap()).unwrap().unwrap();
        assert_eq!(ann.get("name").unwrap(), Value::Text("Anne".into()));
        assert!(person.find(gus).unwrap().is_some());
    }

    #[test]
    fn test_bulk_update_and_remove() {
        let db = setup();
        let person = db.model("person").unwrap();
        seed(&person);

        let changed = person
            .filter(Condition::eq("age", 30))
            .update([("active", false)])
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(person.filter(Condition::eq("active", false)).count().unwrap(), 2);

        let removed = person.order("age").unwrap().limit(1).remove().unwrap();
        assert_eq!(removed, 1);
        assert!(person.filter_one(Condition::eq("name", "Bob")).unwrap().is_none());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let db = setup();
        let person = db.model("person").unwrap();
        assert!(matches!(
            person.filter(Condition::eq("height", 1)).all(),
            Err(SqliteError::ModelError(ModelError::UnknownField { .. }))
        ));
        assert!(matches!(
            person.query().update([("height", 1)]),
            Err(SqliteError::ModelError(ModelError::UnknownField { .. }))
        ));
        assert!(person.order("height").is_err());
    }

    #[test]
    fn test_remove_and_remove_record() {
        let db = setup();
        let person = db.model("person").unwrap();
        let ann = person.create([("name", "Ann")]).unwrap();
        assert_eq!(person.remove_record(&person.new_record()).unwrap(), 0);
        assert_eq!(person.remove_record(&ann).unwrap(), 1);
        assert_eq!(person.remove(ann.id().unwrap()).unwrap(), 0);
    }

    #[test]
    fn test_update_without_id_is_noop() {
        let db = setup();
        let person = db.model("person").unwrap();
        let mut record = person.new_record();
        record.set("name", "Hal").unwrap();
        assert_eq!(person.update(&record).unwrap(), 0);
    }

    #[test]
    fn test_create_stores_text_in_json_field() {
        let db = Database::open_in_memory("1").unwrap();
        let docs = db
            .define_model(ModelSpec::new("doc").field("body", FieldSpec::json()))
            .unwrap();
        let created = docs.create([("body", "hello")]).unwrap();
        assert_eq!(created.get("body").unwrap(), Value::Json(json!("hello")));

        let all = docs.all().unwrap();
        assert_eq!(all[0].get("body").unwrap(), Value::Json(json!("hello")));
        assert_eq!(docs.filter_json(&json!({"body": "hello"})).unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_create_rolls_back_unreadable_row() {
        let db = Database::open_in_memory("1").unwrap();
        let events = db
            .define_model(ModelSpec::new("event").field("day", FieldSpec::date()))
            .unwrap();
        let result = events.create([("day", "someday")]);
        assert!(matches!(
            result,
            Err(SqliteError::ModelError(ModelError::ConversionError(_)))
        ));
        assert_eq!(events.count().unwrap(), 0);
    }

    #[test]
    fn test_bare_array_filter_matches_any() {
        let db = setup();
        let person = db.model("person").unwrap();
        seed(&person);
        let rows = person.filter_json(&json!({"age": [12, 45]})).unwrap().count().unwrap();
        assert_eq!(rows, 2);
    }
}
