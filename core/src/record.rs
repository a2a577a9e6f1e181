//! Mutable row projections bound to a model.
//!
//! A [`Record`] maps declared column names to [`Value`]s. Only columns that
//! were loaded or explicitly set are present; reading a declared but unset
//! column yields [`Value::Null`]. Calculated fields are evaluated on every
//! read and never stored in the value map.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use quickmodel_core::{FieldSpec, ModelRegistry, ModelSpec, Record, Value};
//!
//! let model = ModelSpec::new("person")
//!     .field("name", FieldSpec::string())
//!     .field("age", FieldSpec::integer())
//!     .field("adult", FieldSpec::calculated(|r| {
//!         Value::Bool(r.get("age").ok().and_then(|v| v.as_i64()).unwrap_or(0) >= 18)
//!     }))
//!     .prepare(&ModelRegistry::new())
//!     .unwrap();
//!
//! let mut ann = Record::new(Arc::new(model));
//! ann.set("name", "Ann").unwrap();
//! ann.set("age", 30).unwrap();
//! assert_eq!(ann.get("adult").unwrap(), Value::Bool(true));
//! assert!(ann.set("height", 170).is_err());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ModelError, Result};
use crate::model::ModelSpec;
use crate::value::Value;

/// A row of one model.
#[derive(Debug, Clone)]
pub struct Record {
    model: Arc<ModelSpec>,
    values: BTreeMap<String, Value>,
}

impl Record {
    /// An empty record of `model`.
    pub fn new(model: Arc<ModelSpec>) -> Self {
        Self {
            model,
            values: BTreeMap::new(),
        }
    }

    /// A record populated from `(field, value)` pairs.
    ///
    /// # Errors
    ///
    /// Fails like [`set`](Self::set) on unknown or computed fields.
    pub fn with_values<I, K, V>(model: Arc<ModelSpec>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Self::new(model);
        record.set_values(values)?;
        Ok(record)
    }

    pub fn model(&self) -> &Arc<ModelSpec> {
        &self.model
    }

    /// The primary key value, when set and integral.
    pub fn id(&self) -> Option<i64> {
        let pk = self.model.primary_key()?;
        self.values.get(pk).and_then(Value::as_i64)
    }

    /// Stores the primary key assigned by an insert.
    pub fn set_id(&mut self, id: i64) {
        if let Some(pk) = self.model.primary_key() {
            self.values.insert(pk.to_string(), Value::Integer(id));
        }
    }

    /// Reads a field, evaluating it if it is calculated.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownField`] when the model's field set is
    /// closed and does not declare `field`.
    pub fn get(&self, field: &str) -> Result<Value> {
        match self.model.find_field(field) {
            Some((_, spec)) if spec.is_computed() => Ok(spec
                .compute()
                .map(|compute| compute.evaluate(self))
                .unwrap_or(Value::Null)),
            Some((name, _)) => Ok(self.values.get(name).cloned().unwrap_or(Value::Null)),
            None if self.model.is_closed() => {
                Err(ModelError::unknown_field(self.model.name(), field))
            }
            None => Ok(self.values.get(field).cloned().unwrap_or(Value::Null)),
        }
    }

    /// Assigns a field under its declared spelling.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownField`] for undeclared fields of a
    /// closed model and [`ModelError::ComputedField`] for calculated fields.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let key = self.resolve(field)?;
        self.values.insert(key, value.into());
        Ok(())
    }

    /// Removes a field from the value map, so it is left out of inserts.
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        let key = self
            .model
            .find_field(field)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| field.to_string());
        self.values.remove(&key)
    }

    /// Whether the field has been loaded or assigned.
    pub fn contains(&self, field: &str) -> bool {
        match self.model.find_field(field) {
            Some((name, _)) => self.values.contains_key(name),
            None => self.values.contains_key(field),
        }
    }

    /// The stored (non-computed) values.
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Assigns several fields; stops at the first invalid one.
    pub fn set_values<I, K, V>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (field, value) in values {
            self.set(field.as_ref(), value)?;
        }
        Ok(())
    }

    /// Moves the values onto another model, keeping only the fields that
    /// model stores.
    ///
    /// Returns the rebound record and the names of the dropped fields.
    pub fn rebind(self, model: Arc<ModelSpec>) -> (Record, Vec<String>) {
        let mut rebound = Record::new(Arc::clone(&model));
        let mut dropped = Vec::new();
        for (field, value) in self.values {
            match model.find_field(&field) {
                Some((name, spec)) if !spec.is_computed() => {
                    rebound.values.insert(name.to_string(), value);
                }
                _ => dropped.push(field),
            }
        }
        (rebound, dropped)
    }

    fn resolve(&self, field: &str) -> Result<String> {
        match self.model.find_field(field) {
            Some((name, spec)) if spec.is_computed() => {
                Err(ModelError::ComputedField(name.to_string()))
            }
            Some((name, _)) => Ok(name.to_string()),
            None if self.model.is_closed() => {
                Err(ModelError::unknown_field(self.model.name(), field))
            }
            None => Ok(field.to_string()),
        }
    }
}
