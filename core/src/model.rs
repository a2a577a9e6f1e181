//! Model declarations and the per-session model registry.
//!
//! A [`ModelSpec`] describes one table: its ordered fields, indexes, and
//! raw trigger statements. Declared models have a closed field set; models
//! built from introspection (views, existing tables) are open, so unknown
//! column names pass through to SQL.
//!
//! # Examples
//!
//! ```
//! use quickmodel_core::{FieldSpec, IndexSpec, ModelRegistry, ModelSpec};
//!
//! let mut registry = ModelRegistry::new();
//! let person = ModelSpec::new("person")
//!     .field("name", FieldSpec::string().not_null())
//!     .field("age", FieldSpec::integer())
//!     .index(IndexSpec::new(["age"]))
//!     .prepare(&registry)
//!     .unwrap();
//!
//! // An `id` primary key is injected when none is declared.
//! assert_eq!(person.primary_key(), Some("id"));
//! registry.register(person);
//! assert!(registry.contains("PERSON"));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ModelError, Result};
use crate::types::FieldSpec;
use crate::validate::validate_model;

/// Name of the primary key injected into models that declare none.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Declarative description of one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Explicit index name; defaults to `idx[_unique]_<table>_<columns>`.
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Partial-index predicate, emitted verbatim after `WHERE`.
    pub predicate: Option<String>,
}

impl IndexSpec {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            predicate: None,
        }
    }

    pub fn unique<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unique: true,
            ..Self::new(columns)
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn partial(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// The index name, explicit or derived from the table and columns.
    ///
    /// ```
    /// use quickmodel_core::IndexSpec;
    ///
    /// assert_eq!(IndexSpec::new(["a", "b"]).resolved_name("t"), "idx_t_a_b");
    /// assert_eq!(IndexSpec::unique(["a"]).resolved_name("t"), "idx_unique_t_a");
    /// ```
    pub fn resolved_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "idx{}_{}_{}",
                if self.unique { "_unique" } else { "" },
                table,
                self.columns.join("_")
            ),
        }
    }
}

/// Declarative description of one table.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    name: String,
    fields: Vec<(String, FieldSpec)>,
    indexes: Vec<IndexSpec>,
    triggers: Vec<String>,
    closed: bool,
    read_only: bool,
}

impl ModelSpec {
    /// Starts a closed model declaration for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
            triggers: Vec::new(),
            closed: true,
            read_only: false,
        }
    }

    /// An open model whose fields were read back from the database.
    pub fn introspected(name: impl Into<String>, fields: Vec<(String, FieldSpec)>) -> Self {
        Self {
            fields,
            closed: false,
            ..Self::new(name)
        }
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a `CREATE TRIGGER` statement, recreated verbatim on migration.
    pub fn trigger(mut self, sql: impl Into<String>) -> Self {
        self.triggers.push(sql.into());
        self
    }

    /// Marks the model read-only (views).
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Injects the default primary key if needed and validates the
    /// definition against the models already registered.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DefinitionError`](crate::ModelError::DefinitionError)
    /// for invalid names, duplicate fields, several primary keys, dangling
    /// foreign keys, or indexes on undeclared columns.
    pub fn prepare(mut self, registry: &ModelRegistry) -> Result<Self> {
        if self.closed && self.primary_key().is_none() && self.find_field(DEFAULT_PRIMARY_KEY).is_none()
        {
            self.fields
                .insert(0, (DEFAULT_PRIMARY_KEY.to_string(), FieldSpec::primary_key()));
        }
        validate_model(&self, registry)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[(String, FieldSpec)] {
        &self.fields
    }

    /// Looks up a field by exact name, falling back to a case-insensitive match.
    ///
    /// Returns the declared spelling of the name alongside the spec.
    pub fn find_field(&self, name: &str) -> Option<(&str, &FieldSpec)> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| self.fields.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)))
            .map(|(n, spec)| (n.as_str(), spec))
    }

    /// Resolves a column referenced by a filter, an ordering, or a write.
    ///
    /// Declared fields resolve to their declared spelling and spec. Unknown
    /// names fail on closed models and pass through (as validated
    /// identifiers without metadata) on open ones.
    ///
    /// # Errors
    ///
    /// [`ModelError::UnknownField`] for unknown names on closed models,
    /// [`ModelError::ComputedField`] for calculated fields.
    pub fn resolve_column(&self, name: &str) -> Result<(String, Option<&FieldSpec>)> {
        match self.find_field(name) {
            Some((declared, spec)) if spec.is_computed() => {
                Err(ModelError::ComputedField(declared.to_string()))
            }
            Some((declared, spec)) => Ok((declared.to_string(), Some(spec))),
            None if self.closed => Err(ModelError::unknown_field(&self.name, name)),
            None => {
                crate::validate::validate_identifier(name)?;
                Ok((name.to_string(), None))
            }
        }
    }

    /// Fields that are stored in the table (everything but calculated fields).
    pub fn stored_fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields
            .iter()
            .filter(|(_, spec)| !spec.is_computed())
            .map(|(n, spec)| (n.as_str(), spec))
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    /// Whether unknown field names are rejected.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Name of the primary key column, if any.
    pub fn primary_key(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|(_, spec)| spec.is_primary_key())
            .map(|(n, _)| n.as_str())
    }
}

/// Table-name → model lookup owned by one database session.
///
/// Names compare case-insensitively. Registering a name again replaces the
/// previous entry.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<ModelSpec>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a model and returns the shared handle.
    pub fn register(&mut self, model: ModelSpec) -> Arc<ModelSpec> {
        let model = Arc::new(model);
        self.models
            .insert(model.name().to_ascii_lowercase(), Arc::clone(&model));
        model
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelSpec>> {
        self.models.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<ModelSpec>> {
        self.models.remove(&name.to_ascii_lowercase())
    }

    /// Registered model names, as declared.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.values().map(|m| m.name())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    #[test]
    fn test_primary_key_injected_first() {
        let model = ModelSpec::new("person")
            .field("name", FieldSpec::string())
            .prepare(&ModelRegistry::new())
            .unwrap();
        assert_eq!(model.fields()[0].0, "id");
        assert_eq!(model.fields()[0].1.field_type(), &FieldType::PrimaryKey);
        assert_eq!(model.primary_key(), Some("id"));
    }

    #[test]
    fn test_declared_primary_key_kept() {
        let model = ModelSpec::new("tag")
            .field("tag_id", FieldSpec::primary_key())
            .field("label", FieldSpec::string())
            .prepare(&ModelRegistry::new())
            .unwrap();
        assert_eq!(model.fields().len(), 2);
        assert_eq!(model.primary_key(), Some("tag_id"));
    }

    #[test]
    fn test_introspected_model_is_open_and_not_injected() {
        let model = ModelSpec::introspected("v", vec![("total".into(), FieldSpec::integer())])
            .prepare(&ModelRegistry::new())
            .unwrap();
        assert!(!model.is_closed());
        assert_eq!(model.fields().len(), 1);
        assert!(model.primary_key().is_none());
    }

    #[test]
    fn test_field_lookup_case_insensitive_fallback() {
        let model = ModelSpec::new("t")
            .field("Name", FieldSpec::string())
            .field("age", FieldSpec::integer());
        assert_eq!(model.find_field("Name").map(|(n, _)| n), Some("Name"));
        assert_eq!(model.find_field("NAME").map(|(n, _)| n), Some("Name"));
        assert!(model.find_field("height").is_none());
    }

    #[test]
    fn test_resolve_column() {
        let closed = ModelSpec::new("t").field("Age", FieldSpec::integer());
        assert_eq!(closed.resolve_column("age").unwrap().0, "Age");
        assert!(matches!(
            closed.resolve_column("height"),
            Err(ModelError::UnknownField { .. })
        ));

        let open = ModelSpec::introspected("v", Vec::new());
        let (name, spec) = open.resolve_column("total").unwrap();
        assert_eq!(name, "total");
        assert!(spec.is_none());
        assert!(open.resolve_column("total; --").is_err());
    }

    #[test]
    fn test_stored_fields_skip_calculated() {
        let model = ModelSpec::new("t")
            .field("a", FieldSpec::integer())
            .field("b", FieldSpec::calculated(|_| crate::Value::Null));
        let stored: Vec<_> = model.stored_fields().map(|(n, _)| n).collect();
        assert_eq!(stored, vec!["a"]);
    }

    #[test]
    fn test_registry_overwrites_case_insensitively() {
        let mut registry = ModelRegistry::new();
        registry.register(ModelSpec::new("Person").field("a", FieldSpec::integer()));
        registry.register(ModelSpec::new("person").field("b", FieldSpec::integer()));
        assert_eq!(registry.len(), 1);
        let model = registry.get("PERSON").unwrap();
        assert!(model.find_field("b").is_some());
        assert!(model.find_field("a").is_none());
    }

    #[test]
    fn test_index_partial_and_named() {
        let index = IndexSpec::unique(["email"])
            .named("person_email")
            .partial("email IS NOT NULL");
        assert_eq!(index.resolved_name("person"), "person_email");
        assert_eq!(index.predicate.as_deref(), Some("email IS NOT NULL"));
    }
}
