//! Field type definitions.
//!
//! A [`FieldSpec`] declares one column: its logical [`FieldType`] plus the
//! constraints that end up in the generated `CREATE TABLE` text. Field specs
//! are built with the per-type constructors and refined with the chained
//! builder methods.
//!
//! # Examples
//!
//! ```
//! use quickmodel_core::{FieldSpec, FieldType};
//!
//! let name = FieldSpec::string().not_null().unique();
//! assert_eq!(name.field_type(), &FieldType::String);
//! assert!(!name.is_nullable());
//!
//! let owner = FieldSpec::foreign_key("person");
//! assert_eq!(owner.reference().unwrap().table, "person");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::record::Record;
use crate::value::Value;

/// Logical type of a declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Real,
    Numeric,
    Date,
    Time,
    DateTime,
    Boolean,
    Blob,
    /// Structured data (arrays, objects) stored as JSON text.
    Json,
    /// Auto-assigned integer primary key.
    PrimaryKey,
    /// Integer column referencing another table's key.
    ForeignKey,
    /// Derived from the record on read, never stored.
    Calculated,
    /// Any other native type token, used verbatim in DDL.
    Custom(String),
}

impl FieldType {
    /// The native SQLite type token written into `CREATE TABLE`.
    pub fn native_token(&self) -> &str {
        match self {
            FieldType::String => "TEXT",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Real => "REAL",
            FieldType::Numeric => "NUMERIC",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::DateTime => "DATETIME",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Blob => "BLOB",
            FieldType::Json => "JSON",
            FieldType::PrimaryKey => "INTEGER",
            FieldType::ForeignKey => "INTEGER",
            FieldType::Calculated => "",
            FieldType::Custom(raw) => raw,
        }
    }

    /// Maps a declared type token read back from the database to a field type.
    ///
    /// Unrecognized tokens (including the empty token SQLite reports for
    /// view expressions) become [`FieldType::Custom`], which decodes as a
    /// pass-through.
    pub fn from_native(token: &str) -> FieldType {
        match token.trim().to_ascii_uppercase().as_str() {
            "TEXT" => FieldType::String,
            "INTEGER" => FieldType::Integer,
            "FLOAT" => FieldType::Float,
            "REAL" => FieldType::Real,
            "NUMERIC" => FieldType::Numeric,
            "DATE" => FieldType::Date,
            "TIME" => FieldType::Time,
            "DATETIME" => FieldType::DateTime,
            "BOOLEAN" => FieldType::Boolean,
            "BLOB" => FieldType::Blob,
            "JSON" => FieldType::Json,
            _ => FieldType::Custom(token.trim().to_string()),
        }
    }

    /// Whether values are stored as SQLite integers.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::PrimaryKey | FieldType::ForeignKey
        )
    }
}

/// Target of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub table: String,
    pub field: String,
}

type ComputeFn = dyn Fn(&Record) -> Value + Send + Sync;

/// Lazily evaluated value of a calculated field.
///
/// The function runs every time the field is read; results are not cached.
#[derive(Clone)]
pub struct Computed(Arc<ComputeFn>);

impl Computed {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Computed(Arc::new(f))
    }

    pub fn evaluate(&self, record: &Record) -> Value {
        (self.0)(record)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Computed(..)")
    }
}

/// Declarative description of one column.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    field_type: FieldType,
    nullable: bool,
    unique: bool,
    default: Option<Value>,
    references: Option<Reference>,
    compute: Option<Computed>,
}

impl FieldSpec {
    /// A nullable, non-unique field of the given type.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: true,
            unique: false,
            default: None,
            references: None,
            compute: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn float() -> Self {
        Self::new(FieldType::Float)
    }

    pub fn real() -> Self {
        Self::new(FieldType::Real)
    }

    pub fn numeric() -> Self {
        Self::new(FieldType::Numeric)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    pub fn time() -> Self {
        Self::new(FieldType::Time)
    }

    pub fn datetime() -> Self {
        Self::new(FieldType::DateTime)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn blob() -> Self {
        Self::new(FieldType::Blob)
    }

    pub fn json() -> Self {
        Self::new(FieldType::Json)
    }

    pub fn primary_key() -> Self {
        Self::new(FieldType::PrimaryKey)
    }

    /// An integer column referencing `table(id)`.
    pub fn foreign_key(table: impl Into<String>) -> Self {
        Self::new(FieldType::ForeignKey).references(table, "id")
    }

    /// A field computed from the record on every read.
    ///
    /// ```
    /// use quickmodel_core::{FieldSpec, Value};
    ///
    /// let label = FieldSpec::calculated(|record| {
    ///     Value::Text(format!("#{}", record.id().unwrap_or_default()))
    /// });
    /// assert!(label.is_computed());
    /// ```
    pub fn calculated<F>(f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        let mut spec = Self::new(FieldType::Calculated);
        spec.compute = Some(Computed::new(f));
        spec
    }

    pub fn custom(token: impl Into<String>) -> Self {
        Self::new(FieldType::Custom(token.into()))
    }

    /// Adds a `NOT NULL` constraint.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the `DEFAULT` value, rendered as a literal in the column clause.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the referenced table and column of a foreign key.
    pub fn references(mut self, table: impl Into<String>, field: impl Into<String>) -> Self {
        self.references = Some(Reference {
            table: table.into(),
            field: field.into(),
        });
        self
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.references.as_ref()
    }

    pub fn is_primary_key(&self) -> bool {
        self.field_type == FieldType::PrimaryKey
    }

    pub fn is_foreign_key(&self) -> bool {
        self.field_type == FieldType::ForeignKey
    }

    pub fn is_computed(&self) -> bool {
        self.field_type == FieldType::Calculated
    }

    pub fn compute(&self) -> Option<&Computed> {
        self.compute.as_ref()
    }
}
