//! Storage-independent model layer for QuickModel.
//!
//! This crate defines everything that does not touch a connection:
//!
//! - [`FieldSpec`] / [`FieldType`]: declarative column definitions.
//! - [`ModelSpec`] / [`IndexSpec`]: table definitions with indexes and
//!   triggers, collected in a session-owned [`ModelRegistry`].
//! - [`Record`]: a row bound to one model, with lazily computed fields.
//! - [`coerce`]: encoding of [`Value`]s into SQLite storage values
//!   ([`SqlValue`]) and back.
//! - [`Condition`] / [`compile`]: the filter DSL and its compiler to
//!   parameterized [`Predicate`]s.
//!
//! # Example
//!
//! ```
//! use quickmodel_core::*;
//!
//! let mut registry = ModelRegistry::new();
//! let person = ModelSpec::new("person")
//!     .field("name", FieldSpec::string().not_null())
//!     .field("age", FieldSpec::integer())
//!     .prepare(&registry)
//!     .unwrap();
//! let person = registry.register(person);
//!
//! let filter = Condition::from_json(&serde_json::json!({
//!     "age": {"gte": 18},
//!     "name": {"startsWith": "A"}
//! }))
//! .unwrap();
//! let predicate = compile(&filter, &person).unwrap();
//! assert_eq!(predicate.sql, "((age >= ?) AND (name LIKE ?))");
//! ```

pub mod coerce;
mod error;
mod filter;
mod model;
mod record;
mod types;
mod validate;
mod value;

pub use error::{ModelError, Result};
pub use filter::{Condition, FieldCondition, Operand, Operator, Predicate, compile};
pub use model::{DEFAULT_PRIMARY_KEY, IndexSpec, ModelRegistry, ModelSpec};
pub use record::Record;
pub use types::{Computed, FieldSpec, FieldType, Reference};
pub use validate::validate_identifier;
pub use value::{SqlValue, Value};
