//! SQLite session layer for QuickModel.
//!
//! A [`Database`] owns one connection and the registry of declared models.
//! Declaring a model while the session is migrating synchronizes the live
//! table with the declaration: missing tables are created, changed tables
//! are rebuilt with their rows carried over, and indexes and triggers are
//! recreated when their DDL differs.
//!
//! # Modules
//!
//! - **`session`**: connection lifecycle, version tracking, transactions
//! - **`migration`**: per-table schema synchronization and pruning
//! - **`schema`**: canonical DDL generation
//! - **`introspect`**: reading the live schema back
//! - **`query`**: [`Model`] handles and the [`Query`] builder
//! - **`convert`**: binding values and materializing rows
//! - **`config`**: YAML session configuration
//!
//! # Quick start
//!
//! ```
//! use quickmodel_core::{Condition, FieldSpec, ModelSpec, Value};
//! use quickmodel_sqlite::Database;
//!
//! let db = Database::open_in_memory("1.0").unwrap();
//! let person = db
//!     .define_model(
//!         ModelSpec::new("person")
//!             .field("name", FieldSpec::string().not_null())
//!             .field("age", FieldSpec::integer()),
//!     )
//!     .unwrap();
//! db.confirm_migration().unwrap();
//!
//! let ann = person
//!     .create([("name", Value::from("Ann")), ("age", Value::from(31))])
//!     .unwrap();
//! let found = person.filter_one(Condition::eq("name", "Ann")).unwrap().unwrap();
//! assert_eq!(found.id(), ann.id());
//! ```

mod config;
mod convert;
mod error;
mod introspect;
mod migration;
mod query;
mod schema;
mod session;

pub use config::{DatabaseConfig, IN_MEMORY};
pub use error::{Result, SqliteError};
pub use migration::SyncReport;
pub use query::{Model, Query};
pub use session::{Database, META_VERSION, ResultSet, SessionState, VERSION_TABLE, VersionRecord};
