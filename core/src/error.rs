//! Error types for model definition, coercion, and filter compilation.
//!
//! Every fallible operation in this crate returns [`ModelError`]. Storage
//! backends wrap it in their own error type.

use thiserror::Error;

/// Errors raised while defining models, coercing values, or compiling filters.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A model, field, or index definition is invalid.
    #[error("invalid definition: {0}")]
    DefinitionError(String),

    /// A read, write, filter, or ordering referenced a column the model does not declare.
    #[error("unknown field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    /// The filter compiler met an operator key it does not recognize.
    #[error("invalid filter operator: {0}")]
    InvalidOperator(String),

    /// An operator received an operand of the wrong shape.
    #[error("invalid operand for '{operator}': {reason}")]
    InvalidOperand { operator: String, reason: String },

    /// A stored value could not be decoded into the declared field type.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// A computed field was assigned, persisted, or used as a column.
    #[error("field '{0}' is computed and not stored")]
    ComputedField(String),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn unknown_field(model: &str, field: &str) -> Self {
        ModelError::UnknownField {
            model: model.to_string(),
            field: field.to_string(),
        }
    }
}

/// Convenience alias for results with [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;
