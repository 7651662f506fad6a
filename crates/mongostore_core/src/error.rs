//! Error types for mongostore core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building or translating entities and queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Identity string is not a valid 24-character hex object id.
    #[error("invalid entity id: {value:?}")]
    InvalidId {
        /// The rejected identity value.
        value: String,
    },

    /// Identity of a persisted entity cannot be replaced.
    #[error("entity id is immutable: {current} cannot become {attempted}")]
    IdentityChanged {
        /// Identity already assigned.
        current: String,
        /// Identity that was rejected.
        attempted: String,
    },

    /// Query shape is not understood.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// Value could not be converted between entity and document form.
    #[error("cannot convert field {field:?}: {message}")]
    Conversion {
        /// Field being converted.
        field: String,
        /// Description of the failure.
        message: String,
    },

    /// Entity kind string is malformed.
    #[error("invalid entity kind: {value:?}")]
    InvalidKind {
        /// The rejected kind string.
        value: String,
    },
}

impl CoreError {
    /// Creates an invalid id error.
    pub fn invalid_id(value: impl Into<String>) -> Self {
        Self::InvalidId {
            value: value.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a conversion error.
    pub fn conversion(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::invalid_id("xyz");
        assert_eq!(err.to_string(), "invalid entity id: \"xyz\"");

        let err = CoreError::conversion("age", "not a document");
        assert!(err.to_string().contains("age"));
        assert!(err.to_string().contains("not a document"));
    }
}
