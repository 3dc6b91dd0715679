//! Unified error taxonomy for the submission and moderation pipeline.
//!
//! Validation and authorization failures are raised before any write happens.
//! Storage failures surface as [`Error::Database`] and abort the enclosing transaction.

use thiserror::Error;

/// All errors produced by the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete input
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// What was wrong with the input
        message: String,
    },

    /// Unknown id or slug
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of record that was looked up (e.g. `"show"`)
        entity: &'static str,
        /// The id or slug that did not match
        key: String,
    },

    /// No identity was supplied with the request
    #[error("Authentication required")]
    Unauthorized,

    /// Identity is known but lacks ownership or admin rights
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Why access was refused
        message: String,
    },

    /// Request conflicts with current state (duplicate pending edit, duplicate event, ...)
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting state
        message: String,
    },

    /// A lifecycle action is not legal from the show's current status
    #[error("Cannot {action} a show that is {from}")]
    InvalidTransition {
        /// Current status of the show
        from: String,
        /// Requested action
        action: String,
    },

    /// Markdown input could not be parsed
    #[error("Parse failure: {message}")]
    ParseFailure {
        /// Parser diagnostic
        message: String,
    },

    /// Storage failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Configuration loading or validation error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// I/O error (reading import files, config)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::ValidationFailed`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Forbidden`] with the given message.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Conflict`] with the given message.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Whether this error belongs to the Conflict class (illegal transitions included).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::InvalidTransition { .. })
    }

    /// Whether the underlying storage error is a uniqueness violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(err) => is_unique_violation(err),
            _ => false,
        }
    }
}

/// Returns true when a `DbErr` was caused by a UNIQUE constraint.
pub(crate) fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
