//! Core error types for airtime-core.
//!
//! This module defines the error hierarchy using thiserror. Engine callers
//! mostly see [`CoreError::NotFound`] and [`CoreError::InvalidState`]; the
//! storage and configuration layers have their own enums that convert into
//! [`CoreError`] with `?`.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for airtime-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Unknown operator, session or curve id
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Mutation attempted on a session that is no longer active
    #[error("session {session_id} is in an invalid state: {message}")]
    InvalidState { session_id: i64, message: String },

    /// The fitting procedure produced an unusable consumption ratio
    #[error("fit computation failed: {0}")]
    FitComputation(String),

    /// A write would break the one-default / one-personalized-per-operator rule
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

impl CoreError {
    pub fn operator_not_found(id: i64) -> Self {
        CoreError::NotFound {
            entity: "operator",
            id,
        }
    }

    pub fn session_not_found(id: i64) -> Self {
        CoreError::NotFound {
            entity: "session",
            id,
        }
    }

    /// A write against a session that another writer already completed.
    pub fn session_completed(id: i64) -> Self {
        CoreError::InvalidState {
            session_id: id,
            message: "session is already completed".into(),
        }
    }

    pub fn curve_not_found(id: i64) -> Self {
        CoreError::NotFound {
            entity: "calibration curve",
            id,
        }
    }

    /// True for the two errors a request boundary maps to client faults.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, CoreError::NotFound { .. } | CoreError::InvalidState { .. })
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Sequence that must be strictly increasing is not
    #[error("{collection} must be strictly increasing (at index {index})")]
    NotIncreasing { collection: String, index: usize },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity() {
        let err = CoreError::operator_not_found(7);
        assert_eq!(err.to_string(), "operator 7 not found");
        assert!(err.is_caller_error());
    }

    #[test]
    fn busy_sqlite_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(err), DatabaseError::Locked));
    }

    #[test]
    fn fit_errors_are_not_caller_errors() {
        assert!(!CoreError::FitComputation("nan".into()).is_caller_error());
    }
}
