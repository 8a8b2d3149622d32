//! Custom error types for the common library
//!
//! This module defines the database error taxonomy used by every repository
//! in the workspace.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {source}")]
    UniqueViolation {
        constraint: Option<String>,
        #[source]
        source: SqlxError,
    },

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    /// Classify a query failure, separating integrity violations from the rest.
    pub fn from_query(error: SqlxError) -> Self {
        let unique = error
            .as_database_error()
            .filter(|db| db.is_unique_violation())
            .map(|db| db.constraint().map(str::to_owned));

        match unique {
            Some(constraint) => DatabaseError::UniqueViolation {
                constraint,
                source: error,
            },
            None => DatabaseError::Query(error),
        }
    }

    /// True when the error is a uniqueness violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DatabaseError::UniqueViolation { .. })
    }
}

impl From<SqlxError> for DatabaseError {
    fn from(error: SqlxError) -> Self {
        DatabaseError::from_query(error)
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_is_a_plain_query_error() {
        let err = DatabaseError::from_query(SqlxError::RowNotFound);
        assert!(matches!(err, DatabaseError::Query(SqlxError::RowNotFound)));
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn migration_error_message() {
        let err = DatabaseError::Migration("checksum mismatch".to_string());
        assert_eq!(err.to_string(), "Database migration error: checksum mismatch");
    }
}
