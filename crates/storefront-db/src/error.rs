//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (storefront-engine) ← What the engines understand          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError (in CLI app) ← Serialized for the caller                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use storefront_engine::StoreError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate product code
    /// - Re-using a ticket code
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Optimistic version check failed on a cart.
    #[error("Cart {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: String, expected: i64 },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// JSON column could not be encoded or decoded.
    #[error("Encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: products.code"
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// How the engines see a database failure.
impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::VersionConflict { .. } => StoreError::Conflict(err.to_string()),
            DbError::UniqueViolation { field, value } => StoreError::Duplicate { field, value },
            DbError::PoolExhausted | DbError::ConnectionFailed(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: StoreError = DbError::VersionConflict {
            id: "c-1".into(),
            expected: 3,
        }
        .into();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err: StoreError = DbError::duplicate("code", "MATE").into();
        assert!(matches!(err, StoreError::Duplicate { ref value, .. } if value == "MATE"));

        let err: StoreError = DbError::PoolExhausted.into();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let err: StoreError = DbError::QueryFailed("boom".into()).into();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
