//! # Engine Errors
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  CoreError  (business rule)  ──┐                                 │
//! │                                ├──► EngineError ──► kind()       │
//! │  StoreError (persistence)    ──┘                                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Store implementations translate their backend errors into
//! [`StoreError`]; the engines never see a driver error type.

use storefront_core::{CoreError, ErrorKind, ValidationError};
use thiserror::Error;

// =============================================================================
// Store Error
// =============================================================================

/// Failures reported by a store port.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or exhausted (pool timeout, closed connection).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Optimistic version check failed; someone else wrote first.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate {field}: {value}")]
    Duplicate { field: String, value: String },

    /// Any other backend failure.
    #[error("Store failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Engine Error
// =============================================================================

/// Everything an engine operation can fail with.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl EngineError {
    /// Classifies the error on the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(e) => e.kind(),
            EngineError::Store(StoreError::Conflict(_)) => ErrorKind::Conflict,
            EngineError::Store(StoreError::Duplicate { .. }) => ErrorKind::Validation,
            EngineError::Store(_) => ErrorKind::Store,
        }
    }

    /// Returns the domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(e) => Some(e),
            EngineError::Store(_) => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err: EngineError = StoreError::Conflict("cart c-1".into()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: EngineError = StoreError::Unavailable("pool timed out".into()).into();
        assert_eq!(err.kind(), ErrorKind::Store);

        let err: EngineError = CoreError::EmptyCart("c-1".into()).into();
        assert_eq!(err.kind(), ErrorKind::EmptyCart);
        assert!(err.as_core().is_some());

        let err: EngineError = ValidationError::Required {
            field: "cart_id".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_transparent_messages() {
        let err: EngineError = CoreError::CartNotFound("c-9".into()).into();
        assert_eq!(err.to_string(), "Cart not found: c-9");
    }
}
