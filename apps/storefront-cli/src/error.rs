//! # API Error Type
//!
//! What a caller receives when a command fails.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  {"id": 7, "command": "purchase", "cartId": "..."}                      │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  CheckoutEngine::purchase ── EngineError::Core(NoPurchasableItems) ──┐  │
//! │                                                                      │  │
//! │  ApiError { code: NO_PURCHASABLE_ITEMS, message, failed: [...] } ◄───┘  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  {"id": 7, "ok": false, "error": {"code": "NO_PURCHASABLE_ITEMS", ...}} │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Store failures are logged in full and reported with a generic message.

use serde::Serialize;
use storefront_core::{CoreError, ErrorKind, FailedLine};
use storefront_db::DbError;
use storefront_engine::{EngineError, StoreError};

use crate::config::ConfigError;

/// Error returned for a failed command.
///
/// ```json
/// {
///   "code": "INSUFFICIENT_STOCK",
///   "message": "Insufficient stock for p-1: 2 available, 5 requested"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Lines that could not be bought, on `NO_PURCHASABLE_ITEMS`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<FailedLine>>,
}

/// Error codes for command responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input shape or value rejected
    ValidationError,

    /// Cart, product or ticket missing
    NotFound,

    /// A line asks for more than is in stock
    InsufficientStock,

    /// Checkout of a cart without lines
    EmptyCart,

    /// Checkout where every line failed
    NoPurchasableItems,

    /// Admin-only command without the admin token
    Forbidden,

    /// Cart changed underneath the command; retry
    Conflict,

    /// Storage failed
    DatabaseError,

    /// The line was not a valid command
    BadRequest,

    /// Startup configuration is invalid
    ConfigError,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => ErrorCode::ValidationError,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::InsufficientStock => ErrorCode::InsufficientStock,
            ErrorKind::EmptyCart => ErrorCode::EmptyCart,
            ErrorKind::NoPurchasableItems => ErrorCode::NoPurchasableItems,
            ErrorKind::Forbidden => ErrorCode::Forbidden,
            ErrorKind::Conflict => ErrorCode::Conflict,
            ErrorKind::Store => ErrorCode::DatabaseError,
        }
    }
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
            failed: None,
        }
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::BadRequest, message)
    }
}

/// Converts engine errors to API errors.
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let code = ErrorCode::from(err.kind());

        match err {
            EngineError::Core(CoreError::NoPurchasableItems { cart_id, failed }) => ApiError {
                code,
                message: format!("Nothing in cart {} could be purchased", cart_id),
                failed: Some(failed),
            },
            EngineError::Core(e) => ApiError::new(code, e.to_string()),
            EngineError::Store(StoreError::Conflict(e)) => {
                tracing::warn!("Store conflict: {}", e);
                ApiError::new(code, "Cart was modified concurrently, please retry")
            }
            EngineError::Store(StoreError::Duplicate { field, value }) => {
                ApiError::new(code, format!("{} '{}' already exists", field, value))
            }
            EngineError::Store(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Store operation failed: {}", e);
                ApiError::new(code, "Database operation failed")
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        EngineError::Core(err).into()
    }
}

/// Direct repository calls (ticket lookups) go through the same mapping.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        EngineError::Store(err.into()).into()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid command: {}", err))
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(ErrorCode::ConfigError, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::FailureReason;

    #[test]
    fn test_no_purchasable_items_carries_failed_lines() {
        let err: ApiError = EngineError::Core(CoreError::NoPurchasableItems {
            cart_id: "c-1".into(),
            failed: vec![FailedLine {
                product_id: "p-1".into(),
                quantity: 2,
                reason: FailureReason::InsufficientStock { available: 0 },
            }],
        })
        .into();

        assert_eq!(err.code, ErrorCode::NoPurchasableItems);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NO_PURCHASABLE_ITEMS");
        assert_eq!(json["failed"][0]["productId"], "p-1");
    }

    #[test]
    fn test_store_details_are_hidden() {
        let err: ApiError = DbError::QueryFailed("disk I/O error at page 42".into()).into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("page 42"));

        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("failed").is_none());
    }

    #[test]
    fn test_codes_follow_kinds() {
        let err: ApiError = CoreError::CartNotFound("c-9".into()).into();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err: ApiError = CoreError::forbidden("create_product").into();
        assert_eq!(err.code, ErrorCode::Forbidden);

        let err: ApiError = DbError::VersionConflict {
            id: "c-1".into(),
            expected: 2,
        }
        .into();
        assert_eq!(err.code, ErrorCode::Conflict);
    }
}
