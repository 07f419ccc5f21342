//! Error taxonomy surfaced by the engine services.

use thiserror::Error;

use wms_core::DomainError;

use crate::store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// Logical failures (not found, insufficient stock, lifecycle violations) are
/// reported as-is and never retried. `TransactionConflict` is the only
/// transient kind: the engine retries it a bounded number of times and only
/// surfaces it once the budget is spent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient available stock: requested {requested}, available {available}")]
    InsufficientAvailable { available: i64, requested: i64 },

    #[error("insufficient stock: on-hand {on_hand}, delta {delta}")]
    InsufficientStock { on_hand: i64, delta: i64 },

    #[error("reservation expired")]
    ReservationExpired,

    #[error("reservation not active (status: {0})")]
    ReservationNotActive(String),

    #[error("transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("storage failure: {0}")]
    Store(String),
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable snake_case identifier, used in order rejections and API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::InsufficientAvailable { .. } => "insufficient_available",
            EngineError::InsufficientStock { .. } => "insufficient_stock",
            EngineError::ReservationExpired => "reservation_expired",
            EngineError::ReservationNotActive(_) => "reservation_not_active",
            EngineError::TransactionConflict(_) => "transaction_conflict",
            EngineError::Validation(_) => "validation_error",
            EngineError::InvariantViolation(_) => "invariant_violation",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Store(_) => "store_error",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::TransactionConflict(_))
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvariantViolation(msg) => Self::InvariantViolation(msg),
            DomainError::NotFound(what) => Self::NotFound(what),
            DomainError::Conflict(msg) => Self::AlreadyExists(msg),
            DomainError::InsufficientStock { on_hand, delta } => {
                Self::InsufficientStock { on_hand, delta }
            }
            DomainError::InsufficientAvailable {
                available,
                requested,
            } => Self::InsufficientAvailable {
                available,
                requested,
            },
            DomainError::ReservationExpired => Self::ReservationExpired,
            DomainError::ReservationNotActive(status) => Self::ReservationNotActive(status),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::TransactionConflict(msg),
            StoreError::Duplicate(msg) => Self::AlreadyExists(msg),
            StoreError::InvalidWrite(msg) => Self::InvariantViolation(msg),
            other => Self::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_transient() {
        assert!(EngineError::TransactionConflict("busy".into()).is_transient());
        assert!(!EngineError::ReservationExpired.is_transient());
        assert!(!EngineError::Store("disk".into()).is_transient());
    }

    #[test]
    fn store_errors_map_to_engine_kinds() {
        assert_eq!(
            EngineError::from(StoreError::Conflict("rev".into())).code(),
            "transaction_conflict"
        );
        assert_eq!(
            EngineError::from(StoreError::Duplicate("sku".into())).code(),
            "already_exists"
        );
        assert_eq!(
            EngineError::from(StoreError::Backend("io".into())).code(),
            "store_error"
        );
    }

    #[test]
    fn domain_errors_keep_their_payload() {
        match EngineError::from(DomainError::InsufficientAvailable {
            available: 3,
            requested: 5,
        }) {
            EngineError::InsufficientAvailable {
                available: 3,
                requested: 5,
            } => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            EngineError::from(DomainError::invalid_id("bad uuid")).code(),
            "validation_error"
        );
    }
}
