//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, stock rules, reservation lifecycle). Storage and transport
/// failures belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed quantity or empty order).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The aggregate a command targets does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflicting aggregate already exists or a version check failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A ledger entry would drive on-hand below zero.
    #[error("insufficient stock: on-hand {on_hand}, delta {delta}")]
    InsufficientStock { on_hand: i64, delta: i64 },

    /// A hold would claim more than is currently available.
    #[error("insufficient available stock: requested {requested}, available {available}")]
    InsufficientAvailable { available: i64, requested: i64 },

    /// The reservation passed its expiry before it could be committed.
    #[error("reservation expired")]
    ReservationExpired,

    /// The reservation is in a status that does not allow the operation.
    #[error("reservation not active (status: {0})")]
    ReservationNotActive(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn not_active(status: impl core::fmt::Debug) -> Self {
        Self::ReservationNotActive(format!("{status:?}").to_lowercase())
    }
}
