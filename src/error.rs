//! Marketplace error taxonomy
//!
//! Validation and state errors are returned to the caller as typed results;
//! nothing here is raised past a transaction boundary uncommitted. Only
//! [`MarketError::Transient`] is retryable, and mutating operations must
//! re-read current state before retrying.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::entity::EntityKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("{kind} row {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    /// Status guard failed: a concurrent or stale operation got there first
    #[error("{kind} row {id} is no longer {expected}")]
    Conflict {
        kind: EntityKind,
        id: i64,
        expected: &'static str,
    },

    /// Operation not legal for the row's current status
    #[error("{kind} row {id} is {status}: {reason}")]
    InvalidState {
        kind: EntityKind,
        id: i64,
        status: &'static str,
        reason: &'static str,
    },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("Account cannot buy its own listing")]
    SelfTrade,

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Store unavailable or timed out
    #[error("Transient storage error: {0}")]
    Transient(String),
}

pub type MarketResult<T> = Result<T, MarketError>;

impl MarketError {
    pub fn not_found(kind: EntityKind, id: i64) -> Self {
        MarketError::NotFound { kind, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        MarketError::Validation(msg.into())
    }

    /// Stable machine code for the front-end
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::NotFound { .. } => "NOT_FOUND",
            MarketError::Conflict { .. } => "CONFLICT",
            MarketError::InvalidState { .. } => "INVALID_STATE",
            MarketError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            MarketError::SelfTrade => "SELF_TRADE",
            MarketError::Validation(_) => "VALIDATION_ERROR",
            MarketError::Transient(_) => "TRANSIENT_IO_ERROR",
        }
    }

    /// Only store outages may be retried, and only after re-reading state
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, MarketError::Transient(_))
    }
}

/// Postgres SQLSTATE for `CHECK` violations
const CHECK_VIOLATION: &str = "23514";
/// Postgres SQLSTATE for a value outside a `NUMERIC(p,s)` column
const NUMERIC_OUT_OF_RANGE: &str = "22003";

impl From<sqlx::Error> for MarketError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e
            && matches!(
                db.code().as_deref(),
                Some(CHECK_VIOLATION) | Some(NUMERIC_OUT_OF_RANGE)
            )
        {
            return MarketError::Validation(db.message().to_string());
        }
        MarketError::Transient(e.to_string())
    }
}
