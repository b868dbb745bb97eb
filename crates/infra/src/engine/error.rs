use rust_decimal::Decimal;
use thiserror::Error;

use loomledger_core::DomainError;

use crate::engine::locks::LockTimeout;
use crate::ledger_store::StoreError;

/// Failure returned by every stock engine operation.
///
/// ## Error Categories
///
/// - **NotFound / DuplicateId / Validation**: caller mistakes, nothing was written
/// - **InsufficientStock**: an expected business outcome, nothing was written
/// - **TransientFailure**: storage hiccup, lock wait timeout or lost race; nothing
///   was committed and the call is safe to retry (use an idempotency key)
/// - **InvariantViolation**: the ledger and the log disagree; the engine halts
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transient failure: {0}")]
    TransientFailure(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::InsufficientStock { .. } => "insufficient_stock",
            EngineError::DuplicateId(_) => "duplicate_id",
            EngineError::Validation(_) => "validation_error",
            EngineError::TransientFailure(_) => "transient_failure",
            EngineError::InvariantViolation(_) => "invariant_violation",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransientFailure(_))
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvariantViolation(msg),
            DomainError::NotFound => EngineError::NotFound("item not found".to_string()),
            DomainError::DuplicateId(id) => EngineError::DuplicateId(id),
            DomainError::InsufficientStock {
                item_id,
                requested,
                available,
            } => EngineError::InsufficientStock {
                item_id: item_id.to_string(),
                requested,
                available,
            },
            // A stale version means the write was refused; nothing committed.
            DomainError::Conflict(msg) => EngineError::TransientFailure(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => EngineError::NotFound(format!("item {id} not found")),
            StoreError::DuplicateId(id) => EngineError::DuplicateId(id.to_string()),
            StoreError::Domain(e) => EngineError::from(e),
            StoreError::InvalidAppend(msg) => EngineError::InvariantViolation(msg),
            StoreError::Unavailable(msg) => EngineError::TransientFailure(msg),
        }
    }
}

impl From<LockTimeout> for EngineError {
    fn from(value: LockTimeout) -> Self {
        EngineError::TransientFailure(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomledger_core::ItemId;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_stock_keeps_its_numbers() {
        let err = EngineError::from(StoreError::Domain(DomainError::insufficient_stock(
            ItemId::new("FAB-1").unwrap(),
            dec!(20),
            dec!(5),
        )));
        assert_eq!(err.kind(), "insufficient_stock");
        assert!(err.to_string().contains("requested 20, available 5"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn conflicts_and_outages_are_retryable() {
        assert!(EngineError::from(DomainError::conflict("stale")).is_retryable());
        assert!(EngineError::from(StoreError::Unavailable("db down".into())).is_retryable());
    }
}
