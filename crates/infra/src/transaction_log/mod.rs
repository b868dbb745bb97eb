//! Append-only transaction log boundary.
//!
//! Every committed quantity change is recorded here exactly once, with its
//! before/after values. Entries are never edited; the only deletion is a
//! wholesale `clear`.

pub mod in_memory;

use std::sync::Arc;

use uuid::Uuid;

use loomledger_core::{IdempotencyKey, ItemId, TransactionId};
use loomledger_inventory::{LedgerTransaction, NewTransaction};

pub use crate::ledger_store::StoreError;
pub use in_memory::InMemoryTransactionLog;

/// Append-only, ordered record of quantity mutations.
///
/// Implementations must:
/// - assign strictly increasing `TransactionId`s and never reuse one, not even after `clear`
/// - reject entries whose `before + delta != after` with `StoreError::InvalidAppend`
/// - reject a second entry for the same `(item_id, idempotency_key)` pair
/// - make an appended entry visible to `get`/`scan` atomically
pub trait TransactionLog: Send + Sync {
    fn append(&self, tx: NewTransaction) -> Result<LedgerTransaction, StoreError>;

    fn get(&self, id: TransactionId) -> Result<Option<LedgerTransaction>, StoreError>;

    /// Entries written by one multi-step operation, in id order.
    fn find_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<LedgerTransaction>, StoreError>;

    fn find_by_idempotency_key(
        &self,
        item_id: &ItemId,
        key: &IdempotencyKey,
    ) -> Result<Option<LedgerTransaction>, StoreError>;

    /// Every entry in id order.
    fn scan(&self) -> Result<Vec<LedgerTransaction>, StoreError>;

    /// Purge the whole log. Returns the number of entries removed.
    fn clear(&self) -> Result<usize, StoreError>;
}

impl<S> TransactionLog for Arc<S>
where
    S: TransactionLog + ?Sized,
{
    fn append(&self, tx: NewTransaction) -> Result<LedgerTransaction, StoreError> {
        (**self).append(tx)
    }

    fn get(&self, id: TransactionId) -> Result<Option<LedgerTransaction>, StoreError> {
        (**self).get(id)
    }

    fn find_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<LedgerTransaction>, StoreError> {
        (**self).find_by_correlation(correlation_id)
    }

    fn find_by_idempotency_key(
        &self,
        item_id: &ItemId,
        key: &IdempotencyKey,
    ) -> Result<Option<LedgerTransaction>, StoreError> {
        (**self).find_by_idempotency_key(item_id, key)
    }

    fn scan(&self) -> Result<Vec<LedgerTransaction>, StoreError> {
        (**self).scan()
    }

    fn clear(&self) -> Result<usize, StoreError> {
        (**self).clear()
    }
}
