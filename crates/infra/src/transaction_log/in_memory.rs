use std::sync::RwLock;

use uuid::Uuid;

use loomledger_core::{IdempotencyKey, ItemId, TransactionId};
use loomledger_inventory::{LedgerTransaction, NewTransaction};

use super::{StoreError, TransactionLog};

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<LedgerTransaction>,
    last_id: u64,
}

/// In-memory append-only transaction log.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryTransactionLog {
    state: RwLock<LogState>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionLog for InMemoryTransactionLog {
    fn append(&self, tx: NewTransaction) -> Result<LedgerTransaction, StoreError> {
        tx.verify()
            .map_err(|e| StoreError::InvalidAppend(e.to_string()))?;

        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        if let Some(key) = &tx.idempotency_key {
            let taken = state
                .entries
                .iter()
                .any(|e| e.item_id == tx.item_id && e.idempotency_key.as_ref() == Some(key));
            if taken {
                return Err(StoreError::InvalidAppend(format!(
                    "idempotency key '{key}' already recorded for {}",
                    tx.item_id
                )));
            }
        }

        state.last_id += 1;
        let committed = LedgerTransaction::commit(TransactionId::new(state.last_id), tx);
        state.entries.push(committed.clone());
        Ok(committed)
    }

    fn get(&self, id: TransactionId) -> Result<Option<LedgerTransaction>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        // Ids are assigned in push order, so the log is sorted by id.
        Ok(state
            .entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|idx| state.entries[idx].clone()))
    }

    fn find_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<LedgerTransaction>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect())
    }

    fn find_by_idempotency_key(
        &self,
        item_id: &ItemId,
        key: &IdempotencyKey,
    ) -> Result<Option<LedgerTransaction>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(state
            .entries
            .iter()
            .find(|e| e.item_id == *item_id && e.idempotency_key.as_ref() == Some(key))
            .cloned())
    }

    fn scan(&self) -> Result<Vec<LedgerTransaction>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(state.entries.clone())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let removed = state.entries.len();
        state.entries.clear();
        Ok(removed)
    }
}
