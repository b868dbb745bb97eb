use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use loomledger_core::{ExpectedVersion, ItemId};
use loomledger_inventory::{Allocation, ItemKind, StockItem};

use super::r#trait::{LedgerStore, StoreError};

/// In-memory ledger store.
///
/// Intended for tests/dev. Writes compute the next item value outside the
/// map and swap it in under the write lock, so readers never observe a
/// half-applied change.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    items: RwLock<BTreeMap<ItemId, StockItem>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(
        &self,
        item_id: &ItemId,
        expected_version: ExpectedVersion,
        change: impl FnOnce(&StockItem) -> Result<StockItem, StoreError>,
    ) -> Result<StockItem, StoreError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        let current = items
            .get(item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.clone()))?;
        expected_version.check(current.version())?;

        let next = change(current)?;
        items.insert(item_id.clone(), next.clone());
        Ok(next)
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get(&self, item_id: &ItemId) -> Result<StockItem, StoreError> {
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        items
            .get(item_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(item_id.clone()))
    }

    fn create(&self, item: StockItem) -> Result<StockItem, StoreError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        if items.contains_key(item.id()) {
            return Err(StoreError::DuplicateId(item.id().clone()));
        }
        items.insert(item.id().clone(), item.clone());
        Ok(item)
    }

    fn apply_delta(
        &self,
        item_id: &ItemId,
        delta: Decimal,
        expected_version: ExpectedVersion,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError> {
        self.update(item_id, expected_version, |current| {
            Ok(current.with_delta(delta, at)?)
        })
    }

    fn set_allocation(
        &self,
        item_id: &ItemId,
        allocation: Allocation,
        expected_version: ExpectedVersion,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError> {
        self.update(item_id, expected_version, |current| {
            Ok(current.with_allocation(allocation, at)?)
        })
    }

    fn remove(&self, item_id: &ItemId, expected_version: ExpectedVersion) -> Result<(), StoreError> {
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        let current = items
            .get(item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.clone()))?;
        expected_version.check(current.version())?;
        items.remove(item_id);
        Ok(())
    }

    fn list(&self, kind: Option<ItemKind>) -> Result<Vec<StockItem>, StoreError> {
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(items
            .values()
            .filter(|i| kind.is_none_or(|k| i.kind() == k))
            .cloned()
            .collect())
    }
}
