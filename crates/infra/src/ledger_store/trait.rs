use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use loomledger_core::{DomainError, ExpectedVersion, ItemId};
use loomledger_inventory::{Allocation, ItemKind, StockItem};

/// Storage operation error, shared by the ledger store and the transaction log.
///
/// These are **infrastructure errors** (missing rows, unavailable backends,
/// rejected appends). Business rule failures raised while computing a write
/// (insufficient stock, stale version, bad granularity) travel as `Domain`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(ItemId),

    #[error("item already exists: {0}")]
    DuplicateId(ItemId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// The backend could not be reached or did not answer in time. Safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative current state of every stock item.
///
/// ## Design Principles
///
/// - **Single mutation path**: quantity only changes through `apply_delta`;
///   there is no way to assign a quantity directly
/// - **Compare-and-swap**: every write carries an `ExpectedVersion`, so a
///   decision made on a stale read is rejected instead of applied
/// - **Atomic visibility**: readers see either the old or the new item, never
///   a partially written one
/// - **Status is derived**: stores persist quantity, threshold and allocation;
///   status is projected on every read
///
/// Only the stock engine writes to a ledger store. Reporting reads it.
pub trait LedgerStore: Send + Sync {
    /// Load one item. Unknown ids yield `StoreError::NotFound`.
    fn get(&self, item_id: &ItemId) -> Result<StockItem, StoreError>;

    /// Insert a freshly opened item. Existing ids yield `StoreError::DuplicateId`.
    fn create(&self, item: StockItem) -> Result<StockItem, StoreError>;

    /// Add `delta` to an item's quantity.
    ///
    /// Implementations must:
    /// - reject results below zero with `DomainError::InsufficientStock`
    /// - reject a version mismatch with `DomainError::Conflict`
    /// - bump the version by one and stamp `updated_at = at`
    fn apply_delta(
        &self,
        item_id: &ItemId,
        delta: Decimal,
        expected_version: ExpectedVersion,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError>;

    /// Replace an item's allocation (tailor assignment, completion).
    fn set_allocation(
        &self,
        item_id: &ItemId,
        allocation: Allocation,
        expected_version: ExpectedVersion,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError>;

    /// Delete an item that was opened by a failed multi-step operation.
    fn remove(&self, item_id: &ItemId, expected_version: ExpectedVersion) -> Result<(), StoreError>;

    /// All items, optionally of one kind, ordered by id.
    fn list(&self, kind: Option<ItemKind>) -> Result<Vec<StockItem>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn get(&self, item_id: &ItemId) -> Result<StockItem, StoreError> {
        (**self).get(item_id)
    }

    fn create(&self, item: StockItem) -> Result<StockItem, StoreError> {
        (**self).create(item)
    }

    fn apply_delta(
        &self,
        item_id: &ItemId,
        delta: Decimal,
        expected_version: ExpectedVersion,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError> {
        (**self).apply_delta(item_id, delta, expected_version, at)
    }

    fn set_allocation(
        &self,
        item_id: &ItemId,
        allocation: Allocation,
        expected_version: ExpectedVersion,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError> {
        (**self).set_allocation(item_id, allocation, expected_version, at)
    }

    fn remove(&self, item_id: &ItemId, expected_version: ExpectedVersion) -> Result<(), StoreError> {
        (**self).remove(item_id, expected_version)
    }

    fn list(&self, kind: Option<ItemKind>) -> Result<Vec<StockItem>, StoreError> {
        (**self).list(kind)
    }
}
