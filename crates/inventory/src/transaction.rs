use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use loomledger_core::{ActorId, DomainError, DomainResult, IdempotencyKey, ItemId, TransactionId};

use crate::item::{ItemKind, StockItem};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    StockIn,
    StockOut,
    Adjustment,
    Transfer,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 4] = [
        TransactionKind::StockIn,
        TransactionKind::StockOut,
        TransactionKind::Adjustment,
        TransactionKind::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::StockIn => "stock_in",
            TransactionKind::StockOut => "stock_out",
            TransactionKind::Adjustment => "adjustment",
            TransactionKind::Transfer => "transfer",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stock_in" => Ok(TransactionKind::StockIn),
            "stock_out" => Ok(TransactionKind::StockOut),
            "adjustment" => Ok(TransactionKind::Adjustment),
            "transfer" => Ok(TransactionKind::Transfer),
            other => Err(DomainError::validation(format!("unknown transaction kind '{other}'"))),
        }
    }
}

/// A quantity change ready to be appended to the log (no id yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub timestamp: DateTime<Utc>,
    pub item_id: ItemId,
    pub item_kind: ItemKind,
    pub kind: TransactionKind,
    pub quantity_delta: Decimal,
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
    pub actor: ActorId,
    pub reason: String,
    pub idempotency_key: Option<IdempotencyKey>,
    /// Groups the entries written by one multi-step operation.
    pub correlation_id: Uuid,
}

impl NewTransaction {
    /// Describe the change between two states of the same item.
    pub fn between(
        before: &StockItem,
        after: &StockItem,
        kind: TransactionKind,
        actor: ActorId,
        reason: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            item_id: after.id().clone(),
            item_kind: after.kind(),
            kind,
            quantity_delta: after.quantity() - before.quantity(),
            quantity_before: before.quantity(),
            quantity_after: after.quantity(),
            actor,
            reason,
            idempotency_key: None,
            correlation_id: Uuid::now_v7(),
        }
    }

    pub fn with_idempotency_key(mut self, key: Option<IdempotencyKey>) -> Self {
        self.idempotency_key = key;
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// `after == before + delta`, delta non-zero, nothing negative.
    pub fn verify(&self) -> DomainResult<()> {
        check_arithmetic(self.quantity_before, self.quantity_delta, self.quantity_after)
    }
}

/// Immutable record of one committed quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub item_id: ItemId,
    pub item_kind: ItemKind,
    pub kind: TransactionKind,
    pub quantity_delta: Decimal,
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
    pub actor: ActorId,
    pub reason: String,
    pub idempotency_key: Option<IdempotencyKey>,
    pub correlation_id: Uuid,
}

impl LedgerTransaction {
    /// Seal an uncommitted entry with the id assigned by the log.
    pub fn commit(id: TransactionId, tx: NewTransaction) -> Self {
        Self {
            id,
            timestamp: tx.timestamp,
            item_id: tx.item_id,
            item_kind: tx.item_kind,
            kind: tx.kind,
            quantity_delta: tx.quantity_delta,
            quantity_before: tx.quantity_before,
            quantity_after: tx.quantity_after,
            actor: tx.actor,
            reason: tx.reason,
            idempotency_key: tx.idempotency_key,
            correlation_id: tx.correlation_id,
        }
    }

    pub fn verify(&self) -> DomainResult<()> {
        check_arithmetic(self.quantity_before, self.quantity_delta, self.quantity_after)
    }

    /// The ledger and the log agree when the entry's `after` equals the item's quantity.
    pub fn matches_item(&self, item: &StockItem) -> bool {
        self.item_id == *item.id() && self.quantity_after == item.quantity()
    }
}

fn check_arithmetic(before: Decimal, delta: Decimal, after: Decimal) -> DomainResult<()> {
    if delta.is_zero() {
        return Err(DomainError::invariant("transaction delta cannot be zero"));
    }
    if before < Decimal::ZERO || after < Decimal::ZERO {
        return Err(DomainError::invariant("transaction quantities cannot be negative"));
    }
    if before + delta != after {
        return Err(DomainError::invariant(format!(
            "transaction arithmetic mismatch: {before} + {delta} != {after}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{NewStockItem, Unit};
    use rust_decimal_macros::dec;

    fn item(quantity: Decimal) -> StockItem {
        let draft = NewStockItem::new(ItemKind::Fabric, "Linen", Unit::Meters).with_quantity(quantity);
        StockItem::open(ItemId::new("FAB-9").unwrap(), &draft, Utc::now()).unwrap()
    }

    #[test]
    fn between_records_before_after_and_delta() {
        let before = item(dec!(30));
        let after = before.with_delta(dec!(-12.5), Utc::now()).unwrap();
        let tx = NewTransaction::between(
            &before,
            &after,
            TransactionKind::StockOut,
            ActorId::new("emp1").unwrap(),
            "cutting".to_string(),
            Utc::now(),
        );

        assert_eq!(tx.quantity_before, dec!(30));
        assert_eq!(tx.quantity_after, dec!(17.5));
        assert_eq!(tx.quantity_delta, dec!(-12.5));
        assert!(tx.verify().is_ok());

        let committed = LedgerTransaction::commit(TransactionId::new(1), tx);
        assert!(committed.matches_item(&after));
        assert!(!committed.matches_item(&before));
    }

    #[test]
    fn verify_rejects_mismatched_arithmetic() {
        let before = item(dec!(30));
        let after = before.with_delta(dec!(5), Utc::now()).unwrap();
        let mut tx = NewTransaction::between(
            &before,
            &after,
            TransactionKind::StockIn,
            ActorId::new("emp1").unwrap(),
            "delivery".to_string(),
            Utc::now(),
        );
        tx.quantity_after = dec!(36);
        assert!(matches!(tx.verify(), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn kinds_parse_from_wire_names() {
        for kind in TransactionKind::ALL {
            assert_eq!(kind.as_str().parse::<TransactionKind>().unwrap(), kind);
        }
    }
}
