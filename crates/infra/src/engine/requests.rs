//! Inputs and results of stock engine operations.

use rust_decimal::Decimal;

use loomledger_core::{ActorId, IdempotencyKey, ItemId};
use loomledger_inventory::{CuttingOperation, LedgerTransaction, ManufacturingRun, StockItem};

/// `consume` / `replenish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRequest {
    pub item_id: ItemId,
    pub amount: Decimal,
    pub reason: String,
    pub actor: ActorId,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl StockRequest {
    pub fn new(item_id: ItemId, amount: Decimal, reason: impl Into<String>, actor: ActorId) -> Self {
        Self {
            item_id,
            amount,
            reason: reason.into(),
            actor,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// Physical count correction: signed delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustRequest {
    pub item_id: ItemId,
    pub delta: Decimal,
    pub reason: String,
    pub actor: ActorId,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from_item_id: ItemId,
    pub to_item_id: ItemId,
    pub amount: Decimal,
    pub reason: String,
    pub actor: ActorId,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutRequest {
    pub fabric_id: ItemId,
    pub piece_length: Decimal,
    pub piece_width: Decimal,
    pub piece_count: u32,
    pub actor: ActorId,
    /// Id for the new cut-piece item (e.g. a pre-printed label); generated when absent.
    pub piece_id: Option<ItemId>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufactureRequest {
    pub cut_piece_id: ItemId,
    pub units: u32,
    pub pieces_per_unit: u32,
    pub actor: ActorId,
    pub unit_id: Option<ItemId>,
    pub name: Option<String>,
}

/// Hand an item to a tailor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignRequest {
    pub item_id: ItemId,
    pub tailor: ActorId,
    pub actor: ActorId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteRequest {
    pub item_id: ItemId,
    pub actor: ActorId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutOutcome {
    pub operation: CuttingOperation,
    pub fabric: StockItem,
    pub cut_piece: StockItem,
    pub transaction: LedgerTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufactureOutcome {
    pub run: ManufacturingRun,
    pub cut_piece: StockItem,
    pub unit: StockItem,
    pub transaction: LedgerTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub from: StockItem,
    pub to: StockItem,
    /// Source leg then destination leg. Empty when an idempotent retry was answered.
    pub transactions: Vec<LedgerTransaction>,
}
