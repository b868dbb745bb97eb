use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use loomledger_core::{ActorId, DomainResult, IdempotencyKey, ItemId};
use loomledger_infra::engine::{
    AdjustRequest, AssignRequest, CompleteRequest, CutOutcome, CutRequest, ManufactureOutcome,
    ManufactureRequest, StockRequest, TransferOutcome, TransferRequest,
};
use loomledger_infra::reporting::{Pagination, TransactionFilter};
use loomledger_inventory::{NewStockItem, StockItem, text};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub id: Option<String>,
    pub kind: String,
    pub name: String,
    pub unit: String,
    pub quantity: Option<Decimal>,
    pub min_threshold: Option<Decimal>,
    pub actor: String,
}

impl CreateItemRequest {
    pub fn into_draft(self) -> DomainResult<(NewStockItem, ActorId)> {
        let mut draft = NewStockItem::new(self.kind.parse()?, self.name, self.unit.parse()?);
        if let Some(id) = self.id {
            draft = draft.with_id(ItemId::new(id)?);
        }
        if let Some(quantity) = self.quantity {
            draft = draft.with_quantity(quantity);
        }
        if let Some(min_threshold) = self.min_threshold {
            draft = draft.with_min_threshold(min_threshold);
        }
        Ok((draft, actor_id("actor", &self.actor)?))
    }
}

/// Body of `stock_in`, `stock_out` and `consume`.
#[derive(Debug, Deserialize)]
pub struct StockMovementRequest {
    pub item_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub reason: String,
    pub actor: String,
    pub idempotency_key: Option<String>,
}

impl StockMovementRequest {
    pub fn into_request(self) -> DomainResult<StockRequest> {
        Ok(StockRequest {
            item_id: ItemId::new(self.item_id)?,
            amount: self.amount,
            reason: self.reason,
            actor: actor_id("actor", &self.actor)?,
            idempotency_key: idempotency_key(self.idempotency_key)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AdjustBody {
    pub item_id: String,
    pub delta: Decimal,
    #[serde(default)]
    pub reason: String,
    pub actor: String,
    pub idempotency_key: Option<String>,
}

impl AdjustBody {
    pub fn into_request(self) -> DomainResult<AdjustRequest> {
        Ok(AdjustRequest {
            item_id: ItemId::new(self.item_id)?,
            delta: self.delta,
            reason: self.reason,
            actor: actor_id("actor", &self.actor)?,
            idempotency_key: idempotency_key(self.idempotency_key)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TransferBody {
    pub from_item_id: String,
    pub to_item_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub reason: String,
    pub actor: String,
    pub idempotency_key: Option<String>,
}

impl TransferBody {
    pub fn into_request(self) -> DomainResult<TransferRequest> {
        Ok(TransferRequest {
            from_item_id: ItemId::new(self.from_item_id)?,
            to_item_id: ItemId::new(self.to_item_id)?,
            amount: self.amount,
            reason: self.reason,
            actor: actor_id("actor", &self.actor)?,
            idempotency_key: idempotency_key(self.idempotency_key)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CutBody {
    pub fabric_id: String,
    pub piece_length: Decimal,
    pub piece_width: Decimal,
    pub piece_count: u32,
    pub actor: String,
    pub piece_id: Option<String>,
    pub name: Option<String>,
}

impl CutBody {
    pub fn into_request(self) -> DomainResult<CutRequest> {
        Ok(CutRequest {
            fabric_id: ItemId::new(self.fabric_id)?,
            piece_length: self.piece_length,
            piece_width: self.piece_width,
            piece_count: self.piece_count,
            actor: actor_id("actor", &self.actor)?,
            piece_id: self.piece_id.map(ItemId::new).transpose()?,
            name: self.name,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ManufactureBody {
    pub cut_piece_id: String,
    pub units: u32,
    pub pieces_per_unit: u32,
    pub actor: String,
    pub unit_id: Option<String>,
    pub name: Option<String>,
}

impl ManufactureBody {
    pub fn into_request(self) -> DomainResult<ManufactureRequest> {
        Ok(ManufactureRequest {
            cut_piece_id: ItemId::new(self.cut_piece_id)?,
            units: self.units,
            pieces_per_unit: self.pieces_per_unit,
            actor: actor_id("actor", &self.actor)?,
            unit_id: self.unit_id.map(ItemId::new).transpose()?,
            name: self.name,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub tailor: String,
    pub actor: String,
}

impl AssignBody {
    pub fn into_request(self, item_id: String) -> DomainResult<AssignRequest> {
        Ok(AssignRequest {
            item_id: ItemId::new(item_id)?,
            tailor: actor_id("tailor", &self.tailor)?,
            actor: actor_id("actor", &self.actor)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub actor: String,
}

impl ActorBody {
    pub fn actor(self) -> DomainResult<ActorId> {
        actor_id("actor", &self.actor)
    }

    pub fn into_complete(self, item_id: String) -> DomainResult<CompleteRequest> {
        Ok(CompleteRequest {
            item_id: ItemId::new(item_id)?,
            actor: actor_id("actor", &self.actor)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemListQuery {
    pub kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListQuery {
    pub kind: Option<String>,
    pub item_kind: Option<String>,
    pub actor: Option<String>,
    pub item_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl TransactionListQuery {
    pub fn into_filter(self, default_page_size: u32) -> DomainResult<(TransactionFilter, Pagination)> {
        let filter = TransactionFilter {
            kind: non_empty(self.kind).map(|k| k.parse()).transpose()?,
            item_kind: non_empty(self.item_kind).map(|k| k.parse()).transpose()?,
            actor: non_empty(self.actor).map(|a| actor_id("actor", &a)).transpose()?,
            item_id: non_empty(self.item_id).map(ItemId::new).transpose()?,
            from: self.from,
            to: self.to,
        };
        Ok((
            filter,
            Pagination::new(self.page, self.page_size, default_page_size),
        ))
    }
}

/// Actor names are free text from the caller: sanitized like names and reasons.
pub fn actor_id(field: &str, raw: &str) -> DomainResult<ActorId> {
    ActorId::new(text::required(field, raw)?)
}

fn idempotency_key(raw: Option<String>) -> DomainResult<Option<IdempotencyKey>> {
    non_empty(raw).map(IdempotencyKey::new).transpose()
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

// -------------------------
// Response mapping
// -------------------------

pub fn item_json(item: &StockItem) -> serde_json::Value {
    serde_json::to_value(item.snapshot()).unwrap_or(serde_json::Value::Null)
}

pub fn cut_json(outcome: &CutOutcome) -> serde_json::Value {
    serde_json::json!({
        "operation": outcome.operation,
        "fabric": item_json(&outcome.fabric),
        "cut_piece": item_json(&outcome.cut_piece),
        "transaction": outcome.transaction,
    })
}

pub fn manufacture_json(outcome: &ManufactureOutcome) -> serde_json::Value {
    serde_json::json!({
        "run": outcome.run,
        "cut_piece": item_json(&outcome.cut_piece),
        "unit": item_json(&outcome.unit),
        "transaction": outcome.transaction,
    })
}

pub fn transfer_json(outcome: &TransferOutcome) -> serde_json::Value {
    serde_json::json!({
        "from": item_json(&outcome.from),
        "to": item_json(&outcome.to),
        "transactions": outcome.transactions,
    })
}
