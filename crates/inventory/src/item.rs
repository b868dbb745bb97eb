use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use loomledger_core::{ActorId, DomainError, DomainResult, ItemId};

use crate::status::{StockStatus, project};
use crate::text;

/// What stage of the garment pipeline an item belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Fabric,
    CutPiece,
    ManufacturedUnit,
}

impl ItemKind {
    pub const ALL: [ItemKind; 3] = [ItemKind::Fabric, ItemKind::CutPiece, ItemKind::ManufacturedUnit];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Fabric => "fabric",
            ItemKind::CutPiece => "cut_piece",
            ItemKind::ManufacturedUnit => "manufactured_unit",
        }
    }

    /// Prefix used by id generators (`FAB-000001`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ItemKind::Fabric => "FAB",
            ItemKind::CutPiece => "CUT",
            ItemKind::ManufacturedUnit => "MFG",
        }
    }
}

impl FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fabric" => Ok(ItemKind::Fabric),
            "cut_piece" | "cutpiece" => Ok(ItemKind::CutPiece),
            "manufactured_unit" | "manufacturedunit" => Ok(ItemKind::ManufacturedUnit),
            other => Err(DomainError::validation(format!(
                "unknown item kind '{other}' (expected fabric, cut_piece, manufactured_unit)"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Meters,
    Yards,
    SquareMeters,
    Pieces,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Meters => "meters",
            Unit::Yards => "yards",
            Unit::SquareMeters => "square_meters",
            Unit::Pieces => "pieces",
        }
    }

    /// Piece counts cannot be fractional.
    pub fn is_integral(&self) -> bool {
        matches!(self, Unit::Pieces)
    }

    /// Validate a strictly positive amount expressed in this unit.
    pub fn validate_amount(&self, field: &str, amount: Decimal) -> DomainResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation(format!("{field} must be positive")));
        }
        self.validate_granularity(field, amount)
    }

    fn validate_granularity(&self, field: &str, amount: Decimal) -> DomainResult<Decimal> {
        if self.is_integral() && !amount.fract().is_zero() {
            return Err(DomainError::validation(format!(
                "{field} must be a whole number of {}",
                self.as_str()
            )));
        }
        Ok(amount.normalize())
    }
}

impl FromStr for Unit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m" | "meter" | "meters" => Ok(Unit::Meters),
            "yd" | "yard" | "yards" => Ok(Unit::Yards),
            "m2" | "sqm" | "square_meters" => Ok(Unit::SquareMeters),
            "pcs" | "piece" | "pieces" => Ok(Unit::Pieces),
            other => Err(DomainError::validation(format!("unknown unit '{other}'"))),
        }
    }
}

/// Who holds an item right now.
///
/// Only quantity drives the ledger; allocation feeds the status projection
/// (`Reserved`, `Completed`) and is changed through explicit engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Allocation {
    #[default]
    Free,
    Assigned { to: ActorId, at: DateTime<Utc> },
    Completed { at: DateTime<Utc> },
}

/// Request to open a new stock item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockItem {
    /// Caller-chosen id; generated when absent.
    pub id: Option<ItemId>,
    pub kind: ItemKind,
    pub name: String,
    pub unit: Unit,
    pub quantity: Decimal,
    pub min_threshold: Decimal,
    pub source_item: Option<ItemId>,
}

impl NewStockItem {
    pub fn new(kind: ItemKind, name: impl Into<String>, unit: Unit) -> Self {
        Self {
            id: None,
            kind,
            name: name.into(),
            unit,
            quantity: Decimal::ZERO,
            min_threshold: Decimal::ZERO,
            source_item: None,
        }
    }

    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_min_threshold(mut self, min_threshold: Decimal) -> Self {
        self.min_threshold = min_threshold;
        self
    }

    pub fn with_source(mut self, source: ItemId) -> Self {
        self.source_item = Some(source);
        self
    }
}

/// A trackable physical resource: a fabric roll, a batch of cut pieces, a garment lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockItem {
    id: ItemId,
    kind: ItemKind,
    name: String,
    unit: Unit,
    quantity: Decimal,
    min_threshold: Decimal,
    allocation: Allocation,
    source_item: Option<ItemId>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StockItem {
    /// Open an item at version 1 with the draft's seed quantity.
    pub fn open(id: ItemId, draft: &NewStockItem, at: DateTime<Utc>) -> DomainResult<Self> {
        let name = text::required("name", &draft.name)?;
        if draft.quantity < Decimal::ZERO {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        if draft.min_threshold < Decimal::ZERO {
            return Err(DomainError::validation("min_threshold cannot be negative"));
        }
        let quantity = draft.unit.validate_granularity("quantity", draft.quantity)?;

        Ok(Self {
            id,
            kind: draft.kind,
            name,
            unit: draft.unit,
            quantity,
            min_threshold: draft.min_threshold.normalize(),
            allocation: Allocation::Free,
            source_item: draft.source_item.clone(),
            version: 1,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn min_threshold(&self) -> Decimal {
        self.min_threshold
    }

    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    pub fn source_item(&self) -> Option<&ItemId> {
        self.source_item.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Always projected, never stored.
    pub fn status(&self) -> StockStatus {
        project(self.quantity, self.min_threshold, &self.allocation)
    }

    /// Compute the item after applying `delta`, without mutating `self`.
    ///
    /// Rejects zero deltas, fractional deltas on piece units, overflow, and any
    /// result below zero (`InsufficientStock`).
    pub fn with_delta(&self, delta: Decimal, at: DateTime<Utc>) -> DomainResult<StockItem> {
        if delta.is_zero() {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let delta = self.unit.validate_granularity("delta", delta)?;

        let next = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        if next < Decimal::ZERO {
            return Err(DomainError::insufficient_stock(
                self.id.clone(),
                -delta,
                self.quantity,
            ));
        }

        let mut updated = self.clone();
        updated.quantity = next.normalize();
        updated.version += 1;
        updated.updated_at = at;
        Ok(updated)
    }

    /// Compute the item with a new allocation.
    ///
    /// Assignment needs stock on hand and is only meaningful before completion;
    /// completion applies to manufactured units.
    pub fn with_allocation(&self, allocation: Allocation, at: DateTime<Utc>) -> DomainResult<StockItem> {
        if matches!(self.allocation, Allocation::Completed { .. }) {
            return Err(DomainError::validation(format!("item {} is already completed", self.id)));
        }
        match &allocation {
            Allocation::Assigned { .. } if self.quantity.is_zero() => {
                return Err(DomainError::validation("cannot assign an item with no stock"));
            }
            Allocation::Completed { .. } if self.kind != ItemKind::ManufacturedUnit => {
                return Err(DomainError::validation(
                    "only manufactured units can be completed",
                ));
            }
            _ => {}
        }

        let mut updated = self.clone();
        updated.allocation = allocation;
        updated.version += 1;
        updated.updated_at = at;
        Ok(updated)
    }

    pub fn snapshot(&self) -> StockItemSnapshot {
        StockItemSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            name: self.name.clone(),
            unit: self.unit,
            quantity: self.quantity,
            min_threshold: self.min_threshold,
            status: self.status(),
            allocation: self.allocation.clone(),
            source_item: self.source_item.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Serializable view of a [`StockItem`], status included.
///
/// Backends persist this shape; `status` is ignored when restoring because
/// it is re-projected from quantity and allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItemSnapshot {
    pub id: ItemId,
    pub kind: ItemKind,
    pub name: String,
    pub unit: Unit,
    pub quantity: Decimal,
    pub min_threshold: Decimal,
    pub status: StockStatus,
    pub allocation: Allocation,
    pub source_item: Option<ItemId>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<StockItemSnapshot> for StockItem {
    type Error = DomainError;

    fn try_from(s: StockItemSnapshot) -> Result<Self, Self::Error> {
        if s.quantity < Decimal::ZERO {
            return Err(DomainError::invariant(format!(
                "stored quantity for {} is negative",
                s.id
            )));
        }
        Ok(Self {
            id: s.id,
            kind: s.kind,
            name: s.name,
            unit: s.unit,
            quantity: s.quantity,
            min_threshold: s.min_threshold,
            allocation: s.allocation,
            source_item: s.source_item,
            version: s.version,
            created_at: s.created_at,
            updated_at: s.updated_at,
        })
    }
}
