use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use loomledger_core::{DomainError, DomainResult, ItemId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceDimensions {
    pub length: Decimal,
    pub width: Decimal,
}

impl PieceDimensions {
    pub fn new(length: Decimal, width: Decimal) -> DomainResult<Self> {
        if length <= Decimal::ZERO {
            return Err(DomainError::validation("piece length must be positive"));
        }
        if width <= Decimal::ZERO {
            return Err(DomainError::validation("piece width must be positive"));
        }
        Ok(Self { length, width })
    }

    pub fn area(&self) -> DomainResult<Decimal> {
        self.length
            .checked_mul(self.width)
            .ok_or_else(|| DomainError::validation("piece area overflow"))
    }
}

/// Consumption of fabric area into a batch of identical cut pieces.
///
/// The area is always derived from the dimensions; fabric keeps a single
/// authoritative quantity and no separate "remaining area" bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuttingOperation {
    pub fabric_id: ItemId,
    pub piece_dimensions: PieceDimensions,
    pub piece_count: u32,
}

impl CuttingOperation {
    pub fn new(fabric_id: ItemId, piece_dimensions: PieceDimensions, piece_count: u32) -> DomainResult<Self> {
        if piece_count == 0 {
            return Err(DomainError::validation("piece count must be at least 1"));
        }
        let op = Self {
            fabric_id,
            piece_dimensions,
            piece_count,
        };
        op.total_area_consumed()?;
        Ok(op)
    }

    /// `length * width * piece_count`.
    pub fn total_area_consumed(&self) -> DomainResult<Decimal> {
        self.piece_dimensions
            .area()?
            .checked_mul(Decimal::from(self.piece_count))
            .map(|a| a.normalize())
            .ok_or_else(|| DomainError::validation("total cut area overflow"))
    }
}
