use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use loomledger_core::{DomainError, DomainResult, ItemId};

/// Sewing a number of garments out of a batch of cut pieces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingRun {
    pub cut_piece_id: ItemId,
    pub units: u32,
    pub pieces_per_unit: u32,
}

impl ManufacturingRun {
    pub fn new(cut_piece_id: ItemId, units: u32, pieces_per_unit: u32) -> DomainResult<Self> {
        if units == 0 {
            return Err(DomainError::validation("units must be at least 1"));
        }
        if pieces_per_unit == 0 {
            return Err(DomainError::validation("pieces_per_unit must be at least 1"));
        }
        Ok(Self {
            cut_piece_id,
            units,
            pieces_per_unit,
        })
    }

    pub fn pieces_consumed(&self) -> Decimal {
        Decimal::from(u64::from(self.units) * u64::from(self.pieces_per_unit))
    }
}
