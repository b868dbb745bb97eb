//! Status projection: the only place a stock status is decided.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::item::Allocation;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Available,
    LowStock,
    OutOfStock,
    Reserved,
    Completed,
}

impl StockStatus {
    pub const ALL: [StockStatus; 5] = [
        StockStatus::Available,
        StockStatus::LowStock,
        StockStatus::OutOfStock,
        StockStatus::Reserved,
        StockStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Available => "available",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Reserved => "reserved",
            StockStatus::Completed => "completed",
        }
    }
}

/// Derive the status of an item from its quantity, threshold and allocation.
///
/// Empty stock wins over any allocation. For unallocated items this is the
/// plain threshold rule: `0` is out of stock, `(0, min]` is low, above is available.
pub fn project(quantity: Decimal, min_threshold: Decimal, allocation: &Allocation) -> StockStatus {
    if quantity.is_zero() {
        return StockStatus::OutOfStock;
    }
    match allocation {
        Allocation::Completed { .. } => StockStatus::Completed,
        Allocation::Assigned { .. } => StockStatus::Reserved,
        Allocation::Free if quantity <= min_threshold => StockStatus::LowStock,
        Allocation::Free => StockStatus::Available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use loomledger_core::ActorId;
    use rust_decimal_macros::dec;

    #[test]
    fn zero_quantity_is_out_of_stock() {
        assert_eq!(project(dec!(0), dec!(10), &Allocation::Free), StockStatus::OutOfStock);
        assert_eq!(project(dec!(0), dec!(0), &Allocation::Free), StockStatus::OutOfStock);
    }

    #[test]
    fn quantity_at_threshold_is_low_stock() {
        assert_eq!(project(dec!(10), dec!(10), &Allocation::Free), StockStatus::LowStock);
        assert_eq!(project(dec!(0.5), dec!(10), &Allocation::Free), StockStatus::LowStock);
    }

    #[test]
    fn quantity_above_threshold_is_available() {
        assert_eq!(project(dec!(10.01), dec!(10), &Allocation::Free), StockStatus::Available);
    }

    #[test]
    fn zero_threshold_never_reports_low_stock() {
        assert_eq!(project(dec!(0.001), dec!(0), &Allocation::Free), StockStatus::Available);
    }

    #[test]
    fn allocation_overrides_threshold_but_not_emptiness() {
        let assigned = Allocation::Assigned {
            to: ActorId::new("tailor-7").unwrap(),
            at: Utc::now(),
        };
        assert_eq!(project(dec!(3), dec!(10), &assigned), StockStatus::Reserved);
        assert_eq!(project(dec!(0), dec!(10), &assigned), StockStatus::OutOfStock);

        let done = Allocation::Completed { at: Utc::now() };
        assert_eq!(project(dec!(50), dec!(10), &done), StockStatus::Completed);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: the free-allocation projection matches the threshold table exactly.
            #[test]
            fn free_projection_matches_thresholds(qty in 0u32..10_000, min in 0u32..10_000, scale in 0u32..3) {
                let quantity = Decimal::new(qty as i64, scale);
                let threshold = Decimal::new(min as i64, scale);
                let status = project(quantity, threshold, &Allocation::Free);

                let expected = if quantity.is_zero() {
                    StockStatus::OutOfStock
                } else if quantity <= threshold {
                    StockStatus::LowStock
                } else {
                    StockStatus::Available
                };
                prop_assert_eq!(status, expected);
            }
        }
    }
}
