//! Stock ledger domain module.
//!
//! This crate contains the business rules for garment-pipeline stock
//! (fabric, cut pieces, manufactured units), implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod cutting;
pub mod item;
pub mod manufacturing;
pub mod status;
pub mod text;
pub mod transaction;

pub use cutting::{CuttingOperation, PieceDimensions};
pub use item::{Allocation, ItemKind, NewStockItem, StockItem, StockItemSnapshot, Unit};
pub use manufacturing::ManufacturingRun;
pub use status::{StockStatus, project};
pub use transaction::{LedgerTransaction, NewTransaction, TransactionKind};
