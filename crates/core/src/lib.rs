//! `loomledger-core`: shared building blocks for the stock ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{ActorId, IdempotencyKey, ItemId, TransactionId};
pub use version::ExpectedVersion;
