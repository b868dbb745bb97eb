//! Infrastructure layer: stores, the stock engine, reporting, config.

pub mod clock;
pub mod config;
pub mod engine;
pub mod ids;
pub mod ledger_store;
pub mod reporting;
pub mod transaction_log;

/// Postgres adapters for the ledger store and the transaction log.
#[cfg(feature = "postgres")]
pub mod postgres;
