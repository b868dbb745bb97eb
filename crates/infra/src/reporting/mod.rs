//! Read-only summaries and history queries over the ledger and the log.
//!
//! Nothing here takes item locks or writes; results reflect whatever has
//! been committed at the time of the call.

pub mod query;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use loomledger_core::ActorId;
use loomledger_inventory::{ItemKind, StockStatus, TransactionKind};

use crate::engine::EngineError;
use crate::ledger_store::LedgerStore;
use crate::transaction_log::TransactionLog;

pub use query::{Pagination, TransactionFilter, TransactionPage};

/// Per item kind totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSummary {
    pub kind: ItemKind,
    pub item_count: usize,
    pub total_quantity: Decimal,
    /// Item count per status; every status is present, possibly with 0.
    pub by_status: BTreeMap<StockStatus, usize>,
    pub transaction_count: usize,
    pub total_in: Decimal,
    pub total_out: Decimal,
}

impl KindSummary {
    fn empty(kind: ItemKind) -> Self {
        Self {
            kind,
            item_count: 0,
            total_quantity: Decimal::ZERO,
            by_status: StockStatus::ALL.iter().map(|s| (*s, 0)).collect(),
            transaction_count: 0,
            total_in: Decimal::ZERO,
            total_out: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSummary {
    pub actor: ActorId,
    pub transaction_count: usize,
    pub by_kind: BTreeMap<TransactionKind, usize>,
    /// Sum of negative deltas, reported as a positive amount.
    pub total_consumed: Decimal,
    pub total_replenished: Decimal,
    pub first_activity: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

pub struct Reporting<L, T> {
    ledger: L,
    log: T,
    max_page_size: u32,
}

impl<L, T> Reporting<L, T>
where
    L: LedgerStore,
    T: TransactionLog,
{
    pub fn new(ledger: L, log: T, max_page_size: u32) -> Self {
        Self {
            ledger,
            log,
            max_page_size,
        }
    }

    /// One entry per item kind, in `ItemKind::ALL` order.
    pub fn summary_by_type(&self) -> Result<Vec<KindSummary>, EngineError> {
        let mut summaries: BTreeMap<ItemKind, KindSummary> = ItemKind::ALL
            .iter()
            .map(|k| (*k, KindSummary::empty(*k)))
            .collect();

        for item in self.ledger.list(None)? {
            if let Some(summary) = summaries.get_mut(&item.kind()) {
                summary.item_count += 1;
                summary.total_quantity += item.quantity();
                *summary.by_status.entry(item.status()).or_default() += 1;
            }
        }

        for tx in self.log.scan()? {
            if let Some(summary) = summaries.get_mut(&tx.item_kind) {
                summary.transaction_count += 1;
                if tx.quantity_delta > Decimal::ZERO {
                    summary.total_in += tx.quantity_delta;
                } else {
                    summary.total_out -= tx.quantity_delta;
                }
            }
        }

        Ok(summaries.into_values().collect())
    }

    pub fn summary_by_actor(&self, actor: &ActorId) -> Result<ActorSummary, EngineError> {
        let mut summary = ActorSummary {
            actor: actor.clone(),
            transaction_count: 0,
            by_kind: BTreeMap::new(),
            total_consumed: Decimal::ZERO,
            total_replenished: Decimal::ZERO,
            first_activity: None,
            last_activity: None,
        };

        for tx in self.log.scan()?.into_iter().filter(|tx| tx.actor == *actor) {
            summary.transaction_count += 1;
            *summary.by_kind.entry(tx.kind).or_default() += 1;
            if tx.quantity_delta > Decimal::ZERO {
                summary.total_replenished += tx.quantity_delta;
            } else {
                summary.total_consumed -= tx.quantity_delta;
            }
            summary.first_activity = Some(summary.first_activity.map_or(tx.timestamp, |t| t.min(tx.timestamp)));
            summary.last_activity = Some(summary.last_activity.map_or(tx.timestamp, |t| t.max(tx.timestamp)));
        }

        Ok(summary)
    }

    /// Filtered, newest-first page of the transaction log.
    pub fn range_query(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> Result<TransactionPage, EngineError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(EngineError::Validation(
                    "'from' must not be after 'to'".to_string(),
                ));
            }
        }

        let matching = self
            .log
            .scan()?
            .into_iter()
            .filter(|tx| filter.matches(tx))
            .collect();
        Ok(TransactionPage::paginate(
            matching,
            pagination.clamped(self.max_page_size),
        ))
    }
}
