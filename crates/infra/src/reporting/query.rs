//! Filter and pagination types for transaction history queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loomledger_core::{ActorId, ItemId};
use loomledger_inventory::{ItemKind, LedgerTransaction, TransactionKind};

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl Pagination {
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_page_size: u32) -> Self {
        Self {
            page: page.unwrap_or(1),
            page_size: page_size.unwrap_or(default_page_size),
        }
    }

    /// Page numbers start at 1; page size is clamped to `1..=max_page_size`.
    pub fn clamped(self, max_page_size: u32) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, max_page_size.max(1)),
        }
    }

    fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

/// All criteria are optional and combined with AND. `from`/`to` are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub item_kind: Option<ItemKind>,
    pub actor: Option<ActorId>,
    pub item_id: Option<ItemId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &LedgerTransaction) -> bool {
        self.kind.is_none_or(|k| tx.kind == k)
            && self.item_kind.is_none_or(|k| tx.item_kind == k)
            && self.actor.as_ref().is_none_or(|a| tx.actor == *a)
            && self.item_id.as_ref().is_none_or(|id| tx.item_id == *id)
            && self.from.is_none_or(|from| tx.timestamp >= from)
            && self.to.is_none_or(|to| tx.timestamp <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub items: Vec<LedgerTransaction>,
    /// Matching entries across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl TransactionPage {
    /// Order newest first (ties broken by id, newest first) and cut one page.
    pub(crate) fn paginate(mut matching: Vec<LedgerTransaction>, pagination: Pagination) -> Self {
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        let total = matching.len();
        let offset = pagination.offset().min(total);
        let items: Vec<_> = matching
            .into_iter()
            .skip(offset)
            .take(pagination.page_size as usize)
            .collect();
        let has_more = offset + items.len() < total;

        Self {
            items,
            total: total as u64,
            page: pagination.page,
            page_size: pagination.page_size,
            has_more,
        }
    }
}
