//! Item identifier generation.
//!
//! Ids come from an explicit generator rather than the wall clock, so two
//! items opened in the same millisecond never collide.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use loomledger_core::{DomainResult, ItemId};
use loomledger_inventory::ItemKind;

pub trait IdGenerator: Send + Sync {
    fn next_item_id(&self, kind: ItemKind) -> DomainResult<ItemId>;
}

/// `FAB-000001`, `CUT-000001`, `MFG-000001`: one counter per kind.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    fabric: AtomicU64,
    cut_piece: AtomicU64,
    manufactured_unit: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after the highest existing id of each kind.
    ///
    /// Ids that do not follow the `PREFIX-n` shape (caller-supplied labels,
    /// UUID ids) are ignored.
    pub fn resume_after<'a>(existing: impl IntoIterator<Item = (ItemKind, &'a ItemId)>) -> Self {
        let ids = Self::new();
        for (kind, id) in existing {
            let seq = id
                .as_str()
                .strip_prefix(kind.id_prefix())
                .and_then(|rest| rest.strip_prefix('-'))
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(seq) = seq {
                ids.counter(kind).fetch_max(seq, Ordering::Relaxed);
            }
        }
        ids
    }

    fn counter(&self, kind: ItemKind) -> &AtomicU64 {
        match kind {
            ItemKind::Fabric => &self.fabric,
            ItemKind::CutPiece => &self.cut_piece,
            ItemKind::ManufacturedUnit => &self.manufactured_unit,
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_item_id(&self, kind: ItemKind) -> DomainResult<ItemId> {
        let n = self.counter(kind).fetch_add(1, Ordering::Relaxed) + 1;
        ItemId::new(format!("{}-{n:06}", kind.id_prefix()))
    }
}

/// Kind prefix plus a UUIDv7, for stores shared by several processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_item_id(&self, kind: ItemKind) -> DomainResult<ItemId> {
        ItemId::new(format!("{}-{}", kind.id_prefix(), Uuid::now_v7()))
    }
}
