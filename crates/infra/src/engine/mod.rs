//! Reservation/consumption engine: the only writer of the ledger and the log.
//!
//! Every quantity change follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Validate input (amount, dimensions, text); no effect on failure
//!   ↓
//! 2. Take the per-item lock (bounded wait → TransientFailure)
//!   ↓
//! 3. Idempotency check (key already in the log → answer with current state)
//!   ↓
//! 4. Read item, check stock (InsufficientStock → nothing written)
//!   ↓
//! 5. Ledger write, compare-and-swap on the version read in 4
//!   ↓
//! 6. Log append; on failure reconcile, else roll back 5
//! ```
//!
//! Multi-step operations (cut, manufacture, transfer) run their steps under
//! one lock set and undo earlier steps with compensating entries when a later
//! step fails. If an undo itself fails the ledger and the log can no longer be
//! trusted: the engine halts and refuses further work until restarted.

pub mod error;
pub mod locks;
pub mod requests;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use loomledger_core::{ActorId, DomainError, ExpectedVersion, IdempotencyKey, ItemId};
use loomledger_inventory::{
    Allocation, CuttingOperation, ItemKind, LedgerTransaction, ManufacturingRun, NewStockItem,
    NewTransaction, PieceDimensions, StockItem, TransactionKind, Unit, text,
};

use crate::clock::{Clock, SystemClock};
use crate::ids::{IdGenerator, SequentialIdGenerator};
use crate::ledger_store::{LedgerStore, StoreError};
use crate::transaction_log::TransactionLog;

pub use error::EngineError;
pub use locks::{ItemGuard, ItemLocks, LockTimeout};
pub use requests::{
    AdjustRequest, AssignRequest, CompleteRequest, CutOutcome, CutRequest, ManufactureOutcome,
    ManufactureRequest, StockRequest, TransferOutcome, TransferRequest,
};

const MAX_ID_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Longest a call waits for another writer on the same item.
    pub lock_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
        }
    }
}

/// One quantity change to commit under an already-held item lock.
struct Change<'a> {
    item_id: &'a ItemId,
    delta: Decimal,
    kind: TransactionKind,
    actor: &'a ActorId,
    reason: String,
    idempotency_key: Option<&'a IdempotencyKey>,
    correlation_id: Uuid,
}

struct Committed {
    item: StockItem,
    transaction: LedgerTransaction,
}

/// Serialized, audited writer for stock items.
///
/// ## Generic Parameters
///
/// - `L`: ledger store (current item state)
/// - `T`: transaction log (history of committed changes)
///
/// Both are injected; nothing here reaches a process-wide singleton. Use the
/// in-memory implementations in tests and the Postgres ones in production.
pub struct StockEngine<L, T> {
    ledger: L,
    log: T,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    locks: ItemLocks,
    last_commit: Mutex<Option<DateTime<Utc>>>,
    halted: Mutex<Option<String>>,
}

impl<L, T> StockEngine<L, T> {
    pub fn new(ledger: L, log: T) -> Self {
        Self {
            ledger,
            log,
            clock: Arc::new(SystemClock),
            ids: Arc::new(SequentialIdGenerator::new()),
            locks: ItemLocks::new(EngineSettings::default().lock_timeout),
            last_commit: Mutex::new(None),
            halted: Mutex::new(None),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.locks = ItemLocks::new(settings.lock_timeout);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn log(&self) -> &T {
        &self.log
    }

    /// Whether an invariant violation stopped this instance.
    pub fn is_halted(&self) -> bool {
        self.halted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        match &*self.halted.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(reason) => Err(EngineError::InvariantViolation(format!("engine halted: {reason}"))),
            None => Ok(()),
        }
    }

    fn halt(&self, reason: String) -> EngineError {
        error!(reason = %reason, "ledger/log invariant violated; halting stock engine");
        let mut halted = self.halted.lock().unwrap_or_else(PoisonError::into_inner);
        if halted.is_none() {
            *halted = Some(reason.clone());
        }
        EngineError::InvariantViolation(reason)
    }

    /// Commit timestamps never go backwards, even if the clock does.
    fn commit_time(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let mut last = self.last_commit.lock().unwrap_or_else(PoisonError::into_inner);
        let at = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(at);
        at
    }
}

impl<L, T> StockEngine<L, T>
where
    L: LedgerStore,
    T: TransactionLog,
{
    pub fn get_item(&self, item_id: &ItemId) -> Result<StockItem, EngineError> {
        self.ensure_running()?;
        Ok(self.ledger.get(item_id)?)
    }

    pub fn list_items(&self, kind: Option<ItemKind>) -> Result<Vec<StockItem>, EngineError> {
        self.ensure_running()?;
        Ok(self.ledger.list(kind)?)
    }

    /// Open a new item. A positive starting quantity is booked as a `stock_in`.
    #[instrument(skip(self, draft), fields(kind = draft.kind.as_str(), actor = %actor))]
    pub fn create_item(&self, draft: NewStockItem, actor: &ActorId) -> Result<StockItem, EngineError> {
        self.ensure_running()?;

        let initial = draft.quantity;
        if initial < Decimal::ZERO {
            return Err(EngineError::Validation("quantity cannot be negative".to_string()));
        }
        if !initial.is_zero() {
            draft.unit.validate_amount("quantity", initial)?;
        }

        let empty = NewStockItem {
            quantity: Decimal::ZERO,
            ..draft
        };
        let opened = self.open_item(&empty)?;
        if initial.is_zero() {
            info!(item_id = %opened.id(), "item created");
            return Ok(opened);
        }

        let _guard = self.locks.acquire(&[opened.id()])?;
        let change = Change {
            item_id: opened.id(),
            delta: initial,
            kind: TransactionKind::StockIn,
            actor,
            reason: "initial stock".to_string(),
            idempotency_key: None,
            correlation_id: Uuid::now_v7(),
        };

        match self.commit_change(change) {
            Ok(committed) => {
                info!(item_id = %opened.id(), quantity = %initial, "item created");
                Ok(committed.item)
            }
            Err(e) => {
                if !matches!(e, EngineError::InvariantViolation(_)) {
                    self.discard_opened(opened.id());
                }
                Err(e)
            }
        }
    }

    /// Remove `amount` from an item. Fails with `InsufficientStock` and writes
    /// nothing when the item holds less than requested.
    #[instrument(skip(self, req), fields(item_id = %req.item_id, amount = %req.amount, actor = %req.actor))]
    pub fn consume(&self, req: StockRequest) -> Result<StockItem, EngineError> {
        self.ensure_running()?;
        let reason = text::required("reason", &req.reason)?;
        positive("amount", req.amount)?;

        let _guard = self.locks.acquire(&[&req.item_id])?;
        let committed = self.commit_change(Change {
            item_id: &req.item_id,
            delta: -req.amount,
            kind: TransactionKind::StockOut,
            actor: &req.actor,
            reason,
            idempotency_key: req.idempotency_key.as_ref(),
            correlation_id: Uuid::now_v7(),
        })?;
        Ok(committed.item)
    }

    /// Add `amount` to an item. No upper bound beyond numeric overflow.
    #[instrument(skip(self, req), fields(item_id = %req.item_id, amount = %req.amount, actor = %req.actor))]
    pub fn replenish(&self, req: StockRequest) -> Result<StockItem, EngineError> {
        self.ensure_running()?;
        let reason = text::required("reason", &req.reason)?;
        positive("amount", req.amount)?;

        let _guard = self.locks.acquire(&[&req.item_id])?;
        let committed = self.commit_change(Change {
            item_id: &req.item_id,
            delta: req.amount,
            kind: TransactionKind::StockIn,
            actor: &req.actor,
            reason,
            idempotency_key: req.idempotency_key.as_ref(),
            correlation_id: Uuid::now_v7(),
        })?;
        Ok(committed.item)
    }

    /// Book a stock-count correction of either sign.
    #[instrument(skip(self, req), fields(item_id = %req.item_id, delta = %req.delta, actor = %req.actor))]
    pub fn adjust(&self, req: AdjustRequest) -> Result<StockItem, EngineError> {
        self.ensure_running()?;
        let reason = text::required("reason", &req.reason)?;
        if req.delta.is_zero() {
            return Err(EngineError::Validation("delta cannot be zero".to_string()));
        }

        let _guard = self.locks.acquire(&[&req.item_id])?;
        let committed = self.commit_change(Change {
            item_id: &req.item_id,
            delta: req.delta,
            kind: TransactionKind::Adjustment,
            actor: &req.actor,
            reason,
            idempotency_key: req.idempotency_key.as_ref(),
            correlation_id: Uuid::now_v7(),
        })?;
        Ok(committed.item)
    }

    /// Move stock between two items with the same unit.
    ///
    /// The idempotency key is recorded on the destination leg, which is
    /// written last, so a retry after a compensated failure runs again.
    #[instrument(skip(self, req), fields(from = %req.from_item_id, to = %req.to_item_id, amount = %req.amount, actor = %req.actor))]
    pub fn transfer(&self, req: TransferRequest) -> Result<TransferOutcome, EngineError> {
        self.ensure_running()?;
        let reason = text::required("reason", &req.reason)?;
        positive("amount", req.amount)?;
        if req.from_item_id == req.to_item_id {
            return Err(EngineError::Validation("cannot transfer an item into itself".to_string()));
        }

        let _guard = self.locks.acquire(&[&req.from_item_id, &req.to_item_id])?;

        if let Some(key) = &req.idempotency_key {
            if let Some(previous) = self.log.find_by_idempotency_key(&req.to_item_id, key)? {
                ensure_same_request(&previous, TransactionKind::Transfer, req.amount)?;
                info!(key = %key, "idempotent replay of transfer");
                return Ok(TransferOutcome {
                    from: self.ledger.get(&req.from_item_id)?,
                    to: self.ledger.get(&req.to_item_id)?,
                    transactions: Vec::new(),
                });
            }
        }

        let source = self.ledger.get(&req.from_item_id)?;
        let target = self.ledger.get(&req.to_item_id)?;
        if source.unit() != target.unit() {
            return Err(EngineError::Validation(format!(
                "cannot transfer {} into {}",
                source.unit().as_str(),
                target.unit().as_str()
            )));
        }

        let correlation_id = Uuid::now_v7();
        let outgoing = self.commit_change(Change {
            item_id: &req.from_item_id,
            delta: -req.amount,
            kind: TransactionKind::Transfer,
            actor: &req.actor,
            reason: format!("{reason} (to {})", req.to_item_id),
            idempotency_key: None,
            correlation_id,
        })?;

        let incoming = self.commit_change(Change {
            item_id: &req.to_item_id,
            delta: req.amount,
            kind: TransactionKind::Transfer,
            actor: &req.actor,
            reason: format!("{reason} (from {})", req.from_item_id),
            idempotency_key: req.idempotency_key.as_ref(),
            correlation_id,
        });

        match incoming {
            Ok(incoming) => Ok(TransferOutcome {
                from: outgoing.item,
                to: incoming.item,
                transactions: vec![outgoing.transaction, incoming.transaction],
            }),
            Err(e) => {
                self.compensate(
                    &req.from_item_id,
                    req.amount,
                    TransactionKind::Transfer,
                    &req.actor,
                    correlation_id,
                    &e,
                )?;
                Err(e)
            }
        }
    }

    /// Cut `piece_count` pieces of `length x width` out of a fabric item.
    ///
    /// Consumes the area from the fabric and opens a cut-piece item seeded
    /// with `piece_count`. If the cut-piece item cannot be opened the fabric
    /// is replenished again and the original error is returned.
    #[instrument(skip(self, req), fields(fabric_id = %req.fabric_id, pieces = req.piece_count, actor = %req.actor))]
    pub fn cut(&self, req: CutRequest) -> Result<CutOutcome, EngineError> {
        self.ensure_running()?;
        let dimensions = PieceDimensions::new(req.piece_length, req.piece_width)?;
        let operation = CuttingOperation::new(req.fabric_id.clone(), dimensions, req.piece_count)?;
        let area = operation.total_area_consumed()?;

        let _guard = self.locks.acquire(&[&req.fabric_id])?;
        let fabric = self.ledger.get(&req.fabric_id)?;
        if fabric.kind() != ItemKind::Fabric || fabric.unit().is_integral() {
            return Err(EngineError::Validation(format!(
                "{} is not a fabric measured by length or area",
                req.fabric_id
            )));
        }
        let name = req
            .name
            .clone()
            .unwrap_or_else(|| format!("{} cut pieces", fabric.name()));
        let name = self.vet_new_item(req.piece_id.as_ref(), &name)?;

        let correlation_id = Uuid::now_v7();
        let consumed = self.commit_change(Change {
            item_id: &req.fabric_id,
            delta: -area,
            kind: TransactionKind::StockOut,
            actor: &req.actor,
            reason: format!(
                "cut {} pieces of {} x {}",
                req.piece_count, dimensions.length, dimensions.width
            ),
            idempotency_key: None,
            correlation_id,
        })?;

        let draft = NewStockItem {
            id: req.piece_id.clone(),
            ..NewStockItem::new(ItemKind::CutPiece, name, Unit::Pieces)
                .with_quantity(Decimal::from(req.piece_count))
                .with_source(req.fabric_id.clone())
        };

        match self.open_item(&draft) {
            Ok(cut_piece) => {
                info!(cut_piece_id = %cut_piece.id(), area = %area, "fabric cut");
                Ok(CutOutcome {
                    operation,
                    fabric: consumed.item,
                    cut_piece,
                    transaction: consumed.transaction,
                })
            }
            Err(e) => {
                self.compensate(
                    &req.fabric_id,
                    area,
                    TransactionKind::StockIn,
                    &req.actor,
                    correlation_id,
                    &e,
                )?;
                Err(e)
            }
        }
    }

    /// Sew `units` garments, each using `pieces_per_unit` cut pieces.
    #[instrument(skip(self, req), fields(cut_piece_id = %req.cut_piece_id, units = req.units, actor = %req.actor))]
    pub fn manufacture(&self, req: ManufactureRequest) -> Result<ManufactureOutcome, EngineError> {
        self.ensure_running()?;
        let run = ManufacturingRun::new(req.cut_piece_id.clone(), req.units, req.pieces_per_unit)?;
        let pieces = run.pieces_consumed();

        let _guard = self.locks.acquire(&[&req.cut_piece_id])?;
        let cut_piece = self.ledger.get(&req.cut_piece_id)?;
        if cut_piece.kind() != ItemKind::CutPiece {
            return Err(EngineError::Validation(format!(
                "{} is not a cut-piece item",
                req.cut_piece_id
            )));
        }
        let name = req
            .name
            .clone()
            .unwrap_or_else(|| format!("Garments from {}", cut_piece.name()));
        let name = self.vet_new_item(req.unit_id.as_ref(), &name)?;

        let correlation_id = Uuid::now_v7();
        let consumed = self.commit_change(Change {
            item_id: &req.cut_piece_id,
            delta: -pieces,
            kind: TransactionKind::StockOut,
            actor: &req.actor,
            reason: format!("manufacture {} units", req.units),
            idempotency_key: None,
            correlation_id,
        })?;

        let draft = NewStockItem {
            id: req.unit_id.clone(),
            ..NewStockItem::new(ItemKind::ManufacturedUnit, name, Unit::Pieces)
                .with_quantity(Decimal::from(req.units))
                .with_source(req.cut_piece_id.clone())
        };

        match self.open_item(&draft) {
            Ok(unit) => {
                info!(unit_id = %unit.id(), pieces = %pieces, "garments manufactured");
                Ok(ManufactureOutcome {
                    run,
                    cut_piece: consumed.item,
                    unit,
                    transaction: consumed.transaction,
                })
            }
            Err(e) => {
                self.compensate(
                    &req.cut_piece_id,
                    pieces,
                    TransactionKind::StockIn,
                    &req.actor,
                    correlation_id,
                    &e,
                )?;
                Err(e)
            }
        }
    }

    /// Hand an item to a tailor; status becomes `reserved`.
    #[instrument(skip(self, req), fields(item_id = %req.item_id, tailor = %req.tailor, actor = %req.actor))]
    pub fn assign(&self, req: AssignRequest) -> Result<StockItem, EngineError> {
        self.ensure_running()?;
        let _guard = self.locks.acquire(&[&req.item_id])?;
        let current = self.ledger.get(&req.item_id)?;
        let at = self.commit_time();
        let item = self.ledger.set_allocation(
            &req.item_id,
            Allocation::Assigned {
                to: req.tailor.clone(),
                at,
            },
            ExpectedVersion::Exact(current.version()),
            at,
        )?;
        info!("item assigned");
        Ok(item)
    }

    /// Mark a manufactured lot as finished; status becomes `completed`.
    #[instrument(skip(self, req), fields(item_id = %req.item_id, actor = %req.actor))]
    pub fn complete(&self, req: CompleteRequest) -> Result<StockItem, EngineError> {
        self.ensure_running()?;
        let _guard = self.locks.acquire(&[&req.item_id])?;
        let current = self.ledger.get(&req.item_id)?;
        let at = self.commit_time();
        let item = self.ledger.set_allocation(
            &req.item_id,
            Allocation::Completed { at },
            ExpectedVersion::Exact(current.version()),
            at,
        )?;
        info!("item completed");
        Ok(item)
    }

    /// Administrative purge of the whole transaction log.
    #[instrument(skip(self), fields(actor = %actor))]
    pub fn clear_history(&self, actor: &ActorId) -> Result<usize, EngineError> {
        self.ensure_running()?;
        let cleared = self.log.clear()?;
        warn!(cleared, "transaction history cleared");
        Ok(cleared)
    }

    /// Check that the newest log entry for an item agrees with the ledger.
    ///
    /// A mismatch halts the engine.
    pub fn audit_item(&self, item_id: &ItemId) -> Result<(), EngineError> {
        self.ensure_running()?;
        let _guard = self.locks.acquire(&[item_id])?;
        let item = self.ledger.get(item_id)?;
        let latest = self
            .log
            .scan()?
            .into_iter()
            .rev()
            .find(|tx| tx.item_id == *item_id);

        match latest {
            Some(tx) if !tx.matches_item(&item) => Err(self.halt(format!(
                "log says {} holds {}, ledger says {}",
                item_id,
                tx.quantity_after,
                item.quantity()
            ))),
            Some(tx) => tx.verify().map_err(|e| self.halt(e.to_string())),
            None => Ok(()),
        }
    }

    /// Check the item a multi-step operation is about to open before its
    /// first step writes anything. Returns the sanitized name.
    fn vet_new_item(&self, item_id: Option<&ItemId>, name: &str) -> Result<String, EngineError> {
        let name = text::required("name", name)?;
        if let Some(item_id) = item_id {
            match self.ledger.get(item_id) {
                Ok(_) => return Err(EngineError::DuplicateId(item_id.to_string())),
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(name)
    }

    /// Delete an item opened by a failed `create_item`, unless something
    /// has stocked it since.
    fn discard_opened(&self, item_id: &ItemId) {
        let outcome = self.ledger.get(item_id).and_then(|current| {
            if !current.quantity().is_zero() {
                return Err(StoreError::Domain(DomainError::conflict(format!(
                    "{item_id} holds {} and is kept",
                    current.quantity()
                ))));
            }
            self.ledger
                .remove(item_id, ExpectedVersion::Exact(current.version()))
        });
        if let Err(e) = outcome {
            warn!(item_id = %item_id, error = %e, "could not remove item after failed initial stock");
        }
    }

    fn open_item(&self, draft: &NewStockItem) -> Result<StockItem, EngineError> {
        let at = self.commit_time();
        if let Some(id) = &draft.id {
            let item = StockItem::open(id.clone(), draft, at)?;
            return Ok(self.ledger.create(item)?);
        }

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_item_id(draft.kind)?;
            let item = StockItem::open(id, draft, at)?;
            match self.ledger.create(item) {
                Ok(created) => return Ok(created),
                Err(StoreError::DuplicateId(taken)) => {
                    debug!(item_id = %taken, "generated id already taken; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::TransientFailure(
            "could not allocate a free item id".to_string(),
        ))
    }

    /// Apply one change to the ledger and record it in the log, or neither.
    ///
    /// The caller must hold the item lock.
    fn commit_change(&self, change: Change<'_>) -> Result<Committed, EngineError> {
        if let Some(key) = change.idempotency_key {
            if let Some(previous) = self.log.find_by_idempotency_key(change.item_id, key)? {
                ensure_same_request(&previous, change.kind, change.delta)?;
                info!(item_id = %change.item_id, transaction_id = %previous.id, "idempotent replay; nothing applied");
                return Ok(Committed {
                    item: self.ledger.get(change.item_id)?,
                    transaction: previous,
                });
            }
        }

        let before = self.ledger.get(change.item_id)?;
        if change.delta < Decimal::ZERO && before.quantity() + change.delta < Decimal::ZERO {
            info!(
                item_id = %change.item_id,
                requested = %(-change.delta),
                available = %before.quantity(),
                "insufficient stock"
            );
            return Err(DomainError::insufficient_stock(
                before.id().clone(),
                -change.delta,
                before.quantity(),
            )
            .into());
        }

        let at = self.commit_time();
        let after = self.ledger.apply_delta(
            change.item_id,
            change.delta,
            ExpectedVersion::Exact(before.version()),
            at,
        )?;

        let entry = NewTransaction::between(
            &before,
            &after,
            change.kind,
            change.actor.clone(),
            change.reason.clone(),
            at,
        )
        .with_idempotency_key(change.idempotency_key.cloned())
        .with_correlation(change.correlation_id);

        match self.log.append(entry) {
            Ok(transaction) => {
                if !transaction.matches_item(&after) {
                    return Err(self.halt(format!(
                        "log entry {} records {} for {}, ledger holds {}",
                        transaction.id,
                        transaction.quantity_after,
                        change.item_id,
                        after.quantity()
                    )));
                }
                debug!(
                    item_id = %change.item_id,
                    transaction_id = %transaction.id,
                    kind = change.kind.as_str(),
                    quantity = %after.quantity(),
                    "change committed"
                );
                Ok(Committed {
                    item: after,
                    transaction,
                })
            }
            Err(append_err) => self.recover_failed_append(&change, after, append_err),
        }
    }

    /// The ledger write landed but the append reported failure.
    ///
    /// If the entry is in the log after all, keep the change. If it is
    /// definitely absent, undo the ledger write. If neither can be established,
    /// halt.
    fn recover_failed_append(
        &self,
        change: &Change<'_>,
        after: StockItem,
        append_err: StoreError,
    ) -> Result<Committed, EngineError> {
        warn!(item_id = %change.item_id, error = %append_err, "transaction log append failed; reconciling");

        match self.log.find_by_correlation(change.correlation_id) {
            Ok(entries) => {
                let landed = entries.into_iter().find(|tx| {
                    tx.item_id == *change.item_id
                        && tx.quantity_delta == change.delta
                        && tx.matches_item(&after)
                });
                if let Some(transaction) = landed {
                    info!(item_id = %change.item_id, transaction_id = %transaction.id, "log entry landed despite the error");
                    return Ok(Committed {
                        item: after,
                        transaction,
                    });
                }
            }
            Err(lookup_err) => {
                return Err(self.halt(format!(
                    "cannot tell whether the log entry for {} committed ({append_err}); lookup failed: {lookup_err}",
                    change.item_id
                )));
            }
        }

        let at = self.commit_time();
        match self.ledger.apply_delta(
            change.item_id,
            -change.delta,
            ExpectedVersion::Exact(after.version()),
            at,
        ) {
            Ok(_) => {
                warn!(item_id = %change.item_id, "ledger change rolled back after log append failure");
                Err(EngineError::TransientFailure(format!(
                    "transaction log append failed: {append_err}; nothing was committed"
                )))
            }
            Err(rollback_err) => Err(self.halt(format!(
                "ledger changed for {} without a log entry; rollback failed: {rollback_err}",
                change.item_id
            ))),
        }
    }

    /// Give back `amount` taken by an earlier step of a failed operation.
    fn compensate(
        &self,
        item_id: &ItemId,
        amount: Decimal,
        kind: TransactionKind,
        actor: &ActorId,
        correlation_id: Uuid,
        cause: &EngineError,
    ) -> Result<(), EngineError> {
        let change = Change {
            item_id,
            delta: amount,
            kind,
            actor,
            reason: format!("compensation: {cause}"),
            idempotency_key: None,
            correlation_id,
        };
        match self.commit_change(change) {
            Ok(_) => {
                warn!(item_id = %item_id, amount = %amount, cause = %cause, "compensated partially applied operation");
                Ok(())
            }
            Err(e) => Err(self.halt(format!(
                "could not compensate {item_id} after failure ({cause}): {e}"
            ))),
        }
    }
}

/// A reused idempotency key must describe the same change it did the first time.
fn ensure_same_request(
    previous: &LedgerTransaction,
    kind: TransactionKind,
    delta: Decimal,
) -> Result<(), EngineError> {
    if previous.kind != kind || previous.quantity_delta != delta {
        return Err(EngineError::Validation(format!(
            "idempotency key reused with a different request (first used for {} of {})",
            previous.kind.as_str(),
            previous.quantity_delta
        )));
    }
    Ok(())
}

fn positive(field: &str, amount: Decimal) -> Result<(), EngineError> {
    if amount <= Decimal::ZERO {
        return Err(EngineError::Validation(format!("{field} must be positive")));
    }
    Ok(())
}
