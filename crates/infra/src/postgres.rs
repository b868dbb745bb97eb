//! Postgres-backed ledger store and transaction log.
//!
//! One connection pool serves both tables (see `migrations/0001_ledger.sql`).
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `InvalidAppend` | Idempotency key reused for an item |
//! | Database (check constraint violation) | `23514` | `InvalidAppend` | Negative quantity or bad arithmetic |
//! | Database (other) | Any other | `InvalidAppend` | Other database errors |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` | Backend unreachable, safe to retry |
//!
//! ## Sync bridge
//!
//! The store traits are synchronous. Calls run the async query on the current
//! tokio runtime through `block_in_place`, so they must come from a
//! multi-threaded runtime (the API binary) and never from a bare thread.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use loomledger_core::{ActorId, DomainError, ExpectedVersion, IdempotencyKey, ItemId, TransactionId};
use loomledger_inventory::{
    Allocation, ItemKind, LedgerTransaction, NewTransaction, StockItem, StockItemSnapshot,
    TransactionKind,
};

use crate::ledger_store::{LedgerStore, StoreError};
use crate::transaction_log::TransactionLog;

const SCHEMA: &str = include_str!("../migrations/0001_ledger.sql");

const ITEM_COLUMNS: &str = "id, kind, name, unit, quantity, min_threshold, allocation, source_item, version, created_at, updated_at";

const TX_COLUMNS: &str = "id, occurred_at, item_id, item_kind, kind, quantity_delta, quantity_before, quantity_after, actor, reason, idempotency_key, correlation_id";

#[derive(Debug, Clone, Copy)]
enum TxLookup<'a> {
    Id(TransactionId),
    Correlation(Uuid),
    IdempotencyKey(&'a ItemId, &'a IdempotencyKey),
    All,
}

/// Both ledger tables behind one pool. Clone freely; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: Arc<PgPool>,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn fetch_item(&self, item_id: &ItemId) -> Result<StockItem, StoreError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM stock_items WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(item_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?
            .ok_or_else(|| StoreError::NotFound(item_id.clone()))?;
        item_from_row(&row)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id()), err)]
    async fn insert_item(&self, item: StockItem) -> Result<StockItem, StoreError> {
        let allocation = serde_json::to_value(item.allocation())
            .map_err(|e| StoreError::InvalidAppend(format!("cannot encode allocation: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO stock_items
                (id, kind, name, unit, quantity, min_threshold, allocation, source_item, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(item.id().as_str())
        .bind(item.kind().as_str())
        .bind(item.name())
        .bind(item.unit().as_str())
        .bind(item.quantity())
        .bind(item.min_threshold())
        .bind(allocation)
        .bind(item.source_item().map(ItemId::as_str))
        .bind(item.version() as i64)
        .bind(item.created_at())
        .bind(item.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateId(item.id().clone()));
        }
        Ok(item)
    }

    /// Write `next` only if the row still carries `read_version`.
    async fn swap_item(&self, read_version: u64, next: StockItem) -> Result<StockItem, StoreError> {
        let allocation = serde_json::to_value(next.allocation())
            .map_err(|e| StoreError::InvalidAppend(format!("cannot encode allocation: {e}")))?;

        let result = sqlx::query(
            r#"
            UPDATE stock_items
            SET quantity = $2, allocation = $3, version = $4, updated_at = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(next.id().as_str())
        .bind(next.quantity())
        .bind(allocation)
        .bind(next.version() as i64)
        .bind(next.updated_at())
        .bind(read_version as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::conflict(format!(
                "{} changed concurrently (expected version {read_version})",
                next.id()
            ))
            .into());
        }
        Ok(next)
    }

    async fn list_items(&self, kind: Option<ItemKind>) -> Result<Vec<StockItem>, StoreError> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM stock_items WHERE ($1::TEXT IS NULL OR kind = $1) ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(kind.map(|k| k.as_str()))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;
        rows.iter().map(item_from_row).collect()
    }

    async fn delete_item(&self, item_id: &ItemId, expected: ExpectedVersion) -> Result<(), StoreError> {
        let current = self.fetch_item(item_id).await?;
        expected.check(current.version())?;
        sqlx::query("DELETE FROM stock_items WHERE id = $1 AND version = $2")
            .bind(item_id.as_str())
            .bind(current.version() as i64)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove", e))?;
        Ok(())
    }

    #[instrument(skip(self, tx), fields(item_id = %tx.item_id, kind = tx.kind.as_str()), err)]
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<LedgerTransaction, StoreError> {
        tx.verify()
            .map_err(|e| StoreError::InvalidAppend(e.to_string()))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_transactions
                (occurred_at, item_id, item_kind, kind, quantity_delta, quantity_before, quantity_after,
                 actor, reason, idempotency_key, correlation_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(tx.timestamp)
        .bind(tx.item_id.as_str())
        .bind(tx.item_kind.as_str())
        .bind(tx.kind.as_str())
        .bind(tx.quantity_delta)
        .bind(tx.quantity_before)
        .bind(tx.quantity_after)
        .bind(tx.actor.as_str())
        .bind(&tx.reason)
        .bind(tx.idempotency_key.as_ref().map(IdempotencyKey::as_str))
        .bind(tx.correlation_id)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append", e))?;

        Ok(LedgerTransaction::commit(TransactionId::new(id as u64), tx))
    }

    async fn select_transactions(&self, lookup: TxLookup<'_>) -> Result<Vec<LedgerTransaction>, StoreError> {
        let where_clause = match lookup {
            TxLookup::Id(_) => "WHERE id = $1",
            TxLookup::Correlation(_) => "WHERE correlation_id = $1",
            TxLookup::IdempotencyKey(..) => "WHERE item_id = $1 AND idempotency_key = $2",
            TxLookup::All => "",
        };
        let sql = format!("SELECT {TX_COLUMNS} FROM stock_transactions {where_clause} ORDER BY id");
        let query = sqlx::query(&sql);
        let query = match lookup {
            TxLookup::Id(id) => query.bind(id.value() as i64),
            TxLookup::Correlation(correlation_id) => query.bind(correlation_id),
            TxLookup::IdempotencyKey(item_id, key) => query.bind(item_id.as_str()).bind(key.as_str()),
            TxLookup::All => query,
        };

        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("scan", e))?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn purge(&self) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM stock_transactions")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("clear", e))?;
        Ok(result.rows_affected() as usize)
    }
}

impl LedgerStore for PostgresLedger {
    fn get(&self, item_id: &ItemId) -> Result<StockItem, StoreError> {
        block(self.fetch_item(item_id))
    }

    fn create(&self, item: StockItem) -> Result<StockItem, StoreError> {
        block(self.insert_item(item))
    }

    fn apply_delta(
        &self,
        item_id: &ItemId,
        delta: Decimal,
        expected_version: ExpectedVersion,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError> {
        block(async {
            let current = self.fetch_item(item_id).await?;
            expected_version.check(current.version())?;
            let next = current.with_delta(delta, at)?;
            self.swap_item(current.version(), next).await
        })
    }

    fn set_allocation(
        &self,
        item_id: &ItemId,
        allocation: Allocation,
        expected_version: ExpectedVersion,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError> {
        block(async {
            let current = self.fetch_item(item_id).await?;
            expected_version.check(current.version())?;
            let next = current.with_allocation(allocation, at)?;
            self.swap_item(current.version(), next).await
        })
    }

    fn remove(&self, item_id: &ItemId, expected_version: ExpectedVersion) -> Result<(), StoreError> {
        block(self.delete_item(item_id, expected_version))
    }

    fn list(&self, kind: Option<ItemKind>) -> Result<Vec<StockItem>, StoreError> {
        block(self.list_items(kind))
    }
}

impl TransactionLog for PostgresLedger {
    fn append(&self, tx: NewTransaction) -> Result<LedgerTransaction, StoreError> {
        block(self.insert_transaction(tx))
    }

    fn get(&self, id: TransactionId) -> Result<Option<LedgerTransaction>, StoreError> {
        let found = block(self.select_transactions(TxLookup::Id(id)))?;
        Ok(found.into_iter().next())
    }

    fn find_by_correlation(&self, correlation_id: Uuid) -> Result<Vec<LedgerTransaction>, StoreError> {
        block(self.select_transactions(TxLookup::Correlation(correlation_id)))
    }

    fn find_by_idempotency_key(
        &self,
        item_id: &ItemId,
        key: &IdempotencyKey,
    ) -> Result<Option<LedgerTransaction>, StoreError> {
        let found = block(self.select_transactions(TxLookup::IdempotencyKey(item_id, key)))?;
        Ok(found.into_iter().next())
    }

    fn scan(&self) -> Result<Vec<LedgerTransaction>, StoreError> {
        block(self.select_transactions(TxLookup::All))
    }

    fn clear(&self) -> Result<usize, StoreError> {
        block(self.purge())
    }
}

fn block<F, R>(fut: F) -> Result<R, StoreError>
where
    F: Future<Output = Result<R, StoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Unavailable("PostgresLedger must be called from within a tokio runtime".to_string())
    })?;
    tokio::task::block_in_place(|| handle.block_on(fut))
}

fn item_from_row(row: &PgRow) -> Result<StockItem, StoreError> {
    let decode = |e: sqlx::Error| StoreError::InvalidAppend(format!("failed to decode item row: {e}"));

    let id: String = row.try_get("id").map_err(decode)?;
    let kind: String = row.try_get("kind").map_err(decode)?;
    let unit: String = row.try_get("unit").map_err(decode)?;
    let allocation: serde_json::Value = row.try_get("allocation").map_err(decode)?;
    let source_item: Option<String> = row.try_get("source_item").map_err(decode)?;
    let version: i64 = row.try_get("version").map_err(decode)?;
    let quantity: Decimal = row.try_get("quantity").map_err(decode)?;
    let min_threshold: Decimal = row.try_get("min_threshold").map_err(decode)?;
    let allocation: Allocation = serde_json::from_value(allocation)
        .map_err(|e| StoreError::InvalidAppend(format!("failed to decode allocation: {e}")))?;

    let snapshot = StockItemSnapshot {
        id: ItemId::new(id)?,
        kind: kind.parse()?,
        name: row.try_get("name").map_err(decode)?,
        unit: unit.parse()?,
        quantity,
        min_threshold,
        status: loomledger_inventory::project(quantity, min_threshold, &allocation),
        allocation,
        source_item: source_item.map(ItemId::new).transpose()?,
        version: version as u64,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    };
    Ok(StockItem::try_from(snapshot)?)
}

fn transaction_from_row(row: &PgRow) -> Result<LedgerTransaction, StoreError> {
    let decode = |e: sqlx::Error| StoreError::InvalidAppend(format!("failed to decode transaction row: {e}"));

    let id: i64 = row.try_get("id").map_err(decode)?;
    let item_id: String = row.try_get("item_id").map_err(decode)?;
    let item_kind: String = row.try_get("item_kind").map_err(decode)?;
    let kind: String = row.try_get("kind").map_err(decode)?;
    let actor: String = row.try_get("actor").map_err(decode)?;
    let key: Option<String> = row.try_get("idempotency_key").map_err(decode)?;

    Ok(LedgerTransaction {
        id: TransactionId::new(id as u64),
        timestamp: row.try_get("occurred_at").map_err(decode)?,
        item_id: ItemId::new(item_id)?,
        item_kind: item_kind.parse::<ItemKind>()?,
        kind: kind.parse::<TransactionKind>()?,
        quantity_delta: row.try_get("quantity_delta").map_err(decode)?,
        quantity_before: row.try_get("quantity_before").map_err(decode)?,
        quantity_after: row.try_get("quantity_after").map_err(decode)?,
        actor: ActorId::new(actor)?,
        reason: row.try_get("reason").map_err(decode)?,
        idempotency_key: key.map(IdempotencyKey::new).transpose()?,
        correlation_id: row.try_get("correlation_id").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some(code) if is_transient_sqlstate(code) => {
                    StoreError::Unavailable(format!("{msg} (sqlstate {code})"))
                }
                Some("23505") => StoreError::InvalidAppend(format!("unique constraint violated: {msg}")),
                Some("23514") => StoreError::InvalidAppend(format!("check constraint violated: {msg}")),
                _ => StoreError::InvalidAppend(msg),
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(format!("{operation}: {err}")),
        other => StoreError::InvalidAppend(format!("{operation}: {other}")),
    }
}

/// Connection exceptions (08), transaction rollbacks such as serialization
/// failures (40), insufficient resources (53) and operator intervention (57).
fn is_transient_sqlstate(code: &str) -> bool {
    ["08", "40", "53", "57"]
        .iter()
        .any(|class| code.starts_with(class))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outages_and_rollbacks_are_retryable() {
        for code in ["08006", "40001", "40P01", "53300", "57P01", "57014"] {
            assert!(is_transient_sqlstate(code), "{code}");
        }
        for code in ["23505", "23514", "22003", "42P01"] {
            assert!(!is_transient_sqlstate(code), "{code}");
        }
    }

    #[test]
    fn transport_failures_map_to_unavailable() {
        let errors = [
            sqlx::Error::PoolTimedOut,
            sqlx::Error::PoolClosed,
            sqlx::Error::WorkerCrashed,
            sqlx::Error::Protocol("unexpected message".to_string()),
        ];
        for err in errors {
            assert!(matches!(map_sqlx_error("get", err), StoreError::Unavailable(_)));
        }
        assert!(matches!(
            map_sqlx_error("get", sqlx::Error::RowNotFound),
            StoreError::InvalidAppend(_)
        ));
    }
}
