use std::sync::Arc;

use anyhow::Context;

use loomledger_infra::config::{IdStrategy, LedgerConfig};
use loomledger_infra::engine::{EngineError, StockEngine};
use loomledger_infra::ids::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};
use loomledger_infra::ledger_store::{InMemoryLedgerStore, LedgerStore};
use loomledger_infra::reporting::Reporting;
use loomledger_infra::transaction_log::{InMemoryTransactionLog, TransactionLog};

#[cfg(feature = "postgres")]
use loomledger_infra::postgres::PostgresLedger;

pub type SharedLedger = Arc<dyn LedgerStore>;
pub type SharedLog = Arc<dyn TransactionLog>;
pub type Engine = StockEngine<SharedLedger, SharedLog>;

/// Everything a handler needs: the engine (writes), reporting (reads) and
/// the config it was built from.
pub struct AppServices {
    engine: Engine,
    reporting: Reporting<SharedLedger, SharedLog>,
    config: LedgerConfig,
    backend: &'static str,
}

impl AppServices {
    pub fn in_memory(config: LedgerConfig) -> anyhow::Result<Self> {
        Self::with_stores(
            config,
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryTransactionLog::new()),
            "in_memory",
        )
    }

    pub fn with_stores(
        config: LedgerConfig,
        ledger: SharedLedger,
        log: SharedLog,
        backend: &'static str,
    ) -> anyhow::Result<Self> {
        let ids: Arc<dyn IdGenerator> = match config.id_strategy {
            IdStrategy::Uuid => Arc::new(UuidIdGenerator),
            IdStrategy::Sequential => {
                let existing = ledger
                    .list(None)
                    .context("failed to read existing items")?;
                Arc::new(SequentialIdGenerator::resume_after(
                    existing.iter().map(|item| (item.kind(), item.id())),
                ))
            }
        };

        let engine = StockEngine::new(ledger.clone(), log.clone())
            .with_settings(config.engine_settings())
            .with_id_generator(ids);
        let reporting = Reporting::new(ledger, log, config.max_page_size);

        Ok(Self {
            engine,
            reporting,
            config,
            backend,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn reporting(&self) -> &Reporting<SharedLedger, SharedLog> {
        &self.reporting
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Run a blocking engine call off the async workers.
    ///
    /// Engine calls may wait on item locks (bounded by the lock timeout) or
    /// on a synchronous storage backend.
    pub async fn run<R, F>(self: &Arc<Self>, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&AppServices) -> Result<R, EngineError> + Send + 'static,
        R: Send + 'static,
    {
        let services = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&services))
            .await
            .map_err(|e| EngineError::TransientFailure(format!("worker task failed: {e}")))?
    }
}

pub async fn build_services(config: LedgerConfig) -> anyhow::Result<AppServices> {
    if config.use_persistent_stores {
        #[cfg(feature = "postgres")]
        {
            return build_persistent_services(config).await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but the postgres feature is not enabled, falling back to in-memory"
            );
        }
    }

    AppServices::in_memory(config)
}

#[cfg(feature = "postgres")]
async fn build_persistent_services(config: LedgerConfig) -> anyhow::Result<AppServices> {
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let backend = PostgresLedger::connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    backend
        .migrate()
        .await
        .context("failed to apply the ledger schema")?;

    let backend = Arc::new(backend);
    tokio::task::block_in_place(|| {
        AppServices::with_stores(config, backend.clone(), backend, "postgres")
    })
}
