use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use fanwatch_core::config::{DiscoveryConfig, SchedulerConfig};
use fanwatch_core::Config;
use fanwatch_discovery::DiscoveryEngine;
use fanwatch_scheduler::FrequencyScheduler;
use fanwatch_store::{MemoryStore, PgStore};

/// The store the commands run against.
pub enum Backend {
    /// JSON dataset in memory; the schedule is persisted to `snapshot`.
    Memory { store: Arc<MemoryStore>, snapshot: PathBuf },
    Postgres(Arc<PgStore>),
}

impl Backend {
    /// In-memory backend over `dataset`, resuming the schedule from `snapshot`.
    pub fn memory(dataset: &Path, snapshot: PathBuf) -> Result<Self> {
        let store = MemoryStore::load(dataset)
            .with_context(|| format!("failed to load dataset: {}", dataset.display()))?;
        let restored = store
            .load_schedule(&snapshot)
            .with_context(|| format!("failed to load schedule snapshot: {}", snapshot.display()))?;
        info!(dataset = %dataset.display(), restored, "Using in-memory store");
        Ok(Backend::Memory { store: Arc::new(store), snapshot })
    }

    pub async fn postgres(config: &Config) -> Result<Self> {
        if !config.postgres.is_configured() {
            bail!("PostgreSQL not configured: set PG_USERNAME or pass --dataset");
        }
        let store = PgStore::connect(&config.postgres)
            .await
            .context("failed to connect to PostgreSQL")?;
        Ok(Backend::Postgres(Arc::new(store)))
    }

    pub fn scheduler(&self, config: SchedulerConfig) -> FrequencyScheduler {
        match self {
            Backend::Memory { store, .. } => FrequencyScheduler::with_store(config, Arc::clone(store)),
            Backend::Postgres(store) => FrequencyScheduler::with_store(config, Arc::clone(store)),
        }
    }

    pub fn discovery(&self, config: DiscoveryConfig) -> DiscoveryEngine {
        match self {
            Backend::Memory { store, .. } => DiscoveryEngine::with_store(config, Arc::clone(store)),
            Backend::Postgres(store) => DiscoveryEngine::with_store(config, Arc::clone(store)),
        }
    }

    /// Flush state that does not persist on its own. No-op for PostgreSQL.
    pub fn persist(&self) -> Result<()> {
        if let Backend::Memory { store, snapshot } = self {
            store
                .save_schedule(snapshot)
                .with_context(|| format!("failed to write schedule snapshot: {}", snapshot.display()))?;
            info!(path = %snapshot.display(), "Schedule snapshot written");
        }
        Ok(())
    }
}
