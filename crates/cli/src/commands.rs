use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::info;

use fanwatch_core::config::TuningConfig;
use fanwatch_scheduler::FrequencyScheduler;

use crate::backend::Backend;
use crate::cli::StoreCommand;

/// Run one command and return its result as JSON.
pub async fn execute(command: &StoreCommand, backend: &Backend, tuning: &TuningConfig) -> Result<Value> {
    let scheduler = backend.scheduler(tuning.scheduler.clone());

    let value = match *command {
        StoreCommand::Schedule { every, watch } => {
            let period = every.or(watch.then_some(tuning.scheduler.cycle_seconds));
            match period {
                Some(secs) => {
                    watch_schedule(&scheduler, backend, Duration::from_secs(secs.max(1))).await?;
                    serde_json::to_value(scheduler.metrics()?)?
                }
                None => serde_json::to_value(scheduler.recompute_schedule().await?)?,
            }
        }
        StoreCommand::Upsert { author_id, interval, force_now } => {
            serde_json::to_value(scheduler.upsert_frequency(author_id, interval, force_now).await?)?
        }
        StoreCommand::Register { author_id } => serde_json::to_value(scheduler.register_author(author_id).await?)?,
        StoreCommand::Track { author_id } => serde_json::to_value(scheduler.ensure_tracked(author_id).await?)?,
        StoreCommand::Due { limit } => serde_json::to_value(scheduler.due_authors(limit).await?)?,
        StoreCommand::Hot { limit } => serde_json::to_value(scheduler.hot_authors(limit).await?)?,
        StoreCommand::Discover { author_id, limit } => {
            let engine = backend.discovery(tuning.discovery.clone());
            let limit = limit.unwrap_or(tuning.discovery.default_result_limit);
            serde_json::to_value(engine.discover(author_id, limit).await)?
        }
        StoreCommand::Tags { author_id } => {
            let engine = backend.discovery(tuning.discovery.clone());
            serde_json::to_value(engine.top_tags(author_id).await?)?
        }
    };
    Ok(value)
}

/// Recompute every `period` until Ctrl-C, persisting after each cycle.
async fn watch_schedule(scheduler: &FrequencyScheduler, backend: &Backend, period: Duration) -> Result<()> {
    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping after the current cycle");
                shutdown.notify_one();
            }
        });
    }

    let persist_every = async {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = backend.persist() {
                tracing::warn!("{:#}", e);
            }
        }
    };

    tokio::select! {
        _ = scheduler.run_every(period, Arc::clone(&shutdown)) => {}
        _ = persist_every => {}
    }
    backend.persist().context("final persist failed")
}
