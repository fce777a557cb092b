//! Interval scheduling for the three indexing jobs.
//!
//! Each job runs on its own tokio task with a fixed interval from
//! config. The tick body is awaited inside the loop, so a run that
//! outlasts its interval suppresses the next trigger instead of
//! overlapping it.

use anyhow::Result;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::backend::BackendClient;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::{db, index_job, migrate, reduce_job, storage, vectorize_job};

/// Run index, vectorize, and reduce on their configured intervals until
/// the process is terminated.
pub async fn run_schedule(config: &Config) -> Result<()> {
    let cache = db::connect(&config.db.cache_path).await?;
    migrate::run_cache_migrations(&cache).await?;

    info!(
        "Scheduling jobs: index every {}s, vectorize every {}s, reduce every {}s",
        config.schedule.index_secs, config.schedule.vectorize_secs, config.schedule.reduce_secs
    );

    let index_task = {
        let config = config.clone();
        let cache = cache.clone();
        tokio::spawn(async move {
            let storage = match storage::from_config(&config) {
                Ok(storage) => storage,
                Err(e) => return error!("index job disabled: {:#}", e),
            };
            let backend = match BackendClient::new(&config.backend) {
                Ok(backend) => backend,
                Err(e) => return error!("index job disabled: {:#}", e),
            };
            let mut interval = interval(config.schedule.index_secs);
            loop {
                interval.tick().await;
                if let Err(e) =
                    index_job::run_index(&config, storage.as_ref(), &backend, &cache).await
                {
                    error!("index run failed: {:#}", e);
                }
            }
        })
    };

    let vectorize_task = {
        let config = config.clone();
        let cache = cache.clone();
        tokio::spawn(async move {
            let storage = match storage::from_config(&config) {
                Ok(storage) => storage,
                Err(e) => return error!("vectorize job disabled: {:#}", e),
            };
            let backend = match BackendClient::new(&config.backend) {
                Ok(backend) => backend,
                Err(e) => return error!("vectorize job disabled: {:#}", e),
            };
            let embedder = match Embedder::new(&config.embeddings) {
                Ok(embedder) => embedder,
                Err(e) => return error!("vectorize job disabled: {:#}", e),
            };
            let mut interval = interval(config.schedule.vectorize_secs);
            loop {
                interval.tick().await;
                if let Err(e) = vectorize_job::run_vectorize(
                    &config,
                    storage.as_ref(),
                    &backend,
                    &embedder,
                    &cache,
                )
                .await
                {
                    error!("vectorize run failed: {:#}", e);
                }
            }
        })
    };

    let reduce_task = {
        let config = config.clone();
        let cache = cache.clone();
        tokio::spawn(async move {
            let storage = match storage::from_config(&config) {
                Ok(storage) => storage,
                Err(e) => return error!("reduce job disabled: {:#}", e),
            };
            let backend = match BackendClient::new(&config.backend) {
                Ok(backend) => backend,
                Err(e) => return error!("reduce job disabled: {:#}", e),
            };
            let mut interval = interval(config.schedule.reduce_secs);
            loop {
                interval.tick().await;
                if let Err(e) =
                    reduce_job::run_reduce(storage.as_ref(), &backend, &cache).await
                {
                    error!("reduce run failed: {:#}", e);
                }
            }
        })
    };

    // The tasks loop forever; joining keeps the process alive
    let _ = tokio::try_join!(index_task, vectorize_task, reduce_task)?;
    Ok(())
}

fn interval(secs: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
