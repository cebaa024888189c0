//! Background jobs
//!
//! Each job runs on its own fixed interval after an initial delay. Ticks
//! missed while a run is in progress are skipped rather than queued, so runs
//! of the same job never overlap. Every loop stops when the shutdown channel
//! fires or its sender is dropped.

use crate::metrics::lifecycle as metrics;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info};

pub mod blob_reconciler;
pub mod expiry_sweeper;

pub use blob_reconciler::BlobReconcilerJob;
pub use expiry_sweeper::ExpirySweeperJob;

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Job name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Delay before the first run
    fn initial_delay(&self) -> Duration;

    fn interval(&self) -> Duration;

    async fn run_once(&self) -> Result<()>;
}

/// Run `job` until `shutdown` fires.
pub async fn run_job_loop(job: Arc<dyn PeriodicJob>, mut shutdown: broadcast::Receiver<()>) {
    info!(
        job_name = job.name(),
        initial_delay_ms = job.initial_delay().as_millis() as u64,
        interval_ms = job.interval().as_millis() as u64,
        "Starting job loop"
    );

    tokio::select! {
        _ = tokio::time::sleep(job.initial_delay()) => {}
        _ = shutdown.recv() => {
            info!(job_name = job.name(), "Job cancelled before first run");
            return;
        }
    }

    let mut ticker = interval(job.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();
                match job.run_once().await {
                    Ok(()) => {
                        metrics::record_job_run(job.name(), "success");
                        if consecutive_failures > 0 {
                            info!(
                                job_name = job.name(),
                                recovered_after = consecutive_failures,
                                "Job recovered after failures"
                            );
                            consecutive_failures = 0;
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        metrics::record_job_run(job.name(), "error");
                        error!(
                            job_name = job.name(),
                            error = %e,
                            consecutive_failures,
                            "Job run failed, will retry on next interval"
                        );
                    }
                }
                metrics::record_job_duration(job.name(), started.elapsed());
            }
            _ = shutdown.recv() => {
                info!(job_name = job.name(), "Job loop shutting down");
                break;
            }
        }
    }
}
