//! Expiry sweeper
//!
//! Deletes posts (and their attachments) whose expiry has passed. Runs once
//! shortly after startup, then hourly by default.

use super::PeriodicJob;
use crate::config::LifecycleConfig;
use crate::services::PostLifecycleManager;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct ExpirySweeperJob {
    manager: Arc<PostLifecycleManager>,
    initial_delay: Duration,
    interval: Duration,
}

impl ExpirySweeperJob {
    pub fn new(manager: Arc<PostLifecycleManager>, config: &LifecycleConfig) -> Self {
        Self {
            manager,
            initial_delay: config.initial_sweep_delay(),
            interval: config.sweep_interval(),
        }
    }
}

#[async_trait]
impl PeriodicJob for ExpirySweeperJob {
    fn name(&self) -> &'static str {
        "expiry_sweeper"
    }

    fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) -> Result<()> {
        tracing::info!("Running expiry sweep");
        let started = Instant::now();

        let report = self.manager.sweep().await?;

        if report.failed > 0 {
            tracing::warn!(
                found = report.found,
                posts_deleted = report.posts_deleted,
                blobs_deleted = report.blobs_deleted,
                failed = report.failed,
                "Expiry sweep left posts for the next run"
            );
        } else {
            tracing::info!(
                found = report.found,
                posts_deleted = report.posts_deleted,
                blobs_deleted = report.blobs_deleted,
                duration_ms = started.elapsed().as_millis() as u64,
                "Expiry sweep completed"
            );
        }
        Ok(())
    }
}
