//! Orphan blob reconciler
//!
//! A blob becomes an orphan when its upload succeeded but the post record
//! was never written, or when a delete went missing. This job lists the
//! bucket, drops everything no post references, and leaves blobs younger
//! than the grace period alone so in-flight publishes are not raced.

use super::PeriodicJob;
use crate::config::ReconcileConfig;
use crate::services::PostLifecycleManager;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct BlobReconcilerJob {
    manager: Arc<PostLifecycleManager>,
    interval: Duration,
    grace_period: Duration,
}

impl BlobReconcilerJob {
    pub fn new(manager: Arc<PostLifecycleManager>, config: &ReconcileConfig) -> Self {
        Self {
            manager,
            interval: config.interval(),
            grace_period: config.grace_period(),
        }
    }
}

#[async_trait]
impl PeriodicJob for BlobReconcilerJob {
    fn name(&self) -> &'static str {
        "blob_reconciler"
    }

    // first run waits a full interval
    fn initial_delay(&self) -> Duration {
        self.interval
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) -> Result<()> {
        let report = self.manager.reconcile_orphans(self.grace_period).await?;
        tracing::info!(
            scanned = report.scanned,
            orphans = report.orphans,
            deleted = report.deleted,
            failed = report.failed,
            "Blob reconciliation completed"
        );
        Ok(())
    }
}
