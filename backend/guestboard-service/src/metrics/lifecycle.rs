//! Prometheus metrics for post publishing, expiry sweeps and blob reconciliation

use crate::resilience::CallSite;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use std::time::Duration;

/// Publish attempts by outcome (success, validation_error, attachment_error, store_error)
static PUBLISH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "guestboard_publish_total",
        "Total number of publish attempts by outcome",
        &["outcome"]
    )
    .expect("failed to register guestboard_publish_total")
});

static JOB_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "guestboard_job_runs_total",
        "Total number of background job cycles (success/error)",
        &["job", "status"]
    )
    .expect("failed to register guestboard_job_runs_total")
});

static JOB_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "guestboard_job_duration_seconds",
        "Duration of background job cycles",
        &["job"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("failed to register guestboard_job_duration_seconds")
});

/// Items removed by the sweeper and reconciler (post, blob, orphan_blob)
static DELETED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "guestboard_deleted_total",
        "Total items deleted by background jobs",
        &["item"]
    )
    .expect("failed to register guestboard_deleted_total")
});

static CALL_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "guestboard_external_call_failures_total",
        "External call failures by call site and cause (error/timeout)",
        &["call", "cause"]
    )
    .expect("failed to register guestboard_external_call_failures_total")
});

static EXPIRED_PENDING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "guestboard_sweep_expired_found",
        "Number of expired posts found in the last sweep"
    )
    .expect("failed to register guestboard_sweep_expired_found")
});

pub fn record_publish(outcome: &str) {
    PUBLISH_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a job cycle completion
pub fn record_job_run(job: &str, status: &str) {
    JOB_RUNS_TOTAL.with_label_values(&[job, status]).inc();
}

pub fn record_job_duration(job: &str, duration: Duration) {
    JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

pub fn record_deleted(item: &str, count: u64) {
    if count > 0 {
        DELETED_TOTAL.with_label_values(&[item]).inc_by(count);
    }
}

pub fn record_call_failure(site: CallSite, timed_out: bool) {
    let cause = if timed_out { "timeout" } else { "error" };
    CALL_FAILURES_TOTAL
        .with_label_values(&[site.as_str(), cause])
        .inc();
}

pub fn set_expired_found(count: i64) {
    EXPIRED_PENDING.set(count);
}
