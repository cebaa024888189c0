/// Health endpoints
///
/// `/api/v1/health` and `/api/v1/health/live` only report that the process
/// is serving. `/api/v1/health/ready` probes both stores.
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::blob::BlobStore;
use crate::db::MetadataStore;

pub struct HealthState {
    pub meta: Arc<dyn MetadataStore>,
    pub blob: Arc<dyn BlobStore>,
    pub probe_timeout: Duration,
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
}

#[derive(Serialize)]
struct ComponentCheck {
    status: ComponentStatus,
    message: String,
    latency_ms: u64,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    status: ComponentStatus,
    checks: HashMap<&'static str, ComponentCheck>,
    timestamp: String,
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "guestboard-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "alive" }))
}

pub async fn readiness(state: web::Data<HealthState>) -> HttpResponse {
    let mut checks = HashMap::new();

    let start = Instant::now();
    let meta = tokio::time::timeout(state.probe_timeout, state.meta.health_check()).await;
    checks.insert("metadata_store", component(flatten(meta), start));

    let start = Instant::now();
    let blob = tokio::time::timeout(state.probe_timeout, state.blob.health_check()).await;
    checks.insert("blob_store", component(flatten(blob), start));

    let ready = checks
        .values()
        .all(|check| check.status == ComponentStatus::Healthy);
    let response = ReadinessResponse {
        ready,
        status: if ready {
            ComponentStatus::Healthy
        } else {
            ComponentStatus::Unhealthy
        },
        checks,
        timestamp: Utc::now().to_rfc3339(),
    };

    if ready {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

fn flatten<E: std::fmt::Display>(
    result: Result<Result<(), E>, tokio::time::error::Elapsed>,
) -> Result<(), String> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("timed out".to_string()),
    }
}

fn component(result: Result<(), String>, start: Instant) -> ComponentCheck {
    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => ComponentCheck {
            status: ComponentStatus::Healthy,
            message: "ok".to_string(),
            latency_ms,
        },
        Err(message) => ComponentCheck {
            status: ComponentStatus::Unhealthy,
            message,
            latency_ms,
        },
    }
}
