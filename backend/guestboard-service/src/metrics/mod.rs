//! Prometheus metrics for guestboard-service.

use actix_web::HttpResponse;
use prometheus::{Encoder, TextEncoder};

pub mod lifecycle;

/// `GET /metrics` in the Prometheus text exposition format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}
