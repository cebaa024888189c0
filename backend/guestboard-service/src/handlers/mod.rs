pub mod guests;
pub mod health;
pub mod posts;

use actix_web::web;

pub use health::HealthState;

/// Register every route under `/api/v1` plus `/metrics`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(crate::metrics::serve_metrics))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health::health))
                .route("/health/live", web::get().to(health::liveness))
                .route("/health/ready", web::get().to(health::readiness))
                .service(
                    web::scope("/posts")
                        .route("", web::post().to(posts::publish_post))
                        .route("", web::get().to(posts::list_posts))
                        .route("/{post_id}", web::get().to(posts::get_post)),
                )
                .service(
                    web::scope("/guests")
                        .route("", web::put().to(guests::upsert_guest))
                        .route("/search", web::get().to(guests::search_guests))
                        .route("/{guest_id}", web::get().to(guests::get_guest))
                        .route("/{guest_id}/friends", web::post().to(guests::add_friend)),
                ),
        );
}
