/// Guestboard Service Library
///
/// Ephemeral guest posts: a guest publishes a short post with an optional
/// attachment, the post is listed for a fixed time-to-live, and a background
/// sweeper deletes it together with its attachment once it expires.
///
/// # Modules
///
/// - `blob`: Attachment storage (S3 or in-memory)
/// - `db`: Post and guest metadata (Postgres or in-memory)
/// - `services`: Post lifecycle manager and guest registry
/// - `jobs`: Expiry sweeper and orphan blob reconciler
/// - `handlers`: HTTP endpoints
/// - `resilience`: Call timeouts and the failure policy table
/// - `error`: Error types and handling
/// - `config`: Configuration management
/// - `metrics`: Prometheus collectors
pub mod blob;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod resilience;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
