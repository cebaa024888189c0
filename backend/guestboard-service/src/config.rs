/// Configuration management for Guestboard Service
///
/// Configuration is read from the environment exactly once, at process start,
/// into an immutable [`Config`]. Services receive the sections they need by
/// reference and never consult the environment themselves.
use crate::blob::ID_PLACEHOLDER;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Metadata store configuration
    pub database: DatabaseConfig,
    /// Blob store configuration
    pub blob: BlobConfig,
    /// Post lifecycle settings
    pub lifecycle: LifecycleConfig,
    /// Orphan blob reconciliation
    pub reconcile: ReconcileConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    pub host: String,
    pub port: u16,
    /// Emit logs as JSON
    pub json_logs: bool,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins
    pub allowed_origins: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    S3,
    Memory,
}

/// Metadata store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: MetadataBackend,
    pub url: String,
    pub max_connections: u32,
}

/// Blob store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    pub backend: BlobBackend,
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible storage
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
    /// Destination folder for uploaded attachments
    pub prefix: String,
    /// Public URL template; `{id}` is replaced with the blob id
    pub public_url_template: String,
}

/// How post ids are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostIdScheme {
    /// The metadata store assigns a random UUID
    Store,
    /// `{guestId}-{createdAt}`
    Derived,
}

impl FromStr for PostIdScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" => Ok(PostIdScheme::Store),
            "derived" => Ok(PostIdScheme::Derived),
            other => Err(format!("unknown post id scheme '{}'", other)),
        }
    }
}

/// Post lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Post lifetime in hours
    pub ttl_hours: u32,
    pub max_attachment_bytes: usize,
    pub max_text_words: usize,
    pub sweep_interval_ms: u64,
    pub initial_sweep_delay_ms: u64,
    /// Upper bound on listing size
    pub listing_limit: usize,
    /// Deadline applied to every blob and metadata call
    pub call_timeout_ms: u64,
    pub post_id_scheme: PostIdScheme,
    /// Posts expired in parallel within one sweep
    pub sweep_concurrency: usize,
}

pub const MAX_LISTING_LIMIT: usize = 100;

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            max_attachment_bytes: 20 * 1024 * 1024,
            max_text_words: 500,
            sweep_interval_ms: 60 * 60 * 1000,
            initial_sweep_delay_ms: 2 * 60 * 1000,
            listing_limit: MAX_LISTING_LIMIT,
            call_timeout_ms: 10_000,
            post_id_scheme: PostIdScheme::Store,
            sweep_concurrency: 8,
        }
    }
}

impl LifecycleConfig {
    pub fn ttl_millis(&self) -> i64 {
        i64::from(self.ttl_hours) * crate::models::MILLIS_PER_HOUR
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn initial_sweep_delay(&self) -> Duration {
        Duration::from_millis(self.initial_sweep_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_hours == 0 {
            return Err("POST_TTL_HOURS must be greater than zero".to_string());
        }
        if self.sweep_interval_ms == 0 {
            return Err("SWEEP_INTERVAL_MS must be greater than zero".to_string());
        }
        if self.call_timeout_ms == 0 {
            return Err("EXTERNAL_CALL_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.max_attachment_bytes == 0 {
            return Err("MAX_ATTACHMENT_BYTES must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Orphan blob reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Minimum blob age before an unreferenced blob may be reclaimed
    pub grace_period_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 6 * 60 * 60 * 1000,
            grace_period_ms: 60 * 60 * 1000,
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let production = app_env.eq_ignore_ascii_case("production");

        let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
            Ok(value) => value,
            Err(_) if production => {
                return Err("CORS_ALLOWED_ORIGINS must be set in production".to_string())
            }
            Err(_) => "http://localhost:3000".to_string(),
        };
        if production && allowed_origins.trim() == "*" {
            return Err("CORS_ALLOWED_ORIGINS cannot be '*' in production".to_string());
        }

        let database_backend = match env_string("METADATA_BACKEND", "postgres").as_str() {
            "postgres" => MetadataBackend::Postgres,
            "memory" => MetadataBackend::Memory,
            other => return Err(format!("unknown METADATA_BACKEND '{}'", other)),
        };

        let blob_backend = match env_string("BLOB_BACKEND", "s3").as_str() {
            "s3" => BlobBackend::S3,
            "memory" => BlobBackend::Memory,
            other => return Err(format!("unknown BLOB_BACKEND '{}'", other)),
        };

        let bucket = env_string("S3_BUCKET", "guestboard-attachments");
        let region = env_string("AWS_REGION", "us-east-1");
        let endpoint = std::env::var("S3_ENDPOINT").ok().filter(|v| !v.trim().is_empty());
        let public_url_template = std::env::var("BLOB_PUBLIC_URL_TEMPLATE")
            .unwrap_or_else(|_| default_public_url_template(&bucket, &region, endpoint.as_deref()));
        if !public_url_template.contains(ID_PLACEHOLDER) {
            return Err(format!(
                "BLOB_PUBLIC_URL_TEMPLATE must contain {}",
                ID_PLACEHOLDER
            ));
        }

        let defaults = LifecycleConfig::default();
        let lifecycle = LifecycleConfig {
            ttl_hours: env_or("POST_TTL_HOURS", defaults.ttl_hours),
            max_attachment_bytes: env_or("MAX_ATTACHMENT_BYTES", defaults.max_attachment_bytes),
            max_text_words: env_or("MAX_TEXT_WORDS", defaults.max_text_words),
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            initial_sweep_delay_ms: env_or(
                "INITIAL_SWEEP_DELAY_MS",
                defaults.initial_sweep_delay_ms,
            ),
            listing_limit: env_or("LISTING_LIMIT", defaults.listing_limit)
                .clamp(1, MAX_LISTING_LIMIT),
            call_timeout_ms: env_or("EXTERNAL_CALL_TIMEOUT_MS", defaults.call_timeout_ms),
            post_id_scheme: match std::env::var("POST_ID_SCHEME") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.post_id_scheme,
            },
            sweep_concurrency: env_or("SWEEP_CONCURRENCY", defaults.sweep_concurrency).max(1),
        };
        lifecycle.validate()?;

        let reconcile_defaults = ReconcileConfig::default();
        let reconcile = ReconcileConfig {
            enabled: env_or("RECONCILE_ENABLED", reconcile_defaults.enabled),
            interval_ms: env_or("RECONCILE_INTERVAL_MS", reconcile_defaults.interval_ms),
            grace_period_ms: env_or(
                "RECONCILE_GRACE_PERIOD_MS",
                reconcile_defaults.grace_period_ms,
            ),
        };
        if reconcile.enabled && reconcile.interval_ms == 0 {
            return Err("RECONCILE_INTERVAL_MS must be greater than zero".to_string());
        }

        Ok(Config {
            app: AppConfig {
                env: app_env,
                host: env_string("GUESTBOARD_HOST", "0.0.0.0"),
                port: env_or("GUESTBOARD_PORT", 8090),
                json_logs: env_string("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            },
            cors: CorsConfig { allowed_origins },
            database: DatabaseConfig {
                backend: database_backend,
                url: env_string("DATABASE_URL", "postgresql://localhost/guestboard"),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            },
            blob: BlobConfig {
                backend: blob_backend,
                bucket,
                region,
                endpoint,
                access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                prefix: env_string("BLOB_PREFIX", "guestboard/attachments"),
                public_url_template,
            },
            lifecycle,
            reconcile,
        })
    }
}

fn default_public_url_template(bucket: &str, region: &str, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, ID_PLACEHOLDER),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, ID_PLACEHOLDER),
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse `key` from the environment, falling back to `default` when unset or
/// unparsable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_defaults() {
        let cfg = LifecycleConfig::default();
        assert_eq!(cfg.ttl_millis(), 24 * 3_600_000);
        assert_eq!(cfg.max_attachment_bytes, 20 * 1024 * 1024);
        assert_eq!(cfg.max_text_words, 500);
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(3600));
        assert_eq!(cfg.initial_sweep_delay(), Duration::from_secs(120));
        assert_eq!(cfg.call_timeout(), Duration::from_secs(10));
        assert!(cfg.listing_limit <= MAX_LISTING_LIMIT);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let cfg = LifecycleConfig {
            ttl_hours: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_post_id_scheme_parse() {
        assert_eq!("store".parse::<PostIdScheme>(), Ok(PostIdScheme::Store));
        assert_eq!(" Derived ".parse::<PostIdScheme>(), Ok(PostIdScheme::Derived));
        assert!("random".parse::<PostIdScheme>().is_err());
    }

    #[test]
    fn test_default_public_url_template() {
        assert_eq!(
            default_public_url_template("b", "eu-west-1", None),
            "https://b.s3.eu-west-1.amazonaws.com/{id}"
        );
        assert_eq!(
            default_public_url_template("b", "us-east-1", Some("http://minio:9000/")),
            "http://minio:9000/b/{id}"
        );
    }
}
