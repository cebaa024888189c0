use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use guestboard_service::blob::{BlobStore, InMemoryBlobStore, PublicUrlTemplate, S3BlobStore};
use guestboard_service::clock::{Clock, SystemClock};
use guestboard_service::config::{BlobBackend, Config, MetadataBackend};
use guestboard_service::db::{InMemoryMetadataStore, MetadataStore, PgMetadataStore};
use guestboard_service::handlers::{self, HealthState};
use guestboard_service::jobs::{run_job_loop, BlobReconcilerJob, ExpirySweeperJob, PeriodicJob};
use guestboard_service::services::{GuestRegistry, PostLifecycleManager};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing(json: bool) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into()),
    );
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn build_metadata_store(config: &Config) -> anyhow::Result<Arc<dyn MetadataStore>> {
    match config.database.backend {
        MetadataBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .acquire_timeout(config.lifecycle.call_timeout())
                .connect(&config.database.url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Connected to PostgreSQL, migrations applied");
            Ok(Arc::new(PgMetadataStore::new(pool)))
        }
        MetadataBackend::Memory => {
            tracing::warn!("Using in-memory metadata store; posts do not survive restarts");
            Ok(Arc::new(InMemoryMetadataStore::new()))
        }
    }
}

async fn build_blob_store(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn BlobStore>> {
    let max_bytes = config.lifecycle.max_attachment_bytes;
    match config.blob.backend {
        BlobBackend::S3 => {
            let store = S3BlobStore::connect(&config.blob, max_bytes).await?;
            Ok(Arc::new(store))
        }
        BlobBackend::Memory => {
            tracing::warn!("Using in-memory blob store; attachments do not survive restarts");
            let template = PublicUrlTemplate::new(config.blob.public_url_template.clone())
                .map_err(anyhow::Error::msg)?;
            Ok(Arc::new(
                InMemoryBlobStore::new(config.blob.prefix.clone(), template, max_bytes)
                    .with_clock(clock),
            ))
        }
    }
}

fn io_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(config.app.json_logs);

    tracing::info!("Starting guestboard-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        env = %config.app.env,
        ttl_hours = config.lifecycle.ttl_hours,
        post_id_scheme = ?config.lifecycle.post_id_scheme,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let meta = build_metadata_store(&config)
        .await
        .map_err(|e| io_error("Failed to initialize metadata store", e))?;
    let blob = build_blob_store(&config, clock.clone())
        .await
        .map_err(|e| io_error("Failed to initialize blob store", e))?;

    let manager = Arc::new(PostLifecycleManager::new(
        &config.lifecycle,
        blob.clone(),
        meta.clone(),
        clock.clone(),
    ));
    let registry = Arc::new(GuestRegistry::new(
        meta.clone(),
        clock.clone(),
        config.lifecycle.call_timeout(),
    ));

    let manager_data = web::Data::from(manager.clone());
    let registry_data = web::Data::from(registry);
    let health_state = web::Data::new(HealthState {
        meta: meta.clone(),
        blob: blob.clone(),
        probe_timeout: Duration::from_secs(2),
    });

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server at {}", bind_address);

    let cors_origins = config.cors.allowed_origins.clone();
    let server = HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in cors_origins.split(',') {
            let origin = origin.trim();
            if origin == "*" {
                cors = cors.allow_any_origin();
            } else if !origin.is_empty() {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(manager_data.clone())
            .app_data(registry_data.clone())
            .app_data(health_state.clone())
            .wrap(cors)
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run();

    let server_handle = server.handle();
    let (shutdown_tx, _) = broadcast::channel(1);
    let mut tasks: JoinSet<io::Result<()>> = JoinSet::new();

    tasks.spawn(async move {
        tracing::info!("HTTP server is running");
        server.await
    });

    let mut jobs: Vec<Arc<dyn PeriodicJob>> = vec![Arc::new(ExpirySweeperJob::new(
        manager.clone(),
        &config.lifecycle,
    ))];
    if config.reconcile.enabled {
        jobs.push(Arc::new(BlobReconcilerJob::new(
            manager.clone(),
            &config.reconcile,
        )));
    }
    for job in jobs {
        let shutdown_rx = shutdown_tx.subscribe();
        tasks.spawn(async move {
            run_job_loop(job, shutdown_rx).await;
            Ok(())
        });
    }

    let mut first_error: Option<io::Error> = None;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = tasks.join_next() => {
                match result {
                    Some(Ok(Ok(()))) => {
                        tracing::info!("Background task completed");
                    }
                    Some(Ok(Err(e))) => {
                        tracing::error!("Task returned error: {}", e);
                        first_error.get_or_insert(e);
                        let _ = shutdown_tx.send(());
                        server_handle.stop(true).await;
                        tasks.shutdown().await;
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!("Task join error: {}", e);
                        first_error.get_or_insert_with(|| io_error("task join", e));
                        let _ = shutdown_tx.send(());
                        server_handle.stop(true).await;
                        tasks.shutdown().await;
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(());
                server_handle.stop(true).await;
                while let Some(result) = tasks.join_next().await {
                    if let Ok(Err(e)) = result {
                        tracing::warn!("Task ended with error during shutdown: {}", e);
                    }
                }
                break;
            }
        }
    }

    tracing::info!("guestboard-service stopped");
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
