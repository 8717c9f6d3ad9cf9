//! reqlog-server: audited HTTP API binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reqlog_server::config::{Config, OpenFailurePolicy};
use reqlog_server::db::{self, MemoryStore, PgStore, SharedStore};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();

    // Select the audit store
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url)
                .await
                .expect("Failed to create database pool");
            let store = PgStore::new(pool);
            store
                .init_schema()
                .await
                .expect("Failed to initialize audit schema");
            tracing::info!("Audit entries stored in Postgres");
            Arc::new(store)
        }
        None => match config.memory_max_entries {
            Some(max) => {
                tracing::warn!(
                    max_entries = max,
                    "DATABASE_URL not set, audit entries are kept in memory only, oldest evicted first"
                );
                Arc::new(MemoryStore::with_max_entries(max))
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL not set, audit entries are kept in memory only and grow without bound \
                     (set AUDIT_MEMORY_MAX_ENTRIES to cap them)"
                );
                Arc::new(MemoryStore::new())
            }
        },
    };

    // Log startup info
    if config.admin_api_key.is_some() {
        tracing::info!("Admin key authentication enabled");
    } else {
        tracing::warn!("Admin key authentication disabled (no ADMIN_API_KEY env var)");
    }
    match config.on_open_failure {
        OpenFailurePolicy::Reject => {
            tracing::info!("Requests fail when their audit entry cannot be recorded")
        }
        OpenFailurePolicy::Continue => {
            tracing::warn!("Requests proceed unaudited when their audit entry cannot be recorded")
        }
    }
    tracing::info!(
        max_body_bytes = config.max_body_bytes,
        "Audit body capture limit"
    );

    // Build application
    let app = reqlog_server::build_app(store, &config, reqlog_server::routes::echo::routes());

    // Start server
    let addr: SocketAddr = config.bind_address.parse().expect("Invalid bind address");
    tracing::info!("Starting reqlog server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .unwrap();

    tracing::info!("Server shutdown complete");
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
