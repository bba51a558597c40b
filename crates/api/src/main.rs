//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use entity_store::{EntityStore, InMemoryStore, PostgresStore};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S: EntityStore + 'static>(
    store: Arc<S>,
    config: Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = api::create_default_state(store, config.retry_policy(), config.push_timeout());
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()?;

    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
            let store = PostgresStore::new(pool);
            store.ensure_schema().await?;
            serve(Arc::new(store), config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on the in-memory store");
            serve(Arc::new(InMemoryStore::new()), config, metrics_handle).await
        }
    }
}
