//! Library Catalog - Binary Entry Point
//!
//! Serves the REST and WebSocket API over the configured event log.

use std::sync::Arc;

use library_catalog::api::{create_router, AppState};
use library_catalog::{Catalog, CatalogConfig};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = CatalogConfig::from_env();
    let bind_addr = config.bind_addr;
    info!(
        data_dir = %config.data_dir.display(),
        cqrs = config.cqrs_enabled,
        "Starting {} v{}",
        library_catalog::NAME,
        library_catalog::VERSION
    );

    let catalog = Arc::new(Catalog::open(config)?);
    if let Some(handle) = catalog.start()? {
        tokio::spawn(async move {
            match handle.join().await {
                Ok(outcome) => info!(
                    inserted = outcome.report().inserted,
                    "Startup rebuild finished"
                ),
                Err(e) => error!(error = %e, "Startup rebuild failed"),
            }
        });
    }

    let app = create_router(Arc::new(AppState::new(catalog)));
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Install a fmt subscriber filtered by `CATALOG_LOG` (default `info`)
fn init_tracing() {
    let filter = EnvFilter::try_from_env("CATALOG_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
