use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use api::{AppState, build_router, config};
use application::DocumentStore;
use infrastructure::InMemoryDocumentStore;

// Application entry point
#[tokio::main]
async fn main() {
    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("Logger initialized successfully.");

    let cfg = config::load();

    // --- Dependency Injection ---
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new(cfg.store_name()));
    info!(database = %store.name(), "In-memory document store initialized.");

    let app = build_router(AppState::new(Some(store), cfg.database_settings()));
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
