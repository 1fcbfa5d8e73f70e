//! Subhook API Server
//!
//! Serves the subscription checkout endpoints and ingests Stripe webhooks.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use subhook_billing::webhooks::{EventStore, InMemoryEventStore, PgEventStore};
use subhook_shared::{create_pool, run_migrations};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subhook_api::{routes::create_router, AppState, Config, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!("Starting subhook API Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        database = config.database_url.is_some(),
        billing = config.stripe.is_some(),
        webhook_signing = config.webhook.secret.is_some(),
        "Configuration loaded"
    );

    let (store, pool) = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(url, config.database_max_connections).await?;
            run_migrations(&pool).await?;
            tracing::info!("Database connection established");
            let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set - processed events are kept in memory and lost on restart"
            );
            let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
            (store, None)
        }
    };

    let addr: SocketAddr = config.bind_address.parse()?;
    let state = AppState::new(config, store, pool);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,subhook_api=debug,subhook_billing=debug".into());

    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
