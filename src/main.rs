//! Storefront - catalog, cart, checkout and order lifecycle service

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::notify::{LogNotifier, NatsNotifier, Notifier};
use storefront::store::{memory::MemoryStore, postgres::PgStore, Store};
use storefront::{router, seed, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url, config.database_max_connections).await?),
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::default())
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable; notifications will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    tokio::spawn(sweep_sessions(store.clone()));

    let port = config.port;
    let seed_demo = config.seed_demo_data;
    let state = AppState::new(config, store, notifier)?;
    seed::bootstrap_staff(&state).await?;
    if seed_demo {
        seed::seed_demo_catalog(&state).await?;
    }

    let app = router(state);
    tracing::info!("storefront listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

/// Drops expired sessions once an hour.
async fn sweep_sessions(store: Arc<dyn Store>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        ticker.tick().await;
        match store.purge_expired_sessions(chrono::Utc::now()).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "expired sessions purged"),
            Err(e) => tracing::warn!(error = %e, "session sweep failed"),
        }
    }
}
