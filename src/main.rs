//! Marketplace Settlement - multi-vendor checkout and vendor payouts

use anyhow::Result;
use marketplace_settlement::{
    domain::events::EventBus,
    http,
    payments::SimulatedGateway,
    services::Marketplace,
    store::{MarketplaceStore, MemoryStore, PgStore},
    AppConfig,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env()?;

    let store: Arc<dyn MarketplaceStore> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url, config.database_max_connections).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, records are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will only be logged");
                None
            }
        },
        None => None,
    };
    let gateway = Arc::new(SimulatedGateway::new(format!("{}/simulated-processor", config.app_base_url)));

    let marketplace = Marketplace::new(store, gateway, EventBus::new(nats), &config);
    let app = http::router(marketplace);

    tracing::info!("marketplace-settlement listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
