//! OpenSASE Discounts - Self-hosted discount and promotion service

use anyhow::Result;
use opensase_discounts::api::{self, AppState};
use opensase_discounts::config::AppConfig;
use opensase_discounts::repository::{DiscountRepository, InMemoryDiscountRepository, PgDiscountRepository};
use opensase_discounts::DiscountService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let repo: Arc<dyn DiscountRepository> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(url).await?;
            let repo = PgDiscountRepository::new(db);
            repo.migrate().await?;
            Arc::new(repo)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, discounts are kept in memory");
            Arc::new(InMemoryDiscountRepository::new())
        }
    };

    let mut service = DiscountService::new(repo, &config.default_currency);
    if let Some(url) = &config.nats_url {
        match async_nats::connect(url).await {
            Ok(client) => service = service.with_nats(client),
            Err(e) => tracing::warn!(error = %e, "NATS unavailable, events will not be published"),
        }
    }

    let app = api::router(AppState { service: Arc::new(service) });
    let addr = config.bind_addr()?;
    tracing::info!("🚀 OpenSASE Discounts listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
