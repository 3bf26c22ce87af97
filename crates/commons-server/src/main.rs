mod config;
mod routes;

use tracing::info;

use commons_api::AppStateInner;
use commons_db::Database;
use commons_gateway::InMemoryBus;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "commons=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    let app = AppStateInner::new(db, InMemoryBus::shared(), config.jwt_secret.clone());
    let router = routes::router(app, config.heartbeat);

    let addr = config.addr()?;
    info!("Commons server listening on {} (heartbeat {:?})", addr, config.heartbeat);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
