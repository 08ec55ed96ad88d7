use std::sync::Arc;

use anyhow::Result;
use fithub::api::create_routes;
use fithub::config::{run_migrations, AppConfig, CatalogSeeder, DatabaseConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEV_PLAN_NAME: &str = "standard";
const DEV_PLAN_UNIT_PRICE: i64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .init();

    let db_config = DatabaseConfig::from_env()?;
    let pool = db_config.create_pool().await?;
    run_migrations(&pool).await?;
    info!("Database migrations applied");

    if config.is_development() {
        CatalogSeeder::new(pool.clone())
            .seed_pricing(DEV_PLAN_NAME, DEV_PLAN_UNIT_PRICE)
            .await?;
    }

    let address = config.server_address();
    let app = create_routes(pool, Arc::new(config))?;

    let listener = TcpListener::bind(&address).await?;
    info!("FitHub server starting on http://{}", address);
    info!("Health check available at http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
