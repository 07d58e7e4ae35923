//! API Server binary entrypoint.

use api_server::{ApiServer, ServerConfig};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_server=debug,security=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database is optional: without DATABASE_URL the server runs on
    // in-memory stores with seeded demo users.
    let pool = match std::env::var("DATABASE_URL") {
        Ok(database_url) => Some(
            PgPoolOptions::new()
                .max_connections(20)
                .connect(&database_url)
                .await?,
        ),
        Err(_) => None,
    };

    let config = ServerConfig::from_env();
    let server = ApiServer::new(config, pool).await?;
    server.run().await?;

    Ok(())
}
