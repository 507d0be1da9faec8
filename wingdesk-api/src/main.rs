use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wingdesk_api::{app, AppState, AuthConfig};
use wingdesk_store::{Config, DbClient, PgHistorySink, PgRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wingdesk_api=debug,wingdesk_sales=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!("Starting Wingdesk API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to Postgres")?;
    db.migrate().await.context("failed to run migrations")?;

    // Rows in business_rules override the file configuration.
    let rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .context("failed to load business rules")?;
    tracing::info!(
        "Business rules: restock {:?}, on-sale window {} days, carrier {}",
        rules.restock_policy,
        rules.max_on_sale_days,
        rules.default_carrier_code
    );

    let state = AppState::new(
        Arc::new(PgRepository::new(db.pool.clone())),
        Arc::new(PgHistorySink::new(db.pool.clone())),
        &rules,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
