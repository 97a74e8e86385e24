//! Router provisioning service: categories, centroids, prompts and links.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use router_manager::api::{self, AppState};
use router_manager::provisioning::ProvisioningPolicy;
use router_manager::schema::ensure_schema;
use sea_orm::Database;
use shared::config::Settings;
use shared::db::ensure_sslmode_disable;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging via RUST_LOG
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let mut settings = Settings::new().unwrap_or_else(|e| {
        warn!("falling back to default settings: {e}");
        Settings::default()
    });
    settings.database_url = ensure_sslmode_disable(&settings.database_url);

    let db = Database::connect(&settings.database_url)
        .await
        .context("connect database")?;
    ensure_schema(&db).await.context("ensure schema")?;

    let policy = ProvisioningPolicy::from(&settings);
    info!(?policy, router_api_url = %settings.router_api_url, "provisioning policy loaded");

    let state = Arc::new(AppState {
        db,
        http: reqwest::Client::new(),
        router_api_url: settings.router_api_url.clone(),
        policy,
    });
    let app = api::router(state);

    let addr: SocketAddr = settings.bind_addr.parse().context("parse BIND_ADDR")?;
    info!("starting router-manager on {addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
