use anyhow::{Context, Result};
use prism::api::{create_router, AppState};
use prism::config::PrismConfig;
use prism::connection::ConnectionStore;
use prism::credentials::SqliteTokenStore;
use prism::normalize::NormalizerRegistry;
use prism::oauth::{run_state_cleanup, OAuthCoordinator, StateManager};
use prism::proxy::RequestProxy;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prism=info".into()),
        )
        .init();

    let config = PrismConfig::from_env()?;
    let encryption_key = std::env::var("PRISM_ENCRYPTION_KEY")
        .context("PRISM_ENCRYPTION_KEY must be set (base64-encoded 32-byte key)")?;

    let connection_store = Arc::new(ConnectionStore::new(&config.storage.db_path)?);
    let token_store = Arc::new(SqliteTokenStore::new(
        &config.storage.db_path,
        &encryption_key,
    )?);
    let coordinator = Arc::new(OAuthCoordinator::new());
    let proxy = Arc::new(RequestProxy::new(token_store.clone(), coordinator.clone()));
    let normalizer = Arc::new(NormalizerRegistry::with_builtins());
    let state_manager = StateManager::new(config.oauth.state_expiry_seconds);

    // Periodically drop expired CSRF states
    tokio::spawn(run_state_cleanup(state_manager.clone(), 60));

    let app = create_router(AppState {
        connection_store,
        token_store,
        coordinator,
        proxy,
        normalizer,
        state_manager,
        callback_base_url: config.api.callback_base_url.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.api.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.api.bind_addr))?;
    info!(addr = %config.api.bind_addr, "Prism gateway listening");

    axum::serve(listener, app).await?;

    Ok(())
}
