mod accounts;
mod auth;
mod catalog;
mod config;
mod db;
mod entities;
mod error;
mod interactions;
mod models;
mod routes;
mod scheduler;
mod sync;
mod tmdb;

use std::sync::Arc;

use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    accounts::Accounts,
    auth::TokenKeys,
    catalog::CatalogStore,
    config::Config,
    interactions::Interactions,
    scheduler::SyncScheduler,
    sync::Synchronizer,
    tmdb::{TmdbClient, TmdbSettings},
};

pub struct AppState {
    pub catalog: CatalogStore,
    pub accounts: Accounts,
    pub interactions: Interactions,
    pub synchronizer: Arc<Synchronizer>,
    pub tokens: TokenKeys,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,reelhouse=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;

    let http = reqwest::Client::builder()
        .user_agent("reelhouse/0.1")
        .timeout(config.tmdb_timeout)
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let catalog = CatalogStore::new(db.clone());

    let tmdb = TmdbClient::new(
        http,
        TmdbSettings {
            api_key: config.tmdb_api_key.clone(),
            base_url: config.tmdb_base_url.clone(),
            language: config.tmdb_language.clone(),
            page: config.tmdb_page,
            timeout: config.tmdb_timeout,
            rps: config.tmdb_rps,
        },
    );
    let synchronizer = Arc::new(Synchronizer::new(Arc::new(tmdb), Arc::new(catalog.clone())));

    let state = Arc::new(AppState {
        catalog,
        accounts: Accounts::new(db.clone()),
        interactions: Interactions::new(db.clone()),
        synchronizer: synchronizer.clone(),
        tokens: TokenKeys::new(&config.jwt_secret, config.jwt_ttl_secs),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.sync_enabled {
        Some(SyncScheduler::new(config.sync_schedule.clone(), synchronizer).start(shutdown_rx))
    } else {
        tracing::info!("catalog sync scheduler disabled");
        None
    };

    let app = routes::router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        handle.await?;
    }
    db.close().await?;
    tracing::info!("shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
