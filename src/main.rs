//! This project is split in 2 main modules:
//!
//! - [gateway] (Sage Pay Direct implementation)
//! - [connect] (gateway.connect API surface)
#![doc = include_str!("../README.md")]

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

use anyhow::Context;
use axum::Router;
use tracing_subscriber::EnvFilter;

mod config;
/// Implementation of `gateway.connect`
///
/// This module defines the types and endpoints to communicate with the `Gateway.Connect` API.
mod connect;

mod db;
/// Gateway integration implementation
///
/// This module defines the types and methods to communicate with an external gateway. In this case it is Sage Pay Direct
mod gateway;
mod state;

fn app(state: state::AppState) -> Router {
    Router::new()
        .merge(connect::api::router())
        .nest("/sagepay", gateway::api::router())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn purge_pending_redirects(db: db::Db, ttl: Duration) {
    let mut interval = tokio::time::interval(ttl.max(Duration::from_secs(60)));
    loop {
        interval.tick().await;
        match db.purge_expired(ttl).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "Purged abandoned pending redirects"),
            Err(e) => tracing::error!("Failed to purge pending redirects: {e}"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .init();

    match dotenvy::dotenv() {
        Ok(p) => tracing::info!(path = %p.display(), "Loaded environment variables from .env file"),
        Err(e) => tracing::warn!("Failed to environment variables from .env: {e}"),
    };
    let config = config::AppConfig::from_env()?;
    let db = db::Db::connect(&config.database_url)
        .await
        .context("database is not available")?;
    let port = config.port;
    tokio::spawn(purge_pending_redirects(db.clone(), config.pending_redirect_ttl));
    let state = state::AppState::new(db, gateway::SagePayGateway::new(), config);

    let listener = tokio::net::TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("bind port {port}"))?;

    tracing::info!("Serving on port {port}");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
