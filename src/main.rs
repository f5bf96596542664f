mod api;
mod cache;
mod config;
mod engine;
mod error;
mod models;
mod observability;
mod session;
mod stream;

use std::env;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::HttpApi;
use crate::cache::SnapshotCache;
use crate::observability::metrics::Metrics;
use crate::session::Session;

/// Headless rider client: logs in with credentials from the environment, goes
/// online and prints every notification until ctrl-c.
#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let username = env::var("RIDER_USERNAME")
        .map_err(|_| error::AppError::Config("RIDER_USERNAME not set".to_string()))?;
    let password = env::var("RIDER_PASSWORD")
        .map_err(|_| error::AppError::Config("RIDER_PASSWORD not set".to_string()))?;

    let api = Arc::new(HttpApi::new(&config)?);
    let cache = SnapshotCache::new(config.cache_path.clone());
    let metrics = Arc::new(Metrics::new());

    let (session, mut streams) = Session::start(config, api, cache, metrics.clone()).await;

    session.login(&username, &password).await?;
    if !session.snapshot().profile.is_some_and(|p| p.is_available) {
        session.set_availability(true).await?;
    }

    loop {
        tokio::select! {
            notification = streams.notifications.recv() => match notification {
                Some(notification) => tracing::info!("{}", notification.message()),
                None => break,
            },
            _ = shutdown_signal() => break,
        }
    }

    session.logout().await;

    if let Ok(body) = metrics.encode() {
        tracing::debug!("final metrics:\n{body}");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
