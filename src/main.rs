use std::{net::SocketAddr, str::FromStr, sync::Arc};

use anyhow::Context;
use router::routers;
use tracing_subscriber::EnvFilter;

use crate::{
    cache::{BalanceCache, MemoryCache, NoCache, RedisCache},
    db::{
        api::AccountStore, memory::MemoryAccountStore, postgres::PgAccountStore,
        registry::Registry,
    },
    service::{AccountService, ServiceOptions},
};

mod cache;
mod config;
mod db;
mod error;
mod handler;
mod router;
mod service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = config::Config::load_config()?;

    let store = build_store(&config).await?;
    let cache = build_cache(&config).await;
    let service = AccountService::new(
        Arc::new(Registry::new()),
        store,
        cache,
        ServiceOptions::from(&config),
    );

    let app = routers(Arc::new(service));

    let addr = SocketAddr::from_str(&format!("{}:{}", config.server.addr, config.server.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

// an enabled but unreachable database is fatal
async fn build_store(config: &config::Config) -> anyhow::Result<Arc<dyn AccountStore>> {
    if !config.database.enabled {
        tracing::warn!("Database disabled, balances are kept in memory only");
        return Ok(Arc::new(MemoryAccountStore::new()));
    }
    let store = PgAccountStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Error while connecting to database")?;
    store
        .init_schema()
        .await
        .context("Error while creating table")?;
    tracing::info!("Connected to database");
    Ok(Arc::new(store))
}

async fn build_cache(config: &config::Config) -> Arc<dyn BalanceCache> {
    if !config.cache.enabled {
        return Arc::new(NoCache);
    }
    if config.cache.url == "memory" {
        tracing::info!("Using in-process balance cache");
        return Arc::new(MemoryCache::new(config.cache.ttl()));
    }
    match RedisCache::connect(&config.cache.url, config.cache.ttl()).await {
        Ok(cache) => {
            tracing::info!("Connected to redis at {}", config.cache.url);
            Arc::new(cache)
        }
        Err(err) => {
            tracing::warn!("Redis unavailable, running without cache: {err}");
            Arc::new(NoCache)
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
