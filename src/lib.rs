use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use auth::{AccessPolicy, AuthConfig};
use service::StatsService;
use storage::{InMemoryInstallationStore, StoreConfig};
use tsdb::{RollupTimeSeries, TsdbConfig};
use web_server::{HttpConfig, WebServer};

pub mod auth;
pub mod metrics;
pub mod service;
pub mod stats;
pub mod storage;
pub mod tsdb;
pub mod types;
pub mod web_server;

#[derive(Debug, Deserialize, Clone)]
pub struct InstallStatsConfig {
    pub http: HttpConfig,
    #[serde(default)]
    pub tsdb: TsdbConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

pub fn build_stats_service(config: &InstallStatsConfig) -> Result<StatsService> {
    let time_series = RollupTimeSeries::try_new(&config.tsdb)
        .context("Cannot build time series from the tsdb configuration")?;
    let store =
        InMemoryInstallationStore::try_new(&config.store).context("Cannot build the store")?;
    let access_policy = AccessPolicy::new(config.auth.clone());

    Ok(StatsService::new(
        Arc::new(store),
        Arc::new(time_series),
        access_policy,
        config.tsdb.max_rollup_points,
    ))
}

pub async fn start(config: InstallStatsConfig) -> Result<()> {
    let stats_service = build_stats_service(&config)?;
    let web_server = WebServer::new(Arc::new(stats_service));

    info!(
        "Starting web server on {}:{}",
        config.http.host, config.http.port
    );

    web_server.start(config.http).await?;

    Ok(())
}
