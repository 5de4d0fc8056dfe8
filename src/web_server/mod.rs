use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use api::api_config;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::service::StatsService;

mod api;

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: IpAddr,
    pub port: u16,
    #[serde(default)]
    pub allow_cors: bool,
    #[serde(default)]
    pub with_prometheus: bool,
}

pub struct WebServer {
    stats_service: Arc<StatsService>,
}

impl WebServer {
    pub fn new(stats_service: Arc<StatsService>) -> Self {
        Self { stats_service }
    }

    pub fn router(&self, allow_cors: bool) -> Router {
        let router = api_config().with_state(self.stats_service.clone());
        if allow_cors {
            info!("Enabling CORS");
            let cors_layer = CorsLayer::new()
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
                .allow_origin(tower_http::cors::Any);

            router.layer(cors_layer)
        } else {
            router
        }
    }

    /// Same as `router`, plus `/metrics` rendering what `handle` recorded.
    pub fn router_with_metrics(&self, allow_cors: bool, handle: PrometheusHandle) -> Router {
        self.router(allow_cors).route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        )
    }

    pub async fn start(self, config: HttpConfig) -> Result<()> {
        let addr = SocketAddr::new(config.host, config.port);

        let router = if config.with_prometheus {
            info!("Enabling prometheus at /metrics");
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .context("Cannot install prometheus recorder")?;
            self.router_with_metrics(config.allow_cors, handle)
        } else {
            self.router(config.allow_cors)
        };

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Cannot bind to {}", addr))?;

        info!("Address binded. Starting web server on http://{}", addr);
        let output = axum::serve(listener, router).await;

        match output {
            Ok(_) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
