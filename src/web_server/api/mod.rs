use std::sync::{atomic::AtomicUsize, Arc};

use axum::{extract::MatchedPath, response::IntoResponse, routing::get, Router};
use http::Request;
use tower_http::trace::TraceLayer;
use tracing::info_span;

use crate::service::StatsService;

mod stats;
mod util;

pub fn api_config() -> Router<Arc<StatsService>> {
    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health));
    let router = router.nest("/api/0/sentry-apps", stats::apis());

    let counter = Arc::new(AtomicUsize::new(0));

    router.layer(
        TraceLayer::new_for_http().make_span_with(move |request: &Request<_>| {
            let req_id = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let matched_path = request
                .extensions()
                .get::<MatchedPath>()
                .map(MatchedPath::as_str);
            info_span!(
                "http_request",
                req_id,
                method = ?request.method(),
                path = ?request.uri().path(),
                matched_path,
            )
        }),
    )
}

static INDEX_MESSAGE: &str = "hi! welcome to installstats";
async fn index() -> impl IntoResponse {
    INDEX_MESSAGE
}

static HEALTH_MESSAGE: &str = "up";
async fn health() -> impl IntoResponse {
    HEALTH_MESSAGE
}
