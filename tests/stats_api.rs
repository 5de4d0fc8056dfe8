use std::{io::Write, sync::Arc};

use axum::{
    body::Body,
    http::{self, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use installstats::{build_stats_service, web_server::WebServer, InstallStatsConfig};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt;

const DAY: i64 = 86400;
// 2024-03-01T00:00:00Z
const MARCH_1: i64 = 1_709_251_200;

fn write_seed() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    let seed = json!({
        "apps": [
            { "slug": "acme-alerts", "owner": 1 },
            { "slug": "other-app", "owner": 2 },
        ],
        "installations": [
            { "app": "acme-alerts", "organization": 10, "dateAdded": "2024-03-01T09:15:00Z" },
            { "app": "acme-alerts", "organization": 11, "dateAdded": "2024-03-01T12:40:00Z", "dateDeleted": "2024-03-02T08:00:00Z" },
            { "app": "acme-alerts", "organization": 12, "dateAdded": "2024-03-03T17:05:00Z" },
            { "app": "acme-alerts", "organization": 13, "dateAdded": "2024-03-04T10:30:00Z", "dateDeleted": "2024-03-20T10:30:00Z" },
            { "app": "other-app", "organization": 10, "dateAdded": "2024-03-01T09:15:00Z", "dateDeleted": "2024-03-01T10:15:00Z" },
        ],
    });
    file.write_all(seed.to_string().as_bytes()).unwrap();
    file
}

fn create_router(seed: &NamedTempFile) -> Router {
    let config: InstallStatsConfig = serde_json::from_value(json!({
        "http": { "host": "127.0.0.1", "port": 0 },
        "store": { "seed_path": seed.path() },
        "auth": {
            "tokens": [{ "token": "acme-token", "organization": 1 }],
        },
    }))
    .unwrap();

    let service = build_stats_service(&config).unwrap();
    WebServer::new(Arc::new(service)).router(config.http.allow_cors)
}

async fn get_stats(router: &Router, query: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .uri(format!("/api/0/sentry-apps/acme-alerts/stats/?{query}"))
        .method(http::Method::GET)
        .header(http::header::AUTHORIZATION, "Bearer acme-token")
        .body(Body::empty())
        .unwrap();

    let resp = router.clone().oneshot(req).await.unwrap();

    let status_code = resp.status();
    let content_type = resp
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok())
        .expect("responses carry a content type");
    assert_eq!(content_type, mime::APPLICATION_JSON);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let output = serde_json::from_slice::<Value>(&body).unwrap();

    (status_code, output)
}

#[tokio::test]
async fn test_daily_stats() {
    let seed = write_seed();
    let router = create_router(&seed);

    let (status_code, output) = get_stats(
        &router,
        &format!("since={}&until={}&resolution=1d", MARCH_1, MARCH_1 + 4 * DAY),
    )
    .await;

    assert_eq!(status_code, StatusCode::OK);
    assert_eq!(
        output,
        json!({
            "totalInstalls": 4,
            "totalUninstalls": 2,
            "installStats": [
                [MARCH_1, 2],
                [MARCH_1 + DAY, 0],
                [MARCH_1 + 2 * DAY, 1],
                [MARCH_1 + 3 * DAY, 1],
                [MARCH_1 + 4 * DAY, 0],
            ],
            "uninstallStats": [
                [MARCH_1, 0],
                [MARCH_1 + DAY, 1],
                [MARCH_1 + 2 * DAY, 0],
                [MARCH_1 + 3 * DAY, 0],
                [MARCH_1 + 4 * DAY, 0],
            ],
        })
    );
}

#[tokio::test]
async fn test_narrow_window_keeps_all_time_totals() {
    let seed = write_seed();
    let router = create_router(&seed);

    let (status_code, output) = get_stats(
        &router,
        &format!(
            "since={}&until={}&resolution=1d",
            MARCH_1 + 2 * DAY,
            MARCH_1 + 3 * DAY - 1
        ),
    )
    .await;

    assert_eq!(status_code, StatusCode::OK);
    assert_eq!(
        output,
        json!({
            "totalInstalls": 4,
            "totalUninstalls": 2,
            "installStats": [[MARCH_1 + 2 * DAY, 1]],
            "uninstallStats": [[MARCH_1 + 2 * DAY, 0]],
        })
    );
}

#[tokio::test]
async fn test_optimal_rollup_is_hourly_for_a_few_days() {
    let seed = write_seed();
    let router = create_router(&seed);

    let (status_code, output) =
        get_stats(&router, &format!("since={}&until={}", MARCH_1, MARCH_1 + 4 * DAY)).await;

    assert_eq!(status_code, StatusCode::OK);
    let installs = output["installStats"].as_array().unwrap();
    let uninstalls = output["uninstallStats"].as_array().unwrap();
    assert_eq!(installs.len(), 4 * 24 + 1);
    assert_eq!(uninstalls.len(), installs.len());

    let total: i64 = installs.iter().map(|p| p[1].as_i64().unwrap()).sum();
    assert_eq!(total, 4);

    // 2024-03-01T09:15:00Z lands in the 09:00 bucket
    assert_eq!(installs[9], json!([MARCH_1 + 9 * 3600, 1]));
}

#[test]
fn test_shipped_configuration_is_valid() {
    let settings = config::Config::builder()
        .add_source(
            config::File::with_name(concat!(env!("CARGO_MANIFEST_DIR"), "/config.jsonc"))
                .format(config::FileFormat::Json5),
        )
        .build()
        .unwrap();

    let config = settings.try_deserialize::<InstallStatsConfig>().unwrap();
    assert_eq!(config.http.port, 8080);
    assert_eq!(config.tsdb.rollups.len(), 3);
    assert_eq!(config.tsdb.max_rollup_points, 10_000);
    assert_eq!(config.auth.tokens.len(), 2);
}
