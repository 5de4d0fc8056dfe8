use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use http::StatusCode;
use num_traits::cast;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::{
    service::StatsService,
    stats::{InstallStats, QueryWindow},
    tsdb::{series_len, Rollup, TimeSeries},
    types::{ApiKey, AppSlug},
};

pub fn apis() -> Router<Arc<StatsService>> {
    Router::new()
        .route("/{app_slug}/stats/", get(get_app_stats))
        .route("/{app_slug}/stats", get(get_app_stats))
}

/// Raw query string; every field is validated by hand to report
/// which one is wrong.
#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    since: Option<String>,
    until: Option<String>,
    resolution: Option<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("since must be a numeric timestamp")]
    InvalidSince,
    #[error("until must be a numeric timestamp")]
    InvalidUntil,
    #[error("start must be before or equal to end")]
    InvertedWindow,
    #[error("Invalid resolution")]
    InvalidResolution,
    #[error("Your interval and date range would create too many results. Use a larger interval, or a smaller date range.")]
    TooManyPoints,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": self.to_string() })),
        )
            .into_response()
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let seconds: f64 = raw?.trim().parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }

    let whole = seconds.floor();
    let nanos = cast::<f64, u32>(((seconds - whole) * 1e9).round())?.min(999_999_999);
    DateTime::from_timestamp(cast::<f64, i64>(whole)?, nanos)
}

impl StatsQuery {
    pub fn into_window(
        self,
        time_series: &dyn TimeSeries,
        max_rollup_points: usize,
    ) -> Result<QueryWindow, QueryError> {
        let resolution = match self.resolution.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let rollup = Rollup::parse(raw).map_err(|_| QueryError::InvalidResolution)?;
                if !time_series.rollups().contains(&rollup) {
                    return Err(QueryError::InvalidResolution);
                }
                Some(rollup)
            }
        };

        let end = parse_timestamp(self.until.as_deref()).ok_or(QueryError::InvalidUntil)?;
        let start = parse_timestamp(self.since.as_deref()).ok_or(QueryError::InvalidSince)?;
        if start > end {
            return Err(QueryError::InvertedWindow);
        }

        let rollup = resolution.unwrap_or_else(|| time_series.optimal_rollup(start, end));
        match cast::<u64, usize>(series_len(start, end, rollup)) {
            Some(points) if points <= max_rollup_points => {}
            _ => return Err(QueryError::TooManyPoints),
        }

        Ok(QueryWindow {
            start,
            end,
            resolution,
        })
    }
}

async fn get_app_stats(
    api_key: ApiKey,
    slug: AppSlug,
    service: State<Arc<StatsService>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<InstallStats>, Response> {
    let app = service
        .authorize(&api_key, slug)
        .await
        .map_err(IntoResponse::into_response)?;

    let window = query
        .into_window(service.time_series(), service.max_rollup_points())
        .map_err(IntoResponse::into_response)?;

    let stats = service
        .install_stats(&app, window)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(stats))
}
