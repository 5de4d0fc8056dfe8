use std::collections::HashMap;

use axum::{
    extract::{FromRequestParts, Path},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use http::{request::Parts, StatusCode};
use serde_json::json;
use tracing::error;

use crate::{
    service::StatsError,
    types::{ApiKey, AppSlug},
};

impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let bearer_token = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({
                        "message": format!("missing api key: {:?}", e)
                    })),
                )
            })?;
        let bearer_token = bearer_token.0 .0;

        let api_key = ApiKey::try_new(bearer_token.token()).map_err(|e| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "message": format!("Bad API key: {:?}", e)
                })),
            )
        })?;

        Ok(api_key)
    }
}

impl<S> FromRequestParts<S> for AppSlug
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let a = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "message": format!("missing app slug: {:?}", e)
                    })),
                )
            })?;

        let slug = a.get("app_slug").ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "message": "missing app slug"
                })),
            )
        })?;

        let slug = AppSlug::try_new(slug).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "message": format!("Bad app slug: {:?}", e)
                })),
            )
        })?;

        Ok(slug)
    }
}

pub fn print_error(e: &anyhow::Error, msg: &'static str) {
    error!(error = ?e, msg);
    e.chain()
        .skip(1)
        .for_each(|cause| error!(cause = ?cause, "because"));
}

impl IntoResponse for StatsError {
    fn into_response(self) -> Response {
        match self {
            StatsError::Generic(e) => {
                print_error(&e, "Unhandled error in stats side");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "message": format!("Cannot process the request: {:?}", e)
                    })),
                )
                    .into_response()
            }
            StatsError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Invalid API key" })),
            )
                .into_response(),
            StatsError::AppNotFound(slug) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": format!("App {} not found", slug) })),
            )
                .into_response(),
            StatsError::Forbidden(slug) => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "message": format!("You do not have permission to read stats of app {}", slug)
                })),
            )
                .into_response(),
            e @ StatsError::TooManyBuckets { .. } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": e.to_string() })),
            )
                .into_response(),
        }
    }
}
