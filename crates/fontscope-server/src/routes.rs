//! HTTP API
//!
//! - `POST /api/fonts` with `{"url": "..."}`
//! - `GET /api/fonts?url=...`
//! - `GET /health`
//!
//! Errors are `{"error": "..."}` with 400 for a bad request, 502 when the
//! page cannot be loaded and 500 for anything else.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Query, Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use fontscope::{Acquisition, Error, FontCatalog, Scanner};
use serde::Deserialize;
use serde_json::json;

/// Body of `POST /api/fonts`, also the query of `GET /api/fonts`
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Build the axum router
pub fn build_router<A>(scanner: Arc<Scanner<A>>) -> Router
where
    A: Acquisition + 'static,
{
    Router::new()
        .route("/api/fonts", get(scan_query::<A>).post(scan_body::<A>))
        .route("/health", get(health))
        .with_state(scanner)
        .layer(middleware::from_fn(log_requests))
}

async fn health() -> &'static str {
    "ok"
}

async fn scan_body<A>(
    State(scanner): State<Arc<Scanner<A>>>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<FontCatalog>, ApiError>
where
    A: Acquisition + 'static,
{
    let Json(request) = payload.map_err(|rejection| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: rejection.body_text(),
    })?;
    run_scan(&scanner, request).await
}

async fn scan_query<A>(
    State(scanner): State<Arc<Scanner<A>>>,
    Query(request): Query<ScanRequest>,
) -> Result<Json<FontCatalog>, ApiError>
where
    A: Acquisition + 'static,
{
    run_scan(&scanner, request).await
}

async fn run_scan<A: Acquisition>(
    scanner: &Scanner<A>,
    request: ScanRequest,
) -> Result<Json<FontCatalog>, ApiError> {
    let target = normalize_target_url(request.url.as_deref().unwrap_or_default());
    let catalog = scanner.scan(&target).await?;
    Ok(Json(catalog))
}

/// Prepend `https://` when the caller left out the scheme.
///
/// Empty input stays empty so the scanner can report it as missing.
pub fn normalize_target_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.contains("://") {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{raw}")
    }
}

/// An error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_validation() {
            StatusCode::BAD_REQUEST
        } else if matches!(err, Error::PrimaryFetch { .. }) {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(error = %err, status = status.as_u16(), "scan failed");
        } else {
            tracing::warn!(error = %err, "rejected scan request");
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Logging middleware
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    if status >= 500 {
        tracing::error!("{} {} -> {} in {:.1}ms", method, path, status, latency_ms);
    } else if status >= 400 {
        tracing::warn!("{} {} -> {} in {:.1}ms", method, path, status, latency_ms);
    } else {
        tracing::info!("{} {} -> {} in {:.1}ms", method, path, status, latency_ms);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_target_url() {
        assert_eq!(normalize_target_url("example.com"), "https://example.com");
        assert_eq!(normalize_target_url(" //cdn.example.com/x "), "https://cdn.example.com/x");
        assert_eq!(normalize_target_url("http://example.com/a"), "http://example.com/a");
        assert_eq!(normalize_target_url("   "), "");
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |err: Error| ApiError::from(err).status;
        assert_eq!(status(Error::MissingUrl), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(Error::PrimaryFetch {
                url: "https://example.com/".into(),
                reason: "HTTP 503".into(),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(Error::Browser("crashed".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
