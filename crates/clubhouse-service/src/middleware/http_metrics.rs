//! HTTP metrics middleware.
//!
//! Applied as the outermost layer so it also sees framework-level
//! rejections (400 on bad JSON, 404, 405, 415) that never reach a handler.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Label used for requests that did not match any route.
const UNMATCHED_ENDPOINT: &str = "/other";

/// Middleware that records method, route template, status and duration
/// for every response.
///
/// The endpoint label is the matched route template (`/api/v1/posts/:id`),
/// never the raw path, so ids do not leak into label values.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());

    let response = next.run(request).await;

    record_http_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed(),
    );

    response
}
