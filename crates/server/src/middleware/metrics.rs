//! HTTP request metrics
//!
//! `http_requests_total` and `http_request_duration_seconds`, labelled by
//! method, route and status.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};

/// Label for a request path. Numeric and UUID segments collapse to `:id`.
fn route_label(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            let numeric = !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit());
            if numeric || uuid::Uuid::try_parse(seg).is_ok() {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Middleware that records request count and duration.
///
/// Uses the matched route template when one is known, else the normalised path.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_owned();
    let route = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_owned(),
        None => route_label(request.uri().path()),
    };

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed().as_secs_f64();

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "route" => route
    )
    .record(elapsed);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label() {
        assert_eq!(route_label("/admin/entries/42"), "/admin/entries/:id");
        assert_eq!(
            route_label("/api/items/3f1c2f7e-8a54-4c38-9a7e-0c6d1d2b9e11"),
            "/api/items/:id"
        );
        assert_eq!(route_label("/api/v2/echo"), "/api/v2/echo");
        assert_eq!(route_label("/"), "/");
    }
}
