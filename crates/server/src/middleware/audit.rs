//! Audit trail middleware
//!
//! Buffers the request body, opens an audit entry, runs the handler, then
//! buffers the response body and closes the entry. Bodies above the
//! configured limit, or whose stream fails, are replayed to the handler or
//! caller unchanged and recorded as absent.

use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::{StreamExt, future, stream};
use http_body_util::BodyExt;
use reqlog_core::Actor;
use serde_json::{Map, Value as JsonValue};

use super::request_id::RequestId;
use crate::AppState;
use crate::config::OpenFailurePolicy;
use crate::error::AppError;
use crate::interceptor::{RequestSnapshot, ResponseSnapshot};

/// Header carrying the original client address when behind a proxy
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Middleware that records every request/response cycle in the audit trail
pub async fn audit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let limit = state.config.max_body_bytes;
    let (parts, body) = request.into_parts();

    let (body, request_data) = capture_request_body(&parts.headers, body, limit).await;

    let snapshot = request_snapshot(&parts, request_data);
    let handle = match state.interceptor.on_request_start(&snapshot).await {
        Ok(handle) => Some(handle),
        Err(err) => match state.config.on_open_failure {
            OpenFailurePolicy::Reject => {
                return AppError::Internal(format!("Audit entry could not be recorded: {}", err))
                    .into_response();
            }
            OpenFailurePolicy::Continue => None,
        },
    };

    let response = next.run(Request::from_parts(parts, body)).await;

    let (response, response_data) = capture_response_body(response, limit).await;
    let outcome = ResponseSnapshot {
        status: response.status().as_u16(),
        body: response_data,
    };
    state.interceptor.on_response_finalize(handle, &outcome).await;

    response
}

fn request_snapshot(parts: &Parts, body: Option<JsonValue>) -> RequestSnapshot {
    RequestSnapshot {
        request_id: parts.extensions.get::<RequestId>().map(|r| r.0.clone()),
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        host: header_string(&parts.headers, header::HOST.as_str())
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default(),
        forwarded_for: header_string(&parts.headers, FORWARDED_FOR_HEADER),
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
        user_agent: header_string(&parts.headers, header::USER_AGENT.as_str()),
        query_params: Some(parse_form(parts.uri.query().unwrap_or_default().as_bytes())),
        body,
        actor: parts.extensions.get::<Actor>().cloned(),
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Decode `a=1&b=2` into a mapping. The last value wins for repeated keys.
fn parse_form(raw: &[u8]) -> JsonValue {
    let map: Map<String, JsonValue> = url::form_urlencoded::parse(raw)
        .map(|(k, v)| (k.into_owned(), JsonValue::String(v.into_owned())))
        .collect();
    JsonValue::Object(map)
}

/// Interpret a request body as structured data, if it is JSON or a form.
fn parse_request_payload(content_type: Option<&str>, bytes: &[u8]) -> Option<JsonValue> {
    if bytes.is_empty() {
        return None;
    }
    match content_type {
        Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => Some(parse_form(bytes)),
        Some(ct) if !ct.contains("json") => None,
        _ => serde_json::from_slice(bytes).ok(),
    }
}

/// A body read up to a byte limit.
enum Buffered {
    /// The whole body fit within the limit.
    Complete(Bytes),
    /// The limit was exceeded or the stream failed. The body replays the bytes
    /// already read followed by the rest of the original stream or its error.
    Replayed(Body),
}

async fn buffer_body(mut body: Body, limit: usize) -> Buffered {
    let mut buffered: Vec<u8> = Vec::new();
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                // Trailers carry no payload
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                buffered.extend_from_slice(&data);
                if buffered.len() > limit {
                    let prefix = stream::once(future::ready(Ok::<_, axum::Error>(Bytes::from(
                        buffered,
                    ))));
                    let rest = body.into_data_stream();
                    return Buffered::Replayed(Body::from_stream(prefix.chain(rest)));
                }
            }
            Err(err) => {
                tracing::warn!(target: "audit", error = %err, "Body stream failed while buffering");
                let replay = stream::iter([Ok(Bytes::from(buffered)), Err(err)]);
                return Buffered::Replayed(Body::from_stream(replay));
            }
        }
    }
    Buffered::Complete(Bytes::from(buffered))
}

async fn capture_request_body(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> (Body, Option<JsonValue>) {
    if declared_length(headers).is_some_and(|len| len > limit) {
        tracing::debug!(target: "audit", limit, "Request body above audit limit, not captured");
        return (body, None);
    }

    match buffer_body(body, limit).await {
        Buffered::Complete(bytes) => {
            let data = parse_request_payload(content_type(headers).as_deref(), &bytes);
            (Body::from(bytes), data)
        }
        Buffered::Replayed(body) => {
            tracing::debug!(target: "audit", limit, "Request body not captured");
            (body, None)
        }
    }
}

/// Buffer a JSON response of known, bounded size. Anything else passes through.
async fn capture_response_body(response: Response, limit: usize) -> (Response, Option<JsonValue>) {
    let is_json = content_type(response.headers()).is_some_and(|ct| ct.contains("json"));
    let bounded = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= limit as u64);
    if !is_json || !bounded {
        return (response, None);
    }

    let (parts, body) = response.into_parts();
    match buffer_body(body, limit).await {
        Buffered::Complete(bytes) => {
            let data = if bytes.is_empty() {
                None
            } else {
                serde_json::from_slice(&bytes).ok()
            };
            (Response::from_parts(parts, Body::from(bytes)), data)
        }
        Buffered::Replayed(body) => (Response::from_parts(parts, body), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunked(chunks: Vec<Result<Bytes, std::io::Error>>) -> Body {
        Body::from_stream(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_buffer_body_within_limit() {
        let body = chunked(vec![Ok(Bytes::from_static(b"{\"a\":")), Ok(Bytes::from_static(b"1}"))]);
        match buffer_body(body, 16).await {
            Buffered::Complete(bytes) => assert_eq!(&bytes[..], b"{\"a\":1}"),
            Buffered::Replayed(_) => panic!("body fits the limit"),
        }
    }

    #[tokio::test]
    async fn test_buffer_body_overflow_replays_everything() {
        let body = chunked(vec![
            Ok(Bytes::from_static(b"0123456789")),
            Ok(Bytes::from_static(b"abcdef")),
            Ok(Bytes::from_static(b"XYZ")),
        ]);
        match buffer_body(body, 12).await {
            Buffered::Replayed(body) => {
                let bytes = body.collect().await.unwrap().to_bytes();
                assert_eq!(&bytes[..], b"0123456789abcdefXYZ");
            }
            Buffered::Complete(_) => panic!("body exceeds the limit"),
        }
    }

    #[tokio::test]
    async fn test_buffer_body_stream_error_passed_through() {
        let body = chunked(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("connection reset")),
        ]);
        match buffer_body(body, 1024).await {
            Buffered::Replayed(mut body) => {
                let first = body.frame().await.unwrap().unwrap();
                assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"abc"));
                assert!(body.frame().await.unwrap().is_err());
            }
            Buffered::Complete(_) => panic!("stream error must not be swallowed"),
        }
    }

    #[tokio::test]
    async fn test_capture_request_body_overflow_not_recorded() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let body = chunked(vec![
            Ok(Bytes::from_static(b"{\"data\": \"")),
            Ok(Bytes::from(vec![b'x'; 64])),
            Ok(Bytes::from_static(b"\"}")),
        ]);

        let (body, data) = capture_request_body(&headers, body, 16).await;
        assert_eq!(data, None);
        let bytes = body.collect().await.unwrap().to_bytes();
        let replayed: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(replayed["data"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_parse_form_last_value_wins() {
        assert_eq!(
            parse_form(b"token=abc123&page=1&page=2&name=a%20b"),
            json!({"token": "abc123", "page": "2", "name": "a b"})
        );
        assert_eq!(parse_form(b""), json!({}));
    }

    #[test]
    fn test_parse_request_payload() {
        let body = br#"{"password": "xyz"}"#;
        assert_eq!(
            parse_request_payload(Some("application/json; charset=utf-8"), body),
            Some(json!({"password": "xyz"}))
        );
        assert_eq!(
            parse_request_payload(None, body),
            Some(json!({"password": "xyz"}))
        );
        assert_eq!(
            parse_request_payload(Some("application/x-www-form-urlencoded"), b"a=1"),
            Some(json!({"a": "1"}))
        );
        assert_eq!(parse_request_payload(Some("text/plain"), body), None);
        assert_eq!(parse_request_payload(Some("application/json"), b"not json"), None);
        assert_eq!(parse_request_payload(Some("application/json"), b""), None);
    }

    #[test]
    fn test_request_snapshot_headers() {
        let request = axum::http::Request::builder()
            .uri("/api/items?token=abc123&page=2")
            .header("Host", "api.example.com")
            .header("X-Forwarded-For", "10.0.0.5, 10.0.0.1")
            .header("User-Agent", "curl/8.0")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();
        let snapshot = request_snapshot(&parts, None);

        assert_eq!(snapshot.method, "GET");
        assert_eq!(snapshot.path, "/api/items");
        assert_eq!(snapshot.host, "api.example.com");
        assert_eq!(snapshot.forwarded_for.as_deref(), Some("10.0.0.5, 10.0.0.1"));
        assert_eq!(snapshot.remote_addr, None);
        assert_eq!(snapshot.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(
            snapshot.query_params,
            Some(json!({"token": "abc123", "page": "2"}))
        );
        assert_eq!(snapshot.actor, None);
    }
}
