//! Echo endpoints
//!
//! Reflect the request back to the caller. Mounted under `/api` by the
//! binary so the audit trail has something to record out of the box.

use std::collections::HashMap;

use axum::{Json, Router, extract::Query, routing::get};
use serde_json::{Value as JsonValue, json};

/// Build the echo routes
pub fn routes() -> Router {
    Router::new().route("/echo", get(query).post(body))
}

/// GET /api/echo - Return the query parameters
async fn query(Query(params): Query<HashMap<String, String>>) -> Json<JsonValue> {
    Json(json!({ "query": params }))
}

/// POST /api/echo - Return the JSON body
async fn body(Json(body): Json<JsonValue>) -> Json<JsonValue> {
    Json(json!({ "received": body }))
}
