//! Operator endpoints for browsing the audit trail

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::PathRejection},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use reqlog_core::{Actor, Entry, EntryQuery, FilterKind, LifecycleState, short_user_agent};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::AppState;
use crate::error::AppError;

/// A filter the listing accepts, and whether the current request activated it
#[derive(Debug, Serialize)]
pub struct FilterInfo {
    parameter: &'static str,
    title: &'static str,
    active: bool,
}

/// One row of the entry listing
#[derive(Debug, Serialize)]
pub struct EntryRow {
    id: i64,
    user: Option<Actor>,
    ip: String,
    short_user_agent: String,
    time_initialized: DateTime<Utc>,
    duration_ms: Option<i64>,
    method: String,
    path: String,
    status: Option<u16>,
    state: LifecycleState,
}

impl From<Entry> for EntryRow {
    fn from(entry: Entry) -> Self {
        Self {
            short_user_agent: short_user_agent(&entry.user_agent),
            duration_ms: entry.duration_ms(),
            state: entry.state(),
            id: entry.id,
            user: entry.user,
            ip: entry.ip,
            time_initialized: entry.time_initialized,
            method: entry.method,
            path: entry.path,
            status: entry.status,
        }
    }
}

/// Response body for the entry listing
#[derive(Debug, Serialize)]
pub struct EntryList {
    total: usize,
    limit: usize,
    offset: usize,
    filters: Vec<FilterInfo>,
    entries: Vec<EntryRow>,
}

/// Full entry with human-readable payload renderings
#[derive(Debug, Serialize)]
pub struct EntryDetail {
    #[serde(flatten)]
    entry: Entry,
    duration_ms: Option<i64>,
    state: LifecycleState,
    query_params_pretty: String,
    request_data_pretty: String,
    response_data_pretty: String,
}

impl From<Entry> for EntryDetail {
    fn from(entry: Entry) -> Self {
        Self {
            duration_ms: entry.duration_ms(),
            state: entry.state(),
            query_params_pretty: prettify(entry.query_params.as_ref()),
            request_data_pretty: prettify(entry.request_data.as_ref()),
            response_data_pretty: prettify(entry.response_data.as_ref()),
            entry,
        }
    }
}

/// Render a payload as 4-space indented JSON. Absent payloads render as `null`.
///
/// Mapping keys come out sorted since `serde_json::Map` is ordered by key.
fn prettify(value: Option<&JsonValue>) -> String {
    let value = value.unwrap_or(&JsonValue::Null);
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    match serde::Serialize::serialize(value, &mut serializer) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to render payload");
            String::from("null")
        }
    }
}

/// GET /admin/entries - List entries with filters, search, ordering and paging
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let query = EntryQuery::from_params(&params);
    let page = state.store.search_entries(&query).await?;

    let filters = FilterKind::ALL
        .into_iter()
        .map(|kind| FilterInfo {
            parameter: kind.parameter_name(),
            title: kind.title(),
            active: query.filters.criteria().iter().any(|c| c.kind() == kind),
        })
        .collect();

    Ok(Json(EntryList {
        total: page.total,
        limit: query.limit,
        offset: query.offset,
        filters,
        entries: page.entries.into_iter().map(EntryRow::from).collect(),
    }))
}

/// GET /admin/entries/{id} - Show a single entry
pub async fn detail(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = id.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    match state.store.get_entry(id).await? {
        Some(entry) => Ok(Json(EntryDetail::from(entry))),
        None => Err(AppError::NotFound(format!("Entry/{} not found", id))),
    }
}
