//! Request lifecycle capture
//!
//! An entry is opened before the handler runs and closed once the response
//! exists. The hooks know nothing about axum: the middleware hands them
//! plain snapshots of the request and response, and threads the
//! [`EntryHandle`] returned by the first hook into the second.

use chrono::{DateTime, Utc};
use reqlog_core::{Actor, AuditError, ClientContext, Finalization, NewEntry, redact_opt};
use serde_json::Value as JsonValue;

use crate::db::SharedStore;

/// What the audit trail needs from an incoming request
#[derive(Debug, Clone, Default)]
pub struct RequestSnapshot {
    pub request_id: Option<String>,
    pub method: String,
    pub path: String,
    pub host: String,
    pub forwarded_for: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub query_params: Option<JsonValue>,
    pub body: Option<JsonValue>,
    /// `None` for anonymous callers.
    pub actor: Option<Actor>,
}

/// What the audit trail needs from an outgoing response
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub body: Option<JsonValue>,
}

/// Token linking a request's start to its finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHandle {
    id: i64,
    time_initialized: DateTime<Utc>,
}

impl EntryHandle {
    pub fn id(&self) -> i64 {
        self.id
    }
}

/// Opens and closes audit entries around request handling
#[derive(Clone)]
pub struct Interceptor {
    store: SharedStore,
}

impl Interceptor {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Persist a new open entry for `request`.
    ///
    /// Payloads are redacted before the write. A store failure is returned to
    /// the caller, which then has no handle to finalize.
    pub async fn on_request_start(
        &self,
        request: &RequestSnapshot,
    ) -> Result<EntryHandle, AuditError> {
        let client = ClientContext::resolve(
            request.forwarded_for.as_deref(),
            request.remote_addr.as_deref(),
            request.user_agent.as_deref(),
        );
        let time_initialized = Utc::now();

        let entry = NewEntry {
            user: request.actor.clone(),
            user_agent: client.stored_user_agent(),
            ip: client.ip,
            host: request.host.clone(),
            path: request.path.clone(),
            method: request.method.clone(),
            query_params: redact_opt(request.query_params.as_ref()),
            request_data: redact_opt(request.body.as_ref()),
            time_initialized,
        };

        match self.store.create_entry(entry).await {
            Ok(id) => {
                metrics::counter!("audit_entries_total", "event" => "opened").increment(1);
                tracing::debug!(
                    target: "audit",
                    entry_id = id,
                    request_id = request.request_id.as_deref().unwrap_or("unknown"),
                    method = %request.method,
                    path = %request.path,
                    "Audit entry opened"
                );
                Ok(EntryHandle {
                    id,
                    time_initialized,
                })
            }
            Err(e) => {
                metrics::counter!("audit_entries_total", "event" => "open_failed").increment(1);
                tracing::error!(
                    target: "audit",
                    error = %e,
                    request_id = request.request_id.as_deref().unwrap_or("unknown"),
                    method = %request.method,
                    path = %request.path,
                    "Failed to open audit entry"
                );
                Err(e)
            }
        }
    }

    /// Record the response on the entry behind `handle`.
    ///
    /// Without a handle this does nothing. Store failures are logged and
    /// swallowed so the response reaches the caller unchanged.
    pub async fn on_response_finalize(
        &self,
        handle: Option<EntryHandle>,
        response: &ResponseSnapshot,
    ) {
        let Some(handle) = handle else {
            tracing::trace!(target: "audit", "No audit entry attached, skipping finalization");
            return;
        };

        let finalization = Finalization {
            status: response.status,
            response_data: redact_opt(response.body.as_ref()),
            time_finalized: Utc::now().max(handle.time_initialized),
        };

        match self.store.finalize_entry(handle.id, finalization).await {
            Ok(()) => {
                metrics::counter!("audit_entries_total", "event" => "finalized").increment(1);
                tracing::info!(
                    target: "audit",
                    entry_id = handle.id,
                    status = response.status,
                    "Audit entry finalized"
                );
            }
            Err(e) => {
                metrics::counter!("audit_entries_total", "event" => "finalize_failed").increment(1);
                tracing::error!(
                    target: "audit",
                    entry_id = handle.id,
                    error = %e,
                    "Failed to finalize audit entry"
                );
            }
        }
    }
}
