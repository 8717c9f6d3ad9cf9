//! The audit entry: one captured request/response cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AuditError;

/// Authenticated caller an entry refers to.
///
/// The entry only points at the actor; deleting the actor leaves the entry
/// in place with no user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Where an entry is in its request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Created at request start, response not yet recorded.
    Open,
    /// Response recorded.
    Closed,
    /// Response fields present without a finalization time. Reported, never rejected.
    Anomalous,
}

/// Fields known when a request starts. Payloads must already be redacted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub user: Option<Actor>,
    pub ip: String,
    pub host: String,
    pub path: String,
    pub method: String,
    pub user_agent: String,
    pub query_params: Option<JsonValue>,
    pub request_data: Option<JsonValue>,
    pub time_initialized: DateTime<Utc>,
}

impl NewEntry {
    /// Materialize as an open entry under the store-assigned id.
    pub fn into_entry(self, id: i64) -> Entry {
        Entry {
            id,
            user: self.user,
            ip: self.ip,
            host: self.host,
            path: self.path,
            method: self.method,
            status: None,
            user_agent: self.user_agent,
            query_params: self.query_params,
            request_data: self.request_data,
            response_data: None,
            time_initialized: self.time_initialized,
            time_finalized: None,
        }
    }
}

/// The three response-time fields, applied together exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalization {
    pub status: u16,
    pub response_data: Option<JsonValue>,
    pub time_finalized: DateTime<Utc>,
}

/// Persisted record of one request/response cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub user: Option<Actor>,
    pub ip: String,
    pub host: String,
    pub path: String,
    pub method: String,
    pub status: Option<u16>,
    pub user_agent: String,
    pub query_params: Option<JsonValue>,
    pub request_data: Option<JsonValue>,
    pub response_data: Option<JsonValue>,
    pub time_initialized: DateTime<Utc>,
    pub time_finalized: Option<DateTime<Utc>>,
}

impl Entry {
    /// Milliseconds between initialization and finalization, if finalized.
    pub fn duration_ms(&self) -> Option<i64> {
        self.time_finalized
            .map(|finalized| (finalized - self.time_initialized).num_milliseconds().max(0))
    }

    pub fn state(&self) -> LifecycleState {
        match (self.time_finalized, self.status.is_some() || self.response_data.is_some()) {
            (Some(_), _) => LifecycleState::Closed,
            (None, true) => LifecycleState::Anomalous,
            (None, false) => LifecycleState::Open,
        }
    }

    /// Record the response. Fails if any response-time field is already set.
    pub fn finalize(&mut self, finalization: Finalization) -> Result<(), AuditError> {
        if self.state() != LifecycleState::Open {
            return Err(AuditError::AlreadyFinalized(self.id));
        }
        self.status = Some(finalization.status);
        self.response_data = finalization.response_data;
        self.time_finalized = Some(finalization.time_finalized);
        Ok(())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn open_entry() -> Entry {
        NewEntry {
            user: None,
            ip: "10.0.0.5".to_string(),
            host: "api.example.com".to_string(),
            path: "/api/items".to_string(),
            method: "GET".to_string(),
            user_agent: "curl/8.0".to_string(),
            query_params: Some(json!({"page": "2"})),
            request_data: None,
            time_initialized: Utc::now(),
        }
        .into_entry(7)
    }

    #[test]
    fn test_new_entry_is_open() {
        let entry = open_entry();
        assert_eq!(entry.id, 7);
        assert_eq!(entry.state(), LifecycleState::Open);
        assert_eq!(entry.duration_ms(), None);
        assert_eq!(entry.status, None);
    }

    #[test]
    fn test_finalize_sets_fields_and_duration() {
        let mut entry = open_entry();
        let finalized = entry.time_initialized + Duration::milliseconds(42);
        entry
            .finalize(Finalization {
                status: 200,
                response_data: Some(json!({"ok": true})),
                time_finalized: finalized,
            })
            .unwrap();

        assert_eq!(entry.state(), LifecycleState::Closed);
        assert_eq!(entry.status, Some(200));
        assert_eq!(entry.duration_ms(), Some(42));
        assert!(entry.time_initialized <= entry.time_finalized.unwrap());
    }

    #[test]
    fn test_finalize_twice_rejected() {
        let mut entry = open_entry();
        let finalization = Finalization {
            status: 201,
            response_data: None,
            time_finalized: entry.time_initialized,
        };
        entry.finalize(finalization.clone()).unwrap();

        let err = entry.finalize(finalization).unwrap_err();
        assert!(matches!(err, AuditError::AlreadyFinalized(7)));
    }

    #[test]
    fn test_status_without_finalization_is_anomalous() {
        let mut entry = open_entry();
        entry.status = Some(500);
        assert_eq!(entry.state(), LifecycleState::Anomalous);
        assert_eq!(entry.duration_ms(), None);
    }

    #[test]
    fn test_duration_never_negative() {
        let mut entry = open_entry();
        entry.time_finalized = Some(entry.time_initialized - Duration::milliseconds(5));
        assert_eq!(entry.duration_ms(), Some(0));
    }
}
