//! In-process audit store
//!
//! Keeps entries and users in memory behind a tokio `RwLock`. Queries are
//! evaluated with the same filter, search and ordering rules the Postgres
//! store renders as SQL. Unbounded unless a maximum entry count is set, in
//! which case the oldest entries are evicted first.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqlog_core::{AuditError, Entry, EntryPage, EntryQuery, Finalization, NewEntry};
use tokio::sync::RwLock;

use super::{AuditStore, NewUser, User};

#[derive(Default)]
struct Inner {
    entries: BTreeMap<i64, Entry>,
    users: BTreeMap<i64, User>,
    last_entry_id: i64,
    last_user_id: i64,
}

/// Audit store that lives for the lifetime of the process
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    max_entries: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_entries` entries, evicting the oldest.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries.max(1)),
            ..Self::default()
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn create_entry(&self, entry: NewEntry) -> Result<i64, AuditError> {
        let mut inner = self.inner.write().await;
        inner.last_entry_id += 1;
        let id = inner.last_entry_id;
        inner.entries.insert(id, entry.into_entry(id));
        if let Some(max) = self.max_entries {
            while inner.entries.len() > max {
                if let Some((evicted, _)) = inner.entries.pop_first() {
                    tracing::debug!(target: "audit", entry_id = evicted, "Evicted audit entry");
                }
            }
        }
        Ok(id)
    }

    async fn finalize_entry(&self, id: i64, finalization: Finalization) -> Result<(), AuditError> {
        let mut inner = self.inner.write().await;
        let entry = inner.entries.get_mut(&id).ok_or(AuditError::NotFound(id))?;
        entry.finalize(finalization)
    }

    async fn get_entry(&self, id: i64) -> Result<Option<Entry>, AuditError> {
        Ok(self.inner.read().await.entries.get(&id).cloned())
    }

    async fn search_entries(&self, query: &EntryQuery) -> Result<EntryPage, AuditError> {
        let entries = self.inner.read().await.entries.values().cloned().collect();
        Ok(query.apply(entries))
    }

    async fn find_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, AuditError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.api_key.as_deref() == Some(api_key))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AuditError> {
        let mut inner = self.inner.write().await;
        if let Some(key) = &user.api_key {
            if inner.users.values().any(|u| u.api_key.as_ref() == Some(key)) {
                return Err(AuditError::InvalidInput("api key already in use".to_string()));
            }
        }
        inner.last_user_id += 1;
        let user = User {
            id: inner.last_user_id,
            email: user.email,
            display_name: user.display_name,
            api_key: user.api_key,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn ping(&self) -> Result<(), AuditError> {
        Ok(())
    }
}
