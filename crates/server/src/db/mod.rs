//! Audit trail persistence

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use reqlog_core::{Actor, AuditError, Entry, EntryPage, EntryQuery, Finalization, NewEntry};
use tokio_postgres::NoTls;

/// A registered API caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub api_key: Option<String>,
}

impl User {
    /// The reference an audit entry keeps to this user.
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Fields for registering a user
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub display_name: Option<String>,
    pub api_key: Option<String>,
}

/// Storage contract for audit entries and the users they refer to.
///
/// An entry is written twice: `create_entry` at request start and
/// `finalize_entry` once the response is known. `finalize_entry` must refuse
/// an entry that already carries response fields.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create_entry(&self, entry: NewEntry) -> Result<i64, AuditError>;

    async fn finalize_entry(&self, id: i64, finalization: Finalization) -> Result<(), AuditError>;

    async fn get_entry(&self, id: i64) -> Result<Option<Entry>, AuditError>;

    async fn search_entries(&self, query: &EntryQuery) -> Result<EntryPage, AuditError>;

    async fn find_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, AuditError>;

    async fn create_user(&self, user: NewUser) -> Result<User, AuditError>;

    /// Cheap connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), AuditError>;
}

/// Store handle shared across requests
pub type SharedStore = Arc<dyn AuditStore>;

/// Create a connection pool from a database URL
pub async fn create_pool(database_url: &str) -> Result<Pool, deadpool_postgres::CreatePoolError> {
    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());
    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
}
