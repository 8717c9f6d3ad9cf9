//! reqlog-core: request audit trail domain logic
//!
//! Framework-free pieces of the audit trail: payload redaction, client
//! context extraction, the entry model and its lifecycle, and the filters,
//! search and ordering used to query stored entries.

pub mod client;
pub mod entry;
pub mod error;
pub mod filter;
pub mod query;
pub mod redact;

pub use client::{ClientContext, short_user_agent, truncate_user_agent};
pub use entry::{Actor, Entry, Finalization, LifecycleState, NewEntry};
pub use error::AuditError;
pub use filter::{Criterion, FilterKind, FilterSet};
pub use query::{EntryPage, EntryQuery, SearchTerms, SortColumn, SortOrder};
pub use redact::{FILTERED_PLACEHOLDER, redact, redact_opt};
