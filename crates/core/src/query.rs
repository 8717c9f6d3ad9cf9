//! Search, ordering and paging for the entry listing.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::entry::Entry;
use crate::filter::FilterSet;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Column an entry listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    User,
    Ip,
    Host,
    UserAgent,
    TimeInitialized,
    DurationMs,
    Method,
    Path,
    Status,
}

impl SortColumn {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "id" => SortColumn::Id,
            "user" => SortColumn::User,
            "ip" => SortColumn::Ip,
            "host" => SortColumn::Host,
            "user_agent" => SortColumn::UserAgent,
            "time_initialized" => SortColumn::TimeInitialized,
            "duration_ms" => SortColumn::DurationMs,
            "method" => SortColumn::Method,
            "path" => SortColumn::Path,
            "status" => SortColumn::Status,
            _ => return None,
        })
    }

    /// Missing values sort before present ones.
    fn compare(self, a: &Entry, b: &Entry) -> Ordering {
        match self {
            SortColumn::Id => a.id.cmp(&b.id),
            SortColumn::User => a.user_id().cmp(&b.user_id()),
            SortColumn::Ip => a.ip.cmp(&b.ip),
            SortColumn::Host => a.host.cmp(&b.host),
            SortColumn::UserAgent => a.user_agent.cmp(&b.user_agent),
            SortColumn::TimeInitialized => a.time_initialized.cmp(&b.time_initialized),
            SortColumn::DurationMs => a.duration_ms().cmp(&b.duration_ms()),
            SortColumn::Method => a.method.cmp(&b.method),
            SortColumn::Path => a.path.cmp(&b.path),
            SortColumn::Status => a.status.cmp(&b.status),
        }
    }
}

/// Sort order as written in the `o` parameter, e.g. `-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: SortColumn,
    pub descending: bool,
}

impl Default for SortOrder {
    /// Newest first.
    fn default() -> Self {
        Self {
            column: SortColumn::Id,
            descending: true,
        }
    }
}

impl SortOrder {
    pub fn parse(input: &str) -> Option<Self> {
        let (name, descending) = match input.strip_prefix('-') {
            Some(name) => (name, true),
            None => (input, false),
        };
        SortColumn::from_name(name).map(|column| Self { column, descending })
    }

    /// Compare by the column, then by id in the same direction.
    pub fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        let ordering = self.column.compare(a, b).then_with(|| a.id.cmp(&b.id));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Free-text search over the entry's user.
///
/// Every whitespace-separated term has to match the user's id (digits only),
/// email (case-insensitive) or display name (case-insensitive substring).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchTerms {
    terms: Vec<String>,
}

impl SearchTerms {
    pub fn parse(input: &str) -> Self {
        Self {
            terms: input.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        self.terms.iter().all(|term| term_matches(term, entry))
    }
}

fn term_matches(term: &str, entry: &Entry) -> bool {
    let Some(user) = &entry.user else {
        return false;
    };
    if term.bytes().all(|b| b.is_ascii_digit()) && term.parse::<i64>().ok() == Some(user.id) {
        return true;
    }
    let term = term.to_lowercase();
    user.email.to_lowercase() == term
        || user
            .display_name
            .as_ref()
            .is_some_and(|name| name.to_lowercase().contains(&term))
}

/// Everything needed to produce one page of the entry listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryQuery {
    pub filters: FilterSet,
    pub search: SearchTerms,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for EntryQuery {
    fn default() -> Self {
        Self {
            filters: FilterSet::default(),
            search: SearchTerms::default(),
            order: SortOrder::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl EntryQuery {
    /// Build from raw query parameters. Malformed values fall back to defaults.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let limit = params
            .get("limit")
            .and_then(|v| v.parse::<usize>().ok())
            .map_or(DEFAULT_LIMIT, |v| v.clamp(1, MAX_LIMIT));
        let offset = params
            .get("offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Self {
            filters: FilterSet::from_params(params),
            search: params.get("q").map(|q| SearchTerms::parse(q)).unwrap_or_default(),
            order: params
                .get("o")
                .and_then(|o| SortOrder::parse(o))
                .unwrap_or_default(),
            limit,
            offset,
        }
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        self.filters.matches(entry) && self.search.matches(entry)
    }

    /// Evaluate against an in-memory collection.
    pub fn apply(&self, entries: Vec<Entry>) -> EntryPage {
        let mut matched: Vec<Entry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        matched.sort_by(|a, b| self.order.compare(a, b));
        let total = matched.len();
        let entries = matched.into_iter().skip(self.offset).take(self.limit).collect();
        EntryPage { total, entries }
    }
}

/// One page of matching entries plus the total match count.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPage {
    pub total: usize,
    pub entries: Vec<Entry>,
}
