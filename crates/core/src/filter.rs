//! Operator filters over stored entries.
//!
//! Each filter binds one query parameter and takes free text. Input that does
//! not have the shape a filter expects leaves that filter inactive instead of
//! producing an error.

use std::collections::HashMap;

use serde::Serialize;

use crate::entry::Entry;

/// The registry of filters available on the entry listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    User,
    Path,
    Ip,
    Status,
}

impl FilterKind {
    pub const ALL: [FilterKind; 4] = [
        FilterKind::User,
        FilterKind::Path,
        FilterKind::Ip,
        FilterKind::Status,
    ];

    /// Query parameter the filter reads its input from.
    pub fn parameter_name(self) -> &'static str {
        match self {
            FilterKind::User => "user",
            FilterKind::Path => "path",
            FilterKind::Ip => "ip",
            FilterKind::Status => "status",
        }
    }

    /// Display label.
    pub fn title(self) -> &'static str {
        match self {
            FilterKind::User => "User",
            FilterKind::Path => "Path",
            FilterKind::Ip => "IP",
            FilterKind::Status => "Status",
        }
    }

    /// Turn free text into a match criterion, or `None` if the filter stays inactive.
    pub fn parse(self, input: &str) -> Option<Criterion> {
        if input.is_empty() {
            return None;
        }
        match self {
            FilterKind::User if is_all_digits(input) => input.parse().ok().map(Criterion::UserId),
            FilterKind::User => Some(Criterion::UserEmail(input.to_string())),
            FilterKind::Path => Some(Criterion::Path(input.to_string())),
            FilterKind::Ip => {
                let ip = input.trim();
                (!ip.is_empty()).then(|| Criterion::Ip(ip.to_string()))
            }
            FilterKind::Status if is_all_digits(input) => input.parse().ok().map(Criterion::Status),
            FilterKind::Status => None,
        }
    }

    /// Narrow `entries` by this filter. No input means no restriction.
    pub fn apply(self, input: Option<&str>, entries: Vec<Entry>) -> Vec<Entry> {
        match input.and_then(|value| self.parse(value)) {
            Some(criterion) => entries.into_iter().filter(|e| criterion.matches(e)).collect(),
            None => entries,
        }
    }
}

fn is_all_digits(input: &str) -> bool {
    !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit())
}

/// A parsed, active filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    UserId(i64),
    /// Compared case-insensitively.
    UserEmail(String),
    /// Compared case-insensitively.
    Path(String),
    Ip(String),
    Status(u16),
}

impl Criterion {
    pub fn kind(&self) -> FilterKind {
        match self {
            Criterion::UserId(_) | Criterion::UserEmail(_) => FilterKind::User,
            Criterion::Path(_) => FilterKind::Path,
            Criterion::Ip(_) => FilterKind::Ip,
            Criterion::Status(_) => FilterKind::Status,
        }
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Criterion::UserId(id) => entry.user.as_ref().is_some_and(|u| u.id == *id),
            Criterion::UserEmail(email) => entry
                .user
                .as_ref()
                .is_some_and(|u| u.email.to_lowercase() == email.to_lowercase()),
            Criterion::Path(path) => entry.path.to_lowercase() == path.to_lowercase(),
            Criterion::Ip(ip) => entry.ip == *ip,
            Criterion::Status(status) => entry.status == Some(*status),
        }
    }
}

/// Active filters, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    criteria: Vec<Criterion>,
}

impl FilterSet {
    /// Collect every registered filter whose parameter is present and well formed.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let criteria = FilterKind::ALL
            .into_iter()
            .filter_map(|kind| {
                params
                    .get(kind.parameter_name())
                    .and_then(|value| kind.parse(value))
            })
            .collect();
        Self { criteria }
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        self.criteria.iter().all(|c| c.matches(entry))
    }

    pub fn apply(&self, entries: Vec<Entry>) -> Vec<Entry> {
        entries.into_iter().filter(|e| self.matches(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Actor, NewEntry};
    use chrono::Utc;

    fn entry(id: i64, user: Option<(i64, &str)>, path: &str, ip: &str, status: Option<u16>) -> Entry {
        let mut entry = NewEntry {
            user: user.map(|(id, email)| Actor {
                id,
                email: email.to_string(),
                display_name: None,
            }),
            ip: ip.to_string(),
            host: "localhost".to_string(),
            path: path.to_string(),
            method: "GET".to_string(),
            user_agent: "test".to_string(),
            query_params: None,
            request_data: None,
            time_initialized: Utc::now(),
        }
        .into_entry(id);
        entry.status = status;
        entry
    }

    fn ids(entries: &[Entry]) -> Vec<i64> {
        entries.iter().map(|e| e.id).collect()
    }

    fn sample() -> Vec<Entry> {
        vec![
            entry(1, Some((10, "a@x.com")), "/api/items", "10.0.0.5", Some(200)),
            entry(2, Some((20, "b@x.com")), "/api/Items", "10.0.0.6", Some(404)),
            entry(3, None, "/api/other", "10.0.0.5", Some(200)),
        ]
    }

    #[test]
    fn test_status_filter() {
        assert_eq!(ids(&FilterKind::Status.apply(Some("200"), sample())), vec![1, 3]);
    }

    #[test]
    fn test_status_filter_non_digits_inactive() {
        assert_eq!(ids(&FilterKind::Status.apply(Some("abc"), sample())), vec![1, 2, 3]);
        assert_eq!(ids(&FilterKind::Status.apply(Some("99999"), sample())), vec![1, 2, 3]);
    }

    #[test]
    fn test_user_filter_by_email_case_insensitive() {
        assert_eq!(ids(&FilterKind::User.apply(Some("A@X.COM"), sample())), vec![1]);
    }

    #[test]
    fn test_user_filter_by_id() {
        assert_eq!(ids(&FilterKind::User.apply(Some("20"), sample())), vec![2]);
        assert!(FilterKind::User.apply(Some("99"), sample()).is_empty());
    }

    #[test]
    fn test_path_filter_case_insensitive() {
        assert_eq!(ids(&FilterKind::Path.apply(Some("/API/ITEMS"), sample())), vec![1, 2]);
    }

    #[test]
    fn test_ip_filter_trims() {
        assert_eq!(ids(&FilterKind::Ip.apply(Some(" 10.0.0.5 "), sample())), vec![1, 3]);
        assert_eq!(ids(&FilterKind::Ip.apply(Some("   "), sample())), vec![1, 2, 3]);
    }

    #[test]
    fn test_absent_or_empty_input_inactive() {
        for kind in FilterKind::ALL {
            assert_eq!(ids(&kind.apply(None, sample())), vec![1, 2, 3]);
            assert_eq!(ids(&kind.apply(Some(""), sample())), vec![1, 2, 3]);
        }
    }

    #[test]
    fn test_filter_set_is_intersection() {
        let params: HashMap<String, String> = [
            ("status".to_string(), "200".to_string()),
            ("ip".to_string(), "10.0.0.5".to_string()),
            ("path".to_string(), "/api/items".to_string()),
        ]
        .into_iter()
        .collect();
        let set = FilterSet::from_params(&params);
        assert_eq!(set.criteria().len(), 3);

        let combined = ids(&set.apply(sample()));
        let mut independent = sample();
        for (kind, value) in [
            (FilterKind::Status, "200"),
            (FilterKind::Ip, "10.0.0.5"),
            (FilterKind::Path, "/api/items"),
        ] {
            independent = kind.apply(Some(value), independent);
        }
        assert_eq!(combined, ids(&independent));
        assert_eq!(combined, vec![1]);
    }

    #[test]
    fn test_filter_set_ignores_malformed_and_unknown() {
        let params: HashMap<String, String> = [
            ("status".to_string(), "ok".to_string()),
            ("colour".to_string(), "blue".to_string()),
        ]
        .into_iter()
        .collect();
        let set = FilterSet::from_params(&params);
        assert!(set.is_empty());
        assert_eq!(set.apply(sample()).len(), 3);
    }

    #[test]
    fn test_registry_metadata() {
        let names: Vec<_> = FilterKind::ALL.iter().map(|k| k.parameter_name()).collect();
        assert_eq!(names, vec!["user", "path", "ip", "status"]);
        assert_eq!(FilterKind::Ip.title(), "IP");
        assert_eq!(Criterion::UserId(1).kind(), FilterKind::User);
    }
}
