//! Server configuration

/// Default cap on request/response bodies buffered for the audit trail (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// What the audit middleware does when an entry cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenFailurePolicy {
    /// Fail the request with a server error; the handler does not run.
    #[default]
    Reject,
    /// Log the failure and run the handler without an audit entry.
    Continue,
}

impl OpenFailurePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "continue" => Some(Self::Continue),
            _ => None,
        }
    }
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. The in-memory store is used when unset.
    pub database_url: Option<String>,
    pub bind_address: String,
    /// Required in `X-Admin-Key` for the entry listing when set.
    pub admin_api_key: Option<String>,
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub on_open_failure: OpenFailurePolicy,
    /// Cap on entries kept by the in-memory store. Unbounded when unset.
    pub memory_max_entries: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_address: "0.0.0.0:8080".to_string(),
            admin_api_key: None,
            cors_origins: vec!["*".to_string()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            on_open_failure: OpenFailurePolicy::default(),
            memory_max_entries: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let max_body_bytes = match non_empty("AUDIT_MAX_BODY_BYTES") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid AUDIT_MAX_BODY_BYTES, using default");
                defaults.max_body_bytes
            }),
            None => defaults.max_body_bytes,
        };

        let on_open_failure = match non_empty("AUDIT_ON_OPEN_FAILURE") {
            Some(raw) => OpenFailurePolicy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "Invalid AUDIT_ON_OPEN_FAILURE, using default");
                defaults.on_open_failure
            }),
            None => defaults.on_open_failure,
        };

        let memory_max_entries = non_empty("AUDIT_MEMORY_MAX_ENTRIES").and_then(|raw| {
            match raw.trim().parse::<usize>() {
                Ok(max) if max > 0 => Some(max),
                _ => {
                    tracing::warn!(value = %raw, "Invalid AUDIT_MEMORY_MAX_ENTRIES, keeping all entries");
                    None
                }
            }
        });

        Self {
            database_url: non_empty("DATABASE_URL"),
            bind_address: non_empty("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            admin_api_key: non_empty("ADMIN_API_KEY"),
            cors_origins: non_empty("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            max_body_bytes,
            on_open_failure,
            memory_max_entries,
        }
    }
}
