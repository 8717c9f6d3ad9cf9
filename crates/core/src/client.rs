//! Caller identity derived from request metadata.

use serde::{Deserialize, Serialize};

/// Stored when the caller sent no `User-Agent` header.
pub const UNKNOWN_USER_AGENT: &str = "N/A";

/// Longest user agent kept on an entry, in characters.
pub const USER_AGENT_MAX_CHARS: usize = 200;

/// Width of the abbreviated user agent shown in entry listings.
pub const SHORT_USER_AGENT_CHARS: usize = 20;

/// Network origin and client software of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    pub ip: String,
    pub user_agent: String,
}

impl ClientContext {
    /// Resolve the caller's address and user agent.
    ///
    /// A non-empty `X-Forwarded-For` wins: its first comma-separated token,
    /// trimmed, is the client IP. Otherwise the connection's remote address is
    /// used, and failing that the empty string.
    pub fn resolve(
        forwarded_for: Option<&str>,
        remote_addr: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        let ip = match forwarded_for.filter(|v| !v.is_empty()) {
            Some(chain) => chain.split(',').next().unwrap_or_default().trim().to_string(),
            None => remote_addr.unwrap_or_default().to_string(),
        };

        Self {
            ip,
            user_agent: user_agent.unwrap_or(UNKNOWN_USER_AGENT).to_string(),
        }
    }

    /// User agent cut down to what an entry stores.
    pub fn stored_user_agent(&self) -> String {
        truncate_user_agent(&self.user_agent)
    }
}

/// Truncate a user agent to [`USER_AGENT_MAX_CHARS`] characters.
pub fn truncate_user_agent(user_agent: &str) -> String {
    user_agent.chars().take(USER_AGENT_MAX_CHARS).collect()
}

/// Abbreviate a user agent for listings, marking the cut with an ellipsis.
pub fn short_user_agent(user_agent: &str) -> String {
    if user_agent.chars().count() <= SHORT_USER_AGENT_CHARS {
        return user_agent.to_string();
    }
    let mut short: String = user_agent.chars().take(SHORT_USER_AGENT_CHARS - 1).collect();
    short.push('…');
    short
}
