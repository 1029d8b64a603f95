//! Per-fetcher configuration.

use std::time::Duration;

use crate::policy::Policy;

/// Default maximum number of redirects followed.
pub const DEFAULT_MAX_REDIRECTS: u8 = 5;

/// Default response body cap (20 MiB).
pub const DEFAULT_MAX_BODY_BYTES: u64 = 20 * 1024 * 1024;

/// Default timeout for one request/response exchange.
pub const DEFAULT_HOP_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for one DNS lookup.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wall-clock budget for a whole fetch, redirects included.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("safe-fetch/", env!("CARGO_PKG_VERSION"));

/// Limits and policy for a [`Fetcher`](crate::Fetcher).
///
/// Values are always passed in by the caller; nothing is read from the
/// environment.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Redirects followed before failing with `TooManyRedirects`.
    pub max_redirects: u8,

    /// Largest body accepted, in bytes.
    pub max_body_bytes: u64,

    /// Budget for each hop's request, response headers and body.
    pub hop_timeout: Duration,

    /// Budget for each DNS lookup.
    pub resolve_timeout: Duration,

    /// Budget for the whole call across every hop.
    pub overall_timeout: Duration,

    /// `User-Agent` header sent on every hop.
    pub user_agent: String,

    /// Address and hostname overrides.
    pub policy: Policy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            hop_timeout: DEFAULT_HOP_TIMEOUT,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            policy: Policy::default(),
        }
    }
}

impl FetchOptions {
    pub fn with_max_redirects(mut self, max_redirects: u8) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_hop_timeout(mut self, timeout: Duration) -> Self {
        self.hop_timeout = timeout;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }
}
