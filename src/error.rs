//! Error types for safe-fetch.

use std::fmt;
use std::net::IpAddr;

use thiserror::Error;

use crate::classify::BlockReason;

/// Message shown to end users for every safety-policy rejection.
pub const BLOCKED_MESSAGE: &str = "Could not fetch this URL: blocked for safety reasons.";

/// Message shown to end users for transport failures.
pub const TRANSPORT_MESSAGE: &str = "Could not fetch this URL: request timed out or network error.";

/// Errors that can occur while validating or fetching a URL.
///
/// `Display` carries the full detail (including blocked addresses) and is meant
/// for logs. Use [`Error::user_message`] for anything shown to an end user.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed URL, overlong URL, or non-canonical host encoding.
    #[error("Invalid URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Scheme outside the http/https allow-list.
    #[error("Unsupported scheme '{scheme}', only http/https")]
    UnsupportedScheme { url: String, scheme: String },

    /// URL carries userinfo (`user:pass@host`).
    #[error("Credentials in URL are not allowed")]
    CredentialsInUrl { url: String },

    /// The hostname could not be resolved, or resolved to nothing.
    #[error("DNS resolution failed for {host}: {message}")]
    ResolutionFailed { host: String, message: String },

    /// The target (or one of its addresses) is not globally routable.
    #[error("Blocked {reason} target {host}{}", fmt_ip(.ip))]
    BlockedAddress {
        url: String,
        host: String,
        ip: Option<IpAddr>,
        reason: BlockReason,
    },

    /// The redirect chain exceeded the hop limit.
    #[error("Too many redirects (max {max})")]
    TooManyRedirects { url: String, max: u8 },

    /// The response body exceeded the byte cap.
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { url: String, size: u64, max: u64 },

    /// Connection, TLS, or body stream failure.
    #[error("Network error: {message}")]
    NetworkError { url: String, message: String },

    /// A resolution, per-hop, or overall deadline elapsed.
    #[error("Timed out during {stage}")]
    Timeout { url: String, stage: TimeoutStage },

    /// Non-success status, produced only by [`FetchResult::error_for_status`](crate::FetchResult::error_for_status).
    #[error("HTTP status {status}")]
    HttpStatus { url: String, status: u16 },
}

fn fmt_ip(ip: &Option<IpAddr>) -> String {
    ip.map(|ip| format!(" ({ip})")).unwrap_or_default()
}

/// Which deadline fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    /// DNS lookup exceeded the resolve timeout.
    Resolve,
    /// One request/response exchange exceeded the per-hop timeout.
    Hop,
    /// The cumulative budget across all hops ran out.
    Overall,
}

impl fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "DNS resolution",
            Self::Hop => "request",
            Self::Overall => "overall fetch deadline",
        })
    }
}

/// Fieldless error category, handy as a log or metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    CredentialsInUrl,
    ResolutionFailed,
    BlockedAddress,
    TooManyRedirects,
    PayloadTooLarge,
    NetworkError,
    Timeout,
    HttpStatus,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::CredentialsInUrl => "credentials_in_url",
            Self::ResolutionFailed => "resolution_failed",
            Self::BlockedAddress => "blocked_address",
            Self::TooManyRedirects => "too_many_redirects",
            Self::PayloadTooLarge => "payload_too_large",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::UnsupportedScheme { .. } => ErrorKind::UnsupportedScheme,
            Self::CredentialsInUrl { .. } => ErrorKind::CredentialsInUrl,
            Self::ResolutionFailed { .. } => ErrorKind::ResolutionFailed,
            Self::BlockedAddress { .. } => ErrorKind::BlockedAddress,
            Self::TooManyRedirects { .. } => ErrorKind::TooManyRedirects,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::NetworkError { .. } => ErrorKind::NetworkError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
        }
    }

    /// Whether a caller may reasonably retry the whole fetch.
    ///
    /// Only transport failures qualify. Policy rejections are deterministic and
    /// retrying them cannot succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError { .. } | Self::Timeout { .. })
    }

    /// The block category, if this is a [`Error::BlockedAddress`].
    pub fn block_reason(&self) -> Option<BlockReason> {
        match self {
            Self::BlockedAddress { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// End-user safe message. Never includes hosts or addresses.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NetworkError { .. } | Self::Timeout { .. } => TRANSPORT_MESSAGE,
            Self::HttpStatus { .. } => "Could not fetch this URL: the server returned an error.",
            _ => BLOCKED_MESSAGE,
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn resolution_failed(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResolutionFailed {
            host: host.into(),
            message: message.into(),
        }
    }

    pub(crate) fn blocked(
        url: impl Into<String>,
        host: impl Into<String>,
        ip: Option<IpAddr>,
        reason: BlockReason,
    ) -> Self {
        Self::BlockedAddress {
            url: url.into(),
            host: host.into(),
            ip,
            reason,
        }
    }

    pub(crate) fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NetworkError {
            url: url.into(),
            message: message.into(),
        }
    }

    pub(crate) fn timeout(url: impl Into<String>, stage: TimeoutStage) -> Self {
        Self::Timeout {
            url: url.into(),
            stage,
        }
    }
}
