//! Operator overrides layered over the built-in address classifier.
//!
//! A [`Policy`] is immutable once built. The default policy has no rules, so
//! [`classify`](crate::classify) alone decides what is reachable.
//!
//! ## Precedence
//!
//! 1. Cloud metadata endpoints are always blocked, whatever the rules say.
//! 2. A matching allow rule admits the address or hostname.
//! 3. A matching block rule refuses it with [`BlockReason::PolicyDenied`].
//! 4. Otherwise the built-in classification applies.
//!
//! **Be careful with `allow_*` methods.** They punch holes in SSRF protection:
//!
//! ```rust
//! use safe_fetch::Policy;
//!
//! // DANGEROUS: this admits every loopback address.
//! let bad = Policy::builder().allow_cidr("127.0.0.0/8").build();
//! ```

use std::net::IpAddr;

use ipnet::IpNet;

use crate::classify::{classify, classify_hostname, is_cloud_metadata, BlockReason, Classification};

/// Immutable set of CIDR and hostname rules.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    blocked_cidrs: Vec<IpNet>,
    allowed_cidrs: Vec<IpNet>,
    blocked_hosts: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl Policy {
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    /// Classify an address under this policy.
    pub fn check_ip(&self, ip: IpAddr) -> Classification {
        let builtin = classify(ip);
        if is_cloud_metadata(ip) {
            return builtin;
        }
        if self.allowed_cidrs.iter().any(|net| net.contains(&ip)) {
            return Classification::Routable;
        }
        if self.blocked_cidrs.iter().any(|net| net.contains(&ip)) {
            return Classification::Blocked(BlockReason::PolicyDenied);
        }
        builtin
    }

    /// Check a hostname before resolution. `None` means it may be resolved.
    ///
    /// Passing this check never exempts the resolved addresses from
    /// [`Policy::check_ip`].
    pub fn check_host(&self, host: &str) -> Option<BlockReason> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let builtin = classify_hostname(&host);
        if builtin == Some(BlockReason::CloudMetadata) {
            return builtin;
        }
        if self.allowed_hosts.iter().any(|p| matches_hostname_pattern(&host, p)) {
            return None;
        }
        if self.blocked_hosts.iter().any(|p| matches_hostname_pattern(&host, p)) {
            return Some(BlockReason::PolicyDenied);
        }
        builtin
    }
}

/// Builder for [`Policy`].
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    blocked_cidrs: Vec<IpNet>,
    allowed_cidrs: Vec<IpNet>,
    blocked_hosts: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl PolicyBuilder {
    /// Block an IP range (CIDR notation). Invalid input is logged and ignored.
    pub fn block_cidr(mut self, cidr: &str) -> Self {
        if let Some(net) = parse_cidr(cidr) {
            self.blocked_cidrs.push(net);
        }
        self
    }

    /// Admit an IP range that the classifier would otherwise block.
    pub fn allow_cidr(mut self, cidr: &str) -> Self {
        if let Some(net) = parse_cidr(cidr) {
            self.allowed_cidrs.push(net);
        }
        self
    }

    /// Block a hostname or pattern. Supports `*.internal.example.com`.
    pub fn block_host(mut self, pattern: &str) -> Self {
        self.blocked_hosts.push(pattern.to_ascii_lowercase());
        self
    }

    /// Skip hostname checks for a name or pattern. Its addresses are still classified.
    pub fn allow_host(mut self, pattern: &str) -> Self {
        self.allowed_hosts.push(pattern.to_ascii_lowercase());
        self
    }

    pub fn build(self) -> Policy {
        Policy {
            blocked_cidrs: self.blocked_cidrs,
            allowed_cidrs: self.allowed_cidrs,
            blocked_hosts: self.blocked_hosts,
            allowed_hosts: self.allowed_hosts,
        }
    }
}

fn parse_cidr(cidr: &str) -> Option<IpNet> {
    // A bare address means a single-host network.
    let parsed = cidr
        .parse::<IpNet>()
        .or_else(|_| cidr.parse::<IpAddr>().map(IpNet::from));
    match parsed {
        Ok(net) => Some(net),
        Err(e) => {
            tracing::warn!(cidr, error = %e, "ignoring invalid CIDR in policy");
            None
        }
    }
}

/// Match a lowercase hostname against a pattern (`*.` prefix also matches the apex).
fn matches_hostname_pattern(host: &str, pattern: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(apex) => {
            host == apex
                || host
                    .strip_suffix(apex)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => host == pattern,
    }
}
