//! URL validation with DNS resolution.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::classify::Classification;
use crate::error::{Error, TimeoutStage};
use crate::options::DEFAULT_RESOLVE_TIMEOUT;
use crate::policy::Policy;
use crate::resolve::{Resolver, SystemResolver};
use crate::safe_url::SafeUrl;

/// One resolved address and how it was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub ip: IpAddr,
    pub classification: Classification,
}

/// A URL whose every resolved address passed classification.
///
/// The connection for this hop must go to [`ValidatedTarget::socket_addrs`]
/// and nowhere else; the hostname is never resolved again.
#[derive(Debug, Clone)]
pub struct ValidatedTarget {
    /// Normalized URL.
    pub url: Url,

    /// Hostname (use for Host header / SNI).
    pub host: String,

    pub port: u16,

    /// Every address the host resolved to, all routable.
    pub addrs: Vec<ResolvedAddress>,
}

impl ValidatedTarget {
    /// Socket addresses the transport is pinned to.
    pub fn socket_addrs(&self) -> Vec<SocketAddr> {
        self.addrs
            .iter()
            .map(|a| SocketAddr::new(a.ip, self.port))
            .collect()
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Whether the URL named an IP literal rather than a hostname.
    pub fn is_ip_literal(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }
}

/// Parses, resolves and classifies candidate URLs.
#[derive(Clone)]
pub struct Validator {
    resolver: Arc<dyn Resolver>,
    policy: Policy,
    resolve_timeout: Duration,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Arc::new(SystemResolver), Policy::default(), DEFAULT_RESOLVE_TIMEOUT)
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("policy", &self.policy)
            .field("resolve_timeout", &self.resolve_timeout)
            .finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(resolver: Arc<dyn Resolver>, policy: Policy, resolve_timeout: Duration) -> Self {
        Self {
            resolver,
            policy,
            resolve_timeout,
        }
    }

    /// Validate one URL:
    /// 1. Parse and normalize it (scheme, credentials, host encoding)
    /// 2. Check the hostname against the blocklist and policy
    /// 3. Resolve the full address set, under the resolve timeout
    /// 4. Require every address to be routable
    ///
    /// A host with one public and one private address is rejected as a whole.
    pub async fn validate(&self, url: &str) -> Result<ValidatedTarget, Error> {
        let safe_url = SafeUrl::parse(url)?;
        let host = safe_url.host().to_string();

        let ips = match safe_url.ip() {
            Some(ip) => vec![ip],
            None => {
                if let Some(reason) = self.policy.check_host(&host) {
                    tracing::warn!(%host, %reason, "blocked hostname");
                    return Err(Error::blocked(url, host, None, reason));
                }
                self.resolve(url, &host).await?
            }
        };

        let mut addrs: Vec<ResolvedAddress> = Vec::with_capacity(ips.len());
        for ip in ips {
            if addrs.iter().any(|a| a.ip == ip) {
                continue;
            }
            let classification = self.policy.check_ip(ip);
            if let Classification::Blocked(reason) = classification {
                tracing::warn!(%host, %ip, %reason, "blocked address");
                return Err(Error::blocked(url, host, Some(ip), reason));
            }
            addrs.push(ResolvedAddress { ip, classification });
        }

        tracing::debug!(
            %host,
            addrs = ?addrs.iter().map(|a| a.ip).collect::<Vec<_>>(),
            "target validated"
        );

        Ok(ValidatedTarget {
            port: safe_url.port(),
            url: safe_url.into_url(),
            host,
            addrs,
        })
    }

    async fn resolve(&self, url: &str, host: &str) -> Result<Vec<IpAddr>, Error> {
        let lookup = tokio::time::timeout(self.resolve_timeout, self.resolver.lookup_ip(host))
            .await
            .map_err(|_| Error::timeout(url, TimeoutStage::Resolve))?;

        let ips = lookup.map_err(|e| Error::resolution_failed(host, e.to_string()))?;
        if ips.is_empty() {
            return Err(Error::resolution_failed(host, "no IP addresses found"));
        }
        Ok(ips)
    }
}

/// Validate a URL with the system resolver and the default policy.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> Result<(), safe_fetch::Error> {
/// let target = safe_fetch::validate("https://example.com/article").await?;
/// println!("{} -> {:?}", target.host, target.socket_addrs());
/// # Ok(())
/// # }
/// ```
pub async fn validate(url: &str) -> Result<ValidatedTarget, Error> {
    Validator::default().validate(url).await
}

/// Synchronous version of [`validate`].
///
/// Works both inside and outside of a Tokio runtime. When called from outside
/// a runtime, it creates a temporary one.
pub fn validate_sync(url: &str) -> Result<ValidatedTarget, Error> {
    crate::block_on(url, validate(url))
}
