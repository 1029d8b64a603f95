//! DNS resolution seam.
//!
//! The validator asks a [`Resolver`] for the *full* address set of a host and
//! classifies every address it gets back. The fetcher then dials exactly those
//! addresses, so whatever implements this trait is the single source of truth
//! for where a hop may connect.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use thiserror::Error;

/// Failure to turn a hostname into addresses.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ResolveError(String);

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Hostname to address lookup.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Return every address the host resolves to, across both families.
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

/// Resolver backed by the system DNS configuration (via hickory).
///
/// A fresh resolver is built for every lookup so no cached answer from an
/// earlier hop or an earlier fetch is reused.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| ResolveError::new(e.to_string()))?
            .build();

        let response = resolver
            .lookup_ip(host)
            .await
            .map_err(|e| ResolveError::new(e.to_string()))?;

        Ok(response.iter().collect())
    }
}

/// Fixed host table. Useful in tests and in sandboxes without DNS.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `host` (case-insensitive) to `addrs`.
    pub fn with_host(mut self, host: &str, addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        self.hosts
            .insert(host.to_ascii_lowercase(), addrs.into_iter().collect());
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ResolveError::new(format!("no such host: {host}")))
    }
}
