//! DNS resolution behind a trait, so validation can run against a fixed table.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hickory_resolver::config::LookupIpStrategy;
use hickory_resolver::TokioResolver;

use crate::error::ResolveError;

/// Resolves a hostname to its A/AAAA addresses.
///
/// Implementations return every address they got; the validator deduplicates
/// and classifies all of them. Timeouts are applied by the caller.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

/// Resolver backed by the system DNS configuration.
pub struct SystemResolver {
    resolver: TokioResolver,
}

impl SystemResolver {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    ///
    /// Always queries both A and AAAA, so a name whose AAAA record points
    /// somewhere private is caught even when it also has public A records.
    pub fn new() -> Result<Self, ResolveError> {
        let mut builder = TokioResolver::builder_tokio()
            .map_err(|e| ResolveError::new(format!("failed to read system DNS config: {e}")))?;
        builder.options_mut().ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
        Ok(Self {
            resolver: builder.build(),
        })
    }
}

impl std::fmt::Debug for SystemResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl Resolve for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let response = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| ResolveError::new(e.to_string()))?;
        Ok(response.iter().collect())
    }
}

/// Deterministic resolver answering from a fixed table.
///
/// Unknown names fail like NXDOMAIN. Every call is counted, which lets tests
/// assert that a name was never looked up.
#[derive(Debug, Default)]
pub struct StaticResolver {
    records: HashMap<String, Vec<IpAddr>>,
    lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the records for `host`.
    pub fn with(mut self, host: &str, addrs: &[IpAddr]) -> Self {
        self.records
            .insert(host.to_ascii_lowercase(), addrs.to_vec());
        self
    }

    /// Number of lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Resolve for StaticResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.records
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ResolveError::new(format!("no record found for {host}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver_answers() {
        let resolver = StaticResolver::new().with(
            "Example.com",
            &["93.184.216.34".parse().unwrap(), "2606:2800:220:1::1".parse().unwrap()],
        );

        let addrs = resolver.lookup("example.com").await.unwrap();
        assert_eq!(addrs.len(), 2);
        assert_eq!(resolver.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_static_resolver_unknown_name() {
        let resolver = StaticResolver::new();
        let err = resolver.lookup("missing.test").await.unwrap_err();
        assert!(err.to_string().contains("missing.test"));
        assert_eq!(resolver.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_system_resolver_queries_both_families() {
        let resolver = SystemResolver::new().unwrap();
        assert_eq!(
            resolver.resolver.options().ip_strategy,
            LookupIpStrategy::Ipv4AndIpv6
        );
    }

    #[tokio::test]
    async fn test_static_resolver_empty_answer() {
        let resolver = StaticResolver::new().with("empty.test", &[]);
        assert!(resolver.lookup("empty.test").await.unwrap().is_empty());
    }
}
