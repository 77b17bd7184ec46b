//! URL validation with DNS resolution.

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::RuntimeFlavor;

use crate::error::{Denial, ResolveError};
use crate::policy::Policy;
use crate::resolve::{Resolve, SystemResolver};
use crate::safe_url::{HostKind, SafeUrl};

/// Result of successful URL validation.
///
/// Connect to [`Validated::socket_addrs`], not to whatever a fresh lookup of
/// `host` returns: the addresses here are the ones that were checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    /// Every address the host resolved to, deduplicated. All are public.
    pub addrs: Vec<IpAddr>,

    /// Normalized hostname (use for Host header / SNI).
    pub host: String,

    /// Effective port.
    pub port: u16,

    /// Full URL (normalized).
    pub url: String,

    /// Whether HTTPS.
    pub https: bool,

    /// Whether the host was an IP literal, so no lookup took place.
    pub literal: bool,
}

impl Validated {
    /// Get the socket addresses to connect to.
    pub fn socket_addrs(&self) -> Vec<SocketAddr> {
        self.addrs
            .iter()
            .map(|ip| SocketAddr::new(*ip, self.port))
            .collect()
    }
}

/// Allow/deny outcome of one validation, safe to hand to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl From<&Result<Validated, Denial>> for Verdict {
    fn from(result: &Result<Validated, Denial>) -> Self {
        match result {
            Ok(_) => Self {
                allowed: true,
                reason: None,
                code: None,
            },
            Err(denial) => Self {
                allowed: false,
                reason: Some(denial.to_string()),
                code: Some(denial.code()),
            },
        }
    }
}

/// Gatekeeper for outbound URLs.
///
/// Holds an immutable [`Policy`] and a resolver; no state is shared between
/// calls, so one `Validator` can be used from many tasks at once.
#[derive(Clone)]
pub struct Validator {
    policy: Arc<Policy>,
    resolver: Arc<dyn Resolve>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(policy: Policy, resolver: Arc<dyn Resolve>) -> Self {
        Self {
            policy: Arc::new(policy),
            resolver,
        }
    }

    /// Validator using the system resolver.
    pub fn system(policy: Policy) -> Result<Self, ResolveError> {
        Ok(Self::new(policy, Arc::new(SystemResolver::new()?)))
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Validate a URL, resolve DNS, and check every address against the policy.
    ///
    /// Gates run in order and the first failure wins:
    /// 1. Parse and normalize the URL
    /// 2. Scheme must be allowed
    /// 3. Hostname must be present
    /// 4. Hostname must not be blocked (no DNS lookup for blocked names)
    /// 5. An IP literal is classified directly and accepted if public
    /// 6. Otherwise every resolved address must be public
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use outbound_guard::{Policy, Validator};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let validator = Validator::system(Policy::default())?;
    /// let validated = validator.validate("https://example.com/api").await?;
    /// println!("Safe to connect to {} via {:?}", validated.host, validated.addrs);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the first [`Denial`] hit. Denials are terminal; do not retry.
    pub async fn validate(&self, url: &str) -> Result<Validated, Denial> {
        let result = self.run_gates(url).await;
        match &result {
            Ok(validated) => tracing::debug!(
                host = %validated.host,
                addrs = ?validated.addrs,
                "outbound URL allowed"
            ),
            Err(denial) => tracing::warn!(code = denial.code(), %denial, "outbound URL denied"),
        }
        result
    }

    /// Validate and fold the outcome into a [`Verdict`].
    pub async fn verdict(&self, url: &str) -> Verdict {
        Verdict::from(&self.validate(url).await)
    }

    /// Synchronous version of [`Validator::validate`].
    ///
    /// This blocks the current thread while performing DNS resolution.
    /// Prefer the async version when possible.
    ///
    /// Works outside of any runtime and inside both multi-threaded and
    /// current-thread Tokio runtimes. A current-thread runtime cannot be
    /// blocked in place, so there the work moves to a scoped thread with a
    /// temporary runtime of its own.
    pub fn validate_blocking(&self, url: &str) -> Result<Validated, Denial> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.validate(url)))
            }
            Ok(_) => std::thread::scope(|scope| {
                scope
                    .spawn(|| self.validate_on_temporary_runtime(url))
                    .join()
                    .unwrap_or_else(|_| {
                        Err(Denial::dns_failed("runtime", "validation thread panicked"))
                    })
            }),
            Err(_) => self.validate_on_temporary_runtime(url),
        }
    }

    fn validate_on_temporary_runtime(&self, url: &str) -> Result<Validated, Denial> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Denial::dns_failed("runtime", e.to_string()))?;
        rt.block_on(self.validate(url))
    }

    async fn run_gates(&self, url: &str) -> Result<Validated, Denial> {
        let safe_url = SafeUrl::parse_with(url, &self.policy)?;

        if let Some(rule) = self.policy.blocked_host_rule(safe_url.host()) {
            return Err(Denial::blocked_host(url, safe_url.host(), rule));
        }

        let (addrs, literal) = match safe_url.host_kind() {
            HostKind::Literal(ip) => {
                self.policy
                    .check_ip(ip)
                    .map_err(|reason| Denial::blocked_ip(url, ip, reason))?;
                (vec![ip], true)
            }
            HostKind::Name(host) => {
                let addrs = self.resolve(host).await?;
                // All must be safe: one bad record is enough to deny.
                for &ip in &addrs {
                    self.policy
                        .check_ip(ip)
                        .map_err(|reason| Denial::blocked_ip(url, ip, reason))?;
                }
                (addrs, false)
            }
        };

        Ok(Validated {
            addrs,
            host: safe_url.host().to_string(),
            port: safe_url.port(),
            url: safe_url.as_str().to_string(),
            https: safe_url.is_https(),
            literal,
        })
    }

    /// Resolve once, with the policy's timeout, into a deduplicated set.
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, Denial> {
        tracing::debug!(host, "resolving outbound host");
        let lookup = self.resolver.lookup(host);
        let addrs = match tokio::time::timeout(self.policy.dns_timeout, lookup).await {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => return Err(Denial::dns_failed(host, e.message)),
            Err(_) => {
                return Err(Denial::dns_failed(
                    host,
                    format!("timed out after {:?}", self.policy.dns_timeout),
                ))
            }
        };

        let unique: BTreeSet<IpAddr> = addrs.into_iter().collect();
        if unique.is_empty() {
            return Err(Denial::dns_failed(host, "no IP addresses found"));
        }
        Ok(unique.into_iter().collect())
    }
}
