//! Builder for custom validation policies.
//!
//! ## Design Principles
//!
//! Custom policies are pure validation constraints:
//!
//! - **Only tighten**: a builder can narrow the scheme set, block more
//!   hostnames and block more CIDRs. Nothing here can make a non-public
//!   address fetchable.
//! - **No context**: policies don't consider headers, methods, callers or time.
//!
//! ## Immutability
//!
//! Once built via [`PolicyBuilder::build()`], a [`Policy`] cannot be modified.
//! The builder consumes `self` on each method call, preventing accidental reuse.
//!
//! ```rust
//! use std::time::Duration;
//! use outbound_guard::Policy;
//!
//! let policy = Policy::builder()
//!     .https_only()
//!     .block_host("*.corp.example.com")
//!     .block_cidr("203.0.113.0/24")
//!     .dns_timeout(Duration::from_secs(2))
//!     .build();
//!
//! assert!(!policy.is_scheme_allowed("http"));
//! assert!(policy.blocked_host_rule("wiki.corp.example.com").is_some());
//! ```

use std::time::Duration;

use ipnet::IpNet;

use crate::policy::Policy;

/// Builder for [`Policy`], starting from the default policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    policy: Policy,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow only `https`.
    pub fn https_only(mut self) -> Self {
        self.policy.allowed_schemes.retain(|s| *s == "https");
        self
    }

    /// Block a hostname and its subdomains.
    ///
    /// Supports wildcards: `*.internal.example.com`
    pub fn block_host(mut self, pattern: &str) -> Self {
        let pattern = pattern.trim().trim_end_matches('.').to_ascii_lowercase();
        if !pattern.is_empty() && !self.policy.blocked_hosts.contains(&pattern) {
            self.policy.blocked_hosts.push(pattern);
        }
        self
    }

    /// Drop every blocked hostname, including the defaults.
    ///
    /// Literal and resolved addresses are still classified, so `localhost`
    /// is then denied by its loopback address instead of by name.
    pub fn clear_blocked_hosts(mut self) -> Self {
        self.policy.blocked_hosts.clear();
        self
    }

    /// Block an additional IP range (CIDR notation). Invalid input is ignored.
    pub fn block_cidr(mut self, cidr: &str) -> Self {
        match cidr.parse::<IpNet>() {
            Ok(net) => self.policy.blocked_cidrs.push(net.trunc()),
            Err(e) => tracing::warn!(cidr, error = %e, "ignoring invalid CIDR"),
        }
        self
    }

    /// Bound on each DNS lookup. Expiry is treated as a resolution failure.
    pub fn dns_timeout(mut self, timeout: Duration) -> Self {
        self.policy.dns_timeout = timeout;
        self
    }

    /// Build the policy.
    pub fn build(self) -> Policy {
        self.policy
    }
}
