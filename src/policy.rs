//! Immutable validation policy.

use std::net::IpAddr;
use std::time::Duration;

use ipnet::IpNet;

use crate::classify::describe;
use crate::policy_builder::PolicyBuilder;

/// Schemes a policy may allow. Policies can narrow this set, never widen it.
pub(crate) const FETCHABLE_SCHEMES: &[&str] = &["http", "https"];

/// Hostnames blocked before DNS resolution.
///
/// Some resolvers answer `localhost` without consulting DNS at all, so it has
/// to be caught by name.
pub(crate) const DEFAULT_BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "metadata.google.internal",
    "metadata.goog",
    "metadata.azure.internal",
    "instance-data", // AWS EC2-Classic
];

/// Default bound on a single DNS lookup.
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(3);

/// Static allow/deny data consulted by the validator.
///
/// A `Policy` is built once (via [`Policy::default`] or [`PolicyBuilder`])
/// and handed to a [`Validator`](crate::Validator). It has no interior
/// mutability, so one policy can back any number of concurrent validations.
///
/// Policies can only add restrictions on top of the address classification
/// table: no policy makes a loopback or private address fetchable.
#[derive(Debug, Clone)]
pub struct Policy {
    pub(crate) allowed_schemes: Vec<&'static str>,
    pub(crate) blocked_hosts: Vec<String>,
    pub(crate) blocked_cidrs: Vec<IpNet>,
    pub(crate) dns_timeout: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allowed_schemes: FETCHABLE_SCHEMES.to_vec(),
            blocked_hosts: DEFAULT_BLOCKED_HOSTNAMES
                .iter()
                .map(|h| h.to_string())
                .collect(),
            blocked_cidrs: Vec::new(),
            dns_timeout: DEFAULT_DNS_TIMEOUT,
        }
    }
}

impl Policy {
    /// Start a builder from the default policy.
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::new()
    }

    pub fn allowed_schemes(&self) -> &[&'static str] {
        &self.allowed_schemes
    }

    pub fn blocked_hosts(&self) -> &[String] {
        &self.blocked_hosts
    }

    pub fn blocked_cidrs(&self) -> &[IpNet] {
        &self.blocked_cidrs
    }

    pub fn dns_timeout(&self) -> Duration {
        self.dns_timeout
    }

    /// Case-insensitive scheme check.
    pub fn is_scheme_allowed(&self, scheme: &str) -> bool {
        self.allowed_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }

    /// Return the rule that blocks `host`, if any.
    ///
    /// An entry blocks the name itself and every subdomain of it.
    pub fn blocked_host_rule(&self, host: &str) -> Option<&str> {
        let host = host.to_ascii_lowercase();
        self.blocked_hosts
            .iter()
            .find(|pattern| matches_hostname_pattern(&host, pattern))
            .map(String::as_str)
    }

    /// Check one address. Returns the reason when it is not fetchable.
    pub fn check_ip(&self, ip: IpAddr) -> Result<(), String> {
        let classification = describe(ip);
        if !classification.class.is_public() {
            return Err(classification.to_string());
        }

        if let Some(cidr) = self.blocked_cidrs.iter().find(|c| c.contains(&ip)) {
            return Err(format!("matches blocked range {}", cidr));
        }

        Ok(())
    }
}

/// Match a hostname against a pattern.
///
/// `*.example.com` matches `example.com` and its subdomains; a bare
/// `example.com` does the same.
pub(crate) fn matches_hostname_pattern(host: &str, pattern: &str) -> bool {
    let base = pattern.strip_prefix("*.").unwrap_or(pattern);
    if base.is_empty() {
        return false;
    }
    host == base
        || host
            .strip_suffix(base)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schemes() {
        let policy = Policy::default();
        assert!(policy.is_scheme_allowed("http"));
        assert!(policy.is_scheme_allowed("HTTPS"));
        assert!(!policy.is_scheme_allowed("ftp"));
        assert!(!policy.is_scheme_allowed("file"));
        assert!(!policy.is_scheme_allowed(""));
    }

    #[test]
    fn test_default_blocked_hosts() {
        let policy = Policy::default();
        assert_eq!(policy.blocked_host_rule("localhost"), Some("localhost"));
        assert_eq!(policy.blocked_host_rule("LOCALHOST"), Some("localhost"));
        assert_eq!(policy.blocked_host_rule("api.localhost"), Some("localhost"));
        assert!(policy.blocked_host_rule("metadata.google.internal").is_some());
        assert!(policy
            .blocked_host_rule("sub.metadata.google.internal")
            .is_some());
        assert!(policy.blocked_host_rule("instance-data").is_some());
        assert!(policy.blocked_host_rule("example.com").is_none());
        // Suffix without a label boundary is a different name.
        assert!(policy.blocked_host_rule("notlocalhost").is_none());
    }

    #[test]
    fn test_check_ip_uses_classification() {
        let policy = Policy::default();
        assert!(policy.check_ip("93.184.216.34".parse().unwrap()).is_ok());

        let reason = policy.check_ip("127.0.0.1".parse().unwrap()).unwrap_err();
        assert!(reason.contains("loopback"));

        let reason = policy.check_ip("192.168.1.1".parse().unwrap()).unwrap_err();
        assert!(reason.contains("private"));
    }

    #[test]
    fn test_hostname_pattern() {
        assert!(matches_hostname_pattern("a.internal.example.com", "*.internal.example.com"));
        assert!(matches_hostname_pattern("internal.example.com", "*.internal.example.com"));
        assert!(!matches_hostname_pattern("example.com", "*.internal.example.com"));
        assert!(!matches_hostname_pattern("evilinternal.example.com", "*.internal.example.com"));
        assert!(!matches_hostname_pattern("example.com", "*."));
    }
}
