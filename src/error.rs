//! Error types for outbound-guard.

use std::net::IpAddr;
use thiserror::Error;

/// Why the validator refused a URL.
///
/// Every variant is terminal. Callers should surface it and must not retry
/// the same URL, since a second resolution may return a different answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    /// Unparsable input, missing scheme, userinfo, or an ambiguous IP encoding.
    #[error("Invalid URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Scheme is outside the policy's allow-set.
    #[error("Blocked scheme '{scheme}' (allowed: {allowed})")]
    BlockedScheme {
        url: String,
        scheme: String,
        allowed: String,
    },

    /// The URL has no host component.
    #[error("Missing hostname")]
    MissingHostname { url: String },

    /// Hostname matched the policy's blocked-host set.
    #[error("Blocked host: {host} (matches {rule})")]
    BlockedHost { url: String, host: String, rule: String },

    /// A literal or resolved address is not public.
    #[error("Blocked private/reserved IP: {ip} - {reason}")]
    BlockedPrivateIp { url: String, ip: IpAddr, reason: String },

    /// Lookup error, timeout, or an empty answer.
    #[error("DNS resolution failed for {host}: {message}")]
    DnsResolutionFailed { host: String, message: String },
}

impl Denial {
    /// Stable machine-readable code for this denial.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid-url",
            Self::BlockedScheme { .. } => "blocked-scheme",
            Self::MissingHostname { .. } => "missing-hostname",
            Self::BlockedHost { .. } => "blocked-host",
            Self::BlockedPrivateIp { .. } => "blocked-private-ip",
            Self::DnsResolutionFailed { .. } => "dns-resolution-failed",
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn blocked_scheme(
        url: impl Into<String>,
        scheme: impl Into<String>,
        allowed: &[&str],
    ) -> Self {
        Self::BlockedScheme {
            url: url.into(),
            scheme: scheme.into(),
            allowed: allowed.join(", "),
        }
    }

    pub(crate) fn missing_hostname(url: impl Into<String>) -> Self {
        Self::MissingHostname { url: url.into() }
    }

    pub(crate) fn blocked_host(
        url: impl Into<String>,
        host: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self::BlockedHost {
            url: url.into(),
            host: host.into(),
            rule: rule.into(),
        }
    }

    pub(crate) fn blocked_ip(url: impl Into<String>, ip: IpAddr, reason: impl Into<String>) -> Self {
        Self::BlockedPrivateIp {
            url: url.into(),
            ip,
            reason: reason.into(),
        }
    }

    pub(crate) fn dns_failed(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DnsResolutionFailed {
            host: host.into(),
            message: message.into(),
        }
    }
}

/// A resolver could not produce addresses for a name.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ResolveError {
    pub message: String,
}

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Transport failure in the fetch mediator. Never produced by validation.
#[cfg(feature = "fetch")]
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {message}")]
    Client { message: String },

    /// The request failed or timed out.
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },
}
