//! URL parsing, normalization and the literal-IP split.

use std::net::IpAddr;

use url::{Host, ParseError, Url};

use crate::error::Denial;
use crate::policy::Policy;

/// A parsed URL that passed the syntactic gates.
///
/// Produced once from the raw input and never mutated. Holding a `SafeUrl`
/// means the scheme is allowed by the policy that parsed it, the hostname is
/// present, and there is no userinfo or ambiguous numeric host encoding. It
/// says nothing about where the host points; that is the validator's job.
#[derive(Debug, Clone)]
pub struct SafeUrl {
    inner: Url,
    host: String,
}

/// Outcome of the literal-IP step: either the hostname is an address, or it
/// is a name that still has to be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind<'a> {
    Literal(IpAddr),
    Name(&'a str),
}

impl SafeUrl {
    /// Parse with the default policy.
    pub fn parse(input: &str) -> Result<Self, Denial> {
        Self::parse_with(input, &Policy::default())
    }

    /// Parse `input` and apply the scheme and hostname gates of `policy`.
    ///
    /// Gates run in order and the first failure wins:
    /// - syntax (`invalid-url`)
    /// - scheme (`blocked-scheme`)
    /// - ambiguous numeric hosts and userinfo (`invalid-url`)
    /// - hostname presence (`missing-hostname`)
    pub fn parse_with(input: &str, policy: &Policy) -> Result<Self, Denial> {
        let url = match Url::parse(input) {
            Ok(url) => url,
            Err(e) => return Err(classify_parse_error(input, e, policy)),
        };

        if !policy.is_scheme_allowed(url.scheme()) {
            return Err(Denial::blocked_scheme(
                input,
                url.scheme(),
                policy.allowed_schemes(),
            ));
        }

        // Must look at the raw text: `Url::parse` already rewrote these hosts
        // into canonical dotted quads.
        reject_ambiguous_ip_in_raw_url(input)?;

        if !url.username().is_empty() || url.password().is_some() {
            return Err(Denial::invalid_url(
                input,
                "userinfo (user:pass@) not allowed",
            ));
        }

        let host = match url.host_str() {
            Some(host) => normalize_host(host),
            None => return Err(Denial::missing_hostname(input)),
        };
        if host.is_empty() {
            return Err(Denial::missing_hostname(input));
        }

        Ok(Self { inner: url, host })
    }

    /// Normalized hostname: lower-case, no trailing dot. IPv6 stays bracketed.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Split the host into a literal address or a name to resolve.
    pub fn host_kind(&self) -> HostKind<'_> {
        match self.inner.host() {
            Some(Host::Ipv4(ip)) => HostKind::Literal(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => HostKind::Literal(IpAddr::V6(ip)),
            _ => match self.host.parse::<IpAddr>() {
                Ok(ip) => HostKind::Literal(ip),
                Err(_) => HostKind::Name(&self.host),
            },
        }
    }

    /// Lower-case scheme.
    pub fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    /// Port written in the URL, if any.
    pub fn explicit_port(&self) -> Option<u16> {
        self.inner.port()
    }

    /// Get the port, defaulting to 80 for http and 443 for https.
    pub fn port(&self) -> u16 {
        self.inner.port_or_known_default().unwrap_or(80)
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// Get the full URL as a string.
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    pub fn is_https(&self) -> bool {
        self.inner.scheme() == "https"
    }

    pub fn into_url(self) -> Url {
        self.inner
    }
}

fn classify_parse_error(input: &str, err: ParseError, policy: &Policy) -> Denial {
    match err {
        // `//host/path` carries no scheme at all.
        ParseError::RelativeUrlWithoutBase if input.trim_start().starts_with("//") => {
            Denial::blocked_scheme(input, "", policy.allowed_schemes())
        }
        ParseError::EmptyHost => match raw_scheme(input) {
            Some(scheme) if !policy.is_scheme_allowed(scheme) => {
                Denial::blocked_scheme(
                    input,
                    scheme.to_ascii_lowercase(),
                    policy.allowed_schemes(),
                )
            }
            _ => Denial::missing_hostname(input),
        },
        other => Denial::invalid_url(input, other.to_string()),
    }
}

/// Text before the first `:`, if it is shaped like a scheme.
fn raw_scheme(input: &str) -> Option<&str> {
    let (scheme, _) = input.trim_start().split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    (first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')))
    .then_some(scheme)
}

fn normalize_host(host: &str) -> String {
    let mut normalized = host.to_ascii_lowercase();

    // Remove trailing dot (FQDN notation)
    if normalized.ends_with('.') {
        normalized.pop();
    }

    normalized
}

/// Reject hosts that WHATWG parsing would reinterpret as IPv4: hex, octal,
/// single decimal, and short-form dotted numbers.
fn reject_ambiguous_ip_in_raw_url(url: &str) -> Result<(), Denial> {
    let lower = url.trim_start().to_ascii_lowercase();
    let Some(after_scheme) = lower
        .strip_prefix("http:")
        .or_else(|| lower.strip_prefix("https:"))
    else {
        return Ok(());
    };
    let after_scheme = after_scheme.trim_start_matches(['/', '\\']);

    let authority_end = after_scheme
        .find(['/', '\\', '?', '#'])
        .unwrap_or(after_scheme.len());
    let authority = &after_scheme[..authority_end];

    let host_with_port = authority
        .rfind('@')
        .map(|i| &authority[i + 1..])
        .unwrap_or(authority);

    if host_with_port.starts_with('[') {
        return Ok(());
    }
    let host = host_with_port
        .rfind(':')
        .map(|i| &host_with_port[..i])
        .unwrap_or(host_with_port);

    check_numeric_host(host, url)
}

fn check_numeric_host(host: &str, original_url: &str) -> Result<(), Denial> {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() {
        return Ok(());
    }

    let parts: Vec<&str> = host.split('.').collect();
    let numeric = |p: &&str| !p.is_empty() && (p.bytes().all(|b| b.is_ascii_digit()) || is_hex_part(p));
    if !parts.iter().all(numeric) {
        return Ok(());
    }

    if parts.iter().any(|p| is_hex_part(p)) {
        return Err(Denial::invalid_url(
            original_url,
            "hexadecimal IP encoding not allowed",
        ));
    }

    match parts.len() {
        // 2130706433 = 127.0.0.1
        1 => Err(Denial::invalid_url(
            original_url,
            "decimal IP encoding not allowed",
        )),
        // 127.1 = 127.0.0.1, 127.0.1 = 127.0.0.1
        2 | 3 => Err(Denial::invalid_url(
            original_url,
            "short-form IP encoding not allowed",
        )),
        _ => {
            // Leading zero with more digits = octal (e.g., 0177 = 127)
            if parts.iter().any(|p| p.len() > 1 && p.starts_with('0')) {
                return Err(Denial::invalid_url(
                    original_url,
                    "octal IP encoding not allowed",
                ));
            }
            Ok(())
        }
    }
}

fn is_hex_part(part: &str) -> bool {
    part.strip_prefix("0x")
        .or_else(|| part.strip_prefix("0X"))
        .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_hexdigit()))
}
