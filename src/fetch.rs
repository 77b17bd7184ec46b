//! Outbound fetching of validated targets.
//!
//! The mediator never follows redirects (each hop would be an unvalidated
//! target) and never re-resolves a validated hostname: the connection goes to
//! the addresses the validator already classified.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy as RedirectPolicy;
use reqwest::Client;
use url::Url;

use crate::error::FetchError;
use crate::validate::Validated;

/// Default bound on a whole outbound request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// What to fetch, and where the host is allowed to point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    url: String,
    /// Host as it appears in `url`, with the addresses it must connect to.
    pin: Option<(String, Vec<SocketAddr>)>,
}

impl FetchRequest {
    /// Request for a validated target, pinned to its validated addresses.
    pub fn pinned(validated: &Validated) -> Self {
        // Key the override by the URL's own host text so reqwest matches it
        // exactly (e.g. a trailing dot survives in the URL).
        let pin = (!validated.literal).then(|| {
            let host = Url::parse(&validated.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| validated.host.clone());
            (host, validated.socket_addrs())
        });

        Self {
            url: validated.url.clone(),
            pin,
        }
    }

    /// Request that skips validation. Only for demonstrating SSRF in tests.
    #[cfg(any(test, feature = "negative-control"))]
    pub fn unvalidated(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pin: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Addresses the request is pinned to, empty when the host is a literal.
    pub fn pinned_addrs(&self) -> &[SocketAddr] {
        self.pin.as_ref().map(|(_, addrs)| addrs.as_slice()).unwrap_or(&[])
    }
}

/// Response of an outbound fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub status: u16,
    pub body: String,
}

impl Fetched {
    /// First `limit` characters of the body.
    pub fn truncated_body(&self, limit: usize) -> String {
        self.body.chars().take(limit).collect()
    }
}

/// Capability that performs outbound HTTP requests.
///
/// Injected into the service at construction time, so production and tests
/// differ only in which implementation they pass in.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<Fetched, FetchError>;
}

/// Production fetcher on top of reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Build a client for one request.
    ///
    /// Redirects are off and proxies are ignored, since a proxy would resolve
    /// the hostname itself.
    fn client_for(&self, request: &FetchRequest) -> Result<Client, FetchError> {
        let mut builder = Client::builder()
            .redirect(RedirectPolicy::none())
            .no_proxy()
            .timeout(self.timeout);

        if let Some((host, addrs)) = &request.pin {
            builder = builder.resolve_to_addrs(host, addrs);
        }

        builder.build().map_err(|e| FetchError::Client {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Fetched, FetchError> {
        let client = self.client_for(&request)?;
        send(&client, &request.url).await
    }
}

async fn send(client: &Client, url: &str) -> Result<Fetched, FetchError> {
    let http_error = |e: reqwest::Error| FetchError::Http {
        url: url.to_string(),
        message: e.to_string(),
    };

    let response = client.get(url).send().await.map_err(http_error)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(http_error)?;

    tracing::debug!(url, status, "outbound fetch complete");
    Ok(Fetched { status, body })
}

/// Sends every request to one fixed local address, whatever the URL's host.
///
/// Lets tests point the unvalidated route back at the service itself, the way
/// an SSRF would reach an internal-only endpoint.
#[cfg(any(test, feature = "negative-control"))]
#[derive(Debug, Clone)]
pub struct LoopbackFetcher {
    target: SocketAddr,
}

#[cfg(any(test, feature = "negative-control"))]
impl LoopbackFetcher {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

#[cfg(any(test, feature = "negative-control"))]
#[async_trait]
impl Fetcher for LoopbackFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<Fetched, FetchError> {
        let invalid = |reason: &str| FetchError::Http {
            url: request.url.clone(),
            message: reason.to_string(),
        };

        let mut url = Url::parse(&request.url).map_err(|e| invalid(&e.to_string()))?;
        url.set_ip_host(self.target.ip())
            .map_err(|_| invalid("URL cannot carry a host"))?;
        url.set_port(Some(self.target.port()))
            .map_err(|_| invalid("URL cannot carry a port"))?;

        let client = Client::builder()
            .redirect(RedirectPolicy::none())
            .no_proxy()
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Client {
                message: e.to_string(),
            })?;

        send(&client, url.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validated(url: &str, host: &str, addrs: &[&str], literal: bool) -> Validated {
        let parsed = Url::parse(url).unwrap();
        Validated {
            addrs: addrs.iter().map(|a| a.parse().unwrap()).collect(),
            host: host.to_string(),
            port: parsed.port_or_known_default().unwrap(),
            url: parsed.to_string(),
            https: parsed.scheme() == "https",
            literal,
        }
    }

    #[test]
    fn test_pinned_request_carries_validated_addrs() {
        let v = validated(
            "https://example.com/a",
            "example.com",
            &["93.184.216.34", "2606:2800:220:1:248:1893:25c8:1946"],
            false,
        );
        let request = FetchRequest::pinned(&v);

        assert_eq!(request.url(), "https://example.com/a");
        assert_eq!(
            request.pinned_addrs(),
            &[
                "93.184.216.34:443".parse::<SocketAddr>().unwrap(),
                "[2606:2800:220:1:248:1893:25c8:1946]:443".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_pin_keyed_by_url_host() {
        let v = validated("http://example.com./", "example.com", &["93.184.216.34"], false);
        let request = FetchRequest::pinned(&v);
        let (host, _) = request.pin.as_ref().unwrap();
        assert_eq!(host, "example.com.");
    }

    #[test]
    fn test_literal_request_not_pinned() {
        let v = validated("http://93.184.216.34/", "93.184.216.34", &["93.184.216.34"], true);
        let request = FetchRequest::pinned(&v);
        assert!(request.pinned_addrs().is_empty());
    }

    #[test]
    fn test_truncated_body_counts_chars() {
        let fetched = Fetched {
            status: 200,
            body: "é".repeat(600),
        };
        let preview = fetched.truncated_body(500);
        assert_eq!(preview.chars().count(), 500);

        let short = Fetched {
            status: 200,
            body: "ok".to_string(),
        };
        assert_eq!(short.truncated_body(500), "ok");
    }

    #[tokio::test]
    async fn test_transport_error_is_fetch_error() {
        // Nothing listens on port 1 of the loopback interface.
        let v = validated("http://unreachable.test:1/", "unreachable.test", &["127.0.0.1"], false);
        let fetcher = HttpFetcher::new(Duration::from_secs(2));
        let err = fetcher.fetch(FetchRequest::pinned(&v)).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { .. }));
    }
}
