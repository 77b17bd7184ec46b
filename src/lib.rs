//! # outbound-guard
//!
//! SSRF-safe validation of untrusted outbound URLs.
//!
//! `outbound-guard` decides whether a URL taken from untrusted input may be
//! fetched by the server. It checks the scheme and hostname, resolves the
//! host, and refuses the URL if *any* resulting address is private, loopback,
//! link-local, multicast or reserved. The accepted addresses are returned so
//! the caller connects to exactly what was checked.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use outbound_guard::{Policy, Validator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = Validator::system(Policy::default())?;
//! match validator.validate("https://example.com/api").await {
//!     Ok(validated) => println!("fetch {} via {:?}", validated.url, validated.addrs),
//!     Err(denial) => println!("refused ({}): {}", denial.code(), denial),
//! }
//! # Ok(())
//! # }
//! ```

mod classify;
mod error;
mod policy;
mod policy_builder;
mod resolve;
mod safe_url;
mod validate;

#[cfg(feature = "fetch")]
mod fetch;

#[cfg(feature = "server")]
pub mod server;

pub use classify::{classify, describe, AddressClass, Classification};
pub use error::{Denial, ResolveError};
pub use policy::{Policy, DEFAULT_DNS_TIMEOUT};
pub use policy_builder::PolicyBuilder;
pub use resolve::{Resolve, StaticResolver, SystemResolver};
pub use safe_url::{HostKind, SafeUrl};
pub use validate::{Validated, Validator, Verdict};

#[cfg(feature = "fetch")]
pub use error::FetchError;
#[cfg(feature = "fetch")]
pub use fetch::{FetchRequest, Fetched, Fetcher, HttpFetcher, DEFAULT_FETCH_TIMEOUT};
#[cfg(all(feature = "fetch", any(test, feature = "negative-control")))]
pub use fetch::LoopbackFetcher;
