//! outbound-guard: SSRF-safe fetch service and URL checker.
//!
//!   outbound-guard serve --bind 0.0.0.0:8080
//!   outbound-guard check https://example.com/

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use outbound_guard::server::{self, AppState};
use outbound_guard::{HttpFetcher, Policy, Validator};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Validate untrusted outbound URLs before fetching them.
#[derive(Parser)]
#[command(name = "outbound-guard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the guarded fetch service
    Serve {
        /// Address to listen on
        #[arg(long, env = "OUTBOUND_GUARD_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Timeout for each outbound request, in seconds
        #[arg(long, env = "OUTBOUND_GUARD_FETCH_TIMEOUT_SECS", default_value_t = 5)]
        fetch_timeout_secs: u64,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Validate one URL and print the verdict as JSON
    Check {
        /// URL to validate
        url: String,

        #[command(flatten)]
        policy: PolicyArgs,
    },
}

#[derive(Args)]
struct PolicyArgs {
    /// Timeout for each DNS lookup, in milliseconds
    #[arg(long, env = "OUTBOUND_GUARD_DNS_TIMEOUT_MS", default_value_t = 3000)]
    dns_timeout_ms: u64,

    /// Extra hostname (or *.suffix pattern) to block; repeatable
    #[arg(long = "block-host", value_name = "PATTERN")]
    block_hosts: Vec<String>,

    /// Extra CIDR range to block; repeatable
    #[arg(long = "block-cidr", value_name = "CIDR")]
    block_cidrs: Vec<String>,

    /// Refuse plain http
    #[arg(long, env = "OUTBOUND_GUARD_HTTPS_ONLY")]
    https_only: bool,
}

impl PolicyArgs {
    fn build(&self) -> Policy {
        let mut builder = Policy::builder().dns_timeout(Duration::from_millis(self.dns_timeout_ms));
        if self.https_only {
            builder = builder.https_only();
        }
        for host in &self.block_hosts {
            builder = builder.block_host(host);
        }
        for cidr in &self.block_cidrs {
            builder = builder.block_cidr(cidr);
        }
        builder.build()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("outbound_guard=info,tower_http=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            fetch_timeout_secs,
            policy,
        } => {
            let validator =
                Validator::system(policy.build()).context("failed to set up DNS resolver")?;
            let fetcher = HttpFetcher::new(Duration::from_secs(fetch_timeout_secs));
            let state = AppState::new(validator, Arc::new(fetcher));

            let listener = TcpListener::bind(bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            server::serve(listener, state).await?;
        }
        Commands::Check { url, policy } => {
            let validator =
                Validator::system(policy.build()).context("failed to set up DNS resolver")?;
            let verdict = validator.verdict(&url).await;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            if !verdict.allowed {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
