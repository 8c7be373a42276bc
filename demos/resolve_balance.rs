//! Resolves one account balance through the provider fallback chain.
//!
//! Usage: `cargo run --example resolve_balance -- <address> [chain]`
//!
//! Provider credentials come from the usual environment variables
//! (`INDEXER_API_KEY`, `ALTERNATE_REST_BASE_URL`, ...). Ctrl-C cancels the query.

use std::env;

use anyhow::{bail, Context, Result};
use multi_provider_balance::{
    config::chain_by_name, CancellationToken, MultiProviderResolver, Outcome, QueryContext,
    Settings,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let Some(address) = args.next() else {
        bail!("usage: resolve_balance <address> [chain]");
    };

    let mut settings = Settings::from_env().context("reading provider configuration")?;
    if let Some(name) = args.next() {
        let chain = chain_by_name(&name).with_context(|| format!("unknown chain {name}"))?;
        settings = Settings {
            chain,
            indexer_base_url: Some(chain.indexer_url.to_string()),
            chain_rpc_endpoint_list: chain.endpoints(),
            ..settings
        };
    }

    let resolver = MultiProviderResolver::from_settings(&settings)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let ctx = QueryContext::new()
        .with_cancellation(cancel)
        .with_progress(|line| println!("{line}"));

    let resolution = resolver.resolve(&address, &ctx).await;

    println!();
    match resolution.outcome {
        Outcome::Found(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Outcome::NotFound => println!("{address} is unknown to every provider"),
        Outcome::AllProvidersFailed => {
            println!("balance unavailable, attempts:");
            for attempt in &resolution.attempts {
                println!("  {attempt}");
            }
        }
        Outcome::Cancelled => println!("cancelled"),
        Outcome::EmptyAddress => bail!("address is empty"),
    }

    Ok(())
}
