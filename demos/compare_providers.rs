//! Endpoint-health comparison across every balance provider.
//!
//! This demo fires all providers at once for each address, several rounds in a row,
//! and prints per-provider success counts and average response times. It also runs
//! the multi-chain portfolio sweep on the first address.
//!
//! Usage: `cargo run --example compare_providers -- <address>... [--rounds N] [--parallel]`

use std::{collections::BTreeMap, env};

use anyhow::{bail, Context, Result};
use multi_provider_balance::{
    MultiProviderResolver, QueryContext, RpcStrategy, Settings, CHAINS,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct ProviderTally {
    answers: usize,
    errors: usize,
    total_ms: u64,
    last_error: Option<String>,
}

impl ProviderTally {
    fn avg_ms(&self) -> f64 {
        if self.answers == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.answers as f64
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut addresses = Vec::new();
    let mut rounds = 3usize;
    let mut strategy = RpcStrategy::Sequential;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rounds" => {
                rounds = args
                    .next()
                    .context("--rounds needs a value")?
                    .parse()
                    .context("--rounds must be a number")?;
            }
            "--parallel" => strategy = RpcStrategy::Parallel,
            _ => addresses.push(arg),
        }
    }
    if addresses.is_empty() {
        bail!("usage: compare_providers <address>... [--rounds N] [--parallel]");
    }

    let settings = Settings::from_env()?;
    let resolver = MultiProviderResolver::from_settings_with_strategy(&settings, strategy)?;
    let names = resolver.provider_names();
    let ctx = QueryContext::new();

    let mut tallies: BTreeMap<String, ProviderTally> = BTreeMap::new();

    for round in 1..=rounds {
        for address in &addresses {
            let results = resolver.compare_all_detailed(address, &ctx).await;
            println!("round {round} {address}:");

            for (name, result) in names.iter().zip(results) {
                let tally = tallies.entry(name.clone()).or_default();
                if result.success {
                    tally.answers += 1;
                    tally.total_ms += result.response_time_ms;
                    println!(
                        "  ✓ {name:<15} {:>8}ms  {} {} via {}",
                        result.response_time_ms, result.total, result.token, result.provider
                    );
                } else {
                    tally.errors += 1;
                    println!(
                        "  ✗ {name:<15} {:>8}ms  {}",
                        result.response_time_ms,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                    tally.last_error = result.error;
                }
            }
        }
    }

    println!("\n=== Summary ({} rounds, {:?} RPC) ===", rounds, strategy);
    println!("{:<15} {:>8} {:>8} {:>10}", "provider", "answers", "errors", "avg ms");
    for (name, tally) in &tallies {
        println!(
            "{:<15} {:>8} {:>8} {:>10.1}",
            name,
            tally.answers,
            tally.errors,
            tally.avg_ms()
        );
        if let Some(err) = &tally.last_error {
            println!("  last error: {err}");
        }
    }

    println!("\n=== Portfolio for {} ===", addresses[0]);
    let holdings = resolver.portfolio(&addresses[0], CHAINS, &ctx).await;
    if holdings.is_empty() {
        println!("no balances found (is INDEXER_API_KEY set?)");
    }
    for holding in holdings {
        println!("{:<20} {} {}", holding.chain, holding.result.total, holding.result.token);
    }

    Ok(())
}
