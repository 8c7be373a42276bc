//! A Polkadot-ecosystem balance resolver that falls back across several providers.
//!
//! This library asks an indexer API, an alternate REST API and finally the chain's own
//! RPC nodes for an account balance, in that order, and returns the first answer
//! together with which provider gave it and how long it took.
//!
//! # Quick Start
//!
//! ```no_run
//! use multi_provider_balance::{MultiProviderResolver, Outcome, QueryContext, Settings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_env()?;
//! let resolver = MultiProviderResolver::from_settings(&settings)?;
//!
//! let ctx = QueryContext::new().with_progress(|line| eprintln!("{line}"));
//! let resolution = resolver
//!     .resolve("5F5522o328T8MNsjDBTWXjfJvtdQsnUne2wjGvwLC4dLdmBC", &ctx)
//!     .await;
//!
//! match resolution.outcome {
//!     Outcome::Found(result) => {
//!         println!("{} {} via {} ({}ms)", result.total, result.token, result.provider, result.response_time_ms)
//!     }
//!     other => println!("no balance: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Fallback Strategy
//!
//! 1. The indexer is asked first, through a [`RateLimiter`] at its published ceiling
//! 2. On failure or "no data" the alternate REST API is tried
//! 3. Then the chain RPC mirrors, one after another (or raced, see [`RpcStrategy`])
//! 4. Every attempt is recorded in [`Resolution::attempts`]; nothing is ever thrown
//!
//! Network stages race their own timeouts and the caller's cancellation token carried
//! in [`QueryContext`].

pub mod config;
pub mod context;
pub mod errors;
pub mod providers;
pub mod rate_limiter;
pub mod resolver;
pub mod units;

pub use config::{ChainSpec, ProviderId, ProviderSpec, RpcEndpoint, Settings, Timeouts, CHAINS};
pub use context::QueryContext;
pub use errors::{ConfigError, ProviderError, RateLimitError};
pub use providers::{
    AlternateRestProvider, BalanceProvider, ChainRpcProvider, IndexerProvider, RawBalance,
    RpcStrategy,
};
pub use rate_limiter::RateLimiter;
pub use resolver::{
    AttemptFailure, ChainBalance, FailureKind, MultiProviderResolver, Outcome, ProviderAttempt,
    ProviderReport, ProviderResult, Resolution,
};
pub use tokio_util::sync::CancellationToken;
