//! Provider orchestration: strict priority fallback and the compare-all diagnostic.

use std::{fmt, sync::Arc, time::Duration};

use futures::future::join_all;
use num_traits::Zero;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::{ChainSpec, Settings},
    context::{short, QueryContext},
    errors::ProviderError,
    providers::{
        AlternateRestProvider, BalanceProvider, ChainRpcProvider, IndexerProvider, RawBalance,
        RpcStrategy,
    },
    rate_limiter::RateLimiter,
};

/// One provider's answer, formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub free: String,
    pub reserved: String,
    pub total: String,
    pub token: String,
    pub provider: String,
    pub response_time_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderResult {
    pub fn from_balance(provider: &str, balance: &RawBalance, elapsed: Duration) -> Self {
        Self {
            free: balance.free_display(),
            reserved: balance.reserved_display(),
            total: balance.total_display(),
            token: balance.token.clone(),
            provider: balance.source.clone().unwrap_or_else(|| provider.to_string()),
            response_time_ms: millis(elapsed),
            success: true,
            error: None,
        }
    }
}

/// Why a provider attempt did not produce a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Missing URL or credential; nothing was sent.
    NotConfigured,
    /// The backend answered but knows nothing about the account.
    NoData,
    /// Transport, timeout or decoding failure.
    Fault,
    Cancelled,
}

impl FailureKind {
    fn of(error: &ProviderError) -> Self {
        match error {
            ProviderError::NotConfigured(_) => FailureKind::NotConfigured,
            ProviderError::NoData(_) => FailureKind::NoData,
            ProviderError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Fault,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Record of one provider being asked, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: String,
    pub elapsed: Duration,
    pub error: Option<AttemptFailure>,
}

impl ProviderAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{}: ok ({}ms)", self.provider, self.elapsed.as_millis()),
            Some(e) => write!(
                f,
                "{}: {} ({}ms)",
                self.provider,
                e.message,
                self.elapsed.as_millis()
            ),
        }
    }
}

/// Terminal state of one [`MultiProviderResolver::resolve`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Found(ProviderResult),
    /// Every provider that could be reached reported no data for the account.
    NotFound,
    /// At least one provider failed for a reason other than "no data".
    AllProvidersFailed,
    /// The caller cancelled; later providers were not tried.
    Cancelled,
    /// Blank address, rejected before any provider ran.
    EmptyAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: Outcome,
    /// Attempts in the order they were made.
    pub attempts: Vec<ProviderAttempt>,
}

impl Resolution {
    pub fn result(&self) -> Option<&ProviderResult> {
        match &self.outcome {
            Outcome::Found(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_result(self) -> Option<ProviderResult> {
        match self.outcome {
            Outcome::Found(result) => Some(result),
            _ => None,
        }
    }
}

/// One provider's attempt together with its answer, if it gave one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReport {
    pub attempt: ProviderAttempt,
    pub result: Option<ProviderResult>,
}

impl ProviderReport {
    /// The answer, or a failed placeholder carrying the attempt's error.
    pub fn into_result(self) -> ProviderResult {
        match self.result {
            Some(result) => result,
            None => failed_result(&self.attempt),
        }
    }
}

/// Balance found by the portfolio sweep on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBalance {
    pub chain: &'static str,
    pub result: ProviderResult,
}

/// Tries balance providers in priority order and returns the first success.
///
/// Providers are asked strictly one after another. The only state shared between
/// calls lives in the providers' rate limiters.
pub struct MultiProviderResolver {
    providers: Vec<Arc<dyn BalanceProvider>>,
    indexer: Option<Arc<IndexerProvider>>,
}

impl MultiProviderResolver {
    /// Resolver over injected providers, in priority order.
    pub fn new(providers: Vec<Arc<dyn BalanceProvider>>) -> Self {
        Self {
            providers,
            indexer: None,
        }
    }

    /// Indexer, alternate REST, then chain RPC with sequential endpoint rotation.
    ///
    /// Fails only if an HTTP client cannot be built.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        Self::from_settings_with_strategy(settings, RpcStrategy::Sequential)
    }

    pub fn from_settings_with_strategy(
        settings: &Settings,
        strategy: RpcStrategy,
    ) -> Result<Self, ProviderError> {
        let limiter = RateLimiter::new(settings.indexer_requests_per_second);
        let indexer = Arc::new(IndexerProvider::from_settings(settings, limiter)?);
        Self::with_shared_indexer(settings, indexer, strategy)
    }

    /// Builds the standard provider chain around an existing indexer, so its rate
    /// budget and one-time warnings carry over.
    pub fn with_shared_indexer(
        settings: &Settings,
        indexer: Arc<IndexerProvider>,
        strategy: RpcStrategy,
    ) -> Result<Self, ProviderError> {
        let alternate = Arc::new(AlternateRestProvider::from_settings(settings)?);
        let rpc = Arc::new(ChainRpcProvider::from_settings(settings).with_strategy(strategy));

        let providers: Vec<Arc<dyn BalanceProvider>> = vec![
            Arc::clone(&indexer) as Arc<dyn BalanceProvider>,
            alternate as Arc<dyn BalanceProvider>,
            rpc as Arc<dyn BalanceProvider>,
        ];

        Ok(Self {
            providers,
            indexer: Some(indexer),
        })
    }

    /// Sets the indexer used by [`portfolio`](Self::portfolio).
    pub fn with_indexer(mut self, indexer: Arc<IndexerProvider>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn indexer(&self) -> Option<&Arc<IndexerProvider>> {
        self.indexer.as_ref()
    }

    pub fn providers(&self) -> &[Arc<dyn BalanceProvider>] {
        &self.providers
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Walks the providers in order and stops at the first success.
    ///
    /// Never fails: every provider error ends up in [`Resolution::attempts`].
    pub async fn resolve(&self, address: &str, ctx: &QueryContext) -> Resolution {
        let address = address.trim();
        if address.is_empty() {
            ctx.report("Address is empty");
            return Resolution {
                outcome: Outcome::EmptyAddress,
                attempts: Vec::new(),
            };
        }

        info!(address = %short(address), providers = self.providers.len(), "resolving balance");
        let mut attempts = Vec::with_capacity(self.providers.len());

        for (i, provider) in self.providers.iter().enumerate() {
            let name = provider.name();
            ctx.report(format!("--- Trying {name} (Provider {}) ---", i + 1));

            let (result, attempt) = self.attempt(provider.as_ref(), address, ctx).await;
            let cancelled = matches!(&attempt.error, Some(e) if e.kind == FailureKind::Cancelled);
            attempts.push(attempt);

            if let Some(result) = result {
                ctx.report(format!(
                    "✓ {name} succeeded ({}ms)",
                    result.response_time_ms
                ));
                return Resolution {
                    outcome: Outcome::Found(result),
                    attempts,
                };
            }

            if cancelled {
                ctx.report("Query cancelled");
                return Resolution {
                    outcome: Outcome::Cancelled,
                    attempts,
                };
            }
        }

        let not_found = attempts.iter().any(|a| failure_kind(a) == Some(FailureKind::NoData))
            && attempts.iter().all(|a| {
                matches!(
                    failure_kind(a),
                    Some(FailureKind::NoData | FailureKind::NotConfigured)
                )
            });

        ctx.report("All providers failed:");
        for attempt in &attempts {
            ctx.report(format!("  {attempt}"));
        }
        warn!(address = %short(address), not_found, "no provider returned a balance");

        Resolution {
            outcome: if not_found {
                Outcome::NotFound
            } else {
                Outcome::AllProvidersFailed
            },
            attempts,
        }
    }

    /// [`resolve`](Self::resolve) projected onto "result or nothing".
    pub async fn resolve_balance(&self, address: &str, ctx: &QueryContext) -> Option<ProviderResult> {
        self.resolve(address, ctx).await.into_result()
    }

    /// Asks a single provider by position, ignoring the fallback chain.
    pub async fn query_provider(
        &self,
        index: usize,
        address: &str,
        ctx: &QueryContext,
    ) -> Option<ProviderResult> {
        Some(self.report_provider(index, address, ctx).await?.into_result())
    }

    /// [`query_provider`](Self::query_provider) keeping the structured attempt.
    pub async fn report_provider(
        &self,
        index: usize,
        address: &str,
        ctx: &QueryContext,
    ) -> Option<ProviderReport> {
        let provider = self.providers.get(index)?;
        let (result, attempt) = self.attempt(provider.as_ref(), address.trim(), ctx).await;
        Some(ProviderReport { attempt, result })
    }

    /// Asks every provider at once and returns the ones that answered.
    ///
    /// Diagnostic only; the display path uses [`resolve`](Self::resolve).
    pub async fn compare_all(&self, address: &str, ctx: &QueryContext) -> Vec<ProviderResult> {
        self.compare_all_detailed(address, ctx)
            .await
            .into_iter()
            .filter(|r| r.success)
            .collect()
    }

    /// Like [`compare_all`](Self::compare_all) but keeps failed providers too, in
    /// provider order.
    pub async fn compare_all_detailed(
        &self,
        address: &str,
        ctx: &QueryContext,
    ) -> Vec<ProviderResult> {
        self.compare_reports(address, ctx)
            .await
            .into_iter()
            .map(ProviderReport::into_result)
            .collect()
    }

    /// Every provider at once, one report per provider in provider order.
    pub async fn compare_reports(&self, address: &str, ctx: &QueryContext) -> Vec<ProviderReport> {
        let address = address.trim();
        ctx.report(format!(
            "Comparing {} providers for {}",
            self.providers.len(),
            short(address)
        ));

        let attempts = self.providers.iter().map(|provider| async move {
            let (result, attempt) = self.attempt(provider.as_ref(), address, ctx).await;
            ProviderReport { attempt, result }
        });

        let reports = join_all(attempts).await;
        let answered = reports.iter().filter(|r| r.result.is_some()).count();
        ctx.report(format!("{answered}/{} providers answered", reports.len()));
        reports
    }

    /// Looks the address up on each chain's indexer, one chain at a time.
    ///
    /// Chains without a balance or whose lookup failed are left out.
    pub async fn portfolio(
        &self,
        address: &str,
        chains: &[ChainSpec],
        ctx: &QueryContext,
    ) -> Vec<ChainBalance> {
        let Some(indexer) = &self.indexer else {
            ctx.report("Portfolio lookup needs the indexer provider");
            return Vec::new();
        };

        let address = address.trim();
        let mut found = Vec::new();

        for chain in chains {
            if ctx.is_cancelled() {
                break;
            }
            ctx.report(format!("Checking {}...", chain.name));

            let started = Instant::now();
            match indexer.fetch_chain_balance(chain, address, &ctx.nested()).await {
                Ok(balance) if !balance.total().is_zero() => {
                    let result =
                        ProviderResult::from_balance(indexer.name(), &balance, started.elapsed());
                    ctx.report(format!("{}: {} {}", chain.name, result.total, result.token));
                    found.push(ChainBalance {
                        chain: chain.name,
                        result,
                    });
                }
                Ok(_) => debug!(chain = chain.name, "zero balance"),
                Err(e) => {
                    debug!(chain = chain.name, error = %e, "portfolio lookup failed");
                    ctx.report(format!("{}: skipped ({e})", chain.name));
                }
            }
        }

        found
    }

    async fn attempt(
        &self,
        provider: &dyn BalanceProvider,
        address: &str,
        ctx: &QueryContext,
    ) -> (Option<ProviderResult>, ProviderAttempt) {
        let name = provider.name();
        let started = Instant::now();
        let outcome = provider.fetch_balance(address, &ctx.nested()).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(balance) => {
                let result = ProviderResult::from_balance(name, &balance, elapsed);
                info!(
                    provider = name,
                    source = %result.provider,
                    elapsed_ms = result.response_time_ms,
                    "provider answered"
                );
                let attempt = ProviderAttempt {
                    provider: name.to_string(),
                    elapsed,
                    error: None,
                };
                (Some(result), attempt)
            }
            Err(error) => {
                let kind = FailureKind::of(&error);
                let elapsed_ms = millis(elapsed);
                match kind {
                    FailureKind::NoData | FailureKind::NotConfigured | FailureKind::Cancelled => {
                        info!(provider = name, elapsed_ms, error = %error, "provider skipped")
                    }
                    FailureKind::Fault => {
                        warn!(provider = name, elapsed_ms, error = %error, "provider failed")
                    }
                }
                ctx.report(format!("✗ {name}: {error} ({elapsed_ms}ms)"));

                let attempt = ProviderAttempt {
                    provider: name.to_string(),
                    elapsed,
                    error: Some(AttemptFailure {
                        kind,
                        message: error.to_string(),
                    }),
                };
                (None, attempt)
            }
        }
    }
}

fn failure_kind(attempt: &ProviderAttempt) -> Option<FailureKind> {
    attempt.error.as_ref().map(|e| e.kind)
}

fn failed_result(attempt: &ProviderAttempt) -> ProviderResult {
    ProviderResult {
        free: "0".into(),
        reserved: "0".into(),
        total: "0".into(),
        token: String::new(),
        provider: attempt.provider.clone(),
        response_time_ms: millis(attempt.elapsed),
        success: false,
        error: attempt.error.as_ref().map(|e| e.message.clone()),
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
