//! Application state and logic for the TUI dashboard.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};

use multi_provider_balance::{
    CancellationToken, FailureKind, IndexerProvider, MultiProviderResolver, ProviderError,
    ProviderResult, RateLimiter, RpcStrategy, Settings,
};

const PROGRESS_LINES: usize = 200;

/// How a query walks the providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Priority order, first success wins.
    Fallback,
    /// Every provider at once, all results kept.
    CompareAll,
    /// Only the selected provider.
    SingleProvider,
}

/// How one provider fared inside a finished query.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSample {
    pub provider: String,
    pub latency_ms: f64,
    /// `None` when the provider answered.
    pub failure: Option<FailureKind>,
    /// Where the answer came from; the endpoint label for chain RPC.
    pub source: Option<String>,
}

/// Overall result of one query, judged from its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Found,
    /// Only "no data" and "not configured" answers.
    NotFound,
    Failed,
}

impl Verdict {
    pub fn of(samples: &[ProviderSample]) -> Self {
        if samples.iter().any(|s| s.failure.is_none()) {
            return Verdict::Found;
        }
        let no_data = samples
            .iter()
            .any(|s| s.failure == Some(FailureKind::NoData));
        let only_misses = samples.iter().all(|s| {
            matches!(
                s.failure,
                Some(FailureKind::NoData | FailureKind::NotConfigured)
            )
        });
        if no_data && only_misses {
            Verdict::NotFound
        } else {
            Verdict::Failed
        }
    }
}

/// What a background query sends back when it is done.
#[derive(Debug, Clone)]
pub struct QueryReport {
    pub verdict: Verdict,
    pub samples: Vec<ProviderSample>,
    pub balance: Option<ProviderResult>,
    pub latency_ms: f64,
    pub message: String,
}

/// Events emitted by background queries, tagged with the query they belong to.
#[derive(Debug)]
pub enum AppEvent {
    Progress { query: u64, line: String },
    QueryFinished { query: u64, report: QueryReport },
}

/// Outcome counts for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderTally {
    pub found: u64,
    pub no_data: u64,
    pub not_configured: u64,
    pub faults: u64,
    pub cancelled: u64,
    found_ms: f64,
    pub last_source: Option<String>,
}

impl ProviderTally {
    fn record(&mut self, sample: &ProviderSample) {
        match sample.failure {
            None => {
                self.found += 1;
                self.found_ms += sample.latency_ms;
                if let Some(source) = &sample.source {
                    self.last_source = Some(source.clone());
                }
            }
            Some(FailureKind::NoData) => self.no_data += 1,
            Some(FailureKind::NotConfigured) => self.not_configured += 1,
            Some(FailureKind::Fault) => self.faults += 1,
            Some(FailureKind::Cancelled) => self.cancelled += 1,
        }
    }

    /// Mean latency of the answers this provider gave.
    pub fn avg_found_ms(&self) -> Option<f64> {
        (self.found > 0).then(|| self.found_ms / self.found as f64)
    }
}

/// Query counts by how they ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryTally {
    pub found: u64,
    pub not_found: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl QueryTally {
    pub fn total(&self) -> u64 {
        self.found + self.not_found + self.failed + self.cancelled
    }
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    token: CancellationToken,
}

/// Main application state for the TUI.
pub struct App {
    pub settings: Settings,
    pub resolver: Arc<MultiProviderResolver>,
    /// Kept across resolver rebuilds so the rate budget stays shared.
    pub indexer: Arc<IndexerProvider>,
    pub providers: Vec<String>,
    pub address: String,
    pub selected_idx: usize,
    pub mode: Mode,
    pub strategy: RpcStrategy,
    pub status: String,
    pub last: Option<QueryReport>,
    pub tallies: HashMap<String, ProviderTally>,
    pub queries: QueryTally,
    pub progress_log: VecDeque<String>,
    in_flight: Option<InFlight>,
    next_query: u64,
    pub batch_mode: bool,
    pub batch_count: usize,
    pub batch_current: usize,
    pub stats_since: Instant,
}

impl App {
    pub fn new(settings: Settings, address: String) -> Result<Self, ProviderError> {
        let strategy = RpcStrategy::Sequential;
        let limiter = RateLimiter::new(settings.indexer_requests_per_second);
        let indexer = Arc::new(IndexerProvider::from_settings(&settings, limiter)?);
        let resolver = Arc::new(MultiProviderResolver::with_shared_indexer(
            &settings,
            Arc::clone(&indexer),
            strategy,
        )?);
        let providers = resolver.provider_names();

        Ok(Self {
            settings,
            resolver,
            indexer,
            providers,
            address,
            selected_idx: 0,
            mode: Mode::Fallback,
            strategy,
            status: String::from("Ready. Press 'r' to query or 'b' for batch mode"),
            last: None,
            tallies: HashMap::new(),
            queries: QueryTally::default(),
            progress_log: VecDeque::with_capacity(PROGRESS_LINES),
            in_flight: None,
            next_query: 0,
            batch_mode: false,
            batch_count: 10,
            batch_current: 0,
            stats_since: Instant::now(),
        })
    }

    pub fn next_provider(&mut self) {
        if !self.providers.is_empty() {
            self.selected_idx = (self.selected_idx + 1) % self.providers.len();
        }
    }

    pub fn prev_provider(&mut self) {
        if !self.providers.is_empty() {
            self.selected_idx = self
                .selected_idx
                .checked_sub(1)
                .unwrap_or(self.providers.len() - 1);
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            Mode::Fallback => Mode::CompareAll,
            Mode::CompareAll => Mode::SingleProvider,
            Mode::SingleProvider => Mode::Fallback,
        };
    }

    /// Switches the chain RPC endpoint strategy. Only the resolver is rebuilt; the
    /// indexer and its limiter stay the same.
    pub fn toggle_strategy(&mut self) {
        let next = match self.strategy {
            RpcStrategy::Sequential => RpcStrategy::Parallel,
            RpcStrategy::Parallel => RpcStrategy::Sequential,
        };

        match MultiProviderResolver::with_shared_indexer(
            &self.settings,
            Arc::clone(&self.indexer),
            next,
        ) {
            Ok(resolver) => {
                self.resolver = Arc::new(resolver);
                self.strategy = next;
                self.status = format!("RPC strategy: {}", self.strategy_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not rebuild resolver");
                self.status = format!("RPC strategy unchanged: {e}");
            }
        }
    }

    pub fn toggle_batch_mode(&mut self) {
        self.batch_mode = !self.batch_mode;
        if self.batch_mode {
            self.batch_current = 0;
            self.status = format!("Batch mode ON: {} queries queued", self.batch_count);
        } else {
            self.status = "Batch mode OFF".to_string();
        }
    }

    pub fn increase_batch_count(&mut self) {
        self.batch_count = (self.batch_count + 10).min(1000);
    }

    pub fn decrease_batch_count(&mut self) {
        self.batch_count = self.batch_count.saturating_sub(10).max(10);
    }

    /// Registers a new query and hands out its id and cancellation token.
    ///
    /// `None` while another query is still running.
    pub fn begin_query(&mut self) -> Option<(u64, CancellationToken)> {
        if self.is_busy() {
            return None;
        }
        self.next_query += 1;
        let token = CancellationToken::new();
        self.in_flight = Some(InFlight {
            id: self.next_query,
            token: token.clone(),
        });
        Some((self.next_query, token))
    }

    /// Cancels the running query, if any. Its late events are ignored.
    pub fn cancel_query(&mut self) {
        if let Some(query) = self.in_flight.take() {
            query.token.cancel();
            self.queries.cancelled += 1;
            self.batch_mode = false;
            self.status = "Query cancelled".to_string();
            self.push_progress(format!("Query #{} cancelled", query.id));
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    fn is_current(&self, query: u64) -> bool {
        self.in_flight.as_ref().is_some_and(|q| q.id == query)
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Progress { query, line } if self.is_current(query) => {
                self.push_progress(line);
            }
            AppEvent::QueryFinished { query, report } if self.is_current(query) => {
                self.finish_query(report);
            }
            AppEvent::Progress { .. } => {}
            AppEvent::QueryFinished { query, .. } => {
                tracing::debug!(query, "dropping result of an abandoned query");
            }
        }
    }

    fn push_progress(&mut self, line: String) {
        self.progress_log.push_back(line);
        if self.progress_log.len() > PROGRESS_LINES {
            self.progress_log.pop_front();
        }
    }

    fn finish_query(&mut self, report: QueryReport) {
        self.in_flight = None;

        for sample in &report.samples {
            self.tallies
                .entry(sample.provider.clone())
                .or_default()
                .record(sample);
        }

        match report.verdict {
            Verdict::Found => self.queries.found += 1,
            Verdict::NotFound => self.queries.not_found += 1,
            Verdict::Failed => self.queries.failed += 1,
        }

        let mark = if report.verdict == Verdict::Found { "✓" } else { "✗" };
        self.status = format!("{mark} {} ({:.0} ms)", report.message, report.latency_ms);
        self.last = Some(report);

        if self.batch_mode {
            self.batch_current += 1;
            if self.batch_current >= self.batch_count {
                self.batch_mode = false;
                self.status = format!("Batch complete! {} queries finished", self.batch_count);
            }
        }
    }

    /// Forgets every tally and the last result. A running query keeps running.
    pub fn reset_stats(&mut self) {
        self.tallies.clear();
        self.queries = QueryTally::default();
        self.last = None;
        self.progress_log.clear();
        self.stats_since = Instant::now();
        self.status = "Stats reset".to_string();
    }

    pub fn selected_provider(&self) -> Option<&str> {
        self.providers.get(self.selected_idx).map(String::as_str)
    }

    pub fn mode_string(&self) -> String {
        match self.mode {
            Mode::Fallback => format!("Fallback ({} providers)", self.providers.len()),
            Mode::CompareAll => "Compare all".to_string(),
            Mode::SingleProvider => "Single provider".to_string(),
        }
    }

    pub fn strategy_string(&self) -> &'static str {
        match self.strategy {
            RpcStrategy::Sequential => "Sequential",
            RpcStrategy::Parallel => "Parallel",
        }
    }

    pub fn should_run_call(&self) -> bool {
        self.batch_mode && !self.is_busy() && self.batch_current < self.batch_count
    }

    pub fn stats_age(&self) -> Duration {
        self.stats_since.elapsed()
    }

    /// Indexer lookups waiting in the rate limiter.
    pub fn indexer_backlog(&self) -> usize {
        self.indexer.limiter().queue_len()
    }
}
