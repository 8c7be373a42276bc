//! Direct chain RPC adapter with redundant endpoint mirrors.
//!
//! Each attempt opens a fresh WebSocket session, checks it answers (`system_chain`),
//! reads `System.Account` through `state_getStorage` and closes the session again,
//! whether or not the attempt succeeded. Sessions are never pooled.

pub mod storage;
pub mod ws;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{stream::FuturesUnordered, StreamExt};
use num_bigint::BigUint;
use serde_json::{json, Value};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

pub use ws::{RpcConnector, RpcSession, WsConnector};

use crate::{
    config::{ProviderSpec, RpcEndpoint, Settings, Timeouts},
    context::{short, QueryContext},
    errors::ProviderError,
    providers::{BalanceProvider, RawBalance},
};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// How the endpoint list is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RpcStrategy {
    /// One endpoint at a time, in order, stopping at the first success.
    #[default]
    Sequential,
    /// All endpoints at once; the first success wins and the rest are torn down.
    Parallel,
}

pub struct ChainRpcProvider {
    spec: ProviderSpec,
    endpoints: Vec<RpcEndpoint>,
    timeouts: Timeouts,
    strategy: RpcStrategy,
    connector: Arc<dyn RpcConnector>,
}

impl ChainRpcProvider {
    /// Endpoints are taken from `spec.endpoint_urls` and named after their hosts.
    pub fn new(spec: ProviderSpec, timeouts: Timeouts) -> Self {
        let endpoints = spec
            .endpoint_urls
            .iter()
            .map(|url| RpcEndpoint::from_url(url))
            .collect();

        Self {
            spec,
            endpoints,
            timeouts,
            strategy: RpcStrategy::default(),
            connector: Arc::new(WsConnector),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.rpc_spec(), settings.timeouts)
            .with_endpoints(settings.chain_rpc_endpoint_list.clone())
    }

    /// Replaces the endpoint list, keeping names and operators.
    pub fn with_endpoints(mut self, endpoints: Vec<RpcEndpoint>) -> Self {
        self.spec.endpoint_urls = endpoints.iter().map(|e| e.url.clone()).collect();
        self.endpoints = endpoints;
        self
    }

    pub fn with_strategy(mut self, strategy: RpcStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn RpcConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn strategy(&self) -> RpcStrategy {
        self.strategy
    }

    pub fn endpoints(&self) -> &[RpcEndpoint] {
        &self.endpoints
    }

    /// Tries endpoints in order until one answers.
    pub async fn fetch_sequential(
        &self,
        address: &str,
        ctx: &QueryContext,
    ) -> Result<RawBalance, ProviderError> {
        let key = self.storage_key(address)?;
        ctx.report(format!(
            "Trying {} RPC endpoints for {}",
            self.endpoints.len(),
            short(address)
        ));

        let mut failures = Vec::new();
        for endpoint in &self.endpoints {
            ctx.report(format!("Trying {} ({})...", endpoint.name, endpoint.operator));

            match self.query_endpoint(endpoint, &key, ctx).await {
                Ok(balance) => return Ok(balance),
                Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled),
                Err(e) => {
                    warn!(endpoint = %endpoint.name, error = %e, "rpc endpoint failed");
                    ctx.report(format!("{} failed: {e}", endpoint.name));
                    failures.push((endpoint.name.clone(), e.to_string()));
                }
            }
        }

        ctx.report(format!("All {} RPC endpoints failed", self.endpoints.len()));
        Err(ProviderError::AllEndpointsFailed(failures))
    }

    /// Races every endpoint; the first success wins.
    ///
    /// Losing attempts are cancelled and awaited so their sessions are closed before
    /// this returns.
    pub async fn fetch_parallel(
        &self,
        address: &str,
        ctx: &QueryContext,
    ) -> Result<RawBalance, ProviderError> {
        let key = self.storage_key(address)?;
        ctx.report(format!(
            "Racing {} RPC endpoints for {}",
            self.endpoints.len(),
            short(address)
        ));

        let race_token = ctx.cancellation().child_token();
        let race_ctx = ctx.clone().with_cancellation(race_token.clone());

        let mut attempts: FuturesUnordered<_> = self
            .endpoints
            .iter()
            .map(|endpoint| {
                let key = key.as_str();
                let race_ctx = &race_ctx;
                async move { (endpoint, self.query_endpoint(endpoint, key, race_ctx).await) }
            })
            .collect();

        let mut failures = Vec::new();
        let mut winner = None;

        while let Some((endpoint, result)) = attempts.next().await {
            match result {
                Ok(balance) => {
                    winner = Some(balance);
                    break;
                }
                Err(e) => failures.push((endpoint.name.clone(), e.to_string())),
            }
        }

        race_token.cancel();
        while attempts.next().await.is_some() {}

        match winner {
            Some(balance) => Ok(balance),
            None if ctx.is_cancelled() => Err(ProviderError::Cancelled),
            None => {
                ctx.report(format!("All {} RPC endpoints failed", self.endpoints.len()));
                Err(ProviderError::AllEndpointsFailed(failures))
            }
        }
    }

    fn storage_key(&self, address: &str) -> Result<String, ProviderError> {
        if self.endpoints.is_empty() {
            return Err(ProviderError::NotConfigured("chain RPC endpoint list".into()));
        }
        let account_id = storage::decode_address(address)?;
        Ok(storage::account_storage_key(&account_id))
    }

    async fn query_endpoint(
        &self,
        endpoint: &RpcEndpoint,
        key: &str,
        ctx: &QueryContext,
    ) -> Result<RawBalance, ProviderError> {
        let started = Instant::now();

        let mut session = ctx
            .timed(
                "connect",
                self.timeouts.connect,
                self.connector.connect(&endpoint.url),
            )
            .await?;

        let outcome = async {
            let chain = ctx
                .timed(
                    "ready",
                    self.timeouts.ready,
                    session.request("system_chain", json!([])),
                )
                .await?;
            debug!(endpoint = %endpoint.name, chain = %chain, "rpc session ready");

            let value = ctx
                .timed(
                    "query",
                    self.timeouts.query,
                    session.request("state_getStorage", json!([key])),
                )
                .await?;

            let raw = match &value {
                Value::Null => None,
                Value::String(s) => Some(s.as_str()),
                other => {
                    return Err(ProviderError::Decode(format!(
                        "unexpected storage value {other}"
                    )))
                }
            };
            storage::decode_account_info(raw)
        }
        .await;

        let _ = time::timeout(CLOSE_TIMEOUT, session.close()).await;

        let info = outcome?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(endpoint = %endpoint.name, elapsed_ms, "rpc balance fetched");
        ctx.report(format!("Success via {} ({elapsed_ms}ms)", endpoint.name));

        Ok(RawBalance::new(
            BigUint::from(info.data.free),
            BigUint::from(info.data.reserved),
            &self.spec.token_symbol,
            self.spec.decimal_places,
        )
        .with_source(endpoint.label()))
    }
}

#[async_trait]
impl BalanceProvider for ChainRpcProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn fetch_balance(
        &self,
        address: &str,
        ctx: &QueryContext,
    ) -> Result<RawBalance, ProviderError> {
        match self.strategy {
            RpcStrategy::Sequential => self.fetch_sequential(address, ctx).await,
            RpcStrategy::Parallel => self.fetch_parallel(address, ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use codec::Encode;

    use super::{storage::AccountInfo, *};

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    #[derive(Clone)]
    enum Behavior {
        Refuse,
        HangOnConnect,
        HangOnQuery,
        Answer { free: u128, reserved: u128, delay: Duration },
        Empty,
    }

    #[derive(Default)]
    struct StubConnector {
        behaviors: HashMap<String, Behavior>,
        connects: Mutex<Vec<String>>,
        open: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl StubConnector {
        fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
            Arc::new(Self {
                behaviors: behaviors
                    .iter()
                    .map(|(url, b)| (url.to_string(), b.clone()))
                    .collect(),
                ..Default::default()
            })
        }

        fn connects(&self) -> Vec<String> {
            self.connects.lock().unwrap().clone()
        }
    }

    struct StubSession {
        behavior: Behavior,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RpcConnector for StubConnector {
        async fn connect(&self, url: &str) -> Result<Box<dyn RpcSession>, ProviderError> {
            self.connects.lock().unwrap().push(url.to_string());
            let behavior = self.behaviors.get(url).cloned().unwrap_or(Behavior::Refuse);
            match behavior {
                Behavior::Refuse => Err(ProviderError::WebSocket("connection refused".into())),
                Behavior::HangOnConnect => futures::future::pending().await,
                behavior => {
                    self.open.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(StubSession {
                        behavior,
                        closed: Arc::clone(&self.closed),
                    }))
                }
            }
        }
    }

    #[async_trait]
    impl RpcSession for StubSession {
        async fn request(&mut self, method: &str, _params: Value) -> Result<Value, ProviderError> {
            if method == "system_chain" {
                return Ok(json!("Development"));
            }
            match &self.behavior {
                Behavior::HangOnQuery => futures::future::pending().await,
                Behavior::Answer { free, reserved, delay } => {
                    time::sleep(*delay).await;
                    let mut info = AccountInfo::default();
                    info.data.free = *free;
                    info.data.reserved = *reserved;
                    Ok(json!(format!("0x{}", hex::encode(info.encode()))))
                }
                Behavior::Empty => Ok(Value::Null),
                _ => unreachable!("session for a refused endpoint"),
            }
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn provider(connector: Arc<StubConnector>, urls: &[&str]) -> ChainRpcProvider {
        let spec = ProviderSpec {
            name: "Chain RPC".into(),
            endpoint_urls: urls.iter().map(|u| u.to_string()).collect(),
            decimal_places: 10,
            token_symbol: "DOT".into(),
        };
        ChainRpcProvider::new(spec, Timeouts::fast()).with_connector(connector)
    }

    fn answer(free: u128, reserved: u128) -> Behavior {
        Behavior::Answer {
            free,
            reserved,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_rotates_through_failing_endpoints() {
        let connector = StubConnector::new(&[
            ("wss://a", Behavior::HangOnConnect),
            ("wss://b", Behavior::Refuse),
            ("wss://c", answer(1_000_000_000_000, 500_000_000_000)),
        ]);
        let provider = provider(Arc::clone(&connector), &["wss://a", "wss://b", "wss://c"]);

        let balance = provider
            .fetch_balance(ALICE, &QueryContext::new())
            .await
            .unwrap();

        assert_eq!(connector.connects(), ["wss://a", "wss://b", "wss://c"]);
        assert_eq!(balance.free_display(), "100");
        assert_eq!(balance.reserved_display(), "50");
        assert_eq!(balance.total_display(), "150");
        assert_eq!(balance.source.as_deref(), Some("c (Custom)"));
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_reports_every_failure() {
        let connector = StubConnector::new(&[
            ("wss://a", Behavior::Refuse),
            ("wss://b", Behavior::HangOnQuery),
        ]);
        let provider = provider(Arc::clone(&connector), &["wss://a", "wss://b"]);

        let err = provider
            .fetch_balance(ALICE, &QueryContext::new())
            .await
            .unwrap_err();

        let ProviderError::AllEndpointsFailed(failures) = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, "a");
        assert!(failures[1].1.contains("query"), "{:?}", failures[1]);
        // The hung session is still closed.
        assert_eq!(connector.open.load(Ordering::SeqCst), 1);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_account_reads_as_zero() {
        let connector = StubConnector::new(&[("wss://a", Behavior::Empty)]);
        let provider = provider(connector, &["wss://a"]);

        let balance = provider
            .fetch_balance(ALICE, &QueryContext::new())
            .await
            .unwrap();
        assert_eq!(balance.total_display(), "0");
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_takes_the_fastest_and_closes_the_rest() {
        let connector = StubConnector::new(&[
            (
                "wss://slow",
                Behavior::Answer {
                    free: 1,
                    reserved: 0,
                    delay: Duration::from_secs(2),
                },
            ),
            ("wss://fast", answer(20_000_000_000, 0)),
            ("wss://stuck", Behavior::HangOnQuery),
        ]);
        let provider = provider(Arc::clone(&connector), &["wss://slow", "wss://fast", "wss://stuck"])
            .with_strategy(RpcStrategy::Parallel);

        let balance = provider
            .fetch_balance(ALICE, &QueryContext::new())
            .await
            .unwrap();

        assert_eq!(balance.free_display(), "2");
        assert_eq!(balance.source.as_deref(), Some("fast (Custom)"));
        assert_eq!(connector.open.load(Ordering::SeqCst), 3);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalid_address_never_connects() {
        let connector = StubConnector::new(&[("wss://a", answer(1, 1))]);
        let provider = provider(Arc::clone(&connector), &["wss://a"]);

        let err = provider
            .fetch_balance("definitely-not-an-address", &QueryContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidAddress(_)));
        assert!(connector.connects().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_the_rotation() {
        let connector = StubConnector::new(&[
            ("wss://a", Behavior::HangOnConnect),
            ("wss://b", answer(1, 1)),
        ]);
        let provider = provider(Arc::clone(&connector), &["wss://a", "wss://b"]);

        let token = tokio_util::sync::CancellationToken::new();
        let ctx = QueryContext::new().with_cancellation(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::task::yield_now().await;
            token.cancel();
        });

        let err = provider.fetch_balance(ALICE, &ctx).await.unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(connector.connects(), ["wss://a"]);
    }

    #[tokio::test]
    async fn empty_endpoint_list_is_not_configured() {
        let provider = provider(StubConnector::new(&[]), &[]);
        let err = provider
            .fetch_balance(ALICE, &QueryContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
