//! Indexer REST adapter (Subscan-style `api/scan/account` endpoint).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use num_bigint::BigUint;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    config::{ChainSpec, ProviderSpec, Settings, Timeouts},
    context::{short, QueryContext},
    errors::ProviderError,
    providers::{BalanceProvider, RawBalance},
    rate_limiter::RateLimiter,
    units::parse_units,
};

const ACCOUNT_PATH: &str = "/api/scan/account";

/// Messages the indexer uses for accounts it simply has not seen.
const EXPECTED_MISSES: &[&str] = &["Record Not Found", "Invalid address"];

/// Balance lookups against the indexer, throttled through a shared [`RateLimiter`].
pub struct IndexerProvider {
    client: Client,
    spec: ProviderSpec,
    api_key: Option<String>,
    limiter: RateLimiter,
    missing_key_reported: AtomicBool,
}

impl IndexerProvider {
    pub fn new(
        client: Client,
        spec: ProviderSpec,
        api_key: Option<String>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            client,
            spec,
            api_key,
            limiter,
            missing_key_reported: AtomicBool::new(false),
        }
    }

    /// Fails only if the HTTP client cannot be built (e.g. no TLS backend).
    pub fn from_settings(settings: &Settings, limiter: RateLimiter) -> Result<Self, ProviderError> {
        Ok(Self::new(
            http_client(&settings.timeouts)?,
            settings.indexer_spec(),
            settings.indexer_api_key.clone(),
            limiter,
        ))
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Looks the account up on another chain's indexer, sharing this adapter's
    /// credential and rate budget.
    pub async fn fetch_chain_balance(
        &self,
        chain: &ChainSpec,
        address: &str,
        ctx: &QueryContext,
    ) -> Result<RawBalance, ProviderError> {
        self.fetch_from(chain.indexer_url, chain.token, chain.decimals, address, ctx)
            .await
    }

    async fn fetch_from(
        &self,
        base_url: &str,
        token: &str,
        decimals: u32,
        address: &str,
        ctx: &QueryContext,
    ) -> Result<RawBalance, ProviderError> {
        let api_key = self.require_key(ctx)?;
        let url = format!("{}{ACCOUNT_PATH}", base_url.trim_end_matches('/'));

        debug!(url = %url, address = %short(address), "indexer account lookup");

        let client = self.client.clone();
        let body = json!({ "key": address });
        let cancel = ctx.cancellation().clone();
        let request = self.limiter.execute(move || async move {
            // Cancelled while queued; nothing is sent.
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            let exchange = async {
                let response = client
                    .post(&url)
                    .header("X-API-Key", api_key.as_str())
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Status {
                        status: status.as_u16(),
                        body: body.chars().take(200).collect(),
                    });
                }

                Ok(response.json::<Value>().await?)
            };

            tokio::select! {
                _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                res = exchange => res,
            }
        });

        let envelope = ctx.cancellable(async { request.await? }).await?;

        match parse_account_envelope(&envelope, token, decimals) {
            Err(ProviderError::NoData(reason)) => {
                if EXPECTED_MISSES.iter().any(|m| reason.contains(*m)) {
                    info!(address = %short(address), %reason, "account not indexed");
                    ctx.report(format!("Account not indexed yet ({reason}), falling through"));
                } else {
                    warn!(address = %short(address), %reason, "indexer returned no balance");
                    ctx.report(format!("Indexer returned no balance: {reason}"));
                }
                Err(ProviderError::NoData(reason))
            }
            other => other,
        }
    }

    fn require_key(&self, ctx: &QueryContext) -> Result<String, ProviderError> {
        match &self.api_key {
            Some(key) => Ok(key.clone()),
            None => {
                if !self.missing_key_reported.swap(true, Ordering::Relaxed) {
                    warn!("indexer API key not configured (set INDEXER_API_KEY)");
                    ctx.report("Indexer API key not configured (set INDEXER_API_KEY)");
                }
                Err(ProviderError::NotConfigured("indexer API key".into()))
            }
        }
    }
}

#[async_trait]
impl BalanceProvider for IndexerProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn fetch_balance(
        &self,
        address: &str,
        ctx: &QueryContext,
    ) -> Result<RawBalance, ProviderError> {
        let base_url = self
            .spec
            .endpoint_urls
            .first()
            .ok_or_else(|| ProviderError::NotConfigured("indexer base URL".into()))?;

        self.fetch_from(
            base_url,
            &self.spec.token_symbol,
            self.spec.decimal_places,
            address,
            ctx,
        )
        .await
    }
}

pub(crate) fn http_client(timeouts: &Timeouts) -> Result<Client, ProviderError> {
    Ok(Client::builder().timeout(timeouts.http).build()?)
}

/// Extracts the balance from the indexer's `{code, message, data: {account: ..}}` envelope.
///
/// Unknown accounts, accounts without a balance substructure and malformed envelopes
/// all come back as [`ProviderError::NoData`].
pub fn parse_account_envelope(
    envelope: &Value,
    token: &str,
    decimals: u32,
) -> Result<RawBalance, ProviderError> {
    let code = envelope
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| ProviderError::NoData("malformed envelope".into()))?;

    if code != 0 {
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(ProviderError::NoData(format!("code {code}: {message}")));
    }

    let account = match envelope.pointer("/data/account") {
        None | Some(Value::Null) => {
            return Err(ProviderError::NoData("no account in response".into()))
        }
        Some(Value::String(_)) => {
            return Err(ProviderError::NoData(
                "account known but has no balance data".into(),
            ))
        }
        Some(account) => account,
    };

    let data = account
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| ProviderError::NoData("account without balance substructure".into()))?;

    let free = data
        .get("free")
        .and_then(parse_units)
        .ok_or_else(|| ProviderError::Decode("free balance".into()))?;
    let reserved = match data.get("reserved") {
        None | Some(Value::Null) => BigUint::default(),
        Some(v) => parse_units(v).ok_or_else(|| ProviderError::Decode("reserved balance".into()))?,
    };

    Ok(RawBalance::new(free, reserved, token, decimals))
}
