//! Alternate REST adapter (QuickNode-style `accounts/{id}/balance` endpoints).
//!
//! The API shape is not pinned down, so several path variants are tried in order and
//! several response shapes are accepted.

use async_trait::async_trait;
use num_bigint::BigUint;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::{ProviderSpec, Settings},
    context::{short, QueryContext},
    errors::ProviderError,
    providers::{indexer::http_client, BalanceProvider, RawBalance},
    units::parse_units,
};

/// Path variants, most likely first. `{}` is the account id.
const PATH_VARIANTS: &[&str] = &[
    "/accounts/{}/balance-info",
    "/v1/accounts/{}/balance",
    "/api/v1/accounts/{}/balance",
    "/accounts/{}/balance",
];

pub struct AlternateRestProvider {
    client: Client,
    spec: ProviderSpec,
    api_key: Option<String>,
}

impl AlternateRestProvider {
    pub fn new(client: Client, spec: ProviderSpec, api_key: Option<String>) -> Self {
        Self {
            client,
            spec,
            api_key,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        Ok(Self::new(
            http_client(&settings.timeouts)?,
            settings.alternate_spec(),
            settings.alternate_rest_api_key.clone(),
        ))
    }

    async fn get_json(&self, url: Url) -> Result<Value, ProviderError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request
                .header("X-API-Key", key.as_str())
                .bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(100).collect(),
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl BalanceProvider for AlternateRestProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn fetch_balance(
        &self,
        address: &str,
        ctx: &QueryContext,
    ) -> Result<RawBalance, ProviderError> {
        let base_url = self.spec.endpoint_urls.first().ok_or_else(|| {
            ctx.report("Alternate REST URL not configured (set ALTERNATE_REST_BASE_URL)");
            ProviderError::NotConfigured("alternate REST base URL".into())
        })?;
        let base_url = Url::parse(base_url).map_err(|e| {
            ProviderError::NotConfigured(format!("alternate REST base URL {base_url}: {e}"))
        })?;

        ctx.report(format!(
            "Trying {} path variants for {}",
            PATH_VARIANTS.len(),
            short(address)
        ));

        let mut failures = Vec::new();
        for variant in PATH_VARIANTS {
            let url = variant_url(&base_url, variant, address)?;
            debug!(url = %url, "alternate REST request");

            match ctx.cancellable(self.get_json(url.clone())).await {
                Ok(body) => match normalize_balance(&body) {
                    Some((free, reserved)) => {
                        ctx.report(format!("Success with {variant}"));
                        return Ok(RawBalance::new(
                            free,
                            reserved,
                            &self.spec.token_symbol,
                            self.spec.decimal_places,
                        ));
                    }
                    None => {
                        let preview: String = body.to_string().chars().take(200).collect();
                        warn!(url = %url, %preview, "unrecognized balance shape");
                        ctx.report(format!("Unexpected response shape from {variant}"));
                        failures.push((variant.to_string(), "unrecognized response shape".into()));
                    }
                },
                Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled),
                Err(e) => {
                    ctx.report(format!("{variant} failed: {e}"));
                    failures.push((variant.to_string(), e.to_string()));
                }
            }
        }

        Err(ProviderError::AllEndpointsFailed(failures))
    }
}

/// Appends `variant` to `base`, with the address as one percent-encoded segment.
fn variant_url(base: &Url, variant: &str, address: &str) -> Result<Url, ProviderError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ProviderError::NotConfigured(format!("alternate REST base URL {base}")))?
        .pop_if_empty()
        .extend(
            variant
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| if s == "{}" { address } else { s }),
        );
    Ok(url)
}

/// Accepts `{balance}`, `{data: {balance}}`, `{result: {balance}}` or root-level fields.
///
/// Returns `(free, reserved)`; a missing `reserved` reads as zero.
pub fn normalize_balance(body: &Value) -> Option<(BigUint, BigUint)> {
    let balance = ["/balance", "/data/balance", "/result/balance"]
        .iter()
        .find_map(|p| body.pointer(p).filter(|b| b.is_object()))
        .or_else(|| body.get("free").map(|_| body))?;

    let free = parse_units(balance.get("free")?)?;
    let reserved = match balance.get("reserved") {
        None | Some(Value::Null) => BigUint::default(),
        Some(v) => parse_units(v)?,
    };

    Some((free, reserved))
}
