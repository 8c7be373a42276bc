use std::{env, time::Duration};

use crate::errors::ConfigError;

/// Unique identifier for one of the balance backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderId(pub &'static str);

impl ProviderId {
    pub const INDEXER: ProviderId = ProviderId("Indexer");
    pub const ALTERNATE_REST: ProviderId = ProviderId("Alternate REST");
    pub const CHAIN_RPC: ProviderId = ProviderId("Chain RPC");
}

/// Static description of one provider: where it lives and how its numbers read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    /// Label reported in results and diagnostics.
    pub name: String,
    /// Base URLs (REST providers) or endpoint mirrors (chain RPC), in priority order.
    pub endpoint_urls: Vec<String>,
    /// Fractional digits of one whole token.
    pub decimal_places: u32,
    pub token_symbol: String,
}

/// A single WebSocket RPC mirror for a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub name: String,
    pub url: String,
    /// Infrastructure operator running the node.
    pub operator: String,
}

impl RpcEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            operator: operator.into(),
        }
    }

    /// Endpoint named after the URL's host.
    pub fn from_url(url: &str) -> Self {
        let host = url
            .split("://")
            .nth(1)
            .unwrap_or(url)
            .split('/')
            .next()
            .unwrap_or(url);
        Self::new(host, url, "Custom")
    }

    /// Label used for results answered by this endpoint.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.operator)
    }
}

/// Built-in knowledge about a chain: token, decimals, indexer host and RPC mirrors.
#[derive(Debug, Clone, Copy)]
pub struct ChainSpec {
    pub name: &'static str,
    pub token: &'static str,
    pub decimals: u32,
    pub indexer_url: &'static str,
    endpoints: &'static [(&'static str, &'static str, &'static str)],
}

impl ChainSpec {
    pub fn endpoints(&self) -> Vec<RpcEndpoint> {
        self.endpoints
            .iter()
            .map(|(name, url, operator)| RpcEndpoint::new(*name, *url, *operator))
            .collect()
    }
}

pub const POLKADOT: ChainSpec = ChainSpec {
    name: "Polkadot",
    token: "DOT",
    decimals: 10,
    indexer_url: "https://polkadot.api.subscan.io",
    endpoints: &[
        ("Dwellir", "wss://polkadot-rpc.dwellir.com", "Dwellir"),
        ("OnFinality", "wss://polkadot.api.onfinality.io/public-ws", "OnFinality"),
        ("RadiumBlock", "wss://polkadot.public.curie.radiumblock.co/ws", "RadiumBlock"),
        ("1RPC", "wss://1rpc.io/dot", "1RPC"),
        ("IBP", "wss://rpc.ibp.network/polkadot", "IBP"),
        ("Polkadot Official", "wss://rpc.polkadot.io", "Polkadot"),
    ],
};

pub const KUSAMA: ChainSpec = ChainSpec {
    name: "Kusama",
    token: "KSM",
    decimals: 12,
    indexer_url: "https://kusama.api.subscan.io",
    endpoints: &[
        ("Kusama Official", "wss://kusama-rpc.polkadot.io", "Polkadot"),
        ("Dwellir", "wss://kusama-rpc.dwellir.com", "Dwellir"),
        ("OnFinality", "wss://kusama.api.onfinality.io/public-ws", "OnFinality"),
        ("RadiumBlock", "wss://kusama.public.curie.radiumblock.co/ws", "RadiumBlock"),
        ("Automata", "wss://1rpc.io/ksm", "1RPC"),
        ("IBP", "wss://rpc.ibp.network/kusama", "IBP"),
    ],
};

pub const WESTEND: ChainSpec = ChainSpec {
    name: "Westend",
    token: "WND",
    decimals: 12,
    indexer_url: "https://westend.api.subscan.io",
    endpoints: &[
        ("Westend Official", "wss://westend-rpc.polkadot.io", "Polkadot"),
        ("Dwellir", "wss://westend-rpc.dwellir.com", "Dwellir"),
        ("OnFinality", "wss://westend.api.onfinality.io/public-ws", "OnFinality"),
        ("RadiumBlock", "wss://westend.public.curie.radiumblock.co/ws", "RadiumBlock"),
    ],
};

pub const ASSET_HUB_POLKADOT: ChainSpec = ChainSpec {
    name: "AssetHub Polkadot",
    token: "DOT",
    decimals: 10,
    indexer_url: "https://assethub-polkadot.api.subscan.io",
    endpoints: &[
        ("Polkadot Official", "wss://polkadot-asset-hub-rpc.polkadot.io", "Polkadot"),
        ("Dwellir", "wss://asset-hub-polkadot-rpc.dwellir.com", "Dwellir"),
        ("IBP", "wss://sys.ibp.network/asset-hub-polkadot", "IBP"),
    ],
};

pub const ASTAR: ChainSpec = ChainSpec {
    name: "Astar",
    token: "ASTR",
    decimals: 18,
    indexer_url: "https://astar.api.subscan.io",
    endpoints: &[
        ("Astar Official", "wss://astar-rpc.dwellir.com", "Dwellir"),
        ("OnFinality", "wss://astar.api.onfinality.io/public-ws", "OnFinality"),
        ("Blast", "wss://astar.public.blastapi.io", "Blast"),
        ("IBP", "wss://rpc.ibp.network/astar", "IBP"),
    ],
};

pub const MOONBEAM: ChainSpec = ChainSpec {
    name: "Moonbeam",
    token: "GLMR",
    decimals: 18,
    indexer_url: "https://moonbeam.api.subscan.io",
    endpoints: &[
        ("Moonbeam Official", "wss://wss.api.moonbeam.network", "Moonbeam"),
        ("OnFinality", "wss://moonbeam.api.onfinality.io/public-ws", "OnFinality"),
        ("Blast", "wss://moonbeam.public.blastapi.io", "Blast"),
        ("Automata", "wss://1rpc.io/glmr", "1RPC"),
        ("IBP", "wss://rpc.ibp.network/moonbeam", "IBP"),
    ],
};

/// Every chain the crate knows out of the box.
pub const CHAINS: &[ChainSpec] = &[POLKADOT, KUSAMA, WESTEND, ASSET_HUB_POLKADOT, ASTAR, MOONBEAM];

/// Looks a chain up by name, ignoring case.
pub fn chain_by_name(name: &str) -> Option<&'static ChainSpec> {
    CHAINS.iter().find(|c| c.name.eq_ignore_ascii_case(name.trim()))
}

/// Per-stage network timeouts.
///
/// Each stage races its own timer; a timeout is an ordinary provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// WebSocket handshake.
    pub connect: Duration,
    /// First round trip after the handshake.
    pub ready: Duration,
    /// Storage query.
    pub query: Duration,
    /// Whole HTTP request, REST providers only.
    pub http: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(8),
            ready: Duration::from_secs(5),
            query: Duration::from_secs(10),
            http: Duration::from_secs(20),
        }
    }
}

impl Timeouts {
    /// Short timeouts for interactive dashboards:
    /// - 3 second connect
    /// - 3 second ready
    /// - 5 second query
    pub fn fast() -> Self {
        Self {
            connect: Duration::from_secs(3),
            ready: Duration::from_secs(3),
            query: Duration::from_secs(5),
            http: Duration::from_secs(8),
        }
    }
}

/// Startup configuration in environment-style key/value form.
#[derive(Debug, Clone)]
pub struct Settings {
    pub chain: &'static ChainSpec,
    pub indexer_base_url: Option<String>,
    pub indexer_api_key: Option<String>,
    pub indexer_requests_per_second: u32,
    pub alternate_rest_base_url: Option<String>,
    pub alternate_rest_api_key: Option<String>,
    pub chain_rpc_endpoint_list: Vec<RpcEndpoint>,
    pub timeouts: Timeouts,
}

/// Published ceiling of the indexer API.
pub const DEFAULT_INDEXER_RPS: u32 = 5;

impl Settings {
    /// Settings for `chain` with only catalog defaults and no credentials.
    pub fn for_chain(chain: &'static ChainSpec) -> Self {
        Self {
            chain,
            indexer_base_url: Some(chain.indexer_url.to_string()),
            indexer_api_key: None,
            indexer_requests_per_second: DEFAULT_INDEXER_RPS,
            alternate_rest_base_url: None,
            alternate_rest_api_key: None,
            chain_rpc_endpoint_list: chain.endpoints(),
            timeouts: Timeouts::default(),
        }
    }

    /// Reads the settings from process environment variables.
    ///
    /// Looks for the following variables:
    /// - `CHAIN_NAME` (default `Polkadot`)
    /// - `INDEXER_BASE_URL`, `INDEXER_API_KEY`, `INDEXER_RPS`
    /// - `ALTERNATE_REST_BASE_URL`, `ALTERNATE_REST_API_KEY`
    /// - `CHAIN_RPC_ENDPOINTS` (comma separated), `QUICKNODE_WSS_URL`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let chain = match get("CHAIN_NAME") {
            Some(name) => chain_by_name(&name).ok_or(ConfigError::UnknownChain(name))?,
            None => &POLKADOT,
        };

        let mut settings = Self::for_chain(chain);

        if let Some(url) = get("INDEXER_BASE_URL") {
            settings.indexer_base_url = Some(url);
        }
        settings.indexer_api_key = get("INDEXER_API_KEY");

        if let Some(rps) = get("INDEXER_RPS") {
            settings.indexer_requests_per_second = rps
                .parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: "INDEXER_RPS",
                    value: rps,
                })?;
        }

        settings.alternate_rest_base_url = get("ALTERNATE_REST_BASE_URL");
        settings.alternate_rest_api_key = get("ALTERNATE_REST_API_KEY");

        if let Some(list) = get("CHAIN_RPC_ENDPOINTS") {
            settings.chain_rpc_endpoint_list = parse_endpoint_list(&list);
        }

        if let Some(wss) = get("QUICKNODE_WSS_URL") {
            settings
                .chain_rpc_endpoint_list
                .insert(0, RpcEndpoint::new("QuickNode", wss, "QuickNode"));
        }

        Ok(settings)
    }

    pub fn indexer_spec(&self) -> ProviderSpec {
        ProviderSpec {
            name: ProviderId::INDEXER.0.to_string(),
            endpoint_urls: self.indexer_base_url.iter().cloned().collect(),
            decimal_places: self.chain.decimals,
            token_symbol: self.chain.token.to_string(),
        }
    }

    pub fn alternate_spec(&self) -> ProviderSpec {
        ProviderSpec {
            name: ProviderId::ALTERNATE_REST.0.to_string(),
            endpoint_urls: self.alternate_rest_base_url.iter().cloned().collect(),
            decimal_places: self.chain.decimals,
            token_symbol: self.chain.token.to_string(),
        }
    }

    pub fn rpc_spec(&self) -> ProviderSpec {
        ProviderSpec {
            name: ProviderId::CHAIN_RPC.0.to_string(),
            endpoint_urls: self
                .chain_rpc_endpoint_list
                .iter()
                .map(|e| e.url.clone())
                .collect(),
            decimal_places: self.chain.decimals,
            token_symbol: self.chain.token.to_string(),
        }
    }
}

/// Parses `url` or `name=url` items separated by commas.
fn parse_endpoint_list(list: &str) -> Vec<RpcEndpoint> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once('=') {
            Some((name, url)) => RpcEndpoint::new(name.trim(), url.trim(), name.trim()),
            None => RpcEndpoint::from_url(item),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_come_from_the_catalog() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();

        assert_eq!(settings.chain.name, "Polkadot");
        assert_eq!(
            settings.indexer_base_url.as_deref(),
            Some("https://polkadot.api.subscan.io")
        );
        assert_eq!(settings.indexer_api_key, None);
        assert_eq!(settings.indexer_requests_per_second, 5);
        assert_eq!(settings.chain_rpc_endpoint_list.len(), 6);
        assert_eq!(settings.rpc_spec().decimal_places, 10);
    }

    #[test]
    fn endpoint_list_and_quicknode_override() {
        let settings = Settings::from_lookup(lookup(&[
            ("CHAIN_NAME", "kusama"),
            ("CHAIN_RPC_ENDPOINTS", "wss://a.example/ws, mirror=wss://b.example"),
            ("QUICKNODE_WSS_URL", "wss://qn.example"),
            ("INDEXER_API_KEY", "  secret "),
        ]))
        .unwrap();

        assert_eq!(settings.chain.token, "KSM");
        assert_eq!(settings.indexer_api_key.as_deref(), Some("secret"));

        let names: Vec<_> = settings
            .chain_rpc_endpoint_list
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, ["QuickNode", "a.example", "mirror"]);
        assert_eq!(settings.chain_rpc_endpoint_list[2].url, "wss://b.example");
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            Settings::from_lookup(lookup(&[("CHAIN_NAME", "Nowhere")])).unwrap_err(),
            ConfigError::UnknownChain("Nowhere".into())
        );
        assert!(matches!(
            Settings::from_lookup(lookup(&[("INDEXER_RPS", "0")])),
            Err(ConfigError::InvalidValue { key: "INDEXER_RPS", .. })
        ));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let settings =
            Settings::from_lookup(lookup(&[("ALTERNATE_REST_BASE_URL", "   ")])).unwrap();
        assert!(settings.alternate_spec().endpoint_urls.is_empty());
    }
}
