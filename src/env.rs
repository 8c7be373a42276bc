//! Environment configuration for the dashboard.

use std::env;

use color_eyre::{eyre::WrapErr, Result};
use multi_provider_balance::{Settings, Timeouts};

/// Account queried when `BALANCE_ADDRESS` is not set.
pub const DEFAULT_ADDRESS: &str = "5F5522o328T8MNsjDBTWXjfJvtdQsnUne2wjGvwLC4dLdmBC";

/// Loads resolver settings and the target address from environment variables.
///
/// Reads everything [`Settings::from_env`] reads, plus:
/// - `BALANCE_ADDRESS`
///
/// Interactive use gets the short timeouts.
pub fn settings_from_env() -> Result<(Settings, String)> {
    let mut settings = Settings::from_env().wrap_err("invalid resolver configuration")?;
    settings.timeouts = Timeouts::fast();

    let address = env::var("BALANCE_ADDRESS")
        .ok()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

    if settings.indexer_api_key.is_none() && settings.alternate_rest_base_url.is_none() {
        tracing::warn!("no REST credentials configured, only chain RPC will answer");
    }

    Ok((settings, address))
}
