//! Balance backends.
//!
//! Each adapter translates one third-party transport into a [`RawBalance`]. Adapters
//! report failure through [`ProviderError`]; the resolver decides what that means.

pub mod alternate;
pub mod indexer;
pub mod rpc;

use async_trait::async_trait;
use num_bigint::BigUint;

pub use alternate::AlternateRestProvider;
pub use indexer::IndexerProvider;
pub use rpc::{ChainRpcProvider, RpcStrategy};

use crate::{context::QueryContext, errors::ProviderError, units::format_units};

/// A balance in the token's smallest unit, as one provider reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBalance {
    pub free: BigUint,
    pub reserved: BigUint,
    pub token: String,
    pub decimals: u32,
    /// Overrides the provider label, e.g. the RPC endpoint that answered.
    pub source: Option<String>,
}

impl RawBalance {
    pub fn new(free: BigUint, reserved: BigUint, token: impl Into<String>, decimals: u32) -> Self {
        Self {
            free,
            reserved,
            token: token.into(),
            decimals,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// `free + reserved`, computed before any formatting.
    pub fn total(&self) -> BigUint {
        &self.free + &self.reserved
    }

    pub fn free_display(&self) -> String {
        format_units(&self.free, self.decimals)
    }

    pub fn reserved_display(&self) -> String {
        format_units(&self.reserved, self.decimals)
    }

    pub fn total_display(&self) -> String {
        format_units(&self.total(), self.decimals)
    }
}

/// One balance backend.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    /// Label used in results, attempts and progress lines.
    fn name(&self) -> &str;

    /// Fetches the balance of `address`.
    ///
    /// Implementations must not panic on bad input or odd responses; every failure is
    /// an `Err`, with [`ProviderError::NoData`] for "the backend has nothing for this
    /// account".
    async fn fetch_balance(
        &self,
        address: &str,
        ctx: &QueryContext,
    ) -> Result<RawBalance, ProviderError>;
}
