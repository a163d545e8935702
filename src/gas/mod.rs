//! Safe-low gas price lookup.
//!
//! # Data Flow
//! ```text
//! gas-price gate
//!     → GasOracle::safe_low_gas_price(chain)
//!         → chain's JSON feed (gwei at a JSON pointer)
//!         → on failure / no feed: 85% of eth_gasPrice
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::chain::{ChainClient, ChainError, ChainId, ChainRegistry};
use crate::config::ChainConfig;

/// Percentage of the node's gas price used when no feed answers.
pub const FALLBACK_PERCENT: u128 = 85;

const WEI_PER_GWEI: f64 = 1_000_000_000.0;

#[derive(Debug, Error)]
pub enum GasOracleError {
    #[error("Gas feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gas feed returned no usable value at {0}")]
    MissingValue(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[async_trait]
pub trait GasOracle: Send + Sync {
    /// A gas price (wei) that should get a transaction mined in reasonable time.
    async fn safe_low_gas_price(&self, chain_id: ChainId) -> Result<u128, GasOracleError>;
}

#[derive(Debug, Clone)]
struct FeedSource {
    url: String,
    pointer: String,
}

/// Reads each chain's configured JSON gas feed, falling back to the node.
pub struct HttpGasOracle {
    http: reqwest::Client,
    feeds: HashMap<ChainId, FeedSource>,
    chains: ChainRegistry,
}

impl HttpGasOracle {
    pub fn new(configs: &[ChainConfig], chains: ChainRegistry) -> Self {
        let feeds = configs
            .iter()
            .filter_map(|c| {
                c.gas_oracle_url.as_ref().map(|url| {
                    (
                        ChainId(c.chain_id),
                        FeedSource {
                            url: url.clone(),
                            pointer: c.gas_oracle_pointer.clone(),
                        },
                    )
                })
            })
            .collect();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { http, feeds, chains }
    }

    async fn fetch_feed(&self, feed: &FeedSource) -> Result<u128, GasOracleError> {
        let document: serde_json::Value = self
            .http
            .get(&feed.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_gwei(&document, &feed.pointer)
    }

    async fn fallback(&self, chain_id: ChainId) -> Result<u128, GasOracleError> {
        let price = self.chains.get(chain_id)?.get_gas_price().await?;
        Ok(fallback_price(price))
    }
}

#[async_trait]
impl GasOracle for HttpGasOracle {
    async fn safe_low_gas_price(&self, chain_id: ChainId) -> Result<u128, GasOracleError> {
        if let Some(feed) = self.feeds.get(&chain_id) {
            match self.fetch_feed(feed).await {
                Ok(price) => return Ok(price),
                Err(e) => tracing::warn!(
                    chain_id = %chain_id,
                    error = %e,
                    "Gas feed unavailable, falling back to node gas price"
                ),
            }
        }
        self.fallback(chain_id).await
    }
}

/// 85% of the node's current gas price.
pub fn fallback_price(network_price: u128) -> u128 {
    network_price.saturating_mul(FALLBACK_PERCENT) / 100
}

/// Read a gwei figure (number or numeric string) at `pointer` and convert to wei.
pub fn parse_gwei(document: &serde_json::Value, pointer: &str) -> Result<u128, GasOracleError> {
    let missing = || GasOracleError::MissingValue(pointer.to_string());
    let gwei = match document.pointer(pointer).ok_or_else(missing)? {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(missing)?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(|_| missing())?,
        _ => return Err(missing()),
    };
    if !gwei.is_finite() || gwei < 0.0 {
        return Err(missing());
    }
    Ok((gwei * WEI_PER_GWEI).round() as u128)
}
