use std::collections::HashMap;
use std::env;
use std::path::Path;

use alloy::primitives::{address, Address};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    AGGREGATOR_CHAINS, AGGREGATOR_POLL_INTERVAL_MS, CLASSIC_ROUTER_CHAINS, DEBOUNCE_TIME_MS,
    DEFAULT_DEADLINE_SECONDS, DEFAULT_SLIPPAGE_BPS, KYBERSWAP_API_URL, MAX_SLIPPAGE_BPS,
    PARASWAP_API_URL, PARASWAP_API_VERSION, PARTNER_FEE_BPS, PARTNER_FEE_RECEIVER, PARTNER_ID,
    REQUEST_TIMEOUT_MS, UNISWAP_SWAP_ROUTER_02, UNISWAP_V3_FEE_TIERS,
    UNISWAP_V3_QUOTER_V2,
};
use crate::types::Currency;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_url: String,
}

/// 디바운스/폴링/타임아웃 등 집계 엔진 타이밍
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub default_slippage_bps: u32,
    pub deadline_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassicConfig {
    pub enabled: bool,
    pub quoter: Address,
    pub router: Address,
    pub fee_tiers: Vec<u32>,
    pub chains: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KyberswapConfig {
    pub enabled: bool,
    pub base_url: String,
    pub client_id: String,
    pub fee_bps: u32,
    pub fee_receiver: Address,
    pub chains: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParaswapConfig {
    pub enabled: bool,
    pub base_url: String,
    pub partner: String,
    pub fee_bps: u32,
    pub fee_receiver: Address,
    pub version: String,
    pub chains: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: Address,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub aggregation: AggregationConfig,
    pub classic: ClassicConfig,
    pub kyberswap: KyberswapConfig,
    pub paraswap: ParaswapConfig,
    #[serde(default)]
    pub tokens: HashMap<String, TokenConfig>, // symbol -> token
}

impl Default for Config {
    fn default() -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(
            "WETH".to_string(),
            TokenConfig { address: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"), decimals: 18 },
        );
        tokens.insert(
            "USDC".to_string(),
            TokenConfig { address: address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), decimals: 6 },
        );
        tokens.insert(
            "USDT".to_string(),
            TokenConfig { address: address!("dAC17F958D2ee523a2206206994597C13D831ec7"), decimals: 6 },
        );
        tokens.insert(
            "DAI".to_string(),
            TokenConfig { address: address!("6B175474E89094C44Da98b954EedeAC495271d0F"), decimals: 18 },
        );
        tokens.insert(
            "WBTC".to_string(),
            TokenConfig { address: address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"), decimals: 8 },
        );

        Self {
            network: NetworkConfig {
                chain_id: 1,
                rpc_url: "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY".to_string(),
            },
            aggregation: AggregationConfig {
                debounce_ms: DEBOUNCE_TIME_MS,
                poll_interval_ms: AGGREGATOR_POLL_INTERVAL_MS,
                request_timeout_ms: REQUEST_TIMEOUT_MS,
                default_slippage_bps: DEFAULT_SLIPPAGE_BPS,
                deadline_seconds: DEFAULT_DEADLINE_SECONDS,
            },
            classic: ClassicConfig {
                enabled: true,
                quoter: UNISWAP_V3_QUOTER_V2,
                router: UNISWAP_SWAP_ROUTER_02,
                fee_tiers: UNISWAP_V3_FEE_TIERS.to_vec(),
                chains: CLASSIC_ROUTER_CHAINS.to_vec(),
            },
            kyberswap: KyberswapConfig {
                enabled: true,
                base_url: KYBERSWAP_API_URL.to_string(),
                client_id: PARTNER_ID.to_string(),
                fee_bps: PARTNER_FEE_BPS,
                fee_receiver: PARTNER_FEE_RECEIVER,
                chains: AGGREGATOR_CHAINS.to_vec(),
            },
            paraswap: ParaswapConfig {
                enabled: true,
                base_url: PARASWAP_API_URL.to_string(),
                partner: PARTNER_ID.to_string(),
                fee_bps: PARTNER_FEE_BPS,
                fee_receiver: PARTNER_FEE_RECEIVER,
                version: PARASWAP_API_VERSION.to_string(),
                chains: AGGREGATOR_CHAINS.to_vec(),
            },
            tokens,
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// `.env` 와 환경 변수로 엔드포인트/체인 덮어쓰기
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        dotenvy::dotenv().ok();

        if let Ok(url) = env::var("KYBERSWAP_SWAP_API_URL") {
            debug!("KyberSwap endpoint overridden: {}", url);
            self.kyberswap.base_url = url;
        }
        if let Ok(url) = env::var("PARASWAP_API_URL") {
            debug!("ParaSwap endpoint overridden: {}", url);
            self.paraswap.base_url = url;
        }
        if let Ok(url) = env::var("RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Ok(chain_id) = env::var("CHAIN_ID") {
            self.network.chain_id = chain_id
                .parse()
                .with_context(|| format!("invalid CHAIN_ID: {}", chain_id))?;
        }
        Ok(())
    }

    /// 심볼로 통화 조회. 체인의 네이티브 심볼이면 네이티브 통화
    pub fn currency(&self, symbol: &str) -> Option<Currency> {
        let chain_id = self.network.chain_id;
        let native = Currency::native(chain_id);
        if native.symbol.eq_ignore_ascii_case(symbol) {
            return Some(native);
        }
        if let Ok(address) = symbol.parse::<Address>() {
            return self
                .tokens
                .iter()
                .find(|(_, token)| token.address == address)
                .map(|(name, token)| Currency::token(chain_id, token.address, token.decimals, name.clone()));
        }
        self.tokens
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(symbol))
            .map(|(name, token)| Currency::token(chain_id, token.address, token.decimals, name.clone()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() && self.classic.enabled {
            return Err(anyhow::anyhow!("Network RPC URL cannot be empty when the classic router is enabled"));
        }

        if !self.classic.enabled && !self.kyberswap.enabled && !self.paraswap.enabled {
            return Err(anyhow::anyhow!("At least one quote source must be enabled"));
        }

        if self.classic.enabled {
            if self.classic.fee_tiers.is_empty() {
                return Err(anyhow::anyhow!("Classic router needs at least one fee tier"));
            }
            if let Some(tier) = self.classic.fee_tiers.iter().find(|tier| **tier >= 1_000_000) {
                return Err(anyhow::anyhow!("Invalid fee tier {} (must be below 1000000)", tier));
            }
        }

        if self.kyberswap.enabled && self.kyberswap.base_url.is_empty() {
            return Err(anyhow::anyhow!("KyberSwap base URL cannot be empty"));
        }
        if self.paraswap.enabled && self.paraswap.base_url.is_empty() {
            return Err(anyhow::anyhow!("ParaSwap base URL cannot be empty"));
        }

        if self.aggregation.default_slippage_bps > MAX_SLIPPAGE_BPS {
            return Err(anyhow::anyhow!(
                "Default slippage {} bps exceeds the maximum of {} bps",
                self.aggregation.default_slippage_bps,
                MAX_SLIPPAGE_BPS
            ));
        }
        if self.aggregation.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("Poll interval must be greater than 0"));
        }
        if self.aggregation.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        Ok(())
    }
}
