pub mod aggregator_api_mock;
pub mod quote_source_mock;
pub mod quoter_mock;
pub mod wallet_mock;

pub use aggregator_api_mock::{MockAggregatorApi, MockApiState};
pub use quote_source_mock::{mock_trade, MockBehavior, MockQuoteSource};
pub use quoter_mock::MockQuoterBackend;
pub use wallet_mock::MockWallet;

use std::env;

/// Check if mock mode is enabled
pub fn is_mock_mode() -> bool {
    env::var("API_MODE").unwrap_or_default() == "mock"
}

/// Get mock configuration values
pub fn get_mock_config() -> MockConfig {
    MockConfig {
        network_latency_ms: env::var("MOCK_NETWORK_LATENCY")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .unwrap_or(120),
        eth_usdc_price: env::var("MOCK_ETH_USDC_PRICE")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3_000),
        kyberswap_spread_bps: env::var("MOCK_KYBERSWAP_SPREAD_BPS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15),
        paraswap_spread_bps: env::var("MOCK_PARASWAP_SPREAD_BPS")
            .unwrap_or_else(|_| "25".to_string())
            .parse()
            .unwrap_or(25),
    }
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub network_latency_ms: u64,
    /// 1 ETH 당 USDC (정수)
    pub eth_usdc_price: u64,
    pub kyberswap_spread_bps: u32,
    pub paraswap_spread_bps: u32,
}
