use alloy::primitives::{address, Address};

// Chain ids
pub const CHAIN_MAINNET: u64 = 1;
pub const CHAIN_OPTIMISM: u64 = 10;
pub const CHAIN_BNB: u64 = 56;
pub const CHAIN_POLYGON: u64 = 137;
pub const CHAIN_BASE: u64 = 8453;
pub const CHAIN_ARBITRUM_ONE: u64 = 42161;
pub const CHAIN_AVALANCHE: u64 = 43114;

/// 집계기 API가 네이티브 토큰을 표현할 때 쓰는 주소
pub const NATIVE_TOKEN_ADDRESS: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

// Timing (milliseconds)
pub const DEBOUNCE_TIME_MS: u64 = 900;
pub const AGGREGATOR_POLL_INTERVAL_MS: u64 = 9_000;
pub const REQUEST_TIMEOUT_MS: u64 = 10_000;

// Slippage / deadline
pub const DEFAULT_SLIPPAGE_BPS: u32 = 50; // 0.5%
pub const MAX_SLIPPAGE_BPS: u32 = 2_000; // kyberswap build API upper bound
pub const DEFAULT_DEADLINE_SECONDS: u64 = 30 * 60;
pub const BPS_DENOMINATOR: u64 = 10_000;

// Partner fee charged through the aggregators
pub const PARTNER_ID: &str = "DeFi-DEX";
pub const PARTNER_FEE_BPS: u32 = 10;
pub const PARTNER_FEE_RECEIVER: Address = address!("6899a795a9F86c294F291CaaB779509EB99f1702");

// Provider endpoints
pub const KYBERSWAP_API_URL: &str = "https://aggregator-api.kyberswap.com";
pub const PARASWAP_API_URL: &str = "https://api.paraswap.io";
pub const PARASWAP_API_VERSION: &str = "6.2";
pub const KYBERSWAP_ROUTER: Address = address!("6131B5fae19EA4f9D964eAc0408E4408b66337b5");
pub const PARASWAP_AUGUSTUS_V6: Address = address!("6A000F20005980200259B80c5102003040001068");

// Uniswap V3 periphery (same deployment on mainnet, polygon, optimism, arbitrum)
pub const UNISWAP_V3_QUOTER_V2: Address = address!("61fFE014bA17989E743c5F6cB21bF9697530B21e");
pub const UNISWAP_SWAP_ROUTER_02: Address = address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45");
pub const UNISWAP_V3_FEE_TIERS: [u32; 4] = [100, 500, 3_000, 10_000];

/// Chains served by both aggregators
pub const AGGREGATOR_CHAINS: [u64; 7] = [
    CHAIN_MAINNET,
    CHAIN_BNB,
    CHAIN_ARBITRUM_ONE,
    CHAIN_POLYGON,
    CHAIN_OPTIMISM,
    CHAIN_AVALANCHE,
    CHAIN_BASE,
];

/// Chains with a canonical Uniswap V3 quoter at [`UNISWAP_V3_QUOTER_V2`]
pub const CLASSIC_ROUTER_CHAINS: [u64; 4] = [
    CHAIN_MAINNET,
    CHAIN_OPTIMISM,
    CHAIN_POLYGON,
    CHAIN_ARBITRUM_ONE,
];

/// 체인별 래핑된 네이티브 토큰 주소
pub fn wrapped_native_address(chain_id: u64) -> Option<Address> {
    match chain_id {
        CHAIN_MAINNET => Some(address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2")),
        CHAIN_OPTIMISM | CHAIN_BASE => Some(address!("4200000000000000000000000000000000000006")),
        CHAIN_BNB => Some(address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c")),
        CHAIN_POLYGON => Some(address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270")),
        CHAIN_ARBITRUM_ONE => Some(address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1")),
        CHAIN_AVALANCHE => Some(address!("B31f66AA3C1e785363F0875A1B74E27b85FD66c7")),
        _ => None,
    }
}

/// 체인별 네이티브 토큰 심볼
pub fn native_symbol(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_BNB => "BNB",
        CHAIN_POLYGON => "MATIC",
        CHAIN_AVALANCHE => "AVAX",
        _ => "ETH",
    }
}

/// KyberSwap API path segment for a chain
pub fn kyberswap_chain_name(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        CHAIN_MAINNET => Some("ethereum"),
        CHAIN_BNB => Some("bsc"),
        CHAIN_ARBITRUM_ONE => Some("arbitrum"),
        CHAIN_POLYGON => Some("polygon"),
        CHAIN_OPTIMISM => Some("optimism"),
        CHAIN_AVALANCHE => Some("avalanche"),
        CHAIN_BASE => Some("base"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_aggregator_chain_has_a_kyberswap_name() {
        for chain in AGGREGATOR_CHAINS {
            assert!(kyberswap_chain_name(chain).is_some(), "chain {chain}");
            assert!(wrapped_native_address(chain).is_some(), "chain {chain}");
        }
        assert!(kyberswap_chain_name(250).is_none());
    }

    #[test]
    fn test_native_sentinel_is_lowercase() {
        assert_eq!(NATIVE_TOKEN_ADDRESS, NATIVE_TOKEN_ADDRESS.to_lowercase());
        assert_eq!(NATIVE_TOKEN_ADDRESS.len(), 42);
    }
}
