use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::aliases::{U160, U24};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use super::{
    read_json_response, AdapterError, ClassicTrade, QuoteSource, SwapIntent, SwapTransaction, Trade,
    TradeFillType, V3Route,
};
use crate::config::ClassicConfig;
use crate::constants::{
    CLASSIC_ROUTER_CHAINS, UNISWAP_SWAP_ROUTER_02, UNISWAP_V3_FEE_TIERS, UNISWAP_V3_QUOTER_V2,
};
use crate::types::{CurrencyAmount, SlippageTolerance, TradeType};

sol! {
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        struct QuoteExactOutputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amount;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params)
            external
            returns (uint256 amountOut, uint160 sqrtPriceX96After, uint32 initializedTicksCrossed, uint256 gasEstimate);

        function quoteExactOutputSingle(QuoteExactOutputSingleParams memory params)
            external
            returns (uint256 amountIn, uint160 sqrtPriceX96After, uint32 initializedTicksCrossed, uint256 gasEstimate);
    }
}

sol! {
    interface ISwapRouter02 {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        struct ExactOutputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 amountOut;
            uint256 amountInMaximum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
        function exactOutputSingle(ExactOutputSingleParams calldata params) external payable returns (uint256 amountIn);
        function multicall(uint256 deadline, bytes[] calldata data) external payable returns (bytes[] memory results);
        function refundETH() external payable;
        function unwrapWETH9(uint256 amountMinimum, address recipient) external payable;
    }
}

/// SwapRouter02 의 "라우터 자신" 수신자 표기 (Constants.ADDRESS_THIS)
const ROUTER_AS_RECIPIENT: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2,
]);

/// 읽기 전용 컨트랙트 호출 경계
#[async_trait]
pub trait QuoterBackend: Send + Sync {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, AdapterError>;
}

/// JSON-RPC `eth_call` 백엔드
pub struct JsonRpcBackend {
    client: Client,
    rpc_url: String,
}

impl JsonRpcBackend {
    pub fn new(client: Client, rpc_url: impl Into<String>) -> Self {
        Self { client, rpc_url: rpc_url.into() }
    }
}

#[async_trait]
impl QuoterBackend for JsonRpcBackend {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, AdapterError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": format!("{:#x}", to), "data": format!("0x{}", hex::encode(&data)) },
                "latest"
            ],
        });

        let response = self.client.post(&self.rpc_url).json(&body).send().await?;
        let value = read_json_response(response).await?;

        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(AdapterError::InvalidResponse(format!("eth_call failed: {}", message)));
        }

        let result = value
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| AdapterError::InvalidResponse("missing eth_call result".to_string()))?;
        let bytes = hex::decode(result.trim_start_matches("0x"))
            .map_err(|e| AdapterError::InvalidResponse(format!("bad eth_call hex: {}", e)))?;
        Ok(Bytes::from(bytes))
    }
}

/// 수수료 티어 하나의 견적
#[derive(Debug, Clone, PartialEq, Eq)]
struct TierQuote {
    fee: u32,
    amount_in: U256,
    amount_out: U256,
    gas_estimate: u64,
}

/// 온체인 Uniswap V3 스타일 클래식 라우터
pub struct UniswapClassicSource {
    backend: Arc<dyn QuoterBackend>,
    quoter: Address,
    router: Address,
    fee_tiers: Vec<u32>,
    chains: Vec<u64>,
}

impl UniswapClassicSource {
    pub fn new(backend: Arc<dyn QuoterBackend>, config: &ClassicConfig) -> Self {
        Self {
            backend,
            quoter: config.quoter,
            router: config.router,
            fee_tiers: config.fee_tiers.clone(),
            chains: config.chains.clone(),
        }
    }

    pub fn with_defaults(backend: Arc<dyn QuoterBackend>) -> Self {
        Self {
            backend,
            quoter: UNISWAP_V3_QUOTER_V2,
            router: UNISWAP_SWAP_ROUTER_02,
            fee_tiers: UNISWAP_V3_FEE_TIERS.to_vec(),
            chains: CLASSIC_ROUTER_CHAINS.to_vec(),
        }
    }

    async fn quote_tier(
        &self,
        intent: &SwapIntent,
        token_in: Address,
        token_out: Address,
        fee: u32,
    ) -> Result<TierQuote, AdapterError> {
        let fixed = intent.amount.raw;
        match intent.trade_type {
            TradeType::ExactInput => {
                let call = IQuoterV2::quoteExactInputSingleCall {
                    params: IQuoterV2::QuoteExactInputSingleParams {
                        tokenIn: token_in,
                        tokenOut: token_out,
                        amountIn: fixed,
                        fee: U24::from(fee),
                        sqrtPriceLimitX96: U160::ZERO,
                    },
                };
                let data = self.backend.call(self.quoter, Bytes::from(call.abi_encode())).await?;
                let decoded = IQuoterV2::quoteExactInputSingleCall::abi_decode_returns(&data)
                    .map_err(|e| AdapterError::InvalidResponse(format!("quoter decode: {}", e)))?;
                Ok(TierQuote {
                    fee,
                    amount_in: fixed,
                    amount_out: decoded.amountOut,
                    gas_estimate: decoded.gasEstimate.saturating_to::<u64>(),
                })
            }
            TradeType::ExactOutput => {
                let call = IQuoterV2::quoteExactOutputSingleCall {
                    params: IQuoterV2::QuoteExactOutputSingleParams {
                        tokenIn: token_in,
                        tokenOut: token_out,
                        amount: fixed,
                        fee: U24::from(fee),
                        sqrtPriceLimitX96: U160::ZERO,
                    },
                };
                let data = self.backend.call(self.quoter, Bytes::from(call.abi_encode())).await?;
                let decoded = IQuoterV2::quoteExactOutputSingleCall::abi_decode_returns(&data)
                    .map_err(|e| AdapterError::InvalidResponse(format!("quoter decode: {}", e)))?;
                Ok(TierQuote {
                    fee,
                    amount_in: decoded.amountIn,
                    amount_out: fixed,
                    gas_estimate: decoded.gasEstimate.saturating_to::<u64>(),
                })
            }
        }
    }
}

#[async_trait]
impl QuoteSource for UniswapClassicSource {
    fn name(&self) -> &str {
        "uniswap"
    }

    fn fill_type(&self) -> TradeFillType {
        TradeFillType::Classic
    }

    fn supported_chains(&self) -> Vec<u64> {
        self.chains.clone()
    }

    async fn fetch_quote(&self, intent: &SwapIntent) -> Result<Option<Trade>, AdapterError> {
        let token_in = intent
            .currency_in
            .wrapped_address()
            .ok_or(AdapterError::UnsupportedChain(intent.chain_id))?;
        let token_out = intent
            .currency_out
            .wrapped_address()
            .ok_or(AdapterError::UnsupportedChain(intent.chain_id))?;

        debug!(
            "🔄 Requesting classic quote: {} -> {} ({}, {} tiers)",
            intent.currency_in, intent.currency_out, intent.trade_type, self.fee_tiers.len()
        );

        let results = join_all(
            self.fee_tiers
                .iter()
                .map(|&fee| self.quote_tier(intent, token_in, token_out, fee)),
        )
        .await;

        let mut quotes = Vec::new();
        let mut transport_error = None;
        for result in results {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(e @ (AdapterError::Network(_) | AdapterError::HttpStatus { .. })) => {
                    warn!("⚠️ Classic quoter unreachable: {}", e);
                    transport_error.get_or_insert(e);
                }
                // 풀이 없거나 유동성이 없는 티어는 revert 한다
                Err(e) => debug!("classic tier skipped: {}", e),
            }
        }

        let Some(best) = best_tier(intent.trade_type, &quotes) else {
            return match transport_error {
                Some(e) => Err(e),
                None => Ok(None),
            };
        };

        Ok(Some(Trade::Classic(ClassicTrade {
            trade_type: intent.trade_type,
            input_amount: CurrencyAmount::from_raw(intent.currency_in.clone(), best.amount_in),
            output_amount: CurrencyAmount::from_raw(intent.currency_out.clone(), best.amount_out),
            routes: vec![V3Route {
                token_in,
                token_out,
                fee: best.fee,
                amount_in: best.amount_in,
                amount_out: best.amount_out,
            }],
            router: self.router,
            gas_estimate: best.gas_estimate,
        })))
    }
}

/// 선택기와 같은 규칙: exact-input 은 더 큰 출력, exact-output 은 더 작은 입력
fn best_tier(trade_type: TradeType, quotes: &[TierQuote]) -> Option<TierQuote> {
    let mut best: Option<&TierQuote> = None;
    for quote in quotes {
        let usable = match trade_type {
            TradeType::ExactInput => !quote.amount_out.is_zero(),
            TradeType::ExactOutput => !quote.amount_in.is_zero(),
        };
        if !usable {
            continue;
        }
        let better = match (best, trade_type) {
            (None, _) => true,
            (Some(current), TradeType::ExactInput) => quote.amount_out > current.amount_out,
            (Some(current), TradeType::ExactOutput) => quote.amount_in < current.amount_in,
        };
        if better {
            best = Some(quote);
        }
    }
    best.cloned()
}

/// SwapRouter02 multicall 트랜잭션 생성
pub fn build_classic_swap(
    trade: &ClassicTrade,
    slippage: &SlippageTolerance,
    recipient: Address,
    deadline: u64,
) -> Result<SwapTransaction, AdapterError> {
    let route = trade
        .routes
        .first()
        .ok_or_else(|| AdapterError::InvalidResponse("classic trade has no route".to_string()))?;

    let wrapped = Trade::Classic(trade.clone());
    let minimum_out = wrapped.minimum_amount_out(slippage).raw;
    let maximum_in = wrapped.maximum_amount_in(slippage).raw;
    let native_in = trade.input_amount.currency.is_native();
    let native_out = trade.output_amount.currency.is_native();
    let swap_recipient = if native_out { ROUTER_AS_RECIPIENT } else { recipient };

    let mut calls: Vec<Bytes> = Vec::new();
    match trade.trade_type {
        TradeType::ExactInput => {
            let call = ISwapRouter02::exactInputSingleCall {
                params: ISwapRouter02::ExactInputSingleParams {
                    tokenIn: route.token_in,
                    tokenOut: route.token_out,
                    fee: U24::from(route.fee),
                    recipient: swap_recipient,
                    amountIn: trade.input_amount.raw,
                    amountOutMinimum: minimum_out,
                    sqrtPriceLimitX96: U160::ZERO,
                },
            };
            calls.push(call.abi_encode().into());
        }
        TradeType::ExactOutput => {
            let call = ISwapRouter02::exactOutputSingleCall {
                params: ISwapRouter02::ExactOutputSingleParams {
                    tokenIn: route.token_in,
                    tokenOut: route.token_out,
                    fee: U24::from(route.fee),
                    recipient: swap_recipient,
                    amountOut: trade.output_amount.raw,
                    amountInMaximum: maximum_in,
                    sqrtPriceLimitX96: U160::ZERO,
                },
            };
            calls.push(call.abi_encode().into());
            if native_in {
                calls.push(ISwapRouter02::refundETHCall {}.abi_encode().into());
            }
        }
    }
    if native_out {
        let call = ISwapRouter02::unwrapWETH9Call { amountMinimum: minimum_out, recipient };
        calls.push(call.abi_encode().into());
    }

    let data = ISwapRouter02::multicallCall { deadline: U256::from(deadline), data: calls }.abi_encode();
    let value = if native_in { maximum_in } else { U256::ZERO };

    Ok(SwapTransaction {
        to: trade.router,
        data: Bytes::from(data),
        value,
        gas_limit: Some(trade.gas_estimate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::QuoteRequest;
    use crate::mocks::MockQuoterBackend;
    use crate::types::Currency;
    use alloy::primitives::address;

    const ONE_ETH: u128 = 1_000_000_000_000_000_000;

    fn usdc() -> Currency {
        Currency::token(1, address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), 6, "USDC")
    }

    fn intent(trade_type: TradeType, amount: CurrencyAmount, other: Currency) -> SwapIntent {
        QuoteRequest { chain_id: 1, trade_type, amount: Some(amount), other_currency: Some(other), account: None }
            .intent()
            .unwrap()
    }

    #[tokio::test]
    async fn test_best_fee_tier_for_exact_input() {
        let backend = Arc::new(
            MockQuoterBackend::new()
                .with_tier(500, U256::from(2_990_000_000u64), U256::from(1u64))
                .with_tier(3_000, U256::from(3_000_000_000u64), U256::from(1u64))
                .with_tier(10_000, U256::from(3_000_000_000u64), U256::from(1u64)),
        );
        let source = UniswapClassicSource::with_defaults(backend.clone());
        let eth = CurrencyAmount::parse("1", &Currency::native(1)).unwrap();

        let trade = source
            .fetch_quote(&intent(TradeType::ExactInput, eth, usdc()))
            .await
            .unwrap()
            .unwrap();
        let Trade::Classic(classic) = &trade else { panic!("expected classic trade") };
        assert_eq!(classic.routes[0].fee, 3_000);
        assert_eq!(trade.output_amount().raw, U256::from(3_000_000_000u64));
        assert!(trade.input_amount().currency.is_native());
        assert_eq!(classic.routes[0].token_in, Currency::native(1).wrapped_address().unwrap());
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn test_best_fee_tier_for_exact_output() {
        let backend = Arc::new(
            MockQuoterBackend::new()
                .with_tier(500, U256::from(1u64), U256::from(335_000_000_000_000_000u128))
                .with_tier(3_000, U256::from(1u64), U256::from(334_000_000_000_000_000u128)),
        );
        let source = UniswapClassicSource::with_defaults(backend);
        let thousand = CurrencyAmount::parse("1000", &usdc()).unwrap();

        let trade = source
            .fetch_quote(&intent(TradeType::ExactOutput, thousand, Currency::native(1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trade.input_amount().raw, U256::from(334_000_000_000_000_000u128));
        assert_eq!(trade.output_amount().raw, U256::from(1_000_000_000u64));
    }

    #[tokio::test]
    async fn test_no_pool_means_no_route() {
        let source = UniswapClassicSource::with_defaults(Arc::new(MockQuoterBackend::new()));
        let eth = CurrencyAmount::parse("1", &Currency::native(1)).unwrap();
        let result = source.fetch_quote(&intent(TradeType::ExactInput, eth, usdc())).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_unsupported_chain_is_skipped() {
        let source = UniswapClassicSource::with_defaults(Arc::new(MockQuoterBackend::new()));
        let bnb = Currency::native(56);
        let token = Currency::token(56, address!("55d398326f99059fF775485246999027B3197955"), 18, "USDT");
        let request = QuoteRequest {
            chain_id: 56,
            trade_type: TradeType::ExactInput,
            amount: CurrencyAmount::try_parse("1", &bnb),
            other_currency: Some(token),
            account: None,
        };
        assert_eq!(
            source.check_request(&request),
            Err(crate::dex::SkipReason::UnsupportedChain(56))
        );
    }

    #[test]
    fn test_build_swap_wraps_native_input() {
        let trade = ClassicTrade {
            trade_type: TradeType::ExactOutput,
            input_amount: CurrencyAmount::from_raw(Currency::native(1), U256::from(ONE_ETH)),
            output_amount: CurrencyAmount::from_raw(usdc(), U256::from(3_000_000_000u64)),
            routes: vec![V3Route {
                token_in: Currency::native(1).wrapped_address().unwrap(),
                token_out: usdc().address.unwrap(),
                fee: 500,
                amount_in: U256::from(ONE_ETH),
                amount_out: U256::from(3_000_000_000u64),
            }],
            router: UNISWAP_SWAP_ROUTER_02,
            gas_estimate: 150_000,
        };
        let recipient = address!("1111111111111111111111111111111111111111");
        let tx = build_classic_swap(&trade, &SlippageTolerance::from_bps(50), recipient, 1_700_000_000).unwrap();

        assert_eq!(tx.to, UNISWAP_SWAP_ROUTER_02);
        assert_eq!(tx.value, U256::from(ONE_ETH + ONE_ETH / 200));

        let multicall = ISwapRouter02::multicallCall::abi_decode(&tx.data).unwrap();
        assert_eq!(multicall.deadline, U256::from(1_700_000_000u64));
        assert_eq!(multicall.data.len(), 2);
        let swap = ISwapRouter02::exactOutputSingleCall::abi_decode(&multicall.data[0]).unwrap();
        assert_eq!(swap.params.amountInMaximum, tx.value);
        assert_eq!(swap.params.recipient, recipient);
        assert_eq!(&multicall.data[1][..4], ISwapRouter02::refundETHCall::SELECTOR.as_slice());
    }

    #[test]
    fn test_build_swap_unwraps_native_output() {
        let trade = ClassicTrade {
            trade_type: TradeType::ExactInput,
            input_amount: CurrencyAmount::from_raw(usdc(), U256::from(3_000_000_000u64)),
            output_amount: CurrencyAmount::from_raw(Currency::native(1), U256::from(ONE_ETH)),
            routes: vec![V3Route {
                token_in: usdc().address.unwrap(),
                token_out: Currency::native(1).wrapped_address().unwrap(),
                fee: 500,
                amount_in: U256::from(3_000_000_000u64),
                amount_out: U256::from(ONE_ETH),
            }],
            router: UNISWAP_SWAP_ROUTER_02,
            gas_estimate: 150_000,
        };
        let recipient = address!("1111111111111111111111111111111111111111");
        let tx = build_classic_swap(&trade, &SlippageTolerance::from_bps(0), recipient, 1).unwrap();

        assert!(tx.value.is_zero());
        let multicall = ISwapRouter02::multicallCall::abi_decode(&tx.data).unwrap();
        let swap = ISwapRouter02::exactInputSingleCall::abi_decode(&multicall.data[0]).unwrap();
        assert_eq!(swap.params.recipient, ROUTER_AS_RECIPIENT);
        assert_eq!(swap.params.amountOutMinimum, U256::from(ONE_ETH));
        let unwrap = ISwapRouter02::unwrapWETH9Call::abi_decode(&multicall.data[1]).unwrap();
        assert_eq!(unwrap.recipient, recipient);
    }
}
