use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::constants::{
    AGGREGATOR_CHAINS, KYBERSWAP_ROUTER, PARASWAP_AUGUSTUS_V6, PARTNER_FEE_BPS,
    PARTNER_FEE_RECEIVER, UNISWAP_SWAP_ROUTER_02,
};
use crate::dex::{
    AdapterError, ClassicTrade, KyberswapTrade, ParaswapTrade, QuoteSource, SwapFee, SwapIntent,
    Trade, TradeFillType, V3Route,
};
use crate::types::{Currency, CurrencyAmount, TradeType};

/// 모의 공급자의 응답 방식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// 출력 = 입력 * numerator / denominator (최소 단위 기준)
    Rate { numerator: u128, denominator: u128 },
    NoRoute,
    Fail(String),
}

/// 지연과 응답을 조절할 수 있는 모의 견적 공급자
pub struct MockQuoteSource {
    name: String,
    fill_type: TradeFillType,
    chains: Vec<u64>,
    exact_input_only: bool,
    polling: Option<Duration>,
    latency: Duration,
    latencies: Mutex<VecDeque<Duration>>,
    behavior: Mutex<MockBehavior>,
    calls: Mutex<Vec<SwapIntent>>,
}

impl MockQuoteSource {
    pub fn new(name: impl Into<String>, fill_type: TradeFillType) -> Self {
        Self {
            name: name.into(),
            fill_type,
            chains: AGGREGATOR_CHAINS.to_vec(),
            exact_input_only: false,
            polling: None,
            latency: Duration::ZERO,
            latencies: Mutex::new(VecDeque::new()),
            behavior: Mutex::new(MockBehavior::Rate { numerator: 1, denominator: 1 }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rate(self, numerator: u128, denominator: u128) -> Self {
        self.set_behavior(MockBehavior::Rate { numerator, denominator });
        self
    }

    pub fn no_route(self) -> Self {
        self.set_behavior(MockBehavior::NoRoute);
        self
    }

    pub fn failing(self, message: impl Into<String>) -> Self {
        self.set_behavior(MockBehavior::Fail(message.into()));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 호출 순서대로 소비되는 지연. 다 쓰면 기본 지연으로 돌아간다
    pub fn with_latencies(self, latencies: Vec<Duration>) -> Self {
        *lock(&self.latencies) = latencies.into();
        self
    }

    pub fn with_polling(mut self, interval: Duration) -> Self {
        self.polling = Some(interval);
        self
    }

    pub fn with_chains(mut self, chains: Vec<u64>) -> Self {
        self.chains = chains;
        self
    }

    pub fn exact_input_only(mut self) -> Self {
        self.exact_input_only = true;
        self
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn calls(&self) -> Vec<SwapIntent> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl QuoteSource for MockQuoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fill_type(&self) -> TradeFillType {
        self.fill_type
    }

    fn supported_chains(&self) -> Vec<u64> {
        self.chains.clone()
    }

    fn supports_trade_type(&self, trade_type: TradeType) -> bool {
        !self.exact_input_only || trade_type == TradeType::ExactInput
    }

    fn polling_interval(&self) -> Option<Duration> {
        self.polling
    }

    async fn fetch_quote(&self, intent: &SwapIntent) -> Result<Option<Trade>, AdapterError> {
        lock(&self.calls).push(intent.clone());
        let latency = lock(&self.latencies).pop_front().unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let behavior = lock(&self.behavior).clone();
        debug!("🎭 {} mock quote: {:?}", self.name, behavior);
        let (numerator, denominator) = match behavior {
            MockBehavior::Rate { numerator, denominator } => (U256::from(numerator), U256::from(denominator)),
            MockBehavior::NoRoute => return Ok(None),
            MockBehavior::Fail(message) => return Err(AdapterError::InvalidResponse(message)),
        };
        if numerator.is_zero() || denominator.is_zero() {
            return Ok(None);
        }

        let fixed = intent.amount.raw;
        let quoted = match intent.trade_type {
            TradeType::ExactInput => fixed.checked_mul(numerator).map(|v| v / denominator),
            TradeType::ExactOutput => fixed.checked_mul(denominator).map(|v| v / numerator),
        }
        .ok_or_else(|| AdapterError::InvalidResponse("mock rate overflow".to_string()))?;
        if quoted.is_zero() {
            return Ok(None);
        }

        let (input, output) = match intent.trade_type {
            TradeType::ExactInput => (
                intent.amount.clone(),
                CurrencyAmount::from_raw(intent.currency_out.clone(), quoted),
            ),
            TradeType::ExactOutput => (
                CurrencyAmount::from_raw(intent.currency_in.clone(), quoted),
                intent.amount.clone(),
            ),
        };
        Ok(Some(build_trade(self.fill_type, intent.trade_type, input, output)))
    }
}

/// 공급자 태그에 맞는 그럴듯한 페이로드를 가진 트레이드
pub fn build_trade(
    fill_type: TradeFillType,
    trade_type: TradeType,
    input: CurrencyAmount,
    output: CurrencyAmount,
) -> Trade {
    let partner_fee = Some(SwapFee { bps: PARTNER_FEE_BPS, recipient: PARTNER_FEE_RECEIVER });
    match fill_type {
        TradeFillType::Classic => Trade::Classic(ClassicTrade {
            trade_type,
            routes: vec![V3Route {
                token_in: input.currency.wrapped_address().unwrap_or_default(),
                token_out: output.currency.wrapped_address().unwrap_or_default(),
                fee: 3_000,
                amount_in: input.raw,
                amount_out: output.raw,
            }],
            input_amount: input,
            output_amount: output,
            router: UNISWAP_SWAP_ROUTER_02,
            gas_estimate: 130_000,
        }),
        TradeFillType::Kyberswap => Trade::Kyberswap(KyberswapTrade {
            trade_type,
            route_summary: json!({
                "tokenIn": input.currency.api_address(),
                "amountIn": input.raw.to_string(),
                "tokenOut": output.currency.api_address(),
                "amountOut": output.raw.to_string(),
                "gas": "150000",
            }),
            input_amount: input,
            output_amount: output,
            router_address: KYBERSWAP_ROUTER,
            gas: 150_000,
            gas_price: U256::ZERO,
            swap_fee: partner_fee,
        }),
        TradeFillType::Paraswap => Trade::Paraswap(ParaswapTrade {
            trade_type,
            price_route: json!({
                "srcToken": input.currency.api_address(),
                "srcAmount": input.raw.to_string(),
                "destToken": output.currency.api_address(),
                "destAmount": output.raw.to_string(),
                "side": if trade_type == TradeType::ExactInput { "SELL" } else { "BUY" },
                "contractAddress": format!("{:#x}", PARASWAP_AUGUSTUS_V6),
            }),
            input_amount: input,
            output_amount: output,
            contract_address: PARASWAP_AUGUSTUS_V6,
            gas_cost: 160_000,
            swap_fee: partner_fee,
        }),
    }
}

/// ETH → USDC (mainnet) 트레이드. 수량은 최소 단위
pub fn mock_trade(fill_type: TradeFillType, trade_type: TradeType, input: u128, output: u128) -> Trade {
    let usdc = Currency::token(
        1,
        alloy::primitives::address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        6,
        "USDC",
    );
    build_trade(
        fill_type,
        trade_type,
        CurrencyAmount::from_raw(Currency::native(1), U256::from(input)),
        CurrencyAmount::from_raw(usdc, U256::from(output)),
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
