use std::fmt;

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::types::{CurrencyAmount, SlippageTolerance, TradeType};

/// 견적을 만든 공급자 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeFillType {
    Classic,
    Kyberswap,
    Paraswap,
}

impl fmt::Display for TradeFillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeFillType::Classic => write!(f, "classic"),
            TradeFillType::Kyberswap => write!(f, "kyberswap"),
            TradeFillType::Paraswap => write!(f, "paraswap"),
        }
    }
}

/// 파트너 수수료
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapFee {
    pub bps: u32,
    pub recipient: Address,
}

/// Single-pool hop priced by the V3 quoter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V3Route {
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub amount_in: U256,
    pub amount_out: U256,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassicTrade {
    pub trade_type: TradeType,
    pub input_amount: CurrencyAmount,
    pub output_amount: CurrencyAmount,
    pub routes: Vec<V3Route>,
    pub router: Address,
    pub gas_estimate: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KyberswapTrade {
    pub trade_type: TradeType,
    pub input_amount: CurrencyAmount,
    pub output_amount: CurrencyAmount,
    /// `routeSummary` 원본. 빌드 API 에 그대로 되돌려 보낸다
    pub route_summary: serde_json::Value,
    pub router_address: Address,
    pub gas: u64,
    pub gas_price: U256,
    pub swap_fee: Option<SwapFee>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParaswapTrade {
    pub trade_type: TradeType,
    pub input_amount: CurrencyAmount,
    pub output_amount: CurrencyAmount,
    /// `priceRoute` 원본. 트랜잭션 빌드 시 그대로 전달
    pub price_route: serde_json::Value,
    pub contract_address: Address,
    pub gas_cost: u64,
    pub swap_fee: Option<SwapFee>,
}

/// 공급자별 실행 가능한 스왑 제안
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trade {
    Classic(ClassicTrade),
    Kyberswap(KyberswapTrade),
    Paraswap(ParaswapTrade),
}

impl Trade {
    pub fn trade_type(&self) -> TradeType {
        match self {
            Trade::Classic(t) => t.trade_type,
            Trade::Kyberswap(t) => t.trade_type,
            Trade::Paraswap(t) => t.trade_type,
        }
    }

    pub fn input_amount(&self) -> &CurrencyAmount {
        match self {
            Trade::Classic(t) => &t.input_amount,
            Trade::Kyberswap(t) => &t.input_amount,
            Trade::Paraswap(t) => &t.input_amount,
        }
    }

    pub fn output_amount(&self) -> &CurrencyAmount {
        match self {
            Trade::Classic(t) => &t.output_amount,
            Trade::Kyberswap(t) => &t.output_amount,
            Trade::Paraswap(t) => &t.output_amount,
        }
    }

    pub fn fill_type(&self) -> TradeFillType {
        match self {
            Trade::Classic(_) => TradeFillType::Classic,
            Trade::Kyberswap(_) => TradeFillType::Kyberswap,
            Trade::Paraswap(_) => TradeFillType::Paraswap,
        }
    }

    pub fn swap_fee(&self) -> Option<SwapFee> {
        match self {
            Trade::Classic(_) => None,
            Trade::Kyberswap(t) => t.swap_fee,
            Trade::Paraswap(t) => t.swap_fee,
        }
    }

    pub fn gas_estimate(&self) -> u64 {
        match self {
            Trade::Classic(t) => t.gas_estimate,
            Trade::Kyberswap(t) => t.gas,
            Trade::Paraswap(t) => t.gas_cost,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.input_amount().currency.chain_id
    }

    /// 슬리피지 적용 최소 수령량. exact-output 이면 출력량 그대로
    pub fn minimum_amount_out(&self, slippage: &SlippageTolerance) -> CurrencyAmount {
        let output = self.output_amount();
        match self.trade_type() {
            TradeType::ExactInput => CurrencyAmount::from_raw(
                output.currency.clone(),
                slippage.minimum_amount_out(output.raw),
            ),
            TradeType::ExactOutput => output.clone(),
        }
    }

    /// 슬리피지 적용 최대 지불량. exact-input 이면 입력량 그대로
    pub fn maximum_amount_in(&self, slippage: &SlippageTolerance) -> CurrencyAmount {
        let input = self.input_amount();
        match self.trade_type() {
            TradeType::ExactInput => input.clone(),
            TradeType::ExactOutput => CurrencyAmount::from_raw(
                input.currency.clone(),
                slippage.maximum_amount_in(input.raw),
            ),
        }
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {} ({})",
            self.fill_type(),
            self.input_amount(),
            self.output_amount(),
            self.trade_type()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeState {
    Invalid,
    Loading,
    NoRouteFound,
    Stale,
    Valid,
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TradeState::Invalid => "invalid",
            TradeState::Loading => "loading",
            TradeState::NoRouteFound => "no route found",
            TradeState::Stale => "stale",
            TradeState::Valid => "valid",
        };
        write!(f, "{}", label)
    }
}

/// 공급자 하나의 현재 상태 스냅샷. 평가할 때마다 새로 만들어진다
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSource {
    pub state: TradeState,
    pub trade: Option<Trade>,
}

impl TradeSource {
    pub fn invalid() -> Self {
        Self { state: TradeState::Invalid, trade: None }
    }

    pub fn loading() -> Self {
        Self { state: TradeState::Loading, trade: None }
    }

    pub fn no_route() -> Self {
        Self { state: TradeState::NoRouteFound, trade: None }
    }

    pub fn stale() -> Self {
        Self { state: TradeState::Stale, trade: None }
    }

    pub fn valid(trade: Trade) -> Self {
        Self { state: TradeState::Valid, trade: Some(trade) }
    }
}
