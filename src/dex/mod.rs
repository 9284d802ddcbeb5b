pub mod aggregator;
pub mod debounce;
pub mod execution;
pub mod kyberswap;
pub mod paraswap;
pub mod selector;
pub mod tracker;
pub mod trade;
pub mod uniswap;
pub mod worker;

pub use aggregator::*;
pub use debounce::*;
pub use execution::*;
pub use kyberswap::*;
pub use paraswap::*;
pub use selector::*;
pub use tracker::*;
pub use trade::*;
pub use uniswap::*;
pub use worker::*;

use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Currency, CurrencyAmount, TradeType};

/// 견적 공급자 에러
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(u64),

    #[error("Unsupported trade type: {0}")]
    UnsupportedTradeType(TradeType),
}

/// 요청을 네트워크 호출 없이 건너뛰는 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("amount is missing")]
    MissingAmount,
    #[error("currency is missing")]
    MissingCurrency,
    #[error("currencies are on different chains")]
    ChainMismatch,
    #[error("input and output are the same asset")]
    IdenticalCurrencies,
    #[error("chain {0} is not supported")]
    UnsupportedChain(u64),
    #[error("{0} is not supported")]
    UnsupportedTradeType(TradeType),
}

/// 디바운스를 통과한 견적 요청
///
/// `amount` 는 고정되는 쪽 수량이고 `other_currency` 는 반대편 통화이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub chain_id: u64,
    pub trade_type: TradeType,
    pub amount: Option<CurrencyAmount>,
    pub other_currency: Option<Currency>,
    pub account: Option<Address>,
}

impl QuoteRequest {
    /// 공급자와 무관한 구조적 검증
    pub fn intent(&self) -> Result<SwapIntent, SkipReason> {
        let amount = self.amount.clone().ok_or(SkipReason::MissingAmount)?;
        let other = self.other_currency.clone().ok_or(SkipReason::MissingCurrency)?;
        if amount.is_zero() {
            return Err(SkipReason::MissingAmount);
        }
        if amount.currency.chain_id != self.chain_id || other.chain_id != self.chain_id {
            return Err(SkipReason::ChainMismatch);
        }
        if amount.currency.is_same_asset(&other) {
            return Err(SkipReason::IdenticalCurrencies);
        }

        let (currency_in, currency_out) = match self.trade_type {
            TradeType::ExactInput => (amount.currency.clone(), other),
            TradeType::ExactOutput => (other, amount.currency.clone()),
        };

        Ok(SwapIntent {
            chain_id: self.chain_id,
            trade_type: self.trade_type,
            amount,
            currency_in,
            currency_out,
            account: self.account,
        })
    }
}

/// 검증을 통과해 공급자에게 전달되는 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapIntent {
    pub chain_id: u64,
    pub trade_type: TradeType,
    pub amount: CurrencyAmount,
    pub currency_in: Currency,
    pub currency_out: Currency,
    pub account: Option<Address>,
}

/// 견적 공급자 (클래식 라우터, 집계기 A/B)
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;

    fn fill_type(&self) -> TradeFillType;

    /// 허용된 체인 목록
    fn supported_chains(&self) -> Vec<u64>;

    fn supports_trade_type(&self, _trade_type: TradeType) -> bool {
        true
    }

    /// `None` 이면 입력이 바뀔 때만 다시 조회한다
    fn polling_interval(&self) -> Option<Duration> {
        None
    }

    /// 공급자별 건너뛰기 규칙을 포함한 검증
    fn check_request(&self, request: &QuoteRequest) -> Result<SwapIntent, SkipReason> {
        let intent = request.intent()?;
        if !self.supported_chains().contains(&intent.chain_id) {
            return Err(SkipReason::UnsupportedChain(intent.chain_id));
        }
        if !self.supports_trade_type(intent.trade_type) {
            return Err(SkipReason::UnsupportedTradeType(intent.trade_type));
        }
        Ok(intent)
    }

    /// `Ok(None)` 은 경로 없음
    async fn fetch_quote(&self, intent: &SwapIntent) -> Result<Option<Trade>, AdapterError>;
}

/// HTTP 응답 상태를 확인하고 JSON 본문을 돌려준다
pub(crate) async fn read_json_response(
    response: reqwest::Response,
) -> Result<serde_json::Value, AdapterError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AdapterError::HttpStatus { status: status.as_u16(), body });
    }
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| AdapterError::InvalidResponse(e.to_string()))
}

/// JSON 의 10진 문자열 또는 숫자를 U256 으로
pub(crate) fn json_u256(value: &serde_json::Value) -> Option<alloy::primitives::U256> {
    match value {
        serde_json::Value::String(s) => alloy::primitives::U256::from_str_radix(s.trim(), 10).ok(),
        serde_json::Value::Number(n) => n.as_u64().map(alloy::primitives::U256::from),
        _ => None,
    }
}

pub(crate) fn json_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

pub(crate) fn json_address(value: &serde_json::Value) -> Option<Address> {
    value.as_str().and_then(|s| s.parse().ok())
}
