use std::fmt;
use std::hash::{Hash, Hasher};

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{
    native_symbol, wrapped_native_address, BPS_DENOMINATOR, DEFAULT_SLIPPAGE_BPS,
    NATIVE_TOKEN_ADDRESS,
};

/// 체인 위의 대체 가능한 자산
///
/// `address == None` 이면 체인의 네이티브 토큰이다. 동등성은 체인과 주소로만 판단하며
/// decimals / symbol 은 비교에 참여하지 않는다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Currency {
    pub chain_id: u64,
    pub address: Option<Address>,
    pub decimals: u8,
    pub symbol: String,
}

impl Currency {
    pub fn native(chain_id: u64) -> Self {
        Self {
            chain_id,
            address: None,
            decimals: 18,
            symbol: native_symbol(chain_id).to_string(),
        }
    }

    pub fn token(chain_id: u64, address: Address, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            chain_id,
            address: Some(address),
            decimals,
            symbol: symbol.into(),
        }
    }

    pub fn is_native(&self) -> bool {
        self.address.is_none()
    }

    /// 온체인 라우터가 다루는 ERC20 주소 (네이티브는 래핑 토큰으로 치환)
    pub fn wrapped_address(&self) -> Option<Address> {
        match self.address {
            Some(address) => Some(address),
            None => wrapped_native_address(self.chain_id),
        }
    }

    /// 네이티브 토큰이면 체인의 래핑 토큰을, 아니면 자기 자신을 돌려준다
    pub fn wrapped(&self) -> Option<Currency> {
        if !self.is_native() {
            return Some(self.clone());
        }
        let address = wrapped_native_address(self.chain_id)?;
        Some(Currency::token(
            self.chain_id,
            address,
            self.decimals,
            format!("W{}", self.symbol),
        ))
    }

    /// 집계기 API 용 주소 표기 (소문자 hex, 네이티브는 0xeeee... 센티널)
    pub fn api_address(&self) -> String {
        match self.address {
            Some(address) => format!("{:#x}", address),
            None => NATIVE_TOKEN_ADDRESS.to_string(),
        }
    }

    /// Same asset once native tokens are resolved to their wrapped counterpart.
    pub fn is_same_asset(&self, other: &Currency) -> bool {
        if self == other {
            return true;
        }
        if self.chain_id != other.chain_id {
            return false;
        }
        match (self.wrapped_address(), other.wrapped_address()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address == other.address
    }
}

impl Eq for Currency {}

impl Hash for Currency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain_id.hash(state);
        self.address.hash(state);
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("too many decimals: {given} > {allowed}")]
    TooManyDecimals { given: usize, allowed: u8 },
    #[error("amount overflows 256 bits")]
    Overflow,
}

/// 통화 + 최소 단위 정수 수량
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyAmount {
    pub currency: Currency,
    pub raw: U256,
}

impl CurrencyAmount {
    pub fn from_raw(currency: Currency, raw: U256) -> Self {
        Self { currency, raw }
    }

    /// 사용자가 입력한 10진 문자열("1.5")을 최소 단위로 변환
    pub fn parse(text: &str, currency: &Currency) -> Result<Self, AmountParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole, fraction) = match text.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (text, ""),
        };
        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
            return Err(AmountParseError::Invalid(text.to_string()));
        }
        if fraction.len() > currency.decimals as usize {
            return Err(AmountParseError::TooManyDecimals {
                given: fraction.len(),
                allowed: currency.decimals,
            });
        }

        let padding = "0".repeat(currency.decimals as usize - fraction.len());
        let digits = format!("{}{}{}", whole, fraction, padding);
        let digits = digits.trim_start_matches('0');
        let raw = if digits.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(digits, 10).map_err(|_| AmountParseError::Overflow)?
        };

        Ok(Self::from_raw(currency.clone(), raw))
    }

    /// Like [`CurrencyAmount::parse`] but maps unparsable and zero input to `None`.
    pub fn try_parse(text: &str, currency: &Currency) -> Option<Self> {
        Self::parse(text, currency).ok().filter(|amount| !amount.is_zero())
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// 최소 단위 수량을 10진 문자열로 (불필요한 0 제거)
    pub fn to_exact(&self) -> String {
        let digits = self.raw.to_string();
        let decimals = self.currency.decimals as usize;
        if decimals == 0 {
            return digits;
        }

        let padded = format!("{:0>width$}", digits, width = decimals + 1);
        let (whole, fraction) = padded.split_at(padded.len() - decimals);
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, fraction)
        }
    }

    /// 표시용 Decimal (28자리를 넘으면 None)
    pub fn to_decimal(&self) -> Option<Decimal> {
        self.to_exact().parse().ok()
    }
}

impl fmt::Display for CurrencyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_exact(), self.currency.symbol)
    }
}

/// 고정되는 쪽이 입력인지 출력인지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeType {
    ExactInput,
    ExactOutput,
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeType::ExactInput => write!(f, "EXACT_INPUT"),
            TradeType::ExactOutput => write!(f, "EXACT_OUTPUT"),
        }
    }
}

/// 슬리피지 허용치 (basis points, 50 = 0.5%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlippageTolerance {
    pub bps: u32,
}

impl SlippageTolerance {
    pub fn from_bps(bps: u32) -> Self {
        Self { bps }
    }

    /// floor(out * 10000 / (10000 + bps))
    pub fn minimum_amount_out(&self, amount_out: U256) -> U256 {
        if self.bps == 0 {
            return amount_out;
        }
        let denominator = U256::from(BPS_DENOMINATOR + self.bps as u64);
        let scale = U256::from(BPS_DENOMINATOR);
        match amount_out.checked_mul(scale) {
            Some(scaled) => scaled / denominator,
            None => (amount_out / denominator).saturating_mul(scale),
        }
    }

    /// floor(in * (10000 + bps) / 10000)
    pub fn maximum_amount_in(&self, amount_in: U256) -> U256 {
        if self.bps == 0 {
            return amount_in;
        }
        let numerator = U256::from(BPS_DENOMINATOR + self.bps as u64);
        let scale = U256::from(BPS_DENOMINATOR);
        match amount_in.checked_mul(numerator) {
            Some(scaled) => scaled / scale,
            None => (amount_in / scale).saturating_mul(numerator),
        }
    }

    pub fn as_percent(&self) -> Decimal {
        Decimal::new(self.bps as i64, 2)
    }
}

impl Default for SlippageTolerance {
    fn default() -> Self {
        Self::from_bps(DEFAULT_SLIPPAGE_BPS)
    }
}

/// 어댑터와 실행기에 명시적으로 주입되는 지갑/설정 컨텍스트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapContext {
    pub chain_id: u64,
    pub account: Option<Address>,
    pub slippage: SlippageTolerance,
}

impl SwapContext {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            account: None,
            slippage: SlippageTolerance::default(),
        }
    }

    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    pub fn with_slippage(mut self, slippage: SlippageTolerance) -> Self {
        self.slippage = slippage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn usdc() -> Currency {
        Currency::token(1, address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), 6, "USDC")
    }

    #[test]
    fn test_parse_decimal_amounts() {
        let eth = Currency::native(1);
        let amount = CurrencyAmount::parse("1.5", &eth).unwrap();
        assert_eq!(amount.raw, U256::from(1_500_000_000_000_000_000u128));

        let amount = CurrencyAmount::parse(".25", &usdc()).unwrap();
        assert_eq!(amount.raw, U256::from(250_000u64));

        let amount = CurrencyAmount::parse("3000", &usdc()).unwrap();
        assert_eq!(amount.raw, U256::from(3_000_000_000u64));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let usdc = usdc();
        assert_eq!(CurrencyAmount::parse("  ", &usdc), Err(AmountParseError::Empty));
        assert!(matches!(CurrencyAmount::parse("1.2.3", &usdc), Err(AmountParseError::Invalid(_))));
        assert!(matches!(CurrencyAmount::parse("abc", &usdc), Err(AmountParseError::Invalid(_))));
        assert!(matches!(CurrencyAmount::parse(".", &usdc), Err(AmountParseError::Invalid(_))));
        assert_eq!(
            CurrencyAmount::parse("0.0000001", &usdc),
            Err(AmountParseError::TooManyDecimals { given: 7, allowed: 6 })
        );
    }

    #[test]
    fn test_try_parse_maps_zero_to_none() {
        assert!(CurrencyAmount::try_parse("0", &usdc()).is_none());
        assert!(CurrencyAmount::try_parse("0.000", &usdc()).is_none());
        assert!(CurrencyAmount::try_parse("0.01", &usdc()).is_some());
    }

    #[test]
    fn test_to_exact() {
        let usdc = usdc();
        assert_eq!(CurrencyAmount::from_raw(usdc.clone(), U256::from(1_500_000u64)).to_exact(), "1.5");
        assert_eq!(CurrencyAmount::from_raw(usdc.clone(), U256::from(42u64)).to_exact(), "0.000042");
        assert_eq!(CurrencyAmount::from_raw(usdc, U256::from(7_000_000u64)).to_exact(), "7");
        assert_eq!(
            CurrencyAmount::parse("0.334", &Currency::native(1)).unwrap().to_decimal(),
            Some(Decimal::new(334, 3))
        );
    }

    #[test]
    fn test_currency_equality_ignores_metadata() {
        let a = usdc();
        let mut b = usdc();
        b.symbol = "USD Coin".to_string();
        b.decimals = 18;
        assert_eq!(a, b);
        assert_ne!(a, Currency::native(1));
    }

    #[test]
    fn test_native_and_wrapped_are_same_asset() {
        let eth = Currency::native(1);
        let weth = eth.wrapped().unwrap();
        assert_eq!(weth.symbol, "WETH");
        assert_ne!(eth, weth);
        assert!(eth.is_same_asset(&weth));
        assert!(!eth.is_same_asset(&usdc()));
        assert!(!eth.is_same_asset(&Currency::native(137)));
    }

    #[test]
    fn test_api_address_is_lowercase() {
        assert_eq!(Currency::native(1).api_address(), NATIVE_TOKEN_ADDRESS);
        assert_eq!(usdc().api_address(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    }

    #[test]
    fn test_slippage_bounds() {
        let slippage = SlippageTolerance::from_bps(50);
        assert_eq!(slippage.minimum_amount_out(U256::from(10_050u64)), U256::from(10_000u64));
        assert_eq!(slippage.maximum_amount_in(U256::from(10_000u64)), U256::from(10_050u64));
        assert_eq!(slippage.as_percent(), Decimal::new(5, 1));

        let zero = SlippageTolerance::from_bps(0);
        assert_eq!(zero.minimum_amount_out(U256::from(123u64)), U256::from(123u64));
        assert_eq!(zero.maximum_amount_in(U256::MAX), U256::MAX);
    }

    #[test]
    fn test_slippage_bounds_near_u256_max() {
        let slippage = SlippageTolerance::from_bps(50);
        assert_eq!(slippage.maximum_amount_in(U256::MAX), U256::MAX);

        let huge = U256::MAX / U256::from(2u64);
        assert_eq!(slippage.maximum_amount_in(huge), U256::MAX);

        let min_out = slippage.minimum_amount_out(U256::MAX);
        assert!(min_out < U256::MAX);
        assert_eq!(min_out, U256::MAX / U256::from(10_050u64) * U256::from(10_000u64));
    }
}
