use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    json_address, json_u256, json_u64, read_json_response, AdapterError, ParaswapTrade,
    QuoteSource, SwapFee, SwapIntent, SwapTransaction, Trade, TradeFillType,
};
use crate::config::ParaswapConfig;
use crate::types::{CurrencyAmount, SlippageTolerance, TradeType};

/// ParaSwap API (SELL = exact-input, BUY = exact-output)
pub struct ParaswapSource {
    client: Client,
    base_url: String,
    partner: String,
    fee: SwapFee,
    version: String,
    chains: Vec<u64>,
    polling: Duration,
}

fn side(trade_type: TradeType) -> &'static str {
    match trade_type {
        TradeType::ExactInput => "SELL",
        TradeType::ExactOutput => "BUY",
    }
}

impl ParaswapSource {
    pub fn new(client: Client, config: &ParaswapConfig, polling: Duration) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            partner: config.partner.clone(),
            fee: SwapFee { bps: config.fee_bps, recipient: config.fee_receiver },
            version: config.version.clone(),
            chains: config.chains.clone(),
            polling,
        }
    }

    /// `POST /transactions/{network}` 로 실행용 트랜잭션 생성
    pub async fn build_swap(
        &self,
        trade: &ParaswapTrade,
        slippage: &SlippageTolerance,
        sender: Address,
        recipient: Address,
        deadline: u64,
    ) -> Result<SwapTransaction, AdapterError> {
        let network = trade.input_amount.currency.chain_id;
        let url = format!("{}/transactions/{}", self.base_url, network);

        let mut body = json!({
            "srcToken": trade.input_amount.currency.api_address(),
            "srcDecimals": trade.input_amount.currency.decimals,
            "destToken": trade.output_amount.currency.api_address(),
            "destDecimals": trade.output_amount.currency.decimals,
            "priceRoute": trade.price_route,
            "userAddress": format!("{:#x}", sender),
            "slippage": slippage.bps,
            "deadline": deadline,
            "partner": self.partner,
            "partnerAddress": format!("{:#x}", self.fee.recipient),
            "partnerFeeBps": self.fee.bps,
            "isDirectFeeTransfer": true,
        });
        // 고정된 쪽 수량만 보낸다 (슬리피지와 함께 둘 다 보내면 API 가 거부)
        match trade.trade_type {
            TradeType::ExactInput => body["srcAmount"] = json!(trade.input_amount.raw.to_string()),
            TradeType::ExactOutput => body["destAmount"] = json!(trade.output_amount.raw.to_string()),
        }
        if recipient != sender {
            body["receiver"] = json!(format!("{:#x}", recipient));
        }

        debug!("🔨 Building ParaSwap transaction on {} ({})", network, side(trade.trade_type));

        let response = self.client.post(&url).json(&body).send().await?;
        let value = read_json_response(response).await?;
        parse_transaction_response(&value, trade)
    }
}

#[async_trait]
impl QuoteSource for ParaswapSource {
    fn name(&self) -> &str {
        "paraswap"
    }

    fn fill_type(&self) -> TradeFillType {
        TradeFillType::Paraswap
    }

    fn supported_chains(&self) -> Vec<u64> {
        self.chains.clone()
    }

    fn polling_interval(&self) -> Option<Duration> {
        Some(self.polling)
    }

    async fn fetch_quote(&self, intent: &SwapIntent) -> Result<Option<Trade>, AdapterError> {
        let url = format!("{}/prices", self.base_url);
        let mut query = vec![
            ("srcToken", intent.currency_in.api_address()),
            ("srcDecimals", intent.currency_in.decimals.to_string()),
            ("destToken", intent.currency_out.api_address()),
            ("destDecimals", intent.currency_out.decimals.to_string()),
            ("amount", intent.amount.raw.to_string()),
            ("side", side(intent.trade_type).to_string()),
            ("network", intent.chain_id.to_string()),
            ("version", self.version.clone()),
            ("partner", self.partner.clone()),
        ];
        if let Some(account) = intent.account {
            query.push(("userAddress", format!("{:#x}", account)));
        }

        debug!(
            "🔄 Requesting ParaSwap rate: {} -> {} ({} {})",
            intent.currency_in, intent.currency_out, side(intent.trade_type), intent.amount
        );

        let response = self.client.get(&url).query(&query).send().await?;
        let value = read_json_response(response).await?;
        let trade = parse_prices_response(&value, intent, self.fee)?;

        if let Some(trade) = &trade {
            info!("📈 ParaSwap: {} -> {}", trade.input_amount(), trade.output_amount());
        }
        Ok(trade)
    }
}

/// `GET /prices` 응답 해석
pub fn parse_prices_response(
    value: &Value,
    intent: &SwapIntent,
    fee: SwapFee,
) -> Result<Option<Trade>, AdapterError> {
    let Some(price_route) = value.get("priceRoute").filter(|p| p.is_object()) else {
        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            debug!("ParaSwap returned no route: {}", error);
        }
        return Ok(None);
    };

    let src_amount = json_u256(&price_route["srcAmount"])
        .ok_or_else(|| AdapterError::InvalidResponse("missing priceRoute.srcAmount".to_string()))?;
    let dest_amount = json_u256(&price_route["destAmount"])
        .ok_or_else(|| AdapterError::InvalidResponse("missing priceRoute.destAmount".to_string()))?;
    if src_amount.is_zero() || dest_amount.is_zero() {
        return Ok(None);
    }
    let contract_address = json_address(&price_route["contractAddress"])
        .ok_or_else(|| AdapterError::InvalidResponse("missing priceRoute.contractAddress".to_string()))?;

    // 고정된 쪽은 요청한 수량을 그대로 쓴다
    let (input_amount, output_amount) = match intent.trade_type {
        TradeType::ExactInput => (
            intent.amount.clone(),
            CurrencyAmount::from_raw(intent.currency_out.clone(), dest_amount),
        ),
        TradeType::ExactOutput => (
            CurrencyAmount::from_raw(intent.currency_in.clone(), src_amount),
            intent.amount.clone(),
        ),
    };

    Ok(Some(Trade::Paraswap(ParaswapTrade {
        trade_type: intent.trade_type,
        input_amount,
        output_amount,
        price_route: price_route.clone(),
        contract_address,
        gas_cost: json_u64(&price_route["gasCost"]).unwrap_or(0),
        swap_fee: Some(fee),
    })))
}

/// `POST /transactions` 응답 해석
pub fn parse_transaction_response(value: &Value, trade: &ParaswapTrade) -> Result<SwapTransaction, AdapterError> {
    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        return Err(AdapterError::InvalidResponse(error.to_string()));
    }
    let to = json_address(&value["to"])
        .ok_or_else(|| AdapterError::InvalidResponse("missing transaction.to".to_string()))?;
    let calldata = value["data"]
        .as_str()
        .ok_or_else(|| AdapterError::InvalidResponse("missing transaction.data".to_string()))?;
    let calldata = hex::decode(calldata.trim_start_matches("0x"))
        .map_err(|e| AdapterError::InvalidResponse(format!("invalid calldata hex: {}", e)))?;

    Ok(SwapTransaction {
        to,
        data: Bytes::from(calldata),
        value: json_u256(&value["value"]).unwrap_or(U256::ZERO),
        gas_limit: json_u64(&value["gas"]).or(Some(trade.gas_cost)).filter(|gas| *gas > 0),
    })
}
