use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    json_address, json_u256, json_u64, read_json_response, AdapterError, KyberswapTrade,
    QuoteSource, SwapFee, SwapIntent, SwapTransaction, Trade, TradeFillType,
};
use crate::config::KyberswapConfig;
use crate::constants::kyberswap_chain_name;
use crate::types::{CurrencyAmount, SlippageTolerance, TradeType};

/// KyberSwap Aggregator API (exact-input 전용)
pub struct KyberswapSource {
    client: Client,
    base_url: String,
    client_id: String,
    fee: SwapFee,
    chains: Vec<u64>,
    polling: Duration,
}

impl KyberswapSource {
    pub fn new(client: Client, config: &KyberswapConfig, polling: Duration) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            fee: SwapFee { bps: config.fee_bps, recipient: config.fee_receiver },
            chains: config.chains.clone(),
            polling,
        }
    }

    fn chain_path(&self, chain_id: u64) -> Result<&'static str, AdapterError> {
        kyberswap_chain_name(chain_id).ok_or(AdapterError::UnsupportedChain(chain_id))
    }

    /// `POST /{chain}/api/v1/route/build` 로 실행용 calldata 생성
    pub async fn build_swap(
        &self,
        trade: &KyberswapTrade,
        slippage: &SlippageTolerance,
        sender: Address,
        recipient: Address,
        deadline: u64,
    ) -> Result<SwapTransaction, AdapterError> {
        let chain = self.chain_path(trade.input_amount.currency.chain_id)?;
        let url = format!("{}/{}/api/v1/route/build", self.base_url, chain);
        let body = json!({
            "routeSummary": trade.route_summary,
            "slippageTolerance": slippage.bps,
            "sender": format!("{:#x}", sender),
            "recipient": format!("{:#x}", recipient),
            "deadline": deadline,
            "source": self.client_id,
        });

        debug!("🔨 Building KyberSwap route on {} (slippage {} bps)", chain, slippage.bps);

        let response = self
            .client
            .post(&url)
            .header("x-client-id", &self.client_id)
            .json(&body)
            .send()
            .await?;
        let value = read_json_response(response).await?;
        parse_build_response(&value, trade)
    }
}

#[async_trait]
impl QuoteSource for KyberswapSource {
    fn name(&self) -> &str {
        "kyberswap"
    }

    fn fill_type(&self) -> TradeFillType {
        TradeFillType::Kyberswap
    }

    fn supported_chains(&self) -> Vec<u64> {
        self.chains.clone()
    }

    fn supports_trade_type(&self, trade_type: TradeType) -> bool {
        trade_type == TradeType::ExactInput
    }

    fn polling_interval(&self) -> Option<Duration> {
        Some(self.polling)
    }

    async fn fetch_quote(&self, intent: &SwapIntent) -> Result<Option<Trade>, AdapterError> {
        if intent.trade_type != TradeType::ExactInput {
            return Err(AdapterError::UnsupportedTradeType(intent.trade_type));
        }
        let chain = self.chain_path(intent.chain_id)?;
        let url = format!("{}/{}/api/v1/routes", self.base_url, chain);

        let query = [
            ("tokenIn", intent.currency_in.api_address()),
            ("tokenOut", intent.currency_out.api_address()),
            ("amountIn", intent.amount.raw.to_string()),
            ("gasInclude", "true".to_string()),
            ("source", self.client_id.clone()),
            ("feeAmount", self.fee.bps.to_string()),
            ("isInBps", "true".to_string()),
            ("chargeFeeBy", "currency_out".to_string()),
            ("feeReceiver", format!("{:#x}", self.fee.recipient)),
        ];

        debug!(
            "🔄 Requesting KyberSwap route: {} -> {} ({})",
            intent.currency_in, intent.currency_out, intent.amount
        );

        let response = self
            .client
            .get(&url)
            .header("x-client-id", &self.client_id)
            .query(&query)
            .send()
            .await?;
        let value = read_json_response(response).await?;
        let trade = parse_routes_response(&value, intent, self.fee)?;

        if let Some(trade) = &trade {
            info!("📈 KyberSwap: {} -> {}", trade.input_amount(), trade.output_amount());
        }
        Ok(trade)
    }
}

/// `GET /routes` 응답 해석. `data.routeSummary` 가 없으면 경로 없음
pub fn parse_routes_response(
    value: &Value,
    intent: &SwapIntent,
    fee: SwapFee,
) -> Result<Option<Trade>, AdapterError> {
    let Some(data) = value.get("data").filter(|d| d.is_object()) else {
        return Ok(None);
    };
    let Some(route_summary) = data.get("routeSummary").filter(|r| r.is_object()) else {
        return Ok(None);
    };

    let amount_out = json_u256(&route_summary["amountOut"])
        .ok_or_else(|| AdapterError::InvalidResponse("missing routeSummary.amountOut".to_string()))?;
    if amount_out.is_zero() {
        return Ok(None);
    }
    let router_address = json_address(&data["routerAddress"])
        .ok_or_else(|| AdapterError::InvalidResponse("missing data.routerAddress".to_string()))?;

    Ok(Some(Trade::Kyberswap(KyberswapTrade {
        trade_type: TradeType::ExactInput,
        input_amount: intent.amount.clone(),
        output_amount: CurrencyAmount::from_raw(intent.currency_out.clone(), amount_out),
        route_summary: route_summary.clone(),
        router_address,
        gas: json_u64(&route_summary["gas"]).unwrap_or(0),
        gas_price: json_u256(&route_summary["gasPrice"]).unwrap_or(U256::ZERO),
        swap_fee: Some(fee),
    })))
}

/// `POST /route/build` 응답 해석
pub fn parse_build_response(value: &Value, trade: &KyberswapTrade) -> Result<SwapTransaction, AdapterError> {
    let data = value
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| AdapterError::InvalidResponse("missing build data".to_string()))?;

    let calldata = data["data"]
        .as_str()
        .ok_or_else(|| AdapterError::InvalidResponse("missing data.data".to_string()))?;
    let calldata = hex::decode(calldata.trim_start_matches("0x"))
        .map_err(|e| AdapterError::InvalidResponse(format!("invalid calldata hex: {}", e)))?;
    let to = json_address(&data["routerAddress"])
        .ok_or_else(|| AdapterError::InvalidResponse("missing data.routerAddress".to_string()))?;

    let value = if trade.input_amount.currency.is_native() {
        json_u256(&data["amountIn"]).unwrap_or(trade.input_amount.raw)
    } else {
        U256::ZERO
    };

    Ok(SwapTransaction {
        to,
        data: Bytes::from(calldata),
        value,
        gas_limit: json_u64(&data["gas"]).or(Some(trade.gas)).filter(|gas| *gas > 0),
    })
}
