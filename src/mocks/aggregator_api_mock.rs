use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::sol_types::{SolCall, SolValue};
use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::{
    kyberswap_chain_name, wrapped_native_address, AGGREGATOR_CHAINS, BPS_DENOMINATOR, CHAIN_MAINNET,
    KYBERSWAP_ROUTER, NATIVE_TOKEN_ADDRESS, PARASWAP_AUGUSTUS_V6,
};
use crate::dex::uniswap::IQuoterV2;

/// 모의 API 가 가격을 매기는 방식
///
/// 네이티브/래핑 네이티브는 18 decimals ETH, 그 밖의 토큰은 모두 6 decimals 의
/// 1 USD 스테이블로 본다.
pub struct MockApiState {
    eth_usdc_price: u64,
    kyberswap_spread_bps: u32,
    paraswap_spread_bps: u32,
    classic_spread_bps: u32,
    latency: Duration,
    available: AtomicBool,
    route_requests: AtomicUsize,
    price_requests: AtomicUsize,
    build_requests: AtomicUsize,
    rpc_requests: AtomicUsize,
}

impl MockApiState {
    pub fn new(eth_usdc_price: u64) -> Self {
        Self {
            eth_usdc_price: eth_usdc_price.max(1),
            kyberswap_spread_bps: 15,
            paraswap_spread_bps: 25,
            classic_spread_bps: 30,
            latency: Duration::ZERO,
            available: AtomicBool::new(true),
            route_requests: AtomicUsize::new(0),
            price_requests: AtomicUsize::new(0),
            build_requests: AtomicUsize::new(0),
            rpc_requests: AtomicUsize::new(0),
        }
    }

    pub fn with_spreads(mut self, kyberswap_bps: u32, paraswap_bps: u32) -> Self {
        self.kyberswap_spread_bps = kyberswap_bps;
        self.paraswap_spread_bps = paraswap_bps;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// `false` 이면 모든 견적 요청에 경로 없음으로 응답
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn route_requests(&self) -> usize {
        self.route_requests.load(Ordering::SeqCst)
    }

    pub fn price_requests(&self) -> usize {
        self.price_requests.load(Ordering::SeqCst)
    }

    pub fn build_requests(&self) -> usize {
        self.build_requests.load(Ordering::SeqCst)
    }

    pub fn rpc_requests(&self) -> usize {
        self.rpc_requests.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn convert(&self, amount: U256, from_eth: bool, to_eth: bool) -> U256 {
        let price = U256::from(self.eth_usdc_price);
        let scale = U256::from(10u64).pow(U256::from(12u64));
        match (from_eth, to_eth) {
            (true, false) => amount.saturating_mul(price) / scale,
            (false, true) => amount.saturating_mul(scale) / price,
            _ => amount,
        }
    }

    /// exact-input: 받을 수량
    fn quote_out(&self, chain_id: u64, token_in: &str, token_out: &str, amount_in: U256, spread_bps: u32) -> U256 {
        let gross = self.convert(amount_in, is_eth_like(chain_id, token_in), is_eth_like(chain_id, token_out));
        let keep = BPS_DENOMINATOR.saturating_sub(spread_bps as u64);
        gross.saturating_mul(U256::from(keep)) / U256::from(BPS_DENOMINATOR)
    }

    /// exact-output: 내야 할 수량
    fn quote_in(&self, chain_id: u64, token_in: &str, token_out: &str, amount_out: U256, spread_bps: u32) -> U256 {
        let gross = self.convert(amount_out, is_eth_like(chain_id, token_out), is_eth_like(chain_id, token_in));
        let pay = BPS_DENOMINATOR + spread_bps as u64;
        gross.saturating_mul(U256::from(pay)) / U256::from(BPS_DENOMINATOR)
    }
}

fn is_eth_like(chain_id: u64, token: &str) -> bool {
    let token = token.to_lowercase();
    if token == NATIVE_TOKEN_ADDRESS {
        return true;
    }
    wrapped_native_address(chain_id).is_some_and(|wrapped| format!("{:#x}", wrapped) == token)
}

fn chain_from_name(name: &str) -> Option<u64> {
    AGGREGATOR_CHAINS
        .iter()
        .copied()
        .find(|chain| kyberswap_chain_name(*chain) == Some(name))
}

fn parse_u256(value: Option<&String>) -> Option<U256> {
    value.and_then(|v| U256::from_str_radix(v, 10).ok())
}

fn fake_calldata(selector: [u8; 4], words: &[U256]) -> String {
    let mut data = selector.to_vec();
    for word in words {
        data.extend_from_slice(&word.to_be_bytes::<32>());
    }
    format!("0x{}", hex::encode(data))
}

/// KyberSwap / ParaSwap / eth_call 을 흉내내는 로컬 HTTP 서버
pub struct MockAggregatorApi {
    addr: SocketAddr,
    state: Arc<MockApiState>,
    handle: JoinHandle<()>,
}

impl MockAggregatorApi {
    pub async fn start(state: MockApiState) -> Result<Self> {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/:chain/api/v1/routes", get(kyberswap_routes))
            .route("/:chain/api/v1/route/build", post(kyberswap_build))
            .route("/prices", get(paraswap_prices))
            .route("/transactions/:network", post(paraswap_transactions))
            .route("/rpc", post(quoter_rpc))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let server = hyper::Server::from_tcp(listener)?.serve(app.into_make_service());

        let handle = tokio::spawn(async move {
            if let Err(e) = server.await {
                warn!("⚠️ Mock aggregator API stopped: {}", e);
            }
        });

        info!("🎭 Mock aggregator API listening on {}", addr);
        Ok(Self { addr, state, handle })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn rpc_url(&self) -> String {
        format!("http://{}/rpc", self.addr)
    }

    pub fn state(&self) -> Arc<MockApiState> {
        self.state.clone()
    }
}

impl Drop for MockAggregatorApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn kyberswap_routes(
    State(state): State<Arc<MockApiState>>,
    Path(chain): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.route_requests.fetch_add(1, Ordering::SeqCst);
    state.simulate_latency().await;

    let (Some(chain_id), Some(token_in), Some(token_out), Some(amount_in)) = (
        chain_from_name(&chain),
        params.get("tokenIn"),
        params.get("tokenOut"),
        parse_u256(params.get("amountIn")),
    ) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "code": 4000, "message": "bad request" })));
    };
    if !state.is_available() {
        return (StatusCode::OK, Json(json!({ "code": 4008, "message": "route not found" })));
    }

    let fee_bps: u32 = params.get("feeAmount").and_then(|f| f.parse().ok()).unwrap_or(0);
    let amount_out = state.quote_out(chain_id, token_in, token_out, amount_in, state.kyberswap_spread_bps + fee_bps);
    debug!("🎭 kyberswap {} {} -> {} {}", amount_in, token_in, amount_out, token_out);

    (
        StatusCode::OK,
        Json(json!({
            "code": 0,
            "message": "successfully",
            "data": {
                "routeSummary": {
                    "tokenIn": token_in,
                    "amountIn": amount_in.to_string(),
                    "tokenOut": token_out,
                    "amountOut": amount_out.to_string(),
                    "gas": "184000",
                    "gasPrice": "12000000000",
                    "extraFee": {
                        "feeAmount": fee_bps.to_string(),
                        "chargeFeeBy": params.get("chargeFeeBy").cloned().unwrap_or_default(),
                        "isInBps": true,
                        "feeReceiver": params.get("feeReceiver").cloned().unwrap_or_default(),
                    },
                    "route": [],
                },
                "routerAddress": format!("{:#x}", KYBERSWAP_ROUTER),
            }
        })),
    )
}

async fn kyberswap_build(
    State(state): State<Arc<MockApiState>>,
    Path(_chain): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.build_requests.fetch_add(1, Ordering::SeqCst);

    let summary = &body["routeSummary"];
    let (Some(amount_in), Some(amount_out)) = (summary["amountIn"].as_str(), summary["amountOut"].as_str()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "code": 4001, "message": "invalid route summary" })));
    };
    let amount_in = U256::from_str_radix(amount_in, 10).unwrap_or_default();
    let amount_out = U256::from_str_radix(amount_out, 10).unwrap_or_default();

    (
        StatusCode::OK,
        Json(json!({
            "code": 0,
            "message": "successfully",
            "data": {
                "amountIn": amount_in.to_string(),
                "amountOut": amount_out.to_string(),
                "gas": "201000",
                "data": fake_calldata([0xe2, 0x1f, 0xd0, 0xe9], &[amount_in, amount_out]),
                "routerAddress": format!("{:#x}", KYBERSWAP_ROUTER),
            }
        })),
    )
}

async fn paraswap_prices(
    State(state): State<Arc<MockApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.price_requests.fetch_add(1, Ordering::SeqCst);
    state.simulate_latency().await;

    let (Some(src), Some(dest), Some(amount)) =
        (params.get("srcToken"), params.get("destToken"), parse_u256(params.get("amount")))
    else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Validation failed" })));
    };
    if !state.is_available() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No routes found with enough liquidity" })));
    }

    let network: u64 = params.get("network").and_then(|n| n.parse().ok()).unwrap_or(CHAIN_MAINNET);
    let side = params.get("side").map(String::as_str).unwrap_or("SELL");
    let (src_amount, dest_amount) = if side == "BUY" {
        (state.quote_in(network, src, dest, amount, state.paraswap_spread_bps), amount)
    } else {
        (amount, state.quote_out(network, src, dest, amount, state.paraswap_spread_bps))
    };
    debug!("🎭 paraswap {} {} {} -> {} {}", side, src_amount, src, dest_amount, dest);

    (
        StatusCode::OK,
        Json(json!({
            "priceRoute": {
                "blockNumber": 19_000_000,
                "network": network,
                "srcToken": src,
                "srcDecimals": params.get("srcDecimals").and_then(|d| d.parse::<u8>().ok()),
                "srcAmount": src_amount.to_string(),
                "destToken": dest,
                "destDecimals": params.get("destDecimals").and_then(|d| d.parse::<u8>().ok()),
                "destAmount": dest_amount.to_string(),
                "gasCost": "154000",
                "side": side,
                "version": params.get("version").cloned().unwrap_or_default(),
                "contractAddress": format!("{:#x}", PARASWAP_AUGUSTUS_V6),
                "partner": params.get("partner").cloned().unwrap_or_default(),
            }
        })),
    )
}

async fn paraswap_transactions(
    State(state): State<Arc<MockApiState>>,
    Path(network): Path<u64>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.build_requests.fetch_add(1, Ordering::SeqCst);

    let route = &body["priceRoute"];
    let Some(src_amount) = route["srcAmount"].as_str().and_then(|a| U256::from_str_radix(a, 10).ok()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid price route" })));
    };
    let src_token = body["srcToken"].as_str().unwrap_or_default().to_lowercase();
    let slippage = body["slippage"].as_u64().unwrap_or(0);

    // BUY 는 슬리피지만큼 더 보내고 남은 금액을 환불받는다
    let max_in = if body.get("destAmount").is_some() {
        src_amount.saturating_mul(U256::from(BPS_DENOMINATOR + slippage)) / U256::from(BPS_DENOMINATOR)
    } else {
        src_amount
    };
    let value = if src_token == NATIVE_TOKEN_ADDRESS { max_in } else { U256::ZERO };

    (
        StatusCode::OK,
        Json(json!({
            "from": body["userAddress"],
            "to": format!("{:#x}", PARASWAP_AUGUSTUS_V6),
            "value": value.to_string(),
            "data": fake_calldata([0xe3, 0xea, 0xd5, 0x9e], &[max_in]),
            "gasPrice": "12000000000",
            "chainId": network,
        })),
    )
}

/// QuoterV2 `eth_call` 만 처리한다. 3000/500 티어에만 풀이 있다
async fn quoter_rpc(State(state): State<Arc<MockApiState>>, Json(body): Json<Value>) -> Json<Value> {
    state.rpc_requests.fetch_add(1, Ordering::SeqCst);
    state.simulate_latency().await;
    let id = body["id"].clone();

    let revert = |message: &str| Json(json!({ "jsonrpc": "2.0", "id": id, "error": { "code": 3, "message": message } }));
    if body["method"] != "eth_call" {
        return revert("method not supported");
    }
    let Some(data) = body["params"][0]["data"]
        .as_str()
        .and_then(|d| hex::decode(d.trim_start_matches("0x")).ok())
    else {
        return revert("invalid call data");
    };
    if !state.is_available() || data.len() < 4 {
        return revert("execution reverted");
    }

    let quote = if data[..4] == IQuoterV2::quoteExactInputSingleCall::SELECTOR {
        IQuoterV2::quoteExactInputSingleCall::abi_decode(&data).ok().map(|call| {
            let params = call.params;
            (params.fee.to::<u32>(), true, params.tokenIn, params.tokenOut, params.amountIn)
        })
    } else if data[..4] == IQuoterV2::quoteExactOutputSingleCall::SELECTOR {
        IQuoterV2::quoteExactOutputSingleCall::abi_decode(&data).ok().map(|call| {
            let params = call.params;
            (params.fee.to::<u32>(), false, params.tokenIn, params.tokenOut, params.amount)
        })
    } else {
        None
    };
    let Some((fee, exact_in, token_in, token_out, amount)) = quote else {
        return revert("execution reverted");
    };

    let spread = match fee {
        3_000 => state.classic_spread_bps,
        500 => state.classic_spread_bps + 10,
        _ => return revert("execution reverted"),
    };
    let (token_in, token_out) = (address_text(token_in), address_text(token_out));
    let quoted = if exact_in {
        state.quote_out(CHAIN_MAINNET, &token_in, &token_out, amount, spread)
    } else {
        state.quote_in(CHAIN_MAINNET, &token_in, &token_out, amount, spread)
    };

    let encoded = (quoted, U256::ZERO, U256::from(1u64), U256::from(120_000u64)).abi_encode_params();
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": format!("0x{}", hex::encode(encoded)) }))
}

fn address_text(address: Address) -> String {
    format!("{:#x}", address)
}
