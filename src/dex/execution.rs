use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{build_classic_swap, AdapterError, KyberswapSource, ParaswapSource, Trade, TradeFillType};
use crate::constants::DEFAULT_DEADLINE_SECONDS;
use crate::types::{Currency, SlippageTolerance, TradeType};

/// 지갑에 넘길 서명 전 트랜잭션
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTransaction {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<u64>,
}

/// 지갑이 실제로 브로드캐스트한 트랜잭션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub hash: B256,
    pub data: Bytes,
}

/// EIP-1193 user rejection
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("wallet rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

/// 서명/브로드캐스트를 담당하는 외부 지갑
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn chain_id(&self) -> u64;

    fn account(&self) -> Address;

    async fn send_transaction(&self, tx: SwapTransaction) -> Result<SubmittedTransaction, WalletError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("User rejected the transaction")]
    Rejected,

    #[error("Transaction was modified before submission")]
    Modified,

    #[error("Failed to build swap: {0}")]
    Build(#[from] AdapterError),

    #[error("Swap failed: {0}")]
    Failed(String),

    #[error("Wallet is on chain {wallet}, trade is on chain {trade}")]
    UnsupportedChain { wallet: u64, trade: u64 },
}

impl From<WalletError> for ExecutionError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rpc { code, .. } if code == USER_REJECTED_CODE => ExecutionError::Rejected,
            other => ExecutionError::Failed(other.to_string()),
        }
    }
}

/// 거래 내역에 남기는 스왑 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: Uuid,
    pub tx_hash: B256,
    pub fill_type: TradeFillType,
    pub trade_type: TradeType,
    pub input_currency: Currency,
    pub output_currency: Currency,
    pub input_raw: U256,
    pub output_raw: U256,
    pub minimum_amount_out: U256,
    pub maximum_amount_in: U256,
    pub deadline: DateTime<Utc>,
}

/// 선택된 트레이드를 공급자별 실행 경로로 보낸다
pub struct SwapDispatcher {
    wallet: Arc<dyn WalletSigner>,
    kyberswap: Option<Arc<KyberswapSource>>,
    paraswap: Option<Arc<ParaswapSource>>,
    deadline_seconds: u64,
}

impl SwapDispatcher {
    pub fn new(wallet: Arc<dyn WalletSigner>) -> Self {
        Self {
            wallet,
            kyberswap: None,
            paraswap: None,
            deadline_seconds: DEFAULT_DEADLINE_SECONDS,
        }
    }

    pub fn with_kyberswap(mut self, source: Arc<KyberswapSource>) -> Self {
        self.kyberswap = Some(source);
        self
    }

    pub fn with_paraswap(mut self, source: Arc<ParaswapSource>) -> Self {
        self.paraswap = Some(source);
        self
    }

    pub fn with_deadline_seconds(mut self, seconds: u64) -> Self {
        self.deadline_seconds = seconds;
        self
    }

    pub async fn execute(
        &self,
        trade: &Trade,
        slippage: &SlippageTolerance,
        recipient: Address,
    ) -> Result<ExecutionResult, ExecutionError> {
        let wallet_chain = self.wallet.chain_id();
        if wallet_chain != trade.chain_id() {
            return Err(ExecutionError::UnsupportedChain { wallet: wallet_chain, trade: trade.chain_id() });
        }

        let deadline = Utc::now() + ChronoDuration::seconds(self.deadline_seconds as i64);
        let deadline_ts = deadline.timestamp().max(0) as u64;
        let sender = self.wallet.account();

        let (tx, expected_to) = match trade {
            Trade::Classic(classic) => {
                let tx = build_classic_swap(classic, slippage, recipient, deadline_ts)?;
                (tx, classic.router)
            }
            Trade::Kyberswap(kyber) => {
                let source = self
                    .kyberswap
                    .as_ref()
                    .ok_or_else(|| ExecutionError::Failed("kyberswap is not configured".to_string()))?;
                let tx = source.build_swap(kyber, slippage, sender, recipient, deadline_ts).await?;
                (tx, kyber.router_address)
            }
            Trade::Paraswap(para) => {
                let source = self
                    .paraswap
                    .as_ref()
                    .ok_or_else(|| ExecutionError::Failed("paraswap is not configured".to_string()))?;
                let tx = source.build_swap(para, slippage, sender, recipient, deadline_ts).await?;
                (tx, para.contract_address)
            }
        };

        if tx.to != expected_to {
            error!("❌ {} built a transaction for {:#x}, quoted {:#x}", trade.fill_type(), tx.to, expected_to);
            return Err(ExecutionError::Modified);
        }

        info!(
            "📝 Submitting {} swap: {} -> {} (slippage {}%)",
            trade.fill_type(),
            trade.input_amount(),
            trade.output_amount(),
            slippage.as_percent()
        );

        let built_data = tx.data.clone();
        let submitted = match self.wallet.send_transaction(tx).await {
            Ok(submitted) => submitted,
            Err(err) => {
                let err = ExecutionError::from(err);
                match &err {
                    ExecutionError::Rejected => warn!("🙅 Swap rejected by user"),
                    other => error!("❌ Swap failed: {}", other),
                }
                return Err(err);
            }
        };
        if submitted.data != built_data {
            error!("❌ Submitted calldata differs from the built calldata");
            return Err(ExecutionError::Modified);
        }

        info!("✅ Swap submitted: {:#x}", submitted.hash);

        Ok(ExecutionResult {
            id: Uuid::new_v4(),
            tx_hash: submitted.hash,
            fill_type: trade.fill_type(),
            trade_type: trade.trade_type(),
            input_currency: trade.input_amount().currency.clone(),
            output_currency: trade.output_amount().currency.clone(),
            input_raw: trade.input_amount().raw,
            output_raw: trade.output_amount().raw,
            minimum_amount_out: trade.minimum_amount_out(slippage).raw,
            maximum_amount_in: trade.maximum_amount_in(slippage).raw,
            deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mocks::{mock_trade, MockAggregatorApi, MockApiState, MockWallet};
    use alloy::primitives::address;
    use reqwest::Client;
    use std::time::Duration;

    const RECIPIENT: Address = address!("2222222222222222222222222222222222222222");

    #[tokio::test]
    async fn test_classic_trade_keeps_slippage_bounds() {
        let wallet = Arc::new(MockWallet::new(1));
        let dispatcher = SwapDispatcher::new(wallet.clone());
        let trade = mock_trade(TradeFillType::Classic, TradeType::ExactInput, 1_000_000_000_000_000_000, 3_000_000_000);
        let slippage = SlippageTolerance::from_bps(100);

        let result = dispatcher.execute(&trade, &slippage, RECIPIENT).await.unwrap();
        assert_eq!(result.fill_type, TradeFillType::Classic);
        assert_eq!(result.trade_type, TradeType::ExactInput);
        assert_eq!(result.output_raw, U256::from(3_000_000_000u64));
        assert_eq!(result.minimum_amount_out, trade.minimum_amount_out(&slippage).raw);
        assert_eq!(result.maximum_amount_in, trade.input_amount().raw);

        let sent = wallet.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, crate::constants::UNISWAP_SWAP_ROUTER_02);
        assert_eq!(sent[0].value, trade.input_amount().raw);
    }

    #[tokio::test]
    async fn test_rejection_is_distinguished_from_failure() {
        let trade = mock_trade(TradeFillType::Classic, TradeType::ExactInput, 1_000, 3_000);

        let rejecting = SwapDispatcher::new(Arc::new(MockWallet::new(1).rejecting()));
        let err = rejecting.execute(&trade, &SlippageTolerance::default(), RECIPIENT).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Rejected));

        let failing = SwapDispatcher::new(Arc::new(MockWallet::new(1).failing("nonce too low")));
        let err = failing.execute(&trade, &SlippageTolerance::default(), RECIPIENT).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Failed(_)));
    }

    #[tokio::test]
    async fn test_tampered_calldata_is_detected() {
        let dispatcher = SwapDispatcher::new(Arc::new(MockWallet::new(1).tampering()));
        let trade = mock_trade(TradeFillType::Classic, TradeType::ExactOutput, 1_000, 3_000);
        let err = dispatcher.execute(&trade, &SlippageTolerance::default(), RECIPIENT).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Modified));
    }

    #[tokio::test]
    async fn test_wrong_chain_and_missing_route_builder() {
        let trade = mock_trade(TradeFillType::Kyberswap, TradeType::ExactInput, 1_000, 3_000);

        let other_chain = SwapDispatcher::new(Arc::new(MockWallet::new(137)));
        let err = other_chain.execute(&trade, &SlippageTolerance::default(), RECIPIENT).await.unwrap_err();
        assert!(matches!(err, ExecutionError::UnsupportedChain { wallet: 137, trade: 1 }));

        let unconfigured = SwapDispatcher::new(Arc::new(MockWallet::new(1)));
        let err = unconfigured.execute(&trade, &SlippageTolerance::default(), RECIPIENT).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Failed(_)));
    }

    #[tokio::test]
    async fn test_aggregator_trades_are_built_remotely() {
        let server = MockAggregatorApi::start(MockApiState::new(3_000)).await.unwrap();
        let mut config = Config::default();
        config.kyberswap.base_url = server.url();
        config.paraswap.base_url = server.url();
        let client = Client::new();
        let wallet = Arc::new(MockWallet::new(1));
        let dispatcher = SwapDispatcher::new(wallet.clone())
            .with_kyberswap(Arc::new(KyberswapSource::new(client.clone(), &config.kyberswap, Duration::from_secs(9))))
            .with_paraswap(Arc::new(ParaswapSource::new(client, &config.paraswap, Duration::from_secs(9))));

        let kyber = mock_trade(TradeFillType::Kyberswap, TradeType::ExactInput, 1_000_000_000_000_000_000, 2_990_000_000);
        let result = dispatcher.execute(&kyber, &SlippageTolerance::default(), RECIPIENT).await.unwrap();
        assert_eq!(result.fill_type, TradeFillType::Kyberswap);

        let para = mock_trade(TradeFillType::Paraswap, TradeType::ExactOutput, 1_000_000_000_000_000_000, 2_990_000_000);
        let result = dispatcher.execute(&para, &SlippageTolerance::default(), RECIPIENT).await.unwrap();
        assert_eq!(result.trade_type, TradeType::ExactOutput);
        assert_eq!(result.maximum_amount_in, SlippageTolerance::default().maximum_amount_in(para.input_amount().raw));

        assert_eq!(server.state().build_requests(), 2);
        let sent = wallet.sent();
        assert_eq!(sent[0].to, crate::constants::KYBERSWAP_ROUTER);
        assert_eq!(sent[1].to, crate::constants::PARASWAP_AUGUSTUS_V6);
    }
}
