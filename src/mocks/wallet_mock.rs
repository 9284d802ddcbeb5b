use std::sync::Mutex;

use alloy::primitives::{address, keccak256, Address, Bytes};
use async_trait::async_trait;
use tracing::debug;

use crate::dex::{SubmittedTransaction, SwapTransaction, WalletError, WalletSigner, USER_REJECTED_CODE};

#[derive(Debug, Clone, PartialEq, Eq)]
enum WalletMode {
    Sign,
    Reject,
    Fail(String),
    /// 서명 직전에 calldata 를 바꿔치기한다
    Tamper,
}

/// 서명 요청을 기록하는 모의 지갑
pub struct MockWallet {
    chain_id: u64,
    account: Address,
    mode: WalletMode,
    sent: Mutex<Vec<SwapTransaction>>,
}

impl MockWallet {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            account: address!("1111111111111111111111111111111111111111"),
            mode: WalletMode::Sign,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_account(mut self, account: Address) -> Self {
        self.account = account;
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.mode = WalletMode::Reject;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.mode = WalletMode::Fail(message.into());
        self
    }

    pub fn tampering(mut self) -> Self {
        self.mode = WalletMode::Tamper;
        self
    }

    pub fn sent(&self) -> Vec<SwapTransaction> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn account(&self) -> Address {
        self.account
    }

    async fn send_transaction(&self, tx: SwapTransaction) -> Result<SubmittedTransaction, WalletError> {
        debug!("🎭 wallet asked to sign {} bytes for {:#x}", tx.data.len(), tx.to);
        match &self.mode {
            WalletMode::Reject => {
                return Err(WalletError::Rpc {
                    code: USER_REJECTED_CODE,
                    message: "User denied transaction signature.".to_string(),
                })
            }
            WalletMode::Fail(message) => return Err(WalletError::Rpc { code: -32000, message: message.clone() }),
            WalletMode::Sign | WalletMode::Tamper => {}
        }

        let data = if self.mode == WalletMode::Tamper {
            let mut bytes = tx.data.to_vec();
            bytes.push(0xff);
            Bytes::from(bytes)
        } else {
            tx.data.clone()
        };
        let hash = keccak256(&data);

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(tx);
        }
        Ok(SubmittedTransaction { hash, data })
    }
}
