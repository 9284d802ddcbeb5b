use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;

use crate::dex::uniswap::IQuoterV2;
use crate::dex::{AdapterError, QuoterBackend};

#[derive(Debug, Clone, Copy)]
struct TierLiquidity {
    amount_out: U256,
    amount_in: U256,
}

/// 티어별 고정 견적을 돌려주는 QuoterV2. 등록되지 않은 티어는 revert
#[derive(Debug, Default)]
pub struct MockQuoterBackend {
    tiers: HashMap<u32, TierLiquidity>,
    calls: AtomicUsize,
}

impl MockQuoterBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// exact-input 호출엔 `amount_out`, exact-output 호출엔 `amount_in` 을 돌려준다
    pub fn with_tier(mut self, fee: u32, amount_out: U256, amount_in: U256) -> Self {
        self.tiers.insert(fee, TierLiquidity { amount_out, amount_in });
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn reverted() -> AdapterError {
    AdapterError::InvalidResponse("execution reverted".to_string())
}

#[async_trait]
impl QuoterBackend for MockQuoterBackend {
    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if data.len() < 4 {
            return Err(reverted());
        }

        let (fee, exact_in) = if data[..4] == IQuoterV2::quoteExactInputSingleCall::SELECTOR {
            let call = IQuoterV2::quoteExactInputSingleCall::abi_decode(&data)
                .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;
            (call.params.fee.to::<u32>(), true)
        } else if data[..4] == IQuoterV2::quoteExactOutputSingleCall::SELECTOR {
            let call = IQuoterV2::quoteExactOutputSingleCall::abi_decode(&data)
                .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;
            (call.params.fee.to::<u32>(), false)
        } else {
            return Err(reverted());
        };

        let tier = self.tiers.get(&fee).ok_or_else(reverted)?;
        let quoted = if exact_in { tier.amount_out } else { tier.amount_in };
        let encoded = (quoted, U256::ZERO, U256::from(1u64), U256::from(110_000u64)).abi_encode_params();
        Ok(Bytes::from(encoded))
    }
}
