use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    derive_trade_source, select_best_trade, Debouncer, QuoteRequest, QuoteSource, QuoteWorker,
    SelectionError, TradeSource,
};
use crate::config::AggregationConfig;
use crate::constants::DEBOUNCE_TIME_MS;
use crate::types::{Currency, CurrencyAmount, SlippageTolerance, SwapContext, TradeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    pub debounce: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEBOUNCE_TIME_MS),
        }
    }
}

impl From<&AggregationConfig> for AggregatorSettings {
    fn from(config: &AggregationConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
        }
    }
}

/// 사용자 입력 (디바운스 대상)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapInput {
    pub trade_type: TradeType,
    pub amount: Option<CurrencyAmount>,
    pub other_currency: Option<Currency>,
}

/// 트레이드 집계기
///
/// 입력 → 디바운스 → 공급자별 워커 → 상태 추적 → 최적 견적 선택
pub struct TradeAggregator {
    context: SwapContext,
    names: Vec<String>,
    workers: Arc<Vec<QuoteWorker>>,
    debouncer: Debouncer<SwapInput>,
    generation: Arc<AtomicU64>,
    revision: watch::Receiver<u64>,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

impl TradeAggregator {
    /// 공급자 순서가 동률 처리 순서가 된다
    pub fn spawn(
        context: SwapContext,
        sources: Vec<Arc<dyn QuoteSource>>,
        settings: AggregatorSettings,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (revision_tx, revision) = watch::channel(0u64);
        let revision_tx = Arc::new(revision_tx);

        let names = sources.iter().map(|source| source.name().to_string()).collect();
        let workers: Arc<Vec<QuoteWorker>> = Arc::new(
            sources
                .into_iter()
                .map(|source| QuoteWorker::spawn(source, cancel.child_token(), Arc::clone(&revision_tx)))
                .collect(),
        );

        let debouncer = Debouncer::spawn(settings.debounce);
        let generation = Arc::new(AtomicU64::new(0));

        let driver = tokio::spawn(drive(
            context.clone(),
            debouncer.subscribe(),
            Arc::clone(&workers),
            Arc::clone(&generation),
            revision_tx,
            cancel.clone(),
        ));

        info!(
            "🚀 Trade aggregator started on chain {} with {} sources",
            context.chain_id,
            workers.len()
        );

        Self {
            context,
            names,
            workers,
            debouncer,
            generation,
            revision,
            cancel,
            driver,
        }
    }

    pub fn context(&self) -> &SwapContext {
        &self.context
    }

    /// 키 입력마다 호출해도 된다. 조용한 구간이 지나야 조회가 시작된다
    pub fn set_input(&self, input: SwapInput) {
        self.debouncer.push(input);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn trade_sources(&self) -> Vec<TradeSource> {
        let generation = self.generation();
        self.workers
            .iter()
            .map(|worker| derive_trade_source(&worker.snapshot(), generation))
            .collect()
    }

    /// 공급자 이름과 상태 쌍
    pub fn named_sources(&self) -> Vec<(String, TradeSource)> {
        self.names.iter().cloned().zip(self.trade_sources()).collect()
    }

    pub fn best_trade(&self) -> Result<TradeSource, SelectionError> {
        select_best_trade(&self.trade_sources())
    }

    /// 어떤 공급자의 스냅샷이든 바뀔 때까지 대기. 종료되면 false
    pub async fn changed(&mut self) -> bool {
        self.revision.changed().await.is_ok()
    }

    /// 현재 세대의 모든 공급자가 응답할 때까지 기다린 뒤 선택 결과를 돌려준다
    pub async fn settled(&mut self) -> Result<TradeSource, SelectionError> {
        loop {
            let generation = self.generation();
            let caught_up = generation > 0
                && self.workers.iter().all(|worker| {
                    let snapshot = worker.snapshot();
                    snapshot.generation == generation && !snapshot.is_loading
                });
            let best = self.best_trade()?;
            if caught_up || !self.changed().await {
                return Ok(best);
            }
        }
    }

    pub fn shutdown(&self) {
        info!("🛑 Trade aggregator shutting down");
        self.cancel.cancel();
    }
}

impl Drop for TradeAggregator {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.driver.abort();
    }
}

async fn drive(
    context: SwapContext,
    mut committed: watch::Receiver<Option<SwapInput>>,
    workers: Arc<Vec<QuoteWorker>>,
    generation: Arc<AtomicU64>,
    revision: Arc<watch::Sender<u64>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = committed.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(input) = committed.borrow_and_update().clone() else {
                    continue;
                };

                let current = generation.fetch_add(1, Ordering::SeqCst) + 1;
                let request = QuoteRequest {
                    chain_id: context.chain_id,
                    trade_type: input.trade_type,
                    amount: input.amount,
                    other_currency: input.other_currency,
                    account: context.account,
                };
                debug!(
                    "📨 Dispatching generation {} ({}, amount {:?})",
                    current,
                    request.trade_type,
                    request.amount.as_ref().map(|amount| amount.to_string())
                );
                for worker in workers.iter() {
                    worker.submit(current, request.clone());
                }
                revision.send_modify(|revision| *revision += 1);
            }
        }
    }
}

/// 디바운스 없이 모든 공급자를 한 번씩 동시에 조회
pub async fn fetch_all(sources: &[Arc<dyn QuoteSource>], request: &QuoteRequest) -> Vec<TradeSource> {
    let futures = sources.iter().map(|source| async move {
        let intent = match source.check_request(request) {
            Ok(intent) => intent,
            Err(reason) => {
                debug!("⏭️ {} skipped: {}", source.name(), reason);
                return TradeSource::invalid();
            }
        };
        match source.fetch_quote(&intent).await {
            Ok(Some(trade)) => {
                info!("✅ {} quote: {}", source.name(), trade);
                TradeSource::valid(trade)
            }
            Ok(None) => TradeSource::no_route(),
            Err(e) => {
                warn!("⚠️ {} quote failed: {}", source.name(), e);
                TradeSource::no_route()
            }
        }
    });
    join_all(futures).await
}

pub async fn quote_once(
    sources: &[Arc<dyn QuoteSource>],
    request: &QuoteRequest,
) -> Result<TradeSource, SelectionError> {
    select_best_trade(&fetch_all(sources, request).await)
}

/// 스왑 버튼에 보여줄 입력 오류
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Connect wallet")]
    ConnectWallet,
    #[error("Select a token")]
    SelectToken,
    #[error("Enter an amount")]
    EnterAmount,
    #[error("Insufficient {0} balance")]
    InsufficientBalance(String),
}

/// 지갑 연결, 토큰 선택, 수량, 잔고 순으로 검사
pub fn input_error(
    account: Option<Address>,
    currency_in: Option<&Currency>,
    currency_out: Option<&Currency>,
    parsed_amount: Option<&CurrencyAmount>,
    balance_in: Option<&CurrencyAmount>,
    best: &TradeSource,
    slippage: &SlippageTolerance,
) -> Option<InputError> {
    if account.is_none() {
        return Some(InputError::ConnectWallet);
    }
    let (Some(currency_in), Some(_)) = (currency_in, currency_out) else {
        return Some(InputError::SelectToken);
    };
    if parsed_amount.is_none() {
        return Some(InputError::EnterAmount);
    }
    let (Some(balance), Some(trade)) = (balance_in, best.trade.as_ref()) else {
        return None;
    };
    if balance.raw < trade.maximum_amount_in(slippage).raw {
        return Some(InputError::InsufficientBalance(currency_in.symbol.clone()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::{TradeFillType, TradeState};
    use crate::mocks::MockQuoteSource;
    use alloy::primitives::{address, U256};

    const ONE_ETH: u128 = 1_000_000_000_000_000_000;

    fn usdc() -> Currency {
        Currency::token(1, address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), 6, "USDC")
    }

    fn sell_eth(amount: &str) -> SwapInput {
        SwapInput {
            trade_type: TradeType::ExactInput,
            amount: CurrencyAmount::try_parse(amount, &Currency::native(1)),
            other_currency: Some(usdc()),
        }
    }

    fn as_sources(mocks: &[Arc<MockQuoteSource>]) -> Vec<Arc<dyn QuoteSource>> {
        mocks.iter().map(|mock| Arc::clone(mock) as Arc<dyn QuoteSource>).collect()
    }

    /// 1 ETH 당 `usdc` 만큼의 USDC (6 decimals)
    fn usdc_per_eth(usdc: u128) -> (u128, u128) {
        (usdc * 1_000_000, ONE_ETH)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_typing_issues_one_round() {
        let (num, den) = usdc_per_eth(3_000);
        let mocks = vec![
            Arc::new(MockQuoteSource::new("x", TradeFillType::Classic).with_rate(num, den)),
            Arc::new(MockQuoteSource::new("y", TradeFillType::Kyberswap).with_rate(num, den)),
            Arc::new(MockQuoteSource::new("z", TradeFillType::Paraswap).with_rate(num, den)),
        ];
        let mut aggregator =
            TradeAggregator::spawn(SwapContext::new(1), as_sources(&mocks), AggregatorSettings::default());

        aggregator.set_input(sell_eth("1"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        aggregator.set_input(sell_eth("1.5"));

        let best = aggregator.settled().await.unwrap();
        assert_eq!(best.state, TradeState::Valid);
        assert_eq!(aggregator.generation(), 1);
        for mock in &mocks {
            let calls = mock.calls();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].amount.raw, U256::from(ONE_ETH * 3 / 2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_until_slowest_source_settles() {
        let x = Arc::new(
            MockQuoteSource::new("x", TradeFillType::Classic)
                .with_rate(3_000_000_000, ONE_ETH)
                .with_latency(Duration::from_millis(100)),
        );
        let y = Arc::new(
            MockQuoteSource::new("y", TradeFillType::Kyberswap)
                .with_rate(2_995_000_000, ONE_ETH)
                .with_latency(Duration::from_millis(150)),
        );
        let z = Arc::new(
            MockQuoteSource::new("z", TradeFillType::Paraswap)
                .no_route()
                .with_latency(Duration::from_secs(3)),
        );
        let mut aggregator = TradeAggregator::spawn(
            SwapContext::new(1),
            as_sources(&[x, y, z]),
            AggregatorSettings::default(),
        );

        aggregator.set_input(sell_eth("1"));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let sources = aggregator.trade_sources();
        assert_eq!(sources[0].state, TradeState::Valid);
        assert_eq!(sources[1].state, TradeState::Valid);
        assert_eq!(sources[2].state, TradeState::Loading);
        assert_eq!(aggregator.best_trade().unwrap().state, TradeState::Loading);

        let best = aggregator.settled().await.unwrap();
        let trade = best.trade.unwrap();
        assert_eq!(trade.fill_type(), TradeFillType::Classic);
        assert_eq!(trade.output_amount().raw, U256::from(3_000_000_000u64));
        assert_eq!(aggregator.trade_sources()[2].state, TradeState::NoRouteFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_output_prefers_cheaper_input() {
        let x = Arc::new(MockQuoteSource::new("x", TradeFillType::Classic).with_rate(1_000_000_000, 334_000_000_000_000_000));
        let y = Arc::new(MockQuoteSource::new("y", TradeFillType::Paraswap).with_rate(1_000_000_000, 335_000_000_000_000_000));
        let mut aggregator =
            TradeAggregator::spawn(SwapContext::new(1), as_sources(&[y, x]), AggregatorSettings::default());

        aggregator.set_input(SwapInput {
            trade_type: TradeType::ExactOutput,
            amount: CurrencyAmount::try_parse("1000", &usdc()),
            other_currency: Some(Currency::native(1)),
        });
        let trade = aggregator.settled().await.unwrap().trade.unwrap();
        assert_eq!(trade.fill_type(), TradeFillType::Classic);
        assert_eq!(trade.input_amount().raw, U256::from(334_000_000_000_000_000u128));
        assert!(trade.input_amount().currency.is_native());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_currencies_are_invalid_without_calls() {
        let mocks = vec![
            Arc::new(MockQuoteSource::new("x", TradeFillType::Classic)),
            Arc::new(MockQuoteSource::new("y", TradeFillType::Kyberswap)),
            Arc::new(MockQuoteSource::new("z", TradeFillType::Paraswap)),
        ];
        let mut aggregator =
            TradeAggregator::spawn(SwapContext::new(1), as_sources(&mocks), AggregatorSettings::default());

        aggregator.set_input(SwapInput {
            trade_type: TradeType::ExactInput,
            amount: CurrencyAmount::try_parse("1", &Currency::native(1)),
            other_currency: Currency::native(1).wrapped(),
        });
        let best = aggregator.settled().await.unwrap();
        assert_eq!(best, TradeSource::invalid());
        assert!(aggregator.trade_sources().iter().all(|source| source.state == TradeState::Invalid));
        assert!(mocks.iter().all(|mock| mock.call_count() == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_input_never_reaches_selection() {
        let mock = Arc::new(
            MockQuoteSource::new("x", TradeFillType::Kyberswap)
                .with_latencies(vec![Duration::from_secs(4), Duration::from_millis(100)]),
        );
        let mut aggregator =
            TradeAggregator::spawn(SwapContext::new(1), as_sources(&[Arc::clone(&mock)]), AggregatorSettings::default());

        aggregator.set_input(sell_eth("1"));
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(aggregator.best_trade().unwrap().state, TradeState::Loading);

        aggregator.set_input(sell_eth("2"));
        let best = aggregator.settled().await.unwrap();
        assert_eq!(best.trade.as_ref().unwrap().input_amount().raw, U256::from(2 * ONE_ETH));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let best = aggregator.best_trade().unwrap();
        assert_eq!(best.trade.unwrap().input_amount().raw, U256::from(2 * ONE_ETH));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpolled_classic_quote_keeps_winning() {
        let classic = Arc::new(MockQuoteSource::new("classic", TradeFillType::Classic).with_rate(3_000_000_000, ONE_ETH));
        let paraswap = Arc::new(
            MockQuoteSource::new("paraswap", TradeFillType::Paraswap)
                .with_rate(2_900_000_000, ONE_ETH)
                .with_polling(Duration::from_secs(9)),
        );
        let mut aggregator = TradeAggregator::spawn(
            SwapContext::new(1),
            as_sources(&[Arc::clone(&classic), Arc::clone(&paraswap)]),
            AggregatorSettings::default(),
        );

        aggregator.set_input(sell_eth("1"));
        let best = aggregator.settled().await.unwrap();
        assert_eq!(best.trade.unwrap().fill_type(), TradeFillType::Classic);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let sources = aggregator.trade_sources();
        assert_eq!(sources[0].state, TradeState::Valid);
        assert_eq!(sources[1].state, TradeState::Valid);

        let best = aggregator.best_trade().unwrap();
        let trade = best.trade.unwrap();
        assert_eq!(trade.fill_type(), TradeFillType::Classic);
        assert_eq!(trade.output_amount().raw, U256::from(3_000_000_000u64));
        assert_eq!(classic.call_count(), 1);
        assert!(paraswap.call_count() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_is_invalid() {
        let aggregator = TradeAggregator::spawn(
            SwapContext::new(1),
            as_sources(&[Arc::new(MockQuoteSource::new("x", TradeFillType::Classic))]),
            AggregatorSettings::default(),
        );
        assert_eq!(aggregator.best_trade().unwrap(), TradeSource::invalid());
        assert_eq!(aggregator.named_sources()[0].0, "x");
        aggregator.shutdown();
    }

    #[tokio::test]
    async fn test_quote_once_fans_out() {
        let x = Arc::new(MockQuoteSource::new("x", TradeFillType::Classic).with_rate(2_995_000_000, ONE_ETH));
        let y = Arc::new(MockQuoteSource::new("y", TradeFillType::Kyberswap).with_rate(3_000_000_000, ONE_ETH));
        let z = Arc::new(MockQuoteSource::new("z", TradeFillType::Paraswap).failing("HTTP 500"));
        let sources = as_sources(&[x, y, z]);

        let request = QuoteRequest {
            chain_id: 1,
            trade_type: TradeType::ExactInput,
            amount: CurrencyAmount::try_parse("1", &Currency::native(1)),
            other_currency: Some(usdc()),
            account: None,
        };
        let all = fetch_all(&sources, &request).await;
        assert_eq!(
            all.iter().map(|source| source.state).collect::<Vec<_>>(),
            vec![TradeState::Valid, TradeState::Valid, TradeState::NoRouteFound]
        );
        let best = quote_once(&sources, &request).await.unwrap();
        assert_eq!(best.trade.unwrap().fill_type(), TradeFillType::Kyberswap);
    }

    #[test]
    fn test_input_errors() {
        let account = Some(address!("1111111111111111111111111111111111111111"));
        let eth = Currency::native(1);
        let usdc = usdc();
        let amount = CurrencyAmount::try_parse("1", &eth).unwrap();
        let slippage = SlippageTolerance::default();
        let none = TradeSource::invalid();

        assert_eq!(
            input_error(None, Some(&eth), Some(&usdc), Some(&amount), None, &none, &slippage),
            Some(InputError::ConnectWallet)
        );
        assert_eq!(
            input_error(account, Some(&eth), None, Some(&amount), None, &none, &slippage),
            Some(InputError::SelectToken)
        );
        assert_eq!(
            input_error(account, Some(&eth), Some(&usdc), None, None, &none, &slippage),
            Some(InputError::EnterAmount)
        );

        let trade = crate::mocks::mock_trade(TradeFillType::Classic, TradeType::ExactInput, ONE_ETH, 3_000_000_000);
        let best = TradeSource::valid(trade);
        let poor = CurrencyAmount::try_parse("0.5", &eth).unwrap();
        let rich = CurrencyAmount::try_parse("2", &eth).unwrap();
        assert_eq!(
            input_error(account, Some(&eth), Some(&usdc), Some(&amount), Some(&poor), &best, &slippage),
            Some(InputError::InsufficientBalance("ETH".to_string()))
        );
        assert_eq!(
            input_error(account, Some(&eth), Some(&usdc), Some(&amount), Some(&rich), &best, &slippage),
            None
        );
        assert_eq!(InputError::InsufficientBalance("ETH".to_string()).to_string(), "Insufficient ETH balance");
    }
}
