use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AdapterError, QuoteRequest, QuoteSource, SkipReason, SwapIntent, Trade};

/// 공급자 하나의 조회 상태 (isLoading / data / error)
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    /// 이 스냅샷이 속한 입력 세대
    pub generation: u64,
    pub skipped: Option<SkipReason>,
    /// 현재 세대의 첫 조회가 진행 중
    pub is_loading: bool,
    /// 폴링 포함, 어떤 조회든 진행 중
    pub is_fetching: bool,
    pub data: Option<Trade>,
    pub error: Option<String>,
    pub updated_at: Option<Instant>,
}

impl Default for QuerySnapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            skipped: Some(SkipReason::MissingAmount),
            is_loading: false,
            is_fetching: false,
            data: None,
            error: None,
            updated_at: None,
        }
    }
}

#[derive(Debug)]
enum WorkerCommand {
    Submit { generation: u64, request: QuoteRequest },
}

struct FetchOutcome {
    generation: u64,
    result: Result<Option<Trade>, AdapterError>,
}

/// 어댑터 하나의 요청 수명주기를 소유하는 태스크 핸들
pub struct QuoteWorker {
    name: String,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    snapshot: watch::Receiver<QuerySnapshot>,
    task: JoinHandle<()>,
}

impl QuoteWorker {
    /// `revision` 은 스냅샷이 바뀔 때마다 증가한다
    pub fn spawn(
        source: Arc<dyn QuoteSource>,
        cancel: CancellationToken,
        revision: Arc<watch::Sender<u64>>,
    ) -> Self {
        let name = source.name().to_string();
        let (commands, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(QuerySnapshot::default());

        let task = tokio::spawn(
            WorkerLoop {
                source,
                snapshot: snapshot_tx,
                revision,
                generation: 0,
                current: None,
                in_flight: None,
            }
            .run(rx, cancel),
        );

        Self { name, commands, snapshot, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn submit(&self, generation: u64, request: QuoteRequest) {
        if self.commands.send(WorkerCommand::Submit { generation, request }).is_err() {
            warn!("⚠️ Quote worker {} is gone, request dropped", self.name);
        }
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot> {
        self.snapshot.clone()
    }
}

impl Drop for QuoteWorker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct WorkerLoop {
    source: Arc<dyn QuoteSource>,
    snapshot: watch::Sender<QuerySnapshot>,
    revision: Arc<watch::Sender<u64>>,
    generation: u64,
    current: Option<SwapIntent>,
    in_flight: Option<JoinHandle<()>>,
}

impl WorkerLoop {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<WorkerCommand>, cancel: CancellationToken) {
        let (results_tx, mut results) = mpsc::unbounded_channel::<FetchOutcome>();
        let mut ticker = self.source.polling_interval().map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        debug!("🔄 Quote worker started: {}", self.source.name());

        loop {
            let can_poll = self.current.is_some() && self.in_flight.is_none();
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(command) = commands.recv() => match command {
                    WorkerCommand::Submit { generation, request } => {
                        self.on_submit(generation, request, &results_tx);
                        if let Some(interval) = ticker.as_mut() {
                            interval.reset();
                        }
                    }
                },
                Some(outcome) = results.recv() => self.on_outcome(outcome),
                _ = next_tick(&mut ticker), if can_poll => self.on_poll(&results_tx),
            }
        }

        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        debug!("🛑 Quote worker stopped: {}", self.source.name());
    }

    fn on_submit(&mut self, generation: u64, request: QuoteRequest, results: &mpsc::UnboundedSender<FetchOutcome>) {
        if let Some(handle) = self.in_flight.take() {
            debug!("✂️ {} aborting superseded fetch (generation {})", self.source.name(), self.generation);
            handle.abort();
        }
        self.generation = generation;

        match self.source.check_request(&request) {
            Err(reason) => {
                debug!("⏭️ {} skipped generation {}: {}", self.source.name(), generation, reason);
                self.current = None;
                self.publish(QuerySnapshot {
                    generation,
                    skipped: Some(reason),
                    ..QuerySnapshot::default()
                });
            }
            Ok(intent) => {
                self.in_flight = Some(self.spawn_fetch(intent.clone(), results));
                self.current = Some(intent);
                self.publish(QuerySnapshot {
                    generation,
                    skipped: None,
                    is_loading: true,
                    is_fetching: true,
                    data: None,
                    error: None,
                    updated_at: None,
                });
            }
        }
    }

    fn on_poll(&mut self, results: &mpsc::UnboundedSender<FetchOutcome>) {
        let Some(intent) = self.current.clone() else {
            return;
        };
        debug!("🔁 {} refreshing quote (generation {})", self.source.name(), self.generation);
        self.in_flight = Some(self.spawn_fetch(intent, results));
        self.update(|snapshot| snapshot.is_fetching = true);
    }

    fn on_outcome(&mut self, outcome: FetchOutcome) {
        if outcome.generation != self.generation {
            debug!(
                "🗑️ {} discarded result of superseded generation {} (current {})",
                self.source.name(),
                outcome.generation,
                self.generation
            );
            return;
        }
        self.in_flight = None;

        let now = Instant::now();
        match outcome.result {
            Ok(Some(trade)) => {
                info!("✅ {} quote: {}", self.source.name(), trade);
                self.update(|snapshot| {
                    snapshot.data = Some(trade);
                    snapshot.error = None;
                    snapshot.updated_at = Some(now);
                    snapshot.is_loading = false;
                    snapshot.is_fetching = false;
                });
            }
            Ok(None) => {
                debug!("🚫 {} found no route", self.source.name());
                self.update(|snapshot| {
                    snapshot.data = None;
                    snapshot.error = None;
                    snapshot.updated_at = Some(now);
                    snapshot.is_loading = false;
                    snapshot.is_fetching = false;
                });
            }
            Err(e) => {
                warn!("⚠️ {} quote failed: {}", self.source.name(), e);
                self.update(|snapshot| {
                    snapshot.data = None;
                    snapshot.error = Some(e.to_string());
                    snapshot.updated_at = Some(now);
                    snapshot.is_loading = false;
                    snapshot.is_fetching = false;
                });
            }
        }
    }

    fn spawn_fetch(&self, intent: SwapIntent, results: &mpsc::UnboundedSender<FetchOutcome>) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let results = results.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = source.fetch_quote(&intent).await;
            let _ = results.send(FetchOutcome { generation, result });
        })
    }

    fn publish(&self, snapshot: QuerySnapshot) {
        self.snapshot.send_replace(snapshot);
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn update(&self, modify: impl FnOnce(&mut QuerySnapshot)) {
        self.snapshot.send_modify(modify);
        self.revision.send_modify(|revision| *revision += 1);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::TradeFillType;
    use crate::mocks::MockQuoteSource;
    use crate::types::{Currency, CurrencyAmount, TradeType};
    use alloy::primitives::{address, U256};
    use std::time::Duration;

    fn request(amount: &str) -> QuoteRequest {
        let usdc = Currency::token(1, address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), 6, "USDC");
        QuoteRequest {
            chain_id: 1,
            trade_type: TradeType::ExactInput,
            amount: CurrencyAmount::try_parse(amount, &Currency::native(1)),
            other_currency: Some(usdc),
            account: None,
        }
    }

    fn spawn(source: Arc<MockQuoteSource>) -> (QuoteWorker, CancellationToken) {
        let cancel = CancellationToken::new();
        let (revision, _) = watch::channel(0u64);
        let worker = QuoteWorker::spawn(source, cancel.clone(), Arc::new(revision));
        (worker, cancel)
    }

    async fn settle(worker: &QuoteWorker) -> QuerySnapshot {
        let mut rx = worker.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if !snapshot.is_fetching && snapshot.generation > 0 {
                return snapshot;
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_result_is_never_published() {
        let source = Arc::new(
            MockQuoteSource::new("slow-then-fast", TradeFillType::Kyberswap)
                .with_latencies(vec![Duration::from_secs(5), Duration::from_millis(100)]),
        );
        let (worker, _cancel) = spawn(Arc::clone(&source));

        worker.submit(1, request("1"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(worker.snapshot().is_loading);

        worker.submit(2, request("2"));
        let snapshot = settle(&worker).await;
        assert_eq!(snapshot.generation, 2);
        let trade = snapshot.data.unwrap();
        assert_eq!(trade.input_amount().raw, U256::from(2_000_000_000_000_000_000u128));

        // the aborted generation-1 fetch must not overwrite anything later
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(worker.snapshot().generation, 2);
        assert_eq!(worker.snapshot().data.unwrap().input_amount().raw, trade.input_amount().raw);
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_request_issues_no_call() {
        let source = Arc::new(MockQuoteSource::new("ks", TradeFillType::Kyberswap).exact_input_only());
        let (worker, _cancel) = spawn(Arc::clone(&source));

        let mut exact_output = request("1");
        exact_output.trade_type = TradeType::ExactOutput;
        worker.submit(1, exact_output);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = worker.snapshot();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.skipped, Some(SkipReason::UnsupportedTradeType(TradeType::ExactOutput)));
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_refreshes_current_request() {
        let source = Arc::new(
            MockQuoteSource::new("poller", TradeFillType::Paraswap)
                .with_polling(Duration::from_secs(9))
                .with_latency(Duration::from_millis(50)),
        );
        let (worker, _cancel) = spawn(Arc::clone(&source));

        worker.submit(1, request("1"));
        settle(&worker).await;
        assert_eq!(source.call_count(), 1);

        tokio::time::sleep(Duration::from_millis(8_900)).await;
        assert_eq!(source.call_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(source.call_count(), 2);
        let snapshot = settle(&worker).await;
        assert!(!snapshot.is_loading);
        assert!(snapshot.data.is_some());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polling_without_valid_request() {
        let source = Arc::new(MockQuoteSource::new("poller", TradeFillType::Paraswap).with_polling(Duration::from_secs(9)));
        let (worker, _cancel) = spawn(Arc::clone(&source));

        worker.submit(1, request("0"));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.call_count(), 0);
        assert_eq!(worker.snapshot().skipped, Some(SkipReason::MissingAmount));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_reported_in_snapshot() {
        let source = Arc::new(MockQuoteSource::new("broken", TradeFillType::Classic).failing("HTTP 502"));
        let (worker, cancel) = spawn(Arc::clone(&source));

        worker.submit(1, request("1"));
        let snapshot = settle(&worker).await;
        assert!(snapshot.data.is_none());
        assert!(snapshot.error.unwrap().contains("HTTP 502"));

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        worker.submit(2, request("2"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(worker.snapshot().generation, 1);
    }
}
