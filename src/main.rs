use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xswap::config::Config;
use xswap::dex::{
    quote_once, AggregatorSettings, JsonRpcBackend, KyberswapSource, ParaswapSource, QuoteRequest,
    QuoteSource, SwapInput, TradeAggregator, TradeSource, TradeState, UniswapClassicSource,
};
use xswap::mocks::{get_mock_config, is_mock_mode, MockAggregatorApi, MockApiState};
use xswap::types::{CurrencyAmount, SlippageTolerance, SwapContext, TradeType};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("quote")
        .version("0.1.0")
        .author("xSwap Team <team@xswap.dev>")
        .about("🔀 멀티 공급자 스왑 견적 집계기")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로 (없으면 기본 설정)")
                .default_value("config/default.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .arg(
            Arg::new("sell")
                .long("sell")
                .value_name("TOKEN")
                .help("파는 토큰 심볼 또는 주소")
                .default_value("ETH"),
        )
        .arg(
            Arg::new("buy")
                .long("buy")
                .value_name("TOKEN")
                .help("사는 토큰 심볼 또는 주소")
                .default_value("USDC"),
        )
        .arg(
            Arg::new("amount")
                .short('a')
                .long("amount")
                .value_name("AMOUNT")
                .help("수량 (exact-output 이면 사는 토큰 기준)")
                .default_value("1"),
        )
        .arg(
            Arg::new("exact-output")
                .long("exact-output")
                .help("받을 수량을 고정")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("watch")
                .short('w')
                .long("watch")
                .help("폴링하면서 최적 견적을 계속 출력")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("mock")
                .long("mock")
                .help("로컬 모의 API 사용 (API_MODE=mock 과 동일)")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    let log_filter = match log_level {
        "trace" | "debug" | "info" | "warn" | "error" => log_level,
        _ => "info",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = matches
        .get_one::<String>("config")
        .context("missing --config")?;
    let mut config = if Path::new(config_path).exists() {
        info!("📋 Loading config: {}", config_path);
        Config::load(config_path).await?
    } else {
        warn!("📋 {} not found, using default config", config_path);
        Config::default()
    };
    config.apply_env_overrides()?;

    // 모의 서버는 main 이 끝날 때까지 살아 있어야 한다
    let _mock_server = if matches.get_flag("mock") || is_mock_mode() {
        let server = start_mock_api(&mut config).await?;
        Some(server)
    } else {
        None
    };

    if let Err(e) = config.validate() {
        error!("❌ Config validation failed: {}", e);
        std::process::exit(1);
    }
    info!("✅ Config loaded (chain {})", config.network.chain_id);

    let sources = build_sources(&config)?;
    if sources.is_empty() {
        anyhow::bail!("no quote source is enabled");
    }

    let (trade_type, amount, other) = parse_swap(&matches, &config)?;
    let context = SwapContext::new(config.network.chain_id)
        .with_slippage(SlippageTolerance::from_bps(config.aggregation.default_slippage_bps));

    if matches.get_flag("watch") {
        watch(context, sources, &config, SwapInput { trade_type, amount: Some(amount), other_currency: Some(other) }).await
    } else {
        let request = QuoteRequest {
            chain_id: context.chain_id,
            trade_type,
            amount: Some(amount),
            other_currency: Some(other),
            account: context.account,
        };
        let best = quote_once(&sources, &request).await?;
        report(&best, &context.slippage);
        Ok(())
    }
}

async fn start_mock_api(config: &mut Config) -> Result<MockAggregatorApi> {
    let mock = get_mock_config();
    let state = MockApiState::new(mock.eth_usdc_price)
        .with_spreads(mock.kyberswap_spread_bps, mock.paraswap_spread_bps)
        .with_latency(Duration::from_millis(mock.network_latency_ms));
    let server = MockAggregatorApi::start(state).await?;

    warn!("🎭 Mock mode: all providers are served by {}", server.url());
    config.kyberswap.base_url = server.url();
    config.paraswap.base_url = server.url();
    config.network.rpc_url = server.rpc_url();
    Ok(server)
}

fn build_sources(config: &Config) -> Result<Vec<Arc<dyn QuoteSource>>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.aggregation.request_timeout_ms))
        .build()
        .context("failed to build HTTP client")?;
    let polling = Duration::from_millis(config.aggregation.poll_interval_ms);

    let mut sources: Vec<Arc<dyn QuoteSource>> = Vec::new();
    if config.classic.enabled {
        let backend = Arc::new(JsonRpcBackend::new(client.clone(), config.network.rpc_url.clone()));
        sources.push(Arc::new(UniswapClassicSource::new(backend, &config.classic)));
    }
    if config.kyberswap.enabled {
        sources.push(Arc::new(KyberswapSource::new(client.clone(), &config.kyberswap, polling)));
    }
    if config.paraswap.enabled {
        sources.push(Arc::new(ParaswapSource::new(client, &config.paraswap, polling)));
    }

    info!(
        "🔌 Quote sources: {}",
        sources.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
    );
    Ok(sources)
}

fn parse_swap(matches: &ArgMatches, config: &Config) -> Result<(TradeType, CurrencyAmount, xswap::Currency)> {
    let symbol = |name: &str| -> Result<xswap::Currency> {
        let value = matches
            .get_one::<String>(name)
            .with_context(|| format!("missing --{}", name))?;
        config
            .currency(value)
            .with_context(|| format!("unknown token for --{}: {}", name, value))
    };
    let sell = symbol("sell")?;
    let buy = symbol("buy")?;

    let trade_type = if matches.get_flag("exact-output") {
        TradeType::ExactOutput
    } else {
        TradeType::ExactInput
    };
    let (fixed, other) = match trade_type {
        TradeType::ExactInput => (sell, buy),
        TradeType::ExactOutput => (buy, sell),
    };

    let text = matches
        .get_one::<String>("amount")
        .context("missing --amount")?;
    let amount = CurrencyAmount::parse(text, &fixed)
        .with_context(|| format!("invalid amount {} for {}", text, fixed))?;
    Ok((trade_type, amount, other))
}

async fn watch(
    context: SwapContext,
    sources: Vec<Arc<dyn QuoteSource>>,
    config: &Config,
    input: SwapInput,
) -> Result<()> {
    let slippage = context.slippage;
    let mut aggregator = TradeAggregator::spawn(context, sources, AggregatorSettings::from(&config.aggregation));
    aggregator.set_input(input);
    info!("👀 Watching quotes, press Ctrl+C to stop");

    let mut last: Option<TradeSource> = None;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                warn!("🛑 Shutdown signal received");
                aggregator.shutdown();
                return Ok(());
            }
            alive = aggregator.changed() => {
                if !alive {
                    return Ok(());
                }
                let best = match aggregator.best_trade() {
                    Ok(best) => best,
                    Err(e) => {
                        error!("❌ Trade selection failed: {}", e);
                        continue;
                    }
                };
                if last.as_ref() != Some(&best) {
                    for (name, source) in aggregator.named_sources() {
                        info!("   {:<10} {:?}", name, source.state);
                    }
                    report(&best, &slippage);
                    last = Some(best);
                }
            }
        }
    }
}

fn report(best: &TradeSource, slippage: &SlippageTolerance) {
    match (&best.state, &best.trade) {
        (TradeState::Valid, Some(trade)) => {
            info!("🏆 Best trade: {}", trade);
            match trade.trade_type() {
                TradeType::ExactInput => {
                    info!("   minimum received: {} (slippage {}%)", trade.minimum_amount_out(slippage), slippage.as_percent())
                }
                TradeType::ExactOutput => {
                    info!("   maximum sold: {} (slippage {}%)", trade.maximum_amount_in(slippage), slippage.as_percent())
                }
            }
            if let Some(fee) = trade.swap_fee() {
                info!("   partner fee: {} bps", fee.bps);
            }
        }
        (TradeState::Loading, _) => info!("⏳ Fetching best price..."),
        (TradeState::Stale, _) => warn!("⌛ Quote is stale, refreshing"),
        (TradeState::NoRouteFound, _) => warn!("🚫 No route found"),
        _ => warn!("⚠️ Enter a valid swap"),
    }
}
