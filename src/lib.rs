// xSwap quote aggregation library

pub mod config;
pub mod constants;
pub mod dex;
pub mod mocks;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use dex::{
    quote_once, select_best_trade, SwapDispatcher, Trade, TradeAggregator, TradeSource, TradeState,
};
pub use types::{Currency, CurrencyAmount, SlippageTolerance, SwapContext, TradeType};
