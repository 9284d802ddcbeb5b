use tracing::error;

use super::{Trade, TradeSource, TradeState};
use crate::types::TradeType;

/// 호출 측 배선이 잘못됐을 때만 발생하는 선택 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Cannot compare trades of different types: {first} vs {second}")]
    MixedTradeTypes { first: TradeType, second: TradeType },

    #[error("Unhandled trade state set ({0} sources)")]
    Unhandled(usize),
}

/// 여러 공급자의 `TradeSource` 중 하나를 결정적으로 고른다
///
/// 입력 순서가 곧 등록 순서이며 동률이면 앞선 공급자가 이긴다.
pub fn select_best_trade(sources: &[TradeSource]) -> Result<TradeSource, SelectionError> {
    if let Some(loading) = first_in_state(sources, TradeState::Loading) {
        return Ok(loading.clone());
    }

    let with_trade: Vec<(&TradeSource, &Trade)> = sources
        .iter()
        .filter_map(|source| source.trade.as_ref().map(|trade| (source, trade)))
        .collect();

    match with_trade.as_slice() {
        [] => {
            let fallback = first_in_state(sources, TradeState::Stale)
                .or_else(|| first_in_state(sources, TradeState::NoRouteFound))
                .or_else(|| first_in_state(sources, TradeState::Invalid));
            match fallback {
                Some(source) => Ok(source.clone()),
                None => {
                    error!("❌ No trade source could be selected from {} sources", sources.len());
                    Err(SelectionError::Unhandled(sources.len()))
                }
            }
        }
        [(only, _)] => Ok((**only).clone()),
        [(first, first_trade), rest @ ..] => {
            let mut best: (&TradeSource, &Trade) = (*first, *first_trade);
            for &(candidate, trade) in rest {
                if is_better(trade, best.1)? {
                    best = (candidate, trade);
                }
            }
            Ok(best.0.clone())
        }
    }
}

/// `candidate` 가 `incumbent` 보다 엄밀히 나은지
fn is_better(candidate: &Trade, incumbent: &Trade) -> Result<bool, SelectionError> {
    let (first, second) = (incumbent.trade_type(), candidate.trade_type());
    if first != second {
        error!("❌ Mixed trade types among quotes: {} vs {}", first, second);
        return Err(SelectionError::MixedTradeTypes { first, second });
    }

    Ok(match first {
        TradeType::ExactInput => candidate.output_amount().raw > incumbent.output_amount().raw,
        TradeType::ExactOutput => candidate.input_amount().raw < incumbent.input_amount().raw,
    })
}

fn first_in_state(sources: &[TradeSource], state: TradeState) -> Option<&TradeSource> {
    sources.iter().find(|source| source.state == state)
}
