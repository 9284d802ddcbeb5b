use super::{QuerySnapshot, TradeSource};

/// 워커 스냅샷을 `TradeSource` 로 변환
///
/// 1. 워커가 아직 현재 세대의 입력을 받지 못함 ⇒ `Stale`
/// 2. 요청이 구조적으로 건너뛰어짐 ⇒ `Invalid`
/// 3. 현재 세대의 첫 조회가 진행 중 ⇒ `Loading`
/// 4. 에러 또는 빈 응답 ⇒ `NoRouteFound`
/// 5. 그 외 ⇒ `Valid`
///
/// 응답의 나이는 보지 않는다. 입력이 그대로면 폴링하지 않는 공급자의 견적도 유효하다.
pub fn derive_trade_source(snapshot: &QuerySnapshot, current_generation: u64) -> TradeSource {
    if snapshot.generation < current_generation {
        return TradeSource::stale();
    }
    if snapshot.skipped.is_some() {
        return TradeSource::invalid();
    }
    if snapshot.is_loading {
        return TradeSource::loading();
    }
    if snapshot.error.is_some() {
        return TradeSource::no_route();
    }
    match snapshot.data.clone() {
        Some(trade) => TradeSource::valid(trade),
        None => TradeSource::no_route(),
    }
}
