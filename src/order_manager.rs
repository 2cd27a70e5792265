use std::collections::HashMap;

use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::executor::{Executor, OrderStatus};
use crate::types::{now_ts, Direction, OrderState, Side, Ts};

/// Read-through cache in front of `Executor::get_tick_size`, TTL'd per §5
/// ("10-minute TTL") since tick sizes change rarely and a call on every
/// tick would be wasted executor traffic. Not named as its own struct in
/// the component list, so it lives here as a small private-ish helper,
/// grounded on the teacher's habit of small inline caches (`FeedState`).
pub struct TickSizeCache {
    entries: RwLock<HashMap<String, (Decimal, Ts)>>,
    ttl_secs: f64,
}

impl TickSizeCache {
    pub fn new(ttl_secs: f64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    pub async fn get(&self, executor: &dyn Executor, token_id: &str, now: Ts) -> Result<Decimal, CoreError> {
        if let Some((tick, fetched_at)) = self.entries.read().get(token_id).copied() {
            if now - fetched_at < self.ttl_secs {
                return Ok(tick);
            }
        }
        let tick = executor.get_tick_size(token_id).await?;
        self.entries.write().insert(token_id.to_string(), (tick, now));
        Ok(tick)
    }
}

/// Result of reconciling a resting order's exchange-reported status against
/// what the core last knew (§4.4). `newly_filled` is always >= 0 even if
/// the exchange's matched-size figure briefly regresses (treated as 0, not
/// negative, since a shrinking fill count can only be a reporting glitch).
#[derive(Debug, Clone, Copy)]
pub struct FillDelta {
    pub newly_filled: Decimal,
    pub is_terminal: bool,
}

pub fn reconcile_status(order: &OrderState, status: &OrderStatus) -> FillDelta {
    let newly_filled = (status.matched_size - order.matched_size).max(Decimal::ZERO);
    let is_terminal = status.is_terminal() || status.matched_size >= order.size;
    FillDelta { newly_filled, is_terminal }
}

/// An order is stale once it's rested longer than the timeout with no
/// terminal status reachable (§4.4, 300s default) — the core gives up
/// waiting on the exchange and force-cancels rather than quoting forever
/// against an order it can no longer account for.
pub fn is_stale(order: &OrderState, now: Ts, timeout_secs: f64) -> bool {
    order.age_secs(now) > timeout_secs
}

pub async fn place_order(
    executor: &dyn Executor,
    market_slug: &str,
    token_id: &str,
    direction: Direction,
    price: Decimal,
    size: Decimal,
    seconds_to_end: f64,
) -> Result<OrderState, CoreError> {
    let order_id = executor.place_limit(token_id, Side::Buy, price, size).await?;
    let now = now_ts();
    Ok(OrderState {
        order_id,
        market_slug: market_slug.to_string(),
        token_id: token_id.to_string(),
        direction,
        price,
        size,
        placed_at: now,
        matched_size: Decimal::ZERO,
        last_status_check_at: now,
        seconds_to_end_at_entry: seconds_to_end,
    })
}

pub async fn cancel_order(executor: &dyn Executor, order: &OrderState) -> Result<(), CoreError> {
    executor.cancel(&order.order_id).await
}

/// Whether a resting order should be replaced, and why (§4.4). Only called
/// once the `minReplaceMillis` guard has already passed — that rate limit
/// lives in the strategy engine, not here, since it depends on wall-clock
/// state the order manager doesn't own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceDecision {
    Keep,
    ReplacePrice,
    ReplaceSize,
    ReplacePriceAndSize,
}

pub fn decide_replace(order: &OrderState, desired_price: Decimal, desired_size: Decimal, tick: Decimal) -> ReplaceDecision {
    let price_changed = (order.price - desired_price).abs() >= tick;
    // A meaningful size change is one that isn't just accounting for partial
    // fill already reflected in `matched_size`.
    let size_changed = (order.remaining() - desired_size).abs() >= Decimal::new(1, 2);

    match (price_changed, size_changed) {
        (true, true) => ReplaceDecision::ReplacePriceAndSize,
        (true, false) => ReplaceDecision::ReplacePrice,
        (false, true) => ReplaceDecision::ReplaceSize,
        (false, false) => ReplaceDecision::Keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::PaperExecutor;
    use rust_decimal_macros::dec;

    fn base_order() -> OrderState {
        OrderState {
            order_id: "o1".into(),
            market_slug: "s".into(),
            token_id: "t".into(),
            direction: Direction::Up,
            price: dec!(0.40),
            size: dec!(10),
            placed_at: 0.0,
            matched_size: dec!(2),
            last_status_check_at: 0.0,
            seconds_to_end_at_entry: 500.0,
        }
    }

    #[test]
    fn reconcile_status_computes_nonnegative_delta() {
        let order = base_order();
        let status = OrderStatus {
            order_id: "o1".into(),
            status: "LIVE".into(),
            matched_size: dec!(5),
            remaining_size: Some(dec!(5)),
        };
        let delta = reconcile_status(&order, &status);
        assert_eq!(delta.newly_filled, dec!(3));
        assert!(!delta.is_terminal);
    }

    #[test]
    fn reconcile_status_clamps_regression_to_zero() {
        let order = base_order();
        let status = OrderStatus {
            order_id: "o1".into(),
            status: "LIVE".into(),
            matched_size: dec!(1),
            remaining_size: Some(dec!(9)),
        };
        assert_eq!(reconcile_status(&order, &status).newly_filled, Decimal::ZERO);
    }

    #[test]
    fn reconcile_status_is_terminal_when_matched_reaches_requested_size() {
        let order = base_order();
        let status = OrderStatus {
            order_id: "o1".into(),
            status: "LIVE".into(),
            matched_size: order.size,
            remaining_size: None,
        };
        assert!(reconcile_status(&order, &status).is_terminal);
    }

    #[test]
    fn staleness_boundary() {
        let order = base_order();
        assert!(!is_stale(&order, 300.0, 300.0));
        assert!(is_stale(&order, 300.01, 300.0));
    }

    #[test]
    fn decide_replace_detects_price_only() {
        let order = base_order();
        let decision = decide_replace(&order, dec!(0.42), order.remaining(), dec!(0.01));
        assert_eq!(decision, ReplaceDecision::ReplacePrice);
    }

    #[test]
    fn decide_replace_keeps_within_tick_tolerance() {
        let order = base_order();
        let decision = decide_replace(&order, order.price, order.remaining(), dec!(0.01));
        assert_eq!(decision, ReplaceDecision::Keep);
    }

    #[tokio::test]
    async fn tick_size_cache_serves_cached_value_within_ttl() {
        let exec = PaperExecutor::new(dec!(0.01));
        exec.set_tick_size("tok1", dec!(0.02));
        let cache = TickSizeCache::new(600.0);
        let a = cache.get(&*exec, "tok1", 0.0).await.unwrap();
        exec.set_tick_size("tok1", dec!(0.05));
        let b = cache.get(&*exec, "tok1", 10.0).await.unwrap();
        assert_eq!(a, b, "cached value should be served within TTL");
    }

    #[tokio::test]
    async fn tick_size_cache_refreshes_after_ttl() {
        let exec = PaperExecutor::new(dec!(0.01));
        exec.set_tick_size("tok1", dec!(0.02));
        let cache = TickSizeCache::new(5.0);
        cache.get(&*exec, "tok1", 0.0).await.unwrap();
        exec.set_tick_size("tok1", dec!(0.05));
        let refreshed = cache.get(&*exec, "tok1", 10.0).await.unwrap();
        assert_eq!(refreshed, dec!(0.05));
    }
}
