use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::{now_ts, Direction, Side, Ts};

/// A single position as reported by the exchange (§6 "Positions cache").
#[derive(Debug, Clone, Copy, Default)]
pub struct Position {
    pub shares: Decimal,
    pub open_notional: Decimal,
}

/// Order status as reported by the exchange, normalized past the
/// case-insensitive field aliasing spec.md calls out for §6 ("orderID"
/// vs "orderId", arbitrary-case status strings, `matched_size`/`remaining_size`
/// aliases). `remaining_size` is legitimately absent when the exchange's
/// response doesn't carry that alias at all.
#[derive(Debug, Clone)]
pub struct OrderStatus {
    pub order_id: String,
    pub status: String,
    pub matched_size: Decimal,
    pub remaining_size: Option<Decimal>,
}

impl OrderStatus {
    /// Closed set of substrings that mark an order as done, matched
    /// case-insensitively against whatever casing the exchange returns (§4.4).
    const TERMINAL_MARKERS: [&'static str; 8] = [
        "FILLED",
        "CANCELLED",
        "CANCELED",
        "EXPIRED",
        "REJECTED",
        "FAILED",
        "DONE",
        "CLOSED",
    ];

    /// True when the reported `remaining_size` is exactly zero, or the
    /// status string itself marks the order done. The companion
    /// `matched >= requestedSize` branch from §4.4 needs the order's
    /// requested size, which this type doesn't carry — see
    /// `order_manager::reconcile_status`.
    pub fn is_terminal(&self) -> bool {
        if self.remaining_size == Some(Decimal::ZERO) {
            return true;
        }
        let upper = self.status.to_uppercase();
        Self::TERMINAL_MARKERS.iter().any(|m| upper.contains(m))
    }
}

/// External order-placement/cancellation/position surface the core consumes
/// without caring whether it's talking to a paper broker or a live exchange
/// (§6, grounded on the teacher's `paper_broker.rs` shape and the
/// `polymarket-hft` CLOB client's method names).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn place_limit(
        &self,
        token_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<String, CoreError>;

    async fn cancel(&self, order_id: &str) -> Result<(), CoreError>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, CoreError>;

    async fn get_tick_size(&self, token_id: &str) -> Result<Decimal, CoreError>;

    async fn get_positions(&self) -> Result<HashMap<String, Position>, CoreError>;
}

#[derive(Debug, Clone)]
struct SimOrder {
    token_id: String,
    side: Side,
    price: Decimal,
    size: Decimal,
    matched: Decimal,
    placed_at: Ts,
    status: String,
}

/// Simulated executor used by the runnable binary and by tests, grounded on
/// `paper_broker.rs`'s Poisson fill-intensity model: an order resting at a
/// competitive price accumulates fill probability over time rather than
/// filling instantly or never.
pub struct PaperExecutor {
    orders: RwLock<HashMap<String, SimOrder>>,
    tick_sizes: RwLock<HashMap<String, Decimal>>,
    positions: RwLock<HashMap<String, Position>>,
    default_tick: Decimal,
    fill_rate_per_sec: f64,
}

impl PaperExecutor {
    pub fn new(default_tick: Decimal) -> Arc<Self> {
        Arc::new(Self {
            orders: RwLock::new(HashMap::new()),
            tick_sizes: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            default_tick,
            fill_rate_per_sec: 0.05,
        })
    }

    pub fn set_tick_size(&self, token_id: &str, tick: Decimal) {
        self.tick_sizes.write().insert(token_id.to_string(), tick);
    }

    /// Advances the simulated clock for every resting order, drawing a
    /// Poisson-distributed number of fill "ticks" and applying partial fills.
    /// Exposed so tests can deterministically drive fills instead of sleeping.
    pub fn advance(&self, elapsed: Duration) {
        let lambda = (self.fill_rate_per_sec * elapsed.as_secs_f64()).max(1e-9);
        let poisson = match Poisson::new(lambda) {
            Ok(p) => p,
            Err(_) => return,
        };
        let mut rng = rand::rng();
        let mut orders = self.orders.write();
        let mut positions = self.positions.write();
        for order in orders.values_mut() {
            if order.status != "LIVE" {
                continue;
            }
            let events: u64 = poisson.sample(&mut rng) as u64;
            if events == 0 {
                continue;
            }
            let remaining = order.size - order.matched;
            if remaining <= Decimal::ZERO {
                continue;
            }
            let step = (order.size / Decimal::new(10, 0)).max(Decimal::new(1, 2));
            let fill = (step * Decimal::from(events.min(10))).min(remaining);
            if fill <= Decimal::ZERO {
                continue;
            }
            order.matched += fill;
            let pos = positions.entry(order.token_id.clone()).or_default();
            match order.side {
                Side::Buy => {
                    pos.shares += fill;
                    pos.open_notional += fill * order.price;
                }
                Side::Sell => {
                    pos.shares -= fill;
                    pos.open_notional -= fill * order.price;
                }
            }
            if order.matched >= order.size {
                order.status = "FILLED".to_string();
            }
        }
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn place_limit(
        &self,
        token_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<String, CoreError> {
        if price <= Decimal::ZERO || price >= Decimal::ONE {
            return Err(CoreError::RejectedOrder(format!("price out of range: {price}")));
        }
        if size <= Decimal::ZERO {
            return Err(CoreError::RejectedOrder(format!("non-positive size: {size}")));
        }
        let order_id = Uuid::new_v4().to_string();
        self.orders.write().insert(
            order_id.clone(),
            SimOrder {
                token_id: token_id.to_string(),
                side,
                price,
                size,
                matched: Decimal::ZERO,
                placed_at: now_ts(),
                status: "LIVE".to_string(),
            },
        );
        Ok(order_id)
    }

    async fn cancel(&self, order_id: &str) -> Result<(), CoreError> {
        let mut orders = self.orders.write();
        match orders.get_mut(order_id) {
            Some(o) if o.status == "LIVE" => {
                o.status = "CANCELLED".to_string();
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(CoreError::RejectedOrder(format!("unknown order {order_id}"))),
        }
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, CoreError> {
        let orders = self.orders.read();
        let o = orders
            .get(order_id)
            .ok_or_else(|| CoreError::RejectedOrder(format!("unknown order {order_id}")))?;
        Ok(OrderStatus {
            order_id: order_id.to_string(),
            status: o.status.clone(),
            matched_size: o.matched,
            remaining_size: Some((o.size - o.matched).max(Decimal::ZERO)),
        })
    }

    async fn get_tick_size(&self, token_id: &str) -> Result<Decimal, CoreError> {
        Ok(self
            .tick_sizes
            .read()
            .get(token_id)
            .copied()
            .unwrap_or(self.default_tick))
    }

    async fn get_positions(&self) -> Result<HashMap<String, Position>, CoreError> {
        Ok(self.positions.read().clone())
    }
}

/// Maker-only guard used by the quote calculator: reject placing a resting
/// order that would cross the book (§8 invariant 5).
pub fn would_cross(side: Side, price: Decimal, best_bid: Option<Decimal>, best_ask: Option<Decimal>) -> bool {
    match side {
        Side::Buy => best_ask.is_some_and(|a| price >= a),
        Side::Sell => best_bid.is_some_and(|b| price <= b),
    }
}

/// Maps a `Direction` to the side used for entering a long position in that
/// outcome token — this core only ever goes long each side of the pair (§2).
pub fn entry_side(_direction: Direction) -> Side {
    Side::Buy
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn place_then_cancel() {
        let exec = PaperExecutor::new(dec!(0.01));
        let id = exec.place_limit("tok1", Side::Buy, dec!(0.45), dec!(10)).await.unwrap();
        exec.cancel(&id).await.unwrap();
        let status = exec.get_order_status(&id).await.unwrap();
        assert!(status.is_terminal());
    }

    #[tokio::test]
    async fn rejects_price_out_of_range() {
        let exec = PaperExecutor::new(dec!(0.01));
        let err = exec.place_limit("tok1", Side::Buy, dec!(1.00), dec!(10)).await;
        assert!(err.is_err());
    }

    #[test]
    fn terminal_status_is_case_insensitive() {
        let s = OrderStatus {
            order_id: "x".into(),
            status: "closed".into(),
            matched_size: Decimal::ZERO,
            remaining_size: None,
        };
        assert!(s.is_terminal());
    }

    #[test]
    fn zero_remaining_is_terminal_regardless_of_status_string() {
        let s = OrderStatus {
            order_id: "x".into(),
            status: "LIVE".into(),
            matched_size: dec!(10),
            remaining_size: Some(Decimal::ZERO),
        };
        assert!(s.is_terminal());
    }

    #[test]
    fn live_status_is_not_terminal() {
        let s = OrderStatus {
            order_id: "x".into(),
            status: "LIVE".into(),
            matched_size: Decimal::ZERO,
            remaining_size: Some(dec!(10)),
        };
        assert!(!s.is_terminal());
    }

    #[test]
    fn would_cross_detects_marketable_buy() {
        assert!(would_cross(Side::Buy, dec!(0.51), Some(dec!(0.45)), Some(dec!(0.50))));
        assert!(!would_cross(Side::Buy, dec!(0.49), Some(dec!(0.45)), Some(dec!(0.50))));
    }
}
