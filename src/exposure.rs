use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::positions::PositionsCache;
use crate::types::OrderState;

/// Running total of capital committed across the book: resting orders
/// (price times remaining unfilled size) plus confirmed and unbooked
/// position notional (§4.4, §6). Grounded on `risk_engine.rs`'s guardrail
/// style — a cheap, non-scanning accumulator the strategy engine consults
/// before every new placement rather than a periodic audit.
///
/// `currentExposure = Σ(openOrders: price · remainingShares) + positionsCache.totalOpenNotional`
pub fn current_exposure(open_orders: &HashMap<String, OrderState>, positions: &PositionsCache) -> Decimal {
    let resting: Decimal = open_orders.values().map(|o| o.price * o.remaining()).sum();
    resting + positions.total_open_notional()
}

/// Exposure an order of `price * size` would add if placed, for a
/// would-this-fit check before calling the executor.
pub fn projected_exposure(current: Decimal, price: Decimal, size: Decimal) -> Decimal {
    current + price * size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use rust_decimal_macros::dec;

    fn order(price: Decimal, size: Decimal, matched: Decimal) -> OrderState {
        OrderState {
            order_id: "o1".into(),
            market_slug: "s".into(),
            token_id: "t".into(),
            direction: Direction::Up,
            price,
            size,
            placed_at: 0.0,
            matched_size: matched,
            last_status_check_at: 0.0,
            seconds_to_end_at_entry: 100.0,
        }
    }

    #[test]
    fn sums_resting_orders_by_remaining_size() {
        let mut orders = HashMap::new();
        orders.insert("o1".to_string(), order(dec!(0.40), dec!(10), dec!(4)));
        let positions = PositionsCache::default();
        // remaining = 6, notional = 2.4
        assert_eq!(current_exposure(&orders, &positions), dec!(2.4));
    }

    #[test]
    fn includes_positions_cache_total() {
        let orders = HashMap::new();
        let mut positions = PositionsCache::default();
        positions.record_unbooked_fill(dec!(15));
        assert_eq!(current_exposure(&orders, &positions), dec!(15));
    }

    #[test]
    fn projected_exposure_adds_candidate_order() {
        assert_eq!(projected_exposure(dec!(10), dec!(0.5), dec!(4)), dec!(12));
    }
}
