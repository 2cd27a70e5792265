use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::types::{now_ts, Direction, Ts};

/// Per-market share/fill bookkeeping the quote calculator reads for skew and
/// top-up decisions (§3, §4.2). Grounded on `paper_broker.rs`'s `Position` +
/// `apply_fill`, generalized to track both legs of the UP/DOWN pair and the
/// fast-top-up cooldown fields §4.3 needs.
#[derive(Debug, Clone, Default)]
pub struct MarketInventory {
    pub up_shares: Decimal,
    pub down_shares: Decimal,
    pub last_up_fill_at: Option<Ts>,
    pub last_down_fill_at: Option<Ts>,
    pub last_up_fill_price: Option<Decimal>,
    pub last_down_fill_price: Option<Decimal>,
    pub last_top_up_at: Option<Ts>,
}

impl MarketInventory {
    pub fn shares(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Up => self.up_shares,
            Direction::Down => self.down_shares,
        }
    }

    pub fn last_fill_at(&self, direction: Direction) -> Option<Ts> {
        match direction {
            Direction::Up => self.last_up_fill_at,
            Direction::Down => self.last_down_fill_at,
        }
    }

    pub fn last_fill_price(&self, direction: Direction) -> Option<Decimal> {
        match direction {
            Direction::Up => self.last_up_fill_price,
            Direction::Down => self.last_down_fill_price,
        }
    }

    /// Applies a fill, asserting non-negative resulting share counts
    /// (§8 invariant: inventory is never negative — this core only opens
    /// long positions, never shorts).
    pub fn apply_fill(&mut self, direction: Direction, filled_shares: Decimal, price: Decimal, at: Ts) {
        debug_assert!(filled_shares >= Decimal::ZERO, "fills are never negative");
        match direction {
            Direction::Up => {
                self.up_shares += filled_shares;
                self.last_up_fill_at = Some(at);
                self.last_up_fill_price = Some(price);
            }
            Direction::Down => {
                self.down_shares += filled_shares;
                self.last_down_fill_at = Some(at);
                self.last_down_fill_price = Some(price);
            }
        }
    }

    pub fn mark_top_up(&mut self, at: Ts) {
        self.last_top_up_at = Some(at);
    }

    pub fn seconds_since_top_up(&self, now: Ts) -> Option<f64> {
        self.last_top_up_at.map(|t| now - t)
    }

    /// Signed imbalance (UP minus DOWN) in shares, the raw input to skew and
    /// top-up decisions (§4.2). Positive means UP-heavy.
    pub fn imbalance_shares(&self) -> Decimal {
        self.up_shares - self.down_shares
    }

    /// Fraction of the larger leg represented by the smaller leg; `None` when
    /// both legs are empty (no exposure to balance).
    pub fn balance_ratio(&self) -> Option<Decimal> {
        let larger = self.up_shares.max(self.down_shares);
        if larger <= Decimal::ZERO {
            return None;
        }
        let smaller = self.up_shares.min(self.down_shares);
        Some(smaller / larger)
    }

    /// The thin leg — the side that needs topping up to approach a complete
    /// set. `None` when both legs are equal (already balanced).
    pub fn thin_leg(&self) -> Option<Direction> {
        use std::cmp::Ordering;
        match self.up_shares.cmp(&self.down_shares) {
            Ordering::Less => Some(Direction::Up),
            Ordering::Greater => Some(Direction::Down),
            Ordering::Equal => None,
        }
    }

    pub fn seconds_since_last_fill(&self, direction: Direction, now: Ts) -> Option<f64> {
        self.last_fill_at(direction).map(|t| now - t)
    }
}

/// Keyed by market slug; one `MarketInventory` per market, the shape the
/// strategy engine iterates every tick (§4.3).
pub type InventoryStore = HashMap<String, MarketInventory>;

pub fn touch<'a>(store: &'a mut InventoryStore, slug: &str) -> &'a mut MarketInventory {
    store.entry(slug.to_string()).or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn apply_fill_updates_shares_and_fill_metadata() {
        let mut inv = MarketInventory::default();
        inv.apply_fill(Direction::Up, dec!(5), dec!(0.42), 100.0);
        assert_eq!(inv.up_shares, dec!(5));
        assert_eq!(inv.last_up_fill_at, Some(100.0));
        assert_eq!(inv.last_up_fill_price, Some(dec!(0.42)));
        assert_eq!(inv.down_shares, Decimal::ZERO);
    }

    #[test]
    fn imbalance_and_thin_leg() {
        let mut inv = MarketInventory::default();
        inv.apply_fill(Direction::Up, dec!(10), dec!(0.4), now_ts());
        inv.apply_fill(Direction::Down, dec!(4), dec!(0.5), now_ts());
        assert_eq!(inv.imbalance_shares(), dec!(6));
        assert_eq!(inv.thin_leg(), Some(Direction::Down));
    }

    #[test]
    fn balance_ratio_none_when_empty() {
        let inv = MarketInventory::default();
        assert_eq!(inv.balance_ratio(), None);
        assert_eq!(inv.thin_leg(), None);
    }

    #[test]
    fn balance_ratio_full_when_even() {
        let mut inv = MarketInventory::default();
        inv.apply_fill(Direction::Up, dec!(5), dec!(0.4), 0.0);
        inv.apply_fill(Direction::Down, dec!(5), dec!(0.6), 0.0);
        assert_eq!(inv.balance_ratio(), Some(Decimal::ONE));
    }
}
