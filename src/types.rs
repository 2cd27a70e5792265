use std::time::{SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Wall-clock seconds since the epoch, `f64` so callers can do plain arithmetic
/// with it the way the teacher's `now_ts()` does, but kept in its own newtype so
/// "a price" and "a timestamp" can never be swapped by accident.
pub type Ts = f64;

pub fn now_ts() -> Ts {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketType {
    FifteenMin,
    OneHour,
}

impl MarketType {
    pub fn lifetime_secs(self) -> f64 {
        match self {
            MarketType::FifteenMin => 900.0,
            MarketType::OneHour => 3600.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarketType::FifteenMin => "15m",
            MarketType::OneHour => "1h",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }

    pub fn other(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Gtc,
    Fok,
}

/// Identity of a single UP/DOWN market. Immutable once discovered (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub slug: String,
    pub up_token_id: String,
    pub down_token_id: String,
    pub end_time: Ts,
    pub market_type: MarketType,
}

impl Market {
    pub fn token_id(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up_token_id,
            Direction::Down => &self.down_token_id,
        }
    }

    pub fn seconds_to_end(&self, now: Ts) -> f64 {
        self.end_time - now
    }
}

/// Top-of-book for one outcome token (§3). Missing sides are legitimately
/// absent, never a sentinel zero.
#[derive(Debug, Clone, Copy)]
pub struct TopOfBook {
    pub best_bid: Option<Decimal>,
    pub best_bid_size: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub best_ask_size: Option<Decimal>,
    pub updated_at: Ts,
}

impl TopOfBook {
    pub const STALE_AFTER_SECS: f64 = 2.0;

    pub fn is_stale(&self, now: Ts) -> bool {
        now - self.updated_at > Self::STALE_AFTER_SECS
    }

    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(b), Some(a)) if a > b => Some((a + b) / Decimal::TWO),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(b), Some(a)) if a > b => Some(a - b),
            _ => None,
        }
    }

    /// A book is tradeable when both sides are present and non-crossed.
    pub fn is_valid(&self) -> bool {
        matches!((self.best_bid, self.best_ask), (Some(b), Some(a)) if a > b)
    }
}

/// Single working order on one leg (§3). One `OrderState` per `tokenId` at a time.
#[derive(Debug, Clone)]
pub struct OrderState {
    pub order_id: String,
    pub market_slug: String,
    pub token_id: String,
    pub direction: Direction,
    pub price: Decimal,
    pub size: Decimal,
    pub placed_at: Ts,
    pub matched_size: Decimal,
    pub last_status_check_at: Ts,
    pub seconds_to_end_at_entry: f64,
}

impl OrderState {
    pub fn age_secs(&self, now: Ts) -> f64 {
        (now - self.placed_at).max(0.0)
    }

    pub fn remaining(&self) -> Decimal {
        (self.size - self.matched_size).max(Decimal::ZERO)
    }
}

/// Reasons a lifecycle event was emitted (§9 "Tagged events" — closed enumeration).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Quote,
    Replace,
    TopUp,
    FastTopUp,
    Taker,
    BookStale,
    OutsideTimeWindow,
    OutsideLifetime,
    ReplacePrice,
    ReplaceSize,
    ReplacePriceAndSize,
    StaleTimeout,
    Shutdown,
    InsufficientEdge,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::Quote => "QUOTE",
            Reason::Replace => "REPLACE",
            Reason::TopUp => "TOP_UP",
            Reason::FastTopUp => "FAST_TOP_UP",
            Reason::Taker => "TAKER",
            Reason::BookStale => "BOOK_STALE",
            Reason::OutsideTimeWindow => "OUTSIDE_TIME_WINDOW",
            Reason::OutsideLifetime => "OUTSIDE_LIFETIME",
            Reason::ReplacePrice => "REPLACE_PRICE",
            Reason::ReplaceSize => "REPLACE_SIZE",
            Reason::ReplacePriceAndSize => "REPLACE_PRICE_AND_SIZE",
            Reason::StaleTimeout => "STALE_TIMEOUT",
            Reason::Shutdown => "SHUTDOWN",
            Reason::InsufficientEdge => "INSUFFICIENT_EDGE",
        }
    }

    /// Maker-only invariant (§8, invariant 5): every reason except these three
    /// must quote strictly inside the touch.
    pub fn is_taker_class(self) -> bool {
        matches!(self, Reason::TopUp | Reason::FastTopUp | Reason::Taker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tob_mid_requires_non_crossed_book() {
        let tob = TopOfBook {
            best_bid: Some(dec!(0.50)),
            best_bid_size: None,
            best_ask: Some(dec!(0.50)),
            best_ask_size: None,
            updated_at: 0.0,
        };
        assert!(!tob.is_valid());
        assert_eq!(tob.mid(), None);
    }

    #[test]
    fn tob_staleness_boundary() {
        let tob = TopOfBook {
            best_bid: Some(dec!(0.4)),
            best_bid_size: None,
            best_ask: Some(dec!(0.5)),
            best_ask_size: None,
            updated_at: 100.0,
        };
        assert!(!tob.is_stale(101.9));
        assert!(tob.is_stale(102.1));
    }

    #[test]
    fn reason_taker_class() {
        assert!(Reason::TopUp.is_taker_class());
        assert!(Reason::FastTopUp.is_taker_class());
        assert!(Reason::Taker.is_taker_class());
        assert!(!Reason::Quote.is_taker_class());
        assert!(!Reason::Replace.is_taker_class());
    }
}
