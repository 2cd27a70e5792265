use std::env;

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{MarketType, Ts};

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        None => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
    }
}

fn get_env_decimal(key: &str, default: Decimal) -> Result<Decimal> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => v
            .parse::<Decimal>()
            .map_err(|e| anyhow!("{key} invalid decimal: {e}")),
    }
}

fn get_env_f64(key: &str, default: f64) -> Result<f64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => v.parse::<f64>().map_err(|e| anyhow!("{key} invalid float: {e}")),
    }
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => v.parse::<usize>().map_err(|e| anyhow!("{key} invalid int: {e}")),
    }
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => v.parse::<u64>().map_err(|e| anyhow!("{key} invalid int: {e}")),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

/// Statically-seeded market, merged with the discovered set (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedMarket {
    pub slug: String,
    pub up_token_id: String,
    pub down_token_id: String,
    /// ISO-8601 end time.
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub enabled: bool,

    // Timing
    pub refresh_millis: u64,
    pub min_replace_millis: u64,
    pub min_seconds_to_end: i64,
    pub max_seconds_to_end: i64,
    pub market_refresh_secs: u64,
    pub positions_refresh_secs: f64,
    pub tick_size_ttl_secs: f64,
    pub order_status_poll_secs: f64,
    pub order_stale_timeout_secs: f64,

    // Sizing fallbacks
    pub quote_size: Decimal,
    pub quote_size_bankroll_fraction: Decimal,

    // Bankroll / caps
    pub bankroll_usd: Decimal,
    pub max_order_bankroll_fraction: Decimal,
    pub max_total_bankroll_fraction: Decimal,
    pub max_order_notional_usd: Decimal,

    // Quote calculator
    pub improve_ticks: i32,
    pub complete_set_min_edge: Decimal,
    pub complete_set_max_skew_ticks: i32,
    pub complete_set_imbalance_shares_for_max_skew: Decimal,

    // Top-up
    pub complete_set_top_up_enabled: bool,
    pub complete_set_top_up_seconds_to_end: f64,
    pub complete_set_top_up_min_shares: Decimal,

    pub complete_set_fast_top_up_enabled: bool,
    pub fast_top_up_min_shares: Decimal,
    pub fast_top_up_min_seconds_after_fill: f64,
    pub fast_top_up_max_seconds_after_fill: f64,
    pub fast_top_up_cooldown_millis: u64,
    pub fast_top_up_min_edge: Decimal,

    // Directional bias
    pub directional_bias_enabled: bool,
    pub directional_bias_factor: Decimal,
    pub imbalance_threshold: Decimal,

    // Taker guard
    pub taker_mode_max_spread: Decimal,
    pub taker_mode_enabled: bool,

    // Static seeds (merged with discovered markets)
    pub markets: Vec<SeedMarket>,
}

impl Default for Settings {
    fn default() -> Self {
        // Panics only if a literal default fails to parse, which would be a bug
        // in this file, not a runtime condition.
        Self::load_from(|_| None).expect("default settings must be internally valid")
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(|k| get_env(k))
    }

    /// Parameterized over an environment lookup so tests can load deterministic
    /// settings without touching process environment (teacher loads straight
    /// from `std::env`; we generalize the same shape behind a closure).
    fn load_from(lookup: impl Fn(&str) -> Option<String> + Copy) -> Result<Self> {
        let get = |key: &str| lookup(key);
        let get_bool = |key: &str, default: bool| match get(key) {
            None => default,
            Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
        };
        let get_decimal = |key: &str, default: Decimal| -> Result<Decimal> {
            match get(key) {
                None => Ok(default),
                Some(v) => v.parse::<Decimal>().map_err(|e| anyhow!("{key} invalid decimal: {e}")),
            }
        };
        let get_f64 = |key: &str, default: f64| -> Result<f64> {
            match get(key) {
                None => Ok(default),
                Some(v) => v.parse::<f64>().map_err(|e| anyhow!("{key} invalid float: {e}")),
            }
        };
        let get_u64 = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                None => Ok(default),
                Some(v) => v.parse::<u64>().map_err(|e| anyhow!("{key} invalid int: {e}")),
            }
        };
        let get_i64 = |key: &str, default: i64| -> Result<i64> {
            match get(key) {
                None => Ok(default),
                Some(v) => v.parse::<i64>().map_err(|e| anyhow!("{key} invalid int: {e}")),
            }
        };

        let s = Self {
            enabled: get_bool("ENABLED", true),
            refresh_millis: get_u64("REFRESH_MILLIS", 250)?,
            min_replace_millis: get_u64("MIN_REPLACE_MILLIS", 1_000)?,
            min_seconds_to_end: get_i64("MIN_SECONDS_TO_END", 0)?,
            max_seconds_to_end: get_i64("MAX_SECONDS_TO_END", 3_600)?,
            market_refresh_secs: get_u64("MARKET_REFRESH_SECS", 30)?,
            positions_refresh_secs: get_f64("POSITIONS_REFRESH_SECS", 5.0)?,
            tick_size_ttl_secs: get_f64("TICK_SIZE_TTL_SECS", 600.0)?,
            order_status_poll_secs: get_f64("ORDER_STATUS_POLL_SECS", 1.0)?,
            order_stale_timeout_secs: get_f64("ORDER_STALE_TIMEOUT_SECS", 300.0)?,

            quote_size: get_decimal("QUOTE_SIZE", Decimal::new(10, 0))?,
            quote_size_bankroll_fraction: get_decimal("QUOTE_SIZE_BANKROLL_FRACTION", Decimal::new(1, 2))?,

            bankroll_usd: get_decimal("BANKROLL_USD", Decimal::new(1_000, 0))?,
            max_order_bankroll_fraction: get_decimal("MAX_ORDER_BANKROLL_FRACTION", Decimal::new(1, 1))?,
            max_total_bankroll_fraction: get_decimal("MAX_TOTAL_BANKROLL_FRACTION", Decimal::ONE)?,
            max_order_notional_usd: get_decimal("MAX_ORDER_NOTIONAL_USD", Decimal::new(500, 0))?,

            improve_ticks: get_i64("IMPROVE_TICKS", 1)? as i32,
            complete_set_min_edge: get_decimal("COMPLETE_SET_MIN_EDGE", Decimal::new(1, 2))?,
            complete_set_max_skew_ticks: get_i64("COMPLETE_SET_MAX_SKEW_TICKS", 3)? as i32,
            complete_set_imbalance_shares_for_max_skew: get_decimal(
                "COMPLETE_SET_IMBALANCE_SHARES_FOR_MAX_SKEW",
                Decimal::new(40, 0),
            )?,

            complete_set_top_up_enabled: get_bool("COMPLETE_SET_TOP_UP_ENABLED", true),
            complete_set_top_up_seconds_to_end: get_f64("COMPLETE_SET_TOP_UP_SECONDS_TO_END", 60.0)?,
            complete_set_top_up_min_shares: get_decimal("COMPLETE_SET_TOP_UP_MIN_SHARES", Decimal::new(10, 0))?,

            complete_set_fast_top_up_enabled: get_bool("COMPLETE_SET_FAST_TOP_UP_ENABLED", true),
            fast_top_up_min_shares: get_decimal("FAST_TOP_UP_MIN_SHARES", Decimal::ONE)?,
            fast_top_up_min_seconds_after_fill: get_f64("FAST_TOP_UP_MIN_SECONDS_AFTER_FILL", 2.0)?,
            fast_top_up_max_seconds_after_fill: get_f64("FAST_TOP_UP_MAX_SECONDS_AFTER_FILL", 120.0)?,
            fast_top_up_cooldown_millis: get_u64("FAST_TOP_UP_COOLDOWN_MILLIS", 5_000)?,
            fast_top_up_min_edge: get_decimal("FAST_TOP_UP_MIN_EDGE", Decimal::ZERO)?,

            directional_bias_enabled: get_bool("DIRECTIONAL_BIAS_ENABLED", false),
            directional_bias_factor: get_decimal("DIRECTIONAL_BIAS_FACTOR", Decimal::new(12, 1))?,
            imbalance_threshold: get_decimal("IMBALANCE_THRESHOLD", Decimal::new(2, 1))?,

            taker_mode_max_spread: get_decimal("TAKER_MODE_MAX_SPREAD", Decimal::new(2, 2))?,
            taker_mode_enabled: get_bool("TAKER_MODE_ENABLED", false),

            markets: Vec::new(),
        };

        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_millis < 100 {
            return Err(anyhow!("REFRESH_MILLIS must be >= 100 (got {})", self.refresh_millis));
        }
        if self.max_seconds_to_end < self.min_seconds_to_end {
            return Err(anyhow!("MAX_SECONDS_TO_END must be >= MIN_SECONDS_TO_END"));
        }
        if self.market_refresh_secs < 1 {
            return Err(anyhow!("MARKET_REFRESH_SECS must be >= 1"));
        }
        if self.bankroll_usd <= Decimal::ZERO {
            return Err(anyhow!("BANKROLL_USD must be > 0"));
        }
        for (name, frac) in [
            ("MAX_ORDER_BANKROLL_FRACTION", self.max_order_bankroll_fraction),
            ("MAX_TOTAL_BANKROLL_FRACTION", self.max_total_bankroll_fraction),
            ("QUOTE_SIZE_BANKROLL_FRACTION", self.quote_size_bankroll_fraction),
            ("IMBALANCE_THRESHOLD", self.imbalance_threshold),
            ("COMPLETE_SET_MIN_EDGE", self.complete_set_min_edge),
        ] {
            if frac < Decimal::ZERO || frac > Decimal::ONE {
                return Err(anyhow!("{name} must be within [0,1] (got {frac})"));
            }
        }
        if self.directional_bias_factor < Decimal::ONE {
            return Err(anyhow!("DIRECTIONAL_BIAS_FACTOR must be >= 1"));
        }
        if self.complete_set_max_skew_ticks < 0 {
            return Err(anyhow!("COMPLETE_SET_MAX_SKEW_TICKS must be >= 0"));
        }
        Ok(())
    }

    pub fn evaluation_period_millis(&self) -> u64 {
        self.refresh_millis.max(100)
    }

    pub fn market_lifetime_secs(market_type: MarketType) -> f64 {
        market_type.lifetime_secs()
    }

    pub fn within_time_window(&self, seconds_to_end: f64) -> bool {
        seconds_to_end >= self.min_seconds_to_end as f64 && seconds_to_end <= self.max_seconds_to_end as f64
    }

    pub fn within_lifetime(&self, seconds_to_end: f64, market_type: MarketType) -> bool {
        seconds_to_end >= 0.0 && seconds_to_end <= market_type.lifetime_secs()
    }
}

/// Helper used by tests/CLI seeding: parse an RFC3339 end time into our `Ts`.
pub fn parse_rfc3339(s: &str) -> Option<Ts> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
    }

    #[test]
    fn rejects_fraction_out_of_range() {
        let mut s = Settings::default();
        s.max_total_bankroll_fraction = Decimal::new(11, 1);
        assert!(s.validate().is_err());
    }

    #[test]
    fn time_window_boundaries() {
        let s = Settings::default();
        assert!(s.within_time_window(0.0));
        assert!(s.within_time_window(3600.0));
        assert!(!s.within_time_window(-1.0));
        assert!(!s.within_time_window(3600.1));
    }
}
