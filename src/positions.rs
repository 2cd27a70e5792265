use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::executor::{Executor, Position};
use crate::types::Ts;

/// Read-through cache over `Executor::get_positions`, refreshed on a TTL
/// rather than every tick (§6 "Positions cache", 5s refresh). Grounded on
/// `polymarket-hft`'s `data::positions` endpoint plus `bot.rs`'s rehydrate
/// logic, which caches exchange-reported positions and clears the
/// unbooked-fill overlay once a refresh confirms the fill is reflected.
#[derive(Debug, Clone, Default)]
pub struct PositionsCache {
    fetched_at: Option<Ts>,
    shares_by_token_id: HashMap<String, Decimal>,
    open_notional_by_token_id: HashMap<String, Decimal>,
    total_open_notional: Decimal,
    /// Fills applied locally since the last successful refresh, kept so the
    /// exposure accountant doesn't under-count exposure between refreshes.
    unbooked_notional: Decimal,
}

impl PositionsCache {
    pub fn needs_refresh(&self, now: Ts, ttl_secs: f64) -> bool {
        match self.fetched_at {
            None => true,
            Some(t) => now - t >= ttl_secs,
        }
    }

    pub async fn refresh(&mut self, executor: &dyn Executor, now: Ts) -> Result<(), CoreError> {
        let positions: HashMap<String, Position> = executor.get_positions().await?;
        self.shares_by_token_id.clear();
        self.open_notional_by_token_id.clear();
        self.total_open_notional = Decimal::ZERO;
        for (token_id, pos) in positions {
            self.total_open_notional += pos.open_notional;
            self.shares_by_token_id.insert(token_id.clone(), pos.shares);
            self.open_notional_by_token_id.insert(token_id, pos.open_notional);
        }
        self.fetched_at = Some(now);
        // A confirmed refresh supersedes anything we were tracking locally.
        self.unbooked_notional = Decimal::ZERO;
        Ok(())
    }

    pub fn shares(&self, token_id: &str) -> Decimal {
        self.shares_by_token_id.get(token_id).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn open_notional(&self, token_id: &str) -> Decimal {
        self.open_notional_by_token_id
            .get(token_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total_open_notional(&self) -> Decimal {
        self.total_open_notional + self.unbooked_notional
    }

    /// Records a fill observed directly (e.g. from an order-status poll)
    /// before the next positions refresh confirms it, so the exposure
    /// accountant reflects it immediately rather than lagging by a TTL.
    pub fn record_unbooked_fill(&mut self, notional: Decimal) {
        self.unbooked_notional += notional;
    }

    pub fn fetched_at(&self) -> Option<Ts> {
        self.fetched_at
    }
}
