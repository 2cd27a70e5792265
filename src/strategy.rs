use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::config::Settings;
use crate::error::CoreError;
use crate::events::{EventPublisher, LifecycleEventBuilder};
use crate::executor::Executor;
use crate::exposure::current_exposure;
use crate::inventory::{touch, InventoryStore, MarketInventory};
use crate::order_manager::{self, decide_replace, FillDelta, ReplaceDecision, TickSizeCache};
use crate::positions::PositionsCache;
use crate::quote;
use crate::tob_cache::TobCache;
use crate::types::{now_ts, Direction, Market, OrderState, Reason, Ts};

/// The per-market evaluation loop (§4.3): the single mutator of all shared
/// trading state, driven by the caller's scheduler (a `tokio::select!` of
/// interval tickers in `main.rs`, per the concurrency model). Grounded on
/// `bot.rs::run`/`run_paper_trader`/`trade_one_market`, generalized from a
/// single-strategy loop into the complete-set quote/top-up/replace pipeline.
pub struct StrategyEngine {
    settings: Settings,
    run_id: String,
    executor: Arc<dyn Executor>,
    tob_cache: Arc<dyn TobCache>,
    publisher: Arc<dyn EventPublisher>,
    tick_cache: TickSizeCache,
    positions: PositionsCache,
    inventory: InventoryStore,
    /// One resting order per token id, per §3.
    open_orders: HashMap<String, OrderState>,
    last_replace_at: HashMap<String, Ts>,
}

impl StrategyEngine {
    pub fn new(
        settings: Settings,
        run_id: impl Into<String>,
        executor: Arc<dyn Executor>,
        tob_cache: Arc<dyn TobCache>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let ttl = settings.tick_size_ttl_secs;
        Self {
            settings,
            run_id: run_id.into(),
            executor,
            tob_cache,
            publisher,
            tick_cache: TickSizeCache::new(ttl),
            positions: PositionsCache::default(),
            inventory: InventoryStore::new(),
            open_orders: HashMap::new(),
            last_replace_at: HashMap::new(),
        }
    }

    pub fn open_order_for(&self, token_id: &str) -> Option<&OrderState> {
        self.open_orders.get(token_id)
    }

    pub fn inventory_for(&self, slug: &str) -> MarketInventory {
        self.inventory.get(slug).cloned().unwrap_or_default()
    }

    /// One pass over every currently-discovered market. Per §7, a failure
    /// evaluating one market is caught and logged; it never prevents the
    /// remaining markets in this tick from being evaluated.
    pub async fn tick(&mut self, markets: &[Market]) {
        let now = now_ts();

        if self.positions.needs_refresh(now, self.settings.positions_refresh_secs) {
            if let Err(e) = self.positions.refresh(self.executor.as_ref(), now).await {
                log::warn!("positions refresh failed: {e}");
            }
        }

        for market in markets {
            if let Err(e) = self.evaluate_market(market, now).await {
                log::error!("evaluation failed for {}: {e}", market.slug);
            }
        }

        log::debug!(
            "heartbeat run_id={} markets={} open_orders={}",
            self.run_id,
            markets.len(),
            self.open_orders.len()
        );
    }

    async fn evaluate_market(&mut self, market: &Market, now: Ts) -> Result<(), CoreError> {
        let seconds_to_end = market.seconds_to_end(now);

        if !self.settings.within_time_window(seconds_to_end) {
            self.cancel_legs(market, Reason::OutsideTimeWindow, now).await;
            return Ok(());
        }
        if !self.settings.within_lifetime(seconds_to_end, market.market_type) {
            self.cancel_legs(market, Reason::OutsideLifetime, now).await;
            return Ok(());
        }

        let up_tick = self.tick_cache.get(self.executor.as_ref(), &market.up_token_id, now).await?;
        let down_tick = self.tick_cache.get(self.executor.as_ref(), &market.down_token_id, now).await?;

        let up_tob = self.tob_cache.get(&market.up_token_id);
        let down_tob = self.tob_cache.get(&market.down_token_id);

        let books_fresh = up_tob.is_some_and(|t| t.is_valid() && !t.is_stale(now))
            && down_tob.is_some_and(|t| t.is_valid() && !t.is_stale(now));
        if !books_fresh {
            self.cancel_legs(market, Reason::BookStale, now).await;
            return Ok(());
        }
        let up_tob = up_tob.unwrap();
        let down_tob = down_tob.unwrap();

        if self
            .maybe_fast_top_up(market, seconds_to_end, now)
            .await?
        {
            // Fast top-up took the action this tick; maker quoting resumes
            // next tick once the resulting fill is reflected in inventory.
            return Ok(());
        }

        if self.maybe_slow_top_up(market, seconds_to_end, now).await? {
            return Ok(());
        }

        let inventory = self.inventory.get(&market.slug).cloned().unwrap_or_default();
        let up_skew = quote::skew_ticks(&inventory, Direction::Up, &self.settings);
        let down_skew = quote::skew_ticks(&inventory, Direction::Down, &self.settings);

        let up_price = quote::entry_price(&up_tob, up_tick, self.settings.improve_ticks, up_skew);
        let down_price = quote::entry_price(&down_tob, down_tick, self.settings.improve_ticks, down_skew);

        let (up_price, down_price) = match (up_price, down_price) {
            (Some(u), Some(d)) => (u, d),
            _ => {
                self.cancel_legs(market, Reason::BookStale, now).await;
                return Ok(());
            }
        };

        if !quote::meets_edge_threshold(up_price, down_price, self.settings.complete_set_min_edge) {
            self.cancel_legs(market, Reason::InsufficientEdge, now).await;
            return Ok(());
        }

        let exposure = current_exposure(&self.open_orders, &self.positions);
        let up_size = quote::scheduled_size(market, seconds_to_end, &self.settings);
        let up_size = quote::apply_caps(up_size, up_price, &self.settings, exposure, Direction::Up, &inventory);

        let exposure_after_up = exposure + up_price * up_size;
        let down_size = quote::scheduled_size(market, seconds_to_end, &self.settings);
        let down_size = quote::apply_caps(
            down_size,
            down_price,
            &self.settings,
            exposure_after_up,
            Direction::Down,
            &inventory,
        );

        self.reconcile_leg(
            market,
            Direction::Up,
            up_price,
            up_size,
            up_tick,
            seconds_to_end,
            now,
            Reason::Quote,
        )
        .await?;
        self.reconcile_leg(
            market,
            Direction::Down,
            down_price,
            down_size,
            down_tick,
            seconds_to_end,
            now,
            Reason::Quote,
        )
        .await?;

        self.sweep_order_status(market, now).await;
        Ok(())
    }

    /// Highest-priority action (§4.3): if a fill on one leg recently left the
    /// position imbalanced and the thin leg hasn't been topped up in the
    /// cooldown window, cross the book to restore a complete set. Updates
    /// `lastTopUpAt` even when the placement itself fails, so a persistently
    /// failing top-up doesn't retry every tick and spam the executor.
    async fn maybe_fast_top_up(&mut self, market: &Market, seconds_to_end: f64, now: Ts) -> Result<bool, CoreError> {
        if !self.settings.complete_set_fast_top_up_enabled {
            return Ok(false);
        }
        let inventory = self.inventory.get(&market.slug).cloned().unwrap_or_default();
        let Some(thin) = inventory.thin_leg() else {
            return Ok(false);
        };
        let heavy = thin.other();
        let Some(since_fill) = inventory.seconds_since_last_fill(heavy, now) else {
            return Ok(false);
        };
        if since_fill < self.settings.fast_top_up_min_seconds_after_fill
            || since_fill > self.settings.fast_top_up_max_seconds_after_fill
        {
            return Ok(false);
        }
        let imbalance = inventory.imbalance_shares().abs();
        if imbalance < self.settings.fast_top_up_min_shares {
            return Ok(false);
        }
        if let Some(cooldown_elapsed) = inventory.seconds_since_top_up(now) {
            if cooldown_elapsed * 1000.0 < self.settings.fast_top_up_cooldown_millis as f64 {
                return Ok(false);
            }
        }

        let token_id = market.token_id(thin).to_string();
        let tob = self.tob_cache.get(&token_id);
        let Some(tob) = tob.filter(|t| t.is_valid() && !t.is_stale(now)) else {
            return Ok(false);
        };
        let spread = tob.spread().unwrap_or(Decimal::MAX);
        if spread > self.settings.taker_mode_max_spread {
            return Ok(false);
        }
        let Some(price) = quote::taker_price(&tob) else {
            return Ok(false);
        };

        touch(&mut self.inventory, &market.slug).mark_top_up(now);

        match order_manager::place_order(
            self.executor.as_ref(),
            &market.slug,
            &token_id,
            thin,
            price,
            imbalance,
            seconds_to_end,
        )
        .await
        {
            Ok(order) => {
                self.open_orders.insert(token_id.clone(), order);
                self.publish(
                    market,
                    Reason::FastTopUp,
                    thin,
                    seconds_to_end,
                    tob.updated_at,
                    |b| b.order(token_id.clone(), price, imbalance),
                )
                .await;
            }
            Err(e) => {
                self.publish(market, Reason::FastTopUp, thin, seconds_to_end, tob.updated_at, |b| {
                    b.failure(e.to_string())
                })
                .await;
            }
        }
        Ok(true)
    }

    async fn maybe_slow_top_up(&mut self, market: &Market, seconds_to_end: f64, now: Ts) -> Result<bool, CoreError> {
        if !self.settings.complete_set_top_up_enabled {
            return Ok(false);
        }
        if seconds_to_end > self.settings.complete_set_top_up_seconds_to_end {
            return Ok(false);
        }
        let inventory = self.inventory.get(&market.slug).cloned().unwrap_or_default();
        let Some(thin) = inventory.thin_leg() else {
            return Ok(false);
        };
        let imbalance = inventory.imbalance_shares().abs();
        if imbalance < self.settings.complete_set_top_up_min_shares {
            return Ok(false);
        }

        let token_id = market.token_id(thin).to_string();
        let Some(tob) = self.tob_cache.get(&token_id).filter(|t| t.is_valid() && !t.is_stale(now)) else {
            return Ok(false);
        };
        let Some(price) = quote::taker_price(&tob) else {
            return Ok(false);
        };

        touch(&mut self.inventory, &market.slug).mark_top_up(now);

        match order_manager::place_order(
            self.executor.as_ref(),
            &market.slug,
            &token_id,
            thin,
            price,
            imbalance,
            seconds_to_end,
        )
        .await
        {
            Ok(order) => {
                self.open_orders.insert(token_id.clone(), order);
                self.publish(market, Reason::TopUp, thin, seconds_to_end, tob.updated_at, |b| {
                    b.order(token_id.clone(), price, imbalance)
                })
                .await;
            }
            Err(e) => {
                self.publish(market, Reason::TopUp, thin, seconds_to_end, tob.updated_at, |b| {
                    b.failure(e.to_string())
                })
                .await;
            }
        }
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconcile_leg(
        &mut self,
        market: &Market,
        direction: Direction,
        desired_price: Decimal,
        desired_size: Decimal,
        tick: Decimal,
        seconds_to_end: f64,
        now: Ts,
        reason: Reason,
    ) -> Result<(), CoreError> {
        let token_id = market.token_id(direction).to_string();

        if desired_size <= Decimal::ZERO {
            return Ok(());
        }

        match self.open_orders.get(&token_id).cloned() {
            None => {
                match order_manager::place_order(
                    self.executor.as_ref(),
                    &market.slug,
                    &token_id,
                    direction,
                    desired_price,
                    desired_size,
                    seconds_to_end,
                )
                .await
                {
                    Ok(order) => {
                        self.open_orders.insert(token_id.clone(), order);
                        self.publish(market, reason, direction, seconds_to_end, now, |b| {
                            b.order(token_id.clone(), desired_price, desired_size)
                        })
                        .await;
                    }
                    Err(e) => {
                        self.publish(market, reason, direction, seconds_to_end, now, |b| b.failure(e.to_string()))
                            .await;
                    }
                }
            }
            Some(existing) => {
                let elapsed_since_replace = self
                    .last_replace_at
                    .get(&token_id)
                    .map(|t| (now - t) * 1000.0)
                    .unwrap_or(f64::MAX);
                if elapsed_since_replace < self.settings.min_replace_millis as f64 {
                    return Ok(());
                }
                let decision = decide_replace(&existing, desired_price, desired_size, tick);
                if decision == ReplaceDecision::Keep {
                    return Ok(());
                }
                let replace_reason = match decision {
                    ReplaceDecision::ReplacePrice => Reason::ReplacePrice,
                    ReplaceDecision::ReplaceSize => Reason::ReplaceSize,
                    ReplaceDecision::ReplacePriceAndSize => Reason::ReplacePriceAndSize,
                    ReplaceDecision::Keep => unreachable!(),
                };
                order_manager::cancel_order(self.executor.as_ref(), &existing).await?;
                let age_millis = (existing.age_secs(now) * 1000.0) as u64;
                match order_manager::place_order(
                    self.executor.as_ref(),
                    &market.slug,
                    &token_id,
                    direction,
                    desired_price,
                    desired_size,
                    seconds_to_end,
                )
                .await
                {
                    Ok(order) => {
                        self.open_orders.insert(token_id.clone(), order);
                        self.last_replace_at.insert(token_id.clone(), now);
                        self.publish(market, replace_reason, direction, seconds_to_end, now, |b| {
                            b.order(token_id.clone(), desired_price, desired_size).replaced(
                                existing.order_id.clone(),
                                existing.price,
                                existing.size,
                                age_millis,
                            )
                        })
                        .await;
                    }
                    Err(e) => {
                        self.open_orders.remove(&token_id);
                        self.publish(market, replace_reason, direction, seconds_to_end, now, |b| {
                            b.failure(e.to_string())
                        })
                        .await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn sweep_order_status(&mut self, market: &Market, now: Ts) {
        for direction in [Direction::Up, Direction::Down] {
            let token_id = market.token_id(direction).to_string();
            let Some(order) = self.open_orders.get(&token_id).cloned() else {
                continue;
            };

            if order_manager::is_stale(&order, now, self.settings.order_stale_timeout_secs) {
                if order_manager::cancel_order(self.executor.as_ref(), &order).await.is_ok() {
                    self.open_orders.remove(&token_id);
                    self.publish(market, Reason::StaleTimeout, direction, market.seconds_to_end(now), now, |b| b)
                        .await;
                }
                continue;
            }

            // At most once per second (§4.4): skip the poll until the gate
            // elapses, leaving the resting order as-is until then.
            if now - order.last_status_check_at < self.settings.order_status_poll_secs {
                continue;
            }

            let status = match self.executor.get_order_status(&order.order_id).await {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("status poll failed for {}: {e}", order.order_id);
                    if let Some(o) = self.open_orders.get_mut(&token_id) {
                        o.last_status_check_at = now;
                    }
                    continue;
                }
            };
            let FillDelta { newly_filled, is_terminal } = order_manager::reconcile_status(&order, &status);
            if newly_filled > Decimal::ZERO {
                touch(&mut self.inventory, &market.slug).apply_fill(direction, newly_filled, order.price, now);
                self.positions.record_unbooked_fill(newly_filled * order.price);
            }
            if is_terminal {
                self.open_orders.remove(&token_id);
            } else if let Some(o) = self.open_orders.get_mut(&token_id) {
                o.matched_size = status.matched_size;
                o.last_status_check_at = now;
            }
        }
    }

    async fn cancel_legs(&mut self, market: &Market, reason: Reason, now: Ts) {
        for direction in [Direction::Up, Direction::Down] {
            let token_id = market.token_id(direction).to_string();
            if let Some(order) = self.open_orders.get(&token_id).cloned() {
                if order_manager::cancel_order(self.executor.as_ref(), &order).await.is_ok() {
                    self.open_orders.remove(&token_id);
                    self.publish(market, reason, direction, market.seconds_to_end(now), now, |b| b).await;
                }
            }
        }
    }

    async fn publish(
        &self,
        market: &Market,
        reason: Reason,
        direction: Direction,
        seconds_to_end: f64,
        book_updated_at: Ts,
        f: impl FnOnce(LifecycleEventBuilder) -> LifecycleEventBuilder,
    ) {
        if !self.publisher.is_enabled() {
            return;
        }
        let _ = book_updated_at;
        let token_id = market.token_id(direction).to_string();
        let action = reason.as_str().to_string();
        let tick = Decimal::new(1, 2);
        let builder = LifecycleEventBuilder::new(
            self.run_id.clone(),
            action,
            reason,
            market.slug.clone(),
            market.market_type,
            token_id,
            direction,
            seconds_to_end,
            tick,
        );
        self.publisher.publish(f(builder).build()).await;
    }
}
