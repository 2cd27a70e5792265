use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::Settings;
use crate::inventory::MarketInventory;
use crate::types::{Direction, Market, MarketType, TopOfBook};

pub const MIN_PRICE: Decimal = dec!(0.01);
pub const MAX_PRICE: Decimal = dec!(0.99);
/// Above this spread the book is treated as pathological (a stale or
/// vacated quote rather than a genuine two-sided market) and entry backs
/// off to the midpoint instead of hugging the bid (§4.2).
pub const WIDE_SPREAD_THRESHOLD: Decimal = dec!(0.20);

/// Rounds a price down to the nearest tick. Flooring (never ceiling) keeps
/// a maker order from ever rounding itself into crossing the ask (§4.2).
pub fn floor_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    (price / tick).floor() * tick
}

pub fn clamp_price(price: Decimal) -> Decimal {
    price.clamp(MIN_PRICE, MAX_PRICE)
}

/// Maker entry price for a resting buy order on one outcome leg (§4.2).
///
/// Normal book: `min(bestBid + tick·(improveTicks+skewTicks), mid)`, backed
/// off by one tick if that would land at-or-through the ask. Wide/pathological
/// book (spread >= 0.20): quote from mid instead of chasing the bid, pulled
/// back by `tick·max(0, improveTicks − skewTicks)`, since a 0.20+ spread
/// usually means one side of the book is stale or empty. Always tick-floored
/// and clamped to `[0.01, 0.99]`.
pub fn entry_price(tob: &TopOfBook, tick: Decimal, improve_ticks: i32, skew_ticks: i32) -> Option<Decimal> {
    let bid = tob.best_bid?;
    let ask = tob.best_ask?;
    if ask <= bid {
        return None;
    }
    let mid = (bid + ask) / Decimal::TWO;
    let spread = ask - bid;

    let raw = if spread >= WIDE_SPREAD_THRESHOLD {
        let back_off_ticks = (improve_ticks - skew_ticks).max(0);
        mid - tick * Decimal::from(back_off_ticks)
    } else {
        let effective_improve_ticks = improve_ticks + skew_ticks;
        (bid + tick * Decimal::from(effective_improve_ticks)).min(mid)
    };

    let backed_off = if raw >= ask { ask - tick } else { raw };
    Some(clamp_price(floor_to_tick(backed_off, tick)))
}

/// Price for crossing the book deliberately: top-ups, fast top-ups, and the
/// explicit taker path all buy at (or inside) the best ask rather than
/// resting (§4.3 — these are the three `Reason`s exempted from the
/// maker-only invariant).
pub fn taker_price(tob: &TopOfBook) -> Option<Decimal> {
    let ask = tob.best_ask?;
    Some(clamp_price(ask))
}

/// Inventory skew, in ticks, applied on top of the configured base
/// `improve_ticks` for a given leg (§4.2). The thin leg gets quoted more
/// aggressively (positive skew); the heavy leg is pulled back (negative
/// skew), scaled linearly up to `complete_set_max_skew_ticks` as the
/// imbalance approaches `complete_set_imbalance_shares_for_max_skew`.
pub fn skew_ticks(inventory: &MarketInventory, direction: Direction, settings: &Settings) -> i32 {
    let denom = settings.complete_set_imbalance_shares_for_max_skew;
    if denom <= Decimal::ZERO || settings.complete_set_max_skew_ticks == 0 {
        return 0;
    }
    let imbalance = inventory.imbalance_shares(); // positive = UP-heavy
    if imbalance == Decimal::ZERO {
        return 0;
    }
    let ratio = (imbalance.abs() / denom).min(Decimal::ONE);
    let magnitude = (ratio * Decimal::from(settings.complete_set_max_skew_ticks))
        .round()
        .to_i32()
        .unwrap_or(0);

    let up_heavy = imbalance > Decimal::ZERO;
    let sign = match (direction, up_heavy) {
        (Direction::Up, true) => -1,   // UP is the heavy leg: pull back.
        (Direction::Down, true) => 1,  // DOWN is thin: push forward.
        (Direction::Up, false) => 1,   // UP is thin.
        (Direction::Down, false) => -1, // DOWN is the heavy leg.
    };
    sign * magnitude
}

fn series_of(slug: &str) -> &'static str {
    if slug.starts_with("eth") {
        "eth"
    } else {
        "btc"
    }
}

/// Literal per-series/per-time-bucket share counts (§4.2 size schedule
/// table). Each row is `(threshold_secs, shares)`, checked in order;
/// `seconds_to_end` below the first threshold it's less than wins, falling
/// through to the row's own "else" shares when none match.
const BTC_15M: &[(f64, Decimal)] = &[(60.0, dec!(11)), (180.0, dec!(13)), (300.0, dec!(17)), (600.0, dec!(19))];
const BTC_15M_ELSE: Decimal = dec!(20);

const ETH_15M: &[(f64, Decimal)] = &[(60.0, dec!(8)), (180.0, dec!(10)), (300.0, dec!(12)), (600.0, dec!(13))];
const ETH_15M_ELSE: Decimal = dec!(14);

const BTC_1H: &[(f64, Decimal)] = &[
    (60.0, dec!(9)),
    (180.0, dec!(10)),
    (300.0, dec!(11)),
    (600.0, dec!(12)),
    (900.0, dec!(14)),
    (1200.0, dec!(15)),
    (1800.0, dec!(17)),
];
const BTC_1H_ELSE: Decimal = dec!(18);

const ETH_1H: &[(f64, Decimal)] = &[
    (60.0, dec!(7)),
    (300.0, dec!(8)),
    (600.0, dec!(9)),
    (900.0, dec!(11)),
    (1200.0, dec!(12)),
    (1800.0, dec!(13)),
];
const ETH_1H_ELSE: Decimal = dec!(14);

fn lookup_shares(table: &[(f64, Decimal)], else_shares: Decimal, seconds_to_end: f64) -> Decimal {
    for (threshold, shares) in table {
        if seconds_to_end <= *threshold {
            return *shares;
        }
    }
    else_shares
}

/// Target resting size for one leg, as a literal share count keyed on
/// `(series, bucket(secondsToEnd))` (§4.2 size schedule). Unknown series
/// (neither btc nor eth) fall back to bankroll/config-based notional sizing.
pub fn scheduled_size(market: &Market, seconds_to_end: f64, settings: &Settings) -> Decimal {
    let series = series_of(&market.slug);
    let known_series = market.slug.starts_with("btc") || market.slug.starts_with("eth");
    if !known_series {
        let base = settings
            .quote_size
            .max(settings.bankroll_usd * settings.quote_size_bankroll_fraction);
        return base.round_dp(2);
    }

    let shares = match (series, market.market_type) {
        ("btc", MarketType::FifteenMin) => lookup_shares(BTC_15M, BTC_15M_ELSE, seconds_to_end),
        ("eth", MarketType::FifteenMin) => lookup_shares(ETH_15M, ETH_15M_ELSE, seconds_to_end),
        ("btc", MarketType::OneHour) => lookup_shares(BTC_1H, BTC_1H_ELSE, seconds_to_end),
        (_, MarketType::OneHour) => lookup_shares(ETH_1H, ETH_1H_ELSE, seconds_to_end),
        _ => unreachable!("series_of only returns \"btc\" or \"eth\""),
    };

    shares.round_dp(2)
}

/// Applies the ordered caps from §4.2: per-order bankroll fraction, a flat
/// per-order notional ceiling, remaining total-bankroll budget, and finally
/// a directional-bias multiplier that favors topping up the thin leg. Each
/// step can only shrink (or, for bias, rescale) what the previous step
/// allowed — caps never compose to a larger size than the schedule alone
/// would give.
pub fn apply_caps(
    size: Decimal,
    price: Decimal,
    settings: &Settings,
    current_exposure: Decimal,
    direction: Direction,
    inventory: &MarketInventory,
) -> Decimal {
    if price <= Decimal::ZERO || size <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let mut size = size;

    let per_order_cap_notional = settings.bankroll_usd * settings.max_order_bankroll_fraction;
    size = size.min(per_order_cap_notional / price);

    size = size.min(settings.max_order_notional_usd / price);

    let total_cap_notional = settings.bankroll_usd * settings.max_total_bankroll_fraction;
    let remaining_notional = (total_cap_notional - current_exposure).max(Decimal::ZERO);
    size = size.min(remaining_notional / price);

    if settings.directional_bias_enabled {
        if let Some(ratio) = inventory.balance_ratio() {
            let imbalance_fraction = Decimal::ONE - ratio;
            if imbalance_fraction >= settings.imbalance_threshold {
                match inventory.thin_leg() {
                    Some(thin) if thin == direction => size *= settings.directional_bias_factor,
                    Some(_) => size /= settings.directional_bias_factor,
                    None => {}
                }
            }
        }
    }

    size.max(Decimal::ZERO).round_dp(2)
}

/// Complete-set edge: `1 - (priceUp + priceDown)`, the whole strategy's
/// source of theoretical profit (§2, §4.2). A positive edge means the pair
/// of asks costs less than the guaranteed $1 payout of holding both.
pub fn complete_set_edge(up_price: Decimal, down_price: Decimal) -> Decimal {
    Decimal::ONE - (up_price + down_price)
}

pub fn meets_edge_threshold(up_price: Decimal, down_price: Decimal, min_edge: Decimal) -> bool {
    complete_set_edge(up_price, down_price) >= min_edge
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tob(bid: &str, ask: &str) -> TopOfBook {
        TopOfBook {
            best_bid: Some(bid.parse().unwrap()),
            best_bid_size: None,
            best_ask: Some(ask.parse().unwrap()),
            best_ask_size: None,
            updated_at: 0.0,
        }
    }

    #[test]
    fn entry_price_improves_bid_on_normal_book() {
        let t = tob("0.40", "0.42");
        let price = entry_price(&t, dec!(0.01), 1, 0).unwrap();
        assert_eq!(price, dec!(0.41));
    }

    #[test]
    fn entry_price_matches_s1_worked_example() {
        let t = tob("0.48", "0.51");
        let price = entry_price(&t, dec!(0.01), 1, 0).unwrap();
        assert_eq!(price, dec!(0.49));
    }

    #[test]
    fn entry_price_never_exceeds_mid() {
        // bid+tick*effective would be 0.44, past mid 0.405 — mid wins.
        let t = tob("0.40", "0.41");
        let price = entry_price(&t, dec!(0.01), 4, 0).unwrap();
        assert!(price <= dec!(0.405));
    }

    #[test]
    fn entry_price_backs_off_instead_of_crossing() {
        let t = tob("0.40", "0.41");
        // improving by 3 ticks from 0.40 would be 0.43, through the ask.
        let price = entry_price(&t, dec!(0.01), 3, 0).unwrap();
        assert!(price < dec!(0.41));
    }

    #[test]
    fn entry_price_uses_midpoint_on_wide_book() {
        let t = tob("0.20", "0.45");
        let price = entry_price(&t, dec!(0.01), 1, 0).unwrap();
        // mid 0.325 minus tick*max(0, improveTicks-skewTicks) = 0.325 - 0.01 = 0.315.
        assert_eq!(price, dec!(0.31)); // floor(0.315, 0.01)
    }

    #[test]
    fn entry_price_wide_book_skew_reduces_backoff() {
        let t = tob("0.20", "0.45");
        // skewTicks >= improveTicks: back-off clamps to 0, quote sits at mid.
        let price = entry_price(&t, dec!(0.01), 1, 2).unwrap();
        assert_eq!(price, dec!(0.32)); // floor(0.325, 0.01)
    }

    #[test]
    fn entry_price_rejects_crossed_book() {
        let t = tob("0.50", "0.49");
        assert!(entry_price(&t, dec!(0.01), 1, 0).is_none());
    }

    #[test]
    fn clamp_bounds_extremes() {
        assert_eq!(clamp_price(dec!(0.00)), MIN_PRICE);
        assert_eq!(clamp_price(dec!(1.00)), MAX_PRICE);
    }

    #[test]
    fn skew_favors_thin_leg() {
        let mut inv = MarketInventory::default();
        inv.apply_fill(Direction::Up, dec!(40), dec!(0.4), 0.0);
        let settings = Settings::default();
        let up_skew = skew_ticks(&inv, Direction::Up, &settings);
        let down_skew = skew_ticks(&inv, Direction::Down, &settings);
        assert!(down_skew > up_skew, "thin DOWN leg should skew more aggressively than heavy UP leg");
    }

    #[test]
    fn scheduled_size_matches_s1_worked_example() {
        let settings = Settings::default();
        let market = Market {
            slug: "btc-updown-15m-1735689600".into(),
            up_token_id: "u".into(),
            down_token_id: "d".into(),
            end_time: 900.0,
            market_type: MarketType::FifteenMin,
        };
        assert_eq!(scheduled_size(&market, 600.0, &settings), dec!(19));
    }

    #[test]
    fn scheduled_size_tapers_near_expiry() {
        let settings = Settings::default();
        let market = Market {
            slug: "btc-updown-15m-1735689600".into(),
            up_token_id: "u".into(),
            down_token_id: "d".into(),
            end_time: 900.0,
            market_type: MarketType::FifteenMin,
        };
        let far = scheduled_size(&market, 800.0, &settings);
        let near = scheduled_size(&market, 20.0, &settings);
        assert!(near < far);
    }

    #[test]
    fn eth_size_is_thinner_than_btc_at_same_bucket() {
        let settings = Settings::default();
        let btc = Market {
            slug: "btc-updown-15m-x".into(),
            up_token_id: "u".into(),
            down_token_id: "d".into(),
            end_time: 900.0,
            market_type: MarketType::FifteenMin,
        };
        let eth = Market { slug: "eth-updown-15m-x".into(), ..btc.clone() };
        assert!(scheduled_size(&eth, 800.0, &settings) < scheduled_size(&btc, 800.0, &settings));
    }

    #[test]
    fn eth_1h_has_its_own_bucket_boundaries() {
        let settings = Settings::default();
        let eth_1h = Market {
            slug: "eth-updown-1h-x".into(),
            up_token_id: "u".into(),
            down_token_id: "d".into(),
            end_time: 3600.0,
            market_type: MarketType::OneHour,
        };
        // eth-1h has no <180 bucket of its own (unlike btc-1h): 120s and 170s
        // both fall in the <300 bucket.
        assert_eq!(scheduled_size(&eth_1h, 120.0, &settings), scheduled_size(&eth_1h, 170.0, &settings));
        assert_eq!(scheduled_size(&eth_1h, 600.0, &settings), dec!(9));
    }

    #[test]
    fn caps_never_exceed_flat_notional_cap() {
        let mut settings = Settings::default();
        settings.max_order_notional_usd = dec!(5);
        let inv = MarketInventory::default();
        let size = apply_caps(dec!(100), dec!(0.5), &settings, Decimal::ZERO, Direction::Up, &inv);
        assert!(size * dec!(0.5) <= dec!(5.001));
    }

    #[test]
    fn caps_respect_remaining_total_bankroll() {
        let settings = Settings::default(); // bankroll 1000, max_total_bankroll_fraction 1.0
        let inv = MarketInventory::default();
        let size = apply_caps(dec!(10000), dec!(0.5), &settings, dec!(999), Direction::Up, &inv);
        assert!(size * dec!(0.5) <= dec!(1.001));
    }

    #[test]
    fn edge_gate_matches_formula() {
        assert_eq!(complete_set_edge(dec!(0.48), dec!(0.50)), dec!(0.02));
        assert!(meets_edge_threshold(dec!(0.48), dec!(0.50), dec!(0.01)));
        assert!(!meets_edge_threshold(dec!(0.49), dec!(0.50), dec!(0.02)));
    }
}
