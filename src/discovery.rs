use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use chrono_tz::America::New_York;

use crate::config::{parse_rfc3339, SeedMarket, Settings};
use crate::types::{Market, MarketType, Ts};

/// Source of live market metadata, grounded on `market_selector.rs` and the
/// `polymarket-hft` gamma client, generalized behind a trait per §4.1 so the
/// slug-enumeration/merge logic below can be tested without network access.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Looks up a market by its deterministic slug. `Ok(None)` means the
    /// market doesn't exist (yet, or anymore) under that slug — not an error.
    async fn lookup_slug(&self, slug: &str) -> Result<Option<Market>>;
}

const SERIES: [&str; 2] = ["btc", "eth"];

fn full_series_name(series: &str) -> &'static str {
    if series == "eth" {
        "ethereum"
    } else {
        "bitcoin"
    }
}

fn align_15m(at: DateTime<Utc>) -> DateTime<Utc> {
    let minute_bucket = (at.minute() / 15) * 15;
    at.with_minute(minute_bucket)
        .unwrap()
        .with_second(0)
        .unwrap()
        .with_nanosecond(0)
        .unwrap()
}

/// Deterministically enumerates the 900-second-aligned epoch slug for a
/// series at a given instant, e.g. `btc-updown-15m-1753977600`. The
/// exchange's generic market listing doesn't reliably surface these
/// short-lived instruments in time, so the slug is derived instead of
/// discovered (§4.1).
pub fn fifteen_min_slug(series: &str, at: DateTime<Utc>) -> (String, DateTime<Utc>) {
    let aligned = align_15m(at);
    let end = aligned + ChronoDuration::minutes(15);
    let slug = format!("{series}-updown-15m-{}", aligned.timestamp());
    (slug, end)
}

/// Deterministically enumerates the 1-hour slug for a series, named by US
/// Eastern Time month/day/hour12/am-pm under the full coin name, e.g.
/// `bitcoin-up-or-down-jul-31-2pm-et`. 1-hour markets are named in Eastern
/// Time by convention regardless of the UTC instant being evaluated (§4.1).
pub fn one_hour_slug(series: &str, at: DateTime<Utc>) -> (String, DateTime<Utc>) {
    let et = at.with_timezone(&New_York);
    let hour_start_et = et
        .with_minute(0)
        .unwrap()
        .with_second(0)
        .unwrap()
        .with_nanosecond(0)
        .unwrap();
    let end_et = hour_start_et + ChronoDuration::hours(1);
    let end_utc = end_et.with_timezone(&Utc);

    let hour12 = match hour_start_et.hour() % 12 {
        0 => 12,
        h => h,
    };
    let am_pm = if hour_start_et.hour() < 12 { "am" } else { "pm" };
    let month = hour_start_et.format("%b").to_string().to_lowercase();
    let slug = format!(
        "{name}-up-or-down-{month}-{day}-{hour12}{am_pm}-et",
        name = full_series_name(series),
        day = hour_start_et.day()
    );
    (slug, end_utc)
}

/// All slugs worth probing so that a market still live right now, or about
/// to go live, is never missed even though it started before `now` (§4.1):
/// 15-minute epochs in `[now − 30min, now + 15min]`, and the four Eastern-Time
/// hours centered on the current hour. Both series are probed.
pub fn candidate_slugs(now: DateTime<Utc>) -> Vec<(String, MarketType)> {
    let mut out = Vec::new();
    for series in SERIES {
        let start = align_15m(now - ChronoDuration::minutes(30));
        let deadline = align_15m(now + ChronoDuration::minutes(15));
        let mut cursor = start;
        while cursor <= deadline {
            let (slug, _end) = fifteen_min_slug(series, cursor);
            out.push((slug, MarketType::FifteenMin));
            cursor += ChronoDuration::minutes(15);
        }
    }

    let et_now = now.with_timezone(&New_York);
    let current_hour_et = et_now
        .with_minute(0)
        .unwrap()
        .with_second(0)
        .unwrap()
        .with_nanosecond(0)
        .unwrap();
    for series in SERIES {
        for offset in -2..=1_i64 {
            let hour_start_et = current_hour_et + ChronoDuration::hours(offset);
            let (slug, _end) = one_hour_slug(series, hour_start_et.with_timezone(&Utc));
            out.push((slug, MarketType::OneHour));
        }
    }

    out.sort();
    out.dedup();
    out
}

/// Resolves static config-seeded markets (§6 `markets: [...]`) into `Market`
/// values, skipping entries whose end time fails to parse rather than
/// failing discovery outright — a malformed seed shouldn't take down the
/// whole set.
fn seeded_markets(seeds: &[SeedMarket]) -> Vec<Market> {
    seeds
        .iter()
        .filter_map(|seed| {
            let end_time: Ts = parse_rfc3339(&seed.end_time)?;
            let market_type = if seed.slug.contains("15m") {
                MarketType::FifteenMin
            } else {
                MarketType::OneHour
            };
            Some(Market {
                slug: seed.slug.clone(),
                up_token_id: seed.up_token_id.clone(),
                down_token_id: seed.down_token_id.clone(),
                end_time,
                market_type,
            })
        })
        .collect()
}

/// Runs one discovery cycle: probes every candidate slug within the live
/// window, merges in static seeds, and dedups by `(upTokenId, downTokenId)`
/// so a statically-seeded market already found by slug enumeration isn't
/// traded twice under two identities (§6, "Supplemented features").
pub async fn discover_markets(
    source: &dyn MarketSource,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Vec<Market>> {
    let mut by_token_pair: HashMap<(String, String), Market> = HashMap::new();

    for (slug, _market_type) in candidate_slugs(now) {
        match source.lookup_slug(&slug).await {
            Ok(Some(market)) => {
                by_token_pair.insert(
                    (market.up_token_id.clone(), market.down_token_id.clone()),
                    market,
                );
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("discovery lookup failed for {slug}: {e:#}");
            }
        }
    }

    for market in seeded_markets(&settings.markets) {
        by_token_pair
            .entry((market.up_token_id.clone(), market.down_token_id.clone()))
            .or_insert(market);
    }

    let now_ts = now.timestamp_millis() as f64 / 1000.0;
    let mut markets: Vec<Market> = by_token_pair
        .into_values()
        .filter(|m| {
            let seconds_to_end = m.seconds_to_end(now_ts);
            settings.within_time_window(seconds_to_end) && settings.within_lifetime(seconds_to_end, m.market_type)
        })
        .collect();
    markets.sort_by(|a, b| a.slug.cmp(&b.slug));

    log::info!("discovery: {} tradeable markets in window", markets.len());
    Ok(markets)
}

/// Simple fake used by tests, and a reasonable starting point for a
/// config-file-backed source in a deployment that doesn't want live gamma
/// lookups.
pub struct StaticMarketSource {
    by_slug: HashMap<String, Market>,
}

impl StaticMarketSource {
    pub fn new(markets: Vec<Market>) -> Self {
        Self {
            by_slug: markets.into_iter().map(|m| (m.slug.clone(), m)).collect(),
        }
    }
}

#[async_trait]
impl MarketSource for StaticMarketSource {
    async fn lookup_slug(&self, slug: &str) -> Result<Option<Market>> {
        Ok(self.by_slug.get(slug).cloned())
    }
}

/// Parses an RFC3339 timestamp the way config seeds are parsed, surfacing a
/// contextual error instead of `None` for callers that want to fail loudly.
pub fn must_parse_rfc3339(s: &str) -> Result<Ts> {
    parse_rfc3339(s).with_context(|| format!("invalid RFC3339 timestamp: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifteen_min_slug_matches_literal_exchange_format() {
        let at = Utc.with_ymd_and_hms(2026, 7, 31, 14, 7, 30).unwrap();
        let (slug, end) = fifteen_min_slug("btc", at);
        let aligned = Utc.with_ymd_and_hms(2026, 7, 31, 14, 0, 0).unwrap();
        assert_eq!(slug, format!("btc-updown-15m-{}", aligned.timestamp()));
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 7, 31, 14, 15, 0).unwrap());
    }

    #[test]
    fn fifteen_min_slug_is_stable_within_bucket() {
        let a = Utc.with_ymd_and_hms(2026, 7, 31, 14, 0, 1).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 7, 31, 14, 14, 59).unwrap();
        assert_eq!(fifteen_min_slug("eth", a).0, fifteen_min_slug("eth", b).0);
    }

    #[test]
    fn one_hour_slug_matches_literal_exchange_format() {
        // 18:00 UTC in July is 14:00 EDT.
        let at = Utc.with_ymd_and_hms(2026, 7, 31, 18, 30, 0).unwrap();
        let (slug, _end) = one_hour_slug("btc", at);
        assert_eq!(slug, "bitcoin-up-or-down-jul-31-2pm-et");

        let (eth_slug, _end) = one_hour_slug("eth", at);
        assert_eq!(eth_slug, "ethereum-up-or-down-jul-31-2pm-et");
    }

    #[test]
    fn candidate_slugs_are_deduped_and_sorted() {
        let now = Utc.with_ymd_and_hms(2026, 7, 31, 14, 0, 0).unwrap();
        let slugs = candidate_slugs(now);
        let mut sorted = slugs.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(slugs.len(), sorted.len());
        assert!(!slugs.is_empty());
    }

    #[test]
    fn candidate_slugs_include_markets_that_started_before_now() {
        let now = Utc.with_ymd_and_hms(2026, 7, 31, 14, 7, 0).unwrap();
        // A 15m market that started 20 minutes ago (13:45-14:00) is still
        // live and must still be a candidate even though its aligned start
        // is in the past relative to `now`.
        let started_before_now = Utc.with_ymd_and_hms(2026, 7, 31, 13, 45, 0).unwrap();
        let (slug, _end) = fifteen_min_slug("btc", started_before_now);
        let slugs = candidate_slugs(now);
        assert!(
            slugs.iter().any(|(s, _)| s == &slug),
            "expected {slug} among candidates, got {slugs:?}"
        );
    }

    #[tokio::test]
    async fn discovery_merges_seeds_and_dedups_by_token_pair() {
        let now = Utc.with_ymd_and_hms(2026, 7, 31, 14, 0, 0).unwrap();
        let (slug, end) = fifteen_min_slug("btc", now);
        let discovered = Market {
            slug: slug.clone(),
            up_token_id: "up-1".into(),
            down_token_id: "down-1".into(),
            end_time: end.timestamp_millis() as f64 / 1000.0,
            market_type: MarketType::FifteenMin,
        };
        let source = StaticMarketSource::new(vec![discovered.clone()]);

        let mut settings = Settings::default();
        settings.markets = vec![SeedMarket {
            slug: "duplicate-seed-15m".into(),
            up_token_id: "up-1".into(),
            down_token_id: "down-1".into(),
            end_time: DateTime::<Utc>::from_timestamp(end.timestamp(), 0)
                .unwrap()
                .to_rfc3339(),
        }];

        let markets = discover_markets(&source, &settings, now).await.unwrap();
        let matching: Vec<_> = markets
            .iter()
            .filter(|m| m.up_token_id == "up-1" && m.down_token_id == "down-1")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].slug, slug);
    }
}
