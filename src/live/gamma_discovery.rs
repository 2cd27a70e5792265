use anyhow::{Context, Result};

use polymarket_hft::client::polymarket::gamma::Client as GammaClient;
use polymarket_hft::client::polymarket::gamma::GetMarketsRequest;

use async_trait::async_trait;

use crate::discovery::MarketSource;
use crate::types::{Market, MarketType, Ts};

/// Resolves a deterministic slug against the live Gamma markets endpoint,
/// grounded on `market_selector.rs::MarketSelector::select` (same client,
/// same request shape), narrowed from "rank everything" to "does this one
/// slug exist and what are its token ids".
pub struct GammaMarketSource {
    client: GammaClient,
}

impl GammaMarketSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = GammaClient::with_base_url(base_url).with_context(|| format!("gamma base url {base_url}"))?;
        Ok(Self { client })
    }
}

fn parse_listish(s: &str) -> Vec<String> {
    let t = s.trim();
    let t = t.trim_start_matches('[').trim_end_matches(']');
    t.split(',')
        .map(|x| x.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

fn parse_ts_rfc3339(s: &str) -> Option<Ts> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
}

/// Splits the two-outcome token id list into (up, down) using the paired
/// outcome labels ("Up"/"Down") this class of market lists on Gamma.
fn up_down_token_ids(clob_token_ids: Option<&str>, outcomes: Option<&str>) -> Option<(String, String)> {
    let toks = clob_token_ids.map(parse_listish).unwrap_or_default();
    let outs = outcomes.map(parse_listish).unwrap_or_default();
    if toks.len() != 2 || outs.len() != 2 {
        return None;
    }
    if outs[0].eq_ignore_ascii_case("up") {
        Some((toks[0].clone(), toks[1].clone()))
    } else if outs[1].eq_ignore_ascii_case("up") {
        Some((toks[1].clone(), toks[0].clone()))
    } else {
        None
    }
}

#[async_trait]
impl MarketSource for GammaMarketSource {
    async fn lookup_slug(&self, slug: &str) -> Result<Option<Market>> {
        let req = GetMarketsRequest {
            limit: Some(1000),
            offset: Some(0),
            closed: Some(false),
            ..Default::default()
        };
        let markets = self.client.get_markets(req).await.context("gamma.get_markets")?;

        for m in markets {
            if m.slug.as_deref() != Some(slug) {
                continue;
            }
            let Some((up_token_id, down_token_id)) =
                up_down_token_ids(m.clob_token_ids.as_deref(), m.outcomes.as_deref())
            else {
                continue;
            };
            let Some(end_time) = m
                .end_date_iso
                .as_deref()
                .or(m.end_date.as_deref())
                .and_then(parse_ts_rfc3339)
            else {
                continue;
            };
            let market_type = if slug.contains("15m") {
                MarketType::FifteenMin
            } else {
                MarketType::OneHour
            };
            return Ok(Some(Market {
                slug: slug.to_string(),
                up_token_id,
                down_token_id,
                end_time,
                market_type,
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_down_token_ids_orders_by_outcome_label() {
        let toks = Some(r#"["111","222"]"#);
        let outs = Some(r#"["Down","Up"]"#);
        let (up, down) = up_down_token_ids(toks, outs).unwrap();
        assert_eq!(up, "222");
        assert_eq!(down, "111");
    }

    #[test]
    fn up_down_token_ids_rejects_mismatched_lengths() {
        assert!(up_down_token_ids(Some(r#"["111"]"#), Some(r#"["Up","Down"]"#)).is_none());
    }
}
