use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;

use polymarket_hft::client::polymarket::clob::ws::{ClobWsClient, WsMessage};

use crate::tob_cache::InMemoryTobCache;
use crate::types::{now_ts, TopOfBook};

fn ws_base_url(ws_url: &str) -> String {
    let s = ws_url.trim();
    if let Some((base, _)) = s.split_once("/ws/") {
        base.to_string()
    } else {
        s.trim_end_matches('/').to_string()
    }
}

/// Subscribes to the given token ids and streams top-of-book updates into
/// the shared cache until the connection is closed by the caller dropping
/// the future. Grounded on `feed_handler.rs::run_ws_loop`, narrowed to the
/// book-snapshot half (the teacher also tracked book-update rate and
/// last-trade EMA for its own microstructure scoring; this core doesn't
/// make discovery decisions from live feed stats, so that half is dropped —
/// see the final trimming notes in the grounding ledger).
pub async fn run_ws_feed(clob_ws_url: &str, token_ids: Vec<String>, cache: Arc<InMemoryTobCache>) -> Result<()> {
    let mut ws = ClobWsClient::builder().base_url(ws_base_url(clob_ws_url)).build();

    if !token_ids.is_empty() {
        ws.subscribe_market(token_ids)
            .await
            .map_err(|e| anyhow::anyhow!("ws.subscribe_market failed: {e}"))?;
    }

    loop {
        let Some(msg) = ws.next_message().await else {
            tokio::time::sleep(Duration::from_millis(250)).await;
            continue;
        };
        if let WsMessage::Book(b) = msg {
            let best_bid = b.bids.first().and_then(|l| l.price.parse::<Decimal>().ok());
            let best_bid_size = b.bids.first().and_then(|l| l.size.parse::<Decimal>().ok());
            let best_ask = b.asks.first().and_then(|l| l.price.parse::<Decimal>().ok());
            let best_ask_size = b.asks.first().and_then(|l| l.size.parse::<Decimal>().ok());
            cache.update(
                b.asset_id.trim(),
                TopOfBook {
                    best_bid,
                    best_bid_size,
                    best_ask,
                    best_ask_size,
                    updated_at: now_ts(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ws_path_suffix_from_base_url() {
        assert_eq!(
            ws_base_url("wss://ws-subscriptions-clob.polymarket.com/ws/market"),
            "wss://ws-subscriptions-clob.polymarket.com"
        );
    }

    #[test]
    fn leaves_bare_base_url_untouched() {
        assert_eq!(
            ws_base_url("wss://ws-subscriptions-clob.polymarket.com/"),
            "wss://ws-subscriptions-clob.polymarket.com"
        );
    }
}
