use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{now_ts, TopOfBook};

/// Read side the quote calculator and strategy engine depend on (§3, §6).
/// The only concurrent writer is an external feed; every read here is a
/// snapshot load, never a lock held across an `.await`.
pub trait TobCache: Send + Sync {
    fn get(&self, token_id: &str) -> Option<TopOfBook>;
}

/// In-memory TOB cache, one entry per `tokenId`, grounded on the teacher's
/// `FeedState` (a `parking_lot::RwLock<HashMap<String, Tob>>` updated by a
/// websocket task and read by the trading loop without awaiting the lock).
#[derive(Default)]
pub struct InMemoryTobCache {
    inner: RwLock<HashMap<String, TopOfBook>>,
}

impl InMemoryTobCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Called by the feed task on every book update.
    pub fn update(&self, token_id: &str, tob: TopOfBook) {
        self.inner.write().insert(token_id.to_string(), tob);
    }

    pub fn remove(&self, token_id: &str) {
        self.inner.write().remove(token_id);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl TobCache for InMemoryTobCache {
    fn get(&self, token_id: &str) -> Option<TopOfBook> {
        self.inner.read().get(token_id).copied()
    }
}

/// Convenience for callers that want "tradeable, fresh book or nothing" in one call.
pub fn fresh_valid_tob(cache: &dyn TobCache, token_id: &str) -> Option<TopOfBook> {
    let now = now_ts();
    cache
        .get(token_id)
        .filter(|tob| tob.is_valid() && !tob.is_stale(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tob(bid: &str, ask: &str, at: f64) -> TopOfBook {
        TopOfBook {
            best_bid: Some(bid.parse().unwrap()),
            best_bid_size: None,
            best_ask: Some(ask.parse().unwrap()),
            best_ask_size: None,
            updated_at: at,
        }
    }

    #[test]
    fn missing_token_returns_none() {
        let cache = InMemoryTobCache::new();
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn update_then_get_round_trips() {
        let cache = InMemoryTobCache::new();
        cache.update("tok1", tob("0.40", "0.45", 10.0));
        let got = cache.get("tok1").unwrap();
        assert_eq!(got.best_bid, Some(dec!(0.40)));
        assert_eq!(got.best_ask, Some(dec!(0.45)));
    }

    #[test]
    fn fresh_valid_tob_rejects_crossed_book() {
        let cache = InMemoryTobCache::new();
        cache.update("tok1", tob("0.50", "0.50", now_ts()));
        assert!(fresh_valid_tob(&*cache, "tok1").is_none());
    }

    #[test]
    fn remove_clears_entry() {
        let cache = InMemoryTobCache::new();
        cache.update("tok1", tob("0.4", "0.5", 0.0));
        cache.remove("tok1");
        assert!(cache.get("tok1").is_none());
    }
}
