use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{Direction, MarketType, Reason};

/// Lifecycle event payload, field-for-field per §6. `None` fields are
/// omitted on the wire by `serde`'s `skip_serializing_if`, matching how the
/// teacher's `store.rs` leaves unused columns null rather than zeroed.
#[derive(Debug, Clone, Serialize)]
pub struct LifecyclePayload {
    pub strategy: String,
    pub run_id: String,
    pub action: String,
    pub reason: &'static str,
    pub market_slug: String,
    pub market_type: &'static str,
    pub token_id: String,
    pub direction: &'static str,
    pub seconds_to_end: f64,
    pub tick_size: Decimal,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_size: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_order_age_millis: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_age_millis: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<BookSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_book: Option<BookSnapshot>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BookSnapshot {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

pub struct LifecycleEventBuilder {
    payload: LifecyclePayload,
}

impl LifecycleEventBuilder {
    pub fn new(
        run_id: impl Into<String>,
        action: impl Into<String>,
        reason: Reason,
        market_slug: impl Into<String>,
        market_type: MarketType,
        token_id: impl Into<String>,
        direction: Direction,
        seconds_to_end: f64,
        tick_size: Decimal,
    ) -> Self {
        Self {
            payload: LifecyclePayload {
                strategy: "complete-set-market-maker".to_string(),
                run_id: run_id.into(),
                action: action.into(),
                reason: reason.as_str(),
                market_slug: market_slug.into(),
                market_type: market_type.as_str(),
                token_id: token_id.into(),
                direction: direction.as_str(),
                seconds_to_end,
                tick_size,
                success: true,
                error: None,
                order_id: None,
                price: None,
                size: None,
                replaced_order_id: None,
                replaced_price: None,
                replaced_size: None,
                replaced_order_age_millis: None,
                order_age_millis: None,
                book: None,
                other_token_id: None,
                other_book: None,
            },
        }
    }

    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.payload.success = false;
        self.payload.error = Some(error.into());
        self
    }

    pub fn order(mut self, order_id: impl Into<String>, price: Decimal, size: Decimal) -> Self {
        self.payload.order_id = Some(order_id.into());
        self.payload.price = Some(price);
        self.payload.size = Some(size);
        self
    }

    pub fn replaced(
        mut self,
        order_id: impl Into<String>,
        price: Decimal,
        size: Decimal,
        age_millis: u64,
    ) -> Self {
        self.payload.replaced_order_id = Some(order_id.into());
        self.payload.replaced_price = Some(price);
        self.payload.replaced_size = Some(size);
        self.payload.replaced_order_age_millis = Some(age_millis);
        self
    }

    pub fn order_age_millis(mut self, millis: u64) -> Self {
        self.payload.order_age_millis = Some(millis);
        self
    }

    pub fn book(mut self, best_bid: Option<Decimal>, best_ask: Option<Decimal>) -> Self {
        self.payload.book = Some(BookSnapshot { best_bid, best_ask });
        self
    }

    pub fn other_leg(mut self, token_id: impl Into<String>, best_bid: Option<Decimal>, best_ask: Option<Decimal>) -> Self {
        self.payload.other_token_id = Some(token_id.into());
        self.payload.other_book = Some(BookSnapshot { best_bid, best_ask });
        self
    }

    pub fn build(self) -> LifecyclePayload {
        self.payload
    }
}

/// Sink for lifecycle events (§6, §7: "observable only through event streams
/// and logs"). Grounded on `store.rs`'s order/fill inserts, generalized to a
/// trait so the live adapter can forward to whatever sink the deployment uses.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, payload: LifecyclePayload);

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Default publisher: structured `log::info!`/`log::warn!` lines, matching
/// A.1's ambient logging policy. A deployment that wants durable storage
/// swaps this for an adapter without changing the core.
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, payload: LifecyclePayload) {
        let json = serde_json::to_string(&payload).unwrap_or_else(|e| format!("<unserializable: {e}>"));
        if payload.success {
            log::info!("event {json}");
        } else {
            log::warn!("event {json}");
        }
    }
}

/// No-op publisher used in tests that don't care about event output.
pub struct NullEventPublisher;

#[async_trait]
impl EventPublisher for NullEventPublisher {
    async fn publish(&self, _payload: LifecyclePayload) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn builder_omits_unset_optionals() {
        let payload = LifecycleEventBuilder::new(
            "run-1",
            "PLACE",
            Reason::Quote,
            "btc-updown-15m-...",
            MarketType::FifteenMin,
            "tok-up",
            Direction::Up,
            120.0,
            dec!(0.01),
        )
        .build();
        assert!(payload.success);
        assert!(payload.order_id.is_none());
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("orderId"));
    }

    #[test]
    fn failure_sets_error_and_success_false() {
        let payload = LifecycleEventBuilder::new(
            "run-1",
            "PLACE",
            Reason::InsufficientEdge,
            "slug",
            MarketType::OneHour,
            "tok",
            Direction::Down,
            10.0,
            dec!(0.01),
        )
        .failure("edge below threshold")
        .build();
        assert!(!payload.success);
        assert_eq!(payload.error.as_deref(), Some("edge below threshold"));
    }

    #[tokio::test]
    async fn null_publisher_is_disabled() {
        let pub_ = NullEventPublisher;
        assert!(!pub_.is_enabled());
        pub_.publish(
            LifecycleEventBuilder::new(
                "r",
                "PLACE",
                Reason::Quote,
                "s",
                MarketType::FifteenMin,
                "t",
                Direction::Up,
                1.0,
                dec!(0.01),
            )
            .build(),
        )
        .await;
    }
}
