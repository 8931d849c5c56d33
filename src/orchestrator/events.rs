//! Internal `{type, payload}` event model sitting between the websocket transport and
//! the orchestrator's handlers. Mirrors the teacher's `web::state` broadcast-channel
//! pattern, generalized from dashboard-only fan-out to the four market event kinds this
//! system reacts to, with subscribers run sequentially on `publish` (the only
//! policy: the only cross-component mutation point).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::exchange::MarketEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Kline,
    OrderFilled,
    OrderPartiallyFilled,
    PositionUpdated,
    PortfolioUpdate,
    Disconnected,
    Error,
}

impl From<&MarketEvent> for EventType {
    fn from(event: &MarketEvent) -> Self {
        match event {
            MarketEvent::Kline(_) => EventType::Kline,
            MarketEvent::OrderFilled(_) => EventType::OrderFilled,
            MarketEvent::OrderPartiallyFilled(_) => EventType::OrderPartiallyFilled,
            MarketEvent::PositionUpdated(_) => EventType::PositionUpdated,
            MarketEvent::PortfolioUpdate(_) => EventType::PortfolioUpdate,
            MarketEvent::Disconnected => EventType::Disconnected,
            MarketEvent::Error(_) => EventType::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub payload: MarketEvent,
}

impl Event {
    pub fn new(payload: MarketEvent) -> Self {
        Self { event_type: EventType::from(&payload), payload }
    }
}

#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle(&self, event: &Event);
}

/// Fan-out point for transport events. `publish` awaits each subscriber in registration
/// order rather than spawning them, so a subscriber's own state mutations (candle buffer
/// updates, position cache writes) are serialized against the next event on the channel.
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: RwLock::new(Vec::new()) }
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().await.push(subscriber);
    }

    pub async fn publish(&self, payload: MarketEvent) {
        let event = Event::new(payload);
        for subscriber in self.subscribers.read().await.iter() {
            subscriber.handle(&event).await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscriber {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSubscriber for CountingSubscriber {
        async fn handle(&self, _event: &Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn publish_runs_every_subscriber_in_order() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber { count: Arc::clone(&count) })).await;
        bus.subscribe(Arc::new(CountingSubscriber { count: Arc::clone(&count) })).await;

        bus.publish(MarketEvent::Disconnected).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn event_type_maps_market_event_variants() {
        assert_eq!(EventType::from(&MarketEvent::Disconnected), EventType::Disconnected);
        assert_eq!(EventType::from(&MarketEvent::Error("x".into())), EventType::Error);
    }
}
