// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - in-process pub/sub for domain events.
//
// A coordination primitive, not durable messaging: no partitioning, no
// persistence, no replay. `publish` returns only after every handler for
// every event has completed or failed, which gives use cases a simple
// published-then-returned contract.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::domain::events::{DomainEvent, EventKind};
use crate::domain::ports::{EventBusPort, EventHandler};

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventBusPort for EventBus {
    /// Deliver events in input order; per event, handlers run in
    /// registration order. A handler error is logged and never reaches the
    /// publisher or its sibling handlers.
    async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let handlers: Vec<EventHandler> = self
                .handlers
                .read()
                .get(&event.kind())
                .cloned()
                .unwrap_or_default();
            for handler in handlers {
                if let Err(err) = handler(event.clone()).await {
                    warn!(kind = ?event.kind(), error = %err, "event handler failed");
                }
            }
        }
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.write().entry(kind).or_default().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn skipped_event(reason: &str) -> DomainEvent {
        DomainEvent::new(EventPayload::HealingSkipped {
            subject_id: "test".to_string(),
            reason: reason.to_string(),
        })
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> EventHandler {
        Arc::new(move |_event| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_all_handlers_observe_event_before_publish_returns() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(EventKind::HealingSkipped, counting_handler(Arc::clone(&count)));
        bus.subscribe(EventKind::HealingSkipped, counting_handler(Arc::clone(&count)));

        bus.publish(vec![skipped_event("a"), skipped_event("b")]).await;
        // Two handlers, two events, all delivered synchronously.
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_handler_error_does_not_abort_siblings_or_later_events() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            EventKind::HealingSkipped,
            Arc::new(|_| Box::pin(async { anyhow::bail!("handler exploded") })),
        );
        bus.subscribe(EventKind::HealingSkipped, counting_handler(Arc::clone(&count)));

        bus.publish(vec![skipped_event("a"), skipped_event("b")]).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_events_delivered_in_input_order() {
        let bus = EventBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        bus.subscribe(
            EventKind::HealingSkipped,
            Arc::new(move |event| {
                let seen = Arc::clone(&seen_clone);
                Box::pin(async move {
                    if let EventPayload::HealingSkipped { reason, .. } = event.payload {
                        seen.lock().push(reason);
                    }
                    Ok(())
                })
            }),
        );

        bus.publish(vec![
            skipped_event("first"),
            skipped_event("second"),
            skipped_event("third"),
        ])
        .await;
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_unsubscribed_kinds_are_silently_dropped() {
        let bus = EventBus::new();
        bus.publish(vec![skipped_event("nobody listens")]).await;
        assert_eq!(bus.handler_count(EventKind::HealingSkipped), 0);
    }
}
