//! EventBus service: typed in-process publish/subscribe.
//!
//! Delivery is synchronous and ordered: non-wildcard subscribers in
//! subscription order, then `*` subscribers in subscription order.
//! Handler failures are logged and swallowed; they never stop delivery
//! to later handlers. Every emitted event lands in a bounded FIFO
//! history ring after delivery.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::models::{EventType, SubscriptionId, WorkflowEvent};

/// Error a handler may surface; logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Subscriber callback. Runs inline with `emit`; long work must be
/// offloaded.
pub type EventHandler = Arc<dyn Fn(&WorkflowEvent) -> Result<(), HandlerError> + Send + Sync>;

/// `wait_for` deadline expiry, the bus's sole error surface.
#[derive(Debug, Clone, Error)]
#[error("timed out after {timeout_ms}ms waiting for {event_type}")]
pub struct TimeoutError {
    pub event_type: EventType,
    pub timeout_ms: u64,
}

/// Configuration for the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EventBusConfig {
    /// History ring capacity; oldest entries drop first.
    pub max_history_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_history_size: 1_000,
        }
    }
}

/// Query over the history ring.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Exact type match; `*` is not a query wildcard.
    pub event_type: Option<EventType>,
    /// Inclusive lower bound on timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Keep at most this many of the most recent matches.
    pub limit: Option<usize>,
}

struct Subscription {
    id: SubscriptionId,
    event_type: EventType,
    handler: EventHandler,
    once: bool,
}

#[derive(Default)]
struct BusInner {
    subscriptions: Vec<Subscription>,
    history: VecDeque<WorkflowEvent>,
}

/// Typed, wildcard-capable in-process event bus.
pub struct EventBus {
    inner: Mutex<BusInner>,
    config: EventBusConfig,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            inner: Mutex::new(BusInner::default()),
            config,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `event` to matching subscribers, then append it to
    /// history.
    ///
    /// `once` subscriptions are unregistered before their handler runs,
    /// so re-entrant emits from inside a handler cannot re-deliver.
    pub fn emit(&self, event: WorkflowEvent) {
        if !event.event_type.is_emittable() {
            tracing::warn!("dropping event with reserved wildcard type");
            return;
        }

        let handlers: Vec<(SubscriptionId, EventHandler)> = {
            let mut inner = self.lock();
            let mut selected: Vec<(SubscriptionId, EventHandler)> = inner
                .subscriptions
                .iter()
                .filter(|s| s.event_type == event.event_type)
                .map(|s| (s.id, Arc::clone(&s.handler)))
                .collect();
            selected.extend(
                inner
                    .subscriptions
                    .iter()
                    .filter(|s| s.event_type == EventType::Wildcard)
                    .map(|s| (s.id, Arc::clone(&s.handler))),
            );

            let fired: Vec<SubscriptionId> = selected.iter().map(|(id, _)| *id).collect();
            inner
                .subscriptions
                .retain(|s| !(s.once && fired.contains(&s.id)));

            selected
        };

        for (id, handler) in handlers {
            if let Err(error) = handler(&event) {
                tracing::warn!(
                    subscription = %id,
                    event_type = %event.event_type,
                    %error,
                    "event handler failed"
                );
            }
        }

        let mut inner = self.lock();
        inner.history.push_back(event);
        while inner.history.len() > self.config.max_history_size {
            inner.history.pop_front();
        }
    }

    /// Subscribe to `event_type` (or `*` for every event).
    pub fn on(&self, event_type: EventType, handler: EventHandler) -> SubscriptionId {
        self.subscribe(event_type, handler, false)
    }

    /// Subscribe for a single delivery.
    pub fn once(&self, event_type: EventType, handler: EventHandler) -> SubscriptionId {
        self.subscribe(event_type, handler, true)
    }

    fn subscribe(&self, event_type: EventType, handler: EventHandler, once: bool) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.lock().subscriptions.push(Subscription {
            id,
            event_type,
            handler,
            once,
        });
        id
    }

    /// Remove one subscription. Returns false for an unknown id.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        inner.subscriptions.len() < before
    }

    /// Remove all subscriptions, or only those for `event_type`.
    pub fn remove_all_listeners(&self, event_type: Option<EventType>) {
        let mut inner = self.lock();
        match event_type {
            Some(event_type) => inner.subscriptions.retain(|s| s.event_type != event_type),
            None => inner.subscriptions.clear(),
        }
    }

    /// Number of subscriptions, total or for one type.
    pub fn subscription_count(&self, event_type: Option<EventType>) -> usize {
        let inner = self.lock();
        match event_type {
            Some(event_type) => inner
                .subscriptions
                .iter()
                .filter(|s| s.event_type == event_type)
                .count(),
            None => inner.subscriptions.len(),
        }
    }

    /// Query the history ring, oldest first.
    pub fn history(&self, query: &HistoryQuery) -> Vec<WorkflowEvent> {
        let inner = self.lock();
        let mut events: Vec<WorkflowEvent> = inner
            .history
            .iter()
            .filter(|e| query.event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| query.since.map_or(true, |since| e.timestamp >= since))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            if events.len() > limit {
                events.drain(..events.len() - limit);
            }
        }
        events
    }

    /// Drop every history entry.
    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    /// Resolve with the first event of `event_type` that satisfies the
    /// optional predicate, or fail with [`TimeoutError`] after the
    /// deadline. The internal subscription is removed on both paths.
    pub async fn wait_for(
        &self,
        event_type: EventType,
        timeout: Duration,
        predicate: Option<Box<dyn Fn(&WorkflowEvent) -> bool + Send + Sync>>,
    ) -> Result<WorkflowEvent, TimeoutError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub_id = self.on(
            event_type,
            Arc::new(move |event| {
                if predicate.as_ref().map_or(true, |p| p(event)) {
                    let _ = tx.send(event.clone());
                }
                Ok(())
            }),
        );

        let outcome = tokio::time::timeout(timeout, rx.recv()).await;
        self.off(sub_id);

        match outcome {
            Ok(Some(event)) => Ok(event),
            _ => Err(TimeoutError {
                event_type,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Process-wide convenience bus.
///
/// Core components never reach for this themselves; they accept an
/// injected [`EventBus`]. The global exists for embedding callers that
/// want one shared default instance.
pub fn global_bus() -> &'static Arc<EventBus> {
    static GLOBAL: OnceLock<Arc<EventBus>> = OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(EventBus::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> EventHandler {
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn delivers_to_exact_and_wildcard_subscribers_once_each() {
        let bus = EventBus::default();
        let exact = Arc::new(AtomicUsize::new(0));
        let wildcard = Arc::new(AtomicUsize::new(0));
        let other = Arc::new(AtomicUsize::new(0));

        bus.on(EventType::TaskCreate, counting_handler(Arc::clone(&exact)));
        bus.on(EventType::Wildcard, counting_handler(Arc::clone(&wildcard)));
        bus.on(EventType::TaskFail, counting_handler(Arc::clone(&other)));

        bus.emit(WorkflowEvent::new(EventType::TaskCreate, json!({})));

        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wildcard_subscribers_run_after_exact_subscribers() {
        let bus = EventBus::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        bus.on(
            EventType::Wildcard,
            Arc::new(move |_| {
                o.lock().unwrap().push("wildcard");
                Ok(())
            }),
        );
        let o = Arc::clone(&order);
        bus.on(
            EventType::TaskStart,
            Arc::new(move |_| {
                o.lock().unwrap().push("exact");
                Ok(())
            }),
        );

        bus.emit(WorkflowEvent::new(EventType::TaskStart, json!({})));
        assert_eq!(*order.lock().unwrap(), vec!["exact", "wildcard"]);
    }

    #[test]
    fn handler_failure_does_not_stop_delivery() {
        let bus = EventBus::default();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.on(
            EventType::TaskCreate,
            Arc::new(|_| Err("handler exploded".into())),
        );
        bus.on(EventType::TaskCreate, counting_handler(Arc::clone(&reached)));

        bus.emit(WorkflowEvent::new(EventType::TaskCreate, json!({})));
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn once_subscription_is_removed_before_handler_runs() {
        let bus = Arc::new(EventBus::default());
        let count = Arc::new(AtomicUsize::new(0));

        let bus_inner = Arc::clone(&bus);
        let count_inner = Arc::clone(&count);
        bus.once(
            EventType::TaskStart,
            Arc::new(move |_| {
                count_inner.fetch_add(1, Ordering::SeqCst);
                // Re-entrant emit must not re-deliver to this handler.
                bus_inner.emit(WorkflowEvent::new(EventType::TaskStart, json!({})));
                Ok(())
            }),
        );

        bus.emit(WorkflowEvent::new(EventType::TaskStart, json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscription_count(Some(EventType::TaskStart)), 0);
    }

    #[test]
    fn off_unknown_id_returns_false() {
        let bus = EventBus::default();
        assert!(!bus.off(SubscriptionId::new()));

        let id = bus.on(EventType::TaskFail, Arc::new(|_| Ok(())));
        assert!(bus.off(id));
        assert!(!bus.off(id));
    }

    #[test]
    fn history_is_capped_and_queryable() {
        let bus = EventBus::new(EventBusConfig {
            max_history_size: 5,
        });
        for i in 0..8 {
            bus.emit(WorkflowEvent::new(EventType::TaskProgress, json!({"i": i})));
        }

        let all = bus.history(&HistoryQuery::default());
        assert_eq!(all.len(), 5);
        // Oldest three were dropped.
        assert_eq!(all[0].data["i"], 3);
        assert_eq!(all[4].data["i"], 7);

        let limited = bus.history(&HistoryQuery {
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].data["i"], 7);
    }

    #[test]
    fn history_filters_by_type_and_since() {
        let bus = EventBus::default();
        bus.emit(WorkflowEvent::new(EventType::TaskCreate, json!({})));
        let cutoff = Utc::now();
        bus.emit(WorkflowEvent::new(EventType::TaskComplete, json!({})));

        let created = bus.history(&HistoryQuery {
            event_type: Some(EventType::TaskCreate),
            ..Default::default()
        });
        assert_eq!(created.len(), 1);

        let recent = bus.history(&HistoryQuery {
            since: Some(cutoff),
            ..Default::default()
        });
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_type, EventType::TaskComplete);

        // `*` is not a query wildcard.
        let wildcard = bus.history(&HistoryQuery {
            event_type: Some(EventType::Wildcard),
            ..Default::default()
        });
        assert!(wildcard.is_empty());
    }

    #[test]
    fn wildcard_events_are_not_emittable() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicUsize::new(0));
        bus.on(EventType::Wildcard, counting_handler(Arc::clone(&count)));

        bus.emit(WorkflowEvent::new(EventType::Wildcard, json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(bus.history(&HistoryQuery::default()).is_empty());
    }

    #[tokio::test]
    async fn wait_for_resolves_on_matching_event() {
        let bus = Arc::new(EventBus::default());

        let bus_emit = Arc::clone(&bus);
        let emitter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            bus_emit.emit(WorkflowEvent::new(EventType::TaskComplete, json!({"n": 1})));
            bus_emit.emit(WorkflowEvent::new(EventType::TaskComplete, json!({"n": 2})));
        });

        let event = bus
            .wait_for(
                EventType::TaskComplete,
                Duration::from_secs(1),
                Some(Box::new(|e| e.data["n"] == 2)),
            )
            .await
            .unwrap();
        assert_eq!(event.data["n"], 2);
        emitter.await.unwrap();

        // Internal subscription was removed on success.
        assert_eq!(bus.subscription_count(Some(EventType::TaskComplete)), 0);
    }

    #[tokio::test]
    async fn wait_for_times_out_and_unsubscribes() {
        let bus = EventBus::default();
        let result = bus
            .wait_for(EventType::TaskComplete, Duration::from_millis(20), None)
            .await;

        assert!(result.is_err());
        assert_eq!(bus.subscription_count(None), 0);
    }
}
