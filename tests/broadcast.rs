//! Broadcast Hub Integration Tests
//!
//! Delivery isolation between subscribers and join/leave semantics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qaflow::core::{BroadcastHub, ChannelSubscriber, DeliveryError, Subscriber};
use qaflow::domain::{EventKind, LogEvent, Phase};

/// Always refuses delivery
struct BrokenSubscriber;

#[async_trait]
impl Subscriber for BrokenSubscriber {
    fn name(&self) -> &str {
        "broken"
    }

    async fn deliver(&self, _event: &LogEvent) -> Result<(), DeliveryError> {
        Err(DeliveryError::Failed("socket reset".to_string()))
    }
}

fn phase_event(message: &str) -> LogEvent {
    LogEvent::new("Orchestrator", EventKind::PhaseStart, message)
        .with_run("run_hub")
        .with_phase(Phase::Exploration)
}

#[tokio::test]
async fn test_failing_subscriber_does_not_affect_others() {
    let hub = BroadcastHub::with_delivery_timeout(Duration::from_millis(200));
    let (first, mut first_rx) = ChannelSubscriber::new("first", 16);
    let (third, mut third_rx) = ChannelSubscriber::new("third", 16);

    hub.register(Arc::new(first)).await;
    hub.register(Arc::new(BrokenSubscriber)).await;
    hub.register(Arc::new(third)).await;
    assert_eq!(hub.subscriber_count().await, 3);

    hub.broadcast(&phase_event("PHASE 1: APPLICATION EXPLORATION")).await;

    let received = |rx: &mut tokio::sync::mpsc::Receiver<LogEvent>| {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.kind == EventKind::PhaseStart {
                events.push(event);
            }
        }
        events
    };

    let first_events = received(&mut first_rx);
    let third_events = received(&mut third_rx);
    assert_eq!(first_events.len(), 1);
    assert_eq!(third_events.len(), 1);
    assert_eq!(first_events[0].message, "PHASE 1: APPLICATION EXPLORATION");

    // The failing subscriber stays registered until its transport leaves
    assert_eq!(hub.subscriber_count().await, 3);
}

#[tokio::test]
async fn test_late_joiner_sees_only_later_events() {
    let hub = BroadcastHub::new();
    let (early, mut early_rx) = ChannelSubscriber::new("early", 16);
    hub.register(Arc::new(early)).await;

    hub.broadcast(&phase_event("before")).await;

    let (late, mut late_rx) = ChannelSubscriber::new("late", 16);
    let late_id = hub.register(Arc::new(late)).await;
    hub.broadcast(&phase_event("after")).await;

    let messages = |rx: &mut tokio::sync::mpsc::Receiver<LogEvent>| {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.run_id.is_some() {
                out.push(event.message);
            }
        }
        out
    };

    assert_eq!(messages(&mut early_rx), vec!["before", "after"]);
    assert_eq!(messages(&mut late_rx), vec!["after"]);

    assert!(hub.unregister(late_id).await);
    assert!(!hub.unregister(late_id).await);
    assert_eq!(hub.subscriber_count().await, 1);
}

#[tokio::test]
async fn test_membership_notices() {
    let hub = BroadcastHub::new();
    let (watcher, mut rx) = ChannelSubscriber::new("watcher", 16);
    hub.register(Arc::new(watcher)).await;

    let (other, _other_rx) = ChannelSubscriber::new("other", 16);
    let other_id = hub.register(Arc::new(other)).await;
    hub.unregister(other_id).await;

    let notices: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| {
            assert_eq!(e.source, "System");
            e.message
        })
        .collect();
    assert_eq!(
        notices,
        vec![
            "New client connected. Total clients: 1",
            "New client connected. Total clients: 2",
            "Client disconnected. Total clients: 1",
        ]
    );
}
