//! Concurrent fan-out of progress events to live subscribers.
//!
//! Delivery is best effort. Each subscriber is delivered to independently
//! and bounded by a timeout; a failure is logged and affects nobody else.
//! `broadcast` returns only after every delivery finished or timed out, so a
//! single subscriber observes one emitter's events in emission order.
//!
//! The hub never prunes subscribers on its own. A subscriber that keeps
//! failing stays registered until the transport unregisters it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::LogEvent;

/// Default bound on a single delivery
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Source label for membership notices
const HUB_SOURCE: &str = "System";

/// Errors a subscriber can report for one delivery
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Subscriber connection closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// A sink for progress events (a WebSocket, a channel, a log file)
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str {
        "subscriber"
    }

    /// Deliver one event
    async fn deliver(&self, event: &LogEvent) -> Result<(), DeliveryError>;
}

/// Handle returned by `register`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of live subscribers shared by every run in the process
pub struct BroadcastHub {
    subscribers: RwLock<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    delivery_timeout: Duration,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_delivery_timeout(DEFAULT_DELIVERY_TIMEOUT)
    }

    /// Hub with a custom per-subscriber delivery bound
    pub fn with_delivery_timeout(delivery_timeout: Duration) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            delivery_timeout,
        }
    }

    /// Add a subscriber and announce it to everyone, itself included
    pub async fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId::new();
        let name = subscriber.name().to_string();
        let total = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(id, subscriber);
            subscribers.len()
        };

        debug!(%id, subscriber = %name, total, "Subscriber registered");
        self.broadcast(&LogEvent::log(
            HUB_SOURCE,
            format!("New client connected. Total clients: {}", total),
        ))
        .await;
        id
    }

    /// Remove a subscriber and announce the departure.
    ///
    /// Returns false if the id was not registered.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, total) = {
            let mut subscribers = self.subscribers.write().await;
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };

        if removed {
            debug!(%id, total, "Subscriber unregistered");
            self.broadcast(&LogEvent::log(
                HUB_SOURCE,
                format!("Client disconnected. Total clients: {}", total),
            ))
            .await;
        }
        removed
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Deliver an event to every current subscriber concurrently
    pub async fn broadcast(&self, event: &LogEvent) {
        // Snapshot so the lock is not held across deliveries
        let targets: Vec<(SubscriberId, Arc<dyn Subscriber>)> = {
            let subscribers = self.subscribers.read().await;
            if subscribers.is_empty() {
                return;
            }
            subscribers
                .iter()
                .map(|(id, sub)| (*id, Arc::clone(sub)))
                .collect()
        };

        let deliveries = targets.iter().map(|(id, subscriber)| async move {
            match tokio::time::timeout(self.delivery_timeout, subscriber.deliver(event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(%id, subscriber = subscriber.name(), error = %e, "Event delivery failed");
                }
                Err(_) => {
                    warn!(
                        %id,
                        subscriber = subscriber.name(),
                        timeout_ms = self.delivery_timeout.as_millis() as u64,
                        "Event delivery timed out"
                    );
                }
            }
        });

        join_all(deliveries).await;
    }
}

/// Subscriber backed by a bounded tokio channel.
///
/// A full channel waits (up to the hub's timeout); a dropped receiver
/// reports `Closed`.
pub struct ChannelSubscriber {
    name: String,
    tx: mpsc::Sender<LogEvent>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiving end of its channel
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<LogEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, event: &LogEvent) -> Result<(), DeliveryError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}
