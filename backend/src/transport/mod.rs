//! Message transports to the activity device.
//!
//! Two interchangeable channels carry the start/stop/performance traffic: an
//! MQTT broker client and a raw TCP socket with length-prefixed framing.
//! Subscriptions hand back a [`ResultHandle`] private to the subscribing
//! call and resolved exactly once by the first matching inbound message, so
//! concurrent protocol invocations can never observe each other's results.

pub mod mqtt;
pub mod socket;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;

/// Granularity of readiness polling.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Topic the device listens on for the start signal of an activity.
pub fn start_topic(activity_id: i64) -> String {
    format!("activity/start/{}", activity_id)
}

/// Topic the device listens on for the stop signal of an activity.
pub fn stop_topic(activity_id: i64) -> String {
    format!("activity/stop/{}", activity_id)
}

/// Topic the device reports performance data on when a run ends.
pub fn performance_topic(activity_id: i64) -> String {
    format!("activity/performance/{}", activity_id)
}

/// Subscriptions waiting for their first matching message, keyed by topic.
pub(crate) type PendingWaiters = Arc<Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>>;

/// One subscription's receiving end. Consumed by awaiting; resolved at most
/// once.
#[derive(Debug)]
pub struct ResultHandle {
    rx: oneshot::Receiver<Vec<u8>>,
}

/// Create a connected (sender, handle) pair for one subscription.
pub fn result_channel() -> (oneshot::Sender<Vec<u8>>, ResultHandle) {
    let (tx, rx) = oneshot::channel();
    (tx, ResultHandle { rx })
}

impl ResultHandle {
    /// Wait up to `window` for the subscription to resolve. `None` means no
    /// message arrived in time (or the transport dropped the subscription).
    pub async fn await_within(self, window: Duration) -> Option<Vec<u8>> {
        match tokio::time::timeout(window, self.rx).await {
            Ok(Ok(payload)) => Some(payload),
            _ => None,
        }
    }
}

/// Duplex channel to the external device.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Establish the channel. Network failure is logged, never fatal to the
    /// caller; poll [`MessageTransport::is_ready`] for readiness.
    async fn connect(&self);

    /// Whether the channel is currently established.
    fn is_ready(&self) -> bool;

    /// Fire-and-forget publish.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Register interest in a topic; the handle resolves on the first
    /// matching message.
    async fn subscribe(&self, topic: &str) -> Result<ResultHandle>;

    /// Deregister interest and drop any waiter for the topic.
    async fn unsubscribe(&self, topic: &str) -> Result<()>;
}

/// Builds one transport per protocol invocation. Each `stop` call gets its
/// own connection and subscription; a transport instance is never shared
/// across concurrent requests.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn MessageTransport>;
}

/// Poll a transport for readiness for up to `window`. Returns the final
/// readiness state.
pub async fn await_ready(transport: &dyn MessageTransport, window: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        if transport.is_ready() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
