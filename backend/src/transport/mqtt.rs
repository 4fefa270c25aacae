//! MQTT broker client transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, info, warn};

use super::{result_channel, MessageTransport, PendingWaiters, ResultHandle, TransportFactory};

/// Transport over an MQTT broker. A background task drives the rumqttc
/// event loop and routes each inbound publish to the waiter subscribed to
/// its topic; a message with no waiter is dropped.
pub struct MqttTransport {
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    connected: Arc<AtomicBool>,
    pending: PendingWaiters,
}

impl MqttTransport {
    /// Build an unconnected transport. Every instance carries its own
    /// client id so per-call transports never collide at the broker.
    pub fn new(host: &str, port: u16) -> Self {
        let client_id = format!("activity-coordinator-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, event_loop) = AsyncClient::new(options, 16);
        Self {
            client,
            event_loop: Mutex::new(Some(event_loop)),
            connected: Arc::new(AtomicBool::new(false)),
            pending: PendingWaiters::default(),
        }
    }
}

#[async_trait]
impl MessageTransport for MqttTransport {
    async fn connect(&self) {
        // second connect is a no-op; the event loop is already running
        let Some(mut event_loop) = self.event_loop.lock().unwrap().take() else {
            return;
        };

        let connected = self.connected.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        connected.store(true, Ordering::SeqCst);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, "Received message");
                        let waiter = pending.lock().unwrap().remove(&publish.topic);
                        if let Some(tx) = waiter {
                            let _ = tx.send(publish.payload.to_vec());
                        }
                    }
                    Ok(_) => {}
                    // the owning transport was dropped; wind the task down
                    Err(ConnectionError::RequestsDone) => break,
                    Err(err) => {
                        connected.store(false, Ordering::SeqCst);
                        warn!(error = %err, "MQTT connection error, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .with_context(|| format!("publish to {} failed", topic))
    }

    async fn subscribe(&self, topic: &str) -> Result<ResultHandle> {
        let (tx, handle) = result_channel();
        // register the waiter before the broker can deliver anything
        self.pending.lock().unwrap().insert(topic.to_string(), tx);
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .with_context(|| format!("subscribe to {} failed", topic))?;
        Ok(handle)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.pending.lock().unwrap().remove(topic);
        self.client
            .unsubscribe(topic)
            .await
            .with_context(|| format!("unsubscribe from {} failed", topic))
    }
}

/// Factory handing each protocol invocation its own broker connection.
pub struct MqttTransportFactory {
    host: String,
    port: u16,
}

impl MqttTransportFactory {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl TransportFactory for MqttTransportFactory {
    fn create(&self) -> Box<dyn MessageTransport> {
        Box::new(MqttTransport::new(&self.host, self.port))
    }
}
