//! In-memory transport doubles for protocol tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{result_channel, MessageTransport, ResultHandle, TransportFactory};

/// Shared record of everything the scripted transports were asked to do.
#[derive(Default)]
pub struct TransportLog {
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
}

impl TransportLog {
    pub fn published_topics(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }
}

/// A transport that is immediately ready and, when scripted with a payload,
/// delivers it to the first subscriber. Without a payload the subscription
/// never resolves, exercising the timeout path.
pub struct ScriptedTransport {
    log: Arc<TransportLog>,
    result: Mutex<Option<Vec<u8>>>,
    // keeps unresolved subscriptions pending instead of closing them
    parked: Mutex<Vec<oneshot::Sender<Vec<u8>>>>,
}

#[async_trait]
impl MessageTransport for ScriptedTransport {
    async fn connect(&self) {}

    fn is_ready(&self) -> bool {
        true
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.log
            .published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, _topic: &str) -> Result<ResultHandle> {
        self.log.subscribes.fetch_add(1, Ordering::SeqCst);
        let (tx, handle) = result_channel();
        match self.result.lock().unwrap().take() {
            Some(payload) => {
                let _ = tx.send(payload);
            }
            None => self.parked.lock().unwrap().push(tx),
        }
        Ok(handle)
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<()> {
        self.log.unsubscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory whose transports share one [`TransportLog`] and deliver the same
/// scripted payload on every subscription.
pub struct ScriptedFactory {
    pub log: Arc<TransportLog>,
    result: Option<Vec<u8>>,
}

impl ScriptedFactory {
    /// Every subscription resolves with `payload`.
    pub fn with_result(payload: &[u8]) -> Self {
        Self {
            log: Arc::new(TransportLog::default()),
            result: Some(payload.to_vec()),
        }
    }

    /// Subscriptions never resolve; callers run into their timeout.
    pub fn silent() -> Self {
        Self {
            log: Arc::new(TransportLog::default()),
            result: None,
        }
    }
}

impl TransportFactory for ScriptedFactory {
    fn create(&self) -> Box<dyn MessageTransport> {
        Box::new(ScriptedTransport {
            log: self.log.clone(),
            result: Mutex::new(self.result.clone()),
            parked: Mutex::new(Vec::new()),
        })
    }
}
