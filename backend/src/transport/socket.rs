//! Raw TCP transport with length-prefixed framing.
//!
//! Canonical wire format: every frame is a 4-byte big-endian length header
//! followed by exactly that many payload bytes. Integers travel as a 4-byte
//! big-endian payload inside a frame; topic-addressed messages travel as a
//! JSON envelope `{"topic": ..., "payload": ...}` inside a frame, with the
//! payload as UTF-8 text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{result_channel, MessageTransport, PendingWaiters, ResultHandle, TransportFactory};

/// Upper bound on a single frame; anything larger is a protocol violation.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).context("frame too large")?;
    ensure!(len <= MAX_FRAME_LEN, "frame of {} bytes exceeds limit", len);
    writer.write_u32(len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_u32().await?;
    ensure!(len <= MAX_FRAME_LEN, "frame of {} bytes exceeds limit", len);
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Framed primitives over one TCP stream: integers and opaque blobs. Both
/// sides must agree on which primitive is exchanged next; there is no type
/// tag on the wire.
pub struct FramedStream {
    stream: TcpStream,
}

impl FramedStream {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to {} failed", addr))?;
        Ok(Self::new(stream))
    }

    pub async fn send_bytes(&mut self, payload: &[u8]) -> Result<()> {
        write_frame(&mut self.stream, payload).await
    }

    pub async fn recv_bytes(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.stream).await
    }

    pub async fn send_int(&mut self, value: i32) -> Result<()> {
        self.send_bytes(&value.to_be_bytes()).await
    }

    pub async fn recv_int(&mut self) -> Result<i32> {
        let payload = self.recv_bytes().await?;
        let bytes: [u8; 4] = payload
            .as_slice()
            .try_into()
            .context("integer frame must be exactly 4 bytes")?;
        Ok(i32::from_be_bytes(bytes))
    }
}

/// Topic-addressed message as framed on the socket transport.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    topic: String,
    payload: String,
}

/// Transport over a single TCP connection to the device. A background task
/// reads inbound envelope frames and routes each to the waiter subscribed
/// to its topic.
pub struct SocketTransport {
    addr: String,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    connected: Arc<AtomicBool>,
    pending: PendingWaiters,
}

impl SocketTransport {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            writer: tokio::sync::Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            pending: PendingWaiters::default(),
        }
    }
}

#[async_trait]
impl MessageTransport for SocketTransport {
    async fn connect(&self) {
        let stream = match TcpStream::connect(&self.addr).await {
            Ok(stream) => stream,
            Err(err) => {
                // non-fatal: the caller polls readiness and degrades
                warn!(addr = %self.addr, error = %err, "Failed to connect to device socket");
                return;
            }
        };
        info!(addr = %self.addr, "Connected to device socket");

        let (mut read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        self.connected.store(true, Ordering::SeqCst);

        let connected = self.connected.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(frame) => match serde_json::from_slice::<Envelope>(&frame) {
                        Ok(envelope) => {
                            debug!(topic = %envelope.topic, "Received message");
                            let waiter = pending.lock().unwrap().remove(&envelope.topic);
                            if let Some(tx) = waiter {
                                let _ = tx.send(envelope.payload.into_bytes());
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "Discarding unparseable frame");
                        }
                    },
                    Err(err) => {
                        debug!(error = %err, "Device socket closed");
                        connected.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let envelope = Envelope {
            topic: topic.to_string(),
            payload: String::from_utf8(payload.to_vec())
                .context("socket transport carries UTF-8 payloads only")?,
        };
        let frame = serde_json::to_vec(&envelope)?;

        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => write_frame(writer, &frame).await,
            None => bail!("device socket is not connected"),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<ResultHandle> {
        let (tx, handle) = result_channel();
        self.pending.lock().unwrap().insert(topic.to_string(), tx);
        Ok(handle)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.pending.lock().unwrap().remove(topic);
        Ok(())
    }
}

/// Factory handing each protocol invocation its own socket connection.
pub struct SocketTransportFactory {
    addr: String,
}

impl SocketTransportFactory {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
        }
    }
}

impl TransportFactory for SocketTransportFactory {
    fn create(&self) -> Box<dyn MessageTransport> {
        Box::new(SocketTransport::new(&self.addr))
    }
}
