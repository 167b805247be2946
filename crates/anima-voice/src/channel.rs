//! Duplex event channel to the conversation backend.
//!
//! The session talks to the transport through the `EventChannel` /
//! `ChannelConnector` seams so tests can substitute an in-memory channel.
//! The production implementation speaks JSON text frames over a WebSocket,
//! with a bounded number of connection attempts before giving up.

use crate::error::{VoiceError, VoiceResult};
use crate::protocol::{ClientEvent, ServerEvent};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Backend URL, e.g. `ws://localhost:3000/voice`.
    pub url: String,

    /// Connection attempts before the connect fails (default: 5).
    pub connect_attempts: u32,

    /// Delay between attempts (default: 500ms).
    pub retry_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000".to_string(),
            connect_attempts: 5,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Transport-level notifications surfaced alongside decoded server events.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A decoded event from the remote service.
    Message(ServerEvent),
    /// The remote hung up cleanly.
    Closed { reason: Option<String> },
    /// The transport failed mid-stream.
    TransportError(String),
}

/// A live duplex channel: emit named events, or tear the connection down.
pub trait EventChannel: Send + Sync {
    fn emit(&self, event: ClientEvent) -> VoiceResult<()>;
    fn disconnect(&self);
}

/// Opens channels. The session owns one connector for its lifetime and
/// calls it once per pairing.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(
        &self,
        config: &ChannelConfig,
    ) -> VoiceResult<(Arc<dyn EventChannel>, mpsc::UnboundedReceiver<ChannelEvent>)>;
}

enum Outbound {
    Event(ClientEvent),
    Close,
}

/// WebSocket-backed event channel.
pub struct WebSocketChannel {
    out_tx: mpsc::UnboundedSender<Outbound>,
}

impl WebSocketChannel {
    /// Connect with bounded retries; resolves once the handshake completes.
    /// Returns the channel plus the stream of incoming events.
    pub async fn connect(
        config: &ChannelConfig,
    ) -> VoiceResult<(Arc<dyn EventChannel>, mpsc::UnboundedReceiver<ChannelEvent>)> {
        let mut last_error = String::new();
        for attempt in 1..=config.connect_attempts.max(1) {
            match connect_async(config.url.as_str()).await {
                Ok((ws, _response)) => {
                    info!(
                        "Channel: connected to {} (attempt {})",
                        config.url, attempt
                    );
                    return Ok(Self::wire_up(ws));
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        "Channel: connect attempt {}/{} failed: {}",
                        attempt, config.connect_attempts, last_error
                    );
                    if attempt < config.connect_attempts {
                        tokio::time::sleep(config.retry_delay).await;
                    }
                }
            }
        }
        Err(VoiceError::Channel(format!(
            "could not connect to {} after {} attempts: {}",
            config.url, config.connect_attempts, last_error
        )))
    }

    fn wire_up(
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> (Arc<dyn EventChannel>, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();

        // Writer: serialize outgoing events; a Close drains the task.
        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Event(event) => {
                        let text = match serde_json::to_string(&event) {
                            Ok(t) => t,
                            Err(e) => {
                                warn!("Channel: could not serialize event: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            warn!("Channel: send failed: {}", e);
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        // Reader: decode incoming frames into channel events.
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match ServerEvent::parse(&text) {
                        Ok(event) => {
                            if event_tx.send(ChannelEvent::Message(event)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Channel: ignoring frame: {}", e),
                    },
                    Ok(Message::Close(close)) => {
                        let reason = close.map(|c| c.reason.to_string());
                        debug!("Channel: closed by remote: {:?}", reason);
                        let _ = event_tx.send(ChannelEvent::Closed { reason });
                        break;
                    }
                    Ok(_) => {} // ping/pong/binary: nothing to do
                    Err(e) => {
                        let _ = event_tx.send(ChannelEvent::TransportError(e.to_string()));
                        break;
                    }
                }
            }
        });

        (Arc::new(WebSocketChannel { out_tx }), event_rx)
    }
}

impl EventChannel for WebSocketChannel {
    fn emit(&self, event: ClientEvent) -> VoiceResult<()> {
        self.out_tx
            .send(Outbound::Event(event))
            .map_err(|_| VoiceError::ChannelSend("channel is closed".to_string()))
    }

    fn disconnect(&self) {
        let _ = self.out_tx.send(Outbound::Close);
    }
}

/// Production connector for `WebSocketChannel`.
#[derive(Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(
        &self,
        config: &ChannelConfig,
    ) -> VoiceResult<(Arc<dyn EventChannel>, mpsc::UnboundedReceiver<ChannelEvent>)> {
        WebSocketChannel::connect(config).await
    }
}
