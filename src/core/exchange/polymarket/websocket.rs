//! Polymarket market-data WebSocket client.
//!
//! One long-lived connection. The subscription set is retained and re-sent
//! after every reconnect; heartbeat silence beyond the configured timeout
//! forces a reconnect with exponential backoff and jitter.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{parse_frame, SubscribeMessage};
use crate::core::domain::{IngestEvent, TokenId};
use crate::error::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub heartbeat_timeout: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

/// Why a connection ended.
enum StreamEnd {
    Shutdown,
    Disconnected(String),
}

/// Long-lived market data stream.
///
/// Events are fanned out on a broadcast channel; slow consumers lag and
/// drop the oldest events rather than stalling the receive loop.
pub struct MarketStream {
    config: StreamConfig,
    subscriptions: watch::Receiver<Vec<TokenId>>,
    events: broadcast::Sender<IngestEvent>,
    reconnect_count: u64,
}

impl MarketStream {
    #[must_use]
    pub fn new(
        config: StreamConfig,
        subscriptions: watch::Receiver<Vec<TokenId>>,
        events: broadcast::Sender<IngestEvent>,
    ) -> Self {
        Self {
            config,
            subscriptions,
            events,
            reconnect_count: 0,
        }
    }

    /// Run until shutdown. Reconnects forever with capped backoff.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut delay = self.config.initial_reconnect_delay;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.connect_and_stream(&mut shutdown).await {
                Ok(StreamEnd::Shutdown) => break,
                Ok(StreamEnd::Disconnected(reason)) => {
                    self.reconnect_count += 1;
                    warn!(
                        reason = %reason,
                        reconnects = self.reconnect_count,
                        "Stream disconnected, will reconnect"
                    );
                }
                Err(e) => {
                    self.reconnect_count += 1;
                    warn!(
                        error = %e,
                        reconnects = self.reconnect_count,
                        "Stream connection failed, will reconnect"
                    );
                }
            }

            let wait = jittered(delay);
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
            delay = (delay * 2).min(self.config.max_reconnect_delay);
        }

        info!(reconnects = self.reconnect_count, "Market stream stopped");
    }

    async fn connect_and_stream(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<StreamEnd> {
        info!(url = %self.config.url, "Connecting to WebSocket");
        let (mut ws, response) = connect_async(&self.config.url).await?;
        info!(status = %response.status(), "WebSocket connected");

        let tokens = self.subscriptions.borrow().clone();
        Self::subscribe(&mut ws, &tokens).await?;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = ws.close(None).await;
                        return Ok(StreamEnd::Shutdown);
                    }
                }
                changed = self.subscriptions.changed() => {
                    if changed.is_ok() {
                        let tokens = self.subscriptions.borrow().clone();
                        Self::subscribe(&mut ws, &tokens).await?;
                    }
                }
                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping");
                            ws.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Ok(StreamEnd::Disconnected(
                                frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                            ));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Ok(StreamEnd::Disconnected(e.to_string()));
                        }
                        None => {
                            return Ok(StreamEnd::Disconnected("stream ended".into()));
                        }
                    }
                }
                () = tokio::time::sleep(self.config.heartbeat_timeout) => {
                    return Ok(StreamEnd::Disconnected("heartbeat timeout".into()));
                }
            }
        }
    }

    async fn subscribe(ws: &mut WsStream, tokens: &[TokenId]) -> Result<()> {
        let asset_ids: Vec<String> = tokens.iter().map(|t| t.as_str().to_string()).collect();
        info!(assets = asset_ids.len(), "Subscribing to assets");
        let msg = SubscribeMessage::new(asset_ids);
        ws.send(Message::Text(serde_json::to_string(&msg)?)).await?;
        Ok(())
    }

    fn handle_text(&self, text: &str) {
        match parse_frame(text) {
            Ok(events) => {
                for event in events {
                    match &event {
                        IngestEvent::Ack => debug!("Subscription acknowledged"),
                        IngestEvent::Heartbeat => debug!("Heartbeat"),
                        _ => {
                            // Send fails only when nobody is listening.
                            let _ = self.events.send(event);
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, raw = %text, "Failed to parse frame");
            }
        }
    }
}

/// Up to 20% random jitter to avoid synchronized reconnection storms.
fn jittered(delay: Duration) -> Duration {
    let jitter_range = delay.as_millis() as u64 / 5;
    if jitter_range == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_range);
    delay + Duration::from_millis(jitter)
}
