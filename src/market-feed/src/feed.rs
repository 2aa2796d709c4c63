//! Network-facing streaming order-book client (spec.md §4.1).

use std::time::Duration;

use common::{Clock, PriceSnapshot};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use crate::message::{parse_message, FeedMessage, SubscribeRequest};
use crate::state::FeedState;
use crate::FeedError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const HEARTBEAT_INTERVAL_MS: i64 = 30_000;
const HEARTBEAT_TIMEOUT_MS: i64 = 60_000;
const READ_POLL_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct MarketFeedConfig {
    pub ws_url: String,
    pub reconnect_delay_ms: u64,
    pub max_reconnects: u32,
}

impl Default for MarketFeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws".to_string(),
            reconnect_delay_ms: 1_000,
            max_reconnects: 10,
        }
    }
}

/// Exponential backoff delay for the n-th reconnect attempt (1-indexed),
/// per spec.md §4.1: `reconnect_delay · 2^(attempt-1)`.
pub fn reconnect_delay_for_attempt(base_delay_ms: u64, attempt: u32) -> Duration {
    let multiplier = 1u64 << attempt.saturating_sub(1).min(20);
    Duration::from_millis(base_delay_ms.saturating_mul(multiplier))
}

/// Maintains a persistent streaming subscription to the venue's market
/// channel and normalizes inbound messages into [`PriceSnapshot`]s.
pub struct MarketFeed {
    config: MarketFeedConfig,
    state: FeedState,
    ws: Option<WsStream>,
    last_inbound_ms: i64,
    last_ping_ms: i64,
}

impl MarketFeed {
    pub fn new(config: MarketFeedConfig, up_token_id: String, down_token_id: String) -> Self {
        Self {
            config,
            state: FeedState::new(up_token_id, down_token_id),
            ws: None,
            last_inbound_ms: 0,
            last_ping_ms: 0,
        }
    }

    pub fn set_round_id(&mut self, round_id: String) {
        self.state.set_round_id(round_id);
    }

    /// Declares the tracked token pair. Idempotent; re-subscribes
    /// transparently if already connected.
    pub async fn set_tokens(&mut self, up_token_id: String, down_token_id: String) -> Result<(), FeedError> {
        let changed = self.state.up_token_id() != up_token_id || self.state.down_token_id() != down_token_id;
        self.state.set_tokens(up_token_id, down_token_id);
        if changed && self.ws.is_some() {
            self.subscribe().await?;
        }
        Ok(())
    }

    pub async fn connect(&mut self, clock: &dyn Clock) -> Result<(), FeedError> {
        let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&self.config.ws_url))
            .await
            .map_err(|_| FeedError::HeartbeatTimeout)??;
        self.ws = Some(ws);
        // Seed at connection time, not at first inbound frame, so a
        // connection that opens but never delivers anything is still
        // force-terminated after HEARTBEAT_TIMEOUT_MS (spec.md §4.1).
        self.last_inbound_ms = clock.now_ms();
        self.last_ping_ms = clock.now_ms();
        self.subscribe().await?;
        Ok(())
    }

    /// Connects, retrying with exponential backoff up to `max_reconnects`.
    pub async fn connect_with_retry(&mut self, clock: &dyn Clock) -> Result<(), FeedError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.connect(clock).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.config.max_reconnects => {
                    warn!(attempts = attempt, error = %e, "reconnect attempts exhausted");
                    return Err(FeedError::ReconnectExhausted(attempt));
                }
                Err(e) => {
                    let delay = reconnect_delay_for_attempt(self.config.reconnect_delay_ms, attempt);
                    warn!(attempt, ?delay, error = %e, "feed connect failed, backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn subscribe(&mut self) -> Result<(), FeedError> {
        let Some(ws) = self.ws.as_mut() else {
            return Ok(());
        };
        let req = SubscribeRequest::market(vec![
            self.state.up_token_id().to_string(),
            self.state.down_token_id().to_string(),
        ]);
        let payload = serde_json::to_string(&req).expect("SubscribeRequest always serializes");
        ws.send(Message::Text(payload.into())).await?;
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), FeedError> {
        if let Some(mut ws) = self.ws.take() {
            let _ = ws
                .close(Some(CloseFrame {
                    code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Normal,
                    reason: "bye".into(),
                }))
                .await;
        }
        Ok(())
    }

    pub fn latest_snapshot(&self) -> Option<PriceSnapshot> {
        self.state.latest_snapshot()
    }

    pub fn recent_snapshots(&self, window_ms: i64, now_ms: i64) -> Vec<PriceSnapshot> {
        self.state.recent_snapshots(window_ms, now_ms)
    }

    pub fn order_book_snapshot(&self, now_ms: i64) -> (common::OrderBook, common::OrderBook, i64) {
        (
            self.state.order_book(common::Side::Up).clone(),
            self.state.order_book(common::Side::Down).clone(),
            now_ms,
        )
    }

    /// Reads and applies the next inbound message, sending a heartbeat ping
    /// when due and force-reconnecting on a stalled connection. Returns the
    /// derived snapshot, if any.
    pub async fn receive_next(&mut self, clock: &dyn Clock) -> Result<Option<PriceSnapshot>, FeedError> {
        let now = clock.now_ms();
        if now - self.last_ping_ms >= HEARTBEAT_INTERVAL_MS {
            self.send_ping().await?;
            self.last_ping_ms = now;
        }
        if now - self.last_inbound_ms >= HEARTBEAT_TIMEOUT_MS {
            warn!("no inbound traffic or pong within heartbeat timeout, forcing reconnect");
            self.disconnect().await?;
            self.connect_with_retry(clock).await?;
            return Ok(None);
        }

        let Some(ws) = self.ws.as_mut() else {
            return Err(FeedError::ChannelClosed);
        };

        let next = tokio::time::timeout(READ_POLL_TIMEOUT, ws.next()).await;
        match next {
            Err(_) => Ok(None), // poll timeout, not a connection error; caller re-polls
            Ok(None) => {
                self.disconnect().await?;
                self.connect_with_retry(clock).await?;
                Ok(None)
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "websocket read error, reconnecting");
                self.disconnect().await?;
                self.connect_with_retry(clock).await?;
                Err(FeedError::Connection(e))
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                self.last_inbound_ms = clock.now_ms();
                let parsed = parse_message(&text)?;
                Ok(self.state.handle_message(parsed, clock.now_ms()))
            }
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => {
                self.last_inbound_ms = clock.now_ms();
                Ok(None)
            }
            Ok(Some(Ok(Message::Close(frame)))) => {
                let normal = frame
                    .as_ref()
                    .map(|f| f.code == tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Normal)
                    .unwrap_or(false);
                info!(normal, "feed connection closed");
                self.ws = None;
                if !normal {
                    self.connect_with_retry(clock).await?;
                }
                Ok(None)
            }
            Ok(Some(Ok(_))) => Ok(None),
        }
    }

    async fn send_ping(&mut self) -> Result<(), FeedError> {
        if let Some(ws) = self.ws.as_mut() {
            ws.send(Message::Ping(Vec::new().into())).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_resets_per_attempt() {
        assert_eq!(reconnect_delay_for_attempt(1_000, 1), Duration::from_millis(1_000));
        assert_eq!(reconnect_delay_for_attempt(1_000, 2), Duration::from_millis(2_000));
        assert_eq!(reconnect_delay_for_attempt(1_000, 3), Duration::from_millis(4_000));
        assert_eq!(reconnect_delay_for_attempt(500, 4), Duration::from_millis(4_000));
    }
}
