//! Pure, network-free order-book normalization and snapshot bookkeeping.
//!
//! Kept separate from the network-facing [`crate::feed::MarketFeed`] so the
//! message-handling rules of spec.md §4.1 are unit-testable without a
//! WebSocket server.

use std::collections::VecDeque;

use common::{OrderBook, OrderBookLevel, PriceSnapshot, Side};
use rust_decimal::Decimal;
use tracing::warn;

use crate::message::{BookMessage, FeedMessage, PriceChangeMessage};

/// Capacity of the bounded snapshot ring buffer (spec.md §3, §4.1).
pub const SNAPSHOT_BUFFER_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct FeedState {
    up_token_id: String,
    down_token_id: String,
    up_book: OrderBook,
    down_book: OrderBook,
    snapshots: VecDeque<PriceSnapshot>,
    round_id: String,
}

impl FeedState {
    pub fn new(up_token_id: String, down_token_id: String) -> Self {
        Self {
            up_token_id,
            down_token_id,
            up_book: OrderBook::default(),
            down_book: OrderBook::default(),
            snapshots: VecDeque::with_capacity(SNAPSHOT_BUFFER_CAPACITY),
            round_id: "static".to_string(),
        }
    }

    /// Declares the tracked token pair, resetting both order books.
    /// Idempotent: calling with the same pair twice is a no-op on the books.
    pub fn set_tokens(&mut self, up_token_id: String, down_token_id: String) {
        if self.up_token_id == up_token_id && self.down_token_id == down_token_id {
            return;
        }
        self.up_token_id = up_token_id;
        self.down_token_id = down_token_id;
        self.up_book = OrderBook::default();
        self.down_book = OrderBook::default();
    }

    pub fn set_round_id(&mut self, round_id: String) {
        self.round_id = round_id;
    }

    pub fn up_token_id(&self) -> &str {
        &self.up_token_id
    }

    pub fn down_token_id(&self) -> &str {
        &self.down_token_id
    }

    fn side_for_asset(&self, asset_id: &str) -> Option<Side> {
        if asset_id == self.up_token_id {
            Some(Side::Up)
        } else if asset_id == self.down_token_id {
            Some(Side::Down)
        } else {
            None
        }
    }

    fn book_mut(&mut self, side: Side) -> &mut OrderBook {
        match side {
            Side::Up => &mut self.up_book,
            Side::Down => &mut self.down_book,
        }
    }

    pub fn order_book(&self, side: Side) -> &OrderBook {
        match side {
            Side::Up => &self.up_book,
            Side::Down => &self.down_book,
        }
    }

    /// Applies one inbound message and returns the derived `PriceSnapshot`
    /// when the message is one that should emit one (spec.md §4.1).
    pub fn handle_message(&mut self, msg: FeedMessage, now_ms: i64) -> Option<PriceSnapshot> {
        match msg {
            FeedMessage::Book(book) => self.apply_book(&book, now_ms),
            FeedMessage::Books(books) => {
                let mut last = None;
                for book in &books {
                    last = self.apply_book(book, now_ms).or(last);
                }
                last
            }
            FeedMessage::PriceChange(pc) => self.apply_price_change(&pc, now_ms),
            FeedMessage::Trade(_trade) => Some(self.emit_snapshot(now_ms)),
            FeedMessage::Subscribed | FeedMessage::Unsubscribed | FeedMessage::Heartbeat => None,
            FeedMessage::Error(err) => {
                warn!(code = ?err.code, message = ?err.message, "feed reported an error event");
                None
            }
            FeedMessage::Unknown(raw) => {
                warn!(len = raw.len(), "dropped malformed or unrecognized feed message");
                None
            }
        }
    }

    fn apply_book(&mut self, book: &BookMessage, now_ms: i64) -> Option<PriceSnapshot> {
        let side = self.side_for_asset(&book.asset_id)?;
        let bids: Vec<OrderBookLevel> = book
            .bids
            .iter()
            .filter_map(|l| Some(OrderBookLevel { price: l.price_decimal()?, size: l.size_decimal()? }))
            .collect();
        let asks: Vec<OrderBookLevel> = book
            .asks
            .iter()
            .filter_map(|l| Some(OrderBookLevel { price: l.price_decimal()?, size: l.size_decimal()? }))
            .collect();
        self.book_mut(side).replace(bids, asks, now_ms);
        Some(self.emit_snapshot(now_ms))
    }

    fn apply_price_change(&mut self, pc: &PriceChangeMessage, now_ms: i64) -> Option<PriceSnapshot> {
        let mut touched = false;
        for change in pc.changes() {
            let Some(side) = self.side_for_asset(&change.asset_id) else {
                continue;
            };
            let best_bid = change.best_bid.as_deref().and_then(|s| s.parse::<Decimal>().ok());
            let best_ask = change.best_ask.as_deref().and_then(|s| s.parse::<Decimal>().ok());
            if best_bid.is_none() && best_ask.is_none() {
                continue;
            }
            self.book_mut(side).apply_top_of_book(best_bid, best_ask, now_ms);
            touched = true;
        }
        touched.then(|| self.emit_snapshot(now_ms))
    }

    /// Builds and records the derived snapshot (spec.md §4.1 "Derived
    /// snapshot rule"). `seconds_remaining` is always 0 here: `RoundManager`
    /// is authoritative for timing.
    fn emit_snapshot(&mut self, now_ms: i64) -> PriceSnapshot {
        let snapshot = PriceSnapshot {
            timestamp_ms: now_ms,
            round_id: self.round_id.clone(),
            seconds_remaining: 0,
            up_token_id: self.up_token_id.clone(),
            down_token_id: self.down_token_id.clone(),
            up_best_ask: self.up_book.best_ask(),
            up_best_bid: self.up_book.best_bid(),
            down_best_ask: self.down_book.best_ask(),
            down_best_bid: self.down_book.best_bid(),
        };
        if self.snapshots.len() == SNAPSHOT_BUFFER_CAPACITY {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot.clone());
        snapshot
    }

    pub fn latest_snapshot(&self) -> Option<PriceSnapshot> {
        self.snapshots.back().cloned()
    }

    /// Snapshots whose `timestamp_ms >= now_ms - window_ms`, oldest first.
    pub fn recent_snapshots(&self, window_ms: i64, now_ms: i64) -> Vec<PriceSnapshot> {
        let cutoff = now_ms - window_ms;
        self.snapshots
            .iter()
            .rev()
            .take_while(|s| s.timestamp_ms >= cutoff)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{parse_message, FeedMessage};
    use rust_decimal_macros::dec;

    fn state() -> FeedState {
        FeedState::new("up-tok".to_string(), "down-tok".to_string())
    }

    #[test]
    fn book_message_replaces_levels_and_emits_snapshot() {
        let mut s = state();
        let msg = parse_message(
            r#"{"event_type":"book","asset_id":"up-tok","bids":[{"price":"0.40","size":"10"}],"asks":[{"price":"0.45","size":"5"}]}"#,
        )
        .unwrap();
        let snap = s.handle_message(msg, 1_000).unwrap();
        assert_eq!(snap.up_best_ask, dec!(0.45));
        assert_eq!(snap.up_best_bid, dec!(0.40));
        assert_eq!(snap.down_best_ask, Decimal::ZERO);
        assert_eq!(snap.round_id, "static");
    }

    #[test]
    fn book_message_drops_zero_size_levels() {
        let mut s = state();
        let msg = parse_message(
            r#"{"event_type":"book","asset_id":"up-tok","bids":[{"price":"0.40","size":"0"}],"asks":[{"price":"0.45","size":"5"}]}"#,
        )
        .unwrap();
        s.handle_message(msg, 1_000);
        assert_eq!(s.order_book(Side::Up).bids.len(), 0);
    }

    #[test]
    fn price_change_updates_only_level_zero() {
        let mut s = state();
        let book = parse_message(
            r#"{"event_type":"book","asset_id":"down-tok","bids":[{"price":"0.50","size":"10"}],"asks":[{"price":"0.55","size":"5"}]}"#,
        )
        .unwrap();
        s.handle_message(book, 1_000);

        let change = parse_message(
            r#"{"event_type":"price_change","asset_id":"down-tok","best_ask":"0.52"}"#,
        )
        .unwrap();
        let snap = s.handle_message(change, 1_500).unwrap();
        assert_eq!(snap.down_best_ask, dec!(0.52));
        assert_eq!(snap.down_best_bid, dec!(0.50));
    }

    #[test]
    fn unknown_asset_id_is_ignored() {
        let mut s = state();
        let msg = parse_message(r#"{"event_type":"book","asset_id":"other","bids":[],"asks":[]}"#).unwrap();
        assert!(s.handle_message(msg, 1_000).is_none());
    }

    #[test]
    fn ring_buffer_evicts_oldest_beyond_capacity() {
        let mut s = state();
        for i in 0..(SNAPSHOT_BUFFER_CAPACITY + 10) {
            let msg = FeedMessage::Trade(crate::message::TradeMessage {
                asset_id: "up-tok".to_string(),
                price: "0.5".to_string(),
            });
            s.handle_message(msg, i as i64);
        }
        assert_eq!(s.snapshots.len(), SNAPSHOT_BUFFER_CAPACITY);
        assert_eq!(s.snapshots.front().unwrap().timestamp_ms, 10);
    }

    #[test]
    fn recent_snapshots_filters_by_window() {
        let mut s = state();
        for i in 0..5 {
            let msg = FeedMessage::Trade(crate::message::TradeMessage {
                asset_id: "up-tok".to_string(),
                price: "0.5".to_string(),
            });
            s.handle_message(msg, i * 1000);
        }
        let recent = s.recent_snapshots(1500, 4000);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp_ms, 3000);
        assert_eq!(recent[1].timestamp_ms, 4000);
    }

    #[test]
    fn set_tokens_is_idempotent_and_resets_books_on_change() {
        let mut s = state();
        let book = parse_message(
            r#"{"event_type":"book","asset_id":"up-tok","bids":[{"price":"0.40","size":"10"}],"asks":[]}"#,
        )
        .unwrap();
        s.handle_message(book, 1_000);
        assert_eq!(s.order_book(Side::Up).bids.len(), 1);

        s.set_tokens("up-tok".to_string(), "down-tok".to_string());
        assert_eq!(s.order_book(Side::Up).bids.len(), 1, "same pair must be a no-op");

        s.set_tokens("new-up".to_string(), "new-down".to_string());
        assert_eq!(s.order_book(Side::Up).bids.len(), 0, "new pair resets books");
    }
}
