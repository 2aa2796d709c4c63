//! Wire message parsing for the venue's market-data channel.
//!
//! Text-frame WebSocket payloads are JSON, either a single object or a
//! top-level array of objects; each object is dispatched by its
//! `event_type`/`type` field (spec.md §4.1, §6).

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::FeedError;

/// Maximum accepted inbound payload size (DoS guard, spec.md §4.1).
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct WirePriceLevel {
    pub price: String,
    pub size: String,
}

impl WirePriceLevel {
    pub fn price_decimal(&self) -> Option<Decimal> {
        self.price.parse().ok()
    }

    pub fn size_decimal(&self) -> Option<Decimal> {
        self.size.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookMessage {
    pub event_type: String,
    pub asset_id: String,
    #[serde(default, alias = "buys")]
    pub bids: Vec<WirePriceLevel>,
    #[serde(default, alias = "sells")]
    pub asks: Vec<WirePriceLevel>,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceChange {
    pub asset_id: String,
    #[serde(default)]
    pub best_bid: Option<String>,
    #[serde(default)]
    pub best_ask: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeMessage {
    pub event_type: String,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub best_bid: Option<String>,
    #[serde(default)]
    pub best_ask: Option<String>,
    #[serde(default)]
    pub price_changes: Vec<PriceChange>,
}

impl PriceChangeMessage {
    /// Normalizes the single-object and batched shapes into one list.
    pub fn changes(&self) -> Vec<PriceChange> {
        if !self.price_changes.is_empty() {
            return self.price_changes.clone();
        }
        if let Some(asset_id) = &self.asset_id {
            return vec![PriceChange {
                asset_id: asset_id.clone(),
                best_bid: self.best_bid.clone(),
                best_ask: self.best_ask.clone(),
            }];
        }
        Vec::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeMessage {
    pub asset_id: String,
    pub price: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The recognized inbound message shapes. Unknown `event_type`s and
/// non-JSON/non-object payloads resolve to `Unknown`/are dropped by the
/// caller (spec.md §4.1).
#[derive(Debug, Clone)]
pub enum FeedMessage {
    Book(BookMessage),
    Books(Vec<BookMessage>),
    PriceChange(PriceChangeMessage),
    Trade(TradeMessage),
    Subscribed,
    Unsubscribed,
    Heartbeat,
    Error(ErrorMessage),
    Unknown(String),
}

/// Parses one inbound text frame. Rejects oversized frames up front; all
/// other malformed input degrades to `FeedMessage::Unknown` rather than an
/// error, per spec.md's "dropped with warn, never fatal" rule.
pub fn parse_message(text: &str) -> Result<FeedMessage, FeedError> {
    if text.len() > MAX_MESSAGE_BYTES {
        return Err(FeedError::MessageTooLarge(text.len()));
    }

    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Ok(FeedMessage::Unknown(text.to_string())),
    };

    if let Some(array) = value.as_array() {
        let books: Vec<BookMessage> = array
            .iter()
            .filter_map(|v| serde_json::from_value::<BookMessage>(v.clone()).ok())
            .collect();
        if !books.is_empty() {
            return Ok(FeedMessage::Books(books));
        }
        return Ok(FeedMessage::Unknown(text.to_string()));
    }

    if !value.is_object() {
        return Ok(FeedMessage::Unknown(text.to_string()));
    }

    let event_type = value
        .get("event_type")
        .or_else(|| value.get("type"))
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match event_type {
        "book" => match serde_json::from_value::<BookMessage>(value) {
            Ok(book) => Ok(FeedMessage::Book(book)),
            Err(_) => Ok(FeedMessage::Unknown(text.to_string())),
        },
        "price_change" => match serde_json::from_value::<PriceChangeMessage>(value) {
            Ok(pc) => Ok(FeedMessage::PriceChange(pc)),
            Err(_) => Ok(FeedMessage::Unknown(text.to_string())),
        },
        "last_trade_price" => match serde_json::from_value::<TradeMessage>(value) {
            Ok(trade) => Ok(FeedMessage::Trade(trade)),
            Err(_) => Ok(FeedMessage::Unknown(text.to_string())),
        },
        "error" => Ok(FeedMessage::Error(
            serde_json::from_value(value).unwrap_or(ErrorMessage {
                code: None,
                message: None,
            }),
        )),
        "subscribed" => Ok(FeedMessage::Subscribed),
        "unsubscribed" => Ok(FeedMessage::Unsubscribed),
        "pong" | "heartbeat" => Ok(FeedMessage::Heartbeat),
        _ => Ok(FeedMessage::Unknown(text.to_string())),
    }
}

/// Outbound subscribe frame: `{type:"MARKET", assets_ids:[...]}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub assets_ids: Vec<String>,
}

impl SubscribeRequest {
    pub fn market(asset_ids: Vec<String>) -> Self {
        Self {
            msg_type: "MARKET",
            assets_ids: asset_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_book_message() {
        let text = r#"{"event_type":"book","asset_id":"tok-up","bids":[{"price":"0.40","size":"10"}],"asks":[{"price":"0.45","size":"5"}],"hash":"abc"}"#;
        match parse_message(text).unwrap() {
            FeedMessage::Book(book) => {
                assert_eq!(book.asset_id, "tok-up");
                assert_eq!(book.bids[0].price_decimal().unwrap(), Decimal::new(40, 2));
                assert_eq!(book.asks[0].size_decimal().unwrap(), Decimal::new(5, 0));
            }
            other => panic!("expected Book, got {other:?}"),
        }
    }

    #[test]
    fn parses_batched_books_array() {
        let text = r#"[{"event_type":"book","asset_id":"a","bids":[],"asks":[]},{"event_type":"book","asset_id":"b","bids":[],"asks":[]}]"#;
        match parse_message(text).unwrap() {
            FeedMessage::Books(books) => assert_eq!(books.len(), 2),
            other => panic!("expected Books, got {other:?}"),
        }
    }

    #[test]
    fn parses_single_object_price_change() {
        let text = r#"{"event_type":"price_change","asset_id":"tok-up","best_bid":"0.39","best_ask":"0.41"}"#;
        match parse_message(text).unwrap() {
            FeedMessage::PriceChange(pc) => {
                let changes = pc.changes();
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].asset_id, "tok-up");
            }
            other => panic!("expected PriceChange, got {other:?}"),
        }
    }

    #[test]
    fn parses_batched_price_changes() {
        let text = r#"{"event_type":"price_change","price_changes":[{"asset_id":"a","best_ask":"0.1"},{"asset_id":"b","best_bid":"0.2"}]}"#;
        match parse_message(text).unwrap() {
            FeedMessage::PriceChange(pc) => assert_eq!(pc.changes().len(), 2),
            other => panic!("expected PriceChange, got {other:?}"),
        }
    }

    #[test]
    fn parses_trade_message() {
        let text = r#"{"event_type":"last_trade_price","asset_id":"tok-up","price":"0.42"}"#;
        match parse_message(text).unwrap() {
            FeedMessage::Trade(trade) => assert_eq!(trade.price, "0.42"),
            other => panic!("expected Trade, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_unknown() {
        let text = r#"{"event_type":"something_else"}"#;
        assert!(matches!(parse_message(text).unwrap(), FeedMessage::Unknown(_)));
    }

    #[test]
    fn malformed_json_is_unknown_not_error() {
        assert!(matches!(parse_message("not json").unwrap(), FeedMessage::Unknown(_)));
    }

    #[test]
    fn oversized_message_is_rejected() {
        let huge = "x".repeat(MAX_MESSAGE_BYTES + 1);
        assert!(matches!(parse_message(&huge), Err(FeedError::MessageTooLarge(_))));
    }

    #[test]
    fn subscribe_request_serializes_expected_shape() {
        let req = SubscribeRequest::market(vec!["a".to_string(), "b".to_string()]);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"MARKET","assets_ids":["a","b"]}"#);
    }
}
