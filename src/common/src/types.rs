//! Core data model shared by every component.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One of the two complementary outcomes of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Up,
    Down,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Up => Side::Down,
            Side::Down => Side::Up,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Up => write!(f, "UP"),
            Side::Down => write!(f, "DOWN"),
        }
    }
}

/// Immutable record produced per market update by `MarketFeed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub timestamp_ms: i64,
    pub round_id: String,
    /// Round time budget; 0 means expired. `MarketFeed` itself always sets
    /// this to 0 — `RoundManager` is authoritative for timing.
    pub seconds_remaining: i64,
    pub up_token_id: String,
    pub down_token_id: String,
    pub up_best_ask: Decimal,
    pub up_best_bid: Decimal,
    pub down_best_ask: Decimal,
    pub down_best_bid: Decimal,
}

impl PriceSnapshot {
    pub fn best_ask(&self, side: Side) -> Decimal {
        match side {
            Side::Up => self.up_best_ask,
            Side::Down => self.down_best_ask,
        }
    }

    pub fn best_bid(&self, side: Side) -> Decimal {
        match side {
            Side::Up => self.up_best_bid,
            Side::Down => self.down_best_bid,
        }
    }
}

/// A single resting order at a price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Maximum depth kept per side, per spec.
pub const ORDER_BOOK_DEPTH: usize = 10;

/// Per-token order book: bids descending, asks ascending, capped at
/// [`ORDER_BOOK_DEPTH`] levels each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub last_update_ms: i64,
}

impl OrderBook {
    pub fn best_bid(&self) -> Decimal {
        self.bids.first().map(|l| l.price).unwrap_or(Decimal::ZERO)
    }

    pub fn best_ask(&self) -> Decimal {
        self.asks.first().map(|l| l.price).unwrap_or(Decimal::ZERO)
    }

    /// Replace this book's levels from a full snapshot: sorts, drops
    /// zero-size levels, and truncates to `ORDER_BOOK_DEPTH`.
    pub fn replace(&mut self, mut bids: Vec<OrderBookLevel>, mut asks: Vec<OrderBookLevel>, now_ms: i64) {
        bids.retain(|l| !l.size.is_zero());
        asks.retain(|l| !l.size.is_zero());
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        bids.truncate(ORDER_BOOK_DEPTH);
        asks.truncate(ORDER_BOOK_DEPTH);
        self.bids = bids;
        self.asks = asks;
        self.last_update_ms = now_ms;
    }

    /// Apply a best-bid/best-ask delta to level 0 of one side only.
    pub fn apply_top_of_book(&mut self, best_bid: Option<Decimal>, best_ask: Option<Decimal>, now_ms: i64) {
        if let Some(price) = best_bid {
            Self::set_top(&mut self.bids, price);
        }
        if let Some(price) = best_ask {
            Self::set_top(&mut self.asks, price);
        }
        self.last_update_ms = now_ms;
    }

    fn set_top(levels: &mut Vec<OrderBookLevel>, price: Decimal) {
        if price.is_zero() {
            if !levels.is_empty() {
                levels.remove(0);
            }
            return;
        }
        if levels.is_empty() {
            levels.push(OrderBookLevel {
                price,
                size: Decimal::ONE,
            });
        } else {
            levels[0].price = price;
        }
    }
}

/// Status of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Pending,
    Active,
    Resolved,
}

/// A single short-lived market round with a fixed token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub round_id: String,
    pub human_label: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub up_token_id: String,
    pub down_token_id: String,
    pub status: RoundStatus,
}

impl MarketInfo {
    pub fn seconds_remaining(&self, now_ms: i64) -> i64 {
        ((self.end_time_ms - now_ms) / 1000).max(0)
    }

    pub fn is_active(&self, now_ms: i64) -> bool {
        self.status != RoundStatus::Resolved && self.start_time_ms <= now_ms && now_ms < self.end_time_ms
    }
}

/// Emitted by `DumpDetector` when one side's ask has fallen `>= move_pct`
/// within the detection sub-window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpSignal {
    pub side: Side,
    pub drop_pct: f64,
    pub price: Decimal,
    pub previous_price: Decimal,
    pub timestamp_ms: i64,
    pub round_id: String,
}

/// A filled purchase of one side within a cycle. Immutable after fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegInfo {
    pub order_id: String,
    pub side: Side,
    pub shares: Decimal,
    pub entry_price: Decimal,
    pub filled_at_ms: i64,
}

impl LegInfo {
    pub fn total_cost(&self) -> Decimal {
        self.shares * self.entry_price
    }
}

/// Tagged lifecycle state of a `TradeCycle`. Terminal: the last three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    Idle,
    Watching,
    Leg1Pending,
    Leg1Filled,
    Leg2Pending,
    Completed,
    RoundExpired,
    Error,
}

impl CycleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CycleStatus::Completed | CycleStatus::RoundExpired | CycleStatus::Error
        )
    }
}

/// One entry attempt in a round, exclusively owned by `StateMachine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCycle {
    pub id: String,
    pub round_id: String,
    pub status: CycleStatus,
    pub leg1: Option<LegInfo>,
    pub leg2: Option<LegInfo>,
    pub profit: Option<Decimal>,
    pub guaranteed_profit: Option<Decimal>,
    pub error: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl TradeCycle {
    pub fn new(id: String, round_id: String, now_ms: i64) -> Self {
        Self {
            id,
            round_id,
            status: CycleStatus::Watching,
            leg1: None,
            leg2: None,
            profit: None,
            guaranteed_profit: None,
            error: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

/// Status of a submitted order, per the `OrderClient` contract (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Filled,
    Partial,
    Pending,
    Rejected,
}

/// Result of an order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub side: Side,
    pub shares: Decimal,
    pub avg_price: Decimal,
    pub total_cost: Decimal,
    pub status: OrderStatus,
    pub timestamp_ms: i64,
    pub error: Option<String>,
}

/// A previously submitted order, as returned by `OrderClient::get_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub side: Side,
    pub shares: Decimal,
    pub limit_price: Decimal,
    pub status: OrderStatus,
    pub created_at_ms: i64,
}
