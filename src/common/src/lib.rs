//! Shared domain types and ambient services for the dump/hedge engine.
//!
//! Provides:
//! - The core data model (`Side`, `PriceSnapshot`, `OrderBook`, `Round`,
//!   `DumpSignal`, `LegInfo`, `TradeCycle`, `CycleStatus`).
//! - An injectable `Clock` for deterministic timing in tests.
//! - Configuration loading from the environment.

pub mod clock;
pub mod config;
pub mod types;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::{Config, ConfigError};
pub use types::{
    CycleStatus, DumpSignal, LegInfo, MarketInfo, Order, OrderBook, OrderBookLevel, OrderResult,
    OrderStatus, PriceSnapshot, RoundStatus, Side, TradeCycle,
};
