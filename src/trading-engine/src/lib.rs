//! Composition root: wires `MarketFeed`, `RoundManager`, `DumpDetector`,
//! `HedgeStrategy`, `StateMachine` and an `OrderClient` into one event loop
//! (spec.md §4.6).

mod engine;
mod error;

pub use engine::{EngineConfig, TradingEngine};
pub use error::EngineError;
