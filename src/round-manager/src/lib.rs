//! Owns "which round are we trading right now" (spec.md §4.2).
//!
//! `RoundManager` resolves and tracks the currently active market — either
//! via Gamma-API auto-discovery or a pinned `condition_id` — and publishes
//! observable [`RoundEvent`]s. It never calls back into the trading engine
//! directly.

mod cache;
mod discovery;
mod error;
mod events;
mod manager;

pub use cache::MarketCache;
pub use discovery::{DiscoveredMarket, DiscoveryClient};
pub use error::RoundManagerError;
pub use events::RoundEvent;
pub use manager::{RoundManager, RoundManagerConfig};
