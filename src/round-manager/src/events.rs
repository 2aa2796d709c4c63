//! Events published by `RoundManager`. Per spec.md §9's event-bus redesign
//! flag, `RoundManager` only emits observable events; it never calls back
//! into the engine.

use common::MarketInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    /// A round became current. Carries the full market info so subscribers
    /// don't need a follow-up lookup.
    RoundStarted(MarketInfo),
    /// `seconds_remaining <= 60` crossed for the current round, emitted once.
    RoundEnding { round_id: String },
    /// `seconds_remaining <= 0` crossed for the current round, emitted once.
    RoundExpired { round_id: String },
    /// The tracked market changed identity (new-round transition or
    /// auto-rotation), distinct from `RoundStarted` in that it always
    /// carries the previous round id, if any.
    MarketSwitched {
        from: Option<String>,
        to: String,
    },
}
