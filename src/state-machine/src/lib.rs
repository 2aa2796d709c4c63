//! Per-cycle lifecycle state machine (spec.md §4.5).

pub mod error;

use std::collections::VecDeque;

use common::{Clock, CycleStatus, DumpSignal, LegInfo, OrderResult, OrderStatus, Side, TradeCycle};
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

pub use error::StateMachineError;

/// Bounded append-only transition history (spec.md §5 "capped").
const HISTORY_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub from: CycleStatus,
    pub to: CycleStatus,
    pub event: &'static str,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    Cancel,
    Warn,
}

#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    pub leg1_pending_secs: i64,
    pub leg1_filled_secs: i64,
    pub leg2_pending_secs: i64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            leg1_pending_secs: 30,
            leg1_filled_secs: 120,
            leg2_pending_secs: 30,
        }
    }
}

pub struct StateMachine {
    policy: TimeoutPolicy,
    current: Option<TradeCycle>,
    /// Timestamp of the last transition into `current`'s state.
    state_entered_ms: i64,
    history: VecDeque<TransitionRecord>,
}

impl StateMachine {
    pub fn new(policy: TimeoutPolicy) -> Self {
        Self {
            policy,
            current: None,
            state_entered_ms: 0,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn current_cycle(&self) -> Option<&TradeCycle> {
        self.current.as_ref()
    }

    pub fn current_status(&self) -> CycleStatus {
        self.current.as_ref().map(|c| c.status).unwrap_or(CycleStatus::Idle)
    }

    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history.iter().cloned().collect()
    }

    fn record(&mut self, from: CycleStatus, to: CycleStatus, event: &'static str, now_ms: i64) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(TransitionRecord { from, to, event, timestamp_ms: now_ms });
        self.state_entered_ms = now_ms;
    }

    fn transition(&mut self, to: CycleStatus, event: &'static str, now_ms: i64) {
        let from = self.current_status();
        if let Some(cycle) = self.current.as_mut() {
            cycle.status = to;
            cycle.updated_at_ms = now_ms;
        }
        self.record(from, to, event, now_ms);
    }

    /// IDLE -> WATCHING. Replaces any non-terminal active cycle, logging a
    /// warning (the caller is expected to have resolved it first).
    pub fn start_new_cycle(&mut self, round_id: String, now_ms: i64) -> &TradeCycle {
        if let Some(existing) = &self.current {
            if !existing.status.is_terminal() {
                warn!(round_id = %existing.round_id, status = ?existing.status, "replacing non-terminal cycle with a new one");
            }
        }
        let id = Uuid::new_v4().to_string();
        self.current = Some(TradeCycle::new(id, round_id, now_ms));
        self.state_entered_ms = now_ms;
        self.record(CycleStatus::Idle, CycleStatus::Watching, "start_new_cycle", now_ms);
        self.current.as_ref().expect("just set")
    }

    /// WATCHING -> LEG1_PENDING.
    pub fn on_dump_detected(&mut self, signal: &DumpSignal, now_ms: i64) -> Result<(), StateMachineError> {
        self.require_status(CycleStatus::Watching, "on_dump_detected")?;
        let _ = signal;
        self.transition(CycleStatus::Leg1Pending, "on_dump_detected", now_ms);
        Ok(())
    }

    /// LEG1_PENDING -> LEG1_FILLED.
    pub fn on_leg1_filled(&mut self, result: &OrderResult, now_ms: i64) -> Result<(), StateMachineError> {
        self.require_status(CycleStatus::Leg1Pending, "on_leg1_filled")?;
        let leg = LegInfo {
            order_id: result.order_id.clone(),
            side: result.side,
            shares: result.shares,
            entry_price: result.avg_price,
            filled_at_ms: result.timestamp_ms,
        };
        if let Some(cycle) = self.current.as_mut() {
            cycle.leg1 = Some(leg);
        }
        self.transition(CycleStatus::Leg1Filled, "on_leg1_filled", now_ms);
        Ok(())
    }

    /// LEG1_FILLED -> LEG2_PENDING.
    pub fn on_leg2_started(&mut self, now_ms: i64) -> Result<(), StateMachineError> {
        self.require_status(CycleStatus::Leg1Filled, "on_leg2_started")?;
        self.transition(CycleStatus::Leg2Pending, "on_leg2_started", now_ms);
        Ok(())
    }

    /// LEG2_PENDING -> COMPLETED. Computes `guaranteed_profit` on the cycle.
    pub fn on_leg2_filled(&mut self, result: &OrderResult, now_ms: i64) -> Result<(), StateMachineError> {
        self.require_status(CycleStatus::Leg2Pending, "on_leg2_filled")?;
        let leg2 = LegInfo {
            order_id: result.order_id.clone(),
            side: result.side,
            shares: result.shares,
            entry_price: result.avg_price,
            filled_at_ms: result.timestamp_ms,
        };
        if let Some(cycle) = self.current.as_mut() {
            if let Some(leg1) = &cycle.leg1 {
                let profit = leg1.shares * Decimal::ONE - (leg1.total_cost() + leg2.total_cost());
                cycle.guaranteed_profit = Some(profit);
                cycle.profit = Some(profit);
            }
            cycle.leg2 = Some(leg2);
        }
        self.transition(CycleStatus::Completed, "on_leg2_filled", now_ms);
        Ok(())
    }

    /// any non-terminal -> ROUND_EXPIRED. If Leg1 filled and unhedged,
    /// records the unhedged loss.
    pub fn on_round_expired(&mut self, now_ms: i64) -> Result<(), StateMachineError> {
        let status = self.current_status();
        if status.is_terminal() {
            return Err(StateMachineError::InvalidTransition { from: status, event: "on_round_expired" });
        }
        if let Some(cycle) = self.current.as_mut() {
            if let (Some(leg1), None) = (&cycle.leg1, &cycle.leg2) {
                cycle.profit = Some(-leg1.total_cost());
            }
        }
        self.transition(CycleStatus::RoundExpired, "on_round_expired", now_ms);
        Ok(())
    }

    /// any non-terminal -> ERROR.
    pub fn on_error(&mut self, err: impl Into<String>, now_ms: i64) -> Result<(), StateMachineError> {
        let status = self.current_status();
        if status.is_terminal() {
            return Err(StateMachineError::InvalidTransition { from: status, event: "on_error" });
        }
        if let Some(cycle) = self.current.as_mut() {
            cycle.error = Some(err.into());
        }
        self.transition(CycleStatus::Error, "on_error", now_ms);
        Ok(())
    }

    /// COMPLETED/ROUND_EXPIRED/ERROR -> IDLE. Releases the cycle.
    pub fn reset(&mut self) -> Result<(), StateMachineError> {
        let status = self.current_status();
        if !status.is_terminal() && self.current.is_some() {
            return Err(StateMachineError::InvalidTransition { from: status, event: "reset" });
        }
        self.current = None;
        Ok(())
    }

    fn require_status(&self, expected: CycleStatus, event: &'static str) -> Result<(), StateMachineError> {
        if self.current_status() != expected {
            return Err(StateMachineError::InvalidTransition { from: self.current_status(), event });
        }
        Ok(())
    }

    /// Elapsed time in the current state, in seconds.
    fn elapsed_secs(&self, now_ms: i64) -> i64 {
        (now_ms - self.state_entered_ms) / 1000
    }

    /// Evaluates the timeout policy against the current state and elapsed
    /// time, returning the action to take, if any.
    pub fn check_timeout(&self, now_ms: i64) -> Option<TimeoutAction> {
        let elapsed = self.elapsed_secs(now_ms);
        match self.current_status() {
            CycleStatus::Leg1Pending if elapsed > self.policy.leg1_pending_secs => Some(TimeoutAction::Cancel),
            CycleStatus::Leg1Filled if elapsed > self.policy.leg1_filled_secs => Some(TimeoutAction::Warn),
            CycleStatus::Leg2Pending if elapsed > self.policy.leg2_pending_secs => Some(TimeoutAction::Cancel),
            _ => None,
        }
    }

    /// True if the round is about to end and the current state should be
    /// force-expired ahead of the ordinary timeout policy (spec.md §4.5).
    pub fn should_force_expire(&self, round_seconds_remaining: i64) -> bool {
        match self.current_status() {
            CycleStatus::Leg1Filled => round_seconds_remaining < 10,
            CycleStatus::Leg1Pending | CycleStatus::Leg2Pending => round_seconds_remaining < 5,
            _ => false,
        }
    }
}

/// Convenience accessor mirroring spec.md's `now_ms` clock parameter style
/// for call sites that already hold a `&dyn Clock`.
pub fn now_from(clock: &dyn Clock) -> i64 {
    clock.now_ms()
}
