//! Rolling-window dump signal generator (spec.md §4.3).
//!
//! Pure calculator: given a window of recent snapshots for the current
//! round, determines whether one side's ask has fallen by at least
//! `move_pct` within the fixed detection sub-window. Locks a `(round_id,
//! side)` pair after it has fired once so at most one `DumpSignal` is ever
//! emitted per pair.

use std::collections::HashSet;

use common::{DumpSignal, PriceSnapshot, Side};
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

/// Fixed sub-window within which the drop must occur (spec.md §4.3).
pub const DETECTION_WINDOW_MS: i64 = 3_000;

#[derive(Debug, Clone)]
pub struct DumpDetectorConfig {
    /// Minimum fractional drop in ask price that counts as a dump, e.g. 0.15.
    pub move_pct: f64,
    /// Full monitoring horizon from round start, in minutes.
    pub window_min: f64,
}

impl Default for DumpDetectorConfig {
    fn default() -> Self {
        Self {
            move_pct: 0.15,
            window_min: 2.0,
        }
    }
}

#[derive(Debug)]
pub struct DumpDetector {
    config: DumpDetectorConfig,
    locked: HashSet<(String, Side)>,
}

impl DumpDetector {
    pub fn new(config: DumpDetectorConfig) -> Self {
        Self {
            config,
            locked: HashSet::new(),
        }
    }

    /// Clears locks for rounds other than the current one. Call on round
    /// rotation so a new round can produce fresh signals.
    pub fn reset_for_round(&mut self, round_id: &str) {
        self.locked.retain(|(r, _)| r == round_id);
    }

    fn is_locked(&self, round_id: &str, side: Side) -> bool {
        self.locked.contains(&(round_id.to_string(), side))
    }

    fn lock(&mut self, round_id: &str, side: Side) {
        self.locked.insert((round_id.to_string(), side));
    }

    /// `snapshots` is the full recent-snapshot window available for the
    /// round (e.g. `MarketFeed::recent_snapshots`); this function narrows it
    /// to the fixed detection sub-window itself.
    pub fn detect(
        &mut self,
        snapshots: &[PriceSnapshot],
        round_start_ms: i64,
        now_ms: i64,
    ) -> Option<DumpSignal> {
        if (now_ms - round_start_ms) as f64 > self.config.window_min * 60_000.0 {
            return None;
        }

        let cutoff = now_ms - DETECTION_WINDOW_MS;
        let recent: Vec<&PriceSnapshot> = snapshots
            .iter()
            .filter(|s| s.timestamp_ms >= cutoff && s.timestamp_ms <= now_ms)
            .collect();
        if recent.len() < 2 {
            return None;
        }

        let first = recent.first()?;
        let last = recent.last()?;
        let round_id = last.round_id.clone();

        for side in [Side::Up, Side::Down] {
            if self.is_locked(&round_id, side) {
                continue;
            }
            let p0 = first.best_ask(side).to_f64().unwrap_or(0.0);
            let p1 = last.best_ask(side).to_f64().unwrap_or(0.0);
            if p0 <= 0.0 {
                continue;
            }
            let drop_pct = (p0 - p1) / p0;
            if drop_pct >= self.config.move_pct {
                self.lock(&round_id, side);
                debug!(%side, drop_pct, round_id, "dump signal fired");
                return Some(DumpSignal {
                    side,
                    drop_pct,
                    price: last.best_ask(side),
                    previous_price: first.best_ask(side),
                    timestamp_ms: last.timestamp_ms,
                    round_id,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snap(ts: i64, round_id: &str, up_ask: rust_decimal::Decimal, down_ask: rust_decimal::Decimal) -> PriceSnapshot {
        PriceSnapshot {
            timestamp_ms: ts,
            round_id: round_id.to_string(),
            seconds_remaining: 0,
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
            up_best_ask: up_ask,
            up_best_bid: up_ask,
            down_best_ask: down_ask,
            down_best_bid: down_ask,
        }
    }

    #[test]
    fn detects_dump_exactly_at_threshold() {
        let mut d = DumpDetector::new(DumpDetectorConfig { move_pct: 0.30, window_min: 2.0 });
        let snaps = vec![
            snap(0, "r1", dec!(0.50), dec!(0.50)),
            snap(2000, "r1", dec!(0.35), dec!(0.65)),
        ];
        let signal = d.detect(&snaps, 0, 2000).expect("drop of exactly 30% must trigger");
        assert_eq!(signal.side, Side::Up);
        assert!((signal.drop_pct - 0.30).abs() < 1e-9);
    }

    #[test]
    fn below_threshold_does_not_trigger() {
        let mut d = DumpDetector::new(DumpDetectorConfig { move_pct: 0.20, window_min: 2.0 });
        let snaps = vec![
            snap(0, "r1", dec!(0.50), dec!(0.50)),
            snap(2000, "r1", dec!(0.45), dec!(0.50)),
        ];
        assert!(d.detect(&snaps, 0, 2000).is_none());
    }

    #[test]
    fn ties_prefer_up_deterministically() {
        let mut d = DumpDetector::new(DumpDetectorConfig { move_pct: 0.10, window_min: 2.0 });
        let snaps = vec![
            snap(0, "r1", dec!(0.50), dec!(0.50)),
            snap(2000, "r1", dec!(0.40), dec!(0.40)),
        ];
        let signal = d.detect(&snaps, 0, 2000).unwrap();
        assert_eq!(signal.side, Side::Up);
    }

    #[test]
    fn signal_fires_at_most_once_per_round_and_side() {
        let mut d = DumpDetector::new(DumpDetectorConfig { move_pct: 0.10, window_min: 2.0 });
        let snaps = vec![
            snap(0, "r1", dec!(0.50), dec!(0.50)),
            snap(2000, "r1", dec!(0.40), dec!(0.50)),
        ];
        assert!(d.detect(&snaps, 0, 2000).is_some());
        let snaps2 = vec![
            snap(2000, "r1", dec!(0.40), dec!(0.50)),
            snap(4000, "r1", dec!(0.30), dec!(0.50)),
        ];
        assert!(d.detect(&snaps2, 0, 4000).is_none(), "UP already locked for r1");
    }

    #[test]
    fn past_monitoring_horizon_returns_none() {
        let mut d = DumpDetector::new(DumpDetectorConfig { move_pct: 0.10, window_min: 2.0 });
        let snaps = vec![
            snap(0, "r1", dec!(0.50), dec!(0.50)),
            snap(121_000, "r1", dec!(0.10), dec!(0.50)),
        ];
        assert!(d.detect(&snaps, 0, 121_000).is_none());
    }

    #[test]
    fn reset_for_round_clears_old_round_locks() {
        let mut d = DumpDetector::new(DumpDetectorConfig { move_pct: 0.10, window_min: 2.0 });
        let snaps = vec![snap(0, "r1", dec!(0.50), dec!(0.50)), snap(2000, "r1", dec!(0.40), dec!(0.50))];
        d.detect(&snaps, 0, 2000);
        d.reset_for_round("r2");
        let snaps2 = vec![snap(0, "r2", dec!(0.50), dec!(0.50)), snap(2000, "r2", dec!(0.40), dec!(0.50))];
        assert!(d.detect(&snaps2, 0, 2000).is_some());
    }
}
