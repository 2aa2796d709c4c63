//! Pure arbitrage/hedge calculator and probability predictor (spec.md §4.4).
//!
//! Every function here is a pure function over its inputs: no I/O, no
//! mutable state, nothing clock-dependent beyond the `seconds_remaining`
//! passed in by the caller.

use common::{LegInfo, PriceSnapshot, Side};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct HedgeStrategyConfig {
    pub sum_target: Decimal,
    pub fee_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HedgeEvaluation {
    pub should_hedge: bool,
    pub current_sum: Decimal,
    pub target_sum: Decimal,
    pub opposite_price: Decimal,
    pub potential_profit: Decimal,
    pub profit_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRecommendation {
    Enter,
    Wait,
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryProbability {
    pub probability: f64,
    pub confidence: f64,
    pub recommendation: EntryRecommendation,
}

pub struct HedgeStrategy {
    config: HedgeStrategyConfig,
}

impl HedgeStrategy {
    pub fn new(config: HedgeStrategyConfig) -> Self {
        Self { config }
    }

    pub fn should_hedge(&self, leg1_price: Decimal, opposite_ask: Decimal) -> bool {
        leg1_price + opposite_ask <= self.config.sum_target
    }

    pub fn max_leg2_price(&self, leg1_price: Decimal) -> Decimal {
        self.config.sum_target - leg1_price
    }

    /// `fees` is taken once per leg on its own notional, never on the
    /// combined total (spec.md §9 resolves this explicitly).
    pub fn guaranteed_profit(&self, leg1_price: Decimal, leg2_price: Decimal, shares: Decimal) -> Decimal {
        let leg1_cost = shares * leg1_price;
        let leg2_cost = shares * leg2_price;
        let fees = (leg1_cost + leg2_cost) * self.config.fee_rate;
        shares * (Decimal::ONE - (leg1_price + leg2_price)) - fees
    }

    pub fn calculate_hedge(&self, leg1: &LegInfo, snap: &PriceSnapshot) -> HedgeEvaluation {
        let opposite_side = leg1.side.opposite();
        let opposite_price = snap.best_ask(opposite_side);
        let current_sum = leg1.entry_price + opposite_price;
        let should_hedge = self.should_hedge(leg1.entry_price, opposite_price);
        let potential_profit = self.guaranteed_profit(leg1.entry_price, opposite_price, leg1.shares);
        let total_cost = leg1.total_cost() + leg1.shares * opposite_price;
        let profit_pct = if total_cost.is_zero() {
            0.0
        } else {
            (potential_profit / total_cost).to_f64().unwrap_or(0.0) * 100.0
        };
        HedgeEvaluation {
            should_hedge,
            current_sum,
            target_sum: self.config.sum_target,
            opposite_price,
            potential_profit,
            profit_pct,
        }
    }

    /// Heuristic "should we enter Leg1 now?" predictor (spec.md §4.4).
    /// Deterministic given identical inputs.
    pub fn predict_entry(
        &self,
        leg1_side: Side,
        leg1_price: Decimal,
        recent_30s: &[PriceSnapshot],
        seconds_remaining: i64,
    ) -> EntryProbability {
        if recent_30s.len() < 5 {
            return EntryProbability {
                probability: 0.5,
                confidence: 0.1,
                recommendation: EntryRecommendation::Wait,
            };
        }

        let opposite_side = leg1_side.opposite();
        let opposite_asks: Vec<f64> = recent_30s
            .iter()
            .map(|s| s.best_ask(opposite_side).to_f64().unwrap_or(0.0))
            .collect();

        let volatility = stddev_of_relative_returns(&opposite_asks);
        let trend = normalized_trend(&opposite_asks);
        let spread_health = average_spread_health(recent_30s);
        let time_impact = (seconds_remaining.max(0) as f64 / 900.0).sqrt();

        let current_opposite = *opposite_asks.last().unwrap_or(&0.0);
        let max_leg2 = self.max_leg2_price(leg1_price).to_f64().unwrap_or(0.0);
        let gap_pct = if current_opposite > 0.0 {
            (current_opposite - max_leg2) / current_opposite
        } else {
            1.0
        };

        let base = if gap_pct <= 0.0 {
            1.0
        } else if gap_pct >= 0.15 {
            0.1
        } else {
            1.0 - gap_pct / 0.15 * 0.9
        };

        let probability = (base
            + (volatility * 3.0).min(0.2)
            + (-trend) * 0.15
            + (spread_health - 0.5) * 0.1
            + (time_impact - 1.0) * 0.1)
            .clamp(0.0, 1.0);

        let n = recent_30s.len() as f64;
        let confidence = (n / 100.0).sqrt() * (1.0 - (2.0 * volatility).min(0.5));
        let confidence = confidence.min(0.9).max(0.0);

        let recommendation = if (probability >= 0.7 && confidence >= 0.5) || gap_pct <= 0.0 {
            EntryRecommendation::Enter
        } else if seconds_remaining < 60 || (volatility < 0.005 && gap_pct > 0.05) {
            EntryRecommendation::Skip
        } else if (0.4..0.7).contains(&probability) {
            EntryRecommendation::Wait
        } else {
            EntryRecommendation::Skip
        };

        EntryProbability {
            probability,
            confidence,
            recommendation,
        }
    }
}

fn stddev_of_relative_returns(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

/// Least-squares slope of price over normalized time, divided by the mean
/// price so it is comparable across price levels, clamped to [-1, 1].
fn normalized_trend(prices: &[f64]) -> f64 {
    let n = prices.len();
    if n < 2 {
        return 0.0;
    }
    let xs: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n as f64;
    let y_mean = prices.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        num += (xs[i] - x_mean) * (prices[i] - y_mean);
        den += (xs[i] - x_mean).powi(2);
    }
    if den == 0.0 || y_mean == 0.0 {
        return 0.0;
    }
    let slope = num / den;
    (slope / y_mean).clamp(-1.0, 1.0)
}

fn average_spread_health(snapshots: &[PriceSnapshot]) -> f64 {
    if snapshots.is_empty() {
        return 0.5;
    }
    let mut total = 0.0;
    let mut count = 0usize;
    for s in snapshots {
        for side in [Side::Up, Side::Down] {
            let ask = s.best_ask(side).to_f64().unwrap_or(0.0);
            let bid = s.best_bid(side).to_f64().unwrap_or(0.0);
            if ask > 0.0 && bid > 0.0 {
                total += (0f64).max(1.0 - (ask - bid) / 0.02);
                count += 1;
            }
        }
    }
    if count == 0 {
        0.5
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn strategy() -> HedgeStrategy {
        HedgeStrategy::new(HedgeStrategyConfig {
            sum_target: dec!(0.95),
            fee_rate: dec!(0),
        })
    }

    fn snap(ts: i64, up_ask: Decimal, down_ask: Decimal) -> PriceSnapshot {
        PriceSnapshot {
            timestamp_ms: ts,
            round_id: "r1".to_string(),
            seconds_remaining: 0,
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
            up_best_ask: up_ask,
            up_best_bid: up_ask - dec!(0.01),
            down_best_ask: down_ask,
            down_best_bid: down_ask - dec!(0.01),
        }
    }

    #[test]
    fn should_hedge_is_inclusive_at_target() {
        let s = strategy();
        assert!(s.should_hedge(dec!(0.35), dec!(0.60)));
        assert!(!s.should_hedge(dec!(0.35), dec!(0.61)));
    }

    #[test]
    fn guaranteed_profit_matches_scenario_1() {
        let s = strategy();
        let profit = s.guaranteed_profit(dec!(0.35), dec!(0.58), dec!(20));
        assert_eq!(profit, dec!(1.40));
    }

    #[test]
    fn guaranteed_profit_fee_is_per_leg_not_on_total() {
        let s = HedgeStrategy::new(HedgeStrategyConfig {
            sum_target: dec!(0.95),
            fee_rate: dec!(0.01),
        });
        let leg1_cost = dec!(20) * dec!(0.35);
        let leg2_cost = dec!(20) * dec!(0.58);
        let expected_fees = (leg1_cost + leg2_cost) * dec!(0.01);
        let profit = s.guaranteed_profit(dec!(0.35), dec!(0.58), dec!(20));
        assert_eq!(profit, dec!(20) * (Decimal::ONE - dec!(0.93)) - expected_fees);
    }

    #[test]
    fn should_hedge_implies_nonnegative_pre_fee_profit() {
        let s = strategy();
        let p1 = dec!(0.30);
        let p2 = dec!(0.60);
        assert!(s.should_hedge(p1, p2));
        let pre_fee = dec!(20) * (Decimal::ONE - (p1 + p2));
        let floor = dec!(20) * (Decimal::ONE - s.config.sum_target);
        assert!(pre_fee >= floor);
        assert!(floor >= Decimal::ZERO);
    }

    #[test]
    fn calculate_hedge_uses_live_opposite_ask() {
        let s = strategy();
        let leg1 = LegInfo {
            order_id: "sim-1".into(),
            side: Side::Up,
            shares: dec!(20),
            entry_price: dec!(0.35),
            filled_at_ms: 0,
        };
        let snap = snap(1000, dec!(0.35), dec!(0.58));
        let eval = s.calculate_hedge(&leg1, &snap);
        assert!(eval.should_hedge);
        assert_eq!(eval.opposite_price, dec!(0.58));
        assert_eq!(eval.current_sum, dec!(0.93));
        assert_eq!(eval.potential_profit, dec!(1.40));
    }

    #[test]
    fn predict_entry_with_few_samples_waits_with_low_confidence() {
        let s = strategy();
        let snaps = vec![snap(0, dec!(0.5), dec!(0.5))];
        let pred = s.predict_entry(Side::Up, dec!(0.5), &snaps, 600);
        assert_eq!(pred.probability, 0.5);
        assert_eq!(pred.confidence, 0.1);
        assert_eq!(pred.recommendation, EntryRecommendation::Wait);
    }

    #[test]
    fn predict_entry_recommends_enter_when_gap_already_closed() {
        let s = strategy();
        let snaps: Vec<PriceSnapshot> = (0..10)
            .map(|i| snap(i * 1000, dec!(0.5), Decimal::new(60 - i, 2)))
            .collect();
        let pred = s.predict_entry(Side::Up, dec!(0.35), &snaps, 500);
        assert_eq!(pred.recommendation, EntryRecommendation::Enter);
    }

    #[test]
    fn predict_entry_skips_near_round_end() {
        let s = strategy();
        let snaps: Vec<PriceSnapshot> = (0..10).map(|i| snap(i * 1000, dec!(0.5), dec!(0.80))).collect();
        let pred = s.predict_entry(Side::Up, dec!(0.35), &snaps, 30);
        assert_eq!(pred.recommendation, EntryRecommendation::Skip);
    }
}
