//! Composition root and event router (spec.md §4.6).
//!
//! Wires `MarketFeed`, `RoundManager`, `DumpDetector`, `HedgeStrategy`,
//! `StateMachine` and an `OrderClient` together. Runs as a single logical
//! task: every `tick` drives at most one inbound snapshot through the
//! pipeline, so there is never more than one in-flight mutation of
//! `StateMachine` (spec.md §5 concurrency discipline).

use std::sync::Arc;

use common::{Clock, CycleStatus, DumpSignal, MarketInfo, OrderResult, OrderStatus, PriceSnapshot, Side};
use dump_detector::DumpDetector;
use hedge_strategy::HedgeStrategy;
use order_client::OrderClient;
use round_manager::{RoundEvent, RoundManager};
use rust_decimal::Decimal;
use state_machine::{StateMachine, TimeoutAction};
use tracing::{info, warn};

use crate::error::EngineError;

/// Snapshot window handed to `DumpDetector.detect` each tick; generous
/// relative to the detector's own 3s sub-window so short gaps in delivery
/// don't starve it.
const DUMP_LOOKBACK_MS: i64 = 10_000;
/// Window of recent snapshots fed to `HedgeStrategy.predict_entry`.
const PREDICT_LOOKBACK_MS: i64 = 30_000;

pub struct EngineConfig {
    pub auto_mode: bool,
    pub max_order_usdc: Decimal,
    pub cooldown_ms: i64,
}

/// Tracks the one outstanding order the engine is waiting on, if any, so a
/// timed-out or rejected submission can be cancelled by id.
#[derive(Debug, Clone)]
struct PendingOrder {
    order_id: String,
}

pub struct TradingEngine {
    feed: market_feed::MarketFeed,
    round_manager: RoundManager,
    dump_detector: DumpDetector,
    hedge_strategy: HedgeStrategy,
    state_machine: StateMachine,
    order_client: Arc<dyn OrderClient>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    cooldown_until_ms: i64,
    pending_leg: Option<PendingOrder>,
    cycles_completed: u64,
}

impl TradingEngine {
    pub fn new(
        feed: market_feed::MarketFeed,
        round_manager: RoundManager,
        dump_detector: DumpDetector,
        hedge_strategy: HedgeStrategy,
        state_machine: StateMachine,
        order_client: Arc<dyn OrderClient>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            feed,
            round_manager,
            dump_detector,
            hedge_strategy,
            state_machine,
            order_client,
            clock,
            config,
            cooldown_until_ms: 0,
            pending_leg: None,
            cycles_completed: 0,
        }
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    pub fn current_status(&self) -> CycleStatus {
        self.state_machine.current_status()
    }

    /// Resolves an active market, wires the feed to its tokens, and
    /// connects (spec.md §4.6 "On start").
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.round_manager.auto_discover() {
            self.round_manager.enable_auto_discover();
        }
        let now = self.clock.now_ms();
        let events = self.round_manager.ensure_active_market(now).await?;
        self.apply_round_events(events, now).await?;

        let market = self.round_manager.current().cloned().ok_or(EngineError::NoMarket)?;
        self.feed.set_tokens(market.up_token_id.clone(), market.down_token_id.clone()).await?;
        self.feed.set_round_id(market.round_id.clone());
        self.feed.connect_with_retry(self.clock.as_ref()).await?;
        Ok(())
    }

    /// Drives one inbound snapshot (or idle poll) through the pipeline.
    pub async fn tick(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now_ms();

        let discovered_events = self.round_manager.drain_discovered(now);
        self.apply_round_events(discovered_events, now).await?;

        let maybe_snapshot = self.feed.receive_next(self.clock.as_ref()).await?;
        if let Some(snapshot) = maybe_snapshot {
            let events = self.round_manager.update_from_snapshot(&snapshot, now);
            self.apply_round_events(events, now).await?;
            self.process_snapshot(&snapshot, now).await?;
        }
        Ok(())
    }

    /// 1 Hz periodic checks: timeout policy and force-expiry ahead of the
    /// round boundary (spec.md §4.5, §4.6).
    pub async fn on_timer_tick(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now_ms();

        if let Some(action) = self.state_machine.check_timeout(now) {
            self.dispatch_timeout(action, now).await?;
        }

        let remaining = self
            .round_manager
            .current()
            .map(|m| m.seconds_remaining(now))
            .unwrap_or(0);
        if self.state_machine.should_force_expire(remaining) {
            self.force_expire(now).await?;
        }

        Ok(())
    }

    /// Graceful shutdown (spec.md §5): stop is implicit once the caller's
    /// select loop exits; this disconnects the feed and awaits any
    /// in-flight order with a short grace period.
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        if let Some(pending) = self.pending_leg.take() {
            let deadline = self.clock.now_ms() + 5_000;
            loop {
                match self.order_client.get_order(&pending.order_id).await {
                    Ok(Some(order)) if order.status == OrderStatus::Pending => {
                        if self.clock.now_ms() >= deadline {
                            warn!(order_id = %pending.order_id, "shutdown grace period elapsed with order still pending");
                            break;
                        }
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    }
                    _ => break,
                }
            }
        }
        self.feed.disconnect().await?;
        Ok(())
    }

    /// Drains a worklist of round events, handling each in order. Handlers
    /// may enqueue further events (e.g. a `RoundExpired` triggering
    /// `auto_transition_to_next_market`, which yields its own
    /// `MarketSwitched`/`RoundStarted`) instead of recursing.
    async fn apply_round_events(&mut self, events: Vec<RoundEvent>, now: i64) -> Result<(), EngineError> {
        let mut queue: std::collections::VecDeque<RoundEvent> = events.into();
        while let Some(event) = queue.pop_front() {
            let follow_up = self.handle_round_event(event, now).await?;
            queue.extend(follow_up);
        }
        Ok(())
    }

    /// Handles one event, returning any further events it produced.
    async fn handle_round_event(&mut self, event: RoundEvent, now: i64) -> Result<Vec<RoundEvent>, EngineError> {
        match event {
            RoundEvent::RoundStarted(market) => {
                info!(round_id = %market.round_id, "round started");
                self.dump_detector.reset_for_round(&market.round_id);
                self.maybe_start_cycle(&market, now)?;
            }
            RoundEvent::RoundEnding { round_id } => {
                info!(round_id, "round ending soon");
            }
            RoundEvent::RoundExpired { round_id } => {
                info!(round_id, "round expired");
                self.expire_current_cycle(now).await?;
                if self.round_manager.auto_discover() {
                    if let Some(events) = self.round_manager.auto_transition_to_next_market(now).await {
                        return Ok(events);
                    }
                }
            }
            RoundEvent::MarketSwitched { to, .. } => {
                if let Some(market) = self.round_manager.current().cloned() {
                    if market.round_id == to {
                        self.feed.set_tokens(market.up_token_id.clone(), market.down_token_id.clone()).await?;
                        self.feed.set_round_id(market.round_id.clone());
                    }
                }
            }
        }
        Ok(Vec::new())
    }

    fn maybe_start_cycle(&mut self, market: &MarketInfo, now: i64) -> Result<(), EngineError> {
        if self.state_machine.current_status() != CycleStatus::Idle {
            return Ok(());
        }
        if now < self.cooldown_until_ms {
            return Ok(());
        }
        if !market.is_active(now) {
            return Ok(());
        }
        self.state_machine.start_new_cycle(market.round_id.clone(), now);
        Ok(())
    }

    async fn expire_current_cycle(&mut self, now: i64) -> Result<(), EngineError> {
        if self.state_machine.current_status() == CycleStatus::Idle {
            return Ok(());
        }
        if let Some(pending) = self.pending_leg.take() {
            let _ = self.order_client.cancel(&pending.order_id).await;
        }
        self.state_machine.on_round_expired(now)?;
        self.finish_cycle(now)?;
        Ok(())
    }

    async fn process_snapshot(&mut self, snapshot: &PriceSnapshot, now: i64) -> Result<(), EngineError> {
        match self.state_machine.current_status() {
            CycleStatus::Idle => {
                if let Some(market) = self.round_manager.current().cloned() {
                    self.maybe_start_cycle(&market, now)?;
                }
            }
            CycleStatus::Watching => {
                let dump_window = self.feed.recent_snapshots(DUMP_LOOKBACK_MS, now);
                let predict_window = self.feed.recent_snapshots(PREDICT_LOOKBACK_MS, now);
                self.poll_for_dump(&dump_window, &predict_window, snapshot, now).await?
            }
            CycleStatus::Leg1Filled => self.maybe_submit_leg2(snapshot, now).await?,
            _ => {}
        }
        Ok(())
    }

    /// Decision logic for the `Watching` state, decoupled from the live feed
    /// so it can be driven directly with synthetic snapshot windows in tests.
    async fn poll_for_dump(
        &mut self,
        dump_window: &[PriceSnapshot],
        predict_window: &[PriceSnapshot],
        snapshot: &PriceSnapshot,
        now: i64,
    ) -> Result<(), EngineError> {
        let Some(market) = self.round_manager.current().cloned() else {
            return Ok(());
        };
        let Some(signal) = self.dump_detector.detect(dump_window, market.start_time_ms, now) else {
            return Ok(());
        };

        info!(side = %signal.side, drop_pct = signal.drop_pct, "dump signal detected");
        let prediction =
            self.hedge_strategy.predict_entry(signal.side, signal.price, predict_window, market.seconds_remaining(now));
        tracing::debug!(
            probability = prediction.probability,
            confidence = prediction.confidence,
            recommendation = ?prediction.recommendation,
            "entry probability estimate (advisory, does not gate execution)"
        );

        self.state_machine.on_dump_detected(&signal, now)?;

        if !self.config.auto_mode {
            // Detection-only mode: publish the signal but never submit.
            return Ok(());
        }

        self.submit_leg1(&signal, snapshot, now).await
    }

    async fn submit_leg1(&mut self, signal: &DumpSignal, snapshot: &PriceSnapshot, now: i64) -> Result<(), EngineError> {
        let token_id = self.token_for(signal.side, snapshot);
        let shares = if signal.price.is_zero() {
            Decimal::ZERO
        } else {
            self.config.max_order_usdc / signal.price
        };

        match self.order_client.buy_shares(signal.side, &token_id, shares, signal.price).await {
            Ok(result) => self.handle_leg1_result(result, now).await,
            Err(e) => {
                warn!(error = %e, "leg1 submission failed");
                self.state_machine.on_error(e.to_string(), now)?;
                self.finish_cycle(now)?;
                Ok(())
            }
        }
    }

    async fn handle_leg1_result(&mut self, result: OrderResult, now: i64) -> Result<(), EngineError> {
        match result.status {
            OrderStatus::Filled => {
                self.state_machine.on_leg1_filled(&result, now)?;
                self.pending_leg = None;
            }
            OrderStatus::Rejected => {
                let reason = result.error.clone().unwrap_or_else(|| "rejected".to_string());
                self.state_machine.on_error(reason, now)?;
                self.finish_cycle(now)?;
            }
            OrderStatus::Pending | OrderStatus::Partial => {
                self.pending_leg = Some(PendingOrder { order_id: result.order_id });
            }
        }
        Ok(())
    }

    async fn maybe_submit_leg2(&mut self, snapshot: &PriceSnapshot, now: i64) -> Result<(), EngineError> {
        let Some(cycle) = self.state_machine.current_cycle().cloned() else {
            return Ok(());
        };
        let Some(leg1) = cycle.leg1.clone() else {
            return Ok(());
        };

        let evaluation = self.hedge_strategy.calculate_hedge(&leg1, snapshot);
        if !evaluation.should_hedge {
            return Ok(());
        }

        self.state_machine.on_leg2_started(now)?;
        let opposite = leg1.side.opposite();
        let token_id = self.token_for(opposite, snapshot);

        match self.order_client.buy_shares(opposite, &token_id, leg1.shares, evaluation.opposite_price).await {
            Ok(result) if result.status == OrderStatus::Filled => {
                self.state_machine.on_leg2_filled(&result, now)?;
                let cycle = self.state_machine.current_cycle().expect("just completed");
                info!(
                    round_id = %cycle.round_id,
                    profit = %cycle.guaranteed_profit.unwrap_or_default(),
                    "cycle completed"
                );
                self.pending_leg = None;
                self.finish_cycle(now)?;
            }
            Ok(result) => {
                self.pending_leg = Some(PendingOrder { order_id: result.order_id });
            }
            Err(e) => {
                warn!(error = %e, "leg2 submission failed");
                self.state_machine.on_error(e.to_string(), now)?;
                self.finish_cycle(now)?;
            }
        }
        Ok(())
    }

    async fn dispatch_timeout(&mut self, action: TimeoutAction, now: i64) -> Result<(), EngineError> {
        match action {
            TimeoutAction::Cancel => {
                if let Some(pending) = self.pending_leg.take() {
                    let _ = self.order_client.cancel(&pending.order_id).await;
                }
                self.state_machine.on_error("timed out waiting for fill", now)?;
                self.finish_cycle(now)?;
            }
            TimeoutAction::Warn => {
                warn!("leg1 filled but unhedged well past the warn threshold");
            }
        }
        Ok(())
    }

    async fn force_expire(&mut self, now: i64) -> Result<(), EngineError> {
        if let Some(pending) = self.pending_leg.take() {
            let _ = self.order_client.cancel(&pending.order_id).await;
        }
        self.state_machine.on_round_expired(now)?;
        self.finish_cycle(now)?;
        Ok(())
    }

    /// Resets the state machine to IDLE after a terminal transition and
    /// starts the cooldown window (spec.md §6 `COOLDOWN_MS`; grounded on the
    /// teacher's momentum-trader per-market cooldown).
    fn finish_cycle(&mut self, now: i64) -> Result<(), EngineError> {
        self.state_machine.reset()?;
        self.cooldown_until_ms = now + self.config.cooldown_ms;
        self.cycles_completed += 1;
        Ok(())
    }

    fn token_for(&self, side: Side, snapshot: &PriceSnapshot) -> String {
        match side {
            Side::Up => snapshot.up_token_id.clone(),
            Side::Down => snapshot.down_token_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{MarketInfo, RoundStatus, SystemClock, VirtualClock};
    use dump_detector::DumpDetectorConfig;
    use hedge_strategy::HedgeStrategyConfig;
    use market_feed::{MarketFeed, MarketFeedConfig};
    use order_client::MockOrderClient;
    use round_manager::{RoundManager, RoundManagerConfig};
    use rust_decimal_macros::dec;
    use state_machine::TimeoutPolicy;

    fn market(round_id: &str, start: i64, end: i64) -> MarketInfo {
        MarketInfo {
            round_id: round_id.to_string(),
            human_label: round_id.to_string(),
            start_time_ms: start,
            end_time_ms: end,
            up_token_id: format!("up-{round_id}"),
            down_token_id: format!("down-{round_id}"),
            status: RoundStatus::Active,
        }
    }

    fn snap(ts: i64, round_id: &str, up_ask: Decimal, down_ask: Decimal) -> PriceSnapshot {
        PriceSnapshot {
            timestamp_ms: ts,
            round_id: round_id.to_string(),
            seconds_remaining: 0,
            up_token_id: format!("up-{round_id}"),
            down_token_id: format!("down-{round_id}"),
            up_best_ask: up_ask,
            up_best_bid: up_ask,
            down_best_ask: down_ask,
            down_best_bid: down_ask,
        }
    }

    fn test_engine(order_client: MockOrderClient, auto_mode: bool, cooldown_ms: i64) -> TradingEngine {
        TradingEngine::new(
            MarketFeed::new(MarketFeedConfig::default(), String::new(), String::new()),
            RoundManager::new(RoundManagerConfig::default()),
            DumpDetector::new(DumpDetectorConfig { move_pct: 0.15, window_min: 2.0 }),
            HedgeStrategy::new(HedgeStrategyConfig { sum_target: dec!(0.95), fee_rate: Decimal::ZERO }),
            StateMachine::new(TimeoutPolicy::default()),
            Arc::new(order_client),
            Arc::new(SystemClock),
            EngineConfig { auto_mode, max_order_usdc: dec!(20), cooldown_ms },
        )
    }

    fn filled(side: Side, shares: Decimal, avg_price: Decimal, ts: i64) -> OrderResult {
        OrderResult {
            order_id: format!("sim-{ts}"),
            side,
            shares,
            avg_price,
            total_cost: shares * avg_price,
            status: OrderStatus::Filled,
            timestamp_ms: ts,
            error: None,
        }
    }

    #[test]
    fn maybe_start_cycle_respects_cooldown_and_active_window() {
        let mut engine = test_engine(MockOrderClient::new(), true, 5_000);
        let m = market("r1", 0, 100_000);

        engine.cooldown_until_ms = 10_000;
        engine.maybe_start_cycle(&m, 5_000).unwrap();
        assert_eq!(engine.current_status(), CycleStatus::Idle, "still in cooldown");

        engine.maybe_start_cycle(&m, 10_000).unwrap();
        assert_eq!(engine.current_status(), CycleStatus::Watching);
    }

    #[test]
    fn maybe_start_cycle_ignores_inactive_market() {
        let mut engine = test_engine(MockOrderClient::new(), true, 0);
        let m = market("r1", 0, 1_000);
        engine.maybe_start_cycle(&m, 5_000).unwrap();
        assert_eq!(engine.current_status(), CycleStatus::Idle);
    }

    #[tokio::test]
    async fn poll_for_dump_submits_leg1_and_advances_to_leg1_filled_in_auto_mode() {
        let mut mock = MockOrderClient::new();
        mock.expect_buy_shares()
            .withf(|side, _token, _shares, _limit| *side == Side::Up)
            .returning(|side, _token, shares, limit| Ok(filled(side, shares, limit, 2_000)));

        let mut engine = test_engine(mock, true, 0);
        engine.round_manager.set_markets_for_test(Some(market("r1", 0, 100_000)), None);
        engine.state_machine.start_new_cycle("r1".to_string(), 0);

        let dump_window = vec![snap(0, "r1", dec!(0.50), dec!(0.50)), snap(2_000, "r1", dec!(0.35), dec!(0.65))];
        let now_snap = snap(2_000, "r1", dec!(0.35), dec!(0.65));

        engine.poll_for_dump(&dump_window, &[], &now_snap, 2_000).await.unwrap();

        assert_eq!(engine.current_status(), CycleStatus::Leg1Filled);
        assert_eq!(engine.state_machine.current_cycle().unwrap().leg1.as_ref().unwrap().entry_price, dec!(0.35));
    }

    #[tokio::test]
    async fn poll_for_dump_detection_only_mode_never_submits() {
        let mut mock = MockOrderClient::new();
        mock.expect_buy_shares().times(0);

        let mut engine = test_engine(mock, false, 0);
        engine.round_manager.set_markets_for_test(Some(market("r1", 0, 100_000)), None);
        engine.state_machine.start_new_cycle("r1".to_string(), 0);

        let dump_window = vec![snap(0, "r1", dec!(0.50), dec!(0.50)), snap(2_000, "r1", dec!(0.35), dec!(0.65))];
        let now_snap = snap(2_000, "r1", dec!(0.35), dec!(0.65));
        engine.poll_for_dump(&dump_window, &[], &now_snap, 2_000).await.unwrap();

        assert_eq!(engine.current_status(), CycleStatus::Leg1Pending, "signal still recorded, just not acted on");
    }

    #[tokio::test]
    async fn maybe_submit_leg2_completes_cycle_and_resets_to_idle() {
        let mut mock = MockOrderClient::new();
        mock.expect_buy_shares()
            .returning(|side, _token, shares, limit| Ok(filled(side, shares, limit, 3_000)));

        let mut engine = test_engine(mock, true, 1_000);
        engine.round_manager.set_markets_for_test(Some(market("r1", 0, 100_000)), None);
        engine.state_machine.start_new_cycle("r1".to_string(), 0);
        engine
            .state_machine
            .on_dump_detected(&DumpSignal { side: Side::Up, drop_pct: 0.30, price: dec!(0.35), previous_price: dec!(0.50), timestamp_ms: 2_000, round_id: "r1".to_string() }, 2_000)
            .unwrap();
        engine.state_machine.on_leg1_filled(&filled(Side::Up, dec!(20), dec!(0.35), 2_000), 2_000).unwrap();

        let snapshot = snap(3_000, "r1", dec!(0.35), dec!(0.58));
        engine.maybe_submit_leg2(&snapshot, 3_000).await.unwrap();

        assert_eq!(engine.current_status(), CycleStatus::Idle, "finish_cycle resets after completion");
        assert_eq!(engine.cycles_completed(), 1);
        assert_eq!(engine.cooldown_until_ms, 4_000);
    }

    #[tokio::test]
    async fn maybe_submit_leg2_skips_when_hedge_unfavorable() {
        let mut mock = MockOrderClient::new();
        mock.expect_buy_shares().times(0);

        let mut engine = test_engine(mock, true, 0);
        engine.round_manager.set_markets_for_test(Some(market("r1", 0, 100_000)), None);
        engine.state_machine.start_new_cycle("r1".to_string(), 0);
        engine
            .state_machine
            .on_dump_detected(&DumpSignal { side: Side::Up, drop_pct: 0.30, price: dec!(0.35), previous_price: dec!(0.50), timestamp_ms: 2_000, round_id: "r1".to_string() }, 2_000)
            .unwrap();
        engine.state_machine.on_leg1_filled(&filled(Side::Up, dec!(20), dec!(0.35), 2_000), 2_000).unwrap();

        // opposite ask 0.70 -> sum 1.05, above the 0.95 target.
        let snapshot = snap(3_000, "r1", dec!(0.35), dec!(0.70));
        engine.maybe_submit_leg2(&snapshot, 3_000).await.unwrap();

        assert_eq!(engine.current_status(), CycleStatus::Leg1Filled, "must keep waiting for a better hedge");
    }

    #[tokio::test]
    async fn dispatch_timeout_cancel_cancels_pending_order_and_finishes_cycle() {
        let mut mock = MockOrderClient::new();
        mock.expect_cancel().withf(|id| id == "sim-pending").returning(|_| Ok(true));

        let mut engine = test_engine(mock, true, 2_000);
        engine.state_machine.start_new_cycle("r1".to_string(), 0);
        engine
            .state_machine
            .on_dump_detected(&DumpSignal { side: Side::Up, drop_pct: 0.30, price: dec!(0.35), previous_price: dec!(0.50), timestamp_ms: 0, round_id: "r1".to_string() }, 0)
            .unwrap();
        engine.pending_leg = Some(PendingOrder { order_id: "sim-pending".to_string() });

        engine.dispatch_timeout(TimeoutAction::Cancel, 31_000).await.unwrap();

        assert_eq!(engine.current_status(), CycleStatus::Idle);
        assert!(engine.pending_leg.is_none());
        assert_eq!(engine.cooldown_until_ms, 33_000);
    }

    #[tokio::test]
    async fn handle_round_event_market_switched_rewires_feed_tokens() {
        let engine_clock = Arc::new(VirtualClock::new(0));
        let mut engine = TradingEngine::new(
            MarketFeed::new(MarketFeedConfig::default(), String::new(), String::new()),
            RoundManager::new(RoundManagerConfig::default()),
            DumpDetector::new(DumpDetectorConfig::default()),
            HedgeStrategy::new(HedgeStrategyConfig { sum_target: dec!(0.95), fee_rate: Decimal::ZERO }),
            StateMachine::new(TimeoutPolicy::default()),
            Arc::new(MockOrderClient::new()),
            engine_clock,
            EngineConfig { auto_mode: true, max_order_usdc: dec!(20), cooldown_ms: 0 },
        );
        engine.round_manager.set_markets_for_test(Some(market("r2", 0, 100_000)), None);

        engine
            .handle_round_event(RoundEvent::MarketSwitched { from: Some("r1".to_string()), to: "r2".to_string() }, 0)
            .await
            .unwrap();

        assert_eq!(engine.feed.latest_snapshot(), None, "no traffic yet, just confirms the call didn't panic");
    }

    #[tokio::test]
    async fn apply_round_events_cascades_round_expired_into_auto_transition() {
        let mut engine = test_engine(MockOrderClient::new(), true, 0);
        engine.round_manager.set_markets_for_test(Some(market("r1", 0, 1_000)), Some(market("r2", 1_000, 100_000)));
        engine.state_machine.start_new_cycle("r1".to_string(), 0);

        engine
            .apply_round_events(vec![RoundEvent::RoundExpired { round_id: "r1".to_string() }], 1_000)
            .await
            .unwrap();

        assert_eq!(engine.round_manager.current().unwrap().round_id, "r2");
        assert_eq!(engine.current_status(), CycleStatus::Watching, "a fresh cycle starts for the new round");
    }
}
