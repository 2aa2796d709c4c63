//! Owns "the round we are trading right now" (spec.md §4.2, §4.2.a).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{MarketInfo, PriceSnapshot, RoundStatus};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::MarketCache;
use crate::discovery::{DiscoveredMarket, DiscoveryClient};
use crate::error::RoundManagerError;
use crate::events::RoundEvent;

const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_secs(10);
const ENSURE_ACTIVE_TIMEOUT: Duration = Duration::from_secs(5);
const NEXT_MARKET_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const PRE_START_SLEEP_CAP: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct RoundManagerConfig {
    /// `None` selects dynamic auto-discovery mode; `Some` pins static mode.
    pub condition_id: Option<String>,
    pub gamma_api_url: String,
    /// Keywords the discovery search is filtered by (spec.md §4.2 step 1).
    pub keywords: Vec<String>,
}

impl Default for RoundManagerConfig {
    fn default() -> Self {
        Self {
            condition_id: None,
            gamma_api_url: "https://gamma-api.polymarket.com".to_string(),
            keywords: vec!["bitcoin".to_string(), "btc".to_string()],
        }
    }
}

fn to_market_info(m: DiscoveredMarket, status: RoundStatus) -> MarketInfo {
    MarketInfo {
        round_id: m.condition_id,
        human_label: m.human_label,
        start_time_ms: m.start_time_ms,
        end_time_ms: m.end_time_ms,
        up_token_id: m.up_token_id,
        down_token_id: m.down_token_id,
        status,
    }
}

pub struct RoundManager {
    config: RoundManagerConfig,
    discovery: DiscoveryClient,
    current: Option<MarketInfo>,
    next: Option<MarketInfo>,
    cache: MarketCache,
    ending_warned: bool,
    expired_emitted: bool,
    discovery_error_count: u32,
    transitioning: AtomicBool,
    discovered_rx: Option<mpsc::UnboundedReceiver<Vec<DiscoveredMarket>>>,
}

impl RoundManager {
    pub fn new(config: RoundManagerConfig) -> Self {
        let discovery = DiscoveryClient::new(config.gamma_api_url.clone(), config.keywords.clone());
        Self {
            config,
            discovery,
            current: None,
            next: None,
            cache: MarketCache::default(),
            ending_warned: false,
            expired_emitted: false,
            discovery_error_count: 0,
            transitioning: AtomicBool::new(false),
            discovered_rx: None,
        }
    }

    pub fn auto_discover(&self) -> bool {
        self.config.condition_id.is_none()
    }

    pub fn current(&self) -> Option<&MarketInfo> {
        self.current.as_ref()
    }

    pub fn next_market(&self) -> Option<&MarketInfo> {
        self.next.as_ref()
    }

    /// Directly sets `current`/`next`, bypassing discovery. For tests of
    /// downstream crates that need a `RoundManager` in a known state without
    /// driving it through HTTP.
    #[cfg(feature = "test-support")]
    pub fn set_markets_for_test(&mut self, current: Option<MarketInfo>, next: Option<MarketInfo>) {
        self.current = current;
        self.next = next;
    }

    pub fn discovery_error_count(&self) -> u32 {
        self.discovery_error_count
    }

    /// Starts the discovery poller (interval 10s, spec.md §4.2). The poller
    /// runs as its own task and only ever pushes results back through a
    /// channel `RoundManager` owns; it never calls back into the engine
    /// (spec.md §9 event-bus redesign note).
    pub fn enable_auto_discover(&mut self) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.discovered_rx = Some(rx);
        let base_url = self.config.gamma_api_url.clone();
        let keywords = self.config.keywords.clone();
        tokio::spawn(async move {
            let client = DiscoveryClient::new(base_url, keywords);
            let mut interval = tokio::time::interval(DISCOVERY_POLL_INTERVAL);
            loop {
                interval.tick().await;
                let now_ms = chrono::Utc::now().timestamp_millis();
                match client.search(now_ms).await {
                    Ok(markets) => {
                        if tx.send(markets).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "discovery poll failed"),
                }
            }
        });
    }

    /// Drains any discovery results published since the last call, folding
    /// them into the market cache and `next` pointer. Switches `current` to
    /// a discovered market that differs from it, per `enable_auto_discover`'s
    /// contract.
    pub fn drain_discovered(&mut self, now_ms: i64) -> Vec<RoundEvent> {
        let Some(rx) = self.discovered_rx.as_mut() else {
            return Vec::new();
        };
        let mut batches = Vec::new();
        while let Ok(markets) = rx.try_recv() {
            batches.push(markets);
        }
        let mut events = Vec::new();
        for markets in batches {
            for m in &markets {
                self.cache.insert(m.clone());
            }
            self.update_current_and_next(&markets, now_ms, &mut events);
        }
        events
    }

    fn update_current_and_next(
        &mut self,
        markets: &[DiscoveredMarket],
        now_ms: i64,
        events: &mut Vec<RoundEvent>,
    ) {
        let active = markets.iter().find(|m| m.start_time_ms <= now_ms && now_ms < m.end_time_ms);
        let next = markets.iter().find(|m| m.start_time_ms > now_ms);
        self.next = next.cloned().map(|m| to_market_info(m, RoundStatus::Pending));

        if let Some(active) = active {
            let differs = self
                .current
                .as_ref()
                .map(|c| c.round_id != active.condition_id)
                .unwrap_or(true);
            if differs {
                events.extend(self.transition_to(to_market_info(active.clone(), RoundStatus::Active), now_ms));
            }
        }
    }

    /// Awaits up to 5s for auto-discovery to yield a market; falls back to
    /// the statically configured `condition_id`; reports no-market if both
    /// fail (spec.md §4.2 "ensure_active_market").
    pub async fn ensure_active_market(&mut self, now_ms: i64) -> Result<Vec<RoundEvent>, RoundManagerError> {
        if let Some(condition_id) = self.config.condition_id.clone() {
            return self.ensure_static_market(&condition_id, now_ms).await;
        }

        if let Some(rx) = self.discovered_rx.as_mut() {
            if let Ok(Ok(markets)) = tokio::time::timeout(ENSURE_ACTIVE_TIMEOUT, rx.recv()).await.map(|o| o.ok_or(())) {
                let mut events = Vec::new();
                for m in &markets {
                    self.cache.insert(m.clone());
                }
                self.update_current_and_next(&markets, now_ms, &mut events);
                if self.current.is_some() {
                    return Ok(events);
                }
            }
        }

        match self.config.condition_id.clone() {
            Some(condition_id) => self.ensure_static_market(&condition_id, now_ms).await,
            None => Err(RoundManagerError::NoMarketAvailable),
        }
    }

    async fn ensure_static_market(
        &mut self,
        condition_id: &str,
        now_ms: i64,
    ) -> Result<Vec<RoundEvent>, RoundManagerError> {
        if let Some(current) = &self.current {
            if current.round_id == condition_id {
                return Ok(Vec::new());
            }
        }
        match self.discovery.fetch_by_condition_id(condition_id, now_ms).await {
            Ok(market) => {
                let info = to_market_info(market, RoundStatus::Active);
                Ok(self.transition_to(info, now_ms))
            }
            Err(e) => {
                self.discovery_error_count += 1;
                Err(e)
            }
        }
    }

    /// Idempotent re-entrant guard around rotating to the cached `next`
    /// market (spec.md §4.2, §5).
    pub async fn auto_transition_to_next_market(&mut self, now_ms: i64) -> Option<Vec<RoundEvent>> {
        if self
            .transitioning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let result = self.do_auto_transition(now_ms).await;
        self.transitioning.store(false, Ordering::SeqCst);
        Some(result)
    }

    async fn do_auto_transition(&mut self, now_ms: i64) -> Vec<RoundEvent> {
        let next = match self.next.clone() {
            Some(n) => n,
            None => {
                if let Some(rx) = self.discovered_rx.as_mut() {
                    match tokio::time::timeout(NEXT_MARKET_WAIT_TIMEOUT, rx.recv()).await {
                        Ok(Some(markets)) => {
                            for m in &markets {
                                self.cache.insert(m.clone());
                            }
                            match markets.into_iter().find(|m| m.start_time_ms > now_ms) {
                                Some(m) => to_market_info(m, RoundStatus::Pending),
                                None => return Vec::new(),
                            }
                        }
                        _ => return Vec::new(),
                    }
                } else {
                    return Vec::new();
                }
            }
        };

        if next.start_time_ms > now_ms {
            let wait = Duration::from_millis((next.start_time_ms - now_ms) as u64).min(PRE_START_SLEEP_CAP);
            tokio::time::sleep(wait).await;
        }

        self.next = None;
        // The only caller is the engine's RoundExpired handler, which has
        // already treated `current` as expired; suppress transition_to's
        // own RoundExpired so it isn't emitted twice for the same round.
        self.expired_emitted = true;

        let mut info = next;
        info.status = RoundStatus::Active;
        self.transition_to(info, now_ms)
    }

    /// Processes one inbound snapshot: handles the dynamic-mode round-id
    /// drift path and emits `RoundEnding`/`RoundExpired` (spec.md §4.2).
    /// In static mode, `snap.round_id`/`seconds_remaining` are ignored;
    /// the API-reported `end_time` is authoritative (spec.md §4.2 "static
    /// mode").
    pub fn update_from_snapshot(&mut self, snap: &PriceSnapshot, now_ms: i64) -> Vec<RoundEvent> {
        let mut events = Vec::new();

        if self.auto_discover() {
            if let Some(current) = &self.current {
                if snap.round_id != current.round_id {
                    if let Some(cached) = self.cache.get(&snap.round_id).cloned() {
                        events.extend(self.transition_to(to_market_info(cached, RoundStatus::Active), now_ms));
                    }
                }
            }
        }

        let Some(current) = self.current.clone() else {
            return events;
        };
        let seconds_remaining = current.seconds_remaining(now_ms);

        if seconds_remaining <= 60 && !self.ending_warned {
            self.ending_warned = true;
            events.push(RoundEvent::RoundEnding { round_id: current.round_id.clone() });
        }
        if seconds_remaining <= 0 && !self.expired_emitted {
            self.expired_emitted = true;
            if let Some(c) = self.current.as_mut() {
                c.status = RoundStatus::Resolved;
            }
            events.push(RoundEvent::RoundExpired { round_id: current.round_id });
        }

        events
    }

    fn transition_to(&mut self, new_market: MarketInfo, _now_ms: i64) -> Vec<RoundEvent> {
        let mut events = Vec::new();
        let from = self.current.as_ref().map(|c| c.round_id.clone());

        if let Some(old) = &self.current {
            if !self.expired_emitted && old.round_id != new_market.round_id {
                events.push(RoundEvent::RoundExpired { round_id: old.round_id.clone() });
            }
        }

        info!(from = ?from, to = %new_market.round_id, "round manager switching market");
        events.push(RoundEvent::MarketSwitched { from, to: new_market.round_id.clone() });
        events.push(RoundEvent::RoundStarted(new_market.clone()));

        self.current = Some(new_market);
        self.ending_warned = false;
        self.expired_emitted = false;
        events
    }
}
