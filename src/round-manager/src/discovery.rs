//! Gamma-API-shaped market discovery (spec.md §4.2 "Discovery algorithm",
//! §6 REST).
//!
//! Wire shapes and acceptance criteria follow spec.md exactly; this module
//! is pure parsing/filtering plus a thin `reqwest` client, grounded on
//! `common::gamma::GammaClient`'s request style.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::RoundManagerError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const FIFTEEN_MIN_MS: i64 = 15 * 60 * 1000;
const MIN_DURATION_MS: i64 = 14 * 60 * 1000;
const MAX_DURATION_MS: i64 = 16 * 60 * 1000;

/// A market accepted by the discovery filter (spec.md §4.2 step 4-5).
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredMarket {
    pub condition_id: String,
    pub human_label: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub up_token_id: String,
    pub down_token_id: String,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    token_id: String,
    outcome: String,
}

#[derive(Debug, Deserialize)]
struct RawMarket {
    condition_id: String,
    #[serde(default)]
    slug: Option<String>,
    question: String,
    end_date: String,
    #[serde(default)]
    clob_token_ids: Option<Vec<String>>,
    #[serde(default)]
    tokens: Option<Vec<RawToken>>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    markets: Vec<RawMarket>,
}

/// Top-level response shape: either `{events:[{markets:[...]}]}` or a
/// top-level `{markets:[...]}` (spec.md §6).
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    events: Vec<RawEvent>,
    #[serde(default)]
    markets: Vec<RawMarket>,
}

impl RawMarket {
    fn resolve_token_ids(&self) -> Option<(String, String)> {
        if let Some(ids) = &self.clob_token_ids {
            if ids.len() >= 2 {
                return Some((ids[0].clone(), ids[1].clone()));
            }
        }
        let tokens = self.tokens.as_ref()?;
        let up = tokens
            .iter()
            .find(|t| t.outcome.eq_ignore_ascii_case("up"))?;
        let down = tokens
            .iter()
            .find(|t| t.outcome.eq_ignore_ascii_case("down"))?;
        Some((up.token_id.clone(), down.token_id.clone()))
    }

    fn parse_end_time_ms(&self) -> Option<i64> {
        DateTime::parse_from_rfc3339(&self.end_date)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
    }
}

/// Applies spec.md §4.2 steps 1-4 to one raw market, at `now_ms`.
fn accept(raw: &RawMarket, now_ms: i64) -> Option<DiscoveredMarket> {
    let end_time_ms = raw.parse_end_time_ms().or_else(|| {
        warn!(question = %raw.question, end_date = %raw.end_date, "skipping market with non-ISO-8601 end_date");
        None
    })?;
    if end_time_ms <= now_ms {
        return None;
    }

    let (up_token_id, down_token_id) = raw.resolve_token_ids()?;

    let haystack = format!(
        "{} {}",
        raw.question.to_lowercase(),
        raw.slug.as_deref().unwrap_or("").to_lowercase()
    );
    let mentions_btc = haystack.contains("bitcoin") || haystack.contains("btc");
    let mentions_updown = haystack.contains("up") && haystack.contains("down");
    if !mentions_btc || !mentions_updown {
        return None;
    }

    let start_time_ms = end_time_ms - FIFTEEN_MIN_MS;
    let duration_ms = end_time_ms - start_time_ms;
    let duration_ok = (MIN_DURATION_MS..=MAX_DURATION_MS).contains(&duration_ms)
        || raw.question.to_lowercase().contains("15")
        || raw.slug.as_deref().unwrap_or("").to_lowercase().contains("15");
    if !duration_ok {
        return None;
    }

    Some(DiscoveredMarket {
        condition_id: raw.condition_id.clone(),
        human_label: raw.question.clone(),
        start_time_ms,
        end_time_ms,
        up_token_id,
        down_token_id,
    })
}

/// Parses a raw Gamma-shaped search response and applies the acceptance
/// filter, returning markets sorted ascending by `end_time_ms` (spec.md
/// §4.2 step 5).
fn parse_and_filter(body: &[u8], now_ms: i64) -> Result<Vec<DiscoveredMarket>, RoundManagerError> {
    let parsed: SearchResponse =
        serde_json::from_slice(body).map_err(|e| RoundManagerError::Parse(e.to_string()))?;

    let mut raw_markets: Vec<RawMarket> = parsed.markets;
    for event in parsed.events {
        raw_markets.extend(event.markets);
    }

    let mut accepted: Vec<DiscoveredMarket> =
        raw_markets.iter().filter_map(|m| accept(m, now_ms)).collect();
    accepted.sort_by_key(|m| m.end_time_ms);
    Ok(accepted)
}

/// Gamma-shaped market-search REST client (spec.md §6).
pub struct DiscoveryClient {
    http: reqwest::Client,
    base_url: String,
    keywords: Vec<String>,
}

impl DiscoveryClient {
    pub fn new(base_url: String, keywords: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            keywords,
        }
    }

    /// Queries the search endpoint with the configured keywords, parses and
    /// filters the response, retrying once on a 5xx per spec.md §6.
    pub async fn search(&self, now_ms: i64) -> Result<Vec<DiscoveredMarket>, RoundManagerError> {
        let url = format!("{}/markets", self.base_url);
        let query: Vec<(&str, &str)> = self
            .keywords
            .iter()
            .map(|k| ("keyword", k.as_str()))
            .collect();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(
                REQUEST_TIMEOUT,
                self.http.get(&url).query(&query).send(),
            )
            .await
            .map_err(|_| RoundManagerError::Request("discovery request timed out".into()))?
            .map_err(|e| RoundManagerError::Request(e.to_string()));

            let response = match result {
                Ok(r) => r,
                Err(e) if attempt < 2 => {
                    warn!(error = %e, "discovery request failed, retrying once");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if response.status().is_server_error() && attempt < 2 {
                warn!(status = %response.status(), "discovery endpoint returned 5xx, retrying once");
                continue;
            }
            if !response.status().is_success() {
                return Err(RoundManagerError::Request(format!(
                    "discovery endpoint returned {}",
                    response.status()
                )));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| RoundManagerError::Request(e.to_string()))?;
            return parse_and_filter(&body, now_ms);
        }
    }

    /// Fetches a single market by `condition_id` (static-mode fallback,
    /// spec.md §4.2 "static mode").
    pub async fn fetch_by_condition_id(
        &self,
        condition_id: &str,
        now_ms: i64,
    ) -> Result<DiscoveredMarket, RoundManagerError> {
        let url = format!("{}/markets", self.base_url);
        let response = tokio::time::timeout(
            REQUEST_TIMEOUT,
            self.http.get(&url).query(&[("condition_id", condition_id)]).send(),
        )
        .await
        .map_err(|_| RoundManagerError::Request("static market fetch timed out".into()))?
        .map_err(|e| RoundManagerError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RoundManagerError::StaticMarketUnresolved(condition_id.to_string()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| RoundManagerError::Request(e.to_string()))?;
        let parsed: SearchResponse =
            serde_json::from_slice(&body).map_err(|e| RoundManagerError::Parse(e.to_string()))?;
        let mut raw_markets = parsed.markets;
        for event in parsed.events {
            raw_markets.extend(event.markets);
        }
        let raw = raw_markets
            .into_iter()
            .find(|m| m.condition_id == condition_id)
            .ok_or_else(|| RoundManagerError::StaticMarketUnresolved(condition_id.to_string()))?;

        let end_time_ms = raw
            .parse_end_time_ms()
            .ok_or_else(|| RoundManagerError::StaticMarketUnresolved(condition_id.to_string()))?;
        let (up_token_id, down_token_id) = raw
            .resolve_token_ids()
            .ok_or_else(|| RoundManagerError::StaticMarketUnresolved(condition_id.to_string()))?;

        Ok(DiscoveredMarket {
            condition_id: raw.condition_id,
            human_label: raw.question,
            start_time_ms: end_time_ms - FIFTEEN_MIN_MS,
            end_time_ms,
            up_token_id,
            down_token_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP_LEVEL_MARKETS: &str = r#"{
        "markets": [
            {
                "condition_id": "0xabc",
                "slug": "bitcoin-up-or-down-15m",
                "question": "Bitcoin Up or Down 15m?",
                "end_date": "2026-01-01T00:15:00Z",
                "clob_token_ids": ["tok-up", "tok-down"]
            },
            {
                "condition_id": "0xold",
                "question": "Bitcoin Up or Down 15m?",
                "end_date": "2020-01-01T00:15:00Z",
                "clob_token_ids": ["tok-up2", "tok-down2"]
            }
        ]
    }"#;

    const NESTED_EVENTS: &str = r#"{
        "events": [
            {
                "markets": [
                    {
                        "condition_id": "0xdef",
                        "question": "ETH price range market",
                        "end_date": "2026-01-01T00:15:00Z",
                        "tokens": [
                            {"token_id": "eth-up", "outcome": "Up"},
                            {"token_id": "eth-down", "outcome": "Down"}
                        ]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn accepts_bitcoin_updown_15m_market_and_drops_expired() {
        let now = 0;
        let markets = parse_and_filter(TOP_LEVEL_MARKETS.as_bytes(), now).unwrap();
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].condition_id, "0xabc");
        assert_eq!(markets[0].up_token_id, "tok-up");
        assert_eq!(markets[0].down_token_id, "tok-down");
        assert_eq!(markets[0].start_time_ms, markets[0].end_time_ms - FIFTEEN_MIN_MS);
    }

    #[test]
    fn rejects_non_bitcoin_market_even_with_outcome_tokens() {
        let now = 0;
        let markets = parse_and_filter(NESTED_EVENTS.as_bytes(), now).unwrap();
        assert!(markets.is_empty(), "ETH market without bitcoin/btc mention must be rejected");
    }

    #[test]
    fn resolves_tokens_via_outcome_fallback_when_question_mentions_btc() {
        let body = r#"{
            "markets": [{
                "condition_id": "0xfallback",
                "question": "BTC Up or Down?",
                "end_date": "2026-01-01T00:15:00Z",
                "tokens": [
                    {"token_id": "up-id", "outcome": "Up"},
                    {"token_id": "down-id", "outcome": "DOWN"}
                ]
            }]
        }"#;
        let markets = parse_and_filter(body.as_bytes(), 0).unwrap();
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].up_token_id, "up-id");
        assert_eq!(markets[0].down_token_id, "down-id");
    }

    #[test]
    fn non_iso8601_end_date_is_skipped_not_fatal() {
        let body = r#"{
            "markets": [{
                "condition_id": "0xbad",
                "question": "Bitcoin Up or Down 15m",
                "end_date": "Jan 1, 2026",
                "clob_token_ids": ["a", "b"]
            }]
        }"#;
        let markets = parse_and_filter(body.as_bytes(), 0).unwrap();
        assert!(markets.is_empty());
    }

    #[test]
    fn sorts_ascending_by_end_time() {
        let body = r#"{
            "markets": [
                {"condition_id": "later", "question": "Bitcoin Up or Down 15m", "end_date": "2026-02-01T00:00:00Z", "clob_token_ids": ["a","b"]},
                {"condition_id": "earlier", "question": "Bitcoin Up or Down 15m", "end_date": "2026-01-01T00:00:00Z", "clob_token_ids": ["a","b"]}
            ]
        }"#;
        let markets = parse_and_filter(body.as_bytes(), 0).unwrap();
        assert_eq!(markets[0].condition_id, "earlier");
        assert_eq!(markets[1].condition_id, "later");
    }
}
