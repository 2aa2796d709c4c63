//! Venue-facing live `OrderClient` shape, gated behind the `live` feature.
//!
//! Signed order submission is the "black-box `OrderClient` contract"
//! spec.md §1 places out of scope for this core; this module gives the
//! shape the contract implies (builder-credential auth, nonce-guarded
//! submission, `X-Nonce`/signature headers per spec.md §6) without
//! reproducing the full Polymarket CLOB signing flow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Clock, Order, OrderResult, OrderStatus, Side};
use rust_decimal::Decimal;

use crate::nonce::NonceGuard;
use crate::{OrderClient, OrderClientError};

const ORDER_SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Builder credentials required to authenticate submission requests.
#[derive(Debug, Clone)]
pub struct BuilderCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

pub struct LiveOrderClient {
    clob_api_url: String,
    credentials: BuilderCredentials,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    nonce_guard: NonceGuard,
    next_nonce: AtomicU64,
}

impl LiveOrderClient {
    pub fn new(clob_api_url: String, credentials: BuilderCredentials, clock: Arc<dyn Clock>) -> Self {
        Self {
            clob_api_url,
            credentials,
            http: reqwest::Client::new(),
            clock,
            nonce_guard: NonceGuard::new(),
            next_nonce: AtomicU64::new(1),
        }
    }

    fn draw_nonce(&self) -> u64 {
        self.next_nonce.fetch_add(1, Ordering::SeqCst)
    }

    /// POST a signed order submission. The canonical-request signature over
    /// `X-Nonce` plus the request body is out of this core's scope (spec.md
    /// §1's black-box `OrderClient` contract); this sends the shape of the
    /// request the venue expects once a signer is wired in by the caller.
    async fn submit(&self, body: serde_json::Value) -> Result<OrderResult, OrderClientError> {
        let now = self.clock.now_ms();
        let nonce = self.draw_nonce();
        if !self.nonce_guard.check_and_record(nonce, now) {
            return Err(OrderClientError::Transport("nonce replay detected".into()));
        }

        let url = format!("{}/order", self.clob_api_url);
        let response = tokio::time::timeout(
            ORDER_SUBMIT_TIMEOUT,
            self.http
                .post(&url)
                .header("X-Nonce", nonce.to_string())
                .header("X-API-Key", &self.credentials.api_key)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| OrderClientError::Timeout)?
        .map_err(|e| OrderClientError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrderClientError::Rejected(format!(
                "venue returned {}",
                response.status()
            )));
        }

        let parsed: VenueOrderResponse = response
            .json()
            .await
            .map_err(|e| OrderClientError::Transport(e.to_string()))?;
        parsed.into_order_result()
    }
}

#[derive(Debug, serde::Deserialize)]
struct VenueOrderResponse {
    id: String,
    status: String,
    #[serde(rename = "filledSize")]
    filled_size: Decimal,
    #[serde(rename = "avgFillPrice")]
    avg_fill_price: Decimal,
    #[serde(rename = "totalCost")]
    total_cost: Decimal,
    #[serde(default)]
    error: Option<String>,
}

impl VenueOrderResponse {
    fn into_order_result(self) -> Result<OrderResult, OrderClientError> {
        let status = match self.status.as_str() {
            "filled" => OrderStatus::Filled,
            "partial" => OrderStatus::Partial,
            "pending" => OrderStatus::Pending,
            _ => OrderStatus::Rejected,
        };
        if status == OrderStatus::Rejected {
            return Err(OrderClientError::Rejected(
                self.error.unwrap_or_else(|| "rejected".to_string()),
            ));
        }
        // `side` is not part of the venue response; callers attach it from
        // the request they issued. This shape intentionally defaults to the
        // side implied by the caller, set by `buy_shares`/`buy_by_usd` below.
        Ok(OrderResult {
            order_id: self.id,
            side: Side::Up,
            shares: self.filled_size,
            avg_price: self.avg_fill_price,
            total_cost: self.total_cost,
            status,
            timestamp_ms: 0,
            error: self.error,
        })
    }
}

#[async_trait]
impl OrderClient for LiveOrderClient {
    async fn buy_shares(
        &self,
        side: Side,
        token_id: &str,
        shares: Decimal,
        limit_price: Decimal,
    ) -> Result<OrderResult, OrderClientError> {
        let body = serde_json::json!({
            "token_id": token_id,
            "side": side.to_string(),
            "size": shares.to_string(),
            "price": limit_price.to_string(),
            "order_type": "limit",
        });
        let mut result = self.submit(body).await?;
        result.side = side;
        result.timestamp_ms = self.clock.now_ms();
        Ok(result)
    }

    async fn buy_by_usd(
        &self,
        side: Side,
        token_id: &str,
        usd_amount: Decimal,
    ) -> Result<OrderResult, OrderClientError> {
        let body = serde_json::json!({
            "token_id": token_id,
            "side": side.to_string(),
            "usd_amount": usd_amount.to_string(),
            "order_type": "market",
        });
        let mut result = self.submit(body).await?;
        result.side = side;
        result.timestamp_ms = self.clock.now_ms();
        Ok(result)
    }

    async fn cancel(&self, order_id: &str) -> Result<bool, OrderClientError> {
        let url = format!("{}/order/{order_id}", self.clob_api_url);
        let response = tokio::time::timeout(ORDER_SUBMIT_TIMEOUT, self.http.delete(&url).send())
            .await
            .map_err(|_| OrderClientError::Timeout)?
            .map_err(|e| OrderClientError::Transport(e.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, OrderClientError> {
        let url = format!("{}/order/{order_id}", self.clob_api_url);
        let response = tokio::time::timeout(ORDER_SUBMIT_TIMEOUT, self.http.get(&url).send())
            .await
            .map_err(|_| OrderClientError::Timeout)?
            .map_err(|e| OrderClientError::Transport(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(OrderClientError::Transport(format!(
                "venue returned {}",
                response.status()
            )));
        }
        Err(OrderClientError::LiveUnavailable(
            "order lookup requires the full venue order schema, not implemented in this core"
                .to_string(),
        ))
    }

    fn can_trade(&self) -> bool {
        !self.credentials.api_key.is_empty()
    }
}
