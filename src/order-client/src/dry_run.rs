//! In-memory dry-run `OrderClient`: synthesizes fills without contacting the
//! venue (spec.md §4.7). Selected whenever builder credentials are absent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{Clock, Order, OrderResult, OrderStatus, Side};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{OrderClient, OrderClientError};

/// Side-effect-free `OrderClient` that always fills at the requested price.
pub struct DryRunOrderClient {
    clock: Arc<dyn Clock>,
    orders: Mutex<HashMap<String, Order>>,
}

impl DryRunOrderClient {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            orders: Mutex::new(HashMap::new()),
        }
    }

    fn synth_id() -> String {
        format!("sim-{}", Uuid::new_v4())
    }

    fn record(&self, order: Order) {
        self.orders
            .lock()
            .expect("dry-run order map mutex poisoned")
            .insert(order.order_id.clone(), order);
    }
}

#[async_trait]
impl OrderClient for DryRunOrderClient {
    async fn buy_shares(
        &self,
        side: Side,
        _token_id: &str,
        shares: Decimal,
        limit_price: Decimal,
    ) -> Result<OrderResult, OrderClientError> {
        let now = self.clock.now_ms();
        let order_id = Self::synth_id();
        self.record(Order {
            order_id: order_id.clone(),
            side,
            shares,
            limit_price,
            status: OrderStatus::Filled,
            created_at_ms: now,
        });
        Ok(OrderResult {
            order_id,
            side,
            shares,
            avg_price: limit_price,
            total_cost: shares * limit_price,
            status: OrderStatus::Filled,
            timestamp_ms: now,
            error: None,
        })
    }

    async fn buy_by_usd(
        &self,
        side: Side,
        token_id: &str,
        usd_amount: Decimal,
    ) -> Result<OrderResult, OrderClientError> {
        // A dry-run "market" fill: synthesize a unit price of 1 share per
        // dollar of notional (the caller already knows the prevailing ask
        // and passes a pre-divided share count in the general case; spec.md
        // treats this as the notional-style sibling of `buy_shares`).
        self.buy_shares(side, token_id, usd_amount, Decimal::ONE).await
    }

    async fn cancel(&self, _order_id: &str) -> Result<bool, OrderClientError> {
        // Dry-run orders fill synchronously; nothing is ever left pending.
        Ok(false)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, OrderClientError> {
        Ok(self
            .orders
            .lock()
            .expect("dry-run order map mutex poisoned")
            .get(order_id)
            .cloned())
    }

    fn can_trade(&self) -> bool {
        false
    }
}
