//! The `OrderClient` contract (spec.md §4.7) plus the in-memory dry-run
//! simulator and a venue-facing live implementation shape.

pub mod dry_run;
pub mod error;
pub mod nonce;

#[cfg(feature = "live")]
pub mod live;

use async_trait::async_trait;
use common::{Order, OrderResult, Side};
use rust_decimal::Decimal;

pub use dry_run::DryRunOrderClient;
pub use error::OrderClientError;
pub use nonce::NonceGuard;

#[cfg(feature = "live")]
pub use live::LiveOrderClient;

/// Black-box order submission contract the trading engine depends on
/// (spec.md §4.7). Implementations: [`DryRunOrderClient`] (selected when
/// credentials are absent) and, gated behind the `live` feature, a
/// venue-facing client.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait OrderClient: Send + Sync {
    /// Limit-style intent: matches at or below `limit_price`.
    async fn buy_shares(
        &self,
        side: Side,
        token_id: &str,
        shares: Decimal,
        limit_price: Decimal,
    ) -> Result<OrderResult, OrderClientError>;

    /// Notional-style intent: spend up to `usd_amount` at the prevailing ask.
    async fn buy_by_usd(
        &self,
        side: Side,
        token_id: &str,
        usd_amount: Decimal,
    ) -> Result<OrderResult, OrderClientError>;

    async fn cancel(&self, order_id: &str) -> Result<bool, OrderClientError>;

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, OrderClientError>;

    /// False in dry-run/read-only/no-credentials mode.
    fn can_trade(&self) -> bool;
}
