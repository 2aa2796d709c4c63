use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoundManagerError {
    #[error("market discovery request failed: {0}")]
    Request(String),

    #[error("market discovery response could not be parsed: {0}")]
    Parse(String),

    #[error("no market available (discovery found nothing and no static fallback is configured)")]
    NoMarketAvailable,

    #[error("static condition_id {0:?} could not be resolved against the Gamma API")]
    StaticMarketUnresolved(String),
}
