use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderClientError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("order timed out before filling")]
    Timeout,

    #[error("insufficient funds for order")]
    InsufficientFunds,

    #[error("unknown order id: {0}")]
    UnknownOrder(String),

    #[error("live trading is not available in this build: {0}")]
    LiveUnavailable(String),

    #[error("transport error: {0}")]
    Transport(String),
}
