use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Feed(#[from] market_feed::FeedError),

    #[error(transparent)]
    RoundManager(#[from] round_manager::RoundManagerError),

    #[error(transparent)]
    StateMachine(#[from] state_machine::StateMachineError),

    #[error(transparent)]
    OrderClient(#[from] order_client::OrderClientError),

    #[error("no active market and no static fallback configured")]
    NoMarket,
}
