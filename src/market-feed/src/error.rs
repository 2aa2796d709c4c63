use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("inbound message exceeded the {0}-byte size guard")]
    MessageTooLarge(usize),

    #[error("no inbound traffic within the heartbeat timeout")]
    HeartbeatTimeout,

    #[error("feed channel closed")]
    ChannelClosed,

    #[error("reconnect attempts exhausted ({0} tries)")]
    ReconnectExhausted(u32),
}
