//! Streaming order-book client: reconnect, heartbeat, normalization.

pub mod error;
pub mod feed;
pub mod message;
pub mod state;

pub use error::FeedError;
pub use feed::{reconnect_delay_for_attempt, MarketFeed, MarketFeedConfig};
pub use message::{parse_message, FeedMessage, MAX_MESSAGE_BYTES};
pub use state::{FeedState, SNAPSHOT_BUFFER_CAPACITY};
