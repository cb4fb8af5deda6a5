//! # redis-stream: Redis Streams consumer-group client
//!
//! A thin client over the Redis stream commands plus a consumer loop that
//! reads a stream as a member of a consumer group and prints every entry.
//!
//! ## Features
//!
//! - **StreamClient**: publish (`XADD`), group reads (`XREADGROUP`), `XACK`,
//!   configurable nack, group creation and plain reads
//! - **ConsumerLoop**: connectivity check, blocking poll loop, printing and
//!   clean shutdown when a signal future resolves
//!
//! ## Example
//!
//! ```ignore
//! use redis_stream::{ConsumerLoop, ConsumerOptions, StreamClient, StreamConfig};
//!
//! let client = StreamClient::connect(StreamConfig::default()).await?;
//! let mut consumer = ConsumerLoop::new(client, std::io::stdout(), ConsumerOptions::default());
//! consumer.run(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```

pub mod error;

// Redis Streams integration
pub mod streams;

// Polling/printing loop
pub mod consumer;

pub use error::{StreamError, StreamResult};
pub use streams::{EntryId, Message, NackMode, StreamClient, StreamConfig, NEW_ENTRIES};
pub use consumer::{
    AckPolicy, ConsumerLoop, ConsumerOptions, ConsumerState, MessageSource, OutputFormat, StopReason,
};
