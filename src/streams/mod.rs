/// Redis Streams integration module
///
/// Provides the stream client and the decoded message type it returns

pub mod message;
pub mod client;

pub use message::{decode_read_reply, EntryId, Message, NEW_ENTRIES};
pub use client::{NackMode, StreamClient, StreamConfig};
