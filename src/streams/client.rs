/// Redis Streams client for consumer-group reads
///
/// Provides connection management, publishing, group reads and acknowledgement
/// against a single stream key

use redis::aio::MultiplexedConnection;
use redis::streams::StreamPendingReply;
use redis::{AsyncCommands, Value};
use std::future::Future;
use std::time::Duration;

use crate::consumer::MessageSource;
use crate::error::{StreamError, StreamResult};
use crate::streams::message::{decode_read_reply, EntryId, Message};

/// What `nack` does with an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum NackMode {
    /// Leave the entry in the group's pending list
    #[default]
    LeavePending,
    /// Issue XACK, same as `ack` (legacy client behaviour)
    AckAlias,
}

impl NackMode {
    /// Whether a nack in this mode removes the entry from the pending list
    pub fn acknowledges(self) -> bool {
        matches!(self, NackMode::AckAlias)
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub host: String,
    pub port: u16,
    pub stream_key: String,
    pub group_name: String,
    pub consumer_name: String,
    /// BLOCK argument for group reads; `Some(0)` waits forever, `None` never blocks
    pub block_ms: Option<u64>,
    pub nack_mode: NackMode,
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("REDIS_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("REDIS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(6379),
            stream_key: std::env::var("REDIS_STREAM")
                .unwrap_or_else(|_| "mystream".to_string()),
            group_name: std::env::var("REDIS_GROUP")
                .unwrap_or_else(|_| "group1".to_string()),
            consumer_name: std::env::var("REDIS_CONSUMER")
                .unwrap_or_else(|_| "consumer1".to_string()),
            block_ms: Some(0),
            nack_mode: std::env::var("REDIS_NACK_MODE")
                .ok()
                .and_then(|s| <NackMode as clap::ValueEnum>::from_str(&s, true).ok())
                .unwrap_or_default(),
            connect_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

impl StreamConfig {
    /// `redis://` URL for the configured host/port
    pub fn url(&self) -> String {
        if self.host.contains(':') {
            format!("redis://[{}]:{}/", self.host, self.port)
        } else {
            format!("redis://{}:{}/", self.host, self.port)
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Owns the single connection to the store for one stream/group/consumer
pub struct StreamClient {
    connection: Option<MultiplexedConnection>,
    config: StreamConfig,
}

impl StreamClient {
    /// Connect to Redis at the configured host/port
    pub async fn connect(config: StreamConfig) -> StreamResult<Self> {
        let client = redis::Client::open(config.url())
            .map_err(|e| StreamError::Connection(format!("{}: {}", config.address(), e)))?;

        let connection = tokio::time::timeout(
            config.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StreamError::Connection(format!("{}: connect timed out", config.address())))?
        .map_err(|e| StreamError::Connection(format!("{}: {}", config.address(), e)))?;

        tracing::info!("Connected to Redis at {}", config.address());

        Ok(Self {
            connection: Some(connection),
            config,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&mut self) -> StreamResult<&mut MultiplexedConnection> {
        self.connection
            .as_mut()
            .ok_or_else(|| StreamError::Connection("client is closed".to_string()))
    }

    /// PING the store; false on error, timeout or a closed client
    pub async fn is_connected(&mut self) -> bool {
        let timeout = self.config.probe_timeout;
        let Ok(conn) = self.connection() else {
            return false;
        };

        let probe = async {
            let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(conn).await;
            pong
        };

        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!("Redis liveness probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!("Redis liveness probe timed out after {:?}", timeout);
                false
            }
        }
    }

    /// Append one entry with the given field/value pairs
    pub async fn publish(&mut self, fields: &[(String, String)]) -> StreamResult<EntryId> {
        if fields.is_empty() {
            return Err(StreamError::Rejected(
                "an entry needs at least one field/value pair".to_string(),
            ));
        }

        let stream_key = self.config.stream_key.clone();
        let id: String = self.connection()?.xadd(&stream_key, "*", fields).await?;

        tracing::debug!("Published entry {} to stream {}", id, stream_key);
        Ok(EntryId::new(id))
    }

    /// Read entries for this consumer's group.
    ///
    /// With `last_id = ">"` only entries never delivered to any consumer of
    /// the group are returned; any other id re-reads this consumer's pending
    /// entries after that id. Blocks according to `block_ms`.
    pub async fn consume(&mut self, last_id: &str, count: usize) -> StreamResult<Vec<Message>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.group_name)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(count);
        if let Some(block_ms) = self.config.block_ms {
            cmd.arg("BLOCK").arg(block_ms);
        }
        cmd.arg("STREAMS").arg(&self.config.stream_key).arg(last_id);

        let reply: Value = cmd.query_async(self.connection()?).await?;
        let messages = decode_read_reply(&reply)?;

        tracing::debug!(
            "Read {} entries from {} as {}/{}",
            messages.len(),
            self.config.stream_key,
            self.config.group_name,
            self.config.consumer_name
        );
        Ok(messages)
    }

    /// Plain (non-group) read of entries after `last_id`
    pub async fn read(&mut self, last_id: &str, count: usize) -> StreamResult<Vec<Message>> {
        let mut cmd = redis::cmd("XREAD");
        cmd.arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.config.stream_key)
            .arg(last_id);

        let reply: Value = cmd.query_async(self.connection()?).await?;
        decode_read_reply(&reply)
    }

    /// Remove the entry from the group's pending-entries list
    pub async fn ack(&mut self, id: &EntryId) -> StreamResult<()> {
        let stream_key = self.config.stream_key.clone();
        let group_name = self.config.group_name.clone();
        let acked: i64 = self
            .connection()?
            .xack(&stream_key, &group_name, &[id.as_str()])
            .await?;

        if acked == 0 {
            tracing::debug!("Entry {} was not pending for group {}", id, group_name);
        }
        Ok(())
    }

    /// Negative-acknowledge an entry according to the configured `NackMode`
    pub async fn nack(&mut self, id: &EntryId) -> StreamResult<()> {
        if self.config.nack_mode.acknowledges() {
            return self.ack(id).await;
        }
        tracing::debug!("Leaving entry {} pending", id);
        Ok(())
    }

    /// Create the consumer group (and the stream if missing).
    ///
    /// An existing group is not an error.
    pub async fn ensure_group(&mut self, start_id: &str) -> StreamResult<()> {
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE")
            .arg(&self.config.stream_key)
            .arg(&self.config.group_name)
            .arg(start_id)
            .arg("MKSTREAM");

        let created: redis::RedisResult<()> = cmd.query_async(self.connection()?).await;
        match created {
            Ok(()) => {
                tracing::info!(
                    "Created consumer group '{}' on stream '{}'",
                    self.config.group_name,
                    self.config.stream_key
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                tracing::debug!("Consumer group '{}' already exists", self.config.group_name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of entries delivered to the group but not yet acknowledged
    pub async fn pending_count(&mut self) -> StreamResult<usize> {
        let stream_key = self.config.stream_key.clone();
        let group_name = self.config.group_name.clone();
        let reply: StreamPendingReply = self.connection()?.xpending(&stream_key, &group_name).await?;
        Ok(reply.count())
    }

    /// Trim the stream to at most `maxlen` entries; returns how many were removed
    pub async fn trim(&mut self, maxlen: usize) -> StreamResult<u64> {
        let mut cmd = redis::cmd("XTRIM");
        cmd.arg(&self.config.stream_key).arg("MAXLEN").arg(maxlen);
        let removed: u64 = cmd.query_async(self.connection()?).await?;
        Ok(removed)
    }

    /// Drop the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if self.connection.take().is_some() {
            tracing::info!("Closed Redis connection to {}", self.config.address());
        }
    }
}

impl MessageSource for StreamClient {
    fn is_connected(&mut self) -> impl Future<Output = bool> + Send {
        StreamClient::is_connected(self)
    }

    fn consume(
        &mut self,
        last_id: &str,
        count: usize,
    ) -> impl Future<Output = StreamResult<Vec<Message>>> + Send {
        StreamClient::consume(self, last_id, count)
    }

    fn ack(&mut self, id: &EntryId) -> impl Future<Output = StreamResult<()>> + Send {
        StreamClient::ack(self, id)
    }

    fn close(&mut self) {
        StreamClient::close(self)
    }
}
