//! Consumer loop: verify connectivity, poll the group, print every entry.
//!
//! The loop is generic over [`MessageSource`] so it can run against a live
//! [`StreamClient`](crate::streams::StreamClient) or an in-memory double.
//! Shutdown is an arbitrary future raced against each blocking read; when it
//! resolves the pending read is dropped and the source is closed.

use std::future::Future;
use std::io::Write;

use crate::error::StreamResult;
use crate::streams::{EntryId, Message, NEW_ENTRIES};

/// The operations the consumer loop needs from a stream store
pub trait MessageSource {
    /// Liveness probe; never fails, only reports
    fn is_connected(&mut self) -> impl Future<Output = bool> + Send;

    /// Read up to `count` entries after `last_id` for this consumer's group
    fn consume(
        &mut self,
        last_id: &str,
        count: usize,
    ) -> impl Future<Output = StreamResult<Vec<Message>>> + Send;

    fn ack(&mut self, id: &EntryId) -> impl Future<Output = StreamResult<()>> + Send;

    /// Release the connection. Must be idempotent.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Starting,
    Connected,
    Polling,
    Printing,
    Stopped,
}

/// Whether printed entries are acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Leave every entry pending (original consumer behaviour)
    #[default]
    Never,
    /// XACK each entry once it has been printed
    AfterPrint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// `Received message: <id> {field: value, ...}`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub last_id: String,
    pub count: usize,
    pub ack: AckPolicy,
    pub format: OutputFormat,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            last_id: NEW_ENTRIES.to_string(),
            count: 1,
            ack: AckPolicy::Never,
            format: OutputFormat::Text,
        }
    }
}

/// Why the loop stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The liveness probe failed at startup; the loop never polled
    NotConnected,
    /// The shutdown signal fired
    Interrupted,
}

pub struct ConsumerLoop<S, W> {
    source: S,
    out: W,
    options: ConsumerOptions,
    state: ConsumerState,
    printed: u64,
}

impl<S: MessageSource, W: Write> ConsumerLoop<S, W> {
    pub fn new(source: S, out: W, options: ConsumerOptions) -> Self {
        Self {
            source,
            out,
            options,
            state: ConsumerState::Starting,
            printed: 0,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Number of messages printed so far
    pub fn printed(&self) -> u64 {
        self.printed
    }

    pub fn into_parts(self) -> (S, W) {
        (self.source, self.out)
    }

    fn transition(&mut self, next: ConsumerState) {
        if self.state != next {
            tracing::trace!("Consumer state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn stop(&mut self) {
        self.source.close();
        self.transition(ConsumerState::Stopped);
    }

    /// Run until `shutdown` resolves or the source fails.
    ///
    /// A failed startup probe is reported on the output and returned as
    /// [`StopReason::NotConnected`]. Any read, ack or output error is fatal:
    /// the source is closed and the error returned.
    pub async fn run<F>(&mut self, shutdown: F) -> StreamResult<StopReason>
    where
        F: Future<Output = ()>,
    {
        self.transition(ConsumerState::Starting);

        if !self.source.is_connected().await {
            writeln!(self.out, "Error: Redis client is not connected")?;
            self.stop();
            return Ok(StopReason::NotConnected);
        }

        self.transition(ConsumerState::Connected);
        writeln!(self.out, "Connected to Redis Server")?;
        self.out.flush()?;

        tokio::pin!(shutdown);

        loop {
            self.transition(ConsumerState::Polling);

            let polled = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                batch = self.source.consume(&self.options.last_id, self.options.count) => Some(batch),
            };

            let messages = match polled {
                None => {
                    writeln!(self.out, "\nKeyboard Interrupt: Exiting...")?;
                    self.out.flush()?;
                    self.stop();
                    tracing::info!("Consumer stopped after printing {} messages", self.printed);
                    return Ok(StopReason::Interrupted);
                }
                Some(Ok(messages)) => messages,
                Some(Err(e)) => {
                    tracing::error!("Failed to read from stream: {}", e);
                    self.stop();
                    return Err(e);
                }
            };

            if messages.is_empty() {
                continue;
            }

            self.transition(ConsumerState::Printing);
            if let Err(e) = self.print_batch(&messages).await {
                self.stop();
                return Err(e);
            }
        }
    }

    async fn print_batch(&mut self, messages: &[Message]) -> StreamResult<()> {
        for message in messages {
            match self.options.format {
                OutputFormat::Text => writeln!(self.out, "Received message: {}", message)?,
                OutputFormat::Json => writeln!(self.out, "{}", message.to_json()?)?,
            }
            self.printed += 1;

            if self.options.ack == AckPolicy::AfterPrint {
                self.source.ack(&message.id).await?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}
