//! redis-stream CLI - read a Redis stream as a consumer-group member and print each entry
//!
//! Runs until Ctrl-C. Entries are left pending unless `--ack` is given.

use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

use redis_stream::{
    AckPolicy, ConsumerLoop, ConsumerOptions, NackMode, OutputFormat, StopReason, StreamClient,
    StreamConfig, NEW_ENTRIES,
};

#[derive(Parser)]
#[command(name = "redis-stream")]
#[command(version, about = "Consume a Redis stream as a member of a consumer group", long_about = None)]
struct Cli {
    /// Redis stream key to read from
    #[arg(long, env = "REDIS_STREAM", default_value = "mystream")]
    stream: String,

    /// Consumer group name
    #[arg(long, env = "REDIS_GROUP", default_value = "group1")]
    group: String,

    /// Consumer name
    #[arg(long, env = "REDIS_CONSUMER", default_value = "consumer1")]
    consumer: String,

    /// Redis server host
    #[arg(long, env = "REDIS_HOST", default_value = "localhost")]
    server: String,

    /// Redis server port
    #[arg(long, env = "REDIS_PORT", default_value = "6379")]
    port: u16,

    /// Max entries per read
    #[arg(long, env = "REDIS_COUNT", default_value = "1")]
    count: usize,

    /// Milliseconds a read may block (0 = until an entry arrives)
    #[arg(long, env = "REDIS_BLOCK_MS", default_value = "0")]
    block_ms: u64,

    /// Create the consumer group (and stream) if it does not exist
    #[arg(long)]
    create_group: bool,

    /// Acknowledge each entry after printing it
    #[arg(long)]
    ack: bool,

    /// What a negative acknowledgement does
    #[arg(long, env = "REDIS_NACK_MODE", value_enum, default_value = "leave-pending")]
    nack_mode: NackMode,

    /// Output format for received messages
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl Cli {
    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            host: self.server.clone(),
            port: self.port,
            stream_key: self.stream.clone(),
            group_name: self.group.clone(),
            consumer_name: self.consumer.clone(),
            block_ms: Some(self.block_ms),
            nack_mode: self.nack_mode,
            ..StreamConfig::default()
        }
    }

    fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            last_id: NEW_ENTRIES.to_string(),
            count: self.count,
            ack: if self.ack { AckPolicy::AfterPrint } else { AckPolicy::Never },
            format: self.format,
        }
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables before RUST_LOG and the flag env fallbacks are read
    dotenv::dotenv().ok();

    // Logs go to stderr; stdout carries the printed messages
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.stream_config();

    let mut client = match StreamClient::connect(config).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{}", e);
            println!("Error: Redis client is not connected");
            process::exit(1);
        }
    };

    if cli.create_group {
        if let Err(e) = client.ensure_group("$").await {
            eprintln!("Error: failed to create consumer group '{}': {}", cli.group, e);
            client.close();
            process::exit(1);
        }
    }

    tracing::info!(
        "Consuming stream '{}' as {}/{}",
        cli.stream,
        cli.group,
        cli.consumer
    );

    let stdout = std::io::stdout();
    let mut consumer = ConsumerLoop::new(client, stdout.lock(), cli.consumer_options());

    match consumer.run(interrupted()).await {
        Ok(StopReason::Interrupted) => {}
        Ok(StopReason::NotConnected) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
