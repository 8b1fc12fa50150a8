//! Surge Stream Binary
//!
//! Command-line front end for the streaming core.
//!
//! # Usage
//!
//! ```bash
//! surge-stream chat "Compare AAPL and MSFT"
//! surge-stream chat "What about NVDA?" --session 6f1c...
//! surge-stream watch AAPL
//! ```
//!
//! # Environment Variables
//!
//! - `SURGE_API_URL`: Chat backend base URL (default: <http://localhost:8000>)
//! - `SURGE_AUTH_TOKEN`: Bearer token for session chats
//! - `SURGE_LIVE_URL`: Quote socket base URL (default: <ws://localhost:8000/ws/live>)
//! - `SURGE_RECONNECT_DELAY_MS`: Delay between reconnects (default: 3000)
//! - `SURGE_MAX_RECONNECT_ATTEMPTS`: Failures before giving up (default: 5)
//! - `SURGE_CONNECT_TIMEOUT_SECS`: Chat connect timeout (default: 10)
//! - `SURGE_REPLY_CHANNEL_CAPACITY`: Reply event buffer (default: 64)
//! - `SURGE_METRICS_PORT`: Prometheus metrics port (default: 0 = disabled)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter

use std::io::Write;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use surge_stream::infrastructure::telemetry;
use surge_stream::{
    ChunkedReplyStreamer, IngestConfig, LiveTickStream, ReplyHandler, ReplyTarget,
    ReplyTranscript, TickSnapshot, init_metrics, metrics_enabled,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use uuid::Uuid;

/// Stream chat replies and live prices from the Stock Surge backend
#[derive(Parser)]
#[command(name = "surge-stream")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message and stream the assistant reply
    Chat {
        /// Message text
        message: String,

        /// Post into an existing chat session (requires `SURGE_AUTH_TOKEN`)
        #[arg(long, value_name = "UUID")]
        session: Option<Uuid>,
    },

    /// Print live prices for a symbol until Ctrl+C
    Watch {
        /// Ticker symbol
        symbol: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();
    let cli = Cli::parse();

    // Initialize telemetry (tracing, optional OTLP export)
    let _telemetry_guard = telemetry::init();

    let config = IngestConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if config.metrics_port != 0 {
        init_metrics(config.metrics_port).context("failed to start metrics listener")?;
    }
    tracing::debug!(metrics_enabled = metrics_enabled(), "Metrics configured");

    match cli.command {
        Command::Chat { message, session } => run_chat(config, &message, session).await,
        Command::Watch { symbol } => run_watch(config, &symbol).await,
    }
}

// =============================================================================
// Chat
// =============================================================================

/// Prints fragments as they arrive and keeps the transcript.
#[derive(Default)]
struct StdoutReply {
    transcript: ReplyTranscript,
}

impl ReplyHandler for StdoutReply {
    fn on_content(&mut self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
        self.transcript.on_content(text);
    }

    fn on_error(&mut self, message: &str) {
        self.transcript.on_error(message);
    }

    fn on_done(&mut self) {
        self.transcript.on_done();
    }
}

async fn run_chat(config: IngestConfig, message: &str, session: Option<Uuid>) -> Result<()> {
    let streamer = ChunkedReplyStreamer::new(config.reply)?;
    let target = session.map_or(ReplyTarget::Anonymous, ReplyTarget::Session);

    let mut stream = streamer.start(target, message)?;
    let cancel = stream.cancellation_token();
    let mut reply = StdoutReply::default();

    tokio::select! {
        _ = stream.dispatch(&mut reply) => {}
        _ = signal::ctrl_c() => {
            cancel.cancel();
            tracing::info!("Reply cancelled");
        }
    }
    println!();

    if reply.transcript.error().is_some() {
        eprintln!("{}", reply.transcript.render());
    }
    tracing::debug!(
        fragments = reply.transcript.fragments(),
        status = ?reply.transcript.status(),
        "Reply finished"
    );
    Ok(())
}

// =============================================================================
// Watch
// =============================================================================

async fn run_watch(config: IngestConfig, symbol: &str) -> Result<()> {
    let mut stream = LiveTickStream::new(config.live);
    let mut snapshots = stream.subscribe(symbol).await;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, stopping");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", format_snapshot(&snapshot));
                if snapshot.needs_refresh() {
                    println!("Press r + Enter to retry");
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line? {
                    Some(input) if input.trim().eq_ignore_ascii_case("r") => {
                        if stream.reset().await {
                            snapshots = stream.watch();
                        }
                    }
                    Some(_) => {}
                    None => stdin_open = false,
                }
            }
        }
    }

    stream.unsubscribe().await;
    Ok(())
}

fn format_snapshot(snapshot: &TickSnapshot) -> String {
    let symbol = snapshot.identifier.as_deref().unwrap_or("-");
    let status = snapshot.connection_state;

    let mut line = match &snapshot.sample {
        Some(sample) => {
            let sign = if sample.is_up() { "+" } else { "" };
            let mut line = format!(
                "{symbol:<6} {:>10.2} {sign}{:.2} ({sign}{:.2}%)",
                sample.price, sample.change, sample.change_percent
            );
            if let Some(volume) = sample.volume {
                line.push_str(&format!("  vol {volume}"));
            }
            line
        }
        None => format!("{symbol:<6} {:>10}", "--"),
    };

    line.push_str(&format!("  [{status}]"));
    if snapshot.retry_count > 0 {
        line.push_str(&format!(" retry {}", snapshot.retry_count));
    }
    if let Some(error) = &snapshot.error {
        line.push_str(&format!("  {error}"));
    }
    line
}

// =============================================================================
// Setup
// =============================================================================

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    tracing::info!(
        api_url = %config.reply.api_url,
        live_url = %config.live.live_url,
        authenticated = config.reply.auth_token.is_some(),
        reconnect_delay_ms = config.live.reconnect_delay.as_millis(),
        max_reconnect_attempts = config.live.max_reconnect_attempts,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
