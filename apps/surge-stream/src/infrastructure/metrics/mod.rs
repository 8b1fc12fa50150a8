//! Prometheus Metrics Module
//!
//! Exposes streaming metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Replies**: request outcomes, frames by kind, stream duration
//! - **Ticks**: inbound messages by outcome, connection gauge, reconnects
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// =============================================================================
// Global Recorder
// =============================================================================

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// Must be called from within a Tokio runtime. Calling it again after a
/// successful install is a no-op.
///
/// # Errors
///
/// Returns an error if the recorder or HTTP listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    if metrics_enabled() {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    register_metrics();
    let _ = INSTALLED.set(());
    tracing::info!(port, "Metrics listener started");
    Ok(())
}

/// Whether the Prometheus recorder has been installed.
#[must_use]
pub fn metrics_enabled() -> bool {
    INSTALLED.get().is_some()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "surge_stream_reply_requests_total",
        "Reply requests by terminal outcome"
    );
    describe_counter!(
        "surge_stream_reply_frames_total",
        "Reply frames received by kind"
    );
    describe_histogram!(
        "surge_stream_reply_duration_seconds",
        "Time from request start to terminal event"
    );

    describe_counter!(
        "surge_stream_tick_messages_total",
        "Inbound tick messages by outcome"
    );
    describe_gauge!(
        "surge_stream_tick_connections",
        "Open live tick connections"
    );
    describe_counter!(
        "surge_stream_tick_reconnects_total",
        "Scheduled tick reconnect attempts"
    );
    describe_counter!(
        "surge_stream_tick_failures_total",
        "Subscriptions that exhausted their retry budget"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Terminal outcome of a reply request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Completed with `Done`.
    Done,
    /// Completed with `Error`.
    Error,
    /// Cancelled by the consumer.
    Cancelled,
}

impl ReplyOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Kind of reply frame.
#[derive(Debug, Clone, Copy)]
pub enum FrameKind {
    /// Content fragment.
    Content,
    /// Application error.
    Error,
    /// Completion sentinel.
    Done,
    /// Unparseable body.
    Malformed,
}

impl FrameKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Error => "error",
            Self::Done => "done",
            Self::Malformed => "malformed",
        }
    }
}

/// What happened to an inbound tick message.
#[derive(Debug, Clone, Copy)]
pub enum TickOutcome {
    /// Sample accepted.
    Applied,
    /// Rejected by the identity guard.
    Stale,
    /// Could not be decoded.
    Malformed,
    /// Application error message.
    AppError,
    /// Control message (status acknowledgement).
    Control,
}

impl TickOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Stale => "stale",
            Self::Malformed => "malformed",
            Self::AppError => "app_error",
            Self::Control => "control",
        }
    }
}

/// Record the end of a reply request.
pub fn record_reply(outcome: ReplyOutcome, duration: Duration) {
    counter!(
        "surge_stream_reply_requests_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("surge_stream_reply_duration_seconds").record(duration.as_secs_f64());
}

/// Record a received reply frame.
pub fn record_frame(kind: FrameKind) {
    counter!(
        "surge_stream_reply_frames_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record an inbound tick message.
pub fn record_tick(outcome: TickOutcome) {
    counter!(
        "surge_stream_tick_messages_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Track an opened (`1.0`) or closed (`-1.0`) tick connection.
pub fn adjust_tick_connections(delta: f64) {
    gauge!("surge_stream_tick_connections").increment(delta);
}

/// Record a scheduled reconnect.
pub fn record_reconnect() {
    counter!("surge_stream_tick_reconnects_total").increment(1);
}

/// Record an exhausted retry budget.
pub fn record_failure() {
    counter!("surge_stream_tick_failures_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
