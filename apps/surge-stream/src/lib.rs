#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Surge Stream - Real-time Streaming Ingestion Core
//!
//! Client-side streaming for the Stock Surge UI: assistant replies
//! streamed over chunked HTTP and live price ticks over WebSocket.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Frame and tick types with no I/O
//!   - `reply`: `data:` line framing and reply events
//!   - `ticks`: tick samples and the subscription state machine
//!
//! - **Application**: Port definitions and small services
//!   - `ports`: `ReplyHandler` callback surface
//!   - `services`: `ReplyTranscript`
//!
//! - **Infrastructure**: Adapters and the ambient stack
//!   - `chat`: streamed reply client
//!   - `live`: live tick WebSocket client
//!   - `config`: configuration from the environment
//!   - `metrics`, `telemetry`: observability
//!
//! # Data Flow
//!
//! ```text
//! send message ──► POST /chat/... ──► bytes ──► UTF-8 ──► lines ──► ReplyEvent ──► handler
//!
//! pick symbol ──► WS /ws/live/<symbol> ──► JSON ──► generation check ──► TickSnapshot ──► watch
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Frame and tick types with no external I/O.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::reply::{FrameBuffer, ReplyEvent, ReplyFrame};
pub use domain::ticks::{ConnectionState, Generation, TickSample, TickSnapshot, TickSubscription};

// Application
pub use application::ports::{ReplyCallbacks, ReplyHandler};
pub use application::services::{ReplyTranscript, TranscriptStatus};

// Adapters
pub use infrastructure::chat::{ChunkedReplyStreamer, ReplyError, ReplyStream, ReplyTarget};
pub use infrastructure::live::{LiveStreamError, LiveTickStream};

// Infrastructure config
pub use infrastructure::config::{
    AuthToken, ConfigError, IngestConfig, LiveSettings, ReplySettings,
};

// Metrics
pub use infrastructure::metrics::{init_metrics, metrics_enabled};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
