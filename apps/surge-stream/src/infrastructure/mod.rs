//! Infrastructure Layer - Adapters and external integrations.
//!
//! Network adapters for the two streaming paths plus the ambient stack
//! they share.

/// Streamed chat reply client.
pub mod chat;

/// Live tick WebSocket client.
pub mod live;

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
