//! Application Layer - Ports and services.
//!
//! This layer defines the callback surface consumers implement against
//! and the small services built on top of it.

/// Port interfaces for reply consumers.
pub mod ports;

/// Application services (reply transcript).
pub mod services;
