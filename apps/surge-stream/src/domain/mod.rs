//! Domain Layer - Core streaming types and state machines.
//!
//! This layer contains the pure types for reply frames and live tick
//! subscriptions. Nothing here performs I/O.

/// Reply frame parsing and reassembly.
pub mod reply;

/// Live tick subscription state machine and identity guard.
pub mod ticks;
