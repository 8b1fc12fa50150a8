//! Live Tick Subscription Types
//!
//! Domain types for a single watched instrument: the last-known-good
//! [`TickSample`], the [`ConnectionState`] machine and the
//! [`TickSubscription`] that ties them to a [`Generation`].
//!
//! # Identity Guard
//!
//! Every (re)subscription and every teardown advances the generation.
//! A connection captures the generation it was opened under and every
//! write it attempts is checked against the current one, so late
//! messages from a superseded connection are rejected instead of
//! overwriting the new identifier's state.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of a tick subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No subscription, or torn down intentionally.
    #[default]
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Connection established and receiving.
    Open,
    /// Lost the connection; a reconnect is scheduled.
    Disconnected,
    /// Retry budget exhausted; waits for a new identifier or a reset.
    Failed,
}

impl ConnectionState {
    /// Status label shown to the consumer.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tick Sample
// =============================================================================

/// Last-known-good price information for the watched instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickSample {
    /// Last traded price.
    pub price: Decimal,
    /// Absolute change against the previous close.
    pub change: Decimal,
    /// Percentage change against the previous close.
    pub change_percent: Decimal,
    /// Last traded volume, when reported.
    pub volume: Option<u64>,
    /// Timestamp as sent by the backend.
    pub timestamp: String,
    /// Quote currency, when reported.
    pub currency: Option<String>,
    /// Listing exchange, when reported.
    pub exchange: Option<String>,
    /// Market capitalisation, when reported.
    pub market_cap: Option<Decimal>,
}

impl TickSample {
    /// Parse the backend timestamp.
    ///
    /// Accepts RFC 3339 and offset-less ISO-8601, which is read as UTC.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Whether the price moved up (or stayed flat) since the previous close.
    #[must_use]
    pub fn is_up(&self) -> bool {
        !self.change.is_sign_negative()
    }
}

// =============================================================================
// Generation
// =============================================================================

/// Monotonic subscription generation used by the identity guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Generation(u64);

impl Generation {
    /// Raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalise a user-supplied instrument identifier.
///
/// Returns `None` for blank input.
#[must_use]
pub fn normalize_symbol(identifier: &str) -> Option<String> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Reactive view of a subscription, published on every accepted change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSnapshot {
    /// Subscribed symbol, if any.
    pub identifier: Option<String>,
    /// Generation this snapshot belongs to.
    pub generation: Generation,
    /// Connection lifecycle state.
    pub connection_state: ConnectionState,
    /// Consecutive failed connection attempts.
    pub retry_count: u32,
    /// Last accepted sample.
    pub sample: Option<TickSample>,
    /// Last application or exhaustion error.
    pub error: Option<String>,
    /// When the last sample was accepted.
    pub updated_at: Option<DateTime<Utc>>,
}

impl TickSnapshot {
    /// Whether ticks are currently flowing.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.connection_state == ConnectionState::Open
    }

    /// Last price, if any sample has arrived.
    #[must_use]
    pub fn price(&self) -> Option<Decimal> {
        self.sample.as_ref().map(|s| s.price)
    }

    /// Last absolute change.
    #[must_use]
    pub fn change(&self) -> Option<Decimal> {
        self.sample.as_ref().map(|s| s.change)
    }

    /// Last percentage change.
    #[must_use]
    pub fn change_percent(&self) -> Option<Decimal> {
        self.sample.as_ref().map(|s| s.change_percent)
    }

    /// Last volume.
    #[must_use]
    pub fn volume(&self) -> Option<u64> {
        self.sample.as_ref().and_then(|s| s.volume)
    }

    /// Whether the consumer must refresh manually to resume.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.connection_state == ConnectionState::Failed
    }
}

// =============================================================================
// Tick Subscription
// =============================================================================

/// Per-consumer subscription state machine.
///
/// Transition methods taking a [`Generation`] return `false` and leave the
/// state untouched when the generation is stale or the transition is not
/// valid from the current state.
#[derive(Debug, Default)]
pub struct TickSubscription {
    identifier: Option<String>,
    generation: Generation,
    state: ConnectionState,
    retry_count: u32,
    sample: Option<TickSample>,
    error: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl TickSubscription {
    /// Create an idle subscription.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new subscription, superseding any previous one.
    ///
    /// Returns the new generation, or `None` if the identifier is blank
    /// (the subscription is left idle). Resubscribing to the same
    /// identifier keeps the last sample.
    pub fn begin(&mut self, identifier: &str) -> Option<Generation> {
        let symbol = normalize_symbol(identifier);
        if symbol.is_none() || symbol != self.identifier {
            self.sample = None;
            self.updated_at = None;
        }

        self.generation = self.generation.next();
        self.retry_count = 0;
        self.error = None;

        match symbol {
            Some(symbol) => {
                self.identifier = Some(symbol);
                self.state = ConnectionState::Connecting;
                Some(self.generation)
            }
            None => {
                self.identifier = None;
                self.state = ConnectionState::Idle;
                None
            }
        }
    }

    /// Intentionally close the subscription.
    ///
    /// Always advances the generation so that in-flight writes from the
    /// closed connection are rejected. Returns `false` if there was nothing
    /// to close.
    pub fn retire(&mut self) -> bool {
        self.generation = self.generation.next();
        let was_active = self.identifier.is_some() || self.state != ConnectionState::Idle;

        self.identifier = None;
        self.state = ConnectionState::Idle;
        self.retry_count = 0;
        self.sample = None;
        self.error = None;
        self.updated_at = None;

        was_active
    }

    /// Whether `generation` still owns this subscription.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation && self.identifier.is_some()
    }

    /// `Disconnected → Connecting` when a scheduled retry fires.
    pub fn mark_connecting(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation)
            || !matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Disconnected
            )
        {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// `Connecting → Open` after a successful handshake.
    pub fn mark_open(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Open;
        self.retry_count = 0;
        self.error = None;
        true
    }

    /// `Connecting/Open → Disconnected` or `→ Failed` once the budget is spent.
    pub fn mark_disconnected(
        &mut self,
        generation: Generation,
        retry_count: u32,
        exhausted: bool,
    ) -> bool {
        if !self.is_current(generation)
            || !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open)
        {
            return false;
        }
        self.retry_count = retry_count;
        if exhausted {
            self.state = ConnectionState::Failed;
            self.error = Some(format!(
                "live prices unavailable after {retry_count} attempts; refresh to retry"
            ));
        } else {
            self.state = ConnectionState::Disconnected;
        }
        true
    }

    /// `Connecting/Open → Failed` for an error no retry can fix.
    pub fn mark_failed(&mut self, generation: Generation, reason: String) -> bool {
        if !self.is_current(generation)
            || !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open)
        {
            return false;
        }
        self.state = ConnectionState::Failed;
        self.error = Some(reason);
        true
    }

    /// Overwrite the last-known-good sample.
    pub fn record_sample(&mut self, generation: Generation, sample: TickSample) -> bool {
        if !self.is_current(generation) || self.state != ConnectionState::Open {
            return false;
        }
        self.sample = Some(sample);
        self.error = None;
        self.updated_at = Some(Utc::now());
        true
    }

    /// Record a transient application error without touching the sample.
    pub fn record_error(&mut self, generation: Generation, message: String) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.error = Some(message);
        true
    }

    /// Current identifier.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Current generation.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Build the reactive view.
    #[must_use]
    pub fn snapshot(&self) -> TickSnapshot {
        TickSnapshot {
            identifier: self.identifier.clone(),
            generation: self.generation,
            connection_state: self.state,
            retry_count: self.retry_count,
            sample: self.sample.clone(),
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
