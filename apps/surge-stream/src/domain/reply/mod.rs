//! Reply Frame Types
//!
//! Domain types for the line-oriented event stream that carries an
//! assistant reply. The wire format is a sequence of lines:
//!
//! ```text
//! data: {"content": "AAPL is"}
//!
//! data: {"content": " trading higher"}
//!
//! data: [DONE]
//! ```
//!
//! [`FrameBuffer`] reassembles lines that arrive split across reads and
//! [`ReplyFrame::parse`] turns one complete line into a frame.

use serde::Deserialize;

// =============================================================================
// Constants
// =============================================================================

/// Marker that prefixes every candidate frame line.
pub const DATA_PREFIX: &str = "data: ";

/// Frame body signalling the end of a reply.
pub const DONE_SENTINEL: &str = "[DONE]";

// =============================================================================
// Reply Events
// =============================================================================

/// Event delivered to the consumer of a reply stream.
///
/// A request yields zero or more `Content` events followed by exactly one
/// terminal event (`Error` or `Done`), unless it is cancelled first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// A fragment of reply text, in wire order.
    Content(String),
    /// The request failed; carries a human-readable message.
    Error(String),
    /// The reply completed.
    Done,
}

impl ReplyEvent {
    /// Whether this event ends the request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Done)
    }
}

// =============================================================================
// Frames
// =============================================================================

/// JSON body of a non-sentinel frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FramePayload {
    /// Reply text fragment.
    #[serde(default)]
    pub content: Option<String>,
    /// Application error reported by the backend.
    #[serde(default)]
    pub error: Option<String>,
}

/// One parsed `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyFrame {
    /// The `[DONE]` sentinel.
    Done,
    /// A JSON payload frame.
    Payload(FramePayload),
}

/// A `data:` line whose body could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("malformed frame body: {source}")]
pub struct FrameError {
    #[source]
    source: serde_json::Error,
}

impl ReplyFrame {
    /// Parse one complete line.
    ///
    /// Returns `None` for lines that are not frames (blank separators,
    /// comments, other SSE fields).
    #[must_use]
    pub fn parse(line: &str) -> Option<Result<Self, FrameError>> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let body = line.strip_prefix(DATA_PREFIX)?;

        if body.trim() == DONE_SENTINEL {
            return Some(Ok(Self::Done));
        }

        Some(
            serde_json::from_str::<FramePayload>(body)
                .map(Self::Payload)
                .map_err(|source| FrameError { source }),
        )
    }

    /// Convert the frame into consumer events, preserving field order
    /// (`content` before `error`).
    #[must_use]
    pub fn into_events(self) -> Vec<ReplyEvent> {
        match self {
            Self::Done => vec![ReplyEvent::Done],
            Self::Payload(payload) => payload
                .content
                .map(ReplyEvent::Content)
                .into_iter()
                .chain(payload.error.map(ReplyEvent::Error))
                .collect(),
        }
    }
}

// =============================================================================
// Frame Buffer
// =============================================================================

/// Accumulates decoded text across reads and yields complete lines.
///
/// Text after the last newline is held back until a later read completes
/// it, so a frame is never parsed from a partial line.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: String,
}

impl FrameBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: String::new(),
        }
    }

    /// Append decoded text and drain every complete line.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);

        let Some(last_newline) = self.pending.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete.lines().map(str::to_owned).collect()
    }

    /// Take whatever is left once the stream has ended.
    ///
    /// Returns `None` if the buffer holds nothing but whitespace.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Number of buffered bytes not yet forming a complete line.
    #[must_use]
    pub const fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard buffered text.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
