//! Application Services
//!
//! - `ReplyTranscript`: accumulates the visible text of a streamed reply

use crate::application::ports::ReplyHandler;

/// Hint appended to errors so the reader knows where to look.
pub const BACKEND_HINT: &str = "check that the chat backend is running";

/// Outcome of a reply as seen by the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranscriptStatus {
    /// Still receiving fragments.
    #[default]
    Streaming,
    /// Finished normally.
    Complete,
    /// Finished with an error.
    Failed,
}

/// Visible text of one assistant reply.
///
/// Fragments are appended verbatim in arrival order. An error is kept
/// separately so the partial reply stays visible next to it.
#[derive(Debug, Clone, Default)]
pub struct ReplyTranscript {
    text: String,
    fragments: usize,
    error: Option<String>,
    status: TranscriptStatus,
}

impl ReplyTranscript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text received so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of fragments received.
    #[must_use]
    pub const fn fragments(&self) -> usize {
        self.fragments
    }

    /// Error reported by the stream, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> TranscriptStatus {
        self.status
    }

    /// Text as it should be displayed, with any error rendered inline.
    #[must_use]
    pub fn render(&self) -> String {
        match &self.error {
            None => self.text.clone(),
            Some(error) if self.text.is_empty() => format!("Error: {error} ({BACKEND_HINT})"),
            Some(error) => format!("{}\n\nError: {error} ({BACKEND_HINT})", self.text),
        }
    }
}

impl ReplyHandler for ReplyTranscript {
    fn on_content(&mut self, text: &str) {
        self.text.push_str(text);
        self.fragments += 1;
    }

    fn on_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
        self.status = TranscriptStatus::Failed;
    }

    fn on_done(&mut self) {
        self.status = TranscriptStatus::Complete;
    }
}
