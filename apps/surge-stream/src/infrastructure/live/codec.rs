//! Live Tick Codec
//!
//! Decodes quote socket text frames into [`LiveMessage`]s. The socket
//! sends untagged JSON objects, so the variant is picked from the keys
//! present: `error` first, then `status`, otherwise a price sample.

use super::messages::{ErrorMessage, LiveMessage, StatusMessage, TickMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the quote socket.
#[derive(Debug, Default, Clone)]
pub struct TickCodec;

impl TickCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object or does not
    /// match any known message shape.
    pub fn decode(&self, text: &str) -> Result<LiveMessage, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        let Some(object) = value.as_object() else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}",
                preview(text)
            )));
        };

        if object.contains_key("error") {
            let m: ErrorMessage = serde_json::from_value(value)?;
            Ok(LiveMessage::Error(m))
        } else if object.contains_key("status") {
            let m: StatusMessage = serde_json::from_value(value)?;
            Ok(LiveMessage::Status(m))
        } else {
            let m: TickMessage = serde_json::from_value(value)?;
            Ok(LiveMessage::Tick(m))
        }
    }
}

fn preview(text: &str) -> &str {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .nth(50)
        .map_or(trimmed.len(), |(idx, _)| idx);
    &trimmed[..end]
}
