//! Incremental UTF-8 Decoding
//!
//! Network reads can end in the middle of a multi-byte character. The
//! decoder keeps the incomplete suffix until the next read supplies the
//! rest, so the text handed to the frame buffer never contains a
//! spurious replacement character.

/// Stateful UTF-8 decoder for a chunked byte stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with no buffered bytes.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Decode the next chunk.
    ///
    /// Invalid sequences become `U+FFFD`. A truncated sequence at the end
    /// of the chunk is held back.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));

                    match e.error_len() {
                        // Truncated sequence; wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                    }
                }
            }
        }
    }

    /// Flush at end of stream.
    ///
    /// A sequence that never completed is emitted as `U+FFFD`.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }

    /// Number of bytes held back from the last chunk.
    #[must_use]
    pub const fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
