//! Chat Reply Adapter
//!
//! Streams assistant replies from the chat backend over chunked HTTP.
//!
//! - `decoder`: UTF-8 decoding that survives split multi-byte characters
//! - `streamer`: request lifecycle, frame parsing and cancellation

pub mod decoder;
pub mod streamer;

pub use decoder::Utf8Decoder;
pub use streamer::{
    ChunkedReplyStreamer, ReplyError, ReplyPayload, ReplyStream, ReplyTarget, StreamRequest,
};
