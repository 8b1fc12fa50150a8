//! Port Interfaces
//!
//! Contracts between the streaming core and the code that renders its
//! output.
//!
//! ## Driver Ports (Outbound to consumers)
//!
//! - `ReplyHandler`: callback surface for a streamed reply
//!   (`on_content`, `on_error`, `on_done`)

/// Receives the events of one streamed reply.
///
/// For a single request, `on_content` fires zero or more times in wire
/// order, then exactly one of `on_error` or `on_done`. Nothing fires after
/// the request is cancelled.
#[cfg_attr(test, mockall::automock)]
pub trait ReplyHandler: Send {
    /// A reply text fragment arrived.
    fn on_content(&mut self, text: &str);

    /// The request failed. Terminal.
    fn on_error(&mut self, message: &str);

    /// The reply completed. Terminal.
    fn on_done(&mut self);
}

/// [`ReplyHandler`] built from three closures.
///
/// # Example
///
/// ```rust
/// use surge_stream::application::ports::{ReplyCallbacks, ReplyHandler};
///
/// let mut text = String::new();
/// let mut handler = ReplyCallbacks::new(
///     |chunk: &str| text.push_str(chunk),
///     |_message: &str| {},
///     || {},
/// );
/// handler.on_content("AAPL is");
/// drop(handler);
/// assert_eq!(text, "AAPL is");
/// ```
pub struct ReplyCallbacks<C, E, D> {
    on_content: C,
    on_error: E,
    on_done: D,
}

impl<C, E, D> ReplyCallbacks<C, E, D>
where
    C: FnMut(&str) + Send,
    E: FnMut(&str) + Send,
    D: FnMut() + Send,
{
    /// Bundle the three callbacks.
    pub const fn new(on_content: C, on_error: E, on_done: D) -> Self {
        Self {
            on_content,
            on_error,
            on_done,
        }
    }
}

impl<C, E, D> ReplyHandler for ReplyCallbacks<C, E, D>
where
    C: FnMut(&str) + Send,
    E: FnMut(&str) + Send,
    D: FnMut() + Send,
{
    fn on_content(&mut self, text: &str) {
        (self.on_content)(text);
    }

    fn on_error(&mut self, message: &str) {
        (self.on_error)(message);
    }

    fn on_done(&mut self) {
        (self.on_done)();
    }
}
