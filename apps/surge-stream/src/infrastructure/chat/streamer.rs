//! Chunked Reply Streamer
//!
//! Issues one streamed `POST` per message and turns the `data:` line
//! stream of the response body into [`ReplyEvent`]s.
//!
//! # Delivery
//!
//! Each request runs as one producer task feeding a bounded channel. The
//! caller holds the only consumer, a [`ReplyStream`], which yields zero or
//! more `Content` events and then exactly one of `Error` or `Done`.
//! Cancelling the stream (or dropping it) aborts the transfer, and no
//! event is yielded afterwards. Cancellation never surfaces as `Error`.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::decoder::Utf8Decoder;
use crate::application::ports::ReplyHandler;
use crate::domain::reply::{FrameBuffer, ReplyEvent, ReplyFrame};
use crate::infrastructure::config::{AuthToken, ReplySettings};
use crate::infrastructure::metrics::{self, FrameKind, ReplyOutcome};

// =============================================================================
// Error Type
// =============================================================================

/// Errors raised while starting or running a reply request.
///
/// Once a request is running these are delivered as [`ReplyEvent::Error`]
/// rather than returned.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    /// Session replies need a bearer token.
    #[error("session replies require an auth token")]
    MissingToken,

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection or body transfer failed.
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("chat backend returned HTTP {status}")]
    Status {
        /// Response status.
        status: reqwest::StatusCode,
    },
}

// =============================================================================
// Request Types
// =============================================================================

/// Where a message is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTarget {
    /// One-off message outside any session.
    Anonymous,
    /// Message within a persisted chat session.
    Session(Uuid),
}

/// Request body.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyPayload {
    /// User message text.
    pub content: String,
}

/// One in-flight reply request.
///
/// Owned by the producer task; the caller keeps a clone of the
/// cancellation token through [`ReplyStream`].
#[derive(Debug)]
pub struct StreamRequest {
    /// Full endpoint URL.
    pub endpoint: String,
    /// JSON body.
    pub payload: ReplyPayload,
    /// Bearer token, if the request is authenticated.
    pub auth_token: Option<AuthToken>,
    /// Aborts the transfer when cancelled.
    pub cancel: CancellationToken,
}

// =============================================================================
// Streamer
// =============================================================================

/// Starts streamed reply requests against the chat backend.
#[derive(Debug, Clone)]
pub struct ChunkedReplyStreamer {
    client: reqwest::Client,
    settings: ReplySettings,
}

impl ChunkedReplyStreamer {
    /// Create a streamer.
    ///
    /// Only the connect phase is bounded by a timeout; a reply may take
    /// arbitrarily long between chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: ReplySettings) -> Result<Self, ReplyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(ReplyError::Client)?;

        Ok(Self { client, settings })
    }

    /// Settings this streamer was built with.
    #[must_use]
    pub const fn settings(&self) -> &ReplySettings {
        &self.settings
    }

    /// Send `content` to a chat endpoint chosen by `target`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::MissingToken`] for a session target when no
    /// token is configured.
    pub fn start(&self, target: ReplyTarget, content: &str) -> Result<ReplyStream, ReplyError> {
        let endpoint = match target {
            ReplyTarget::Anonymous => self.settings.anonymous_endpoint(),
            ReplyTarget::Session(session_id) => {
                if self.settings.auth_token.is_none() {
                    return Err(ReplyError::MissingToken);
                }
                self.settings.session_endpoint(session_id)
            }
        };

        Ok(self.start_reply(endpoint, content, self.settings.auth_token.clone()))
    }

    /// Send `content` to `endpoint` and stream the reply.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_reply(
        &self,
        endpoint: impl Into<String>,
        content: &str,
        auth_token: Option<AuthToken>,
    ) -> ReplyStream {
        let cancel = CancellationToken::new();
        let request = StreamRequest {
            endpoint: endpoint.into(),
            payload: ReplyPayload {
                content: content.to_string(),
            },
            auth_token,
            cancel: cancel.clone(),
        };

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        tokio::spawn(produce(self.client.clone(), request, tx));

        ReplyStream::from_parts(rx, cancel)
    }
}

// =============================================================================
// Producer
// =============================================================================

async fn produce(client: reqwest::Client, request: StreamRequest, tx: mpsc::Sender<ReplyEvent>) {
    let started = Instant::now();
    let cancel = request.cancel.clone();
    let endpoint = request.endpoint.clone();

    let outcome = tokio::select! {
        () = cancel.cancelled() => ReplyOutcome::Cancelled,
        outcome = run_request(&client, request, &tx) => outcome,
    };

    metrics::record_reply(outcome, started.elapsed());
    tracing::debug!(
        endpoint = %endpoint,
        outcome = ?outcome,
        elapsed_ms = started.elapsed().as_millis(),
        "Reply stream finished"
    );
}

async fn run_request(
    client: &reqwest::Client,
    request: StreamRequest,
    tx: &mpsc::Sender<ReplyEvent>,
) -> ReplyOutcome {
    match stream_frames(client, request, tx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(error = %e, "Reply request failed");
            if emit(tx, ReplyEvent::Error(e.to_string())).await {
                ReplyOutcome::Error
            } else {
                ReplyOutcome::Cancelled
            }
        }
    }
}

async fn stream_frames(
    client: &reqwest::Client,
    request: StreamRequest,
    tx: &mpsc::Sender<ReplyEvent>,
) -> Result<ReplyOutcome, ReplyError> {
    let mut builder = client.post(&request.endpoint).json(&request.payload);
    if let Some(token) = &request.auth_token {
        builder = builder.bearer_auth(token.as_str());
    }

    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ReplyError::Status { status });
    }

    let mut body = response.bytes_stream();
    let mut decoder = Utf8Decoder::new();
    let mut buffer = FrameBuffer::new();

    while let Some(chunk) = body.next().await {
        let text = decoder.decode(&chunk?);
        for line in buffer.push(&text) {
            if let Some(outcome) = handle_line(&line, tx).await {
                return Ok(outcome);
            }
        }
    }

    // Body ended without the sentinel: flush whatever is left
    let tail = decoder.finish();
    let mut lines = buffer.push(&tail);
    lines.extend(buffer.finish());
    for line in lines {
        if let Some(outcome) = handle_line(&line, tx).await {
            return Ok(outcome);
        }
    }

    if emit(tx, ReplyEvent::Done).await {
        Ok(ReplyOutcome::Done)
    } else {
        Ok(ReplyOutcome::Cancelled)
    }
}

/// Deliver the events of one line. Returns the outcome once the request
/// is over.
async fn handle_line(line: &str, tx: &mpsc::Sender<ReplyEvent>) -> Option<ReplyOutcome> {
    let frame = match ReplyFrame::parse(line)? {
        Ok(frame) => frame,
        Err(e) => {
            metrics::record_frame(FrameKind::Malformed);
            tracing::debug!(error = %e, "Ignoring malformed reply frame");
            return None;
        }
    };

    for event in frame.into_events() {
        let (kind, outcome) = match &event {
            ReplyEvent::Content(_) => (FrameKind::Content, None),
            ReplyEvent::Error(_) => (FrameKind::Error, Some(ReplyOutcome::Error)),
            ReplyEvent::Done => (FrameKind::Done, Some(ReplyOutcome::Done)),
        };
        metrics::record_frame(kind);

        if !emit(tx, event).await {
            return Some(ReplyOutcome::Cancelled);
        }
        if outcome.is_some() {
            return outcome;
        }
    }

    None
}

/// Send one event. Returns `false` once the consumer is gone.
async fn emit(tx: &mpsc::Sender<ReplyEvent>, event: ReplyEvent) -> bool {
    tx.send(event).await.is_ok()
}

// =============================================================================
// Reply Stream
// =============================================================================

/// Consumer side of one reply request.
///
/// Yields events in wire order and ends after the first terminal event.
/// Dropping the stream cancels the request.
#[derive(Debug)]
pub struct ReplyStream {
    events: mpsc::Receiver<ReplyEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl ReplyStream {
    fn from_parts(events: mpsc::Receiver<ReplyEvent>, cancel: CancellationToken) -> Self {
        Self {
            events,
            cancel,
            finished: false,
        }
    }

    /// Next event, or `None` once the reply is over or cancelled.
    pub async fn next_event(&mut self) -> Option<ReplyEvent> {
        self.next().await
    }

    /// Abort the transfer. Nothing is yielded afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this request, for use from another task.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive `handler` until the reply ends.
    ///
    /// Returns the terminal event delivered, or `None` if the request was
    /// cancelled first.
    pub async fn dispatch<H>(&mut self, handler: &mut H) -> Option<ReplyEvent>
    where
        H: ReplyHandler + ?Sized,
    {
        while let Some(event) = self.next_event().await {
            match &event {
                ReplyEvent::Content(text) => handler.on_content(text),
                ReplyEvent::Error(message) => handler.on_error(message),
                ReplyEvent::Done => handler.on_done(),
            }
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }
}

impl Stream for ReplyStream {
    type Item = ReplyEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished || this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }

        match this.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                // Cancelled while the event sat in the channel
                if this.cancel.is_cancelled() {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                if event.is_terminal() {
                    this.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ReplyStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockReplyHandler;
    use mockall::Sequence;
    use mockall::predicate::eq;

    fn stream_of(events: Vec<ReplyEvent>) -> ReplyStream {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.try_send(event).unwrap();
        }
        ReplyStream::from_parts(rx, CancellationToken::new())
    }

    #[tokio::test]
    async fn dispatch_routes_events_in_order() {
        let mut stream = stream_of(vec![
            ReplyEvent::Content("AAPL is".to_string()),
            ReplyEvent::Content(" up".to_string()),
            ReplyEvent::Done,
        ]);

        let mut handler = MockReplyHandler::new();
        let mut seq = Sequence::new();
        handler
            .expect_on_content()
            .with(eq("AAPL is"))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        handler
            .expect_on_content()
            .with(eq(" up"))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        handler
            .expect_on_done()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        handler.expect_on_error().never();

        let terminal = stream.dispatch(&mut handler).await;
        assert_eq!(terminal, Some(ReplyEvent::Done));
    }

    #[tokio::test]
    async fn nothing_after_terminal_event() {
        let mut stream = stream_of(vec![
            ReplyEvent::Error("model offline".to_string()),
            ReplyEvent::Content("late".to_string()),
            ReplyEvent::Done,
        ]);

        let mut handler = MockReplyHandler::new();
        handler
            .expect_on_error()
            .with(eq("model offline"))
            .times(1)
            .return_const(());
        handler.expect_on_content().never();
        handler.expect_on_done().never();

        stream.dispatch(&mut handler).await;
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn cancel_suppresses_buffered_events() {
        let mut stream = stream_of(vec![
            ReplyEvent::Content("one".to_string()),
            ReplyEvent::Content("two".to_string()),
            ReplyEvent::Done,
        ]);

        assert_eq!(
            stream.next_event().await,
            Some(ReplyEvent::Content("one".to_string()))
        );
        stream.cancel();

        let mut handler = MockReplyHandler::new();
        handler.expect_on_content().never();
        handler.expect_on_error().never();
        handler.expect_on_done().never();

        assert!(stream.dispatch(&mut handler).await.is_none());
        assert!(stream.is_cancelled());
    }

    #[tokio::test]
    async fn closed_channel_ends_stream() {
        let (tx, rx) = mpsc::channel::<ReplyEvent>(1);
        drop(tx);
        let mut stream = ReplyStream::from_parts(rx, CancellationToken::new());
        assert!(stream.next_event().await.is_none());
    }

    #[test]
    fn drop_cancels_request() {
        let (_tx, rx) = mpsc::channel::<ReplyEvent>(1);
        let token = CancellationToken::new();
        let stream = ReplyStream::from_parts(rx, token.clone());
        drop(stream);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn session_target_requires_token() {
        let streamer = ChunkedReplyStreamer::new(ReplySettings::default()).unwrap();
        let result = streamer.start(ReplyTarget::Session(Uuid::nil()), "hi");
        assert!(matches!(result, Err(ReplyError::MissingToken)));
    }
}
