//! Streaming protocol adapter
//!
//! Drives one provider request through the
//! `Idle -> Sending -> Streaming -> Completed | Failed` lifecycle, folding
//! text deltas into a cumulative reply and reporting it through a single
//! callback contract: `on_chunk(cumulative_text, is_done)`.
//!
//! Each reported text is a prefix extension of the previous one. After the
//! provider stream ends the callback fires exactly once more with the final
//! text and `is_done = true`. Failures are classified and returned as the
//! error of [`StreamAdapter::stream`]; the callback never sees them.

pub mod metrics;

use crate::error::Result;
use crate::providers::{classify_error, error_kind, ChatRequest, Provider, ProviderKind};
use futures::StreamExt;
use self::metrics::StreamMetrics;
use std::time::Duration;

/// Lifecycle of one streaming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not started
    Idle,
    /// Request sent, no delta yet
    Sending,
    /// At least one delta received
    Streaming,
    /// Stream ended normally
    Completed,
    /// Stream ended with an error
    Failed,
}

impl StreamState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// In-progress assistant reply for one conversation
#[derive(Debug, Clone)]
pub struct StreamSession {
    conversation_id: String,
    text: String,
    state: StreamState,
    chunks: usize,
}

impl StreamSession {
    /// Creates an idle session targeting `conversation_id`
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            text: String::new(),
            state: StreamState::Idle,
            chunks: 0,
        }
    }

    /// Conversation the reply belongs to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the stream completed normally
    pub fn is_done(&self) -> bool {
        self.state == StreamState::Completed
    }

    /// Number of non-empty deltas received
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    fn begin(&mut self) {
        self.text.clear();
        self.chunks = 0;
        self.state = StreamState::Sending;
    }

    fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
        self.chunks += 1;
        self.state = StreamState::Streaming;
    }

    /// Moves to `Completed`; false when already terminal
    fn complete(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = StreamState::Completed;
        true
    }

    /// Moves to `Failed`; false when already terminal
    fn fail(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = StreamState::Failed;
        true
    }
}

/// Dispatches requests to a [`Provider`] with uniform timeouts and
/// error classification
#[derive(Debug, Clone, Copy)]
pub struct StreamAdapter {
    timeout: Duration,
}

impl StreamAdapter {
    /// Creates an adapter bounding calls by `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Streams one request, reporting cumulative text through `on_chunk`
    ///
    /// The timeout covers sending the request until the response headers
    /// are accepted. Once the body has started the stream may run as long
    /// as the provider keeps it open.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error; `session` is left `Failed`
    pub async fn stream<F>(
        &self,
        provider: &dyn Provider,
        request: &ChatRequest,
        session: &mut StreamSession,
        mut on_chunk: F,
    ) -> Result<String>
    where
        F: FnMut(&str, bool) + Send,
    {
        let kind = provider.kind();
        let mut metrics = StreamMetrics::new(kind.as_str());
        session.begin();

        tracing::debug!(
            conversation_id = %session.conversation_id(),
            provider = %kind,
            model = %request.model,
            "Opening stream"
        );

        let mut deltas =
            match tokio::time::timeout(self.timeout, provider.stream_chat(request)).await {
                Ok(Ok(deltas)) => deltas,
                Ok(Err(e)) => return Err(self.fail(kind, session, &mut metrics, e)),
                Err(elapsed) => {
                    return Err(self.fail(kind, session, &mut metrics, elapsed.into()))
                }
            };

        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    if !delta.is_empty() {
                        session.append(&delta);
                        on_chunk(session.text(), false);
                    }
                }
                Err(e) => return Err(self.fail(kind, session, &mut metrics, e)),
            }
        }

        if session.complete() {
            on_chunk(session.text(), true);
        }
        metrics.record_completion(session.chunks());

        tracing::debug!(
            conversation_id = %session.conversation_id(),
            chunks = session.chunks(),
            chars = session.text().len(),
            elapsed_ms = metrics.elapsed().as_millis() as u64,
            "Stream completed"
        );

        Ok(session.text().to_string())
    }

    /// Runs a non-streaming request bounded by the timeout
    ///
    /// # Errors
    ///
    /// Returns the classified provider error
    pub async fn complete(&self, provider: &dyn Provider, request: &ChatRequest) -> Result<String> {
        let kind = provider.kind();
        match tokio::time::timeout(self.timeout, provider.complete(request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(classify_error(kind, self.timeout, e)),
            Err(elapsed) => Err(classify_error(kind, self.timeout, elapsed.into())),
        }
    }

    fn fail(
        &self,
        kind: ProviderKind,
        session: &mut StreamSession,
        metrics: &mut StreamMetrics,
        error: anyhow::Error,
    ) -> anyhow::Error {
        let error = classify_error(kind, self.timeout, error);
        let category = error_kind(&error);
        session.fail();
        metrics.record_error(category.as_str());
        tracing::error!(
            conversation_id = %session.conversation_id(),
            provider = %kind,
            kind = %category,
            "Stream failed: {:#}",
            error
        );
        error
    }
}
