//! Test utilities for Parley
//!
//! Provides a scripted [`MockProvider`] and helpers for building engines
//! over in-memory storage.

use crate::config::Config;
use crate::error::{ParleyError, Result};
use crate::providers::{ChatRequest, DeltaStream, Provider, ProviderKind};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted outcome of one provider call
#[derive(Debug)]
pub enum MockReply {
    /// Stream these deltas, then end
    Deltas(Vec<String>),
    /// Fail before any delta
    OpenError(ParleyError),
    /// Stream these deltas, then fail
    StreamError(Vec<String>, ParleyError),
    /// Wait this long before answering with the deltas
    Delayed(Duration, Vec<String>),
    /// Answer at once, then wait this long before the first delta
    SlowStart(Duration, Vec<String>),
}

impl MockReply {
    /// Reply streaming `parts` in order
    pub fn deltas(parts: &[&str]) -> Self {
        Self::Deltas(parts.iter().map(|p| p.to_string()).collect())
    }
}

/// Provider that replays scripted replies and records requests
///
/// When the script is exhausted every call streams `"ok"`.
#[derive(Debug)]
pub struct MockProvider {
    kind: ProviderKind,
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    /// Creates a mock with an empty script
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Appends a reply to the script
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push_reply(reply);
        self
    }

    /// Appends a reply to the script
    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn ok_stream(parts: Vec<String>) -> DeltaStream {
    Box::pin(futures::stream::iter(parts.into_iter().map(Ok)))
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();

        match reply.unwrap_or_else(|| MockReply::deltas(&["ok"])) {
            MockReply::Deltas(parts) => Ok(ok_stream(parts)),
            MockReply::OpenError(e) => Err(e.into()),
            MockReply::StreamError(parts, e) => {
                let mut items: Vec<Result<String>> = parts.into_iter().map(Ok).collect();
                items.push(Err(e.into()));
                Ok(Box::pin(futures::stream::iter(items)))
            }
            MockReply::Delayed(delay, parts) => {
                tokio::time::sleep(delay).await;
                Ok(ok_stream(parts))
            }
            MockReply::SlowStart(delay, parts) => Ok(Box::pin(async_stream::stream! {
                tokio::time::sleep(delay).await;
                for part in parts {
                    yield Ok::<_, anyhow::Error>(part);
                }
            })),
        }
    }
}

/// Configuration with fast timeouts for tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.engine.timeout_seconds = 1;
    config
}
