//! Rolling conversation summary
//!
//! Once enough unsummarized messages pile up, the tail of the history is
//! condensed by the active provider into a running summary that the
//! context assembler places in the system prompt. Summarization is
//! best-effort: failures keep the previous summary and never block a turn.

use crate::config::SummaryConfig;
use crate::conversation::{Conversation, Message, Role};
use crate::providers::{ChatRequest, Provider};
use crate::stream::StreamAdapter;

const SUMMARY_TEMPERATURE: f32 = 0.2;

const SUMMARIZER_PROMPT: &str =
    "You maintain a compact running summary of a conversation between a user and an assistant.";

/// Maintains [`Conversation::summary`]
#[derive(Debug, Clone, Copy)]
pub struct RollingSummarizer {
    config: SummaryConfig,
}

impl RollingSummarizer {
    /// Creates a summarizer with the given cadence
    pub fn new(config: SummaryConfig) -> Self {
        Self { config }
    }

    /// Whether a summary is due before sending `pending` more messages
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::config::SummaryConfig;
    /// use parley::conversation::Conversation;
    /// use parley::providers::ProviderKind;
    /// use parley::summary::RollingSummarizer;
    ///
    /// let summarizer = RollingSummarizer::new(SummaryConfig::default());
    /// let conversation = Conversation::new(ProviderKind::OpenAi, "m", "", 256, 0.7);
    /// assert!(!summarizer.is_due(&conversation, 1));
    /// ```
    pub fn is_due(&self, conversation: &Conversation, pending: usize) -> bool {
        if !self.config.enabled {
            return false;
        }
        let total = conversation.messages.len() + pending;
        total.saturating_sub(conversation.summarized_count) >= self.config.threshold
    }

    /// Builds the summarization request for the unsummarized tail
    ///
    /// Returns `None` when there is nothing new to summarize.
    pub fn build_request(&self, conversation: &Conversation) -> Option<ChatRequest> {
        let tail = conversation.unsummarized();
        if tail.is_empty() {
            return None;
        }

        let transcript = render_transcript(tail);
        let directive = match conversation.summary.as_deref() {
            Some(existing) if !existing.trim().is_empty() => format!(
                "Integrate the new messages into the existing summary. Keep facts, names, \
                 preferences and decisions from both, and drop nothing still relevant.\n\n\
                 Existing summary:\n{}\n\nNew messages:\n{}",
                existing.trim(),
                transcript
            ),
            _ => format!(
                "Produce a concise summary of the following conversation. Keep facts, names, \
                 preferences and decisions needed to continue it.\n\n{}",
                transcript
            ),
        };

        Some(ChatRequest {
            model: conversation.model.clone(),
            system_prompt: SUMMARIZER_PROMPT.to_string(),
            messages: vec![Message::user(directive)],
            temperature: SUMMARY_TEMPERATURE,
            max_output_tokens: self.config.max_output_tokens,
        })
    }

    /// Refreshes the summary when due, returning whether it changed
    ///
    /// Errors are logged and swallowed; the previous summary is kept.
    pub async fn maybe_summarize(
        &self,
        adapter: &StreamAdapter,
        provider: &dyn Provider,
        conversation: &mut Conversation,
        pending: usize,
    ) -> bool {
        if !self.is_due(conversation, pending) {
            return false;
        }
        let Some(request) = self.build_request(conversation) else {
            return false;
        };

        tracing::info!(
            conversation_id = %conversation.id,
            messages = conversation.unsummarized().len(),
            "Refreshing conversation summary"
        );

        match adapter.complete(provider, &request).await {
            Ok(summary) if !summary.trim().is_empty() => {
                conversation.apply_summary(summary.trim());
                true
            }
            Ok(_) => {
                tracing::warn!(conversation_id = %conversation.id, "Provider returned an empty summary");
                false
            }
            Err(e) => {
                tracing::warn!(conversation_id = %conversation.id, "Summarization failed: {:#}", e);
                false
            }
        }
    }
}

fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
