//! Context assembly
//!
//! Decides exactly what is sent with each turn: the system prompt (base
//! instructions, running summary, recalled memories), a bounded window of
//! recent history, and the new user message with its inline files and any
//! search results folded in.

use crate::config::ContextConfig;
use crate::conversation::{Conversation, Message};
use crate::memory::MemoryIndex;
use crate::providers::ChatRequest;

/// Header of the recalled-memory block
pub const MEMORY_HEADER: &str = "Relevant past details:";

/// Header of the running-summary block
pub const SUMMARY_HEADER: &str = "Summary of the conversation so far:";

/// Everything needed to build one provider request
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Final system prompt
    pub system_prompt: String,
    /// History window ending with the augmented user message
    pub messages: Vec<Message>,
    /// `chars / 4` estimate of `messages`
    pub estimated_tokens: usize,
    /// Memory entries recalled into the system prompt
    pub recalled: Vec<String>,
}

impl AssembledContext {
    /// Builds the provider request for `conversation`'s settings
    pub fn into_request(self, conversation: &Conversation) -> ChatRequest {
        ChatRequest {
            model: conversation.model.clone(),
            system_prompt: self.system_prompt,
            messages: self.messages,
            temperature: conversation.temperature,
            max_output_tokens: conversation.max_output_tokens,
        }
    }
}

/// Builds per-turn request context
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    /// Creates an assembler with the given limits
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Assembles the context for sending `new_message` in `conversation`
    ///
    /// `new_message` is the raw user turn; the returned copy has inline-text
    /// attachments and `search_results` folded into its content.
    pub fn assemble(
        &self,
        conversation: &Conversation,
        new_message: &Message,
        search_results: Option<&str>,
        memory: &mut MemoryIndex,
    ) -> AssembledContext {
        let augmented = augment_message(new_message, search_results);

        let recalled: Vec<String> = memory
            .search(&conversation.id, &augmented.content, self.config.memory_top_k)
            .into_iter()
            .map(|m| m.text)
            .collect();

        let mut messages: Vec<Message> = conversation
            .recent(self.config.history_window)
            .to_vec();
        messages.push(augmented);

        let min_window = self.config.min_window.max(2);
        let mut estimated_tokens = estimate_tokens(&messages);
        while estimated_tokens > self.config.token_budget && messages.len() > min_window {
            messages.remove(0);
            estimated_tokens = estimate_tokens(&messages);
        }

        let system_prompt = build_system_prompt(conversation, &recalled);

        tracing::debug!(
            conversation_id = %conversation.id,
            window = messages.len(),
            estimated_tokens,
            recalled = recalled.len(),
            "Assembled context"
        );

        AssembledContext {
            system_prompt,
            messages,
            estimated_tokens,
            recalled,
        }
    }
}

/// Estimate tokens of a message list as total characters / 4
///
/// # Examples
///
/// ```
/// use parley::context::estimate_tokens;
/// use parley::conversation::Message;
///
/// let messages = vec![Message::user("abcd"), Message::assistant("efghijkl")];
/// assert_eq!(estimate_tokens(&messages), 3);
/// ```
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| m.content.chars().count()).sum::<usize>() / 4
}

/// Copy of `message` with inline-text attachments appended to its content
/// and removed from its attachment list
///
/// Image attachments are kept.
pub fn fold_inline_files(message: &Message) -> Message {
    let mut folded = message.clone();
    folded.attachments.retain(|a| !a.is_inline_text);

    for attachment in message.attachments.iter().filter(|a| a.is_inline_text) {
        folded.content.push_str(&format!(
            "\n\n--- BEGIN FILE: {name} ---\n{body}\n--- END FILE: {name} ---",
            name = attachment.name,
            body = attachment.decoded_text()
        ));
    }

    folded
}

/// Folds inline files and search results into a copy of `message`
fn augment_message(message: &Message, search_results: Option<&str>) -> Message {
    let mut augmented = fold_inline_files(message);

    if let Some(results) = search_results.map(str::trim).filter(|r| !r.is_empty()) {
        augmented.content = format!(
            "Web search results:\n{}\n\nAnswer the following based on the search results above.\n\n{}",
            results, augmented.content
        );
    }

    augmented
}

fn build_system_prompt(conversation: &Conversation, recalled: &[String]) -> String {
    let mut sections = Vec::new();

    if !conversation.system_prompt.trim().is_empty() {
        sections.push(conversation.system_prompt.trim().to_string());
    }

    if conversation.use_summary {
        if let Some(summary) = conversation.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            sections.push(format!("{}\n{}", SUMMARY_HEADER, summary.trim()));
        }
    }

    if !recalled.is_empty() {
        let bullets = recalled
            .iter()
            .map(|text| format!("- {}", text))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("{}\n{}", MEMORY_HEADER, bullets));
    }

    sections.join("\n\n")
}
