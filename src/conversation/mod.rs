//! Conversation state
//!
//! A [`Conversation`] owns the full message history, the provider settings
//! used for each turn, and the running summary maintained by
//! [`crate::summary::RollingSummarizer`]. The history is never truncated;
//! only the context sent per request is bounded.

pub mod message;

pub use message::{Attachment, Message, Role};

use crate::providers::ProviderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Title given to conversations before their first exchange
pub const DEFAULT_TITLE: &str = "New conversation";

const TITLE_MAX_CHARS: usize = 48;

/// One ongoing dialogue with a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier (ULID)
    pub id: String,
    /// User-facing title
    pub title: String,
    /// Provider used for every turn
    pub provider: ProviderKind,
    /// Model identifier passed to the provider
    pub model: String,
    /// Base system instructions
    pub system_prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens per reply
    pub max_output_tokens: u32,
    /// Full message history
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Running summary of older messages
    #[serde(default)]
    pub summary: Option<String>,
    /// Number of leading messages covered by `summary`
    #[serde(default)]
    pub summarized_count: usize,
    /// Whether the summary is included in the system prompt
    #[serde(default = "default_use_summary")]
    pub use_summary: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

fn default_use_summary() -> bool {
    true
}

impl Conversation {
    /// Creates an empty conversation
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::conversation::Conversation;
    /// use parley::providers::ProviderKind;
    ///
    /// let conversation = Conversation::new(
    ///     ProviderKind::OpenAi,
    ///     "gpt-4o-mini",
    ///     "You are terse.",
    ///     1024,
    ///     0.2,
    /// );
    /// assert!(conversation.messages.is_empty());
    /// assert_eq!(conversation.summarized_count, 0);
    /// ```
    pub fn new(
        provider: ProviderKind,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new().to_string(),
            title: DEFAULT_TITLE.to_string(),
            provider,
            model: model.into(),
            system_prompt: system_prompt.into(),
            temperature,
            max_output_tokens,
            messages: Vec::new(),
            summary: None,
            summarized_count: 0,
            use_summary: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// The `n` most recent messages
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Messages not yet covered by the running summary
    pub fn unsummarized(&self) -> &[Message] {
        let start = self.summarized_count.min(self.messages.len());
        &self.messages[start..]
    }

    /// Replaces the running summary; it now covers every current message
    pub fn apply_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
        self.summarized_count = self.messages.len();
        self.touch();
    }

    /// Appends a completed user/assistant exchange
    ///
    /// The first exchange also gives an untitled conversation its title.
    pub fn push_exchange(&mut self, user: Message, assistant: Message) {
        if self.title == DEFAULT_TITLE && !user.content.trim().is_empty() {
            self.title = derive_title(&user.content);
        }
        self.messages.push(user);
        self.messages.push(assistant);
        self.touch();
    }

    /// Marks the conversation as updated now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Builds a single-line title from the first user message
fn derive_title(content: &str) -> String {
    let line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.chars().count() <= TITLE_MAX_CHARS {
        line.to_string()
    } else {
        let mut truncated = line.chars().take(TITLE_MAX_CHARS - 3).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation::new(ProviderKind::Anthropic, "claude", "Be brief.", 512, 0.5)
    }

    #[test]
    fn test_new_conversation() {
        let c = conversation();
        assert_eq!(c.id.len(), 26);
        assert_eq!(c.title, DEFAULT_TITLE);
        assert!(c.summary.is_none());
        assert!(c.use_summary);
    }

    #[test]
    fn test_recent_saturates() {
        let mut c = conversation();
        c.push_exchange(Message::user("a"), Message::assistant("b"));
        assert_eq!(c.recent(20).len(), 2);
        assert_eq!(c.recent(1)[0].content, "b");
        assert!(c.recent(0).is_empty());
    }

    #[test]
    fn test_apply_summary_covers_all_messages() {
        let mut c = conversation();
        c.push_exchange(Message::user("a"), Message::assistant("b"));
        c.apply_summary("talked about a");
        assert_eq!(c.summarized_count, 2);
        assert!(c.unsummarized().is_empty());
        assert_eq!(c.messages.len(), 2);

        c.push_exchange(Message::user("c"), Message::assistant("d"));
        assert_eq!(c.unsummarized().len(), 2);
        assert_eq!(c.unsummarized()[0].content, "c");
    }

    #[test]
    fn test_title_from_first_exchange_only() {
        let mut c = conversation();
        c.push_exchange(
            Message::user("\nHow do I convert miles to kilometers in my head quickly?"),
            Message::assistant("Multiply by 1.6"),
        );
        assert_eq!(c.title, "How do I convert miles to kilometers in my he...");
        c.push_exchange(Message::user("Thanks"), Message::assistant("Welcome"));
        assert!(c.title.starts_with("How do I convert"));
    }

    #[test]
    fn test_conversation_roundtrip_defaults_use_summary() {
        let c = conversation();
        let mut value = serde_json::to_value(&c).unwrap();
        value.as_object_mut().unwrap().remove("use_summary");
        let restored: Conversation = serde_json::from_value(value).unwrap();
        assert!(restored.use_summary);
        assert_eq!(restored.id, c.id);
    }
}
