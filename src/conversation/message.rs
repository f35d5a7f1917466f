//! Message and attachment types exchanged with providers

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human turn
    User,
    /// Model turn
    Assistant,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File attached to a user message
///
/// `payload` always holds base64-encoded bytes. Inline-text attachments are
/// decoded and folded into the message text before sending; image
/// attachments are sent as provider-specific structured parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name
    pub name: String,
    /// MIME type of the payload
    pub mime_type: String,
    /// Base64-encoded content
    pub payload: String,
    /// Whether the payload is text that should be inlined into the message
    #[serde(default)]
    pub is_inline_text: bool,
}

impl Attachment {
    /// Creates an inline-text attachment from plain text
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::conversation::Attachment;
    ///
    /// let file = Attachment::inline_text("notes.txt", "hello");
    /// assert!(file.is_inline_text);
    /// assert_eq!(file.decoded_text(), "hello");
    /// ```
    pub fn inline_text(name: impl Into<String>, text: &str) -> Self {
        Self {
            name: name.into(),
            mime_type: "text/plain".to_string(),
            payload: BASE64.encode(text.as_bytes()),
            is_inline_text: true,
        }
    }

    /// Creates a binary attachment (for example an image) from raw bytes
    pub fn binary(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            payload: BASE64.encode(bytes),
            is_inline_text: false,
        }
    }

    /// Returns the decoded text of the payload
    ///
    /// A payload that is not valid base64 is passed through verbatim.
    pub fn decoded_text(&self) -> String {
        match BASE64.decode(self.payload.trim()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!("Attachment {} is not base64 ({}), using raw payload", self.name, e);
                self.payload.clone()
            }
        }
    }

    /// Whether this attachment should be sent as an image part
    pub fn is_image(&self) -> bool {
        !self.is_inline_text && self.mime_type.starts_with("image/")
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Text content
    pub content: String,
    /// Attached files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Creation time in Unix milliseconds
    pub timestamp: i64,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::conversation::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Adds attachments and returns self for builder pattern
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// True when there is neither text nor any attachment to send
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.attachments.is_empty()
    }

    /// Image attachments to be sent as structured parts
    pub fn images(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.is_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_user() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.attachments.is_empty());
        assert!(msg.timestamp > 0);
    }

    #[test]
    fn test_message_serialization_omits_empty_attachments() {
        let msg = Message::assistant("Test");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
        assert!(json.contains("\"content\":\"Test\""));
        assert!(!json.contains("attachments"));
    }

    #[test]
    fn test_message_is_empty() {
        assert!(Message::user("   ").is_empty());
        assert!(!Message::user("hi").is_empty());
        let only_file = Message::user("").with_attachments(vec![Attachment::inline_text("a.txt", "x")]);
        assert!(!only_file.is_empty());
    }

    #[test]
    fn test_attachment_decoding_falls_back_to_raw() {
        let attachment = Attachment {
            name: "raw.txt".to_string(),
            mime_type: "text/plain".to_string(),
            payload: "not base64 !!".to_string(),
            is_inline_text: true,
        };
        assert_eq!(attachment.decoded_text(), "not base64 !!");
    }

    #[test]
    fn test_images_filter() {
        let msg = Message::user("look").with_attachments(vec![
            Attachment::binary("cat.png", "image/png", &[1, 2, 3]),
            Attachment::inline_text("notes.txt", "text"),
            Attachment::binary("doc.pdf", "application/pdf", &[4]),
        ]);
        let names: Vec<&str> = msg.images().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["cat.png"]);
    }

    #[test]
    fn test_attachment_deserialize_defaults_inline_flag() {
        let json = r#"{"name":"a.png","mime_type":"image/png","payload":"AAE="}"#;
        let attachment: Attachment = serde_json::from_str(json).unwrap();
        assert!(!attachment.is_inline_text);
        assert!(attachment.is_image());
    }
}
