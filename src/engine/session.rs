//! Per-connection command handling
//!
//! A [`ConnectionSession`] owns the engine, the open conversation and the
//! active stream for one client connection. Commands arrive as JSON
//! [`ClientCommand`]s and every reply or notification is pushed onto the
//! connection's event channel as a [`ServerEvent`]. Commands are handled
//! one at a time.

use crate::conversation::{Attachment, Conversation, Message};
use crate::engine::{Engine, TurnStatus};
use crate::error::{ParleyError, Result};
use crate::providers::{error_kind, ProviderKind};
use crate::storage::StoredSession;
use crate::stream::StreamSession;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// User message as sent over the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Message text
    #[serde(default)]
    pub content: String,
    /// Attached files
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl From<OutgoingMessage> for Message {
    fn from(outgoing: OutgoingMessage) -> Self {
        Message::user(outgoing.content).with_attachments(outgoing.attachments)
    }
}

/// Inbound transport command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Send a user message; `conversation_id` defaults to the open conversation
    SendMessage {
        #[serde(default)]
        conversation_id: Option<String>,
        message: OutgoingMessage,
        #[serde(default)]
        search_results: Option<String>,
    },
    /// Create a conversation; unset fields use configured defaults
    CreateConversation {
        #[serde(default)]
        provider: Option<ProviderKind>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        max_output_tokens: Option<u32>,
        #[serde(default)]
        temperature: Option<f32>,
    },
    /// Open a stored conversation
    LoadConversation { conversation_id: String },
    /// List stored conversations
    ListConversations,
    /// Delete a stored conversation
    DeleteConversation { conversation_id: String },
}

/// Outbound transport notification
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Cumulative reply text so far
    Chunk { conversation_id: String, text: String },
    /// Final reply text
    Done { conversation_id: String, text: String },
    /// Failed command; `payload` is the message to resend, if any
    Error {
        conversation_id: Option<String>,
        kind: String,
        message: String,
        payload: Option<OutgoingMessage>,
    },
    /// Turn progress
    Status { conversation_id: String, status: String },
    /// Created or loaded conversation
    Conversation { conversation: Conversation },
    /// Stored conversations
    Conversations { conversations: Vec<StoredSession> },
    /// Result of a deletion
    Deleted { conversation_id: String, deleted: bool },
}

/// State of one client connection
pub struct ConnectionSession {
    engine: Engine,
    events: mpsc::UnboundedSender<ServerEvent>,
    conversation: Option<Conversation>,
    active: Option<StreamSession>,
}

impl ConnectionSession {
    /// Creates a session publishing events on `events`
    pub fn new(engine: Engine, events: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            engine,
            events,
            conversation: None,
            active: None,
        }
    }

    /// Currently open conversation
    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    /// Bookkeeping of the most recent stream
    pub fn active_stream(&self) -> Option<&StreamSession> {
        self.active.as_ref()
    }

    /// Parses and handles one JSON command
    ///
    /// A command that cannot be parsed is answered with an `error` event.
    pub async fn handle_json(&mut self, raw: &str) {
        match serde_json::from_str::<ClientCommand>(raw) {
            Ok(command) => self.handle(command).await,
            Err(e) => {
                tracing::warn!("Rejected malformed command: {}", e);
                self.emit(ServerEvent::Error {
                    conversation_id: None,
                    kind: "protocol".to_string(),
                    message: format!("Malformed command: {}", e),
                    payload: None,
                });
            }
        }
    }

    /// Handles one command, reporting failures as `error` events
    pub async fn handle(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::SendMessage {
                conversation_id,
                message,
                search_results,
            } => {
                self.send_message(conversation_id, message, search_results)
                    .await
            }
            ClientCommand::CreateConversation {
                provider,
                model,
                system_prompt,
                max_output_tokens,
                temperature,
            } => {
                let result = self.create_conversation(
                    provider,
                    model,
                    system_prompt,
                    max_output_tokens,
                    temperature,
                );
                self.reply(None, result, |conversation| ServerEvent::Conversation {
                    conversation,
                });
            }
            ClientCommand::LoadConversation { conversation_id } => {
                let result = self.load_conversation(&conversation_id);
                self.reply(Some(conversation_id), result, |conversation| {
                    ServerEvent::Conversation { conversation }
                });
            }
            ClientCommand::ListConversations => {
                let result = self.engine.list_conversations();
                self.reply(None, result, |conversations| ServerEvent::Conversations {
                    conversations,
                });
            }
            ClientCommand::DeleteConversation { conversation_id } => {
                let result = self.engine.delete_conversation(&conversation_id);
                if let Ok(true) = result {
                    let open = self.conversation.as_ref().map(|c| c.id.starts_with(&conversation_id));
                    if open == Some(true) {
                        self.conversation = None;
                    }
                }
                let id = conversation_id.clone();
                self.reply(Some(conversation_id), result, move |deleted| {
                    ServerEvent::Deleted {
                        conversation_id: id,
                        deleted,
                    }
                });
            }
        }
    }

    fn create_conversation(
        &mut self,
        provider: Option<ProviderKind>,
        model: Option<String>,
        system_prompt: Option<String>,
        max_output_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Conversation> {
        let config = self.engine.config();
        let kind = provider.unwrap_or(config.provider.provider_type);
        let model = model.unwrap_or_else(|| config.provider.model_for(kind).to_string());
        let system_prompt = system_prompt.unwrap_or_else(|| config.engine.system_prompt.clone());
        let max_output_tokens = max_output_tokens.unwrap_or(config.engine.max_output_tokens);
        let temperature = temperature.unwrap_or(config.engine.temperature);

        let conversation = self.engine.create_conversation(
            kind,
            model,
            system_prompt,
            max_output_tokens,
            temperature,
        )?;
        self.conversation = Some(conversation.clone());
        Ok(conversation)
    }

    fn load_conversation(&mut self, id: &str) -> Result<Conversation> {
        let conversation = self
            .engine
            .load_conversation(id)?
            .ok_or_else(|| ParleyError::Storage(format!("Conversation not found: {}", id)))?;
        self.conversation = Some(conversation.clone());
        Ok(conversation)
    }

    /// Takes the target conversation out of the session for one turn
    fn take_conversation(&mut self, id: Option<&str>) -> Result<Conversation> {
        let open_matches = match (id, self.conversation.as_ref()) {
            (None, Some(_)) => true,
            (Some(id), Some(open)) => open.id.starts_with(id),
            _ => false,
        };
        if open_matches {
            if let Some(conversation) = self.conversation.take() {
                return Ok(conversation);
            }
        }

        match id {
            Some(id) => self
                .engine
                .load_conversation(id)?
                .ok_or_else(|| ParleyError::Storage(format!("Conversation not found: {}", id)).into()),
            None => self.engine.create_default_conversation(None),
        }
    }

    async fn send_message(
        &mut self,
        conversation_id: Option<String>,
        payload: OutgoingMessage,
        search_results: Option<String>,
    ) {
        let mut conversation = match self.take_conversation(conversation_id.as_deref()) {
            Ok(conversation) => conversation,
            Err(e) => {
                self.emit_error(conversation_id, &e, Some(payload));
                return;
            }
        };
        let id = conversation.id.clone();

        if let Some(previous) = self.active.as_ref().filter(|s| !s.state().is_terminal()) {
            tracing::warn!(
                "Superseding unfinished stream for conversation {}",
                previous.conversation_id()
            );
        }
        let session = self.active.insert(StreamSession::new(id.clone()));

        let events = &self.events;
        let chunk_id = id.clone();
        let on_chunk = |text: &str, done: bool| {
            let event = if done {
                ServerEvent::Done {
                    conversation_id: chunk_id.clone(),
                    text: text.to_string(),
                }
            } else {
                ServerEvent::Chunk {
                    conversation_id: chunk_id.clone(),
                    text: text.to_string(),
                }
            };
            let _ = events.send(event);
        };
        let status_id = id.clone();
        let on_status = |status: TurnStatus| {
            let _ = events.send(ServerEvent::Status {
                conversation_id: status_id.clone(),
                status: status.to_string(),
            });
        };

        let result = self
            .engine
            .send_with_session(
                &mut conversation,
                payload.clone().into(),
                search_results.as_deref(),
                session,
                on_chunk,
                on_status,
            )
            .await;

        self.conversation = Some(conversation);
        if let Err(e) = result {
            self.emit_error(Some(id), &e, Some(payload));
        }
    }

    fn reply<T>(
        &self,
        conversation_id: Option<String>,
        result: Result<T>,
        event: impl FnOnce(T) -> ServerEvent,
    ) {
        match result {
            Ok(value) => self.emit(event(value)),
            Err(e) => self.emit_error(conversation_id, &e, None),
        }
    }

    fn emit_error(
        &self,
        conversation_id: Option<String>,
        error: &anyhow::Error,
        payload: Option<OutgoingMessage>,
    ) {
        self.emit(ServerEvent::Error {
            conversation_id,
            kind: error_kind(error).to_string(),
            message: error.to_string(),
            payload,
        });
    }

    fn emit(&self, event: ServerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event channel closed; dropping event");
        }
    }
}
