//! Turn pipeline
//!
//! [`Engine`] ties the pieces together for one client: it refreshes the
//! rolling summary, assembles context, streams the reply, and persists the
//! completed exchange along with its memory entries.

pub mod session;

pub use session::{ClientCommand, ConnectionSession, OutgoingMessage, ServerEvent};

use crate::config::Config;
use crate::context::{fold_inline_files, ContextAssembler};
use crate::conversation::{Conversation, Message};
use crate::error::{ParleyError, Result};
use crate::memory::MemoryIndex;
use crate::providers::{create_provider, Provider, ProviderKind};
use crate::storage::{ConversationStore, KeyValueStore, SledStore, StoredSession};
use crate::stream::{StreamAdapter, StreamSession};
use crate::summary::RollingSummarizer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Progress of a turn, reported before the reply starts streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Condensing older history
    Summarizing,
    /// Request sent, waiting for the first delta
    Thinking,
    /// Reply complete, persisting the exchange
    Saving,
}

impl TurnStatus {
    /// Stable lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summarizing => "summarizing",
            Self::Thinking => "thinking",
            Self::Saving => "saving",
        }
    }
}

impl std::fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation context and streaming engine
pub struct Engine {
    config: Config,
    store: ConversationStore,
    memory: MemoryIndex,
    assembler: ContextAssembler,
    summarizer: RollingSummarizer,
    adapter: StreamAdapter,
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl Engine {
    /// Creates an engine over `backend`
    pub fn new(config: Config, backend: Arc<dyn KeyValueStore>) -> Self {
        let engine_config = &config.engine;
        let memory = MemoryIndex::new(Arc::clone(&backend), engine_config.memory.capacity);
        let assembler = ContextAssembler::new(engine_config.context);
        let summarizer = RollingSummarizer::new(engine_config.summary);
        let adapter = StreamAdapter::new(Duration::from_secs(engine_config.timeout_seconds));

        Self {
            store: ConversationStore::new(backend),
            memory,
            assembler,
            summarizer,
            adapter,
            providers: HashMap::new(),
            config,
        }
    }

    /// Creates an engine over the configured sled database
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened
    pub fn open(config: Config) -> Result<Self> {
        let backend = SledStore::open(config.storage.path.as_deref())?;
        Ok(Self::new(config, Arc::new(backend)))
    }

    /// Uses `provider` for every conversation of its kind
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Overrides the provider timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.adapter = StreamAdapter::new(timeout);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates and persists a new conversation
    ///
    /// # Errors
    ///
    /// Returns error if the conversation cannot be saved
    pub fn create_conversation(
        &mut self,
        provider: ProviderKind,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<Conversation> {
        let conversation =
            Conversation::new(provider, model, system_prompt, max_output_tokens, temperature);
        self.store.save(&conversation)?;
        tracing::info!(
            conversation_id = %conversation.id,
            provider = %provider,
            model = %conversation.model,
            "Created conversation"
        );
        Ok(conversation)
    }

    /// Creates a conversation from configured defaults
    ///
    /// `provider` defaults to the configured provider type; the model is the
    /// configured model of that provider.
    pub fn create_default_conversation(
        &mut self,
        provider: Option<ProviderKind>,
    ) -> Result<Conversation> {
        let kind = provider.unwrap_or(self.config.provider.provider_type);
        let model = self.config.provider.model_for(kind).to_string();
        let system_prompt = self.config.engine.system_prompt.clone();
        let max_output_tokens = self.config.engine.max_output_tokens;
        let temperature = self.config.engine.temperature;
        self.create_conversation(kind, model, system_prompt, max_output_tokens, temperature)
    }

    /// Loads a conversation by ID or unique ID prefix
    pub fn load_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.store.load(id)
    }

    /// Persists conversation settings changed outside a turn
    pub fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.store.save(conversation)
    }

    /// Lists stored conversations, most recently updated first
    pub fn list_conversations(&self) -> Result<Vec<StoredSession>> {
        self.store.list()
    }

    /// Deletes a conversation and everything remembered about it
    ///
    /// Returns `false` when no conversation matched `id`.
    pub fn delete_conversation(&mut self, id: &str) -> Result<bool> {
        let Some(full_id) = self.store.resolve_id(id)? else {
            return Ok(false);
        };
        self.memory.forget(&full_id);
        self.store.delete(&full_id)
    }

    /// Sends `message` and streams the reply
    ///
    /// `on_chunk` receives the cumulative reply text and a completion flag;
    /// `on_status` receives progress before the first chunk. On success the
    /// exchange is persisted and `conversation` is updated in place. On
    /// failure the message list is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::Validation` for an empty message, a
    /// configuration error when the provider cannot be built, or the
    /// classified provider failure
    pub async fn send_and_stream<C, S>(
        &mut self,
        conversation: &mut Conversation,
        message: Message,
        search_results: Option<&str>,
        on_chunk: C,
        on_status: S,
    ) -> Result<()>
    where
        C: FnMut(&str, bool) + Send,
        S: FnMut(TurnStatus) + Send,
    {
        let mut session = StreamSession::new(conversation.id.clone());
        self.send_with_session(
            conversation,
            message,
            search_results,
            &mut session,
            on_chunk,
            on_status,
        )
        .await
    }

    /// [`Engine::send_and_stream`] with caller-owned stream bookkeeping
    pub async fn send_with_session<C, S>(
        &mut self,
        conversation: &mut Conversation,
        message: Message,
        search_results: Option<&str>,
        session: &mut StreamSession,
        on_chunk: C,
        mut on_status: S,
    ) -> Result<()>
    where
        C: FnMut(&str, bool) + Send,
        S: FnMut(TurnStatus) + Send,
    {
        if message.is_empty() {
            return Err(ParleyError::Validation(
                "Message is empty and has no attachments".to_string(),
            )
            .into());
        }

        let provider = self.provider_for(conversation.provider)?;

        if self.summarizer.is_due(conversation, 1) {
            on_status(TurnStatus::Summarizing);
            let summarized = self
                .summarizer
                .maybe_summarize(&self.adapter, provider.as_ref(), conversation, 1)
                .await;
            if summarized {
                if let Err(e) = self.store.save(conversation) {
                    tracing::warn!("Failed to persist summary for {}: {:#}", conversation.id, e);
                }
            }
        }

        let context = self
            .assembler
            .assemble(conversation, &message, search_results, &mut self.memory);
        let request = context.into_request(conversation);

        on_status(TurnStatus::Thinking);
        let reply = self
            .adapter
            .stream(provider.as_ref(), &request, session, on_chunk)
            .await?;

        on_status(TurnStatus::Saving);
        let mut updated = conversation.clone();
        updated.push_exchange(fold_inline_files(&message), Message::assistant(reply.clone()));
        self.store.save(&updated)?;
        *conversation = updated;

        self.memory.record(&conversation.id, &message.content);
        self.memory.record(&conversation.id, &reply);

        tracing::info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            reply_chars = reply.len(),
            "Turn completed"
        );

        Ok(())
    }

    fn provider_for(&mut self, kind: ProviderKind) -> Result<Arc<dyn Provider>> {
        if let Some(provider) = self.providers.get(&kind) {
            return Ok(Arc::clone(provider));
        }

        let provider = create_provider(
            kind,
            &self.config.provider,
            Duration::from_secs(self.config.engine.timeout_seconds),
        )?;
        self.providers.insert(kind, Arc::clone(&provider));
        Ok(provider)
    }
}
