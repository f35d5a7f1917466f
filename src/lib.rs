//! Parley - conversation context and streaming engine
//!
//! This library keeps long-running conversations with several LLM providers
//! coherent and responsive: it assembles a bounded context for each turn,
//! folds older history into a rolling summary, recalls relevant past turns
//! from a per-conversation memory index, and streams replies back as
//! cumulative text.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `conversation`: Conversation, message and attachment types
//! - `context`: Context assembly under a token budget
//! - `summary`: Rolling summary maintenance
//! - `memory`: Per-conversation embedding index for recall
//! - `providers`: Provider clients (OpenAI, Anthropic, Gemini, Ollama), SSE decoding and error classification
//! - `stream`: Stream sessions, timeouts and stream metrics
//! - `storage`: Key-value persistence for conversations and memory
//! - `engine`: The turn pipeline and the per-connection command protocol
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use parley::{Config, Engine};
//! use parley::conversation::Message;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let mut engine = Engine::open(config)?;
//!     let mut conversation = engine.create_default_conversation(None)?;
//!     engine
//!         .send_and_stream(
//!             &mut conversation,
//!             Message::user("Hello!"),
//!             None,
//!             |text, _done| println!("{}", text),
//!             |_status| {},
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod memory;
pub mod providers;
pub mod storage;
pub mod stream;
pub mod summary;

// Re-export commonly used types
pub use config::Config;
pub use engine::Engine;
pub use error::{ParleyError, Result};

#[cfg(test)]
pub mod test_utils;
