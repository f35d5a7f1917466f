//! Command-line interface definition for Parley
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for chat, conversation history, and authentication.

use clap::{Parser, Subcommand};

/// Parley - multi-provider chat with memory, summaries and streaming
#[derive(Parser, Debug, Clone)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the conversation database location
    #[arg(long, env = "PARLEY_STORAGE_PATH")]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Parley
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Override the provider from config (openai, anthropic, gemini, ollama)
        #[arg(short, long)]
        provider: Option<String>,

        /// Override the model of the selected provider
        #[arg(short, long)]
        model: Option<String>,

        /// Resume a stored conversation by ID (or ID prefix)
        #[arg(short, long)]
        resume: Option<String>,

        /// System instructions for a new conversation
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Manage stored conversations
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Store a provider API key in the system keyring
    Auth {
        /// Provider to store a key for; the configured provider when omitted
        #[arg(short, long)]
        provider: Option<String>,
    },
}

/// Conversation history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List stored conversations
    List,

    /// Print a stored conversation
    Show {
        /// Conversation ID or prefix
        id: String,
    },

    /// Delete a stored conversation
    Delete {
        /// Conversation ID or prefix
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            storage_path: None,
            command: Commands::History {
                command: HistoryCommand::List,
            },
        }
    }
}
