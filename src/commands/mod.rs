/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `chat`: Interactive chat session with streaming replies
- `history`: List, show and delete stored conversations
- `auth`: Store provider API keys in the system keyring
*/

use crate::config::Config;
use crate::conversation::Attachment;
use crate::error::{ParleyError, Result};
use crate::providers::ProviderKind;
use std::path::Path;
use std::str::FromStr;

// Special commands parser for the chat loop
pub mod special_commands;

// Conversation history commands
pub mod history;

/// Applies command-line provider and model overrides to `config`
///
/// # Errors
///
/// Returns `ParleyError::Config` when `provider` is not a known provider
pub fn apply_overrides(
    mut config: Config,
    provider: Option<&str>,
    model: Option<&str>,
) -> Result<Config> {
    if let Some(name) = provider {
        config.provider.provider_type = ProviderKind::from_str(name)?;
    }
    if let Some(model) = model {
        let kind = config.provider.provider_type;
        config.provider = config.provider.with_model(kind, model);
    }
    Ok(config)
}

/// Reads a file into an attachment
///
/// Known image extensions become binary attachments; anything else must be
/// UTF-8 text and is inlined into the message.
///
/// # Errors
///
/// Returns an IO error when the file cannot be read, or
/// `ParleyError::Validation` for non-text files that are not images
pub fn load_attachment(path: &Path) -> Result<Attachment> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if let Some(mime_type) = image_mime_type(path) {
        return Ok(Attachment::binary(name, mime_type, &bytes));
    }

    match String::from_utf8(bytes) {
        Ok(text) => Ok(Attachment::inline_text(name, &text)),
        Err(_) => Err(ParleyError::Validation(format!(
            "{} is neither text nor a supported image (png, jpeg, gif, webp)",
            path.display()
        ))
        .into()),
    }
}

fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Opens the engine, creates or resumes a conversation, and runs a
    //! readline-based loop that streams each reply as it arrives.

    use super::*;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::conversation::{Conversation, Message};
    use crate::engine::{Engine, TurnStatus};
    use crate::providers::error_kind;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;

    /// Options for a chat session
    #[derive(Debug, Clone, Default)]
    pub struct ChatOptions {
        /// Provider override
        pub provider: Option<String>,
        /// Model override
        pub model: Option<String>,
        /// Conversation ID (or prefix) to resume
        pub resume: Option<String>,
        /// System instructions for a new conversation
        pub system: Option<String>,
    }

    /// Attachments and search results waiting for the next message
    #[derive(Debug, Default)]
    struct Staged {
        attachments: Vec<Attachment>,
        search_results: Option<String>,
    }

    /// Start interactive chat mode
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be opened, the resumed
    /// conversation does not exist, or the terminal cannot be read
    pub async fn run_chat(config: Config, options: ChatOptions) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let config = apply_overrides(
            config,
            options.provider.as_deref(),
            options.model.as_deref(),
        )?;
        let mut engine = Engine::open(config)?;
        let mut conversation = open_conversation(&mut engine, &options)?;

        let mut rl = DefaultEditor::new()?;
        let mut staged = Staged::default();

        print_welcome_banner(&conversation);

        loop {
            let prompt = format!("{} ", "[parley]>>".cyan());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::None) => {}
                        Ok(SpecialCommand::Exit) => break,
                        Ok(command) => {
                            handle_special(&engine, &mut conversation, &mut staged, command);
                            continue;
                        }
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    }

                    let message = Message::user(trimmed)
                        .with_attachments(std::mem::take(&mut staged.attachments));
                    let search_results = staged.search_results.take();

                    let result = send(
                        &mut engine,
                        &mut conversation,
                        message.clone(),
                        search_results.as_deref(),
                    )
                    .await;
                    if let Err(e) = result {
                        eprintln!("\n{} {:#}", format!("[{}]", error_kind(&e)).red(), e);
                        // Keep the staged input so the user can retry
                        staged.attachments = message.attachments;
                        staged.search_results = search_results;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("EOF");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        println!("Conversation saved as {}", conversation.id.as_str().cyan());
        Ok(())
    }

    fn open_conversation(engine: &mut Engine, options: &ChatOptions) -> Result<Conversation> {
        if let Some(id) = options.resume.as_deref() {
            return engine.load_conversation(id)?.ok_or_else(|| {
                ParleyError::Storage(format!("Conversation not found: {}", id)).into()
            });
        }

        match options.system.as_deref() {
            Some(system_prompt) => {
                let config = engine.config();
                let kind = config.provider.provider_type;
                let model = config.provider.model_for(kind).to_string();
                let max_output_tokens = config.engine.max_output_tokens;
                let temperature = config.engine.temperature;
                engine.create_conversation(
                    kind,
                    model,
                    system_prompt,
                    max_output_tokens,
                    temperature,
                )
            }
            None => engine.create_default_conversation(None),
        }
    }

    async fn send(
        engine: &mut Engine,
        conversation: &mut Conversation,
        message: Message,
        search_results: Option<&str>,
    ) -> Result<()> {
        let mut printed = 0usize;
        let on_chunk = |text: &str, done: bool| {
            if let Some(delta) = text.get(printed..) {
                print!("{}", delta);
                printed = text.len();
            }
            if done {
                println!();
            }
            let _ = std::io::stdout().flush();
        };
        let on_status = |status: TurnStatus| {
            if status == TurnStatus::Summarizing {
                println!("{}", "(summarizing earlier messages...)".dimmed());
            }
        };

        engine
            .send_and_stream(conversation, message, search_results, on_chunk, on_status)
            .await
    }

    fn handle_special(
        engine: &Engine,
        conversation: &mut Conversation,
        staged: &mut Staged,
        command: SpecialCommand,
    ) {
        match command {
            SpecialCommand::Attach(path) => match load_attachment(&path) {
                Ok(attachment) => {
                    println!(
                        "Attached {} ({})",
                        attachment.name.green(),
                        attachment.mime_type
                    );
                    staged.attachments.push(attachment);
                }
                Err(e) => {
                    let text = format!("Failed to attach {}: {:#}", path.display(), e);
                    eprintln!("{}", text.red());
                }
            },
            SpecialCommand::Search(path) => match std::fs::read_to_string(&path) {
                Ok(results) => {
                    let name = path.display().to_string();
                    println!("Search results from {} staged", name.green());
                    staged.search_results = Some(results);
                }
                Err(e) => {
                    let text = format!("Failed to read {}: {}", path.display(), e);
                    eprintln!("{}", text.red());
                }
            },
            SpecialCommand::Clear => {
                *staged = Staged::default();
                println!("Cleared staged attachments and search results");
            }
            SpecialCommand::Summary(enabled) => {
                conversation.use_summary = enabled;
                if let Err(e) = engine.save_conversation(conversation) {
                    eprintln!("{}", format!("Failed to save conversation: {:#}", e).red());
                }
                println!(
                    "Rolling summary {}",
                    if enabled { "enabled".green() } else { "disabled".yellow() }
                );
            }
            SpecialCommand::ShowStatus => print_status(conversation, staged),
            SpecialCommand::Help => print_help(),
            SpecialCommand::Exit | SpecialCommand::None => {}
        }
    }

    fn print_welcome_banner(conversation: &Conversation) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                 Parley Interactive Chat                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!(
            "Conversation: {} ({})",
            conversation.title.bold(),
            conversation.id.as_str().cyan()
        );
        println!("Provider:     {} / {}", conversation.provider, conversation.model);
        if !conversation.messages.is_empty() {
            println!("Messages:     {}", conversation.messages.len());
        }
        println!("\nType '/help' for available commands, 'exit' to quit\n");
    }

    fn print_status(conversation: &Conversation, staged: &Staged) {
        println!("\n{}", "Conversation Status".bold());
        println!("  ID:          {}", conversation.id.as_str().cyan());
        println!("  Title:       {}", conversation.title);
        println!("  Provider:    {} / {}", conversation.provider, conversation.model);
        println!("  Messages:    {}", conversation.messages.len());
        match conversation.summary {
            Some(_) => println!(
                "  Summary:     covers {} messages ({})",
                conversation.summarized_count,
                if conversation.use_summary { "in use" } else { "disabled" }
            ),
            None => println!("  Summary:     none yet"),
        }
        println!(
            "  Staged:      {} attachment(s){}",
            staged.attachments.len(),
            if staged.search_results.is_some() { ", search results" } else { "" }
        );
        println!();
    }
}

// Auth command handler
pub mod auth {
    use super::*;
    use crate::providers::{api_key_env_var, store_api_key};
    use colored::Colorize;

    /// Prompt for an API key and store it in the system keyring
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `provider` - Provider name; the configured provider when `None`
    ///
    /// # Errors
    ///
    /// Returns error for an unknown provider, an empty key, or when the
    /// keyring rejects the entry
    pub fn authenticate(config: &Config, provider: Option<&str>) -> Result<()> {
        let kind = match provider {
            Some(name) => ProviderKind::from_str(name)?,
            None => config.provider.provider_type,
        };
        tracing::info!("Starting authentication for provider: {}", kind);

        if !kind.requires_api_key() {
            println!(
                "{}: runs locally without an API key; set `provider.ollama.host` in the config instead.",
                kind
            );
            return Ok(());
        }

        if let Some(var) = api_key_env_var(kind) {
            println!("Tip: {} also reads the key from ${}", kind, var);
        }
        let mut rl = rustyline::DefaultEditor::new()?;
        let key = rl.readline(&format!("{} API key: ", kind))?;
        save_key(kind, &key)?;
        println!("{}", format!("{}: key stored in the system keyring", kind).green());
        Ok(())
    }

    /// Validates and stores `key` for `kind`
    pub(crate) fn save_key(kind: ProviderKind, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ParleyError::Validation("API key is empty".to_string()).into());
        }
        store_api_key(kind, key)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_apply_overrides_switches_provider_and_model() {
        let config =
            apply_overrides(Config::default(), Some("Gemini"), Some("gemini-1.5-pro")).unwrap();
        assert_eq!(config.provider.provider_type, ProviderKind::Gemini);
        assert_eq!(
            config.provider.model_for(ProviderKind::Gemini),
            "gemini-1.5-pro"
        );
    }

    #[test]
    fn test_apply_overrides_rejects_unknown_provider() {
        let err = apply_overrides(Config::default(), Some("copilot"), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParleyError>(),
            Some(ParleyError::Config(_))
        ));
    }

    #[test]
    fn test_load_attachment_text_file_is_inline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes\nship it").unwrap();

        let attachment = load_attachment(&path).unwrap();
        assert_eq!(attachment.name, "notes.md");
        assert!(attachment.is_inline_text);
        assert_eq!(attachment.decoded_text(), "# Notes\nship it");
    }

    #[test]
    fn test_load_attachment_image_is_binary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("diagram.PNG");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0x89, b'P', b'N', b'G', 0xff, 0x00]).unwrap();

        let attachment = load_attachment(&path).unwrap();
        assert_eq!(attachment.mime_type, "image/png");
        assert!(attachment.is_image());
    }

    #[test]
    fn test_load_attachment_rejects_binary_non_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x81]).unwrap();

        let err = load_attachment(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParleyError>(),
            Some(ParleyError::Validation(_))
        ));
    }

    #[test]
    fn test_load_attachment_missing_file() {
        assert!(load_attachment(Path::new("/definitely/not/here.txt")).is_err());
    }
}
