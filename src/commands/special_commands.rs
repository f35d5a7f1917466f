//! Special commands parser for interactive chat mode
//!
//! Special commands stage attachments and search results for the next
//! message, toggle the rolling summary, show session status, and end the
//! session. Commands are prefixed with `/` and the command word is
//! case-insensitive; arguments keep their case.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Attach a file to the next message
    ///
    /// Text files are inlined into the prompt; images are sent to the
    /// provider as binary attachments.
    Attach(PathBuf),

    /// Use the contents of a file as web search results for the next message
    Search(PathBuf),

    /// Drop staged attachments and search results
    Clear,

    /// Enable or disable the rolling summary for this conversation
    Summary(bool),

    /// Display conversation status
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input should be sent as a regular message.
    None,
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` if input starts with "/" but is not
/// a valid command, `CommandError::MissingArgument` when a path is missing,
/// and `CommandError::UnsupportedArgument` for an invalid `/summary` value.
///
/// # Examples
///
/// ```
/// use parley::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// let cmd = parse_special_command("/summary off").unwrap();
/// assert_eq!(cmd, SpecialCommand::Summary(false));
///
/// let cmd = parse_special_command("hello there").unwrap();
/// assert_eq!(cmd, SpecialCommand::None);
///
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (command, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((command, arg)) => (command.to_lowercase(), arg.trim()),
        None => (lower.clone(), ""),
    };

    match command.as_str() {
        "exit" | "quit" | "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/status" => Ok(SpecialCommand::ShowStatus),
        "/clear" => Ok(SpecialCommand::Clear),
        "/attach" => require_path("/attach", "/attach <path>", arg).map(SpecialCommand::Attach),
        "/search" => require_path("/search", "/search <path>", arg).map(SpecialCommand::Search),
        "/summary" => match arg.to_lowercase().as_str() {
            "on" | "enable" => Ok(SpecialCommand::Summary(true)),
            "off" | "disable" => Ok(SpecialCommand::Summary(false)),
            "" => Err(CommandError::MissingArgument {
                command: "/summary".to_string(),
                usage: "/summary <on|off>".to_string(),
            }),
            other => Err(CommandError::UnsupportedArgument {
                command: "/summary".to_string(),
                arg: other.to_string(),
            }),
        },
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

fn require_path(command: &str, usage: &str, arg: &str) -> Result<PathBuf, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        });
    }
    Ok(PathBuf::from(arg))
}

/// Print help for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
===========================================

ATTACHMENTS:
  /attach <path>  - Attach a text file or image to the next message
  /search <path>  - Use a file of web search results for the next message
  /clear          - Drop staged attachments and search results

CONVERSATION:
  /summary on     - Keep a rolling summary of older messages
  /summary off    - Send only the recent window, without the summary
  /status         - Show conversation status

SESSION CONTROL:
  /help           - Show this help message
  /?              - Same as /help
  exit            - Exit interactive mode
  quit            - Same as exit

NOTES:
  - Command words are case-insensitive
  - Staged attachments are sent with the next message only
"#
    );
}
