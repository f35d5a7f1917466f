use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::conversation::{Conversation, Role};
use crate::engine::Engine;
use crate::error::{ParleyError, Result};
use crate::storage::StoredSession;
use colored::Colorize;
use prettytable::{format, Table};

/// Handle history commands
pub fn handle_history(config: Config, command: HistoryCommand) -> Result<()> {
    let mut engine = Engine::open(config)?;

    match command {
        HistoryCommand::List => {
            let sessions = engine.list_conversations()?;

            if sessions.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }

            println!("\nConversation History:");
            session_table(&sessions).printstd();
            println!();
            println!(
                "Use {} to resume a conversation.",
                "parley chat --resume <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id } => {
            let conversation = engine
                .load_conversation(&id)?
                .ok_or_else(|| ParleyError::Storage(format!("Conversation not found: {}", id)))?;
            print_conversation(&conversation);
        }
        HistoryCommand::Delete { id } => {
            if engine.delete_conversation(&id)? {
                println!("{}", format!("Deleted conversation {}", id).green());
            } else {
                println!("{}", format!("No conversation matches {}", id).yellow());
            }
        }
    }

    Ok(())
}

fn session_table(sessions: &[StoredSession]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Provider".bold(),
        "Model".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for session in sessions {
        let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();
        let messages = if session.has_summary {
            format!("{} (summarized)", session.message_count)
        } else {
            session.message_count.to_string()
        };

        table.add_row(prettytable::row![
            short_id(&session.id).cyan(),
            truncate_title(&session.title, 40),
            session.provider,
            session.model,
            messages,
            updated
        ]);
    }

    table
}

fn print_conversation(conversation: &Conversation) {
    println!(
        "\n{} ({})",
        conversation.title.bold(),
        conversation.id.as_str().cyan()
    );
    println!("{} / {}", conversation.provider, conversation.model);
    if let Some(summary) = &conversation.summary {
        println!("\n{}\n{}", "Summary:".bold(), summary.dimmed());
    }
    for message in &conversation.messages {
        let label = match message.role {
            Role::User => "you".green().bold(),
            Role::Assistant => "assistant".blue().bold(),
        };
        println!("\n{}:", label);
        println!("{}", message.content);
        for attachment in &message.attachments {
            println!("  [attachment: {} {}]", attachment.name, attachment.mime_type);
        }
    }
    println!();
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() > max_chars {
        let kept: String = title.chars().take(max_chars - 3).collect();
        format!("{}...", kept)
    } else {
        title.to_string()
    }
}
