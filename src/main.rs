//! Parley - multi-provider chat CLI
//!
#![doc = "Parley - multi-provider chat CLI"]
#![doc = "Main entry point for the Parley application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parley::cli::{Cli, Commands};
use parley::commands;
use parley::commands::chat::ChatOptions;
use parley::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat {
            provider,
            model,
            resume,
            system,
        } => {
            if let Some(p) = &provider {
                tracing::debug!("Using provider override: {}", p);
            }
            if let Some(r) = &resume {
                tracing::debug!("Resuming conversation: {}", r);
            }

            let options = ChatOptions {
                provider,
                model,
                resume,
                system,
            };
            commands::chat::run_chat(config, options).await?;
            Ok(())
        }
        Commands::History { command } => {
            commands::history::handle_history(config, command)?;
            Ok(())
        }
        Commands::Auth { provider } => {
            commands::auth::authenticate(&config, provider.as_deref())?;
            Ok(())
        }
    }
}

/// Initialize tracing with `RUST_LOG` support
///
/// `--verbose` raises the default level to debug. Setting
/// `PARLEY_LOG_JSON=1` switches to JSON lines for log shipping.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "parley=debug" } else { "parley=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json = std::env::var("PARLEY_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
