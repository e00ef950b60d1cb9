//! Stride CLI: the main entry point.
//!
//! Commands:
//! - `init`    Create the config file and workspace
//! - `agent`   Interactive or single-instruction runs
//! - `config`  Validate, show or locate the configuration

use clap::{Parser, Subcommand};
use stride_config::{AppConfig, LoggingConfig};

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "stride",
    about = "Stride — run an LLM agent against a local workspace",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create configuration and workspace directories
    Init,

    /// Run the agent
    Agent {
        /// Run a single instruction instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Approve every tool call without asking
        #[arg(short, long, env = "STRIDE_AUTO_APPROVE")]
        yes: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate the configuration
    Validate,
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file path
    Path,
}

fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let default_filter = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = AppConfig::load();
    let logging = loaded.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    init_tracing(cli.verbose, &logging);

    match cli.command {
        Commands::Init => commands::init::run()?,
        Commands::Agent { message, yes } => {
            let config = loaded.map_err(|e| format!("Failed to load config: {e}"))?;
            commands::agent::run(config, message, yes).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate(loaded)?,
            ConfigAction::Show => {
                let config = loaded.map_err(|e| format!("Failed to load config: {e}"))?;
                commands::config_cmd::show(&config)?
            }
            ConfigAction::Path => commands::config_cmd::path(),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_instruction_mode() {
        let cli = Cli::try_parse_from(["stride", "agent", "-m", "list the files", "--yes"]).unwrap();
        match cli.command {
            Commands::Agent { message, yes } => {
                assert_eq!(message.as_deref(), Some("list the files"));
                assert!(yes);
            }
            _ => panic!("Expected agent command"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["stride", "config", "validate", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Config { action: ConfigAction::Validate }));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["stride", "serve"]).is_err());
    }
}
