//! ctxweave CLI: the main entry point.
//!
//! Commands:
//! - `chat`   Interactive chat or single-message mode
//! - `check`  Validate the configuration and show what it seeds

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ctxweave",
    about = "ctxweave: a context-engineered conversational agent",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the context configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "CTXWEAVE_CONFIG",
        default_value = ctxweave_config::DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// User id; each user gets their own thread
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Validate the configuration
    Check {
        /// Print a starter configuration instead
        #[arg(long)]
        print_default: bool,

        /// Also check that the generation backend is reachable
        #[arg(long)]
        ping: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { user, message } => commands::chat::run(&cli.config, &user, message).await?,
        Commands::Check { print_default, ping } => {
            commands::check::run(&cli.config, print_default, ping).await?
        }
    }

    Ok(())
}
