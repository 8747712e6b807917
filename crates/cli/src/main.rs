//! Aether CLI: the main entry point.
//!
//! Commands:
//! - `onboard`   Write the default config file
//! - `chat`      Interactive or single-message chat through the gateway
//! - `serve`     Start the HTTP gateway
//! - `export`    Write the RLHF dataset to disk
//! - `stats`     Show record store counters
//! - `rate`      Attach a rating to an assistant turn
//! - `validate`  Score free-form prompt text
//! - `forge`     Render prompt atoms as one structured prompt
//! - `atoms`     List the five prompt atoms
//! - `levels`    List the prompt complexity levels

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::AtomArgs;

#[derive(Parser)]
#[command(
    name = "aether",
    about = "Aether: structured prompting console and RLHF dataset tooling",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard,

    /// Chat through a running gateway
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        #[command(flatten)]
        atoms: AtomArgs,

        /// Memory to inject into the system prompt (repeatable)
        #[arg(long = "memory")]
        memories: Vec<String>,

        /// Continue an existing session id
        #[arg(long)]
        session: Option<String>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Export the RLHF dataset as JSON
    Export {
        /// Output file (defaults to prometheus-rlhf-<date>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only export one session
        #[arg(long)]
        session: Option<String>,
    },

    /// Show record store statistics
    Stats,

    /// Rate an assistant turn
    Rate {
        /// Id of the assistant turn being rated
        turn_id: String,

        /// Rating from 1 to 5
        #[arg(short, long)]
        rating: u8,

        /// A better answer, for preference pairs
        #[arg(long)]
        preferred: Option<String>,

        /// Feedback type label
        #[arg(long, default_value = "rating")]
        kind: String,
    },

    /// Check prompt text for the five atoms
    Validate {
        /// Prompt text to check
        text: String,
    },

    /// Render atoms as a structured prompt
    Forge {
        #[command(flatten)]
        atoms: AtomArgs,
    },

    /// List the prompt atoms and their guiding questions
    Atoms,

    /// List the prompt complexity levels
    Levels,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            message,
            atoms,
            memories,
            session,
        } => commands::chat::run(message, atoms, memories, session).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Export { output, session } => commands::dataset::export(output, session).await?,
        Commands::Stats => commands::dataset::stats().await?,
        Commands::Rate {
            turn_id,
            rating,
            preferred,
            kind,
        } => commands::dataset::rate(turn_id, rating, preferred, kind).await?,
        Commands::Validate { text } => commands::prompt::validate(&text)?,
        Commands::Forge { atoms } => commands::prompt::forge(atoms)?,
        Commands::Atoms => commands::prompt::atoms(),
        Commands::Levels => commands::prompt::levels(),
    }

    Ok(())
}
