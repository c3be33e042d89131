//! Hushwire CLI
//!
//! Drives the messaging transport against an in-process relay network and
//! exposes the topic and bloom filter derivations.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod config;

use config::CliConfig;

/// Hushwire CLI - messaging transport tools
#[derive(Parser)]
#[command(name = "hushwire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange messages between two peers on an in-process relay
    Demo {
        /// Public chat to talk on
        #[arg(long)]
        chat: Option<String>,

        /// Number of messages to send
        #[arg(short, long, default_value = "3")]
        messages: usize,

        /// Keep processed message ids in the on-disk cache
        #[arg(short, long)]
        persistent: bool,
    },

    /// Compute the bloom filter of a set of topics
    Bloom {
        /// Topics as 0x-prefixed hex
        #[arg(short, long = "topic")]
        topics: Vec<String>,

        /// Chat names whose topics are included
        #[arg(long = "chat")]
        chats: Vec<String>,
    },

    /// Derive the topic of chat names
    Topic {
        /// Chat names
        #[arg(required = true)]
        chats: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load config
    let config_path = cli.config.unwrap_or_else(|| {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("hushwire");
        path.push("config.toml");
        path
    });

    let config = CliConfig::load_or_default(&config_path)?;

    // Execute command
    match cli.command {
        Commands::Demo {
            chat,
            messages,
            persistent,
        } => {
            commands::demo(&config, chat, messages, persistent).await?;
        }
        Commands::Bloom { topics, chats } => {
            commands::bloom(&topics, &chats)?;
        }
        Commands::Topic { chats } => {
            commands::topic(&chats);
        }
    }

    Ok(())
}
