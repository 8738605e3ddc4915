//! tinysdk CLI - Headless demo player
//!
//! Features:
//! - Sample stream listing
//! - Playback with state reporting, retry and resume
//! - Track listing and selection

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tinysdk_core::{PlayerConfiguration, TrackSelection};

mod commands;
mod output;
mod samples;

/// tinysdk CLI - Demo player
#[derive(Parser)]
#[command(name = "tinysdk-cli")]
#[command(version)]
#[command(about = "Headless demo player for tinysdk", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Player configuration JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP user agent
    #[arg(long)]
    user_agent: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List sample streams
    List,

    /// Play a stream or sample
    Play {
        /// Stream URI or sample name
        target: String,

        /// Start position in milliseconds
        #[arg(short, long, default_value = "0")]
        position: u64,

        /// Video track ('off' or index)
        #[arg(long, value_parser = commands::parse_selection)]
        video: Option<TrackSelection>,

        /// Audio track ('off' or index)
        #[arg(long, value_parser = commands::parse_selection)]
        audio: Option<TrackSelection>,

        /// Caption track ('off' or index)
        #[arg(long, value_parser = commands::parse_selection)]
        captions: Option<TrackSelection>,

        /// Retries after a recoverable error
        #[arg(short, long, default_value = "0")]
        retries: u32,

        /// Stop after this many seconds
        #[arg(short, long)]
        max_seconds: Option<u64>,
    },

    /// List the tracks of a stream or sample
    Tracks {
        /// Stream URI or sample name
        target: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<PlayerConfiguration> {
    let mut config = match &cli.config {
        Some(path) => PlayerConfiguration::from_json_file(path)?,
        None => PlayerConfiguration::default(),
    };
    config.app_name = "tinysdk-cli".to_string();
    if let Some(user_agent) = &cli.user_agent {
        config.user_agent = user_agent.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .init();
    tinysdk_core::init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::List => {
            commands::list(&cli.format)?;
        }
        Commands::Play {
            target,
            position,
            video,
            audio,
            captions,
            retries,
            max_seconds,
        } => {
            let options = commands::PlayOptions {
                position_ms: position,
                video,
                audio,
                captions,
                retries,
                max_seconds,
            };
            commands::play(&target, config, options, &cli.format).await?;
        }
        Commands::Tracks { target } => {
            commands::tracks(&target, config, &cli.format).await?;
        }
    }

    Ok(())
}
