//! mongostore CLI
//!
//! Command-line tools for driving a mongostore against a live server.
//!
//! # Commands
//!
//! - `describe` - Show the normalized connection settings
//! - `ping` - Connect, authenticate and round-trip to the server
//! - `load` - Load the first entity matching a query
//! - `list` - List entities matching a query
//! - `save` - Save an entity from JSON fields
//! - `remove` - Remove one or every matching entity

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// mongostore command-line tools.
#[derive(Parser)]
#[command(name = "mongostore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON store options file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Connection string, overriding the config file's `url`
    #[arg(global = true, short, long)]
    url: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the normalized connection settings
    Describe {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check that the server is reachable and credentials are accepted
    Ping,

    /// Load the first entity matching a query
    Load {
        /// Entity kind, as `name`, `base/name` or `zone/base/name`
        kind: String,

        /// Query as a JSON object
        #[arg(short, long)]
        query: Option<String>,
    },

    /// List entities matching a query
    List {
        /// Entity kind, as `name`, `base/name` or `zone/base/name`
        kind: String,

        /// Query as a JSON object
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Save an entity; an `id` field updates that entity
    Save {
        /// Entity kind, as `name`, `base/name` or `zone/base/name`
        kind: String,

        /// Entity fields as a JSON object
        data: String,
    },

    /// Remove the first entity matching a query
    Remove {
        /// Entity kind, as `name`, `base/name` or `zone/base/name`
        kind: String,

        /// Query as a JSON object
        #[arg(short, long)]
        query: Option<String>,

        /// Remove every match
        #[arg(short, long)]
        all: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("mongostore CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("mongostore core v{}", mongostore_core::VERSION);
        return Ok(());
    }

    let options = commands::load_options(cli.config.as_deref(), cli.url.as_deref())?;

    match cli.command {
        Commands::Describe { format } => commands::describe::run(&options, &format)?,
        Commands::Ping => commands::ping::run(options).await?,
        Commands::Load { kind, query } => {
            commands::load::run(options, &kind, query.as_deref()).await?
        }
        Commands::List { kind, query } => {
            commands::list::run(options, &kind, query.as_deref()).await?
        }
        Commands::Save { kind, data } => commands::save::run(options, &kind, &data).await?,
        Commands::Remove { kind, query, all } => {
            commands::remove::run(options, &kind, query.as_deref(), all).await?
        }
        Commands::Version => {}
    }

    Ok(())
}
