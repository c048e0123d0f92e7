pub mod commands;
pub mod output;

use crate::errors::Result;
use clap::{Parser, Subcommand};
use commands::stack::StackAction;

#[derive(Parser)]
#[command(name = "gstack")]
#[command(about = "gstack - Stacked branches and pull requests on GitHub")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize repository for gstack
    Init {
        /// Trunk branch stacks are based on (default: main)
        #[arg(long)]
        trunk: Option<String>,

        /// Reinitialize even if already initialized
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Stack management
    Stack {
        #[command(subcommand)]
        action: StackAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., git.trunk_branch)
        key: String,
        /// Configuration value
        value: String,

        /// Write to the global file instead of this repository's
        #[arg(long)]
        global: bool,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// List all configuration values
    List,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        self.setup_logging();

        match self.command {
            Commands::Init { trunk, force } => commands::init::run(trunk, force).await,
            Commands::Config { action } => commands::config::run(action).await,
            Commands::Stack { action } => commands::stack::run(action).await,
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time();

        if self.no_color {
            console::set_colors_enabled(false);
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}
