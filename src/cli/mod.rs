//! Command line interface (C10 bootstrap surface).
//!
//! `run` (the default when no subcommand is given), `config show|reset`,
//! and `validate-config`.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "marketbook")]
#[command(about = "Sequence-ordered limit order book engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(long, global = true, default_value = "config.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the order book engine (default when no subcommand is given)
    Run,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Parse and validate a config file without starting the engine
    ValidateConfig,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file plus env overrides)
    Show,

    /// Reset the config file to defaults
    Reset,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Adjust log level based on the verbose flag.
    pub fn effective_log_level(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }

    /// The subcommand to run, defaulting to `Run` when none is given.
    pub fn command_or_default(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Run)
    }
}
