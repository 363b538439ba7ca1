//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// calctl - manage your calendar from the terminal
#[derive(Debug, Parser)]
#[command(name = "calctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALCTL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Fail instead of opening the browser when authorization is needed
    #[arg(long, global = true)]
    pub non_interactive: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List upcoming events
    List {
        /// Number of days to look ahead
        #[arg(long, short, default_value_t = 7)]
        days: u32,

        /// Maximum number of events to show
        #[arg(long, short = 'n', default_value_t = 10)]
        max_results: u32,

        /// Start of an explicit window (e.g. "monday", "2025-07-03 09:00")
        #[arg(long)]
        from: Option<String>,

        /// End of an explicit window; a bare date includes that whole day
        #[arg(long)]
        to: Option<String>,
    },

    /// Create an event
    Add {
        /// Event title
        title: String,

        /// Start time (e.g. "tomorrow at 3pm", "2025-07-03 09:00")
        #[arg(long, short)]
        start: String,

        /// End time; defaults to one hour after the start
        #[arg(long, short)]
        end: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        location: Option<String>,

        /// Create a date-only event
        #[arg(long)]
        all_day: bool,
    },

    /// Change the single event matching a search query
    Edit {
        /// Free-text search for the event
        query: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New start time
        #[arg(long)]
        start: Option<String>,

        /// New end time
        #[arg(long)]
        end: Option<String>,

        /// New description (empty to clear)
        #[arg(long)]
        description: Option<String>,

        /// New location (empty to clear)
        #[arg(long)]
        location: Option<String>,
    },

    /// Delete the single event matching a search query
    Delete {
        /// Free-text search for the event
        query: String,
    },

    /// Authentication commands
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run one tool with JSON arguments, as a tool-calling host would
    Tool {
        /// Tool name: list_events, add_event, edit_event or delete_event
        name: String,

        /// JSON object with the arguments; "-" reads it from stdin
        args: Option<String>,
    },

    /// Print the tool definitions as JSON
    Tools,
}

/// Authentication actions.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Authorize calctl with Google Calendar
    Login {
        /// Ask for consent again even if a usable grant is stored
        #[arg(long, short)]
        force: bool,
    },

    /// Remove the stored grant
    Logout,

    /// Show the stored grant without refreshing it
    Status,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
