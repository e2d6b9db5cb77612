//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::{Priority, TaskStatus};

/// Default user for local runs
pub const DEFAULT_USER: &str = "local";

/// agentd - asynchronous LLM agent task runner
#[derive(Parser)]
#[command(
    name = "agentd",
    about = "Run LLM agent tasks through a retrying worker pool",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/agentd/logs/agentd.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// List routable models and their providers
    Models {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a single completion and print the result
    Complete {
        /// Logical model id
        #[arg(short, long)]
        model: String,

        /// System prompt
        #[arg(short, long, default_value = "You are a helpful assistant.")]
        system: String,

        /// Sampling temperature (0 to 1)
        #[arg(short, long)]
        temperature: Option<f64>,

        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,

        /// User prompt
        prompt: String,
    },

    /// Create an agent from a YAML file and run prompts through the worker pool
    Run {
        /// Agent definition (YAML)
        #[arg(value_name = "AGENT_FILE")]
        agent: PathBuf,

        /// Prompts to submit, one task each
        #[arg(required = true)]
        prompts: Vec<String>,

        /// Owner of the agent and tasks
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,

        /// Task priority
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Retries per task after the first attempt
        #[arg(long)]
        max_retries: Option<u32>,

        /// Keep state in memory instead of the configured database
        #[arg(long)]
        memory: bool,
    },

    /// Inspect stored tasks
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },

    /// Show task counts and success rate for a user
    Stats {
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the last lines of the log file
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },
}

/// `tasks` subcommands
#[derive(Subcommand)]
pub enum TasksCommand {
    /// List tasks, newest first
    List {
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,

        /// Only tasks with this status
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// Only tasks for this agent
        #[arg(short, long)]
        agent: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one task
    Show {
        /// Task ID
        id: String,

        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for listing commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentd")
        .join("logs")
        .join("agentd.log")
}
