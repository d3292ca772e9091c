//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the model loader.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// LLM Loader - hardware-aware model loading
///
/// Probes the machine, picks the backend that fits a model file, loads it
/// with automatic fallback, and optionally generates text.
#[derive(Parser, Debug)]
#[command(name = "llm-loader")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe and list configured backends
    Backends {
        /// Path to configuration file
        #[arg(short, long, env = "LLM_LOADER_CONFIG")]
        config: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the hardware snapshot and optimal settings
    Hardware {
        /// Path to configuration file
        #[arg(short, long, env = "LLM_LOADER_CONFIG")]
        config: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pick the best backend for a model size
    Select {
        /// Model size in MB
        #[arg(long)]
        size_mb: u64,

        /// Restrict to GPU or CPU backends
        #[arg(long, value_parser = ["auto", "gpu", "cpu"])]
        prefer: Option<String>,

        /// Path to configuration file
        #[arg(short, long, env = "LLM_LOADER_CONFIG")]
        config: Option<String>,
    },

    /// Load a model file, optionally generating text
    Load {
        /// Model file (GGUF)
        path: PathBuf,

        /// Use only this backend
        #[arg(short, long)]
        backend: Option<String>,

        /// Prompt to run once the model is loaded
        #[arg(short, long)]
        prompt: Option<String>,

        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Print the full monitoring report as JSON
        #[arg(long)]
        report: bool,

        /// Path to configuration file
        #[arg(short, long, env = "LLM_LOADER_CONFIG")]
        config: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long, env = "LLM_LOADER_CONFIG")]
        config: Option<String>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long, env = "LLM_LOADER_CONFIG")]
        config: Option<String>,
    },
}
