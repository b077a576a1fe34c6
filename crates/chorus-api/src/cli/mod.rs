//! CLI command definitions for the `chorus` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod provider;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use chorus_infra::config::DEFAULT_CONFIG_FILE;

/// Ask several LLMs the same question and get one reconciled answer.
#[derive(Parser)]
#[command(name = "chorus", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, env = "CHORUS_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Suppress all log output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (overrides the configured port).
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (overrides the configured host).
        #[arg(long)]
        host: Option<String>,
    },

    /// Apply database migrations and exit.
    Migrate,

    /// List configured LLM providers.
    Providers {
        /// Send a tiny request to every provider that has a key.
        #[arg(long)]
        check: bool,
    },
}
