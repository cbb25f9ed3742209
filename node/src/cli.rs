//! # CLI Interface
//!
//! Defines the command-line argument structure for `nova-balances` using
//! `clap` derive. Supports three subcommands: `run`, `derive`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nova_derive::config::DEVNET_BLOCK_TIME_MS;

use crate::logging::LogFormat;

/// NOVA balances devnet node.
///
/// Runs an in-memory devnet seeded from a genesis file, advances blocks on
/// a timer, and serves live derived balances over HTTP and WebSocket.
#[derive(Parser, Debug)]
#[command(
    name = "nova-balances",
    about = "NOVA derived balances devnet node",
    version,
    propagate_version = true
)]
pub struct NovaBalancesCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "NOVA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the balances node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the devnet node and serve the API.
    Run(RunArgs),
    /// Print the derived balances of one address at genesis and exit.
    Derive(DeriveArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Genesis file (JSON). The built-in devnet genesis is used when omitted.
    #[arg(long, short = 'g', env = "NOVA_GENESIS")]
    pub genesis: Option<PathBuf>,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "NOVA_API_PORT", default_value_t = 9751)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "NOVA_METRICS_PORT", default_value_t = 9752)]
    pub metrics_port: u16,

    /// Milliseconds between devnet blocks.
    #[arg(long, env = "NOVA_BLOCK_TIME_MS", default_value_t = DEVNET_BLOCK_TIME_MS)]
    pub block_time_ms: u64,
}

/// Arguments for the `derive` subcommand.
#[derive(Parser, Debug)]
pub struct DeriveArgs {
    /// Address to derive balances for.
    pub address: String,

    /// Genesis file (JSON). The built-in devnet genesis is used when omitted.
    #[arg(long, short = 'g', env = "NOVA_GENESIS")]
    pub genesis: Option<PathBuf>,
}
