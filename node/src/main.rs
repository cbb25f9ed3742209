// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Balances Node
//!
//! Entry point for the `nova-balances` binary. Parses CLI arguments,
//! initializes logging and metrics, loads the devnet genesis, advances
//! blocks on a timer, and serves derived balances over HTTP/WS.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the devnet node
//! - `derive`  — print one address's derived balances at genesis
//! - `version` — print build version information

mod api;
mod cli;
mod genesis;
mod logging;
mod metrics;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use nova_derive::BalanceDeriver;

use cli::{Commands, NovaBalancesCli};
use genesis::Genesis;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NovaBalancesCli::parse();

    match cli.command {
        Commands::Run(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);
            run_node(args).await
        }
        Commands::Derive(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);
            derive_once(args).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the devnet node: block ticker, API server, and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        block_time_ms = args.block_time_ms,
        genesis = ?args.genesis,
        "starting nova-balances"
    );

    // --- Chain ---
    let genesis = Genesis::load_or_default(args.genesis.as_deref())?;
    let chain = genesis.build_chain()?;
    let deriver = Arc::new(BalanceDeriver::new(chain.clone(), chain.as_ref()));

    // --- Metrics ---
    let node_metrics =
        Arc::new(NodeMetrics::new().context("failed to register prometheus metrics")?);
    node_metrics.best_block.set(chain.best_number_now() as i64);

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        chain: Arc::clone(&chain),
        deriver,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = api::create_metrics_router(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Block ticker ---
    let ticker_chain = Arc::clone(&chain);
    let ticker_metrics = Arc::clone(&node_metrics);
    let block_time = Duration::from_millis(args.block_time_ms.max(1));
    let block_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(block_time);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let best = ticker_chain.advance_block();
            ticker_metrics.best_block.set(best as i64);
            tracing::debug!(best, "block advanced");
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    block_loop.abort();
    tracing::info!("nova-balances stopped");
    Ok(())
}

/// Derives one address at the genesis height and prints it as JSON.
async fn derive_once(args: cli::DeriveArgs) -> Result<()> {
    let genesis = Genesis::load_or_default(args.genesis.as_deref())?;
    let chain = genesis.build_chain()?;
    let deriver = BalanceDeriver::new(chain.clone(), chain.as_ref());

    let derived = deriver
        .derive_all_balances(&args.address)
        .next()
        .await
        .ok_or_else(|| anyhow!("derivation for {} ended without a value", args.address))?
        .with_context(|| format!("failed to derive balances for {}", args.address))?;

    println!("{}", serde_json::to_string_pretty(&derived)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("nova-balances {}", env!("CARGO_PKG_VERSION"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that signal is never reported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
