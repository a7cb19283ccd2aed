// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # stakelink
//!
//! Entry point for the `stakelink` binary. Parses CLI arguments, initializes
//! logging, builds a data source and runs discovery.
//!
//! The binary supports four subcommands:
//!
//! - `discover`: find the wallet cluster around a seed address
//! - `credentials`: decode an address into its credentials
//! - `history`: list transactions touching an address
//! - `version`: print build version information

mod cli;
mod config;
mod logging;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;

use stakelink_discovery::{
    resolve_payment_credential, resolve_stake_credential, validate_address, Address,
    BlockfrostSource, ClusterDiscovery, DataSource, Fixture, InMemorySource, TracingProgress,
};

use cli::{Commands, StakelinkCli};
use config::Settings;
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = StakelinkCli::parse();
    logging::init_logging(cli.verbose, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Discover(args) => run_discover(args).await,
        Commands::Credentials(args) => show_credentials(args),
        Commands::History(args) => show_history(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Runs discovery from the seed and prints the wallet.
async fn run_discover(args: cli::DiscoverArgs) -> Result<()> {
    let settings = Settings::resolve(&args.source, args.concurrency, args.timeout_secs)?;
    let source = open_source(&settings)?;
    let seed = Address::new(args.address.trim());

    tracing::info!(
        seed = %seed,
        network = %settings.network,
        concurrency = settings.discovery.max_concurrency,
        fixture = settings.fixture.is_some(),
        "starting stakelink discover"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, cancelling discovery");
        let _ = shutdown_tx.send(true);
    });

    let result = ClusterDiscovery::new(source.as_ref())
        .with_config(settings.discovery.clone())
        .with_progress(&TracingProgress)
        .with_shutdown(shutdown_rx)
        .discover(&seed)
        .await;
    signal_task.abort();

    let wallet = result.with_context(|| format!("discovery from {seed} failed"))?;

    if args.json {
        let json = serde_json::to_string_pretty(&wallet).context("failed to serialize wallet")?;
        println!("{json}");
    } else {
        print!("{}", report::render_wallet(&wallet));
    }
    Ok(())
}

/// Decodes an address locally and prints its credentials.
fn show_credentials(args: cli::CredentialsArgs) -> Result<()> {
    let address = Address::new(args.address.trim());
    let decoded = validate_address(&address)?;
    let network_id = args
        .network
        .map(|n| n.id())
        .unwrap_or_else(|| decoded.network_tag());

    let payment = resolve_payment_credential(&address).ok();
    let stake = resolve_stake_credential(&address, network_id)?;

    print!(
        "{}",
        report::render_credentials(&address, &decoded, payment.as_ref(), stake.as_ref())
    );
    Ok(())
}

/// Prints the transaction history of one address.
async fn show_history(args: cli::HistoryArgs) -> Result<()> {
    let settings = Settings::resolve(&args.source, None, None)?;
    let address = Address::new(args.address.trim());
    validate_address(&address)?;

    let source = open_source(&settings)?;
    let transactions = source
        .transactions_for(&address)
        .await
        .with_context(|| format!("failed to list transactions for {address}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
    } else {
        print!("{}", report::render_history(&address, &transactions));
    }
    Ok(())
}

/// Builds the data source: a replayed fixture when `--fixture` is given,
/// Blockfrost otherwise.
fn open_source(settings: &Settings) -> Result<Box<dyn DataSource>> {
    match &settings.fixture {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read fixture {}", path.display()))?;
            let fixture = Fixture::from_json(&text)
                .with_context(|| format!("invalid fixture {}", path.display()))?;
            tracing::info!(path = %path.display(), "replaying fixture");
            Ok(Box::new(InMemorySource::from_fixture(fixture)))
        }
        None => {
            let config = settings.blockfrost_config()?;
            let source =
                BlockfrostSource::new(config).context("failed to set up the Blockfrost client")?;
            tracing::info!(base_url = %source.base_url(), "using Blockfrost");
            Ok(Box::new(source))
        }
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("stakelink {}", env!("CARGO_PKG_VERSION"));
    println!("discovery {}", stakelink_discovery::config::VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed that branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
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
