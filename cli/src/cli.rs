//! # CLI Interface
//!
//! Defines the command-line argument structure for `stakelink` using
//! `clap` derive. Supports four subcommands: `discover`, `credentials`,
//! `history`, and `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use stakelink_discovery::Network;

/// Cardano address clustering.
///
/// Starts from one address and follows shared payment and stake keys until
/// the whole wallet is found, then reports its balance, rewards and
/// delegation.
#[derive(Parser, Debug)]
#[command(
    name = "stakelink",
    about = "Find every address that belongs to the same Cardano wallet",
    version,
    propagate_version = true
)]
pub struct StakelinkCli {
    /// Log output format: `pretty` or `json`. Logs go to stderr.
    #[arg(long, global = true, env = "STAKELINK_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Log engine and data-source detail (retries, paging) to stderr.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the stakelink binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover the wallet cluster around an address.
    Discover(DiscoverArgs),
    /// Print the payment and stake credentials of an address. No network access.
    Credentials(CredentialsArgs),
    /// List the transactions touching an address, oldest first.
    History(HistoryArgs),
    /// Print version information and exit.
    Version,
}

/// Where chain data comes from. Shared by every subcommand that needs it.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Path to a TOML configuration file.
    ///
    /// Flags and environment variables override values from the file.
    #[arg(long, short = 'c', env = "STAKELINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cardano network: mainnet, preprod, or preview.
    #[arg(long, short = 'n', env = "STAKELINK_NETWORK")]
    pub network: Option<Network>,

    /// Blockfrost project id for the selected network.
    #[arg(long, env = "STAKELINK_PROJECT_ID", hide_env_values = true)]
    pub project_id: Option<String>,

    /// Blockfrost API root, for self-hosted or proxied instances.
    #[arg(long, env = "STAKELINK_BASE_URL")]
    pub base_url: Option<String>,

    /// Replay a JSON fixture instead of querying Blockfrost.
    #[arg(long)]
    pub fixture: Option<PathBuf>,
}

/// Arguments for the `discover` subcommand.
#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    /// Seed address (bech32, `addr1...` or `addr_test1...`).
    pub address: String,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Maximum data-source requests in flight.
    #[arg(long, env = "STAKELINK_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Give up on the whole discovery after this many seconds.
    #[arg(long, env = "STAKELINK_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Print the wallet as JSON instead of a text report.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `credentials` subcommand.
#[derive(Parser, Debug)]
pub struct CredentialsArgs {
    /// Address to decode.
    pub address: String,

    /// Network the stake credential is encoded for. Defaults to the
    /// address's own network tag.
    #[arg(long, short = 'n')]
    pub network: Option<Network>,
}

/// Arguments for the `history` subcommand.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Address whose transactions to list.
    pub address: String,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Print the transactions as JSON.
    #[arg(long)]
    pub json: bool,
}
