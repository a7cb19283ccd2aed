// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Stakelink Discovery: Core Library
//!
//! Give it one Cardano address and it finds the rest of the wallet. Light
//! wallets spread funds over many addresses that share a stake key; the
//! chain itself never says which addresses belong together. This crate
//! follows the credentials the chain does expose and rebuilds the cluster.
//!
//! ## Architecture
//!
//! - **credential**: Shelley address decoding. Payment and stake credentials.
//! - **source**: The `DataSource` trait: everything we ask of an indexer.
//! - **blockfrost**: `DataSource` over the Blockfrost REST API.
//! - **memory**: `DataSource` over hash maps, for tests and offline replays.
//! - **engine**: The frontier walk and the final fold into a wallet.
//! - **types**: Addresses, UTXOs, reward accounts, `ClusteredWallet`.
//! - **value**: Multi-asset arithmetic that refuses to overflow.
//! - **progress**: Observers for long runs.
//! - **config**: Network constants and tuning defaults.
//!
//! ## Quick start
//!
//! ```no_run
//! use stakelink_discovery::{
//!     Address, BlockfrostConfig, BlockfrostSource, ClusterDiscovery, Network,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let source = BlockfrostSource::new(BlockfrostConfig::new(Network::Mainnet, "mainnet..."))?;
//! let wallet = ClusterDiscovery::new(&source)
//!     .discover(&Address::from("addr1..."))
//!     .await?;
//!
//! println!("{} addresses, {} lovelace", wallet.addresses().len(), wallet.balance().lovelace);
//! # Ok(())
//! # }
//! ```

pub mod blockfrost;
pub mod config;
pub mod credential;
pub mod engine;
pub mod memory;
pub mod progress;
pub mod source;
pub mod types;
pub mod value;

pub use blockfrost::{BlockfrostConfig, BlockfrostSource};
pub use config::Network;
pub use credential::{
    resolve_payment_credential, resolve_stake_credential, validate_address, CredentialError,
    ShelleyAddress,
};
pub use engine::{discover, ClusterDiscovery, DiscoveryConfig, DiscoveryError};
pub use memory::{CallCounts, Fixture, InMemorySource};
pub use progress::{NoProgress, ProgressEvent, ProgressSink, TracingProgress};
pub use source::{DataSource, SourceError};
pub use types::{
    Address, AddressInfo, ClusteredWallet, DelegationSummary, PaymentCredential, PoolDelegation,
    RewardAccountInfo, StakeCredential, TransactionRef, Utxo, UtxoRef,
};
pub use value::{Value, ValueError};
