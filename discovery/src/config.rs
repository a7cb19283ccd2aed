//! # Network Constants & Tunables
//!
//! Every magic number stakelink relies on lives here: ledger network tags,
//! bech32 prefixes, the Blockfrost endpoints, and the default knobs for
//! request timeouts and retries. If you're hardcoding one of these somewhere
//! else, move it here.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Library version, reported by `stakelink version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Network tag carried in the low nibble of every Shelley address header
/// on mainnet.
pub const NETWORK_ID_MAINNET: u8 = 1;

/// Network tag shared by every public testnet (preprod, preview).
pub const NETWORK_ID_TESTNET: u8 = 0;

// ---------------------------------------------------------------------------
// Bech32 Prefixes
// ---------------------------------------------------------------------------

/// Payment addresses on mainnet.
pub const ADDRESS_HRP_MAINNET: &str = "addr";

/// Payment addresses on any testnet.
pub const ADDRESS_HRP_TESTNET: &str = "addr_test";

/// Reward (stake) addresses on mainnet.
pub const STAKE_HRP_MAINNET: &str = "stake";

/// Reward (stake) addresses on any testnet.
pub const STAKE_HRP_TESTNET: &str = "stake_test";

/// Payment verification-key hashes. Network-agnostic on purpose: two
/// addresses that share a key hash produce the same credential string no
/// matter which network tag or address type wraps it.
pub const PAYMENT_KEY_HASH_HRP: &str = "addr_vkh";

/// Blake2b-224 digest length used for both key and script hashes.
pub const CREDENTIAL_HASH_LENGTH: usize = 28;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Asset unit the provider uses for the native coin.
pub const LOVELACE_UNIT: &str = "lovelace";

/// 1 ADA = 1,000,000 lovelace.
pub const LOVELACE_PER_ADA: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Blockfrost
// ---------------------------------------------------------------------------

pub const BLOCKFROST_MAINNET_URL: &str = "https://cardano-mainnet.blockfrost.io/api/v0";
pub const BLOCKFROST_PREPROD_URL: &str = "https://cardano-preprod.blockfrost.io/api/v0";
pub const BLOCKFROST_PREVIEW_URL: &str = "https://cardano-preview.blockfrost.io/api/v0";

/// Maximum page size Blockfrost accepts for list endpoints.
pub const BLOCKFROST_PAGE_SIZE: usize = 100;

/// Upper bound on pages fetched for a single listing. 1,000 pages is
/// 100,000 entries, well past any wallet we care about.
pub const BLOCKFROST_MAX_PAGES: u32 = 1_000;

/// Whole-request timeout for a single provider call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP + TLS connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries for rate-limited (429) or failing (5xx) provider responses.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between retries. Attempt `n` waits `n * DEFAULT_RETRY_BACKOFF`.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// One outstanding data-source request at a time.
pub const DEFAULT_MAX_CONCURRENCY: usize = 1;

/// Budget for one data-source call as seen by the discovery engine. Larger
/// than the HTTP timeout because a call may span several pages and retries.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// The Cardano networks Blockfrost serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

impl Network {
    /// Address-header network tag for this network.
    pub fn id(self) -> u8 {
        match self {
            Network::Mainnet => NETWORK_ID_MAINNET,
            Network::Preprod | Network::Preview => NETWORK_ID_TESTNET,
        }
    }

    /// Default Blockfrost base URL.
    pub fn blockfrost_url(self) -> &'static str {
        match self {
            Network::Mainnet => BLOCKFROST_MAINNET_URL,
            Network::Preprod => BLOCKFROST_PREPROD_URL,
            Network::Preview => BLOCKFROST_PREVIEW_URL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Preprod => "preprod",
            Network::Preview => "preview",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "preprod" => Ok(Network::Preprod),
            "preview" => Ok(Network::Preview),
            other => Err(format!(
                "unknown network '{}' (expected mainnet, preprod or preview)",
                other
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Bech32 prefix for a payment address on the given network tag.
pub fn address_hrp(network_id: u8) -> &'static str {
    if network_id == NETWORK_ID_MAINNET {
        ADDRESS_HRP_MAINNET
    } else {
        ADDRESS_HRP_TESTNET
    }
}

/// Bech32 prefix for a reward address on the given network tag. Anything
/// that isn't mainnet is a testnet as far as the ledger is concerned.
pub fn stake_hrp(network_id: u8) -> &'static str {
    if network_id == NETWORK_ID_MAINNET {
        STAKE_HRP_MAINNET
    } else {
        STAKE_HRP_TESTNET
    }
}

/// Friendly name for a network tag, mainly for logging.
pub fn network_name(network_id: u8) -> String {
    match network_id {
        NETWORK_ID_MAINNET => "mainnet".to_string(),
        NETWORK_ID_TESTNET => "testnet".to_string(),
        other => format!("unknown({})", other),
    }
}
