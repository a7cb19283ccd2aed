//! # Cluster Data Model
//!
//! Identifiers ([`Address`], [`PaymentCredential`], [`StakeCredential`]) are
//! thin newtypes over their bech32 text so they can't be mixed up at call
//! sites. Everything the data source returns ([`Utxo`], [`RewardAccountInfo`],
//! [`TransactionRef`]) is immutable once observed.
//!
//! [`ClusteredWallet`] is the terminal aggregate. It is built exactly once,
//! by [`ClusteredWallet::new`], which deduplicates its inputs and computes
//! the totals; there is no way to mutate it afterwards, so the balance can
//! never drift away from the UTXO set it was computed from.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueError};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! bech32_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

bech32_id!(
    /// A ledger address as bech32 text (`addr1...`, `addr_test1...`, `stake1...`).
    Address
);

bech32_id!(
    /// A payment key hash as `addr_vkh1...`. Shared by every address built
    /// on the same payment key, regardless of network tag or address type.
    PaymentCredential
);

bech32_id!(
    /// A reward account, spelled as its reward address (`stake1...`).
    StakeCredential
);

// ---------------------------------------------------------------------------
// Ledger entities
// ---------------------------------------------------------------------------

/// Identity of a UTXO: the transaction that created it and the output index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UtxoRef {
    pub tx_hash: String,
    pub output_index: u32,
}

impl fmt::Display for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.output_index)
    }
}

/// An unspent transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_hash: String,
    pub output_index: u32,
    /// The address holding this output when it was observed.
    pub address: Address,
    pub value: Value,
}

impl Utxo {
    pub fn new(
        tx_hash: impl Into<String>,
        output_index: u32,
        address: Address,
        value: Value,
    ) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            output_index,
            address,
            value,
        }
    }

    pub fn reference(&self) -> UtxoRef {
        UtxoRef {
            tx_hash: self.tx_hash.clone(),
            output_index: self.output_index,
        }
    }
}

/// State of one reward account as reported by the data source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAccountInfo {
    pub stake_credential: StakeCredential,
    /// Lovelace currently controlled (staked) by this account.
    pub controlled_amount: u64,
    /// Rewards available for withdrawal, in lovelace.
    pub withdrawable_amount: u64,
    /// Pool the account delegates to. `None` means undelegated.
    pub pool_id: Option<String>,
    /// Whether the stake key is currently registered.
    pub active: bool,
}

impl RewardAccountInfo {
    pub fn is_delegated(&self) -> bool {
        self.pool_id.is_some()
    }
}

/// A transaction touching an address, as returned by the history lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRef {
    pub tx_hash: String,
    /// Position of the transaction inside its block.
    pub tx_index: u32,
    pub block_height: u64,
    pub block_time: DateTime<Utc>,
}

/// One discovered address with its credentials and holdings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: Address,
    /// `None` for addresses without a key-hash payment part (script
    /// addresses reached through a shared stake key).
    pub payment_credential: Option<PaymentCredential>,
    /// `None` for enterprise and pointer addresses.
    pub stake_credential: Option<StakeCredential>,
    pub utxos: Vec<Utxo>,
    /// Coalesced value of `utxos`.
    pub value: Value,
}

impl AddressInfo {
    /// Builds the record and computes its balance from `utxos`.
    pub fn new(
        address: Address,
        payment_credential: Option<PaymentCredential>,
        stake_credential: Option<StakeCredential>,
        utxos: Vec<Utxo>,
    ) -> Result<Self, ValueError> {
        let value = Value::coalesce(utxos.iter().map(|u| &u.value))?;
        Ok(Self {
            address,
            payment_credential,
            stake_credential,
            utxos,
            value,
        })
    }
}

// ---------------------------------------------------------------------------
// ClusteredWallet
// ---------------------------------------------------------------------------

/// Every address linked to a seed, folded into one logical wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteredWallet {
    seed: Address,
    addresses: Vec<AddressInfo>,
    reward_accounts: Vec<RewardAccountInfo>,
    utxos: Vec<Utxo>,
    balance: Value,
    withdrawable_rewards: u64,
}

impl ClusteredWallet {
    /// Aggregates per-address and per-reward-account records.
    ///
    /// Addresses are unique by address text, reward accounts by stake
    /// credential and UTXOs by `(tx_hash, output_index)`; when a key shows up
    /// twice the last instance wins. Output order is sorted by key, so two
    /// runs over the same data produce identical wallets.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Overflow`] if a total exceeds `u64::MAX`.
    pub fn new(
        seed: Address,
        addresses: impl IntoIterator<Item = AddressInfo>,
        reward_accounts: impl IntoIterator<Item = RewardAccountInfo>,
    ) -> Result<Self, ValueError> {
        let addresses: BTreeMap<Address, AddressInfo> = addresses
            .into_iter()
            .map(|info| (info.address.clone(), info))
            .collect();

        let reward_accounts: BTreeMap<StakeCredential, RewardAccountInfo> = reward_accounts
            .into_iter()
            .map(|info| (info.stake_credential.clone(), info))
            .collect();

        let utxos: BTreeMap<UtxoRef, Utxo> = addresses
            .values()
            .flat_map(|info| info.utxos.iter())
            .map(|utxo| (utxo.reference(), utxo.clone()))
            .collect();

        let balance = Value::coalesce(utxos.values().map(|u| &u.value))?;

        let withdrawable_rewards = reward_accounts
            .values()
            .try_fold(0u64, |acc, info| acc.checked_add(info.withdrawable_amount))
            .ok_or_else(|| ValueError::Overflow {
                unit: "withdrawable rewards".to_string(),
            })?;

        Ok(Self {
            seed,
            addresses: addresses.into_values().collect(),
            reward_accounts: reward_accounts.into_values().collect(),
            utxos: utxos.into_values().collect(),
            balance,
            withdrawable_rewards,
        })
    }

    /// The address discovery started from.
    pub fn seed(&self) -> &Address {
        &self.seed
    }

    pub fn addresses(&self) -> &[AddressInfo] {
        &self.addresses
    }

    pub fn reward_accounts(&self) -> &[RewardAccountInfo] {
        &self.reward_accounts
    }

    /// Deduplicated UTXOs across the whole cluster, ordered by reference.
    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    /// Sum of every UTXO value in the cluster.
    pub fn balance(&self) -> &Value {
        &self.balance
    }

    /// Sum of withdrawable rewards over the known reward accounts.
    pub fn withdrawable_rewards(&self) -> u64 {
        self.withdrawable_rewards
    }

    pub fn contains_address(&self, address: &Address) -> bool {
        self.addresses
            .binary_search_by(|info| info.address.cmp(address))
            .is_ok()
    }

    /// Address set of the cluster.
    pub fn address_set(&self) -> BTreeSet<&Address> {
        self.addresses.iter().map(|info| &info.address).collect()
    }

    /// How the cluster's funds are delegated.
    pub fn delegation(&self) -> DelegationSummary {
        DelegationSummary::from_wallet(self)
    }
}

// ---------------------------------------------------------------------------
// Delegation
// ---------------------------------------------------------------------------

/// Stake attributed to one pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolDelegation {
    pub pool_id: String,
    /// Lovelace controlled by reward accounts delegating to this pool.
    pub staked_amount: u64,
    /// This pool's share of all delegated stake, 0-100.
    pub share_percentage: f64,
}

/// Delegation state of a cluster.
///
/// `total_balance` is the UTXO balance plus withdrawable rewards, which is
/// what the owner could move today. Percentages are for display only; the
/// amounts are exact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelegationSummary {
    pub total_balance: u64,
    pub staked_amount: u64,
    /// `staked_amount / total_balance * 100`, or 0 for an empty wallet.
    pub staked_percentage: f64,
    /// One entry per pool, ordered by pool id.
    pub pools: Vec<PoolDelegation>,
}

impl DelegationSummary {
    fn from_wallet(wallet: &ClusteredWallet) -> Self {
        let total_balance = wallet
            .balance
            .lovelace
            .saturating_add(wallet.withdrawable_rewards);

        let mut per_pool: BTreeMap<&str, u64> = BTreeMap::new();
        for info in &wallet.reward_accounts {
            if let Some(pool) = info.pool_id.as_deref() {
                let entry = per_pool.entry(pool).or_insert(0);
                *entry = entry.saturating_add(info.controlled_amount);
            }
        }
        let staked_amount = per_pool
            .values()
            .fold(0u64, |acc, amount| acc.saturating_add(*amount));

        let pools = per_pool
            .into_iter()
            .map(|(pool_id, amount)| PoolDelegation {
                pool_id: pool_id.to_string(),
                staked_amount: amount,
                share_percentage: percentage(amount, staked_amount),
            })
            .collect();

        Self {
            total_balance,
            staked_amount,
            staked_percentage: percentage(staked_amount, total_balance),
            pools,
        }
    }

    /// `true` if no reward account in the cluster delegates anywhere.
    pub fn is_unstaked(&self) -> bool {
        self.pools.is_empty()
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
