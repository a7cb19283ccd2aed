//! # In-Memory Data Source
//!
//! A fully deterministic [`DataSource`] backed by hash maps. Tests and
//! benches build one with the `with_*` methods; the CLI can load one from a
//! JSON [`Fixture`] to replay a cluster offline.
//!
//! Reward-account links are directional on purpose:
//! [`with_reward_accounts`](InMemorySource::with_reward_accounts) controls
//! what `reward_accounts_for` returns and
//! [`with_addresses`](InMemorySource::with_addresses) controls what
//! `addresses_for` returns. [`link`](InMemorySource::link) sets both sides,
//! which is what a real indexer reports.
//!
//! Payment-key siblings follow the UTXO set: every UTXO added with
//! [`with_utxo`](InMemorySource::with_utxo) indexes its holder under the
//! holder's payment key, the way an indexer lists `/addresses/{addr_vkh}/utxos`.
//! [`with_payment_addresses`](InMemorySource::with_payment_addresses) adds
//! holders without funds.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::credential::resolve_payment_credential;
use crate::source::{DataSource, SourceError};
use crate::types::{
    Address, PaymentCredential, RewardAccountInfo, StakeCredential, TransactionRef, Utxo,
};

/// Number of calls served per lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub reward_accounts_for: usize,
    pub reward_account_info: usize,
    pub addresses_for: usize,
    pub addresses_for_payment: usize,
    pub utxos_for: usize,
    pub transactions_for: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.reward_accounts_for
            + self.reward_account_info
            + self.addresses_for
            + self.addresses_for_payment
            + self.utxos_for
            + self.transactions_for
    }
}

/// Hash-map backed data source.
#[derive(Debug, Default)]
pub struct InMemorySource {
    network_id: u8,
    reward_accounts: HashMap<Address, BTreeSet<StakeCredential>>,
    addresses: HashMap<StakeCredential, BTreeSet<Address>>,
    payment_addresses: HashMap<PaymentCredential, BTreeSet<Address>>,
    reward_infos: HashMap<StakeCredential, RewardAccountInfo>,
    utxos: HashMap<Address, Vec<Utxo>>,
    transactions: HashMap<Address, Vec<TransactionRef>>,
    unavailable: Option<String>,
    calls: Mutex<CallCounts>,
}

impl InMemorySource {
    pub fn new(network_id: u8) -> Self {
        Self {
            network_id,
            ..Self::default()
        }
    }

    /// Links an address and a reward account in both directions.
    pub fn link(mut self, address: impl Into<Address>, stake: impl Into<StakeCredential>) -> Self {
        let address = address.into();
        let stake = stake.into();
        self.reward_accounts
            .entry(address.clone())
            .or_default()
            .insert(stake.clone());
        self.addresses.entry(stake).or_default().insert(address);
        self
    }

    /// Sets what `reward_accounts_for(address)` returns.
    pub fn with_reward_accounts<I, S>(mut self, address: impl Into<Address>, stakes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StakeCredential>,
    {
        self.reward_accounts
            .entry(address.into())
            .or_default()
            .extend(stakes.into_iter().map(Into::into));
        self
    }

    /// Sets what `addresses_for(stake)` returns.
    pub fn with_addresses<I, A>(mut self, stake: impl Into<StakeCredential>, addresses: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Address>,
    {
        self.addresses
            .entry(stake.into())
            .or_default()
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Adds addresses to what `addresses_for_payment(payment)` returns.
    pub fn with_payment_addresses<I, A>(
        mut self,
        payment: impl Into<PaymentCredential>,
        addresses: I,
    ) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Address>,
    {
        self.payment_addresses
            .entry(payment.into())
            .or_default()
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    pub fn with_reward_info(mut self, info: RewardAccountInfo) -> Self {
        self.reward_infos
            .insert(info.stake_credential.clone(), info);
        self
    }

    /// Adds a UTXO at its own address and indexes the address under its
    /// payment key, if it has one.
    pub fn with_utxo(mut self, utxo: Utxo) -> Self {
        if let Ok(payment) = resolve_payment_credential(&utxo.address) {
            self.payment_addresses
                .entry(payment)
                .or_default()
                .insert(utxo.address.clone());
        }
        self.utxos.entry(utxo.address.clone()).or_default().push(utxo);
        self
    }

    pub fn with_transaction(mut self, address: impl Into<Address>, tx: TransactionRef) -> Self {
        self.transactions.entry(address.into()).or_default().push(tx);
        self
    }

    /// Makes every lookup fail with [`SourceError::Unavailable`].
    pub fn unavailable(mut self, reason: impl Into<String>) -> Self {
        self.unavailable = Some(reason.into());
        self
    }

    /// Builds a source from a fixture.
    pub fn from_fixture(fixture: Fixture) -> Self {
        let mut source = Self::new(fixture.network_id);
        for link in fixture.links {
            source = source.link(link.address, link.stake);
        }
        for utxo in fixture.utxos {
            source = source.with_utxo(utxo);
        }
        for info in fixture.reward_accounts {
            source = source.with_reward_info(info);
        }
        for entry in fixture.transactions {
            source = source.with_transaction(entry.address, entry.transaction);
        }
        source
    }

    /// Snapshot of how many calls each lookup has served.
    pub fn call_counts(&self) -> CallCounts {
        *self.calls.lock()
    }

    fn check_available(&self) -> Result<(), SourceError> {
        match &self.unavailable {
            Some(reason) => Err(SourceError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    fn network_id(&self) -> u8 {
        self.network_id
    }

    async fn reward_accounts_for(
        &self,
        address: &Address,
    ) -> Result<Vec<StakeCredential>, SourceError> {
        self.calls.lock().reward_accounts_for += 1;
        self.check_available()?;
        Ok(self
            .reward_accounts
            .get(address)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn reward_account_info(
        &self,
        stake: &StakeCredential,
    ) -> Result<Option<RewardAccountInfo>, SourceError> {
        self.calls.lock().reward_account_info += 1;
        self.check_available()?;
        Ok(self.reward_infos.get(stake).cloned())
    }

    async fn addresses_for(&self, stake: &StakeCredential) -> Result<Vec<Address>, SourceError> {
        self.calls.lock().addresses_for += 1;
        self.check_available()?;
        Ok(self
            .addresses
            .get(stake)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn addresses_for_payment(
        &self,
        payment: &PaymentCredential,
    ) -> Result<Vec<Address>, SourceError> {
        self.calls.lock().addresses_for_payment += 1;
        self.check_available()?;
        Ok(self
            .payment_addresses
            .get(payment)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn utxos_for(&self, address: &Address) -> Result<Vec<Utxo>, SourceError> {
        self.calls.lock().utxos_for += 1;
        self.check_available()?;
        Ok(self.utxos.get(address).cloned().unwrap_or_default())
    }

    async fn transactions_for(
        &self,
        address: &Address,
    ) -> Result<Vec<TransactionRef>, SourceError> {
        self.calls.lock().transactions_for += 1;
        self.check_available()?;
        Ok(self.transactions.get(address).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// Serializable snapshot of a chain slice, loadable with
/// [`InMemorySource::from_fixture`].
///
/// ```json
/// {
///   "network_id": 1,
///   "links": [{ "address": "addr1...", "stake": "stake1..." }],
///   "utxos": [{ "tx_hash": "ab..", "output_index": 0, "address": "addr1...",
///               "value": { "lovelace": 600 } }],
///   "reward_accounts": [{ "stake_credential": "stake1...", "controlled_amount": 1000,
///                         "withdrawable_amount": 50, "pool_id": "pool1...", "active": true }],
///   "transactions": []
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub network_id: u8,
    #[serde(default)]
    pub links: Vec<FixtureLink>,
    #[serde(default)]
    pub utxos: Vec<Utxo>,
    #[serde(default)]
    pub reward_accounts: Vec<RewardAccountInfo>,
    #[serde(default)]
    pub transactions: Vec<FixtureTransaction>,
}

impl Fixture {
    /// Parses a fixture from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// One address <-> reward account association.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureLink {
    pub address: Address,
    pub stake: StakeCredential,
}

/// A transaction listed under an address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureTransaction {
    pub address: Address,
    #[serde(flatten)]
    pub transaction: TransactionRef,
}
