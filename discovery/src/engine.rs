//! # Cluster Discovery Engine
//!
//! Walks the implicit "shares a credential" graph outward from one seed
//! address until nothing new turns up, then folds everything it found into
//! a [`ClusteredWallet`].
//!
//! ## Traversal
//!
//! ```text
//! frontier = [seed]
//! while frontier not empty:
//!     a = pop(frontier)                      skip if already expanded
//!     for k in reward_accounts_for(a):       skip if already expanded
//!         for b in addresses_for(k):
//!             cluster += b                   enqueue b if new
//!     p = payment_credential(a)              skip if none or already expanded
//!     for b in addresses_for_payment(p):
//!         cluster += b                       enqueue b if new
//! ```
//!
//! The graph is revealed lazily by the data source, may contain arbitrary
//! cycles, and is finite in practice. Every address, reward account and
//! payment key is expanded at most once, so the loop reaches a fixpoint and
//! the resulting cluster is the closure of the seed regardless of visiting
//! order.
//!
//! The seed is re-encoded in canonical lower-case bech32 before the walk,
//! so an upper-case seed and the provider's spelling of it are one member.
//!
//! ## Concurrency
//!
//! `max_concurrency` bounds how many data-source calls are in flight. With
//! the default of 1 the engine issues strictly one request at a time. With
//! more, each round takes up to `max_concurrency` frontier addresses and
//! resolves their reward accounts together, then searches all newly claimed
//! reward accounts together, then all newly claimed payment keys. The visited sets stay owned by the single
//! loop below; concurrent calls only hand results back to it, so the
//! outcome doesn't depend on completion order.
//!
//! ## Cancellation & timeouts
//!
//! A `watch::Receiver<bool>` shutdown signal is checked at every frontier
//! round and raced against every data-source call. Each call is bounded by
//! `call_timeout`, the whole run by `overall_timeout`. The engine never
//! retries; that is the data source's job.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{network_name, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_CONCURRENCY};
use crate::credential::{
    resolve_payment_credential, resolve_stake_credential, validate_address, CredentialError,
};
use crate::progress::{NoProgress, ProgressEvent, ProgressSink};
use crate::source::{DataSource, SourceError};
use crate::types::{
    Address, AddressInfo, ClusteredWallet, PaymentCredential, RewardAccountInfo, StakeCredential,
};
use crate::value::ValueError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a discovery run ends without a wallet.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The seed address could not be decoded.
    #[error("invalid seed address: {0}")]
    MalformedAddress(#[from] CredentialError),

    /// The data source cannot be used at all.
    #[error("data source unavailable: {0}")]
    ProviderUnavailable(String),

    /// A cluster total exceeded `u64::MAX`.
    #[error("cluster totals overflowed: {0}")]
    Overflow(#[from] ValueError),

    /// The shutdown signal fired.
    #[error("discovery cancelled")]
    Cancelled,

    /// A data-source call, or the whole run, exceeded its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The lookup (or `"discovery"` for the whole run) that ran out of time.
        operation: &'static str,
        /// The budget that was exceeded.
        after: Duration,
    },
}

impl From<SourceError> for DiscoveryError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(reason) => DiscoveryError::ProviderUnavailable(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// DiscoveryConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum data-source calls in flight. Values below 1 are treated as 1.
    pub max_concurrency: usize,

    /// Budget for a single data-source call. `None` waits forever.
    pub call_timeout: Option<Duration>,

    /// Budget for the whole run. `None` waits forever.
    pub overall_timeout: Option<Duration>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            overall_timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Traversal state
// ---------------------------------------------------------------------------

/// Everything one run knows about the graph. Lives for a single call to
/// [`ClusterDiscovery::discover`].
#[derive(Debug)]
struct Traversal {
    frontier: VecDeque<Address>,
    visited_addresses: HashSet<Address>,
    visited_reward_accounts: BTreeSet<StakeCredential>,
    visited_payment_credentials: BTreeSet<PaymentCredential>,
    cluster: BTreeSet<Address>,
}

impl Traversal {
    fn new(seed: Address) -> Self {
        let mut cluster = BTreeSet::new();
        cluster.insert(seed.clone());
        Self {
            frontier: VecDeque::from([seed]),
            visited_addresses: HashSet::new(),
            visited_reward_accounts: BTreeSet::new(),
            visited_payment_credentials: BTreeSet::new(),
            cluster,
        }
    }

    /// Pops up to `size` addresses that haven't been expanded yet and marks
    /// them expanded.
    fn next_batch(&mut self, size: usize) -> Vec<Address> {
        let mut batch = Vec::with_capacity(size);
        while batch.len() < size {
            let Some(address) = self.frontier.pop_front() else {
                break;
            };
            if self.visited_addresses.insert(address.clone()) {
                batch.push(address);
            }
        }
        batch
    }

    /// Claims a reward account for expansion. `false` if it was already claimed.
    fn claim_reward_account(&mut self, stake: &StakeCredential) -> bool {
        if self.visited_reward_accounts.contains(stake) {
            return false;
        }
        self.visited_reward_accounts.insert(stake.clone())
    }

    /// Claims the payment key of `address` for a sibling search. `None` for
    /// addresses without a key payment part and for keys already claimed.
    fn claim_payment_credential(&mut self, address: &Address) -> Option<PaymentCredential> {
        let payment = resolve_payment_credential(address).ok()?;
        self.visited_payment_credentials
            .insert(payment.clone())
            .then_some(payment)
    }

    /// Adds addresses to the cluster, queueing the new ones. Returns how
    /// many were new.
    fn collect_addresses(&mut self, found: Vec<Address>) -> usize {
        let mut new_addresses = 0;
        for address in found {
            if self.cluster.insert(address.clone()) {
                new_addresses += 1;
                self.frontier.push_back(address);
            }
        }
        new_addresses
    }
}

// ---------------------------------------------------------------------------
// ClusterDiscovery
// ---------------------------------------------------------------------------

/// Discovery engine bound to one data source.
///
/// ```no_run
/// # async fn demo(source: &stakelink_discovery::InMemorySource) {
/// use stakelink_discovery::{Address, ClusterDiscovery, TracingProgress};
///
/// let wallet = ClusterDiscovery::new(source)
///     .with_progress(&TracingProgress)
///     .discover(&Address::from("addr1..."))
///     .await;
/// # }
/// ```
pub struct ClusterDiscovery<'a, S: ?Sized> {
    source: &'a S,
    config: DiscoveryConfig,
    progress: &'a dyn ProgressSink,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a, S> ClusterDiscovery<'a, S>
where
    S: DataSource + ?Sized,
{
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            config: DiscoveryConfig::default(),
            progress: &NoProgress,
            shutdown: None,
        }
    }

    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Cancels the run once `true` is sent on the channel.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Discovers the cluster around `seed`.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::MalformedAddress`] if the seed doesn't decode.
    /// - [`DiscoveryError::ProviderUnavailable`] if the data source gives up.
    /// - [`DiscoveryError::Cancelled`] / [`DiscoveryError::Timeout`] when the
    ///   shutdown signal fires or a time budget runs out.
    /// - [`DiscoveryError::Overflow`] if a total exceeds `u64::MAX`.
    ///
    /// No partial wallet is returned on error.
    pub async fn discover(&self, seed: &Address) -> Result<ClusteredWallet, DiscoveryError> {
        match self.config.overall_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(seed))
                .await
                .map_err(|_| {
                    warn!(seed = %seed, ?limit, "discovery exceeded its overall timeout");
                    DiscoveryError::Timeout {
                        operation: "discovery",
                        after: limit,
                    }
                })?,
            None => self.run(seed).await,
        }
    }

    async fn run(&self, seed: &Address) -> Result<ClusteredWallet, DiscoveryError> {
        let seed = &Address::new(validate_address(seed)?.to_bech32());
        self.ensure_not_cancelled()?;

        let network_id = self.source.network_id();
        info!(
            seed = %seed,
            network = %network_name(network_id),
            concurrency = self.width(),
            "starting cluster discovery"
        );
        self.progress.notify(&ProgressEvent::Started { seed: seed.clone() });

        let traversal = self.expand(seed.clone()).await?;

        self.progress.notify(&ProgressEvent::FetchingDetails {
            addresses: traversal.cluster.len(),
            reward_accounts: traversal.visited_reward_accounts.len(),
        });
        let addresses = self
            .fetch_address_infos(&traversal.cluster, network_id)
            .await?;
        let reward_accounts = self
            .fetch_reward_infos(&traversal.visited_reward_accounts)
            .await?;

        let wallet = ClusteredWallet::new(seed.clone(), addresses, reward_accounts)?;

        info!(
            seed = %seed,
            addresses = wallet.addresses().len(),
            reward_accounts = wallet.reward_accounts().len(),
            utxos = wallet.utxos().len(),
            lovelace = wallet.balance().lovelace,
            "cluster discovery complete"
        );
        self.progress.notify(&ProgressEvent::Completed {
            addresses: wallet.addresses().len(),
            reward_accounts: wallet.reward_accounts().len(),
            utxos: wallet.utxos().len(),
        });

        Ok(wallet)
    }

    /// Runs the frontier loop to its fixpoint.
    async fn expand(&self, seed: Address) -> Result<Traversal, DiscoveryError> {
        let mut traversal = Traversal::new(seed);
        let width = self.width();

        loop {
            self.ensure_not_cancelled()?;

            let batch = traversal.next_batch(width);
            if batch.is_empty() {
                break;
            }
            let mut payments = Vec::new();
            for address in &batch {
                self.progress.notify(&ProgressEvent::LookingUpRewardAccounts {
                    address: address.clone(),
                });
                payments.extend(traversal.claim_payment_credential(address));
            }

            let lookups: Vec<(Address, Vec<StakeCredential>)> = stream::iter(batch)
                .map(move |address| async move {
                    let stakes = self
                        .call(
                            "reward_accounts_for",
                            self.source.reward_accounts_for(&address),
                        )
                        .await?;
                    Ok::<_, DiscoveryError>((address, stakes))
                })
                .buffered(width)
                .try_collect()
                .await?;

            let mut claimed = Vec::new();
            for (address, stakes) in lookups {
                debug!(address = %address, reward_accounts = stakes.len(), "reward accounts resolved");
                for stake in stakes {
                    if traversal.claim_reward_account(&stake) {
                        claimed.push(stake);
                    }
                }
            }

            let searches: Vec<(StakeCredential, Vec<Address>)> = stream::iter(claimed)
                .map(move |stake| async move {
                    let found = self
                        .call("addresses_for", self.source.addresses_for(&stake))
                        .await?;
                    Ok::<_, DiscoveryError>((stake, found))
                })
                .buffered(width)
                .try_collect()
                .await?;

            for (stake, found) in searches {
                let found_count = found.len();
                let new_addresses = traversal.collect_addresses(found);
                debug!(
                    stake = %stake,
                    found = found_count,
                    new = new_addresses,
                    frontier = traversal.frontier.len(),
                    "addresses collected"
                );
                self.progress.notify(&ProgressEvent::AddressesFound {
                    stake,
                    found: found_count,
                    new_addresses,
                });
            }

            let siblings: Vec<(PaymentCredential, Vec<Address>)> = stream::iter(payments)
                .map(move |payment| async move {
                    let found = self
                        .call(
                            "addresses_for_payment",
                            self.source.addresses_for_payment(&payment),
                        )
                        .await?;
                    Ok::<_, DiscoveryError>((payment, found))
                })
                .buffered(width)
                .try_collect()
                .await?;

            for (payment, found) in siblings {
                let found_count = found.len();
                let new_addresses = traversal.collect_addresses(found);
                debug!(
                    payment = %payment,
                    found = found_count,
                    new = new_addresses,
                    frontier = traversal.frontier.len(),
                    "payment key holders collected"
                );
                self.progress.notify(&ProgressEvent::PaymentSiblingsFound {
                    payment,
                    found: found_count,
                    new_addresses,
                });
            }
        }

        Ok(traversal)
    }

    async fn fetch_address_infos(
        &self,
        cluster: &BTreeSet<Address>,
        network_id: u8,
    ) -> Result<Vec<AddressInfo>, DiscoveryError> {
        stream::iter(cluster.iter())
            .map(move |address| async move {
                self.ensure_not_cancelled()?;
                let utxos = self
                    .call("utxos_for", self.source.utxos_for(address))
                    .await?;

                let payment = resolve_payment_credential(address)
                    .map_err(|e| debug!(address = %address, error = %e, "no payment credential"))
                    .ok();
                let stake = resolve_stake_credential(address, network_id)
                    .map_err(|e| debug!(address = %address, error = %e, "no stake credential"))
                    .ok()
                    .flatten();

                Ok::<_, DiscoveryError>(AddressInfo::new(address.clone(), payment, stake, utxos)?)
            })
            .buffered(self.width())
            .try_collect()
            .await
    }

    async fn fetch_reward_infos(
        &self,
        reward_accounts: &BTreeSet<StakeCredential>,
    ) -> Result<Vec<RewardAccountInfo>, DiscoveryError> {
        let infos: Vec<Option<RewardAccountInfo>> = stream::iter(reward_accounts.iter())
            .map(move |stake| async move {
                self.ensure_not_cancelled()?;
                let info = self
                    .call("reward_account_info", self.source.reward_account_info(stake))
                    .await?;
                if info.is_none() {
                    debug!(stake = %stake, "reward account unknown to the data source, dropping it");
                }
                Ok::<_, DiscoveryError>(info)
            })
            .buffered(self.width())
            .try_collect()
            .await?;

        Ok(infos.into_iter().flatten().collect())
    }

    /// Runs one data-source call under the call timeout and the shutdown signal.
    async fn call<T, F>(&self, operation: &'static str, request: F) -> Result<T, DiscoveryError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let bounded = async {
            match self.config.call_timeout {
                Some(limit) => tokio::time::timeout(limit, request)
                    .await
                    .map_err(|_| {
                        warn!(operation, ?limit, "data source call timed out");
                        DiscoveryError::Timeout {
                            operation,
                            after: limit,
                        }
                    })?
                    .map_err(DiscoveryError::from),
                None => request.await.map_err(DiscoveryError::from),
            }
        };

        match &self.shutdown {
            Some(shutdown) => {
                let mut shutdown = shutdown.clone();
                tokio::select! {
                    result = bounded => result,
                    _ = shutdown_requested(&mut shutdown) => {
                        info!(operation, "discovery cancelled during data source call");
                        Err(DiscoveryError::Cancelled)
                    }
                }
            }
            None => bounded.await,
        }
    }

    fn ensure_not_cancelled(&self) -> Result<(), DiscoveryError> {
        match &self.shutdown {
            Some(shutdown) if *shutdown.borrow() => {
                info!("discovery cancelled");
                Err(DiscoveryError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    fn width(&self) -> usize {
        self.config.max_concurrency.max(1)
    }
}

/// Resolves once `true` is observed on the channel. If the sender goes away
/// without signalling, never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Discovers the cluster around `seed` with default settings.
pub async fn discover<S>(
    seed: &Address,
    source: &S,
    progress: Option<&dyn ProgressSink>,
) -> Result<ClusteredWallet, DiscoveryError>
where
    S: DataSource + ?Sized,
{
    let mut engine = ClusterDiscovery::new(source);
    if let Some(progress) = progress {
        engine = engine.with_progress(progress);
    }
    engine.discover(seed).await
}
