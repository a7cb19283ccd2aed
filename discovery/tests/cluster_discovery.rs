//! Integration tests for the discovery engine.
//!
//! Every test drives `ClusterDiscovery` against an `InMemorySource` (or a
//! thin wrapper around one) so the graph the engine walks is fully known.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use common::*;
use stakelink_discovery::{
    discover, resolve_payment_credential, Address, ClusterDiscovery, DataSource, DiscoveryConfig,
    DiscoveryError, InMemorySource, PaymentCredential, ProgressEvent, RewardAccountInfo,
    SourceError, StakeCredential, TransactionRef, Utxo, Value,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn addresses_of(wallet: &stakelink_discovery::ClusteredWallet) -> BTreeSet<Address> {
    wallet.address_set().into_iter().cloned().collect()
}

fn stakes_of(wallet: &stakelink_discovery::ClusteredWallet) -> BTreeSet<StakeCredential> {
    wallet
        .reward_accounts()
        .iter()
        .map(|info| info.stake_credential.clone())
        .collect()
}

/// Wraps a source and delays every lookup.
struct SlowSource {
    inner: InMemorySource,
    delay: Duration,
}

#[async_trait]
impl DataSource for SlowSource {
    fn network_id(&self) -> u8 {
        self.inner.network_id()
    }

    async fn reward_accounts_for(
        &self,
        address: &Address,
    ) -> Result<Vec<StakeCredential>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.reward_accounts_for(address).await
    }

    async fn reward_account_info(
        &self,
        stake: &StakeCredential,
    ) -> Result<Option<RewardAccountInfo>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.reward_account_info(stake).await
    }

    async fn addresses_for(&self, stake: &StakeCredential) -> Result<Vec<Address>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.addresses_for(stake).await
    }

    async fn addresses_for_payment(
        &self,
        payment: &PaymentCredential,
    ) -> Result<Vec<Address>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.addresses_for_payment(payment).await
    }

    async fn utxos_for(&self, address: &Address) -> Result<Vec<Utxo>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.utxos_for(address).await
    }

    async fn transactions_for(
        &self,
        address: &Address,
    ) -> Result<Vec<TransactionRef>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.transactions_for(address).await
    }
}

/// Three reward accounts chained through shared addresses, with a branch
/// that loops back to the seed.
fn chain_source() -> (Address, InMemorySource, BTreeSet<Address>) {
    let a = base_address(0x10, 0xB1);
    let b = base_address(0x11, 0xB1);
    let c = base_address(0x11, 0xB2);
    let d = base_address(0x12, 0xB2);
    let e = base_address(0x13, 0xB3);
    let outsider = base_address(0x14, 0xB4);

    let source = InMemorySource::new(MAINNET)
        .link(a.clone(), stake_key(0xB1))
        .link(b.clone(), stake_key(0xB1))
        // b and c share a payment key; the indexer reports both stake keys for b
        .with_reward_accounts(b.clone(), [stake_key(0xB2)])
        .link(c.clone(), stake_key(0xB2))
        .link(d.clone(), stake_key(0xB2))
        .with_reward_accounts(d.clone(), [stake_key(0xB3)])
        .link(e.clone(), stake_key(0xB3))
        .with_addresses(stake_key(0xB3), [a.clone()])
        .link(outsider.clone(), stake_key(0xB4))
        .with_utxo(utxo("c0", 0, &a, 10))
        .with_utxo(utxo("c1", 0, &b, 20))
        .with_utxo(utxo("c2", 1, &c, 30))
        .with_utxo(utxo("c3", 0, &d, 40))
        .with_utxo(utxo("c4", 2, &e, 50))
        .with_utxo(utxo("c5", 0, &outsider, 1_000_000))
        .with_reward_info(reward_info(&stake_key(0xB1), 30, 1, Some("P1")))
        .with_reward_info(reward_info(&stake_key(0xB2), 70, 2, Some("P2")))
        .with_reward_info(reward_info(&stake_key(0xB3), 50, 3, None));

    let expected = [a.clone(), b, c, d, e].into_iter().collect();
    (a, source, expected)
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_two_addresses_one_reward_account() {
    let s = scenario();

    let wallet = ClusterDiscovery::new(&s.source)
        .discover(&s.seed)
        .await
        .unwrap();

    assert_eq!(wallet.seed(), &s.seed);
    assert_eq!(
        addresses_of(&wallet),
        [s.seed.clone(), s.sibling.clone()].into_iter().collect()
    );
    assert_eq!(stakes_of(&wallet), [s.stake.clone()].into_iter().collect());
    assert_eq!(wallet.balance().lovelace, 1000);
    assert_eq!(wallet.withdrawable_rewards(), 50);
    assert_eq!(wallet.utxos().len(), 2);

    let delegation = wallet.delegation();
    assert_eq!(delegation.total_balance, 1050);
    assert_eq!(delegation.staked_amount, 1000);
    assert!((delegation.staked_percentage - 1000.0 / 1050.0 * 100.0).abs() < 1e-9);
    assert_eq!(delegation.pools.len(), 1);
    assert_eq!(delegation.pools[0].pool_id, "P1");
    assert!((delegation.pools[0].share_percentage - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn scenario_resolves_credentials_locally() {
    let s = scenario();
    let wallet = discover(&s.seed, &s.source, None).await.unwrap();

    for info in wallet.addresses() {
        assert!(info.payment_credential.is_some());
        assert_eq!(info.stake_credential.as_ref(), Some(&s.stake));
    }
    let seed_info = wallet
        .addresses()
        .iter()
        .find(|info| info.address == s.seed)
        .unwrap();
    assert_eq!(seed_info.value, Value::from_lovelace(600));
}

#[tokio::test]
async fn every_entity_is_queried_once() {
    let s = scenario();
    ClusterDiscovery::new(&s.source)
        .discover(&s.seed)
        .await
        .unwrap();

    let calls = s.source.call_counts();
    assert_eq!(calls.reward_accounts_for, 2);
    assert_eq!(calls.addresses_for, 1);
    assert_eq!(calls.addresses_for_payment, 2);
    assert_eq!(calls.utxos_for, 2);
    assert_eq!(calls.reward_account_info, 1);
    assert_eq!(calls.transactions_for, 0);
}

// ---------------------------------------------------------------------------
// Graph shape
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cycles_terminate_with_each_address_once() {
    let a = base_address(0x20, 0xC1);
    let b = base_address(0x21, 0xC2);
    let k1 = stake_key(0xC1);
    let k2 = stake_key(0xC2);

    let source = InMemorySource::new(MAINNET)
        .with_reward_accounts(a.clone(), [k1.clone()])
        .with_addresses(k1.clone(), [b.clone()])
        .with_reward_accounts(b.clone(), [k2.clone()])
        .with_addresses(k2.clone(), [a.clone()]);

    let wallet = ClusterDiscovery::new(&source).discover(&a).await.unwrap();

    assert_eq!(wallet.addresses().len(), 2);
    assert!(wallet.contains_address(&a));
    assert!(wallet.contains_address(&b));
    assert_eq!(source.call_counts().reward_accounts_for, 2);
    assert_eq!(source.call_counts().addresses_for, 2);
}

#[tokio::test]
async fn transitive_links_reach_every_address() {
    let (seed, source, expected) = chain_source();

    let wallet = ClusterDiscovery::new(&source).discover(&seed).await.unwrap();

    assert_eq!(addresses_of(&wallet), expected);
    assert_eq!(wallet.reward_accounts().len(), 3);
    assert_eq!(wallet.balance().lovelace, 150);
    assert_eq!(wallet.withdrawable_rewards(), 6);

    let delegation = wallet.delegation();
    assert_eq!(delegation.staked_amount, 100);
    assert_eq!(delegation.pools.len(), 2);
    assert!((delegation.pools[1].share_percentage - 70.0).abs() < 1e-9);
}

#[tokio::test]
async fn utxos_reachable_through_two_paths_are_counted_once() {
    let a = base_address(0x30, 0xD1);
    let b = base_address(0x31, 0xD2);
    let k1 = stake_key(0xD1);
    let k2 = stake_key(0xD2);

    let source = InMemorySource::new(MAINNET)
        .link(a.clone(), k1.clone())
        .link(a.clone(), k2.clone())
        .link(b.clone(), k2.clone())
        .with_utxo(utxo("dd", 0, &a, 700))
        .with_utxo(utxo("dd", 1, &b, 300))
        // same output reported again under b by an inconsistent indexer
        .with_utxo(Utxo::new("dd", 0, b.clone(), Value::from_lovelace(700)));

    let wallet = ClusterDiscovery::new(&source).discover(&a).await.unwrap();

    let refs: BTreeSet<_> = wallet.utxos().iter().map(Utxo::reference).collect();
    assert_eq!(refs.len(), wallet.utxos().len());
    assert_eq!(wallet.utxos().len(), 2);
    assert_eq!(wallet.balance().lovelace, 1000);
}

#[tokio::test]
async fn balance_equals_sum_of_deduplicated_utxos() {
    let a = base_address(0x40, 0xE1);
    let b = base_address(0x41, 0xE1);
    let k = stake_key(0xE1);
    let token = "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a76e7574636f696e";

    let source = InMemorySource::new(MAINNET)
        .link(a.clone(), k.clone())
        .link(b.clone(), k.clone())
        .with_utxo(Utxo::new(
            "e0",
            0,
            a.clone(),
            Value::from_lovelace(2_000_000).with_asset(token, 5).unwrap(),
        ))
        .with_utxo(Utxo::new(
            "e1",
            3,
            b.clone(),
            Value::from_lovelace(1_500_000).with_asset(token, 7).unwrap(),
        ))
        .with_utxo(utxo("e2", 0, &b, 1));

    let wallet = ClusterDiscovery::new(&source).discover(&a).await.unwrap();

    let recomputed = Value::coalesce(wallet.utxos().iter().map(|u| &u.value)).unwrap();
    assert_eq!(wallet.balance(), &recomputed);
    assert_eq!(wallet.balance().lovelace, 3_500_001);
    assert_eq!(wallet.balance().quantity_of(token), 12);

    let per_address = Value::coalesce(wallet.addresses().iter().map(|info| &info.value)).unwrap();
    assert_eq!(per_address, recomputed);
}

#[tokio::test]
async fn unstaked_address_contributes_funds_but_no_reward_account() {
    let seed = base_address(0x50, 0xF1);
    let enterprise = enterprise_address(0x50);
    let k = stake_key(0xF1);

    let source = InMemorySource::new(MAINNET)
        .link(seed.clone(), k.clone())
        .with_addresses(k.clone(), [enterprise.clone()])
        .with_utxo(utxo("f0", 0, &seed, 100))
        .with_utxo(utxo("f1", 0, &enterprise, 900))
        .with_reward_info(reward_info(&k, 100, 0, None));

    let wallet = ClusterDiscovery::new(&source).discover(&seed).await.unwrap();

    assert!(wallet.contains_address(&enterprise));
    assert_eq!(wallet.balance().lovelace, 1000);
    assert_eq!(wallet.reward_accounts().len(), 1);

    let info = wallet
        .addresses()
        .iter()
        .find(|info| info.address == enterprise)
        .unwrap();
    assert!(info.payment_credential.is_some());
    assert!(info.stake_credential.is_none());
    assert!(wallet.delegation().is_unstaked());
}

#[tokio::test]
async fn enterprise_holder_of_the_seed_payment_key_joins_the_cluster() {
    let seed = base_address(0x52, 0xF2);
    let change = enterprise_address(0x52);
    let k = stake_key(0xF2);

    // nothing links `change` to k; only the shared payment key does
    let source = InMemorySource::new(MAINNET)
        .link(seed.clone(), k.clone())
        .with_utxo(utxo("f3", 0, &seed, 600))
        .with_utxo(utxo("f4", 0, &change, 900))
        .with_reward_info(reward_info(&k, 600, 0, Some("P1")));

    let wallet = ClusterDiscovery::new(&source).discover(&seed).await.unwrap();

    assert!(wallet.contains_address(&change));
    assert_eq!(wallet.addresses().len(), 2);
    assert_eq!(wallet.balance().lovelace, 1500);
    assert_eq!(wallet.reward_accounts().len(), 1);
    // both addresses share one key, searched once
    assert_eq!(source.call_counts().addresses_for_payment, 1);
}

#[tokio::test]
async fn payment_key_siblings_bring_their_own_reward_accounts() {
    let seed = base_address(0x53, 0xF3);
    let change = base_address(0x53, 0xF4);
    let far = base_address(0x54, 0xF4);
    let (k3, k4) = (stake_key(0xF3), stake_key(0xF4));

    let source = InMemorySource::new(MAINNET)
        .link(seed.clone(), k3.clone())
        .link(change.clone(), k4.clone())
        .link(far.clone(), k4.clone())
        .with_utxo(utxo("f5", 0, &seed, 1))
        .with_utxo(utxo("f6", 0, &change, 2))
        .with_utxo(utxo("f7", 0, &far, 4))
        .with_reward_info(reward_info(&k3, 1, 0, None))
        .with_reward_info(reward_info(&k4, 6, 0, None));

    let wallet = ClusterDiscovery::new(&source).discover(&seed).await.unwrap();

    assert_eq!(
        addresses_of(&wallet),
        [seed, change, far].into_iter().collect()
    );
    assert_eq!(stakes_of(&wallet), [k3, k4].into_iter().collect());
    assert_eq!(wallet.balance().lovelace, 7);
}

#[tokio::test]
async fn enterprise_seed_is_a_cluster_of_one() {
    let seed = enterprise_address(0x51);
    let source = InMemorySource::new(MAINNET).with_utxo(utxo("f2", 0, &seed, 42));

    let wallet = ClusterDiscovery::new(&source).discover(&seed).await.unwrap();

    assert_eq!(wallet.addresses().len(), 1);
    assert!(wallet.reward_accounts().is_empty());
    assert_eq!(wallet.balance().lovelace, 42);
    assert_eq!(wallet.withdrawable_rewards(), 0);
    assert_eq!(wallet.delegation().staked_percentage, 0.0);
}

#[tokio::test]
async fn unknown_reward_account_is_dropped_but_its_addresses_stay() {
    let s = scenario();
    let ghost = stake_key(0xAF);
    let stray = base_address(0x03, 0xAF);

    let source = s
        .source
        .with_reward_accounts(s.seed.clone(), [ghost.clone()])
        .with_addresses(ghost.clone(), [stray.clone()])
        .with_utxo(utxo("cc00", 0, &stray, 5));

    let wallet = ClusterDiscovery::new(&source).discover(&s.seed).await.unwrap();

    assert!(wallet.contains_address(&stray));
    assert_eq!(stakes_of(&wallet), [s.stake.clone()].into_iter().collect());
    assert_eq!(wallet.withdrawable_rewards(), 50);
    assert_eq!(wallet.balance().lovelace, 1005);
    assert_eq!(source.call_counts().reward_account_info, 2);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_runs_are_identical() {
    let (seed, source, _) = chain_source();
    let engine = ClusterDiscovery::new(&source);

    let first = engine.discover(&seed).await.unwrap();
    let second = engine.discover(&seed).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn result_does_not_depend_on_concurrency() {
    let (seed, source, expected) = chain_source();

    let sequential = ClusterDiscovery::new(&source).discover(&seed).await.unwrap();
    assert_eq!(addresses_of(&sequential), expected);

    for width in [0, 2, 3, 16] {
        let wallet = ClusterDiscovery::new(&source)
            .with_config(DiscoveryConfig {
                max_concurrency: width,
                ..DiscoveryConfig::default()
            })
            .discover(&seed)
            .await
            .unwrap();
        assert_eq!(wallet, sequential, "max_concurrency = {width}");
    }
}

#[tokio::test]
async fn upper_case_seed_is_one_member_with_its_canonical_form() {
    let s = scenario();
    let shouted = Address::new(s.seed.as_str().to_ascii_uppercase());

    let wallet = ClusterDiscovery::new(&s.source)
        .discover(&shouted)
        .await
        .unwrap();

    assert_eq!(wallet.seed(), &s.seed);
    assert_eq!(
        addresses_of(&wallet),
        [s.seed.clone(), s.sibling.clone()].into_iter().collect()
    );
    assert_eq!(wallet.balance().lovelace, 1000);
}

#[tokio::test]
async fn any_member_as_seed_finds_the_same_cluster() {
    let s = scenario();

    let from_seed = discover(&s.seed, &s.source, None).await.unwrap();
    let from_sibling = discover(&s.sibling, &s.source, None).await.unwrap();

    assert_eq!(addresses_of(&from_seed), addresses_of(&from_sibling));
    assert_eq!(from_seed.balance(), from_sibling.balance());
    assert_eq!(from_sibling.seed(), &s.sibling);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_seed_fails_without_touching_the_source() {
    let source = InMemorySource::new(MAINNET);

    let err = ClusterDiscovery::new(&source)
        .discover(&Address::from("DdzFFzCqrhsfYMUNRxtQ5NNKbWVw3ZJBNcMLLZSoqmD5trHHPBDwsjonoBgw1K6e8Qi8bEMs5Y62yZfReEVSFFMncFYDUHUTMM436KjQ"))
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::MalformedAddress(_)));
    assert_eq!(source.call_counts().total(), 0);
}

#[tokio::test]
async fn unavailable_provider_aborts_discovery() {
    let s = scenario();
    let source = s.source.unavailable("project id rejected");

    let err = ClusterDiscovery::new(&source)
        .discover(&s.seed)
        .await
        .unwrap_err();

    assert!(
        matches!(err, DiscoveryError::ProviderUnavailable(ref reason) if reason == "project id rejected")
    );
    assert_eq!(source.call_counts().total(), 1);
}

#[tokio::test]
async fn cancelled_before_start() {
    let s = scenario();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let err = ClusterDiscovery::new(&s.source)
        .with_shutdown(rx)
        .discover(&s.seed)
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::Cancelled));
    assert_eq!(s.source.call_counts().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_during_a_slow_call() {
    let s = scenario();
    let slow = SlowSource {
        inner: s.source,
        delay: Duration::from_secs(60),
    };
    let (tx, rx) = watch::channel(false);
    let engine = ClusterDiscovery::new(&slow).with_shutdown(rx);

    let (result, _) = tokio::join!(engine.discover(&s.seed), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
    });

    assert!(matches!(result, Err(DiscoveryError::Cancelled)));
}

#[tokio::test]
async fn dropped_shutdown_sender_does_not_cancel() {
    let s = scenario();
    let (tx, rx) = watch::channel(false);
    drop(tx);

    let wallet = ClusterDiscovery::new(&s.source)
        .with_shutdown(rx)
        .discover(&s.seed)
        .await
        .unwrap();
    assert_eq!(wallet.addresses().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_call_hits_the_call_timeout() {
    let s = scenario();
    let slow = SlowSource {
        inner: s.source,
        delay: Duration::from_secs(5),
    };

    let err = ClusterDiscovery::new(&slow)
        .with_config(DiscoveryConfig {
            call_timeout: Some(Duration::from_secs(1)),
            ..DiscoveryConfig::default()
        })
        .discover(&s.seed)
        .await
        .unwrap_err();

    match err {
        DiscoveryError::Timeout { operation, after } => {
            assert_eq!(operation, "reward_accounts_for");
            assert_eq!(after, Duration::from_secs(1));
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn slow_run_hits_the_overall_timeout() {
    let s = scenario();
    let slow = SlowSource {
        inner: s.source,
        delay: Duration::from_secs(5),
    };

    let err = ClusterDiscovery::new(&slow)
        .with_config(DiscoveryConfig {
            call_timeout: None,
            overall_timeout: Some(Duration::from_secs(12)),
            ..DiscoveryConfig::default()
        })
        .discover(&s.seed)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DiscoveryError::Timeout {
            operation: "discovery",
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_reports_each_step() {
    let s = scenario();
    let events = Mutex::new(Vec::new());
    let sink = |event: &ProgressEvent| events.lock().push(event.clone());

    ClusterDiscovery::new(&s.source)
        .with_progress(&sink)
        .discover(&s.seed)
        .await
        .unwrap();

    let events = events.into_inner();
    assert_eq!(
        events.first(),
        Some(&ProgressEvent::Started {
            seed: s.seed.clone()
        })
    );
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Completed {
            addresses: 2,
            reward_accounts: 1,
            utxos: 2,
        })
    );

    let lookups = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::LookingUpRewardAccounts { .. }))
        .count();
    assert_eq!(lookups, 2);

    assert!(events.contains(&ProgressEvent::AddressesFound {
        stake: s.stake.clone(),
        found: 2,
        new_addresses: 1,
    }));
    assert!(events.contains(&ProgressEvent::PaymentSiblingsFound {
        payment: resolve_payment_credential(&s.seed).unwrap(),
        found: 1,
        new_addresses: 0,
    }));
    assert!(events.contains(&ProgressEvent::FetchingDetails {
        addresses: 2,
        reward_accounts: 1,
    }));
}
