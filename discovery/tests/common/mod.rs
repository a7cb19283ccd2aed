//! Shared fixtures for the integration tests.
//!
//! Addresses are built from repeated-byte hashes so every helper call with
//! the same arguments yields the same bech32 text.

#![allow(dead_code)]

use stakelink_discovery::credential::{CredentialPart, ShelleyAddress};
use stakelink_discovery::{
    Address, InMemorySource, RewardAccountInfo, StakeCredential, Utxo, Value,
};

pub const MAINNET: u8 = 1;

pub fn key(byte: u8) -> CredentialPart {
    CredentialPart::key([byte; 28])
}

/// Base address with payment key `payment` and stake key `stake`.
pub fn base_address(payment: u8, stake: u8) -> Address {
    Address::new(ShelleyAddress::base(MAINNET, key(payment), key(stake)).to_bech32())
}

/// Enterprise address: payment key only, no reward account.
pub fn enterprise_address(payment: u8) -> Address {
    Address::new(ShelleyAddress::enterprise(MAINNET, key(payment)).to_bech32())
}

/// Reward account of stake key `stake`.
pub fn stake_key(stake: u8) -> StakeCredential {
    StakeCredential::new(ShelleyAddress::reward(MAINNET, key(stake)).to_bech32())
}

pub fn utxo(tx_hash: &str, index: u32, address: &Address, lovelace: u64) -> Utxo {
    Utxo::new(tx_hash, index, address.clone(), Value::from_lovelace(lovelace))
}

pub fn reward_info(
    stake: &StakeCredential,
    controlled: u64,
    withdrawable: u64,
    pool: Option<&str>,
) -> RewardAccountInfo {
    RewardAccountInfo {
        stake_credential: stake.clone(),
        controlled_amount: controlled,
        withdrawable_amount: withdrawable,
        pool_id: pool.map(str::to_string),
        active: pool.is_some(),
    }
}

/// Seed `S` and sibling `T` under stake key `K1`, delegated to `P1`.
///
/// | entity | data                                   |
/// |--------|----------------------------------------|
/// | S      | one UTXO of 600 lovelace               |
/// | T      | one UTXO of 400 lovelace               |
/// | K1     | controlled 1000, withdrawable 50, P1   |
pub struct Scenario {
    pub seed: Address,
    pub sibling: Address,
    pub stake: StakeCredential,
    pub source: InMemorySource,
}

pub fn scenario() -> Scenario {
    let seed = base_address(0x01, 0xA1);
    let sibling = base_address(0x02, 0xA1);
    let stake = stake_key(0xA1);

    let source = InMemorySource::new(MAINNET)
        .link(seed.clone(), stake.clone())
        .link(sibling.clone(), stake.clone())
        .with_utxo(utxo("aa00", 0, &seed, 600))
        .with_utxo(utxo("bb00", 0, &sibling, 400))
        .with_reward_info(reward_info(&stake, 1000, 50, Some("P1")));

    Scenario {
        seed,
        sibling,
        stake,
        source,
    }
}
