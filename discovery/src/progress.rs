//! Progress reporting for long discovery runs.
//!
//! The engine pushes a [`ProgressEvent`] at every meaningful step. Sinks are
//! observers only: `notify` returns nothing, so a sink cannot fail or steer
//! the traversal, and it must not block.

use std::fmt;

use tracing::info;

use crate::types::{Address, PaymentCredential, StakeCredential};

/// A step of a discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started {
        seed: Address,
    },
    LookingUpRewardAccounts {
        address: Address,
    },
    /// Addresses found under a reward account. `new_addresses` counts the
    /// ones not seen before.
    AddressesFound {
        stake: StakeCredential,
        found: usize,
        new_addresses: usize,
    },
    /// Addresses found holding funds under a payment key.
    PaymentSiblingsFound {
        payment: PaymentCredential,
        found: usize,
        new_addresses: usize,
    },
    FetchingDetails {
        addresses: usize,
        reward_accounts: usize,
    },
    Completed {
        addresses: usize,
        reward_accounts: usize,
        utxos: usize,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Started { seed } => write!(f, "Starting discovery from {seed}"),
            ProgressEvent::LookingUpRewardAccounts { address } => {
                write!(f, "Looking up reward accounts for {address}")
            }
            ProgressEvent::AddressesFound {
                stake,
                found,
                new_addresses,
            } => write!(
                f,
                "Searched addresses of {stake}: {found} found, {new_addresses} new"
            ),
            ProgressEvent::PaymentSiblingsFound {
                payment,
                found,
                new_addresses,
            } => write!(
                f,
                "Searched holders of {payment}: {found} found, {new_addresses} new"
            ),
            ProgressEvent::FetchingDetails {
                addresses,
                reward_accounts,
            } => write!(
                f,
                "Fetching UTXOs for {addresses} addresses and details for {reward_accounts} reward accounts"
            ),
            ProgressEvent::Completed {
                addresses,
                reward_accounts,
                utxos,
            } => write!(
                f,
                "Discovery complete: {addresses} addresses, {reward_accounts} reward accounts, {utxos} UTXOs"
            ),
        }
    }
}

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn notify(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn notify(&self, _event: &ProgressEvent) {}
}

/// Logs every event at `info` under the `stakelink::progress` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn notify(&self, event: &ProgressEvent) {
        info!(target: "stakelink::progress", "{}", event);
    }
}
