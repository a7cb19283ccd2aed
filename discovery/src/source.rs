//! # Blockchain Data Source
//!
//! The discovery engine never talks to a chain indexer directly. It goes
//! through [`DataSource`], a narrow async interface with one method per
//! lookup it needs.
//!
//! ## Contract
//!
//! Lookups never fail because something doesn't exist. An unknown address,
//! a reward account that never touched the chain, a provider 404: all of
//! these come back as an empty list or `None`. Transient provider trouble
//! (rate limiting, 5xx, dropped connections) is retried inside the
//! implementation and, if it persists, downgraded the same way.
//!
//! The only error that crosses this boundary is
//! [`SourceError::Unavailable`]: the provider cannot be used at all (no
//! project id, credentials rejected). The engine aborts on it.
//!
//! The price of this contract is that "nothing there" and "provider was
//! broken" look the same to the engine. Implementations log the latter at
//! `warn` so it is at least visible.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    Address, PaymentCredential, RewardAccountInfo, StakeCredential, TransactionRef, Utxo,
};

/// Unrecoverable data-source failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The provider cannot be reached or refuses to serve us.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Lookups the discovery engine needs from a chain indexer.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Network tag used when deriving stake credentials.
    fn network_id(&self) -> u8;

    /// Reward accounts controlling funds at `address`. Empty when the
    /// address is unknown, unstaked or invalid.
    async fn reward_accounts_for(
        &self,
        address: &Address,
    ) -> Result<Vec<StakeCredential>, SourceError>;

    /// Current state of a reward account, `None` if it never appeared
    /// on-chain.
    async fn reward_account_info(
        &self,
        stake: &StakeCredential,
    ) -> Result<Option<RewardAccountInfo>, SourceError>;

    /// Every address that has been used with this reward account.
    async fn addresses_for(&self, stake: &StakeCredential) -> Result<Vec<Address>, SourceError>;

    /// Addresses currently holding funds under this payment key, whatever
    /// their stake part. Enterprise and pointer change addresses are only
    /// reachable through here.
    async fn addresses_for_payment(
        &self,
        payment: &PaymentCredential,
    ) -> Result<Vec<Address>, SourceError>;

    /// Unspent outputs currently sitting at `address`.
    async fn utxos_for(&self, address: &Address) -> Result<Vec<Utxo>, SourceError>;

    /// Transactions touching `address`, oldest first.
    async fn transactions_for(&self, address: &Address)
        -> Result<Vec<TransactionRef>, SourceError>;
}

#[async_trait]
impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    fn network_id(&self) -> u8 {
        (**self).network_id()
    }

    async fn reward_accounts_for(
        &self,
        address: &Address,
    ) -> Result<Vec<StakeCredential>, SourceError> {
        (**self).reward_accounts_for(address).await
    }

    async fn reward_account_info(
        &self,
        stake: &StakeCredential,
    ) -> Result<Option<RewardAccountInfo>, SourceError> {
        (**self).reward_account_info(stake).await
    }

    async fn addresses_for(&self, stake: &StakeCredential) -> Result<Vec<Address>, SourceError> {
        (**self).addresses_for(stake).await
    }

    async fn addresses_for_payment(
        &self,
        payment: &PaymentCredential,
    ) -> Result<Vec<Address>, SourceError> {
        (**self).addresses_for_payment(payment).await
    }

    async fn utxos_for(&self, address: &Address) -> Result<Vec<Utxo>, SourceError> {
        (**self).utxos_for(address).await
    }

    async fn transactions_for(
        &self,
        address: &Address,
    ) -> Result<Vec<TransactionRef>, SourceError> {
        (**self).transactions_for(address).await
    }
}
