//! # Blockfrost Data Source
//!
//! [`DataSource`] over the Blockfrost REST API. Every request carries the
//! `project_id` header; list endpoints are walked page by page.
//!
//! | Lookup                | Endpoint                                   |
//! |-----------------------|--------------------------------------------|
//! | `reward_accounts_for` | `GET /addresses/{address}`                 |
//! | `reward_account_info` | `GET /accounts/{stake}`                    |
//! | `addresses_for`       | `GET /accounts/{stake}/addresses` (paged)  |
//! | `addresses_for_payment` | `GET /addresses/{addr_vkh}/utxos` (paged), holders deduplicated |
//! | `utxos_for`           | `GET /addresses/{address}/utxos` (paged)   |
//! | `transactions_for`    | `GET /addresses/{address}/transactions` (paged, oldest first) |
//!
//! ## Failure handling
//!
//! | Response             | Outcome                                         |
//! |----------------------|-------------------------------------------------|
//! | 404, 400             | empty / absent                                  |
//! | 401, 402, 403, 418   | [`SourceError::Unavailable`]: the project id is missing, rejected, over quota or banned |
//! | 429, 5xx, I/O errors | retried `max_retries` times with linear backoff, then empty / absent with a `warn!` |
//! | malformed body       | empty / absent with a `warn!`                    |
//!
//! A listing that fails half-way keeps the pages it already has. A listing
//! still full at `max_pages` is cut there with a `warn!`.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{
    Network, BLOCKFROST_MAX_PAGES, BLOCKFROST_PAGE_SIZE, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_BACKOFF,
};
use crate::source::{DataSource, SourceError};
use crate::types::{
    Address, PaymentCredential, RewardAccountInfo, StakeCredential, TransactionRef, Utxo,
};
use crate::value::Value;

// ---------------------------------------------------------------------------
// BlockfrostConfig
// ---------------------------------------------------------------------------

/// Connection settings for [`BlockfrostSource`].
#[derive(Clone)]
pub struct BlockfrostConfig {
    pub network: Network,
    /// Blockfrost project id, sent as the `project_id` header.
    pub project_id: String,
    /// Overrides the network's default API root.
    pub base_url: Option<String>,
    /// Timeout for one HTTP request.
    pub request_timeout: Duration,
    /// Extra attempts for 429 / 5xx / I/O failures.
    pub max_retries: u32,
    /// Attempt `n` waits `n * retry_backoff` before retrying.
    pub retry_backoff: Duration,
    /// Pages fetched per listing before it is cut short.
    pub max_pages: u32,
}

impl BlockfrostConfig {
    pub fn new(network: Network, project_id: impl Into<String>) -> Self {
        Self {
            network,
            project_id: project_id.into(),
            base_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_pages: BLOCKFROST_MAX_PAGES,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// The API root requests go to, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.network.blockfrost_url())
            .trim_end_matches('/')
    }
}

// The project id is a credential; keep it out of logs.
impl fmt::Debug for BlockfrostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockfrostConfig")
            .field("network", &self.network)
            .field("project_id", &"<redacted>")
            .field("base_url", &self.base_url())
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AddressContent {
    stake_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountContent {
    active: bool,
    controlled_amount: String,
    withdrawable_amount: String,
    pool_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountAddress {
    address: String,
}

#[derive(Debug, Deserialize)]
struct AddressUtxo {
    address: String,
    tx_hash: String,
    output_index: u32,
    amount: Vec<Amount>,
}

#[derive(Debug, Deserialize)]
struct Amount {
    unit: String,
    quantity: String,
}

#[derive(Debug, Deserialize)]
struct AddressTransaction {
    tx_hash: String,
    tx_index: u32,
    block_height: u64,
    block_time: i64,
}

fn to_value(amounts: &[Amount]) -> Option<Value> {
    let mut value = Value::default();
    for amount in amounts {
        let quantity = amount.quantity.parse::<u64>().ok()?;
        value.add_quantity(&amount.unit, quantity).ok()?;
    }
    Some(value)
}

fn to_utxo(raw: AddressUtxo) -> Option<Utxo> {
    let value = to_value(&raw.amount)?;
    Some(Utxo::new(
        raw.tx_hash,
        raw.output_index,
        Address::new(raw.address),
        value,
    ))
}

fn to_reward_info(stake: &StakeCredential, raw: AccountContent) -> Option<RewardAccountInfo> {
    Some(RewardAccountInfo {
        stake_credential: stake.clone(),
        controlled_amount: raw.controlled_amount.parse().ok()?,
        withdrawable_amount: raw.withdrawable_amount.parse().ok()?,
        pool_id: raw.pool_id,
        active: raw.active,
    })
}

fn to_transaction(raw: AddressTransaction) -> Option<TransactionRef> {
    Some(TransactionRef {
        tx_hash: raw.tx_hash,
        tx_index: raw.tx_index,
        block_height: raw.block_height,
        block_time: DateTime::from_timestamp(raw.block_time, 0)?,
    })
}

// ---------------------------------------------------------------------------
// BlockfrostSource
// ---------------------------------------------------------------------------

/// Outcome of one provider request after retries.
enum Lookup<T> {
    Found(T),
    NotFound,
    Failed(String),
}

/// Blockfrost-backed [`DataSource`].
#[derive(Clone)]
pub struct BlockfrostSource {
    http: reqwest::Client,
    base_url: String,
    network_id: u8,
    max_retries: u32,
    retry_backoff: Duration,
    max_pages: u32,
}

// The client carries the project id in its default headers.
impl fmt::Debug for BlockfrostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockfrostSource")
            .field("base_url", &self.base_url)
            .field("network_id", &self.network_id)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

impl BlockfrostSource {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// [`SourceError::Unavailable`] if the project id is empty or not a
    /// valid header value, or the TLS backend cannot be initialised.
    pub fn new(config: BlockfrostConfig) -> Result<Self, SourceError> {
        let project_id = config.project_id.trim();
        if project_id.is_empty() {
            return Err(SourceError::Unavailable(
                "missing Blockfrost project id".to_string(),
            ));
        }

        let mut header = HeaderValue::from_str(project_id).map_err(|_| {
            SourceError::Unavailable("Blockfrost project id is not a valid header value".to_string())
        })?;
        header.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("project_id", header);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .user_agent(concat!("stakelink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Unavailable(format!("failed to create HTTP client: {e}")))?;

        debug!(config = ?config, "blockfrost source ready");

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            network_id: config.network.id(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            max_pages: config.max_pages,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GETs `path` and decodes the JSON body, retrying transient failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Lookup<T>, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            let failure = match self.http.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(match response.json::<T>().await {
                            Ok(body) => Lookup::Found(body),
                            Err(e) => Lookup::Failed(format!("invalid response body: {e}")),
                        });
                    }
                    match status {
                        StatusCode::NOT_FOUND => return Ok(Lookup::NotFound),
                        StatusCode::BAD_REQUEST => {
                            debug!(path, "provider rejected the request as invalid");
                            return Ok(Lookup::NotFound);
                        }
                        StatusCode::UNAUTHORIZED
                        | StatusCode::PAYMENT_REQUIRED
                        | StatusCode::FORBIDDEN
                        | StatusCode::IM_A_TEAPOT => {
                            return Err(SourceError::Unavailable(format!(
                                "Blockfrost refused the project id (HTTP {status})"
                            )));
                        }
                        s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
                            format!("HTTP {status}")
                        }
                        other => return Ok(Lookup::Failed(format!("unexpected HTTP {other}"))),
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    format!("request failed: {e}")
                }
                Err(e) => return Ok(Lookup::Failed(format!("request failed: {e}"))),
            };

            attempt += 1;
            if attempt > self.max_retries {
                return Ok(Lookup::Failed(format!(
                    "{failure} (gave up after {attempt} attempts)"
                )));
            }
            let delay = self.retry_backoff * attempt;
            debug!(path, attempt, ?delay, %failure, "retrying provider request");
            tokio::time::sleep(delay).await;
        }
    }

    /// Walks a paged listing until a short page, a 404, a failure or the
    /// page limit.
    async fn get_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, &str)],
    ) -> Result<Vec<T>, SourceError> {
        let mut items = Vec::new();

        for page in 1..=self.max_pages {
            let mut query = vec![
                ("count", BLOCKFROST_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            query.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));

            match self.get_json::<Vec<T>>(path, &query).await? {
                Lookup::Found(batch) => {
                    let last = batch.len() < BLOCKFROST_PAGE_SIZE;
                    items.extend(batch);
                    if last {
                        return Ok(items);
                    }
                }
                Lookup::NotFound => return Ok(items),
                Lookup::Failed(reason) => {
                    warn!(path, page, %reason, kept = items.len(), "listing truncated by provider failure");
                    return Ok(items);
                }
            }
        }

        warn!(
            path,
            max_pages = self.max_pages,
            kept = items.len(),
            "listing truncated at the page limit"
        );
        Ok(items)
    }
}

#[async_trait]
impl DataSource for BlockfrostSource {
    fn network_id(&self) -> u8 {
        self.network_id
    }

    async fn reward_accounts_for(
        &self,
        address: &Address,
    ) -> Result<Vec<StakeCredential>, SourceError> {
        match self
            .get_json::<AddressContent>(&format!("/addresses/{address}"), &[])
            .await?
        {
            Lookup::Found(content) => Ok(content
                .stake_address
                .map(StakeCredential::new)
                .into_iter()
                .collect()),
            Lookup::NotFound => {
                debug!(address = %address, "address unknown to provider");
                Ok(Vec::new())
            }
            Lookup::Failed(reason) => {
                warn!(address = %address, %reason, "address lookup failed, treating as unstaked");
                Ok(Vec::new())
            }
        }
    }

    async fn reward_account_info(
        &self,
        stake: &StakeCredential,
    ) -> Result<Option<RewardAccountInfo>, SourceError> {
        match self
            .get_json::<AccountContent>(&format!("/accounts/{stake}"), &[])
            .await?
        {
            Lookup::Found(raw) => {
                let info = to_reward_info(stake, raw);
                if info.is_none() {
                    warn!(stake = %stake, "reward account has malformed amounts, treating as unknown");
                }
                Ok(info)
            }
            Lookup::NotFound => Ok(None),
            Lookup::Failed(reason) => {
                warn!(stake = %stake, %reason, "reward account lookup failed, treating as unknown");
                Ok(None)
            }
        }
    }

    async fn addresses_for(&self, stake: &StakeCredential) -> Result<Vec<Address>, SourceError> {
        let raw: Vec<AccountAddress> = self
            .get_paged(&format!("/accounts/{stake}/addresses"), &[])
            .await?;
        Ok(raw.into_iter().map(|a| Address::new(a.address)).collect())
    }

    async fn addresses_for_payment(
        &self,
        payment: &PaymentCredential,
    ) -> Result<Vec<Address>, SourceError> {
        let raw: Vec<AddressUtxo> = self
            .get_paged(&format!("/addresses/{payment}/utxos"), &[])
            .await?;
        let holders: BTreeSet<String> = raw.into_iter().map(|utxo| utxo.address).collect();
        Ok(holders.into_iter().map(Address::new).collect())
    }

    async fn utxos_for(&self, address: &Address) -> Result<Vec<Utxo>, SourceError> {
        let raw: Vec<AddressUtxo> = self
            .get_paged(&format!("/addresses/{address}/utxos"), &[])
            .await?;
        match raw.into_iter().map(to_utxo).collect::<Option<Vec<_>>>() {
            Some(utxos) => Ok(utxos),
            None => {
                warn!(address = %address, "provider returned a malformed UTXO amount, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn transactions_for(
        &self,
        address: &Address,
    ) -> Result<Vec<TransactionRef>, SourceError> {
        let raw: Vec<AddressTransaction> = self
            .get_paged(
                &format!("/addresses/{address}/transactions"),
                &[("order", "asc")],
            )
            .await?;
        match raw.into_iter().map(to_transaction).collect::<Option<Vec<_>>>() {
            Some(txs) => Ok(txs),
            None => {
                warn!(address = %address, "provider returned a malformed block time, treating as empty");
                Ok(Vec::new())
            }
        }
    }
}
