//! # Settings
//!
//! Resolves what a run needs from three layers, highest first: command-line
//! flags (which clap already merged with `STAKELINK_*` environment
//! variables), the optional TOML file, and the library defaults.
//!
//! ```toml
//! network = "preprod"
//! project_id = "preprodXXXXXXXX"
//! concurrency = 4
//! call_timeout_secs = 60
//! overall_timeout_secs = 600
//! request_timeout_secs = 20
//! max_retries = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use stakelink_discovery::config::{
    DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_BACKOFF,
};
use stakelink_discovery::{BlockfrostConfig, DiscoveryConfig, Network};

use crate::cli::SourceArgs;

/// Contents of a `--config` file. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub network: Option<Network>,
    pub project_id: Option<String>,
    pub base_url: Option<String>,
    pub concurrency: Option<usize>,
    pub call_timeout_secs: Option<u64>,
    pub overall_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub network: Network,
    pub project_id: Option<String>,
    pub base_url: Option<String>,
    pub fixture: Option<PathBuf>,
    pub discovery: DiscoveryConfig,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Settings {
    /// Merges flags over the config file over defaults.
    ///
    /// `concurrency` and `timeout_secs` are the `discover` flags; other
    /// subcommands pass `None`.
    pub fn resolve(
        source: &SourceArgs,
        concurrency: Option<usize>,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let file = match &source.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(source, concurrency, timeout_secs, file)
    }

    fn merge(
        source: &SourceArgs,
        concurrency: Option<usize>,
        timeout_secs: Option<u64>,
        file: FileConfig,
    ) -> Result<Self> {
        let defaults = DiscoveryConfig::default();

        let max_concurrency = concurrency
            .or(file.concurrency)
            .unwrap_or(defaults.max_concurrency);
        if max_concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        let call_timeout = match file.call_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.call_timeout,
        };
        let overall_timeout = timeout_secs
            .or(file.overall_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            network: source.network.or(file.network).unwrap_or(Network::Mainnet),
            project_id: source
                .project_id
                .clone()
                .or(file.project_id)
                .filter(|id| !id.trim().is_empty()),
            base_url: source.base_url.clone().or(file.base_url),
            fixture: source.fixture.clone(),
            discovery: DiscoveryConfig {
                max_concurrency,
                call_timeout,
                overall_timeout,
            },
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            max_retries: file.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_backoff: file
                .retry_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_BACKOFF),
        })
    }

    /// Blockfrost connection settings. Fails when no project id is known.
    pub fn blockfrost_config(&self) -> Result<BlockfrostConfig> {
        let Some(project_id) = &self.project_id else {
            bail!(
                "no Blockfrost project id for {}: pass --project-id, set STAKELINK_PROJECT_ID, \
                 or add project_id to the config file",
                self.network
            );
        };

        let mut config = BlockfrostConfig::new(self.network, project_id.clone());
        config.base_url = self.base_url.clone();
        config.request_timeout = self.request_timeout;
        config.max_retries = self.max_retries;
        config.retry_backoff = self.retry_backoff;
        Ok(config)
    }
}
