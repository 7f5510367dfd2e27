//! JSON configuration with environment overrides.

use crate::content::StorageAccount;
use crate::coordinator::CoordinatorSettings;
use crate::cost::CostTable;
use crate::network::{NetworkError, NetworkTable};
use crate::watch::DEFAULT_POLL_INTERVAL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`Config::rpc_url`].
pub const ENV_RPC_URL: &str = "MEDISHEET_RPC_URL";
/// Environment variable overriding [`StorageConfig::endpoint`].
pub const ENV_STORAGE_URL: &str = "MEDISHEET_STORAGE_URL";
/// Environment variable overriding [`StorageConfig::email`].
pub const ENV_STORAGE_EMAIL: &str = "MEDISHEET_STORAGE_EMAIL";
/// Environment variable overriding [`StorageConfig::space`].
pub const ENV_STORAGE_SPACE: &str = "MEDISHEET_STORAGE_SPACE";
/// Environment variable holding the hex wallet key.
pub const ENV_PRIVATE_KEY: &str = "MEDISHEET_PRIVATE_KEY";

const DEFAULT_STORAGE_ENDPOINT: &str = "http://127.0.0.1:5001";
const DEFAULT_FILES_PATH: &str = "medisheet_files.json";
const DEFAULT_RECEIPT_POLL_MS: u64 = 2_000;
const DEFAULT_RECEIPT_MAX_POLLS: u32 = 90;

/// Upload endpoint and account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of the IPFS-compatible HTTP API.
    pub endpoint: String,
    /// Account email; uploads fail when unset.
    pub email: Option<String>,
    /// Space identifier; uploads fail when unset.
    pub space: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            email: None,
            space: None,
        }
    }
}

/// Receipt polling policy for submitted transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptPolicy {
    /// Delay between receipt polls in milliseconds.
    pub poll_interval_ms: u64,
    /// Polls before giving up.
    pub max_polls: u32,
}

impl ReceiptPolicy {
    /// Poll delay as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_RECEIPT_POLL_MS,
            max_polls: DEFAULT_RECEIPT_MAX_POLLS,
        }
    }
}

/// Application identity shown to wallets and sent as the HTTP user agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Public URL.
    pub url: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "Web3 Medical Invoice Dapp".to_string(),
            description: "A Dapp to create and manage medical invoices.".to_string(),
            url: "https://family.co".to_string(),
        }
    }
}

impl AppMetadata {
    /// `name/version` string used for outbound HTTP requests.
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{}",
            self.name.replace(' ', "-"),
            env!("CARGO_PKG_VERSION")
        )
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON-RPC endpoint of the wallet's node; falls back to the active network's default.
    pub rpc_url: Option<String>,
    /// Supported networks.
    pub networks: NetworkTable,
    /// Credit cost per action.
    pub costs: CostTable,
    /// Upload settings.
    pub storage: StorageConfig,
    /// Local file store location.
    pub files_path: PathBuf,
    /// Receipt polling.
    pub receipt: ReceiptPolicy,
    /// Chain id poll interval for `watch`, in milliseconds.
    pub watch_interval_ms: u64,
    /// Application identity.
    pub app: AppMetadata,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: None,
            networks: NetworkTable::default(),
            costs: CostTable::default(),
            storage: StorageConfig::default(),
            files_path: PathBuf::from(DEFAULT_FILES_PATH),
            receipt: ReceiptPolicy::default(),
            watch_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            app: AppMetadata::default(),
        }
    }
}

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Config file is not valid JSON for [`Config`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// Network table is inconsistent.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl Config {
    /// Loads `path` (missing file -> defaults), then applies process environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Reads `path` without consulting the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.networks.validate()?;
        Ok(config)
    }

    /// Overrides fields from `lookup`; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = get(ENV_RPC_URL) {
            self.rpc_url = Some(url);
        }
        if let Some(url) = get(ENV_STORAGE_URL) {
            self.storage.endpoint = url;
        }
        if let Some(email) = get(ENV_STORAGE_EMAIL) {
            self.storage.email = Some(email);
        }
        if let Some(space) = get(ENV_STORAGE_SPACE) {
            self.storage.space = Some(space);
        }
    }

    /// Upload account, when both email and space are present.
    pub fn storage_account(&self) -> Option<StorageAccount> {
        match (&self.storage.email, &self.storage.space) {
            (Some(email), Some(space)) => Some(StorageAccount {
                email: email.clone(),
                space: space.clone(),
            }),
            _ => None,
        }
    }

    /// Settings handed to the action coordinator.
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            networks: self.networks.clone(),
            costs: self.costs,
            storage: self.storage_account(),
        }
    }

    /// Chain id poll interval.
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(1))
    }
}
