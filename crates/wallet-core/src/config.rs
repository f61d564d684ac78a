//! Engine configuration.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file, when one is given
//! 3. Deployment variables `BLOCKFROST_PROJECT_ID` / `PROJECT_ID`,
//!    `MASTER_KEY_PATH` and `SENDER_ADDR`
//! 4. `ADA_ENGINE_*` environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use chain_ada::{address, AdaNetwork, Address, DEFAULT_MAX_FEE_PASSES};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::WalletError;
use crate::logging::LogFormat;
use crate::submit::RetryPolicy;

/// Example: `ADA_ENGINE_SUBMIT_ATTEMPTS=5` -> `submit_attempts`.
const ENV_PREFIX: &str = "ADA_ENGINE_";

const DEFAULT_KEY_DIR: &str = "keys";
const DEFAULT_SUBMIT_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 2_000;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EngineConfigRaw {
    network: AdaNetwork,
    blockfrost_url: Option<String>,
    project_id: Option<String>,
    key_dir: PathBuf,
    key_passphrase: Option<String>,
    master_key_path: Option<PathBuf>,
    master_address: Option<String>,
    native_assets: bool,
    max_fee_passes: usize,
    submit_attempts: u32,
    retry_backoff_ms: u64,
    ttl_offset: Option<u64>,
    log_level: String,
    log_format: LogFormat,
}

impl Default for EngineConfigRaw {
    fn default() -> Self {
        Self {
            network: AdaNetwork::Testnet,
            blockfrost_url: None,
            project_id: None,
            key_dir: PathBuf::from(DEFAULT_KEY_DIR),
            key_passphrase: None,
            master_key_path: None,
            master_address: None,
            native_assets: false,
            max_fee_passes: DEFAULT_MAX_FEE_PASSES,
            submit_attempts: DEFAULT_SUBMIT_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            ttl_offset: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Validated engine settings. Secrets are held as [`SecretString`] and
/// print as `[REDACTED]`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub network: AdaNetwork,
    pub blockfrost_url: String,
    pub project_id: Option<SecretString>,
    pub key_dir: PathBuf,
    pub key_passphrase: Option<SecretString>,
    pub master_key_path: Option<PathBuf>,
    /// Destination of sweeps.
    pub master_address: Option<Address>,
    pub native_assets: bool,
    pub max_fee_passes: usize,
    pub submit_attempts: u32,
    pub retry_backoff: Duration,
    /// Slots added to the chain tip to form a transaction's TTL. No TTL is
    /// set when absent.
    pub ttl_offset: Option<u64>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let raw = EngineConfigRaw::default();
        Self {
            network: raw.network,
            blockfrost_url: raw.network.default_provider_url().to_string(),
            project_id: None,
            key_dir: raw.key_dir,
            key_passphrase: None,
            master_key_path: None,
            master_address: None,
            native_assets: raw.native_assets,
            max_fee_passes: raw.max_fee_passes,
            submit_attempts: raw.submit_attempts,
            retry_backoff: Duration::from_millis(raw.retry_backoff_ms),
            ttl_offset: raw.ttl_offset,
            log_level: raw.log_level,
            log_format: raw.log_format,
        }
    }
}

impl EngineConfig {
    /// Load from the environment alone.
    pub fn load() -> Result<Self, WalletError> {
        extract(figment_base(None))
    }

    /// Load with `path` as the TOML layer. A missing file is an error.
    pub fn load_from_file(path: &Path) -> Result<Self, WalletError> {
        if !path.exists() {
            return Err(WalletError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }
        info!(path = %path.display(), "loading configuration");
        extract(figment_base(Some(Toml::file(path))))
    }

    /// Load from TOML text, with the environment layers applied on top.
    pub fn from_toml_str(toml: &str) -> Result<Self, WalletError> {
        extract(figment_base(Some(Toml::string(toml))))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.submit_attempts, self.retry_backoff)
    }
}

fn figment_base(file: Option<figment::providers::Data<Toml>>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(EngineConfigRaw::default()));
    if let Some(file) = file {
        figment = figment.merge(file);
    }
    figment
        .merge(
            Env::raw()
                .only(&["BLOCKFROST_PROJECT_ID", "PROJECT_ID", "MASTER_KEY_PATH", "SENDER_ADDR"])
                .map(|key| {
                    if key == "BLOCKFROST_PROJECT_ID" || key == "PROJECT_ID" {
                        "project_id".into()
                    } else if key == "MASTER_KEY_PATH" {
                        "master_key_path".into()
                    } else if key == "SENDER_ADDR" {
                        "master_address".into()
                    } else {
                        key.into()
                    }
                }),
        )
        .merge(Env::prefixed(ENV_PREFIX))
}

fn extract(figment: Figment) -> Result<EngineConfig, WalletError> {
    let raw: EngineConfigRaw = figment
        .extract()
        .map_err(|e| WalletError::Config(format!("config extraction failed: {e}")))?;
    let config = convert_raw(raw)?;
    debug!(
        network = %config.network,
        blockfrost_url = %config.blockfrost_url,
        has_project_id = config.project_id.is_some(),
        key_dir = %config.key_dir.display(),
        sealed_keys = config.key_passphrase.is_some(),
        native_assets = config.native_assets,
        max_fee_passes = config.max_fee_passes,
        "configuration loaded"
    );
    Ok(config)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn convert_raw(raw: EngineConfigRaw) -> Result<EngineConfig, WalletError> {
    if raw.max_fee_passes == 0 {
        return Err(WalletError::Config("max_fee_passes must be at least 1".into()));
    }
    if raw.submit_attempts == 0 {
        return Err(WalletError::Config("submit_attempts must be at least 1".into()));
    }

    let master_address = non_empty(raw.master_address)
        .map(|text| {
            address::decode(text.trim(), raw.network)
                .map_err(|e| WalletError::Config(format!("master_address: {e}")))
        })
        .transpose()?;

    let blockfrost_url = non_empty(raw.blockfrost_url)
        .unwrap_or_else(|| raw.network.default_provider_url().to_string())
        .trim_end_matches('/')
        .to_string();

    Ok(EngineConfig {
        network: raw.network,
        blockfrost_url,
        project_id: non_empty(raw.project_id).map(SecretString::from),
        key_dir: raw.key_dir,
        key_passphrase: non_empty(raw.key_passphrase).map(SecretString::from),
        master_key_path: raw.master_key_path,
        master_address,
        native_assets: raw.native_assets,
        max_fee_passes: raw.max_fee_passes,
        submit_attempts: raw.submit_attempts,
        retry_backoff: Duration::from_millis(raw.retry_backoff_ms),
        ttl_offset: raw.ttl_offset,
        log_level: raw.log_level,
        log_format: raw.log_format,
    })
}
