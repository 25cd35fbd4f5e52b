//! Configuration management

use crate::account_source::RetryPolicy;
use crate::error::ConfigError;
use crate::rpc::Pagination;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use vsr_snapshot_lib::{Address, RegistrarConfig, RegistrarParams};

/// Program id of the Voter Stake Registry deployment on mainnet.
pub const DEFAULT_PROGRAM_ID: &str = "vsr2nfGVNHmSY8uxoBGqq8AQbwz3JwaEaHqGbsTPXqQ";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub json_rpc_url: String,
    pub program_id: Address,
    /// Registrar account to read the voting mint configuration from.
    pub registrar: Option<Address>,
    pub voting_mint_index: usize,
    /// Explicit multiplier parameters, used instead of the registrar account.
    pub registrar_params: Option<RegistrarParams>,
    pub pagination: Pagination,
    pub retry: RetryPolicy,
    pub min_request_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub workers: usize,
    /// Zero disables result caching.
    pub cache_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            json_rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            program_id: DEFAULT_PROGRAM_ID.parse().unwrap_or_default(),
            registrar: None,
            voting_mint_index: 0,
            registrar_params: None,
            pagination: Pagination::default(),
            retry: RetryPolicy::default(),
            min_request_interval_ms: 100,
            request_timeout_secs: 60,
            workers: 4,
            cache_ttl_secs: 0,
        }
    }
}

/// Where the registrar configuration comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrarSource {
    Account {
        address: Address,
        voting_mint_index: usize,
    },
    Explicit(RegistrarConfig),
}

impl Config {
    pub fn load(config_file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(config_file)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn save(&self, config_file: impl AsRef<Path>) -> Result<(), ConfigError> {
        let serialized = serde_yaml::to_string(self)?;
        if let Some(outdir) = config_file.as_ref().parent() {
            create_dir_all(outdir)?;
        }
        let mut file = File::create(config_file)?;
        file.write_all(serialized.as_bytes())?;
        Ok(())
    }

    /// Explicit parameters take precedence over the registrar account.
    pub fn registrar_source(&self) -> Result<RegistrarSource, ConfigError> {
        match (self.registrar_params, self.registrar) {
            (Some(params), _) => Ok(RegistrarSource::Explicit(params.try_into()?)),
            (None, Some(address)) => Ok(RegistrarSource::Account {
                address,
                voting_mint_index: self.voting_mint_index,
            }),
            (None, None) => Err(ConfigError::MissingRegistrar),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}
