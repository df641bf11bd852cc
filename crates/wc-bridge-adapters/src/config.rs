use std::path::PathBuf;

use thiserror::Error;
use wc_bridge_core::Account;

pub const ENV_ENABLED_CHAINS: &str = "WC_BRIDGE_ENABLED_CHAINS";
pub const ENV_STORE_PATH: &str = "WC_BRIDGE_STORE_PATH";
pub const ENV_INPUT_BUFFER: &str = "WC_BRIDGE_INPUT_BUFFER";
pub const ENV_AUTO_APPROVE: &str = "WC_BRIDGE_AUTO_APPROVE";
pub const ENV_ACCOUNTS: &str = "WC_BRIDGE_ACCOUNTS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub enabled_chain_ids: Vec<u64>,
    pub store_path: Option<PathBuf>,
    pub input_buffer: usize,
    pub auto_approve: bool,
    pub accounts: Vec<Account>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled_chain_ids: vec![1, 137, 10, 42161, 8453, 100, 56, 11155111],
            store_path: None,
            input_buffer: 256,
            auto_approve: false,
            accounts: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = value(ENV_ENABLED_CHAINS) {
            config.enabled_chain_ids = raw
                .split(',')
                .map(|id| {
                    id.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                        key: ENV_ENABLED_CHAINS,
                        reason: format!("`{id}`: {e}"),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        config.store_path = value(ENV_STORE_PATH).map(PathBuf::from);
        if let Some(raw) = value(ENV_INPUT_BUFFER) {
            config.input_buffer = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: ENV_INPUT_BUFFER,
                    reason: format!("`{raw}` is not a positive integer"),
                })?;
        }
        if let Some(raw) = value(ENV_AUTO_APPROVE) {
            config.auto_approve = matches!(raw.trim(), "1" | "true" | "yes");
        }
        if let Some(raw) = value(ENV_ACCOUNTS) {
            config.accounts = raw
                .split(',')
                .map(|account| {
                    account.trim().parse::<Account>().map_err(|e| ConfigError::Invalid {
                        key: ENV_ACCOUNTS,
                        reason: format!("{e}"),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        Ok(config)
    }
}
