use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use tracing::warn;
use wc_bridge_core::{Blockchain, ChainCatalogPort, PortError, RpcServer, EIP155};

use crate::config::BridgeConfig;

/// `(chain id, name, is testnet)`
const KNOWN_SERVERS: &[(u64, &str, bool)] = &[
    (1, "Ethereum", false),
    (10, "Optimism", false),
    (56, "BNB Smart Chain", false),
    (100, "Gnosis", false),
    (137, "Polygon", false),
    (250, "Fantom", false),
    (8453, "Base", false),
    (42161, "Arbitrum One", false),
    (43114, "Avalanche C-Chain", false),
    (5, "Goerli", true),
    (97, "BNB Smart Chain Testnet", true),
    (4002, "Fantom Testnet", true),
    (43113, "Avalanche Fuji", true),
    (80001, "Polygon Mumbai", true),
    (80002, "Polygon Amoy", true),
    (84532, "Base Sepolia", true),
    (421614, "Arbitrum Sepolia", true),
    (11155111, "Sepolia", true),
    (11155420, "Optimism Sepolia", true),
];

/// Static table of EVM networks plus the set the wallet has switched on.
#[derive(Debug, Clone)]
pub struct ChainCatalogAdapter {
    enabled: Arc<RwLock<BTreeSet<u64>>>,
}

impl Default for ChainCatalogAdapter {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

impl ChainCatalogAdapter {
    pub fn new(enabled_chain_ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            enabled: Arc::new(RwLock::new(enabled_chain_ids.into_iter().collect())),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.enabled_chain_ids.iter().copied())
    }

    pub fn lookup(chain_id: u64) -> Option<RpcServer> {
        KNOWN_SERVERS
            .iter()
            .find(|(id, _, _)| *id == chain_id)
            .map(|(id, name, is_testnet)| RpcServer {
                chain_id: *id,
                name: (*name).to_owned(),
                is_testnet: *is_testnet,
            })
    }

    pub fn set_enabled(&self, chain_id: u64, enabled: bool) -> Result<(), PortError> {
        let mut g = self
            .enabled
            .write()
            .map_err(|e| PortError::Transport(format!("catalog lock poisoned: {e}")))?;
        if enabled {
            g.insert(chain_id);
        } else {
            g.remove(&chain_id);
        }
        Ok(())
    }

    pub fn enabled_servers(&self) -> Result<Vec<RpcServer>, PortError> {
        let g = self
            .enabled
            .read()
            .map_err(|e| PortError::Transport(format!("catalog lock poisoned: {e}")))?;
        Ok(g.iter().filter_map(|id| Self::lookup(*id)).collect())
    }
}

impl ChainCatalogPort for ChainCatalogAdapter {
    fn server(&self, chain: &Blockchain) -> Option<RpcServer> {
        if chain.namespace() != EIP155 {
            return None;
        }
        chain.eip155_chain_id().and_then(Self::lookup)
    }

    fn is_enabled(&self, server: &RpcServer) -> bool {
        match self.enabled.read() {
            Ok(g) => g.contains(&server.chain_id),
            Err(e) => {
                warn!(error = %e, "catalog lock poisoned");
                false
            }
        }
    }
}
