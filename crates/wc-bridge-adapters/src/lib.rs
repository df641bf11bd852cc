pub mod chains;
pub mod clock;
pub mod config;
pub mod decision;
pub mod runtime;
pub mod store;
pub mod wc;

pub use chains::ChainCatalogAdapter;
pub use clock::SystemClockAdapter;
pub use config::{BridgeConfig, ConfigError};
pub use decision::{ChannelDecisionAdapter, DecisionPrompt};
pub use runtime::{spawn_provider, BridgeHandle};
pub use store::SessionStoreAdapter;
pub use wc::{TransportCall, WalletConnectAdapter};
