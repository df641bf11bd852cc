//! Maps wallet accounts onto the namespaces a proposal or session advertises.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::domain::{
    granted_chains, Account, Blockchain, ProposalNamespaces, SessionNamespace, SessionNamespaces,
    SessionRecord, SessionUpdate, TimestampMs, EIP155,
};
use crate::ports::ChainCatalogPort;

pub const DEFAULT_EIP155_METHODS: &[&str] = &[
    "eth_sendTransaction",
    "eth_signTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTypedData_v4",
    "wallet_switchEthereumChain",
    "wallet_addEthereumChain",
];

pub const DEFAULT_EIP155_EVENTS: &[&str] = &["chainChanged", "accountsChanged"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("wallet has no accounts")]
    NoAccounts,
    #[error("no wallet account matches namespace `{0}`")]
    UnsatisfiedNamespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("namespace `{0}` mixes mainnet and testnet chains")]
    MixedNetworks(String),
}

/// A required namespace may list only mainnets or only testnets. Chains the
/// catalog does not know are ignored.
pub fn validate_network_mix<K>(
    required: &ProposalNamespaces,
    catalog: &K,
) -> Result<(), StructuralError>
where
    K: ChainCatalogPort + ?Sized,
{
    for (key, namespace) in required {
        let servers: Vec<_> = namespace
            .chains_for(key)
            .iter()
            .filter_map(|chain| catalog.server(chain))
            .collect();
        let all_testnets = servers.iter().all(|s| s.is_testnet);
        let all_mainnets = servers.iter().all(|s| !s.is_testnet);
        if !all_testnets && !all_mainnets {
            return Err(StructuralError::MixedNetworks(key.clone()));
        }
    }
    Ok(())
}

/// Namespaces to approve a proposal with. Every required entry must be
/// covered by at least one account.
pub fn resolve_proposal_namespaces(
    accounts: &BTreeSet<Account>,
    required: &ProposalNamespaces,
) -> Result<SessionNamespaces, ResolveError> {
    if accounts.is_empty() {
        return Err(ResolveError::NoAccounts);
    }
    if required.is_empty() {
        let servers = accounts.iter().map(|a| a.chain().clone()).collect();
        return Ok(build_session_namespaces(
            accounts,
            &servers,
            &SessionNamespaces::new(),
        ));
    }

    let mut resolved = SessionNamespaces::new();
    for (key, namespace) in required {
        let chains = namespace.chains_for(key);
        let matched: BTreeSet<Account> = accounts
            .iter()
            .filter(|a| chains.contains(a.chain()))
            .cloned()
            .collect();
        if matched.is_empty() {
            return Err(ResolveError::UnsatisfiedNamespace(key.clone()));
        }
        let entry = resolved.entry(key.clone()).or_default();
        entry.accounts.extend(matched);
        entry.methods.extend(namespace.methods.iter().cloned());
        entry.events.extend(namespace.events.iter().cloned());
    }
    Ok(resolved)
}

/// Namespaces for an explicit server list. Fails when some chain family in
/// `servers` ends up with no account at all.
pub fn resolve_server_namespaces(
    accounts: &BTreeSet<Account>,
    servers: &BTreeSet<Blockchain>,
    template: &SessionNamespaces,
) -> Result<SessionNamespaces, ResolveError> {
    if accounts.is_empty() {
        return Err(ResolveError::NoAccounts);
    }
    let resolved = build_session_namespaces(accounts, servers, template);
    let covered = granted_chains(&resolved);
    let families: BTreeSet<&str> = servers.iter().map(Blockchain::namespace).collect();
    for family in families {
        if !covered.iter().any(|c| c.namespace() == family) {
            return Err(ResolveError::UnsatisfiedNamespace(family.to_owned()));
        }
    }
    Ok(resolved)
}

/// Grants the accounts that sit on `servers`, keeping methods and events from
/// `template`. Never fails: an entry with nothing to grant keeps its methods
/// and events with an empty account set.
pub fn build_session_namespaces(
    accounts: &BTreeSet<Account>,
    servers: &BTreeSet<Blockchain>,
    template: &SessionNamespaces,
) -> SessionNamespaces {
    let granted = |in_scope: &dyn Fn(&Blockchain) -> bool| -> BTreeSet<Account> {
        accounts
            .iter()
            .filter(|a| servers.contains(a.chain()) && in_scope(a.chain()))
            .cloned()
            .collect()
    };

    let mut namespaces = SessionNamespaces::new();
    for (key, existing) in template {
        namespaces.insert(
            key.clone(),
            SessionNamespace {
                accounts: granted(&|chain: &Blockchain| key_matches(key, chain)),
                methods: existing.methods.clone(),
                events: existing.events.clone(),
            },
        );
    }

    let uncovered: BTreeSet<&str> = servers
        .iter()
        .filter(|chain| !template.keys().any(|key| key_matches(key, chain)))
        .map(Blockchain::namespace)
        .collect();
    for family in uncovered {
        let (methods, events) = default_capabilities(family);
        namespaces.insert(
            family.to_owned(),
            SessionNamespace {
                accounts: granted(&|chain: &Blockchain| chain.namespace() == family),
                methods,
                events,
            },
        );
    }
    namespaces
}

/// Applies `update` to `record` as one complete namespace computation.
pub fn apply_session_update(
    record: &mut SessionRecord,
    update: SessionUpdate,
    now: TimestampMs,
) -> Result<(), ResolveError> {
    match update {
        SessionUpdate::Accounts(accounts) => {
            record.namespaces =
                build_session_namespaces(&accounts, &record.servers, &record.namespaces);
        }
        SessionUpdate::Servers { servers, accounts } => {
            let namespaces = resolve_server_namespaces(&accounts, &servers, &record.namespaces)?;
            record.servers = servers;
            record.namespaces = namespaces;
        }
        SessionUpdate::Namespaces(namespaces) => {
            record.namespaces = namespaces;
        }
    }
    record.updated_at_ms = now;
    Ok(())
}

fn key_matches(key: &str, chain: &Blockchain) -> bool {
    key == chain.namespace() || key.parse::<Blockchain>().is_ok_and(|k| &k == chain)
}

fn default_capabilities(family: &str) -> (BTreeSet<String>, BTreeSet<String>) {
    if family != EIP155 {
        return (BTreeSet::new(), BTreeSet::new());
    }
    (
        DEFAULT_EIP155_METHODS.iter().map(|m| (*m).to_owned()).collect(),
        DEFAULT_EIP155_EVENTS.iter().map(|e| (*e).to_owned()).collect(),
    )
}
