#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::Address;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use wc_bridge_adapters::{
    ChainCatalogAdapter, ChannelDecisionAdapter, DecisionPrompt, SessionStoreAdapter,
    WalletConnectAdapter,
};
use wc_bridge_core::{
    Account, ActiveSession, Blockchain, ClockPort, PeerMetadata, PortError, Proposal,
    ProposalNamespace, ProposalNamespaces, SessionNamespace, SessionNamespaces, SessionProvider,
    SessionRequest, TransportEvent,
};

#[derive(Debug, Default)]
pub struct TestClock {
    now: AtomicU64,
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.now.fetch_add(1, Ordering::SeqCst) + 1_739_750_400_000)
    }
}

pub type TestProvider = SessionProvider<
    WalletConnectAdapter,
    SessionStoreAdapter<TestClock>,
    ChannelDecisionAdapter,
    ChainCatalogAdapter,
>;

pub fn new_provider(
    accounts: impl IntoIterator<Item = Account>,
) -> (TestProvider, UnboundedReceiver<DecisionPrompt>) {
    let (decisions, rx) = ChannelDecisionAdapter::new();
    let provider = SessionProvider::new(
        WalletConnectAdapter::in_memory(),
        SessionStoreAdapter::with_clock(TestClock::default()),
        decisions,
        ChainCatalogAdapter::default(),
        accounts,
    );
    (provider, rx)
}

pub fn drain(rx: &mut UnboundedReceiver<DecisionPrompt>) -> Vec<DecisionPrompt> {
    let mut prompts = Vec::new();
    while let Ok(prompt) = rx.try_recv() {
        prompts.push(prompt);
    }
    prompts
}

pub fn owner_address() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid owner address")
}

pub fn account(chain_id: u64) -> Account {
    Account::eip155(chain_id, owner_address())
}

pub fn peer(name: &str) -> PeerMetadata {
    PeerMetadata {
        name: name.to_owned(),
        url: "https://example.org".to_owned(),
        description: format!("{name} test dApp"),
        icons: vec!["https://example.org/icon.png".to_owned()],
    }
}

pub fn eip155_required(chain_ids: &[u64]) -> ProposalNamespaces {
    ProposalNamespaces::from([(
        "eip155".to_owned(),
        ProposalNamespace {
            chains: chain_ids.iter().copied().map(Blockchain::eip155).collect(),
            methods: BTreeSet::from(["eth_sendTransaction".to_owned(), "personal_sign".to_owned()]),
            events: BTreeSet::from(["chainChanged".to_owned()]),
        },
    )])
}

pub fn proposal(id: &str, chain_ids: &[u64]) -> Proposal {
    Proposal {
        id: id.to_owned(),
        proposer: peer(id),
        required_namespaces: eip155_required(chain_ids),
    }
}

pub fn active_session(topic: &str, chain_ids: &[u64]) -> ActiveSession {
    ActiveSession {
        topic: topic.to_owned(),
        peer: peer(topic),
        namespaces: SessionNamespaces::from([(
            "eip155".to_owned(),
            SessionNamespace {
                accounts: chain_ids.iter().map(|id| account(*id)).collect(),
                methods: BTreeSet::from(["personal_sign".to_owned()]),
                events: BTreeSet::from(["chainChanged".to_owned()]),
            },
        )]),
        required_namespaces: eip155_required(chain_ids),
    }
}

/// Registers `session` with the relay and delivers the settle event.
pub fn settle(provider: &TestProvider, session: ActiveSession) {
    provider
        .transport
        .insert_session(session.clone())
        .expect("insert active session");
    provider
        .handle_event(TransportEvent::SessionSettle(session))
        .expect("settle session");
}

pub fn personal_sign(id: u64, topic: &str, chain_id: u64) -> SessionRequest {
    SessionRequest {
        id,
        topic: topic.to_owned(),
        chain: Blockchain::eip155(chain_id),
        method: "personal_sign".to_owned(),
        params: json!(["0x68656c6c6f", owner_address().to_string()]),
    }
}
