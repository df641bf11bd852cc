use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const EIP155: &str = "eip155";

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("invalid CAIP-2 chain id: {0}")]
    Chain(String),
    #[error("invalid CAIP-10 account id: {0}")]
    Account(String),
}

/// CAIP-2 chain identifier, `namespace:reference`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Blockchain {
    namespace: String,
    reference: String,
}

impl Blockchain {
    pub fn new(namespace: &str, reference: &str) -> Result<Self, IdentifierError> {
        let namespace_ok = (3..=8).contains(&namespace.len())
            && namespace
                .bytes()
                .all(|b| b == b'-' || b.is_ascii_lowercase() || b.is_ascii_digit());
        let reference_ok = (1..=32).contains(&reference.len())
            && reference
                .bytes()
                .all(|b| b == b'-' || b == b'_' || b.is_ascii_alphanumeric());
        if !namespace_ok || !reference_ok {
            return Err(IdentifierError::Chain(format!("{namespace}:{reference}")));
        }
        Ok(Self {
            namespace: namespace.to_owned(),
            reference: reference.to_owned(),
        })
    }

    pub fn eip155(chain_id: u64) -> Self {
        Self {
            namespace: EIP155.to_owned(),
            reference: chain_id.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Numeric chain id for `eip155` chains, `None` for every other namespace.
    pub fn eip155_chain_id(&self) -> Option<u64> {
        if self.namespace != EIP155 {
            return None;
        }
        self.reference.parse().ok()
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl FromStr for Blockchain {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| IdentifierError::Chain(s.to_owned()))?;
        Self::new(namespace, reference).map_err(|_| IdentifierError::Chain(s.to_owned()))
    }
}

impl TryFrom<String> for Blockchain {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Blockchain> for String {
    fn from(value: Blockchain) -> Self {
        value.to_string()
    }
}

/// CAIP-10 account: an address bound to exactly one chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Account {
    chain: Blockchain,
    address: String,
}

impl Account {
    pub fn new(chain: Blockchain, address: &str) -> Result<Self, IdentifierError> {
        let address_ok = (1..=128).contains(&address.len())
            && address
                .bytes()
                .all(|b| b == b'-' || b == b'.' || b == b'%' || b.is_ascii_alphanumeric());
        if !address_ok {
            return Err(IdentifierError::Account(format!("{chain}:{address}")));
        }
        Ok(Self {
            chain,
            address: address.to_owned(),
        })
    }

    pub fn eip155(chain_id: u64, address: Address) -> Self {
        Self {
            chain: Blockchain::eip155(chain_id),
            address: address.to_checksum(None),
        }
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

impl FromStr for Account {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chain, address) = s
            .rsplit_once(':')
            .ok_or_else(|| IdentifierError::Account(s.to_owned()))?;
        let chain: Blockchain = chain
            .parse()
            .map_err(|_| IdentifierError::Account(s.to_owned()))?;
        Self::new(chain, address)
    }
}

impl TryFrom<String> for Account {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Account> for String {
    fn from(value: Account) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerMetadata {
    pub name: String,
    pub url: String,
    pub description: String,
    pub icons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalNamespace {
    pub chains: BTreeSet<Blockchain>,
    pub methods: BTreeSet<String>,
    pub events: BTreeSet<String>,
}

impl ProposalNamespace {
    /// Chains this entry requires. A key that is itself a CAIP-2 id
    /// (`eip155:1`) stands for that chain when no chains are listed.
    pub fn chains_for(&self, key: &str) -> BTreeSet<Blockchain> {
        if self.chains.is_empty() {
            if let Ok(chain) = key.parse::<Blockchain>() {
                return BTreeSet::from([chain]);
            }
        }
        self.chains.clone()
    }
}

pub type ProposalNamespaces = BTreeMap<String, ProposalNamespace>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionNamespace {
    pub accounts: BTreeSet<Account>,
    pub methods: BTreeSet<String>,
    pub events: BTreeSet<String>,
}

impl SessionNamespace {
    pub fn chains(&self) -> BTreeSet<Blockchain> {
        self.accounts.iter().map(|a| a.chain().clone()).collect()
    }
}

pub type SessionNamespaces = BTreeMap<String, SessionNamespace>;

pub fn granted_chains(namespaces: &SessionNamespaces) -> BTreeSet<Blockchain> {
    namespaces.values().flat_map(SessionNamespace::chains).collect()
}

pub fn required_chains(namespaces: &ProposalNamespaces) -> BTreeSet<Blockchain> {
    namespaces
        .iter()
        .flat_map(|(key, ns)| ns.chains_for(key))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: String,
    pub proposer: PeerMetadata,
    #[serde(default)]
    pub required_namespaces: ProposalNamespaces,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcServer {
    pub chain_id: u64,
    pub name: String,
    pub is_testnet: bool,
}

impl RpcServer {
    pub fn blockchain(&self) -> Blockchain {
        Blockchain::eip155(self.chain_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEditing {
    Supported,
    NotSupported,
}

/// The view of a proposal handed to the decision collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSummary {
    pub proposal_id: String,
    pub name: String,
    pub dapp_url: String,
    pub description: String,
    pub icon_url: Option<String>,
    pub servers: Vec<RpcServer>,
    pub methods: Vec<String>,
    pub server_editing: ServerEditing,
}

/// A session as the transport reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub topic: String,
    pub peer: PeerMetadata,
    #[serde(default)]
    pub namespaces: SessionNamespaces,
    #[serde(default)]
    pub required_namespaces: ProposalNamespaces,
}

/// A session as the store persists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub topic: String,
    pub peer: PeerMetadata,
    pub namespaces: SessionNamespaces,
    /// Chains the session asked for. Only the wallet widens or narrows this
    /// set; peer updates replace namespaces but never add servers.
    pub servers: BTreeSet<Blockchain>,
    pub created_at_ms: TimestampMs,
    pub updated_at_ms: TimestampMs,
}

impl SessionRecord {
    pub fn from_active(active: &ActiveSession, now: TimestampMs) -> Self {
        Self {
            topic: active.topic.clone(),
            peer: active.peer.clone(),
            namespaces: active.namespaces.clone(),
            servers: active_servers(active),
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// Overwrites everything the transport owns, keeping the creation time
    /// and the servers fixed when the session was first stored.
    pub fn merge_active(&mut self, active: &ActiveSession, now: TimestampMs) {
        self.peer = active.peer.clone();
        self.namespaces = active.namespaces.clone();
        self.updated_at_ms = now;
    }

    pub fn accounts(&self) -> BTreeSet<Account> {
        self.namespaces
            .values()
            .flat_map(|ns| ns.accounts.iter().cloned())
            .collect()
    }

    pub fn granted_chains(&self) -> BTreeSet<Blockchain> {
        granted_chains(&self.namespaces)
    }
}

fn active_servers(active: &ActiveSession) -> BTreeSet<Blockchain> {
    let mut servers = required_chains(&active.required_namespaces);
    servers.extend(granted_chains(&active.namespaces));
    servers
}

/// A complete change the store applies to one session in a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Grant these wallet accounts, restricted to the session's servers.
    Accounts(BTreeSet<Account>),
    /// Replace the session's servers and grant the accounts on them.
    Servers {
        servers: BTreeSet<Blockchain>,
        accounts: BTreeSet<Account>,
    },
    /// Namespaces pushed by the peer.
    Namespaces(SessionNamespaces),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub id: RequestId,
    pub topic: String,
    pub chain: Blockchain,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    SessionProposal(Proposal),
    SessionRequest(SessionRequest),
    SessionDelete { topic: String, reason: Reason },
    SessionSettle(ActiveSession),
    SessionUpdate {
        topic: String,
        namespaces: SessionNamespaces,
    },
}

/// Reasons sent back when a proposal is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalRejection {
    UserRejected,
    UserRejectedChains,
    UserRejectedMethods,
    UserRejectedEvents,
}

impl ProposalRejection {
    pub fn code(self) -> i64 {
        match self {
            Self::UserRejected => 5000,
            Self::UserRejectedChains => 5001,
            Self::UserRejectedMethods => 5002,
            Self::UserRejectedEvents => 5003,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::UserRejected => "User rejected.",
            Self::UserRejectedChains => "User rejected chains",
            Self::UserRejectedMethods => "User rejected methods",
            Self::UserRejectedEvents => "User rejected events",
        }
    }
}

/// JSON-RPC errors returned for session requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseError {
    InvalidJson,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ErrorResponse,
    RequestRejected,
}

impl ResponseError {
    pub fn code(self) -> i64 {
        match self {
            Self::InvalidJson => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ErrorResponse => -32010,
            Self::RequestRejected => -32050,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidJson => "Invalid JSON",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ErrorResponse => "Error response",
            Self::RequestRejected => "Request rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Value(Bytes),
    Error { code: i64, message: String },
}

impl From<ResponseError> for Response {
    fn from(value: ResponseError) -> Self {
        Self::Error {
            code: value.code(),
            message: value.message().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorPayload {
    pub code: i64,
    pub message: String,
}

/// What the transport sends back for one request id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcOutcome {
    Result(Value),
    Error(RpcErrorPayload),
}

impl From<&Response> for RpcOutcome {
    fn from(value: &Response) -> Self {
        match value {
            Response::Value(bytes) => Self::Result(Value::String(
                alloy::primitives::hex::encode_prefixed(bytes),
            )),
            Response::Error { code, message } => Self::Error(RpcErrorPayload {
                code: *code,
                message: message.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: Option<U256>,
    #[serde(alias = "input")]
    pub data: Option<Bytes>,
    #[serde(alias = "gasLimit")]
    pub gas: Option<U256>,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub nonce: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainRequest {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    pub native_currency: Option<NativeCurrency>,
    pub block_explorer_urls: Vec<String>,
}

/// What the wallet is being asked to do for one decoded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    SignTransaction(TransactionRequest),
    SendTransaction(TransactionRequest),
    SignMessage { address: Address, message: Bytes },
    SignPersonalMessage { address: Address, message: Bytes },
    SignTypedData { address: Address, typed_data: Value },
    SignTypedDataV4 { address: Address, typed_data: Value },
    SwitchChain { chain_id: u64 },
    AddChain(AddChainRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalPrompt {
    pub proposal: Proposal,
    pub summary: ProposalSummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPrompt {
    pub action: Action,
    pub request: SessionRequest,
    pub session: SessionRecord,
    pub server: RpcServer,
}

/// The collaborator's answer to a `ProposalPrompt`, correlated by proposal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDecision {
    pub proposal_id: String,
    pub proceed: bool,
}
