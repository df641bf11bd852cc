pub mod decoder;
pub mod domain;
pub mod namespaces;
pub mod ports;
pub mod provider;
pub mod state_machine;
pub mod uri;

pub use decoder::{decode_request, DecodeError};
pub use domain::{
    Account, Action, ActionPrompt, ActiveSession, AddChainRequest, Blockchain, IdentifierError,
    NativeCurrency, PeerMetadata, Proposal, ProposalDecision, ProposalNamespace,
    ProposalNamespaces, ProposalPrompt, ProposalRejection, ProposalSummary, Reason, RequestId,
    Response, ResponseError, RpcErrorPayload, RpcOutcome, RpcServer, ServerEditing,
    SessionNamespace, SessionNamespaces, SessionRecord, SessionRequest, SessionUpdate,
    TimestampMs, TransactionRequest, TransportEvent, EIP155,
};
pub use namespaces::{
    apply_session_update, build_session_namespaces, resolve_proposal_namespaces,
    resolve_server_namespaces, validate_network_mix, ResolveError, StructuralError,
};
pub use ports::{
    BridgeError, ChainCatalogPort, ClockPort, DecisionPort, PortError, SessionStorePort,
    TransportPort,
};
pub use provider::{proposal_summary, ProviderInput, SessionProvider, PROPOSAL_REJECTION};
pub use state_machine::{
    proposal_transition, ProposalAction, ProposalState, StateTransition, TransitionLogRecord,
};
pub use uri::{PairingUri, UriError};
