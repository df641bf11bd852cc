use thiserror::Error;

use crate::decoder::DecodeError;
use crate::domain::{
    ActionPrompt, ActiveSession, Blockchain, ProposalPrompt, ProposalRejection, RequestId,
    RpcOutcome, RpcServer, SessionNamespaces, SessionRecord, SessionUpdate,
};
use crate::namespaces::{ResolveError, StructuralError};
use crate::uri::PairingUri;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("namespace resolution failed: {0}")]
    Resolve(#[from] ResolveError),
}

/// Failures reported to the decision collaborator for diagnostics.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Pairing/relay client. Payloads cross it already decrypted.
pub trait TransportPort: Send + Sync {
    fn connect(&self, uri: &PairingUri) -> Result<(), PortError>;
    fn approve(&self, proposal_id: &str, namespaces: &SessionNamespaces) -> Result<(), PortError>;
    fn reject(&self, proposal_id: &str, reason: ProposalRejection) -> Result<(), PortError>;
    fn update(&self, topic: &str, namespaces: &SessionNamespaces) -> Result<(), PortError>;
    fn disconnect(&self, topic: &str) -> Result<(), PortError>;
    fn respond(
        &self,
        topic: &str,
        request_id: RequestId,
        outcome: RpcOutcome,
    ) -> Result<(), PortError>;
    fn active_sessions(&self) -> Result<Vec<ActiveSession>, PortError>;
}

pub trait SessionStorePort: Send + Sync {
    fn all(&self) -> Result<Vec<SessionRecord>, PortError>;
    fn session(&self, topic: &str) -> Result<Option<SessionRecord>, PortError>;
    fn contains(&self, topic: &str) -> Result<bool, PortError>;
    /// Applies `update` atomically. Fails with `NotFound` for unknown topics.
    fn update(&self, topic: &str, update: SessionUpdate) -> Result<SessionRecord, PortError>;
    fn add_or_update(&self, session: &ActiveSession) -> Result<SessionRecord, PortError>;
    /// Returns whether a session was removed.
    fn remove(&self, topic: &str) -> Result<bool, PortError>;
}

/// Human-facing approval and signing. Every prompt must be answered exactly
/// once: proposals through `SessionProvider::resolve_proposal`, actions
/// through `SessionProvider::respond`.
pub trait DecisionPort: Send + Sync {
    fn should_connect(&self, prompt: ProposalPrompt);
    fn handle_action(&self, prompt: ActionPrompt);
    fn did_fail(&self, error: &BridgeError);
}

pub trait ChainCatalogPort: Send + Sync {
    fn server(&self, chain: &Blockchain) -> Option<RpcServer>;
    fn is_enabled(&self, server: &RpcServer) -> bool;
}

pub trait ClockPort: Send + Sync {
    fn now_ms(&self) -> Result<u64, PortError>;
}
