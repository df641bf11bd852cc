use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::decoder::decode_request;
use crate::domain::{
    required_chains, Account, ActionPrompt, ActiveSession, Blockchain, Proposal, ProposalDecision,
    ProposalPrompt, ProposalRejection, ProposalSummary, Reason, RequestId, Response,
    ResponseError, RpcOutcome, ServerEditing, SessionNamespaces, SessionRecord, SessionRequest,
    SessionUpdate, TransportEvent,
};
use crate::namespaces::{resolve_proposal_namespaces, validate_network_mix};
use crate::ports::{
    BridgeError, ChainCatalogPort, DecisionPort, PortError, SessionStorePort, TransportPort,
};
use crate::state_machine::{
    proposal_transition, ProposalAction, ProposalState, TransitionLogRecord,
};
use crate::uri::PairingUri;

/// Every proposal that ends without approval is refused with this reason.
pub const PROPOSAL_REJECTION: ProposalRejection = ProposalRejection::UserRejectedChains;

const TRANSITION_LOG_LIMIT: usize = 256;

/// Everything the provider reacts to, funnelled through `dispatch`.
#[derive(Debug, Clone)]
pub enum ProviderInput {
    Transport(TransportEvent),
    Decision(ProposalDecision),
    AccountsChanged(Vec<Account>),
    Respond {
        request: SessionRequest,
        response: Response,
    },
    Connect(String),
    UpdateSession {
        topic: String,
        servers: Vec<Blockchain>,
    },
    Disconnect(String),
}

#[derive(Debug)]
struct CurrentProposal {
    proposal: Proposal,
    state: ProposalState,
}

#[derive(Debug, Default)]
struct ProviderState {
    current: Option<CurrentProposal>,
    pending: VecDeque<Proposal>,
    accounts: BTreeSet<Account>,
    in_flight: HashMap<(String, RequestId), SessionRequest>,
    transitions: VecDeque<TransitionLogRecord>,
    event_seq: u64,
}

impl ProviderState {
    fn advance(&mut self, action: ProposalAction) -> Result<ProposalState, PortError> {
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| PortError::Conflict("no current proposal".to_owned()))?;
        let (next, transition) = proposal_transition(current.state, action)?;
        current.state = next;
        let proposal_id = current.proposal.id.clone();

        self.event_seq = self.event_seq.saturating_add(1);
        if self.transitions.len() == TRANSITION_LOG_LIMIT {
            self.transitions.pop_front();
        }
        self.transitions.push_back(TransitionLogRecord {
            event_seq: self.event_seq,
            proposal_id,
            transition,
        });
        Ok(next)
    }

    /// Makes `proposal` current in `ProposalReceived`.
    fn start(&mut self, proposal: Proposal) -> Result<(), PortError> {
        self.current = Some(CurrentProposal {
            proposal,
            state: ProposalState::Idle,
        });
        self.advance(ProposalAction::Receive).map(|_| ())
    }
}

/// The WalletConnect v2 session state machine.
///
/// One proposal is decided at a time; later proposals wait in FIFO order.
/// Ports are never called while the internal lock is held, so collaborators
/// may call back into the provider from inside a port method.
pub struct SessionProvider<T, S, D, K>
where
    T: TransportPort,
    S: SessionStorePort,
    D: DecisionPort,
    K: ChainCatalogPort,
{
    pub transport: T,
    pub store: S,
    pub decisions: D,
    pub catalog: K,
    state: Mutex<ProviderState>,
}

impl<T, S, D, K> SessionProvider<T, S, D, K>
where
    T: TransportPort,
    S: SessionStorePort,
    D: DecisionPort,
    K: ChainCatalogPort,
{
    pub fn new(
        transport: T,
        store: S,
        decisions: D,
        catalog: K,
        accounts: impl IntoIterator<Item = Account>,
    ) -> Self {
        Self {
            transport,
            store,
            decisions,
            catalog,
            state: Mutex::new(ProviderState {
                accounts: accounts.into_iter().collect(),
                ..ProviderState::default()
            }),
        }
    }

    pub fn dispatch(&self, input: ProviderInput) -> Result<(), PortError> {
        match input {
            ProviderInput::Transport(event) => self.handle_event(event),
            ProviderInput::Decision(decision) => self.resolve_proposal(decision),
            ProviderInput::AccountsChanged(accounts) => self.reload_sessions(accounts),
            ProviderInput::Respond { request, response } => self.respond(&response, &request),
            ProviderInput::Connect(payload) => {
                self.connect(&payload);
                Ok(())
            }
            ProviderInput::UpdateSession { topic, servers } => {
                self.update_session(&topic, servers)
            }
            ProviderInput::Disconnect(topic) => self.disconnect_session(&topic),
        }
    }

    pub fn handle_event(&self, event: TransportEvent) -> Result<(), PortError> {
        match event {
            TransportEvent::SessionProposal(proposal) => self.did_receive_proposal(proposal),
            TransportEvent::SessionRequest(request) => self.did_receive_request(request),
            TransportEvent::SessionDelete { topic, reason } => self.did_delete(&topic, &reason),
            TransportEvent::SessionSettle(session) => self.did_settle(&session),
            TransportEvent::SessionUpdate { topic, namespaces } => {
                self.did_update(&topic, namespaces)
            }
        }
    }

    /// Pairs with a peer. Unparseable payloads and transport failures are
    /// logged and dropped.
    pub fn connect(&self, payload: &str) {
        let uri = match payload.parse::<PairingUri>() {
            Ok(uri) => uri,
            Err(e) => {
                warn!(error = %e, "ignoring pairing payload");
                return;
            }
        };
        info!(topic = %uri.topic, "pairing");
        if let Err(e) = self.transport.connect(&uri) {
            warn!(topic = %uri.topic, error = %e, "pairing failed");
        }
    }

    pub fn update_session(
        &self,
        topic: &str,
        servers: impl IntoIterator<Item = Blockchain>,
    ) -> Result<(), PortError> {
        let accounts = self.lock()?.accounts.clone();
        let update = SessionUpdate::Servers {
            servers: servers.into_iter().collect(),
            accounts,
        };
        match self.store.update(topic, update) {
            Ok(session) => self.transport.update(topic, &session.namespaces),
            Err(PortError::NotFound(_)) => {
                debug!(topic, "update for unknown session ignored");
                Ok(())
            }
            Err(PortError::Resolve(e)) => {
                warn!(topic, error = %e, "session servers left unchanged");
                self.decisions.did_fail(&BridgeError::Resolve(e));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn disconnect_session(&self, topic: &str) -> Result<(), PortError> {
        self.forget_requests(topic)?;
        if !self.store.contains(topic)? {
            debug!(topic, "disconnect for unknown session ignored");
            return Ok(());
        }
        info!(topic, "disconnecting session");
        self.store.remove(topic)?;
        self.transport.disconnect(topic)
    }

    /// Sends the single response owed for `request`. A second response, or
    /// one for a request that never reached the collaborator, is refused.
    pub fn respond(&self, response: &Response, request: &SessionRequest) -> Result<(), PortError> {
        let key = (request.topic.clone(), request.id);
        if self.lock()?.in_flight.remove(&key).is_none() {
            return Err(PortError::NotFound(format!(
                "no pending request {} on topic {}",
                request.id, request.topic
            )));
        }
        info!(
            request_id = request.id,
            topic = %request.topic,
            ok = matches!(response, Response::Value(_)),
            "responding to session request"
        );
        self.transport
            .respond(&request.topic, request.id, RpcOutcome::from(response))
    }

    /// Re-grants every stored session against `accounts`. Sessions that lose
    /// all their accounts stay connected with empty account sets.
    pub fn reload_sessions(
        &self,
        accounts: impl IntoIterator<Item = Account>,
    ) -> Result<(), PortError> {
        let accounts: BTreeSet<Account> = accounts.into_iter().collect();
        self.lock()?.accounts = accounts.clone();

        for session in self.store.all()? {
            let covered: BTreeSet<Account> = accounts
                .iter()
                .filter(|a| session.servers.contains(a.chain()))
                .cloned()
                .collect();
            if covered.is_empty() {
                debug!(topic = %session.topic, "no wallet account covers session");
            }
            let updated = match self
                .store
                .update(&session.topic, SessionUpdate::Accounts(covered))
            {
                Ok(updated) => updated,
                Err(PortError::NotFound(_)) => continue,
                Err(e) => {
                    warn!(topic = %session.topic, error = %e, "failed to reload session");
                    continue;
                }
            };
            if let Err(e) = self.transport.update(&updated.topic, &updated.namespaces) {
                warn!(topic = %updated.topic, error = %e, "failed to push namespaces");
            }
        }
        Ok(())
    }

    /// Applies the collaborator's answer for the current proposal.
    pub fn resolve_proposal(&self, decision: ProposalDecision) -> Result<(), PortError> {
        let (proposal, verdict) = {
            let mut g = self.lock()?;
            let proposal = match &g.current {
                Some(c)
                    if c.proposal.id == decision.proposal_id
                        && c.state == ProposalState::AwaitingUserDecision =>
                {
                    c.proposal.clone()
                }
                _ => {
                    return Err(PortError::NotFound(format!(
                        "no proposal awaiting decision: {}",
                        decision.proposal_id
                    )))
                }
            };
            let verdict = decision
                .proceed
                .then(|| resolve_proposal_namespaces(&g.accounts, &proposal.required_namespaces));
            let action = match &verdict {
                Some(Ok(_)) => ProposalAction::Approve,
                _ => ProposalAction::Reject,
            };
            g.advance(action)?;
            (proposal, verdict)
        };

        let sent = match verdict {
            Some(Ok(namespaces)) => {
                info!(proposal_id = %proposal.id, "approving session proposal");
                self.transport.approve(&proposal.id, &namespaces)
            }
            Some(Err(e)) => {
                warn!(proposal_id = %proposal.id, error = %e, "no accounts for proposal");
                self.decisions.did_fail(&BridgeError::Resolve(e));
                self.transport.reject(&proposal.id, PROPOSAL_REJECTION)
            }
            None => {
                info!(proposal_id = %proposal.id, "session proposal declined");
                self.transport.reject(&proposal.id, PROPOSAL_REJECTION)
            }
        };

        let advanced = match self.complete_current(None)? {
            Some(next) => self.begin_proposal(next),
            None => Ok(()),
        };
        sent.and(advanced)
    }

    pub fn session(&self, topic: &str) -> Result<Option<SessionRecord>, PortError> {
        self.store.session(topic)
    }

    pub fn sessions(&self) -> Result<Vec<SessionRecord>, PortError> {
        self.store.all()
    }

    /// Whether the transport still lists `topic` as active.
    pub fn is_connected(&self, topic: &str) -> bool {
        self.transport
            .active_sessions()
            .map(|sessions| sessions.iter().any(|s| s.topic == topic))
            .unwrap_or(false)
    }

    pub fn proposal_state(&self) -> Result<ProposalState, PortError> {
        Ok(self
            .lock()?
            .current
            .as_ref()
            .map(|c| c.state)
            .unwrap_or(ProposalState::Idle))
    }

    pub fn current_proposal(&self) -> Result<Option<String>, PortError> {
        Ok(self.lock()?.current.as_ref().map(|c| c.proposal.id.clone()))
    }

    pub fn pending_proposals(&self) -> Result<Vec<String>, PortError> {
        Ok(self.lock()?.pending.iter().map(|p| p.id.clone()).collect())
    }

    pub fn pending_requests(&self) -> Result<Vec<SessionRequest>, PortError> {
        Ok(self.lock()?.in_flight.values().cloned().collect())
    }

    pub fn accounts(&self) -> Result<BTreeSet<Account>, PortError> {
        Ok(self.lock()?.accounts.clone())
    }

    pub fn transition_log(&self) -> Result<Vec<TransitionLogRecord>, PortError> {
        Ok(self.lock()?.transitions.iter().cloned().collect())
    }

    fn did_receive_proposal(&self, proposal: Proposal) -> Result<(), PortError> {
        {
            let mut g = self.lock()?;
            if g.current.is_some() {
                debug!(proposal_id = %proposal.id, queued = g.pending.len() + 1, "proposal queued");
                g.pending.push_back(proposal);
                return Ok(());
            }
            g.start(proposal.clone())?;
        }
        self.begin_proposal(proposal)
    }

    /// Validates `first` (already current) and hands it to the collaborator.
    /// Invalid proposals are refused on the spot and the queue keeps moving.
    fn begin_proposal(&self, first: Proposal) -> Result<(), PortError> {
        let mut next = Some(first);
        let mut outcome = Ok(());
        while let Some(proposal) = next.take() {
            info!(proposal_id = %proposal.id, peer = %proposal.proposer.name, "session proposal");
            if let Err(e) = validate_network_mix(&proposal.required_namespaces, &self.catalog) {
                warn!(proposal_id = %proposal.id, error = %e, "rejecting invalid proposal");
                self.decisions.did_fail(&BridgeError::Structural(e));
                let rejected = self.transport.reject(&proposal.id, PROPOSAL_REJECTION);
                next = self.complete_current(Some(ProposalAction::Reject))?;
                if outcome.is_ok() {
                    outcome = rejected;
                }
                continue;
            }

            self.lock()?.advance(ProposalAction::AwaitDecision)?;
            let summary = proposal_summary(&proposal, &self.catalog);
            self.decisions
                .should_connect(ProposalPrompt { proposal, summary });
        }
        outcome
    }

    /// Ends the current proposal and promotes the oldest queued one. The slot
    /// is cleared even if the recorded transition is out of order.
    fn complete_current(
        &self,
        verdict: Option<ProposalAction>,
    ) -> Result<Option<Proposal>, PortError> {
        let mut g = self.lock()?;
        let finished = match verdict {
            Some(action) => g.advance(action).and_then(|_| g.advance(ProposalAction::Complete)),
            None => g.advance(ProposalAction::Complete),
        };
        if let Err(e) = finished {
            warn!(error = %e, "clearing proposal slot after unexpected transition");
        }
        g.current = None;

        let next = g.pending.pop_front();
        if let Some(proposal) = &next {
            g.start(proposal.clone())?;
        }
        Ok(next)
    }

    fn did_receive_request(&self, request: SessionRequest) -> Result<(), PortError> {
        info!(
            request_id = request.id,
            topic = %request.topic,
            method = %request.method,
            "session request"
        );

        let server = self
            .catalog
            .server(&request.chain)
            .filter(|s| self.catalog.is_enabled(s));
        let Some(server) = server else {
            warn!(chain = %request.chain, "request targets a disabled chain");
            return self.reject_request(&request, ResponseError::InternalError);
        };

        let Some(session) = self.store.session(&request.topic)? else {
            warn!(topic = %request.topic, "request for unknown session");
            return self.reject_request(&request, ResponseError::RequestRejected);
        };

        match decode_request(&request) {
            Ok(action) => {
                {
                    let mut g = self.lock()?;
                    let key = (request.topic.clone(), request.id);
                    if g.in_flight.contains_key(&key) {
                        debug!(request_id = request.id, "duplicate request ignored");
                        return Ok(());
                    }
                    g.in_flight.insert(key, request.clone());
                }
                self.decisions.handle_action(ActionPrompt {
                    action,
                    request,
                    session,
                    server,
                });
                Ok(())
            }
            Err(e) => {
                warn!(request_id = request.id, error = %e, "request could not be decoded");
                self.decisions.did_fail(&BridgeError::Decode(e));
                self.reject_request(&request, ResponseError::RequestRejected)
            }
        }
    }

    fn reject_request(
        &self,
        request: &SessionRequest,
        error: ResponseError,
    ) -> Result<(), PortError> {
        info!(request_id = request.id, code = error.code(), "rejecting session request");
        self.transport.respond(
            &request.topic,
            request.id,
            RpcOutcome::from(&Response::from(error)),
        )
    }

    fn did_delete(&self, topic: &str, reason: &Reason) -> Result<(), PortError> {
        info!(topic, code = reason.code, reason = %reason.message, "session deleted");
        self.forget_requests(topic)?;
        self.store.remove(topic)?;
        Ok(())
    }

    /// Drops requests owed on `topic`; nothing can answer them once it closes.
    fn forget_requests(&self, topic: &str) -> Result<(), PortError> {
        let mut g = self.lock()?;
        let before = g.in_flight.len();
        g.in_flight.retain(|(t, _), _| t != topic);
        let dropped = before - g.in_flight.len();
        if dropped > 0 {
            debug!(topic, dropped, "dropped in-flight requests");
        }
        Ok(())
    }

    fn did_update(&self, topic: &str, namespaces: SessionNamespaces) -> Result<(), PortError> {
        info!(topic, "session namespaces updated by peer");
        match self.store.update(topic, SessionUpdate::Namespaces(namespaces)) {
            Ok(_) | Err(PortError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn did_settle(&self, session: &ActiveSession) -> Result<(), PortError> {
        info!(topic = %session.topic, "session settled");
        for active in self.transport.active_sessions()? {
            self.store.add_or_update(&active)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ProviderState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))
    }
}

/// What the collaborator is shown for `proposal`.
pub fn proposal_summary<K>(proposal: &Proposal, catalog: &K) -> ProposalSummary
where
    K: ChainCatalogPort + ?Sized,
{
    let servers = required_chains(&proposal.required_namespaces)
        .iter()
        .filter_map(|chain| catalog.server(chain))
        .collect();
    let methods: BTreeSet<String> = proposal
        .required_namespaces
        .values()
        .flat_map(|ns| ns.methods.iter().cloned())
        .collect();
    ProposalSummary {
        proposal_id: proposal.id.clone(),
        name: proposal.proposer.name.clone(),
        dapp_url: proposal.proposer.url.clone(),
        description: proposal.proposer.description.clone(),
        icon_url: proposal
            .proposer
            .icons
            .iter()
            .find(|icon| icon.starts_with("https://") || icon.starts_with("http://"))
            .cloned(),
        servers,
        methods: methods.into_iter().collect(),
        server_editing: ServerEditing::NotSupported,
    }
}
