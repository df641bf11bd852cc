use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::debug;
use wc_bridge_core::{
    ActiveSession, PairingUri, PortError, ProposalRejection, RequestId, RpcOutcome,
    SessionNamespaces, TransportPort,
};

/// One outbound message the bridge handed to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum TransportCall {
    Connect {
        uri: String,
    },
    Approve {
        proposal_id: String,
        namespaces: SessionNamespaces,
    },
    Reject {
        proposal_id: String,
        code: i64,
        message: String,
    },
    Update {
        topic: String,
        namespaces: SessionNamespaces,
    },
    Disconnect {
        topic: String,
    },
    Respond {
        topic: String,
        request_id: RequestId,
        outcome: RpcOutcome,
    },
}

/// In-process relay client. Outbound calls are recorded in order and the
/// active-session list is whatever settle events put there.
#[derive(Debug, Clone, Default)]
pub struct WalletConnectAdapter {
    inner: Arc<Mutex<WalletConnectState>>,
}

#[derive(Debug, Default)]
struct WalletConnectState {
    sessions: BTreeMap<String, ActiveSession>,
    calls: Vec<TransportCall>,
    offline: bool,
}

impl WalletConnectAdapter {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session: ActiveSession) -> Result<(), PortError> {
        let mut g = self.lock()?;
        g.sessions.insert(session.topic.clone(), session);
        Ok(())
    }

    pub fn calls(&self) -> Result<Vec<TransportCall>, PortError> {
        Ok(self.lock()?.calls.clone())
    }

    pub fn take_calls(&self) -> Result<Vec<TransportCall>, PortError> {
        Ok(std::mem::take(&mut self.lock()?.calls))
    }

    /// While offline every outbound call fails without being recorded.
    pub fn set_offline(&self, offline: bool) -> Result<(), PortError> {
        self.lock()?.offline = offline;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, WalletConnectState>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("wc lock poisoned: {e}")))
    }

    fn send(
        &self,
        call: TransportCall,
        apply: impl FnOnce(&mut WalletConnectState),
    ) -> Result<(), PortError> {
        let mut g = self.lock()?;
        if g.offline {
            return Err(PortError::Transport("relay unreachable".to_owned()));
        }
        debug!(?call, "relay call");
        apply(&mut *g);
        g.calls.push(call);
        Ok(())
    }
}

impl TransportPort for WalletConnectAdapter {
    fn connect(&self, uri: &PairingUri) -> Result<(), PortError> {
        self.send(
            TransportCall::Connect {
                uri: uri.to_string(),
            },
            |_| {},
        )
    }

    fn approve(&self, proposal_id: &str, namespaces: &SessionNamespaces) -> Result<(), PortError> {
        self.send(
            TransportCall::Approve {
                proposal_id: proposal_id.to_owned(),
                namespaces: namespaces.clone(),
            },
            |_| {},
        )
    }

    fn reject(&self, proposal_id: &str, reason: ProposalRejection) -> Result<(), PortError> {
        self.send(
            TransportCall::Reject {
                proposal_id: proposal_id.to_owned(),
                code: reason.code(),
                message: reason.message().to_owned(),
            },
            |_| {},
        )
    }

    fn update(&self, topic: &str, namespaces: &SessionNamespaces) -> Result<(), PortError> {
        self.send(
            TransportCall::Update {
                topic: topic.to_owned(),
                namespaces: namespaces.clone(),
            },
            |g| {
                if let Some(session) = g.sessions.get_mut(topic) {
                    session.namespaces = namespaces.clone();
                }
            },
        )
    }

    fn disconnect(&self, topic: &str) -> Result<(), PortError> {
        self.send(
            TransportCall::Disconnect {
                topic: topic.to_owned(),
            },
            |g| {
                g.sessions.remove(topic);
            },
        )
    }

    fn respond(
        &self,
        topic: &str,
        request_id: RequestId,
        outcome: RpcOutcome,
    ) -> Result<(), PortError> {
        self.send(
            TransportCall::Respond {
                topic: topic.to_owned(),
                request_id,
                outcome,
            },
            |_| {},
        )
    }

    fn active_sessions(&self) -> Result<Vec<ActiveSession>, PortError> {
        Ok(self.lock()?.sessions.values().cloned().collect())
    }
}
