//! Serialises every provider input through a single task.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wc_bridge_core::{
    Account, Blockchain, ChainCatalogPort, DecisionPort, PortError, ProposalDecision,
    ProviderInput, Response, SessionProvider, SessionRequest, SessionStorePort, TransportEvent,
    TransportPort,
};

#[derive(Debug)]
enum Envelope {
    Input(ProviderInput),
    Flush(oneshot::Sender<()>),
}

/// Sending side of the provider loop. Cloning is cheap; the loop stops once
/// every handle is dropped.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BridgeHandle {
    pub async fn send(&self, input: ProviderInput) -> Result<(), PortError> {
        self.enqueue(Envelope::Input(input)).await
    }

    /// Resolves once every input sent before it has been dispatched.
    pub async fn flush(&self) -> Result<(), PortError> {
        let (done, wait) = oneshot::channel();
        self.enqueue(Envelope::Flush(done)).await?;
        wait.await.map_err(|_| PortError::Transport("bridge loop stopped".to_owned()))
    }

    async fn enqueue(&self, envelope: Envelope) -> Result<(), PortError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| PortError::Transport("bridge loop stopped".to_owned()))
    }

    pub async fn transport_event(&self, event: TransportEvent) -> Result<(), PortError> {
        self.send(ProviderInput::Transport(event)).await
    }

    pub async fn decide(&self, proposal_id: &str, proceed: bool) -> Result<(), PortError> {
        self.send(ProviderInput::Decision(ProposalDecision {
            proposal_id: proposal_id.to_owned(),
            proceed,
        }))
        .await
    }

    pub async fn respond(
        &self,
        request: SessionRequest,
        response: Response,
    ) -> Result<(), PortError> {
        self.send(ProviderInput::Respond { request, response }).await
    }

    pub async fn accounts_changed(&self, accounts: Vec<Account>) -> Result<(), PortError> {
        self.send(ProviderInput::AccountsChanged(accounts)).await
    }

    pub async fn connect(&self, payload: impl Into<String>) -> Result<(), PortError> {
        self.send(ProviderInput::Connect(payload.into())).await
    }

    pub async fn update_session(
        &self,
        topic: impl Into<String>,
        servers: Vec<Blockchain>,
    ) -> Result<(), PortError> {
        self.send(ProviderInput::UpdateSession {
            topic: topic.into(),
            servers,
        })
        .await
    }

    pub async fn disconnect(&self, topic: impl Into<String>) -> Result<(), PortError> {
        self.send(ProviderInput::Disconnect(topic.into())).await
    }
}

pub fn spawn_provider<T, S, D, K>(
    provider: Arc<SessionProvider<T, S, D, K>>,
    buffer: usize,
) -> (BridgeHandle, JoinHandle<()>)
where
    T: TransportPort + 'static,
    S: SessionStorePort + 'static,
    D: DecisionPort + 'static,
    K: ChainCatalogPort + 'static,
{
    let (tx, mut rx) = mpsc::channel(buffer.max(1));
    let task = tokio::spawn(async move {
        info!("bridge loop started");
        while let Some(envelope) = rx.recv().await {
            let input = match envelope {
                Envelope::Input(input) => input,
                Envelope::Flush(done) => {
                    let _ = done.send(());
                    continue;
                }
            };
            debug!(?input, "provider input");
            if let Err(e) = provider.dispatch(input) {
                warn!(error = %e, "provider input failed");
            }
        }
        info!("bridge loop stopped");
    });
    (BridgeHandle { tx }, task)
}
