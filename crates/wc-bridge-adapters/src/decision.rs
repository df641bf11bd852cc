use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::warn;
use wc_bridge_core::{ActionPrompt, BridgeError, DecisionPort, ProposalPrompt};

/// A prompt waiting on the human side of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionPrompt {
    Proposal(ProposalPrompt),
    Action(ActionPrompt),
    Failure(String),
}

/// Forwards every prompt onto a channel. Answers come back through
/// `BridgeHandle::decide` and `BridgeHandle::respond`.
#[derive(Debug, Clone)]
pub struct ChannelDecisionAdapter {
    tx: UnboundedSender<DecisionPrompt>,
}

impl ChannelDecisionAdapter {
    pub fn new() -> (Self, UnboundedReceiver<DecisionPrompt>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, prompt: DecisionPrompt) {
        if let Err(e) = self.tx.send(prompt) {
            warn!(prompt = ?e.0, "decision receiver dropped");
        }
    }
}

impl DecisionPort for ChannelDecisionAdapter {
    fn should_connect(&self, prompt: ProposalPrompt) {
        self.send(DecisionPrompt::Proposal(prompt));
    }

    fn handle_action(&self, prompt: ActionPrompt) {
        self.send(DecisionPrompt::Action(prompt));
    }

    fn did_fail(&self, error: &BridgeError) {
        self.send(DecisionPrompt::Failure(error.to_string()));
    }
}
