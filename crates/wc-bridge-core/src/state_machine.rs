use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalState {
    Idle,
    ProposalReceived,
    AwaitingUserDecision,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalAction {
    Receive,
    AwaitDecision,
    Approve,
    Reject,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ProposalState,
    pub to: ProposalState,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionLogRecord {
    pub event_seq: u64,
    pub proposal_id: String,
    pub transition: StateTransition,
}

pub fn proposal_transition(
    state: ProposalState,
    action: ProposalAction,
) -> Result<(ProposalState, StateTransition), PortError> {
    use ProposalAction as A;
    use ProposalState as S;

    let (to, reason) = match (state, action) {
        (S::Idle, A::Receive) => (S::ProposalReceived, "proposal_received"),
        (S::ProposalReceived, A::AwaitDecision) => (S::AwaitingUserDecision, "awaiting_decision"),
        // Structural validation failures never reach the user.
        (S::ProposalReceived, A::Reject) => (S::Rejected, "invalid_proposal"),
        (S::AwaitingUserDecision, A::Approve) => (S::Approved, "approved"),
        (S::AwaitingUserDecision, A::Reject) => (S::Rejected, "rejected"),
        (S::Approved | S::Rejected, A::Complete) => (S::Idle, "completed"),
        _ => {
            return Err(PortError::Validation(format!(
                "illegal proposal transition: {state:?} --{action:?}-->"
            )))
        }
    };
    Ok((
        to,
        StateTransition {
            from: state,
            to,
            reason,
        },
    ))
}
