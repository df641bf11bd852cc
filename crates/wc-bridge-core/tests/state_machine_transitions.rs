use wc_bridge_core::{proposal_transition, ProposalAction, ProposalState};

#[test]
fn proposal_approve_path_transitions() {
    let (s1, _) =
        proposal_transition(ProposalState::Idle, ProposalAction::Receive).expect("idle -> received");
    assert_eq!(s1, ProposalState::ProposalReceived);
    let (s2, _) =
        proposal_transition(s1, ProposalAction::AwaitDecision).expect("received -> awaiting");
    assert_eq!(s2, ProposalState::AwaitingUserDecision);
    let (s3, t) = proposal_transition(s2, ProposalAction::Approve).expect("awaiting -> approved");
    assert_eq!(s3, ProposalState::Approved);
    assert_eq!(t.from, ProposalState::AwaitingUserDecision);
    let (s4, _) = proposal_transition(s3, ProposalAction::Complete).expect("approved -> idle");
    assert_eq!(s4, ProposalState::Idle);
}

#[test]
fn invalid_proposal_is_rejected_before_decision() {
    let (s, t) = proposal_transition(ProposalState::ProposalReceived, ProposalAction::Reject)
        .expect("received -> rejected");
    assert_eq!(s, ProposalState::Rejected);
    assert_eq!(t.reason, "invalid_proposal");
}

#[test]
fn proposal_cannot_be_approved_without_decision() {
    let err = proposal_transition(ProposalState::ProposalReceived, ProposalAction::Approve)
        .expect_err("must fail");
    assert!(err.to_string().contains("illegal proposal transition"));

    let err = proposal_transition(ProposalState::Idle, ProposalAction::Complete)
        .expect_err("must fail");
    assert!(err.to_string().contains("illegal proposal transition"));
}
