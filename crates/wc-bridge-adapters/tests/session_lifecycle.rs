mod common;

use std::collections::BTreeSet;

use wc_bridge_adapters::{DecisionPrompt, TransportCall};
use wc_bridge_core::{Blockchain, Reason, SessionStorePort, TransportEvent};

use common::{account, active_session, drain, new_provider, settle};

const SYM_KEY: &str = "587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303";

#[test]
fn settled_session_is_stored_with_its_servers() {
    let (provider, _rx) = new_provider([account(1), account(137)]);
    settle(&provider, active_session("t1", &[1, 137]));

    let record = provider.session("t1").expect("read").expect("stored");
    assert_eq!(
        record.servers,
        BTreeSet::from([Blockchain::eip155(1), Blockchain::eip155(137)])
    );
    assert_eq!(record.accounts().len(), 2);
    assert!(provider.is_connected("t1"));

    settle(&provider, active_session("t1", &[1, 137]));
    let again = provider.session("t1").expect("read").expect("stored");
    assert_eq!(again.created_at_ms, record.created_at_ms);
    assert!(again.updated_at_ms > record.updated_at_ms);
}

#[test]
fn peer_delete_is_idempotent() {
    let (provider, _rx) = new_provider([account(1)]);
    settle(&provider, active_session("t1", &[1]));

    let delete = TransportEvent::SessionDelete {
        topic: "t1".to_owned(),
        reason: Reason {
            code: 6000,
            message: "User disconnected.".to_owned(),
        },
    };
    provider.handle_event(delete.clone()).expect("first delete");
    provider.handle_event(delete).expect("second delete");
    assert!(provider.session("t1").expect("read").is_none());
    assert!(provider.transport.calls().expect("calls").is_empty());
}

#[test]
fn disconnect_removes_session_and_notifies_relay_once() {
    let (provider, _rx) = new_provider([account(1)]);
    settle(&provider, active_session("t1", &[1]));

    provider.disconnect_session("t1").expect("disconnect");
    provider.disconnect_session("t1").expect("disconnect again");

    assert!(!provider.store.contains("t1").expect("contains"));
    assert!(!provider.is_connected("t1"));
    assert_eq!(
        provider.transport.calls().expect("calls"),
        vec![TransportCall::Disconnect {
            topic: "t1".to_owned()
        }]
    );
}

#[test]
fn peer_namespace_update_replaces_stored_namespaces() {
    let (provider, _rx) = new_provider([account(1), account(10)]);
    settle(&provider, active_session("t1", &[1]));

    let namespaces = active_session("t1", &[1, 10]).namespaces;
    provider
        .handle_event(TransportEvent::SessionUpdate {
            topic: "t1".to_owned(),
            namespaces: namespaces.clone(),
        })
        .expect("peer update");
    provider
        .handle_event(TransportEvent::SessionUpdate {
            topic: "unknown".to_owned(),
            namespaces: namespaces.clone(),
        })
        .expect("update for unknown topic");

    let record = provider.session("t1").expect("read").expect("stored");
    assert_eq!(record.namespaces, namespaces);
    assert!(!record.servers.contains(&Blockchain::eip155(10)));
    assert!(provider.session("unknown").expect("read").is_none());
}

#[test]
fn update_session_narrows_servers_and_pushes_namespaces() {
    let (provider, _rx) = new_provider([account(1), account(137)]);
    settle(&provider, active_session("t1", &[1, 137]));

    provider
        .update_session("t1", [Blockchain::eip155(1)])
        .expect("update session");

    let record = provider.session("t1").expect("read").expect("stored");
    assert_eq!(record.servers, BTreeSet::from([Blockchain::eip155(1)]));
    assert_eq!(record.accounts(), BTreeSet::from([account(1)]));

    let calls = provider.transport.calls().expect("calls");
    assert!(matches!(
        calls.as_slice(),
        [TransportCall::Update { topic, namespaces }]
            if topic == "t1" && namespaces == &record.namespaces
    ));
}

#[test]
fn update_session_without_matching_accounts_leaves_session_alone() {
    let (provider, mut rx) = new_provider([account(1), account(137)]);
    settle(&provider, active_session("t1", &[1, 137]));
    let before = provider.session("t1").expect("read");

    provider
        .update_session("t1", [Blockchain::eip155(10)])
        .expect("update session");
    provider
        .update_session("missing", [Blockchain::eip155(1)])
        .expect("unknown topic");

    assert_eq!(provider.session("t1").expect("read"), before);
    assert!(provider.transport.calls().expect("calls").is_empty());
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [DecisionPrompt::Failure(_)]
    ));
}

#[test]
fn connect_only_forwards_valid_pairing_uris() {
    let (provider, _rx) = new_provider([account(1)]);
    let uri = format!("wc:7f6e504bfad60b48@2?relay-protocol=irn&symKey={SYM_KEY}");

    provider.connect("not a pairing uri");
    provider.connect("wc:8a5e5bdc@1?bridge=https%3A%2F%2Fbridge&key=41");
    provider.connect(&uri);

    provider.transport.set_offline(true).expect("offline");
    provider.connect(&uri);

    assert_eq!(
        provider.transport.calls().expect("calls"),
        vec![TransportCall::Connect { uri }]
    );
}
