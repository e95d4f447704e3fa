//! Integration tests for the peer registry

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use turnlink::error::ProtocolError;
use turnlink::peer::{JoinState, PeerRegistry};
use turnlink::MAX_PEERS;

#[test]
fn test_full_registry_rejects_fifth_peer() {
    let mut registry = PeerRegistry::new();
    registry.add_peer("host", true, true, None, JoinState::Joined);
    for i in 1..MAX_PEERS {
        assert!(registry
            .add_peer(format!("client {i}"), false, false, None, JoinState::Joining)
            .is_some());
    }
    assert_eq!(registry.count(), 4);
    assert!(registry.is_full());

    assert!(registry
        .add_peer("late", false, false, None, JoinState::Joining)
        .is_none());
    assert_eq!(registry.count(), 4);
    assert!(matches!(
        registry.try_add_peer("late", false, false, None, JoinState::Joining),
        Err(ProtocolError::RegistryFull(4))
    ));
}

#[test]
fn test_lookup_helpers() {
    let mut registry = PeerRegistry::new();
    assert!(registry.local_peer().is_none());
    assert!(registry.host_peer().is_none());

    registry.add_peer("Host...", false, true, None, JoinState::Joining);
    registry.add_peer("me", true, false, None, JoinState::Joining);

    assert_eq!(registry.host_peer().unwrap().id(), 0);
    assert_eq!(registry.local_peer().unwrap().id(), 1);
    assert!(registry.remote_connections().is_empty());
    assert!(registry.get_peer(2).is_err());
}

#[test]
fn test_removed_callbacks_see_every_peer_on_reset() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PeerRegistry::new();
    let sink = Arc::clone(&seen);
    registry.register_peer_removed_callback(Box::new(move |peer| {
        sink.lock().unwrap().push(peer.name.clone());
    }));

    registry.add_peer("host", true, true, None, JoinState::Joined);
    registry.add_peer("bob", false, false, None, JoinState::Joined);
    registry.reset();

    assert_eq!(*seen.lock().unwrap(), vec!["host", "bob"]);
}

#[test]
fn test_release_peer_without_connection_is_noop() {
    let mut registry = PeerRegistry::new();
    registry.add_peer("host", true, true, None, JoinState::Joined);
    assert!(!registry.release_peer(0).unwrap());
    assert!(registry.release_peer(9).is_err());
}

#[derive(Debug, Clone)]
enum Op {
    Add { local: bool, host: bool },
    Reset,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (any::<bool>(), any::<bool>()).prop_map(|(local, host)| Op::Add { local, host }),
        1 => Just(Op::Reset),
    ]
}

// Property: count stays bounded, ids stay dense and unique, roles stay unique
proptest! {
    #[test]
    fn prop_registry_invariants(ops in prop::collection::vec(op(), 0..40)) {
        let mut registry = PeerRegistry::new();
        for op in ops {
            let before = registry.count();
            match op {
                Op::Add { local, host } => {
                    let added = registry
                        .add_peer("p", local, host, None, JoinState::Joining)
                        .is_some();
                    if before == MAX_PEERS {
                        prop_assert!(!added);
                        prop_assert_eq!(registry.count(), before);
                    }
                }
                Op::Reset => {
                    registry.reset();
                }
            }

            prop_assert!(registry.count() <= MAX_PEERS);
            let ids: HashSet<_> = registry.iter().map(|p| p.id()).collect();
            prop_assert_eq!(ids.len(), registry.count());
            prop_assert!(ids.iter().all(|id| *id < registry.count()));
            prop_assert!(registry.iter().filter(|p| p.is_local()).count() <= 1);
            prop_assert!(registry.iter().filter(|p| p.is_host()).count() <= 1);
        }
    }
}
