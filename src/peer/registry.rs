//! Bounded, append-only table of session peers.
//!
//! Peers are only ever appended; the table shrinks only through [`PeerRegistry::reset`].
//! Ids are the peer's index, so they are dense and never reused until a reset.
//!
//! Lookups for the local and host peer are linear scans over at most
//! [`MAX_PEERS`] entries.

use crate::config::MAX_PEERS;
use crate::error::{ProtocolError, Result};
use crate::peer::peer::{JoinState, Peer, PeerInfo};
use crate::protocol::types::PeerId;
use crate::transport::connection::Connection;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Notification hook invoked with a snapshot of the affected peer.
pub type PeerCallback = Box<dyn Fn(&PeerInfo) + Send + Sync + 'static>;

type SharedCallback = Arc<dyn Fn(&PeerInfo) + Send + Sync + 'static>;

/// Handle returned by callback registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Hook invocations collected by a registry change, run with [`fire`](Self::fire).
///
/// Lets a caller that keeps the registry behind a lock release the lock before
/// any hook runs, so hooks are free to call back into the owner.
#[must_use = "hooks only run once the notifications are fired"]
#[derive(Default)]
pub struct PeerNotifications {
    calls: Vec<(SharedCallback, PeerInfo)>,
}

impl PeerNotifications {
    fn queue(&mut self, hooks: &[(CallbackId, SharedCallback)], info: &PeerInfo) {
        for (_, hook) in hooks {
            self.calls.push((Arc::clone(hook), info.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Run every queued hook in the order the changes happened
    pub fn fire(self) {
        for (hook, info) in &self.calls {
            hook(info);
        }
    }
}

impl fmt::Debug for PeerNotifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerNotifications")
            .field("pending", &self.calls.len())
            .finish()
    }
}

pub struct PeerRegistry {
    peers: Vec<Peer>,
    capacity: usize,
    added_callbacks: Vec<(CallbackId, SharedCallback)>,
    removed_callbacks: Vec<(CallbackId, SharedCallback)>,
    next_callback_id: u64,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerRegistry")
            .field("peers", &self.peers)
            .field("capacity", &self.capacity)
            .field("added_callbacks", &self.added_callbacks.len())
            .field("removed_callbacks", &self.removed_callbacks.len())
            .finish()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::with_capacity(MAX_PEERS)
    }

    /// Registry holding at most `capacity` peers, clamped to `1..=MAX_PEERS`
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_PEERS);
        Self {
            peers: Vec::with_capacity(capacity),
            capacity,
            added_callbacks: Vec::new(),
            removed_callbacks: Vec::new(),
            next_callback_id: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.capacity
    }

    /// Append a peer and notify every "peer added" hook in registration order.
    ///
    /// Returns `None` (and logs why) when the registry is full or the peer
    /// would break the one-local/one-host rule.
    pub fn add_peer(
        &mut self,
        name: impl Into<String>,
        is_local: bool,
        is_host: bool,
        connection: Option<Arc<Connection>>,
        join_state: JoinState,
    ) -> Option<&Peer> {
        match self.try_add_peer(name, is_local, is_host, connection, join_state) {
            Ok(peer) => Some(peer),
            Err(e) => {
                error!(error = %e, "Rejected new peer");
                None
            }
        }
    }

    /// Like [`add_peer`](Self::add_peer), but reports why a peer was rejected.
    pub fn try_add_peer(
        &mut self,
        name: impl Into<String>,
        is_local: bool,
        is_host: bool,
        connection: Option<Arc<Connection>>,
        join_state: JoinState,
    ) -> Result<&Peer> {
        let (info, notices) =
            self.add_peer_deferred(name, is_local, is_host, connection, join_state)?;
        notices.fire();
        Ok(&self.peers[info.id])
    }

    /// Append a peer without running hooks; the caller fires the returned
    /// notifications once it is safe to.
    pub fn add_peer_deferred(
        &mut self,
        name: impl Into<String>,
        is_local: bool,
        is_host: bool,
        connection: Option<Arc<Connection>>,
        join_state: JoinState,
    ) -> Result<(PeerInfo, PeerNotifications)> {
        if self.is_full() {
            return Err(ProtocolError::RegistryFull(self.capacity));
        }
        if is_local && self.local_peer().is_some() {
            return Err(ProtocolError::Precondition("A local peer is already registered"));
        }
        if is_host && self.host_peer().is_some() {
            return Err(ProtocolError::Precondition("A host peer is already registered"));
        }

        let id = self.peers.len();
        let peer = Peer::new(id, name, is_local, is_host, connection, join_state)?;
        info!(
            peer = id,
            name = peer.name(),
            local = is_local,
            host = is_host,
            "Peer added"
        );
        let info = peer.info();
        self.peers.push(peer);

        let mut notices = PeerNotifications::default();
        notices.queue(&self.added_callbacks, &info);
        Ok((info, notices))
    }

    pub fn get_peer(&self, id: PeerId) -> Result<&Peer> {
        self.peers
            .get(id)
            .ok_or(ProtocolError::InvalidPeer(id as i64))
    }

    pub fn get_peer_mut(&mut self, id: PeerId) -> Result<&mut Peer> {
        self.peers
            .get_mut(id)
            .ok_or(ProtocolError::InvalidPeer(id as i64))
    }

    pub fn local_peer(&self) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.is_local())
    }

    pub fn local_peer_mut(&mut self) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|peer| peer.is_local())
    }

    pub fn host_peer(&self) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.is_host())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn infos(&self) -> Vec<PeerInfo> {
        self.peers.iter().map(Peer::info).collect()
    }

    /// Non-local peers whose connection is still open
    pub fn remote_connections(&self) -> Vec<(PeerId, Arc<Connection>)> {
        self.peers
            .iter()
            .filter(|peer| !peer.is_local())
            .filter_map(|peer| {
                peer.connection()
                    .filter(|conn| !conn.is_closed())
                    .map(|conn| (peer.id(), Arc::clone(conn)))
            })
            .collect()
    }

    /// Release one peer's connection after it dropped, keeping its slot.
    ///
    /// Fires the "peer removed" hooks if a connection was actually released.
    pub fn release_peer(&mut self, id: PeerId) -> Result<bool> {
        Ok(match self.release_peer_deferred(id)? {
            Some((_, notices)) => {
                notices.fire();
                true
            }
            None => false,
        })
    }

    /// [`release_peer`](Self::release_peer) with the hooks left to the caller.
    /// Returns `None` when the peer had no connection to release.
    pub fn release_peer_deferred(
        &mut self,
        id: PeerId,
    ) -> Result<Option<(PeerInfo, PeerNotifications)>> {
        let peer = self
            .peers
            .get_mut(id)
            .ok_or(ProtocolError::InvalidPeer(id as i64))?;
        if peer.connection().is_none() {
            return Ok(None);
        }
        peer.release();

        let info = peer.info();
        let mut notices = PeerNotifications::default();
        notices.queue(&self.removed_callbacks, &info);
        Ok(Some((info, notices)))
    }

    fn next_id(&mut self) -> CallbackId {
        let id = CallbackId(self.next_callback_id);
        self.next_callback_id += 1;
        id
    }

    pub fn register_peer_added_callback(&mut self, callback: PeerCallback) -> CallbackId {
        let id = self.next_id();
        self.added_callbacks.push((id, Arc::from(callback)));
        id
    }

    pub fn unregister_peer_added_callback(&mut self, id: CallbackId) -> bool {
        let before = self.added_callbacks.len();
        self.added_callbacks.retain(|(cb_id, _)| *cb_id != id);
        before != self.added_callbacks.len()
    }

    pub fn register_peer_removed_callback(&mut self, callback: PeerCallback) -> CallbackId {
        let id = self.next_id();
        self.removed_callbacks.push((id, Arc::from(callback)));
        id
    }

    pub fn unregister_peer_removed_callback(&mut self, id: CallbackId) -> bool {
        let before = self.removed_callbacks.len();
        self.removed_callbacks.retain(|(cb_id, _)| *cb_id != id);
        before != self.removed_callbacks.len()
    }

    /// Release every peer, notify "peer removed" hooks and empty the table.
    ///
    /// Registered hooks survive; returns a snapshot of the peers that were removed.
    pub fn release_all(&mut self) -> Vec<PeerInfo> {
        let (removed, notices) = self.release_all_deferred();
        notices.fire();
        removed
    }

    /// [`release_all`](Self::release_all) with the hooks left to the caller.
    pub fn release_all_deferred(&mut self) -> (Vec<PeerInfo>, PeerNotifications) {
        for peer in &mut self.peers {
            peer.release();
        }

        let removed = self.infos();
        let mut notices = PeerNotifications::default();
        for info in &removed {
            notices.queue(&self.removed_callbacks, info);
        }
        self.peers.clear();
        (removed, notices)
    }

    /// Release every peer, then clear the table and every registered hook.
    pub fn reset(&mut self) -> Vec<PeerInfo> {
        let (removed, notices) = self.reset_deferred();
        notices.fire();
        removed
    }

    /// [`reset`](Self::reset) with the final "peer removed" hooks left to the
    /// caller. The hooks are already unregistered when this returns.
    pub fn reset_deferred(&mut self) -> (Vec<PeerInfo>, PeerNotifications) {
        let (removed, notices) = self.release_all_deferred();
        debug!(peers = removed.len(), "Registry reset");
        self.added_callbacks.clear();
        self.removed_callbacks.clear();
        (removed, notices)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_ids_are_dense() {
        let mut registry = PeerRegistry::new();
        registry.add_peer("host", true, true, None, JoinState::Joined);
        registry.add_peer("a", false, false, None, JoinState::Joining);
        registry.add_peer("b", false, false, None, JoinState::Joining);

        let ids: Vec<_> = registry.iter().map(Peer::id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(registry.get_peer(1).unwrap().name(), "a");
        assert!(matches!(
            registry.get_peer(3),
            Err(ProtocolError::InvalidPeer(3))
        ));
    }

    #[test]
    fn test_second_local_or_host_rejected() {
        let mut registry = PeerRegistry::new();
        assert!(registry
            .add_peer("host", true, true, None, JoinState::Joined)
            .is_some());
        assert!(registry
            .add_peer("me too", true, false, None, JoinState::Joined)
            .is_none());
        assert!(registry
            .add_peer("other host", false, true, None, JoinState::Joined)
            .is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_added_callbacks_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PeerRegistry::new();
        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            registry.register_peer_added_callback(Box::new(move |peer| {
                order.lock().unwrap().push((tag, peer.id));
            }));
        }

        registry.add_peer("host", true, true, None, JoinState::Joined);
        assert_eq!(
            *order.lock().unwrap(),
            vec![("first", 0), ("second", 0)]
        );
    }

    #[test]
    fn test_unregister_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = PeerRegistry::new();
        let counter = Arc::clone(&hits);
        let id = registry.register_peer_added_callback(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.add_peer("a", true, true, None, JoinState::Joined);
        assert!(registry.unregister_peer_added_callback(id));
        assert!(!registry.unregister_peer_added_callback(id));
        registry.add_peer("b", false, false, None, JoinState::Joining);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_clears_peers_and_callbacks() {
        let removed = Arc::new(AtomicUsize::new(0));
        let mut registry = PeerRegistry::new();
        let counter = Arc::clone(&removed);
        registry.register_peer_removed_callback(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        registry.register_peer_added_callback(Box::new(|_| {}));

        registry.add_peer("host", true, true, None, JoinState::Joined);
        registry.add_peer("a", false, false, None, JoinState::Joining);
        let gone = registry.reset();

        assert_eq!(gone.len(), 2);
        assert_eq!(removed.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
        assert!(registry.local_peer().is_none());

        // hooks are gone, ids start over
        registry.add_peer("again", true, true, None, JoinState::Joined);
        assert_eq!(removed.load(Ordering::SeqCst), 2);
        assert_eq!(registry.get_peer(0).unwrap().name(), "again");
    }

    #[test]
    fn test_release_all_keeps_callbacks() {
        let added = Arc::new(AtomicUsize::new(0));
        let mut registry = PeerRegistry::new();
        let counter = Arc::clone(&added);
        registry.register_peer_added_callback(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.add_peer("Host...", false, true, None, JoinState::Joining);
        registry.add_peer("me", true, false, None, JoinState::Joining);
        assert_eq!(registry.release_all().len(), 2);
        assert_eq!(registry.count(), 0);

        registry.add_peer("Host...", false, true, None, JoinState::Joining);
        assert_eq!(added.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_deferred_hooks_wait_for_fire() {
        let added = Arc::new(AtomicUsize::new(0));
        let mut registry = PeerRegistry::new();
        let counter = Arc::clone(&added);
        registry.register_peer_added_callback(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let (info, notices) = registry
            .add_peer_deferred("host", true, true, None, JoinState::Joined)
            .unwrap();
        assert_eq!(info.id, 0);
        assert_eq!(notices.len(), 1);
        assert_eq!(added.load(Ordering::SeqCst), 0);

        notices.fire();
        assert_eq!(added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capacity_is_clamped() {
        assert_eq!(PeerRegistry::with_capacity(0).capacity(), 1);
        assert_eq!(PeerRegistry::with_capacity(64).capacity(), MAX_PEERS);
    }
}
