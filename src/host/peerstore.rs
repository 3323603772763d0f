//! In-memory record of what the host learned about the peers it connected to.

use crate::{PeerId, ProtocolId};

use multiaddr::Multiaddr;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::SystemTime;

/// Information about a peer, collected while connecting to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    /// Known addresses, in the order they were first learned.
    pub addrs: Vec<Multiaddr>,
    /// Remote end of the most recent connection.
    pub last_remote_addr: Option<SocketAddr>,
    pub last_connected_at: Option<SystemTime>,
    /// Protocols the peer accepted on a stream.
    pub protocols: Vec<ProtocolId>,
}

impl PeerRecord {
    fn new(peer_id: PeerId) -> Self {
        PeerRecord {
            peer_id,
            addrs: vec![],
            last_remote_addr: None,
            last_connected_at: None,
            protocols: vec![],
        }
    }
}

/// Nothing is persisted, the store lives as long as the host.
#[derive(Debug, Default)]
pub struct PeerStore {
    peers: Mutex<HashMap<PeerId, PeerRecord>>,
}

impl PeerStore {
    pub fn new() -> Self {
        PeerStore::default()
    }

    pub fn add_addrs(&self, peer: &PeerId, addrs: &[Multiaddr]) {
        self.update(peer, |record| {
            for addr in addrs {
                if !record.addrs.contains(addr) {
                    record.addrs.push(addr.clone());
                }
            }
        })
    }

    pub fn record_connection(&self, peer: &PeerId, remote: SocketAddr) {
        self.update(peer, |record| {
            record.last_remote_addr = Some(remote);
            record.last_connected_at = Some(SystemTime::now());
        })
    }

    pub fn record_protocol(&self, peer: &PeerId, protocol: &ProtocolId) {
        self.update(peer, |record| {
            if !record.protocols.contains(protocol) {
                record.protocols.push(protocol.clone());
            }
        })
    }

    pub fn addrs(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.get(peer).map(|record| record.addrs).unwrap_or_default()
    }

    pub fn get(&self, peer: &PeerId) -> Option<PeerRecord> {
        self.lock().get(peer).cloned()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.lock().keys().cloned().collect();
        peers.sort();
        peers
    }

    fn update<F: FnOnce(&mut PeerRecord)>(&self, peer: &PeerId, f: F) {
        let mut peers = self.lock();
        f(peers.entry(*peer).or_insert_with(|| PeerRecord::new(*peer)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerId, PeerRecord>> {
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
