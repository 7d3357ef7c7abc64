//! Instance registry: who is in the fleet and which keys each peer owns
//!
//! Peers are keyed by their return address since that is what we reply to.
//! A key lives in at most one place: the local `mine` set or one instance.

use crate::common::Result;
use crate::coordinator::identity::{PeerId, ID_LEN};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Where a key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Mine,
    Peer(SocketAddr),
}

impl Owner {
    pub fn is_mine(&self) -> bool {
        matches!(self, Owner::Mine)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Mine => write!(f, "MINE"),
            Owner::Peer(addr) => write!(f, "{}", addr),
        }
    }
}

/// A known peer
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    pub keys: HashSet<String>,
}

impl Instance {
    fn new(id: PeerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            keys: HashSet::new(),
        }
    }
}

#[derive(Default)]
struct Tables {
    instances: HashMap<SocketAddr, Instance>,
    mine: HashSet<String>,
}

impl Tables {
    fn search(&self, key: &str) -> Option<Owner> {
        if self.mine.contains(key) {
            return Some(Owner::Mine);
        }
        self.instances
            .values()
            .find(|i| i.keys.contains(key))
            .map(|i| Owner::Peer(i.addr))
    }
}

pub struct Registry {
    tables: RwLock<Tables>,
    liveness: Duration,
}

impl Registry {
    pub fn new(liveness: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            liveness,
        }
    }

    /// Register or refresh a peer. Returns true for a new registration.
    ///
    /// A different identity showing up at a known address replaces the
    /// old instance together with its keys.
    pub fn add(&self, id: PeerId, addr: SocketAddr) -> bool {
        let mut tables = self.tables.write();
        match tables.instances.get_mut(&addr) {
            Some(instance) if instance.id == id => {
                instance.last_seen = Instant::now();
                false
            }
            _ => {
                tables.instances.insert(addr, Instance::new(id, addr));
                true
            }
        }
    }

    /// Refresh `last_seen` if `addr` is a tracked instance with identity `id`
    pub fn touch(&self, id: PeerId, addr: SocketAddr) -> bool {
        let mut tables = self.tables.write();
        match tables.instances.get_mut(&addr) {
            Some(instance) if instance.id == id => {
                instance.last_seen = Instant::now();
                true
            }
            _ => false,
        }
    }

    pub fn search(&self, key: &str) -> Option<Owner> {
        self.tables.read().search(key)
    }

    /// Record that the instance at `addr` owns `key`
    pub fn save(&self, id: PeerId, key: &str, addr: SocketAddr) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.search(key).is_some() {
            return Err(crate::Error::KeyAlreadyOwned(key.to_string()));
        }
        match tables.instances.get_mut(&addr) {
            Some(instance) if instance.id == id => {
                instance.last_seen = Instant::now();
                instance.keys.insert(key.to_string());
                Ok(())
            }
            _ => Err(crate::Error::UnknownClaimant(addr)),
        }
    }

    /// Claim `key` locally unless someone already holds it
    pub fn to_own(&self, key: &str) -> bool {
        let mut tables = self.tables.write();
        if tables.search(key).is_some() {
            return false;
        }
        tables.mine.insert(key.to_string())
    }

    /// Roll back a local claim
    pub fn from_own(&self, key: &str) {
        self.tables.write().mine.remove(key);
    }

    /// Forget every ownership of `key`
    pub fn reset(&self, key: &str) {
        let mut tables = self.tables.write();
        tables.mine.remove(key);
        for instance in tables.instances.values_mut() {
            instance.keys.remove(key);
        }
    }

    /// Evict instances silent for longer than the liveness window
    pub fn cleanup(&self) -> usize {
        let liveness = self.liveness;
        let mut tables = self.tables.write();
        let before = tables.instances.len();
        tables
            .instances
            .retain(|_, instance| instance.last_seen.elapsed() <= liveness);
        before - tables.instances.len()
    }

    /// Identities of every known peer
    pub fn ids(&self) -> Vec<PeerId> {
        self.tables.read().instances.values().map(|i| i.id).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys claimed by this process
    pub fn mine(&self) -> Vec<String> {
        self.tables.read().mine.iter().cloned().collect()
    }

    /// XOR fold of `self_id` and every known identity.
    ///
    /// Order independent, so two peers with the same view agree on it.
    /// Different views can collide; only use it as a cheap equality hint.
    pub fn digest(&self, self_id: &PeerId) -> [u8; ID_LEN] {
        let mut digest = *self_id.as_bytes();
        for id in self.tables.read().instances.values().map(|i| i.id) {
            for (d, b) in digest.iter_mut().zip(id.as_bytes()) {
                *d ^= b;
            }
        }
        digest
    }
}
