//! Ownership candidacy: short-lived per-key soft locks
//!
//! A candidacy gives one identity first refusal on a key while its claim is
//! in flight. Entries expire on their own so a crashed claimant only blocks
//! a key for one TTL.

use crate::coordinator::identity::PeerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Candidate {
    claimant: PeerId,
    expires_at: Instant,
}

pub struct Candidacy {
    candidates: Mutex<HashMap<String, Candidate>>,
    ttl: Duration,
}

impl Candidacy {
    pub fn new(ttl: Duration) -> Self {
        Self {
            candidates: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Grant `claimant` the soft lock on `key`.
    ///
    /// Re-asserting one's own candidacy refreshes it; a live candidacy held
    /// by someone else wins.
    pub fn add_candidate(&self, claimant: PeerId, key: &str) -> bool {
        let now = Instant::now();
        let mut candidates = self.candidates.lock();
        if let Some(existing) = candidates.get(key) {
            if existing.claimant != claimant && existing.expires_at > now {
                return false;
            }
        }
        candidates.insert(
            key.to_string(),
            Candidate {
                claimant,
                expires_at: now + self.ttl,
            },
        );
        true
    }

    pub fn remove_candidate(&self, key: &str) {
        self.candidates.lock().remove(key);
    }

    /// Current holder of the soft lock, if still live
    pub fn holder(&self, key: &str) -> Option<PeerId> {
        let now = Instant::now();
        self.candidates
            .lock()
            .get(key)
            .filter(|c| c.expires_at > now)
            .map(|c| c.claimant)
    }

    /// Drop expired candidacies
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut candidates = self.candidates.lock();
        let before = candidates.len();
        candidates.retain(|_, c| c.expires_at > now);
        before - candidates.len()
    }

    pub fn len(&self) -> usize {
        self.candidates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
