//! Response correlation for broadcasts
//!
//! Every broadcast that expects acknowledgments opens a [`Round`]: one
//! pending wait per known peer, each keyed on the exact frame that peer is
//! expected to send back (`command ++ peer id ++ payload`). The read loop
//! feeds every inbound datagram to [`Awaiter::trigger`]; a matching wait is
//! flipped exactly once and counted towards its round's quorum.

use crate::common::Result;
use crate::coordinator::identity::PeerId;
use crate::coordinator::message::{encode, Command};
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How many echoes complete a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quorum {
    /// Every registered peer
    All,
    /// Strictly more than half of the fleet, counting ourselves
    Majority,
}

impl Quorum {
    pub fn required(&self, peers: usize) -> usize {
        match self {
            Quorum::All => peers,
            Quorum::Majority => (peers + 1) / 2,
        }
    }
}

/// How a round finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Enough echoes arrived
    Reached,
    /// A peer answered with one of the round's abort frames
    Aborted,
}

struct Signal {
    remaining: AtomicUsize,
    aborted: AtomicBool,
    notify: Notify,
}

impl Signal {
    fn hit(&self) {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if prev == Ok(1) {
            self.notify.notify_one();
        }
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn completion(&self) -> Option<Completion> {
        if self.aborted.load(Ordering::Acquire) {
            Some(Completion::Aborted)
        } else if self.remaining.load(Ordering::Acquire) == 0 {
            Some(Completion::Reached)
        } else {
            None
        }
    }
}

struct PendingWait {
    seq: u64,
    expected: Bytes,
    triggered: AtomicBool,
    aborts: bool,
    signal: Arc<Signal>,
}

#[derive(Default)]
pub struct Awaiter {
    seq: AtomicU64,
    waits: RwLock<Vec<PendingWait>>,
}

impl Awaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a round expecting `command` with `payload` back from each of `peers`
    pub fn expect(
        &self,
        command: Command,
        peers: &[PeerId],
        payload: &[u8],
        quorum: Quorum,
    ) -> Round<'_> {
        let signal = Arc::new(Signal {
            remaining: AtomicUsize::new(quorum.required(peers.len())),
            aborted: AtomicBool::new(false),
            notify: Notify::new(),
        });
        let seqs = peers
            .iter()
            .map(|peer| self.register(encode(command, peer, payload), false, &signal))
            .collect();
        Round {
            awaiter: self,
            command,
            peers: peers.len(),
            seqs,
            signal,
        }
    }

    /// Offer an inbound datagram to the pending waits.
    ///
    /// Returns true when it satisfied a wait. A wait fires at most once, so
    /// duplicated echoes are ignored.
    pub fn trigger(&self, datagram: &[u8]) -> bool {
        let waits = self.waits.read();
        for wait in waits.iter() {
            if wait.triggered.load(Ordering::Acquire) || wait.expected != datagram {
                continue;
            }
            if wait
                .triggered
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if wait.aborts {
                    wait.signal.abort();
                } else {
                    wait.signal.hit();
                }
                return true;
            }
        }
        false
    }

    /// Number of live waits
    pub fn pending(&self) -> usize {
        self.waits.read().len()
    }

    fn register(&self, expected: Bytes, aborts: bool, signal: &Arc<Signal>) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.waits.write().push(PendingWait {
            seq,
            expected,
            triggered: AtomicBool::new(false),
            aborts,
            signal: signal.clone(),
        });
        seq
    }

    fn release(&self, seqs: &[u64]) {
        if seqs.is_empty() {
            return;
        }
        self.waits.write().retain(|w| !seqs.contains(&w.seq));
    }
}

/// An open set of waits. Dropping it cancels whatever is still pending.
pub struct Round<'a> {
    awaiter: &'a Awaiter,
    command: Command,
    peers: usize,
    seqs: Vec<u64>,
    signal: Arc<Signal>,
}

impl Round<'_> {
    /// Finish the round early as soon as any peer sends `command ++ peer ++ payload`
    pub fn abort_on(&mut self, command: Command, peers: &[PeerId], payload: &[u8]) {
        for peer in peers {
            let seq = self
                .awaiter
                .register(encode(command, peer, payload), true, &self.signal);
            self.seqs.push(seq);
        }
    }

    pub fn completion(&self) -> Option<Completion> {
        self.signal.completion()
    }

    /// Wait for the quorum, an abort, or the timeout
    pub async fn wait(self, timeout: Duration) -> Result<Completion> {
        let signal = self.signal.clone();
        let finished = async move {
            loop {
                if let Some(completion) = signal.completion() {
                    return completion;
                }
                signal.notify.notified().await;
            }
        };
        match tokio::time::timeout(timeout, finished).await {
            Ok(completion) => Ok(completion),
            Err(_) => Err(crate::Error::Timeout(format!(
                "{}: {} echoes missing from {} peers",
                self.command,
                self.signal.remaining.load(Ordering::Acquire),
                self.peers
            ))),
        }
    }
}

impl Drop for Round<'_> {
    fn drop(&mut self) {
        self.awaiter.release(&self.seqs);
    }
}
