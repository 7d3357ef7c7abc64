//! Key ownership arbitration
//!
//! A claim goes through two broadcast rounds:
//!
//! 1. `WANT key`: a majority must grant us candidacy (`CAND`). Any current
//!    owner answers `REGD` instead, which ends the round early.
//! 2. `MINE key`: a majority must record our ownership (`SAVD`).
//!
//! Local callers racing for the same key are serialised by our own
//! candidacy; remote racers by each peer granting candidacy to one
//! claimant at a time.

use crate::common::{jitter, validate_key, Error, Result};
use crate::coordinator::awaiter::{Completion, Quorum};
use crate::coordinator::message::{claim_payload, Command};
use crate::coordinator::registry::Owner;
use crate::coordinator::server::{Inner, LogLevel};
use crate::transport::Transport;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Result of a single claim attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The key is ours
    Won,
    /// Another peer already owns it
    Resolved(SocketAddr),
    /// Someone else is claiming it right now
    Race,
    /// Not enough peers agreed in time
    Denied,
}

impl<T: Transport> Inner<T> {
    pub(crate) async fn check_key(&self, cancel: &CancellationToken, key: &str) -> Result<Owner> {
        if !self.is_armed() {
            return Err(Error::NotReady);
        }
        validate_key(key, self.config.max_key_len)?;

        let attempts = self.config.claim_attempts;
        for attempt in 1..=attempts {
            if let Some(owner) = self.registry.search(key) {
                return Ok(owner);
            }
            match self.try_to_own(key).await? {
                Attempt::Won => return Ok(Owner::Mine),
                Attempt::Resolved(addr) => return Ok(Owner::Peer(addr)),
                Attempt::Race | Attempt::Denied => {}
            }
            if let Some(owner) = self.registry.search(key) {
                return Ok(owner);
            }
            if attempt == attempts {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(jitter(self.config.retry_jitter_ms)) => {}
            }
        }

        Err(Error::OwnershipFailed {
            key: key.to_string(),
            attempts,
        })
    }

    /// One pass of the claim protocol
    pub(crate) async fn try_to_own(&self, key: &str) -> Result<Attempt> {
        if !self.candidacy.add_candidate(self.id, key) {
            return Ok(Attempt::Race);
        }
        let claim = claim_payload(&self.id, key);

        let peers = self.registry.ids();
        let mut round = self
            .awaiter
            .expect(Command::Candidate, &peers, &claim, Quorum::Majority);
        round.abort_on(Command::Registered, &peers, key.as_bytes());
        self.transport
            .send_all(&self.frame(Command::Want, key.as_bytes()))
            .await?;
        let candidacy = round.wait(self.config.await_timeout()).await;

        if let Some(Owner::Peer(addr)) = self.registry.search(key) {
            self.candidacy.remove_candidate(key);
            return Ok(Attempt::Resolved(addr));
        }
        match candidacy {
            Ok(Completion::Reached) => {}
            Ok(Completion::Aborted) => {
                self.candidacy.remove_candidate(key);
                return Ok(Attempt::Race);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.candidacy.remove_candidate(key);
                if self.logs(LogLevel::Debug) {
                    tracing::debug!("Ownership denied {} for {}: {}", self.id, key, e);
                }
                return Ok(Attempt::Denied);
            }
        }

        if !self.registry.to_own(key) {
            self.candidacy.remove_candidate(key);
            if self.logs(LogLevel::Debug) {
                tracing::debug!("Ownership broken {} for {}", self.id, key);
            }
            return Ok(Attempt::Race);
        }

        let mine = self.frame(Command::Mine, key.as_bytes());
        match self
            .broadcast_and_await_majority(mine, Command::Saved, &claim)
            .await
        {
            Ok(_) => {
                tracing::info!("Ownership taken {}: {}", self.id, key);
                Ok(Attempt::Won)
            }
            Err(e) => {
                self.registry.from_own(key);
                self.candidacy.remove_candidate(key);
                if e.is_fatal() {
                    return Err(e);
                }
                if self.logs(LogLevel::Debug) {
                    tracing::debug!("Ownership cancelled {} for {}: {}", self.id, key, e);
                }
                Ok(Attempt::Denied)
            }
        }
    }
}
