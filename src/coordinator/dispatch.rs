//! Inbound message handling
//!
//! Runs on the read task, one datagram at a time. Only transport failures
//! escape as errors; protocol conflicts are resolved (or ignored) here.

use crate::common::{Error, Result};
use crate::coordinator::message::{claim_payload, Command, Message};
use crate::coordinator::registry::Owner;
use crate::coordinator::server::{Inner, LogLevel};
use crate::transport::Transport;

impl<T: Transport> Inner<T> {
    pub(crate) async fn dispatch(&self, msg: &Message<'_>) -> Result<()> {
        if msg.sender == self.id {
            return Ok(());
        }
        if self.logs(LogLevel::Debug) {
            tracing::debug!(
                "{} <- {} {} ({} bytes)",
                self.id,
                msg.command,
                msg.addr,
                msg.payload.len()
            );
        }

        match msg.command {
            Command::Knock => {
                self.register(msg);
                let welcome = self.frame(Command::Welcome, &[]);
                self.transport.send(&welcome, msg.addr).await?;
            }
            Command::Welcome => self.register(msg),
            Command::Compare => {
                self.registry.touch(msg.sender, msg.addr);
                if self.registry.digest(&self.id) == msg.payload {
                    let compared = self.frame(Command::Compared, msg.payload);
                    self.transport.send(&compared, msg.addr).await?;
                }
            }
            Command::Want => {
                self.registry.touch(msg.sender, msg.addr);
                self.on_want(msg).await?;
            }
            Command::Mine => {
                self.registry.touch(msg.sender, msg.addr);
                self.on_mine(msg).await?;
            }
            Command::Registered => {
                self.registry.touch(msg.sender, msg.addr);
                self.on_registered(msg).await?;
            }
            Command::Reset => {
                self.registry.touch(msg.sender, msg.addr);
                let key = msg.key();
                self.registry.reset(&key);
                if self.logs(LogLevel::Warning) {
                    tracing::warn!("Ownership of {} revoked by {}", key, msg.sender);
                }
            }
            Command::Candidate | Command::Saved | Command::Compared => {
                // echoes, consumed by the awaiter
                self.registry.touch(msg.sender, msg.addr);
            }
            Command::Unknown(_) => {
                if self.logs(LogLevel::Warning) {
                    tracing::warn!("Unknown command {} from {}", msg.command, msg.addr);
                }
            }
        }
        Ok(())
    }

    fn register(&self, msg: &Message<'_>) {
        if self.registry.add(msg.sender, msg.addr) && self.logs(LogLevel::Warning) {
            tracing::warn!(
                "Registered ({}): {} {}",
                self.registry.len(),
                msg.addr,
                msg.sender
            );
        }
    }

    /// A peer asks for candidacy on a key
    async fn on_want(&self, msg: &Message<'_>) -> Result<()> {
        let key = msg.key();
        match self.registry.search(&key) {
            Some(Owner::Mine) => {
                let registered = self.frame(Command::Registered, msg.payload);
                self.transport.send(&registered, msg.addr).await?;
            }
            Some(Owner::Peer(_)) => {}
            None => {
                if self.candidacy.add_candidate(msg.sender, &key) {
                    if self.logs(LogLevel::Debug) {
                        tracing::debug!("Candidacy granted to {} for {}", msg.sender, key);
                    }
                    let granted =
                        self.frame(Command::Candidate, &claim_payload(&msg.sender, &key));
                    self.transport.send(&granted, msg.addr).await?;
                } else if self.logs(LogLevel::Debug) {
                    if let Some(holder) = self.candidacy.holder(&key) {
                        tracing::debug!(
                            "Candidacy for {} refused to {}, held by {}",
                            key,
                            msg.sender,
                            holder
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// A peer asserts it now owns a key
    async fn on_mine(&self, msg: &Message<'_>) -> Result<()> {
        let key = msg.key();
        match self.registry.save(msg.sender, &key, msg.addr) {
            Ok(()) => {
                tracing::info!("Ownership approved {}: {}", msg.sender, key);
                let saved = self.frame(Command::Saved, &claim_payload(&msg.sender, &key));
                self.transport.send(&saved, msg.addr).await?;
            }
            Err(e) => {
                // withhold the acknowledgment; the claimant times out
                if self.logs(LogLevel::Debug) {
                    tracing::debug!("Ownership of {} by {} refused: {}", key, msg.sender, e);
                }
            }
        }
        Ok(())
    }

    /// A peer tells us it already owns the key we asked for
    async fn on_registered(&self, msg: &Message<'_>) -> Result<()> {
        let key = msg.key();
        match self.registry.save(msg.sender, &key, msg.addr) {
            Ok(()) => Ok(()),
            Err(Error::KeyAlreadyOwned(_)) => {
                if self.registry.search(&key) == Some(Owner::Peer(msg.addr)) {
                    return Ok(());
                }
                // two owners for one key: make everyone forget it
                tracing::warn!("Conflicting owners for {}, resetting", key);
                self.registry.reset(&key);
                let reset = self.frame(Command::Reset, msg.payload);
                self.transport.send_all(&reset).await?;
                Ok(())
            }
            Err(e) => {
                if self.logs(LogLevel::Warning) {
                    tracing::warn!("Ignoring registration of {}: {}", key, e);
                }
                Ok(())
            }
        }
    }
}
