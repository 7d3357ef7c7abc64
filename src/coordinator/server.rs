//! Coordinator: lifecycle, background tasks and public surface

use crate::common::{Error, ProtocolConfig, Result};
use crate::coordinator::awaiter::{Awaiter, Completion, Quorum};
use crate::coordinator::candidacy::Candidacy;
use crate::coordinator::identity::PeerId;
use crate::coordinator::message::{encode, Command, Message, DATAGRAM_SIZE};
use crate::coordinator::registry::{Owner, Registry};
use crate::coordinator::state::{Action, ArmedState, Event, State, StateMachine};
use crate::transport::Transport;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Verbosity of the coordinator's own protocol logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Debug = 2,
}

/// Handle to a running (or runnable) coordinator. Cheap to clone.
pub struct Coordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct Inner<T> {
    pub(crate) id: PeerId,
    pub(crate) config: ProtocolConfig,
    pub(crate) transport: T,
    pub(crate) registry: Registry,
    pub(crate) candidacy: Candidacy,
    pub(crate) awaiter: Awaiter,
    fsm: Mutex<StateMachine>,
    fatal: Mutex<Option<Error>>,
    armed: AtomicBool,
    log_level: AtomicU8,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(transport: T) -> Self {
        Self::build(transport, ProtocolConfig::default())
    }

    pub fn with_config(transport: T, config: ProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: T, config: ProtocolConfig) -> Self {
        let inner = Inner {
            id: PeerId::random(),
            registry: Registry::new(config.liveness_window()),
            candidacy: Candidacy::new(config.candidacy_ttl()),
            awaiter: Awaiter::new(),
            fsm: Mutex::new(StateMachine::new(config.discovery_interval())),
            fatal: Mutex::new(None),
            armed: AtomicBool::new(false),
            log_level: AtomicU8::new(LogLevel::Error as u8),
            config,
            transport,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.inner.log_level.store(level as u8, Ordering::Relaxed);
    }

    /// Hex form of this peer's identity
    pub fn key(&self) -> String {
        self.inner.id.to_hex()
    }

    pub fn id(&self) -> PeerId {
        self.inner.id
    }

    pub fn state(&self) -> State {
        self.inner.fsm.lock().state()
    }

    pub fn armed(&self) -> ArmedState {
        if self.inner.is_armed() {
            ArmedState::Armed
        } else {
            ArmedState::UnArmed
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed() == ArmedState::Armed
    }

    /// Number of peers currently tracked
    pub fn peer_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Keys this peer owns
    pub fn owned_keys(&self) -> Vec<String> {
        self.inner.registry.mine()
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Run discovery, health checks and message dispatch until stopped.
    ///
    /// Returns the first fatal transport error, if any.
    pub async fn manage(&self) -> Result<()> {
        self.inner.fsm.lock().start()?;
        tracing::info!("Starting coordinator {}", self.inner.id);

        let reader = tokio::spawn(self.inner.clone().read_loop());
        let timer = tokio::spawn(self.inner.clone().timer_loop());

        let joined = timer.await;
        reader.abort();
        self.inner.armed.store(false, Ordering::Release);
        if let Err(e) = joined {
            return Err(Error::Internal(format!("timer task failed: {}", e)));
        }

        match self.inner.fatal.lock().take() {
            Some(err) => Err(err),
            None => {
                tracing::info!("Coordinator {} stopped", self.inner.id);
                Ok(())
            }
        }
    }

    /// Ask the coordinator to shut down; `manage` returns shortly after
    pub fn stop(&self) {
        self.inner.fsm.lock().apply(Event::Stop);
    }

    /// Resolve which peer owns `key`, claiming it if nobody does
    pub async fn check_key(&self, cancel: &CancellationToken, key: &str) -> Result<Owner> {
        self.inner.check_key(cancel, key).await
    }

    /// Broadcast `command ++ payload` and wait until every known peer has
    /// answered with `echo ++ payload`
    pub async fn broadcast_and_await_all(
        &self,
        command: Command,
        payload: &[u8],
        echo: Command,
    ) -> Result<Completion> {
        let frame = self.inner.frame(command, payload);
        self.inner.broadcast_and_await_all(frame, echo, payload).await
    }

    /// Like [`broadcast_and_await_all`](Self::broadcast_and_await_all), but a
    /// majority of the fleet is enough
    pub async fn broadcast_and_await_majority(
        &self,
        command: Command,
        payload: &[u8],
        echo: Command,
    ) -> Result<Completion> {
        let frame = self.inner.frame(command, payload);
        self.inner
            .broadcast_and_await_majority(frame, echo, payload)
            .await
    }
}

impl<T: Transport> Inner<T> {
    pub(crate) fn logs(&self, level: LogLevel) -> bool {
        self.log_level.load(Ordering::Relaxed) >= level as u8
    }

    /// Armed by the last health check and still running
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
            && matches!(self.fsm.lock().state(), State::Discovery | State::Ready)
    }

    /// Latch the coordinator into `Broken`; only the first error is kept
    pub(crate) fn fail(&self, err: Error) {
        tracing::error!("Coordinator {} failed: {}", self.id, err);
        self.armed.store(false, Ordering::Release);
        let mut fsm = self.fsm.lock();
        if fsm.apply(Event::Fatal) == Action::Exit {
            *self.fatal.lock() = Some(err);
        }
    }

    pub(crate) fn frame(&self, command: Command, payload: &[u8]) -> Bytes {
        encode(command, &self.id, payload)
    }

    /// Broadcast `frame` and wait for every known peer to echo `echo ++ payload`
    pub(crate) async fn broadcast_and_await_all(
        &self,
        frame: Bytes,
        echo: Command,
        payload: &[u8],
    ) -> Result<Completion> {
        self.broadcast_and_await(frame, echo, payload, Quorum::All)
            .await
    }

    /// Broadcast `frame` and wait for a majority to echo `echo ++ payload`
    pub(crate) async fn broadcast_and_await_majority(
        &self,
        frame: Bytes,
        echo: Command,
        payload: &[u8],
    ) -> Result<Completion> {
        self.broadcast_and_await(frame, echo, payload, Quorum::Majority)
            .await
    }

    async fn broadcast_and_await(
        &self,
        frame: Bytes,
        echo: Command,
        payload: &[u8],
        quorum: Quorum,
    ) -> Result<Completion> {
        // waits go in before the frame leaves so fast echoes are not missed
        let round = self
            .awaiter
            .expect(echo, &self.registry.ids(), payload, quorum);
        self.transport.send_all(&frame).await?;
        round.wait(self.config.await_timeout()).await
    }

    async fn timer_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let expired = self.candidacy.sweep();
            if expired > 0 && self.logs(LogLevel::Debug) {
                tracing::debug!("{} candidacies expired", expired);
            }

            let action = self.fsm.lock().apply(Event::Tick(Instant::now()));
            let outcome = match action {
                Action::Idle => Ok(()),
                Action::Exit => return,
                Action::Knock => self.discover().await,
                Action::Maintain { check_quorum } => self.maintain(check_quorum).await,
            };
            if let Err(e) = outcome {
                self.fail(e);
                return;
            }
        }
    }

    async fn discover(&self) -> Result<()> {
        self.transport
            .send_all(&self.frame(Command::Knock, &[]))
            .await?;
        self.fsm.lock().apply(Event::Knocked(Instant::now()));
        Ok(())
    }

    async fn maintain(&self, check_quorum: bool) -> Result<()> {
        let evicted = self.registry.cleanup();
        if evicted > 0 && self.logs(LogLevel::Warning) {
            tracing::warn!("Unlinked {} silent peers", evicted);
        }
        if check_quorum {
            self.check_armed().await?;
            self.fsm.lock().apply(Event::QuorumChecked);
        }
        Ok(())
    }

    /// Compare membership digests with the fleet; a majority agreeing arms us
    async fn check_armed(&self) -> Result<()> {
        let digest = self.registry.digest(&self.id);
        if self.logs(LogLevel::Debug) {
            tracing::debug!("Checking quorum, digest {}", hex::encode(digest));
        }
        let mut failure = None;
        for _ in 0..=self.config.quorum_retries {
            let compare = self.frame(Command::Compare, &digest);
            match self
                .broadcast_and_await_majority(compare, Command::Compared, &digest)
                .await
            {
                Ok(_) => {
                    failure = None;
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => failure = Some(e),
            }
        }

        match failure {
            None => {
                if !self.armed.swap(true, Ordering::AcqRel) && self.logs(LogLevel::Warning) {
                    tracing::warn!("ARMED with {} peers", self.registry.len());
                }
            }
            Some(e) => {
                if self.armed.swap(false, Ordering::AcqRel) && self.logs(LogLevel::Warning) {
                    tracing::warn!("UNARMED: {}", e);
                }
            }
        }
        Ok(())
    }

    async fn read_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; DATAGRAM_SIZE];
        loop {
            let (len, addr) = match self.transport.listen(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    self.fail(e.into());
                    return;
                }
            };
            let datagram = &buf[..len];
            let msg = match Message::decode(datagram, addr) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("Dropping datagram from {}: {}", addr, e);
                    continue;
                }
            };
            if let Err(e) = self.dispatch(&msg).await {
                self.fail(e);
                return;
            }
            self.awaiter.trigger(datagram);
        }
    }
}
