//! Coordinator lifecycle
//!
//! ```text
//!  Created ──start──▶ Discovery ──knocked──▶ Ready ──quorum checked──┐
//!                        ▲                                           │
//!                        └───────────────────────────────────────────┘
//!  any live state ──stop──▶ Deactivated ──tick──▶ Closed
//!  any state ──fatal──▶ Broken (first error wins)
//! ```
//!
//! The machine is pure: it records transitions and tells the timer task what
//! to do next; the task performs the I/O and reports back.

use crate::common::Result;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Discovery,
    Ready,
    Deactivated,
    Closed,
    Broken,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Closed | State::Broken)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Created => write!(f, "created"),
            State::Discovery => write!(f, "discovery"),
            State::Ready => write!(f, "ready"),
            State::Deactivated => write!(f, "deactivated"),
            State::Closed => write!(f, "closed"),
            State::Broken => write!(f, "broken"),
        }
    }
}

/// Quorum health, orthogonal to [`State`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmedState {
    Armed,
    UnArmed,
}

impl fmt::Display for ArmedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmedState::Armed => write!(f, "armed"),
            ArmedState::UnArmed => write!(f, "unarmed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Timer fired
    Tick(Instant),
    /// The discovery announcement went out
    Knocked(Instant),
    /// A quorum health check finished, whatever its verdict
    QuorumChecked,
    Stop,
    /// Unrecoverable transport failure
    Fatal,
}

/// Work the timer task has to carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Idle,
    /// Broadcast `KNCK`
    Knock,
    /// Evict silent peers, optionally followed by a digest comparison
    Maintain { check_quorum: bool },
    /// Leave the timer loop
    Exit,
}

#[derive(Debug)]
pub struct StateMachine {
    state: State,
    last_discovery: Option<Instant>,
    discovery_interval: Duration,
}

impl StateMachine {
    pub fn new(discovery_interval: Duration) -> Self {
        Self {
            state: State::Created,
            last_discovery: None,
            discovery_interval,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// `Created → Discovery`; allowed exactly once
    pub fn start(&mut self) -> Result<()> {
        if self.state != State::Created {
            return Err(crate::Error::AlreadyStarted);
        }
        self.state = State::Discovery;
        Ok(())
    }

    /// Feed an event. Events that do not apply to the current state are
    /// ignored and yield [`Action::Idle`].
    pub fn apply(&mut self, event: Event) -> Action {
        use State::*;
        match (self.state, event) {
            (Discovery, Event::Tick(_)) => Action::Knock,
            (Discovery, Event::Knocked(at)) => {
                self.state = Ready;
                self.last_discovery = Some(at);
                Action::Idle
            }
            (Ready, Event::Tick(now)) => {
                let due = self
                    .last_discovery
                    .map_or(true, |at| now.saturating_duration_since(at) >= self.discovery_interval);
                Action::Maintain { check_quorum: due }
            }
            (Ready, Event::QuorumChecked) => {
                self.state = Discovery;
                Action::Idle
            }
            (Deactivated, Event::Tick(_)) => {
                self.state = Closed;
                Action::Exit
            }
            (Closed | Broken, Event::Tick(_)) => Action::Exit,
            (Created | Discovery | Ready, Event::Stop) => {
                self.state = Deactivated;
                Action::Idle
            }
            (Closed | Broken, Event::Fatal) => Action::Idle,
            (_, Event::Fatal) => {
                self.state = Broken;
                Action::Exit
            }
            _ => Action::Idle,
        }
    }
}
