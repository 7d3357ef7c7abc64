//! Fleet coordinator
//!
//! The coordinator is responsible for:
//! - Membership discovery and liveness (registry)
//! - The armed/unarmed quorum health gate (digest comparison)
//! - Key ownership arbitration (candidacy + claim rounds)
//! - Dispatch of inbound gossip

pub mod awaiter;
pub mod candidacy;
mod dispatch;
pub mod identity;
pub mod message;
pub mod ownership;
pub mod registry;
pub mod server;
pub mod state;

pub use identity::PeerId;
pub use registry::Owner;
pub use server::{Coordinator, LogLevel};
pub use state::{ArmedState, State};
