//! # keyfleet
//!
//! Leaderless key ownership for a fleet of equal peers:
//! - UDP gossip discovery with liveness expiry
//! - Quorum health gate from membership digest agreement
//! - Majority-voted key claims with short-lived candidacy locks
//! - HTTP front end that serves owned keys and proxies the rest
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────┐   KNCK / WANT / MINE / CMPI   ┌──────────────┐
//!   │   Peer A     │ ◀───────── broadcast ───────▶ │   Peer B     │
//!   │  registry    │                               │  registry    │
//!   │  candidacy   │ ◀──── WLCM / CAND / SAVD ───▶ │  candidacy   │
//!   │  awaiter     │        REGD / CMPO (unicast)  │  awaiter     │
//!   └──────┬───────┘                               └──────┬───────┘
//!          │ check_key("user-42")                         │
//!   ┌──────▼───────┐                               ┌──────▼───────┐
//!   │  HTTP :8080  │ ───── proxy to owner ───────▶ │  HTTP :8080  │
//!   └──────────────┘                               └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! keyfleet serve --port 7999 --http 0.0.0.0:8080 --broadcast 192.168.1.255
//!
//! curl 'http://localhost:8080/keys/increment?key=user-42'
//! ```

pub mod common;
pub mod coordinator;
pub mod gateway;
pub mod transport;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::{Coordinator, LogLevel, Owner};
pub use transport::Transport;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
