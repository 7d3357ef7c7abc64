//! Configuration for keyfleet nodes
//!
//! Values are layered: built-in defaults, then an optional `keyfleet.toml`
//! in the working directory (or an explicit file), then `KEYFLEET_*`
//! environment variables (`KEYFLEET_NODE__PORT=8000`).

use crate::common::Result;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default UDP port shared by the whole fleet
pub const DEFAULT_PORT: u16 = 7999;

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub protocol: ProtocolConfig,
    pub http: HttpConfig,
}

/// Network identity of this node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// UDP port for gossip (identical on every peer)
    pub port: u16,

    /// Broadcast addresses announcements are sent to
    pub broadcast: Vec<IpAddr>,

    /// Logging level
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            broadcast: vec![IpAddr::V4(Ipv4Addr::BROADCAST)],
            log_level: "info".to_string(),
        }
    }
}

/// Timings and bounds of the coordination protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Period of the state machine timer
    pub tick_ms: u64,

    /// How long a broadcast waits for echoes
    pub await_timeout_ms: u64,

    /// Lifetime of an ownership candidacy
    pub candidacy_ttl_ms: u64,

    /// Silence after which a peer is forgotten
    pub liveness_window_ms: u64,

    /// Minimum time between discovery rounds
    pub discovery_interval_ms: u64,

    /// Arbitration attempts per `check_key` call
    pub claim_attempts: u32,

    /// Extra digest comparisons within one health check
    pub quorum_retries: u32,

    /// Random pause between arbitration attempts, `[min, max)` in ms
    pub retry_jitter_ms: [u64; 2],

    /// Longest accepted key, in bytes
    pub max_key_len: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            await_timeout_ms: 50,
            candidacy_ttl_ms: 100,
            liveness_window_ms: 5_000,
            discovery_interval_ms: 1_000,
            claim_attempts: 5,
            quorum_retries: 3,
            retry_jitter_ms: [50, 100],
            max_key_len: 128,
        }
    }
}

impl ProtocolConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn await_timeout(&self) -> Duration {
        Duration::from_millis(self.await_timeout_ms)
    }

    pub fn candidacy_ttl(&self) -> Duration {
        Duration::from_millis(self.candidacy_ttl_ms)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    /// Reject settings the protocol cannot run with
    pub fn validate(&self) -> Result<()> {
        let timings = [
            ("tick_ms", self.tick_ms),
            ("await_timeout_ms", self.await_timeout_ms),
            ("candidacy_ttl_ms", self.candidacy_ttl_ms),
            ("liveness_window_ms", self.liveness_window_ms),
        ];
        if let Some((name, _)) = timings.iter().find(|(_, v)| *v == 0) {
            return Err(crate::Error::InvalidConfig(format!("{} must be positive", name)));
        }
        if self.claim_attempts == 0 {
            return Err(crate::Error::InvalidConfig(
                "claim_attempts must be positive".into(),
            ));
        }
        let [lo, hi] = self.retry_jitter_ms;
        if lo > hi {
            return Err(crate::Error::InvalidConfig(format!(
                "retry_jitter_ms range is inverted: {}..{}",
                lo, hi
            )));
        }
        if self.max_key_len == 0 {
            return Err(crate::Error::InvalidConfig("max_key_len must be positive".into()));
        }
        Ok(())
    }
}

/// HTTP front end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address for the public API
    pub bind: SocketAddr,

    /// Port the other peers serve their HTTP API on
    pub peer_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            peer_port: 8080,
        }
    }
}

impl Config {
    /// Load configuration, `path` replacing the implicit `keyfleet.toml`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name("keyfleet").required(false),
        };
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("KEYFLEET")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("node.broadcast")
                    .try_parsing(true),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.protocol.validate()?;
        Ok(config)
    }
}
