//! Common utilities and types shared across keyfleet

pub mod config;
pub mod error;
pub mod utils;

pub use config::{Config, HttpConfig, NodeConfig, ProtocolConfig, DEFAULT_PORT};
pub use error::{Error, Result};
pub use utils::{jitter, validate_key};
