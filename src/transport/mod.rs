//! Datagram transports the coordinator talks through
//!
//! The coordinator never opens sockets itself: it is handed something that
//! can broadcast to the fleet, reply to one address, and receive.

pub mod memory;
pub mod udp;

use std::future::Future;
use std::io;
use std::net::SocketAddr;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::UdpTransport;

pub trait Transport: Send + Sync + 'static {
    /// Send `data` to every fleet address
    fn send_all(&self, data: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Send `data` to one peer
    fn send(&self, data: &[u8], addr: SocketAddr) -> impl Future<Output = io::Result<()>> + Send;

    /// Receive one datagram into `buf`, returning its length and origin
    fn listen(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;
}
