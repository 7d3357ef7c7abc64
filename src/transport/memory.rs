//! In-process datagram network
//!
//! Behaves like a lossless broadcast subnet: `send_all` reaches every
//! endpoint including the sender, unicast to an unknown address is silently
//! dropped. Endpoints can be isolated to simulate a peer dropping off.

use crate::transport::Transport;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Default)]
struct Hub {
    next_host: u16,
    endpoints: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    isolated: HashSet<SocketAddr>,
}

impl Hub {
    fn deliver(&self, data: &[u8], from: SocketAddr, to: SocketAddr) {
        if self.isolated.contains(&from) || self.isolated.contains(&to) {
            return;
        }
        if let Some(tx) = self.endpoints.get(&to) {
            // receiver gone means the endpoint is closing
            let _ = tx.send((data.to_vec(), from));
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint with a fresh address
    pub fn endpoint(&self) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut hub = self.hub.lock();
        hub.next_host += 1;
        let [hi, lo] = hub.next_host.to_be_bytes();
        let addr = SocketAddr::from((Ipv4Addr::new(10, 0, hi, lo), crate::common::DEFAULT_PORT));
        hub.endpoints.insert(addr, tx);
        MemoryTransport {
            addr,
            hub: self.hub.clone(),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Drop all traffic to and from `addr`
    pub fn isolate(&self, addr: SocketAddr) {
        self.hub.lock().isolated.insert(addr);
    }

    pub fn heal(&self, addr: SocketAddr) {
        self.hub.lock().isolated.remove(&addr);
    }

    pub fn len(&self) -> usize {
        self.hub.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct MemoryTransport {
    addr: SocketAddr,
    hub: Arc<Mutex<Hub>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl MemoryTransport {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Detach from the network; a pending `listen` then fails
    pub fn close(&self) {
        self.hub.lock().endpoints.remove(&self.addr);
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl Transport for MemoryTransport {
    async fn send_all(&self, data: &[u8]) -> io::Result<()> {
        let hub = self.hub.lock();
        for to in hub.endpoints.keys() {
            hub.deliver(data, self.addr, *to);
        }
        Ok(())
    }

    async fn send(&self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        self.hub.lock().deliver(data, self.addr, addr);
        Ok(())
    }

    async fn listen(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (data, from) = self.rx.lock().await.recv().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "endpoint closed")
        })?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok((len, from))
    }
}
