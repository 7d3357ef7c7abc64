//! UDP broadcast transport

use crate::common::Result;
use crate::transport::Transport;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

pub struct UdpTransport {
    socket: UdpSocket,
    port: u16,
    broadcast: Vec<IpAddr>,
}

impl UdpTransport {
    /// Bind `0.0.0.0:port` with broadcast enabled.
    ///
    /// `broadcast` lists the subnet broadcast addresses announcements go to;
    /// every peer is expected to listen on the same `port`.
    pub async fn bind(port: u16, broadcast: Vec<IpAddr>) -> Result<Self> {
        if broadcast.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "at least one broadcast address is required".into(),
            ));
        }
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.set_broadcast(true)?;
        let port = socket.local_addr()?.port();
        tracing::info!("UDP transport on port {} -> {:?}", port, broadcast);
        Ok(Self {
            socket,
            port,
            broadcast,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    async fn send_all(&self, data: &[u8]) -> io::Result<()> {
        for ip in &self.broadcast {
            self.socket.send_to(data, (*ip, self.port)).await?;
        }
        Ok(())
    }

    async fn send(&self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        self.socket.send_to(data, addr).await?;
        Ok(())
    }

    async fn listen(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requires_broadcast_target() {
        assert!(UdpTransport::bind(0, vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_loopback_exchange() {
        let loopback = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
        let a = UdpTransport::bind(0, loopback.clone()).await.unwrap();
        let b = UdpTransport::bind(0, loopback).await.unwrap();
        let b_port = b.local_addr().unwrap().port();

        a.send(b"hello", SocketAddr::from(([127, 0, 0, 1], b_port)))
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = b.listen(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(from.port(), a.local_addr().unwrap().port());
    }
}
