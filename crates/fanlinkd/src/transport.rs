//! Socket factory for outbound command datagrams.
//!
//! Every command is sent from a fresh socket that lives only as long as the
//! send. Closing is tied to ownership: dropping the [`CommandSocket`] closes
//! it, so whichever way a send resolves the socket is released exactly once.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// A transient socket that sends a single datagram.
#[async_trait]
pub trait CommandSocket: Send {
    /// Sends `payload` to `target`, returning the number of bytes accepted
    /// by the local stack.
    async fn send_to(&mut self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;
}

/// Opens transient command sockets.
#[async_trait]
pub trait SocketFactory: Send + Sync + 'static {
    async fn open(&self) -> io::Result<Box<dyn CommandSocket>>;
}

/// Real UDP sockets bound to an ephemeral port on the wildcard address.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpSocketFactory;

#[async_trait]
impl SocketFactory for UdpSocketFactory {
    async fn open(&self) -> io::Result<Box<dyn CommandSocket>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        Ok(Box::new(UdpCommandSocket { socket }))
    }
}

struct UdpCommandSocket {
    socket: UdpSocket,
}

#[async_trait]
impl CommandSocket for UdpCommandSocket {
    async fn send_to(&mut self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(payload, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_factory_sends_one_datagram() {
        let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let target = receiver.local_addr().unwrap();

        let mut socket = UdpSocketFactory.open().await.unwrap();
        let sent = socket.send_to(br#"{"power":true}"#, target).await.unwrap();
        assert_eq!(sent, 14);

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], br#"{"power":true}"#);
    }
}
