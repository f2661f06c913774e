use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use super::{Datagram, Transport, TransportError};

/// Receive buffer size. Larger than any valid clip so that oversized
/// datagrams arrive whole and can be rejected instead of silently truncated.
pub const RECV_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub struct MulticastTransport {
    socket: UdpSocket,
    group: SocketAddrV4,
}

impl MulticastTransport {
    /// Binds `0.0.0.0:port`, joins `group` on the default interface and
    /// enables loopback so peers on the same host see each other.
    pub async fn bind(group: Ipv4Addr, port: u16, ttl: u32) -> Result<Self, TransportError> {
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: SocketAddr::V4(bind_addr),
                source,
            })?;

        socket
            .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
            .map_err(|source| TransportError::JoinGroup { group, source })?;
        socket
            .set_multicast_ttl_v4(ttl)
            .map_err(TransportError::Configure)?;
        socket
            .set_multicast_loop_v4(true)
            .map_err(TransportError::Configure)?;

        info!(%group, port, ttl, "joined multicast group");
        Ok(Self {
            socket,
            group: SocketAddrV4::new(group, port),
        })
    }
}

#[async_trait]
impl Transport for MulticastTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let written = self
            .socket
            .send_to(payload, self.group)
            .await
            .map_err(TransportError::Send)?;
        debug!(bytes = written, group = %self.group, "datagram sent");
        Ok(())
    }

    async fn recv(&self) -> Result<Datagram, TransportError> {
        let mut buf = BytesMut::with_capacity(RECV_BUFFER_BYTES);
        let (len, sender) = self
            .socket
            .recv_buf_from(&mut buf)
            .await
            .map_err(TransportError::Receive)?;
        debug!(bytes = len, %sender, "datagram received");
        Ok(Datagram {
            payload: buf.freeze(),
            sender,
        })
    }
}
