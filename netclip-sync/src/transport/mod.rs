//! Datagram transport used by the sync engine.
//!
//! The engine only needs two things from the network: send one datagram to
//! the group, and block until the next datagram arrives. `MulticastTransport`
//! does this over an IPv4 multicast group; `MockTransport` does it in memory
//! for tests.

mod mock;
mod multicast;

pub use mock::MockTransport;
pub use multicast::{MulticastTransport, RECV_BUFFER_BYTES};

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to join multicast group {group}: {source}")]
    JoinGroup {
        group: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    #[error("failed to configure socket: {0}")]
    Configure(#[source] io::Error),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("transport closed")]
    Closed,
}

/// One datagram taken off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Bytes,
    pub sender: SocketAddr,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one datagram to the group.
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Waits for the next datagram.
    ///
    /// `TransportError::Closed` is terminal; any other error is transient and
    /// the caller may keep receiving.
    async fn recv(&self) -> Result<Datagram, TransportError>;
}
