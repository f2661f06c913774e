//! In-memory transport for tests.
//!
//! Captures sent payloads and hands out injected datagrams. With loopback
//! enabled every sent payload is also delivered back to `recv()`, the way a
//! multicast group delivers a sender's own datagrams.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use super::{Datagram, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    inbound_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Datagram>>>,
}

#[derive(Debug)]
struct MockTransportInner {
    local_addr: SocketAddr,
    loopback: bool,
    sent: Vec<Bytes>,
    inbound_tx: Option<mpsc::UnboundedSender<Datagram>>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                local_addr: SocketAddr::from(([127, 0, 0, 1], 10000)),
                loopback: false,
                sent: Vec::new(),
                inbound_tx: Some(inbound_tx),
                fail_next_send: None,
                fail_next_recv: None,
            })),
            inbound_rx: Arc::new(AsyncMutex::new(inbound_rx)),
        }
    }

    /// Delivers every sent payload back to this transport as well.
    pub fn with_loopback(self) -> Self {
        self.lock().loopback = true;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.lock().local_addr
    }

    /// Queues a datagram for the next `recv()`.
    pub fn inject(&self, payload: impl Into<Bytes>, sender: SocketAddr) {
        let inner = self.lock();
        if let Some(tx) = &inner.inbound_tx {
            let _ = tx.send(Datagram {
                payload: payload.into(),
                sender,
            });
        }
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_owned());
    }

    pub fn fail_next_recv(&self, error: &str) {
        self.lock().fail_next_recv = Some(error.to_owned());
    }

    /// Closes the inbound side. Queued datagrams are still delivered, then
    /// `recv()` reports `TransportError::Closed`.
    pub fn close(&self) {
        self.lock().inbound_tx = None;
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::Send(std::io::Error::other(error)));
        }

        let payload = Bytes::copy_from_slice(payload);
        inner.sent.push(payload.clone());
        if inner.loopback
            && let Some(tx) = &inner.inbound_tx
        {
            let _ = tx.send(Datagram {
                payload,
                sender: inner.local_addr,
            });
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Datagram, TransportError> {
        let forced = self.lock().fail_next_recv.take();
        if let Some(error) = forced {
            return Err(TransportError::Receive(std::io::Error::other(error)));
        }

        let mut inbound_rx = self.inbound_rx.lock().await;
        inbound_rx.recv().await.ok_or(TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 7], 10000))
    }

    #[tokio::test]
    async fn captures_sent_payloads() {
        let transport = MockTransport::new();
        transport.send(b"one").await.unwrap();
        transport.send(b"two").await.unwrap();
        assert_eq!(transport.sent(), vec![Bytes::from("one"), Bytes::from("two")]);
    }

    #[tokio::test]
    async fn delivers_injected_datagrams_in_order() {
        let transport = MockTransport::new();
        transport.inject("first", peer());
        transport.inject("second", peer());
        assert_eq!(transport.recv().await.unwrap().payload, Bytes::from("first"));
        let second = transport.recv().await.unwrap();
        assert_eq!(second.payload, Bytes::from("second"));
        assert_eq!(second.sender, peer());
    }

    #[tokio::test]
    async fn loopback_echoes_own_sends() {
        let transport = MockTransport::new().with_loopback();
        transport.send(b"mine").await.unwrap();
        let echoed = transport.recv().await.unwrap();
        assert_eq!(echoed.payload, Bytes::from("mine"));
        assert_eq!(echoed.sender, transport.local_addr());
    }

    #[tokio::test]
    async fn forced_failures_fire_once() {
        let transport = MockTransport::new();
        transport.fail_next_send("boom");
        assert!(matches!(
            transport.send(b"x").await,
            Err(TransportError::Send(_))
        ));
        assert!(transport.send(b"x").await.is_ok());

        transport.fail_next_recv("boom");
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::Receive(_))
        ));
    }

    #[tokio::test]
    async fn close_drains_then_reports_closed() {
        let transport = MockTransport::new();
        transport.inject("last", peer());
        transport.close();
        assert!(transport.recv().await.is_ok());
        assert!(matches!(transport.recv().await, Err(TransportError::Closed)));
    }
}
