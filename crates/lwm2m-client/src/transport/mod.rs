// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport abstraction for the LwM2M client
//!
//! The connection registry talks to the network only through [`Transport`]:
//! plain datagrams, DTLS sessions keyed by a credential tag, and the list of
//! local network interfaces used to scope link-local addresses.
//!
//! ## Implementations
//!
//! - [`UdpTransport`] - std UDP socket, no DTLS
//! - [`MemoryTransport`] - in-process loopback for tests and simulation

use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use parking_lot::Mutex;

use crate::credential::CredentialTag;

pub mod udp;

pub use udp::UdpTransport;

/// Transport kind of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    Udp,
    Dtls,
}

/// Opaque DTLS session handle issued by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DtlsSession(pub u32);

/// Metadata of one received datagram. The payload is in the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram {
    pub remote: SocketAddr,
    pub kind: ConnectionKind,
    pub len: usize,
}

/// A local network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub index: u32,
}

/// Datagram and DTLS transport.
///
/// All methods take `&self`; implementations synchronise internally so the
/// receive path and application threads can share one transport.
pub trait Transport: Send + Sync {
    /// Send a plain UDP datagram.
    fn send_to(&self, remote: SocketAddr, data: &[u8]) -> io::Result<usize>;

    /// Wait up to `timeout` for one datagram (plain or decrypted DTLS).
    ///
    /// Returns `Ok(None)` on timeout. A datagram longer than `buf` is
    /// truncated and reported with `len == buf.len()`.
    fn recv(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<Datagram>>;

    /// Create a DTLS session towards `remote` using the credential under `tag`.
    fn dtls_session_init(&self, remote: SocketAddr, tag: CredentialTag) -> io::Result<DtlsSession>;

    /// Run the handshake of `session`, bounded by `timeout`.
    fn dtls_handshake(&self, session: DtlsSession, timeout: Duration) -> io::Result<()>;

    /// Send application data over an established session.
    fn dtls_send(&self, session: DtlsSession, data: &[u8]) -> io::Result<usize>;

    /// Close and free a session. Unknown sessions are ignored.
    fn dtls_session_destroy(&self, session: DtlsSession);

    /// Local network interfaces, loopback excluded.
    fn interfaces(&self) -> io::Result<Vec<NetworkInterface>>;
}

/// A datagram recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    pub remote: SocketAddr,
    pub kind: ConnectionKind,
    pub session: Option<DtlsSession>,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemoryState {
    inbound: VecDeque<(SocketAddr, ConnectionKind, Vec<u8>)>,
    sent: Vec<SentDatagram>,
    sessions: BTreeSet<DtlsSession>,
    session_remotes: Vec<(DtlsSession, SocketAddr)>,
    next_session: u32,
    handshakes: usize,
    fail_handshake: bool,
    interfaces: Vec<NetworkInterface>,
}

/// In-memory transport.
///
/// Inbound datagrams are queued with [`MemoryTransport::inject`]; everything
/// sent is recorded. DTLS handshakes succeed unless told otherwise.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Transport with a single interface `eth0` (index 1).
    pub fn new() -> Self {
        Self::with_interfaces(vec![NetworkInterface {
            name: "eth0".into(),
            index: 1,
        }])
    }

    pub fn with_interfaces(interfaces: Vec<NetworkInterface>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                interfaces,
                next_session: 1,
                ..Default::default()
            }),
        }
    }

    /// Queue a datagram for the next `recv`.
    pub fn inject(&self, remote: SocketAddr, kind: ConnectionKind, data: &[u8]) {
        self.state.lock().inbound.push_back((remote, kind, data.to_vec()));
    }

    /// Make subsequent handshakes fail (or succeed again).
    pub fn set_handshake_failure(&self, fail: bool) {
        self.state.lock().fail_handshake = fail;
    }

    /// Take everything sent so far.
    pub fn take_sent(&self) -> Vec<SentDatagram> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Number of DTLS sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of handshakes attempted.
    pub fn handshakes(&self) -> usize {
        self.state.lock().handshakes
    }
}

impl Transport for MemoryTransport {
    fn send_to(&self, remote: SocketAddr, data: &[u8]) -> io::Result<usize> {
        self.state.lock().sent.push(SentDatagram {
            remote,
            kind: ConnectionKind::Udp,
            session: None,
            data: data.to_vec(),
        });
        Ok(data.len())
    }

    fn recv(&self, buf: &mut [u8], _timeout: Duration) -> io::Result<Option<Datagram>> {
        let Some((remote, kind, data)) = self.state.lock().inbound.pop_front() else {
            return Ok(None);
        };
        // Truncate like a datagram socket does.
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(Some(Datagram { remote, kind, len }))
    }

    fn dtls_session_init(&self, remote: SocketAddr, _tag: CredentialTag) -> io::Result<DtlsSession> {
        let mut state = self.state.lock();
        let session = DtlsSession(state.next_session);
        state.next_session += 1;
        state.sessions.insert(session);
        state.session_remotes.push((session, remote));
        Ok(session)
    }

    fn dtls_handshake(&self, session: DtlsSession, _timeout: Duration) -> io::Result<()> {
        let mut state = self.state.lock();
        state.handshakes += 1;
        if !state.sessions.contains(&session) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "unknown DTLS session"));
        }
        if state.fail_handshake {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"));
        }
        Ok(())
    }

    fn dtls_send(&self, session: DtlsSession, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let remote = state
            .session_remotes
            .iter()
            .find(|(s, _)| *s == session)
            .map(|(_, r)| *r)
            .filter(|_| state.sessions.contains(&session))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "unknown DTLS session"))?;
        state.sent.push(SentDatagram {
            remote,
            kind: ConnectionKind::Dtls,
            session: Some(session),
            data: data.to_vec(),
        });
        Ok(data.len())
    }

    fn dtls_session_destroy(&self, session: DtlsSession) {
        let mut state = self.state.lock();
        state.sessions.remove(&session);
        state.session_remotes.retain(|(s, _)| *s != session);
    }

    fn interfaces(&self) -> io::Result<Vec<NetworkInterface>> {
        Ok(self.state.lock().interfaces.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_memory_transport_loopback() {
        let transport = MemoryTransport::new();
        transport.inject(addr("192.0.2.1:5683"), ConnectionKind::Udp, b"hello");

        let mut buf = [0u8; 16];
        let dgram = transport.recv(&mut buf, Duration::ZERO).unwrap().unwrap();
        assert_eq!(dgram.remote, addr("192.0.2.1:5683"));
        assert_eq!(&buf[..dgram.len], b"hello");
        assert!(transport.recv(&mut buf, Duration::ZERO).unwrap().is_none());

        transport.send_to(addr("192.0.2.1:5683"), b"ack").unwrap();
        assert_eq!(transport.take_sent()[0].data, b"ack".to_vec());
    }

    #[test]
    fn test_memory_transport_truncates() {
        let transport = MemoryTransport::new();
        transport.inject(addr("192.0.2.1:5683"), ConnectionKind::Udp, &[7u8; 32]);

        let mut buf = [0u8; 8];
        let dgram = transport.recv(&mut buf, Duration::ZERO).unwrap().unwrap();
        assert_eq!(dgram.len, 8);
        assert_eq!(buf, [7u8; 8]);
    }

    #[test]
    fn test_memory_transport_sessions() {
        let transport = MemoryTransport::new();
        let tag = CredentialTag::new(11).unwrap();
        let session = transport.dtls_session_init(addr("[2001:db8::1]:5684"), tag).unwrap();
        transport.dtls_handshake(session, Duration::from_secs(1)).unwrap();
        transport.dtls_send(session, b"reg").unwrap();
        assert_eq!(transport.open_sessions(), 1);

        transport.dtls_session_destroy(session);
        assert_eq!(transport.open_sessions(), 0);
        assert!(transport.dtls_send(session, b"reg").is_err());

        transport.set_handshake_failure(true);
        let session = transport.dtls_session_init(addr("[2001:db8::1]:5684"), tag).unwrap();
        assert!(transport.dtls_handshake(session, Duration::from_secs(1)).is_err());
        assert_eq!(transport.handshakes(), 2);
    }
}
