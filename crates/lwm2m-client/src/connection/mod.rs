// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection registry.
//!
//! Keeps at most one live connection per `(remote address, port, kind)`.
//! A UDP and a DTLS connection to the same remote are distinct entries.
//! Connections are created on demand from a Security instance snapshot
//! ([`ConnectTarget`]) and handed out as [`Connection`] snapshots keyed by
//! a [`ConnectionHandle`].
//!
//! # Locking
//!
//! One mutex guards the connection list. `connect` holds it across the
//! DTLS handshake, so a slow handshake (bounded by the configured timeout)
//! blocks every other `find`/`connect`/`send`/`close` until it completes.
//! Connection counts are small and the handshake is bounded, so this is
//! accepted rather than split into a two-phase insert.

pub mod uri;

use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6, ToSocketAddrs};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::{DtlsConfig, PortConfig};
use crate::credential::CredentialTag;
use crate::error::{Error, Result};
use crate::transport::{DtlsSession, Transport};

pub use crate::transport::ConnectionKind;
pub use uri::{ServerHost, ServerUri};

/// Stable identifier of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u32);

impl ConnectionHandle {
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot of a Security instance, taken before connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub security_instance: u16,
    pub uri: String,
    pub is_bootstrap: bool,
    pub kind: ConnectionKind,
    pub credential_tag: Option<CredentialTag>,
    pub short_server_id: u16,
    /// The credential was provisioned for this connect and has to be
    /// dropped again if it fails.
    pub fresh_credential: bool,
}

/// One live channel to a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub handle: ConnectionHandle,
    pub remote: SocketAddr,
    pub kind: ConnectionKind,
    pub session: Option<DtlsSession>,
    pub credential_tag: Option<CredentialTag>,
    pub security_instance: u16,
    pub short_server_id: u16,
    pub last_send: Option<Instant>,
}

struct RegistryState {
    // Newest first.
    connections: Vec<Connection>,
    next_handle: u32,
}

impl RegistryState {
    fn position(&self, handle: ConnectionHandle) -> Option<usize> {
        self.connections.iter().position(|c| c.handle == handle)
    }

    fn find(&self, remote: SocketAddr, kind: ConnectionKind) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.remote == remote && c.kind == kind)
    }
}

/// Registry of active connections.
pub struct ConnectionRegistry {
    transport: Arc<dyn Transport>,
    ports: PortConfig,
    dtls: DtlsConfig,
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn Transport>, ports: PortConfig, dtls: DtlsConfig) -> Self {
        Self {
            transport,
            ports,
            dtls,
            state: Mutex::new(RegistryState {
                connections: Vec::new(),
                next_handle: 1,
            }),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Connection to `remote` over `kind`, matching address, port and kind exactly.
    pub fn find(&self, remote: SocketAddr, kind: ConnectionKind) -> Option<Connection> {
        self.state.lock().find(remote, kind).cloned()
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<Connection> {
        let state = self.state.lock();
        state.position(handle).map(|i| state.connections[i].clone())
    }

    /// Resolve a server URI to the socket address to talk to.
    pub fn resolve(&self, uri: &ServerUri, is_bootstrap: bool) -> Result<SocketAddr> {
        let port = uri.port.unwrap_or(self.ports.default_for(is_bootstrap));
        if port == 0 {
            return Err(Error::AddressInvalid("port 0".into()));
        }

        let addr = match &uri.host {
            ServerHost::Ip(ip) => SocketAddr::new(*ip, port),
            ServerHost::Name(name) => (name.as_str(), port)
                .to_socket_addrs()
                .map_err(|e| Error::AddressInvalid(format!("{}: {}", name, e)))?
                .next()
                .ok_or_else(|| Error::AddressInvalid(format!("{}: no address", name)))?,
        };

        if addr.ip().is_unspecified() {
            return Err(Error::AddressInvalid(format!("{} is unspecified", addr.ip())));
        }

        match addr.ip() {
            IpAddr::V6(ip) if is_link_local(&ip) => {
                let scope = self.scope_for(uri.zone.as_deref())?;
                Ok(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, scope)))
            }
            _ => Ok(addr),
        }
    }

    // Interface index for a link-local destination.
    fn scope_for(&self, zone: Option<&str>) -> Result<u32> {
        let interfaces = self.transport.interfaces().map_err(|e| {
            log::warn!("[conn] cannot list interfaces: {}", e);
            Error::InterfaceUnresolvable
        })?;

        let found = match zone {
            Some(zone) => {
                let by_index = zone.parse::<u32>().ok();
                interfaces
                    .iter()
                    .find(|i| i.name == zone || Some(i.index) == by_index)
            }
            None => match interfaces.as_slice() {
                [only] => Some(only),
                _ => None,
            },
        };

        match found {
            Some(iface) => Ok(iface.index),
            None => {
                log::debug!(
                    "[conn] link-local zone {:?} unresolvable among {} interfaces",
                    zone,
                    interfaces.len()
                );
                Err(Error::InterfaceUnresolvable)
            }
        }
    }

    /// Return the connection for `target`, creating it if needed.
    pub fn connect(&self, target: &ConnectTarget) -> Result<Connection> {
        let uri = ServerUri::parse(&target.uri)?;
        let remote = self.resolve(&uri, target.is_bootstrap)?;

        let mut state = self.state.lock();
        if let Some(existing) = state.find(remote, target.kind) {
            log::trace!("[conn] reusing {} to {}", existing.handle, remote);
            return Ok(existing.clone());
        }

        let session = match target.kind {
            ConnectionKind::Udp => None,
            ConnectionKind::Dtls => {
                let tag = target.credential_tag.ok_or_else(|| {
                    log::error!(
                        "[conn] DTLS connect for security instance {} without a credential",
                        target.security_instance
                    );
                    Error::Internal("DTLS target without credential tag".into())
                })?;
                Some(self.open_session(remote, tag)?)
            }
        };

        let handle = ConnectionHandle(state.next_handle);
        state.next_handle = state.next_handle.wrapping_add(1).max(1);

        let connection = Connection {
            handle,
            remote,
            kind: target.kind,
            session,
            credential_tag: target.credential_tag,
            security_instance: target.security_instance,
            short_server_id: target.short_server_id,
            last_send: None,
        };
        state.connections.insert(0, connection.clone());
        log::info!(
            "[conn] {} {:?} connection to {} (server {})",
            handle,
            target.kind,
            remote,
            target.short_server_id
        );
        Ok(connection)
    }

    // Session init and handshake. The session is destroyed on failure.
    fn open_session(&self, remote: SocketAddr, tag: CredentialTag) -> Result<DtlsSession> {
        let session = self.transport.dtls_session_init(remote, tag).map_err(|e| {
            log::warn!("[conn] DTLS session init to {} failed: {}", remote, e);
            Error::HandshakeFailed(e.to_string())
        })?;

        if let Err(e) = self
            .transport
            .dtls_handshake(session, self.dtls.handshake_timeout())
        {
            log::warn!("[conn] DTLS handshake with {} failed: {}", remote, e);
            self.transport.dtls_session_destroy(session);
            return Err(Error::HandshakeFailed(e.to_string()));
        }
        log::debug!("[conn] DTLS session {:?} established with {}", session, remote);
        Ok(session)
    }

    /// Send `data` over a connection.
    ///
    /// An idle DTLS session older than the refresh interval is re-handshaked
    /// first. If that fails, the connection is dropped.
    pub fn send(&self, handle: ConnectionHandle, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let idx = state.position(handle).ok_or(Error::ConnectionNotFound)?;
        let now = Instant::now();

        let conn = &state.connections[idx];
        let sent = match (conn.kind, conn.session) {
            (ConnectionKind::Udp, _) => self.transport.send_to(conn.remote, data)?,
            (ConnectionKind::Dtls, Some(session)) => {
                let session = if self.needs_refresh(conn, now) {
                    match self.refresh_session(conn, session) {
                        Ok(fresh) => fresh,
                        Err(e) => {
                            state.connections.remove(idx);
                            return Err(e);
                        }
                    }
                } else {
                    session
                };
                state.connections[idx].session = Some(session);
                self.transport.dtls_send(session, data)?
            }
            (ConnectionKind::Dtls, None) => {
                debug_assert!(false, "DTLS connection without session");
                log::error!("[conn] {} has no DTLS session", handle);
                return Err(Error::Internal("DTLS connection without session".into()));
            }
        };

        state.connections[idx].last_send = Some(now);
        log::trace!("[conn] {} sent {} bytes", handle, sent);
        Ok(sent)
    }

    fn needs_refresh(&self, conn: &Connection, now: Instant) -> bool {
        match (self.dtls.session_refresh(), conn.last_send) {
            (Some(interval), Some(last)) => now.duration_since(last) > interval,
            _ => false,
        }
    }

    fn refresh_session(&self, conn: &Connection, old: DtlsSession) -> Result<DtlsSession> {
        log::debug!("[conn] refreshing DTLS session of {}", conn.handle);
        self.transport.dtls_session_destroy(old);
        let tag = conn
            .credential_tag
            .ok_or_else(|| Error::Internal("DTLS connection without credential tag".into()))?;
        self.open_session(conn.remote, tag)
    }

    /// Remove a connection, destroying its DTLS session.
    ///
    /// Unknown handles are ignored and yield `None`.
    pub fn close(&self, handle: ConnectionHandle) -> Option<Connection> {
        let mut state = self.state.lock();
        let idx = state.position(handle)?;
        let conn = state.connections.remove(idx);
        self.release(&conn);
        Some(conn)
    }

    /// Close every connection opened for a Security instance.
    pub fn close_for_security_instance(&self, security_instance: u16) -> usize {
        let mut state = self.state.lock();
        let mut closed = 0;
        state.connections.retain(|conn| {
            if conn.security_instance != security_instance {
                return true;
            }
            self.release(conn);
            closed += 1;
            false
        });
        closed
    }

    /// Close everything.
    pub fn close_all(&self) -> usize {
        let mut state = self.state.lock();
        let conns = std::mem::take(&mut state.connections);
        for conn in &conns {
            self.release(conn);
        }
        conns.len()
    }

    fn release(&self, conn: &Connection) {
        if let Some(session) = conn.session {
            self.transport.dtls_session_destroy(session);
        }
        log::info!("[conn] closed {} to {}", conn.handle, conn.remote);
    }

    /// Snapshot of all connections, newest first.
    pub fn connections(&self) -> Vec<Connection> {
        self.state.lock().connections.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().connections.is_empty()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .field("ports", &self.ports)
            .finish()
    }
}

fn is_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}
