// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Plain UDP transport over a std socket.
//!
//! DTLS is not available on this transport: session calls fail with
//! `Unsupported`, so secured servers cannot be reached through it.

use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::credential::CredentialTag;

use super::{ConnectionKind, Datagram, DtlsSession, NetworkInterface, Transport};

/// Dual-stack UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind to `[::]:port` (0 for an ephemeral port), accepting IPv4 too.
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_only_v6(false)?;
        socket.set_reuse_address(true)?;

        let bind_addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
        socket.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket.into();
        log::debug!("[udp] bound {}", socket.local_addr()?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

fn unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "DTLS not available on UdpTransport")
}

// IPv4 destinations go through the dual-stack socket as v4-mapped addresses.
fn to_socket_target(remote: SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(v4) => SocketAddr::new(IpAddr::V6(v4.ip().to_ipv6_mapped()), v4.port()),
        v6 => v6,
    }
}

fn from_socket_source(source: SocketAddr) -> SocketAddr {
    match source {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), v6.port()),
            None => source,
        },
        v4 => v4,
    }
}

impl Transport for UdpTransport {
    fn send_to(&self, remote: SocketAddr, data: &[u8]) -> io::Result<usize> {
        let sent = self.socket.send_to(data, to_socket_target(remote))?;
        log::trace!("[udp] sent {} bytes to {}", sent, remote);
        Ok(sent)
    }

    fn recv(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<Datagram>> {
        // A zero read timeout means "block forever" to the socket.
        let timeout = if timeout.is_zero() {
            Duration::from_millis(1)
        } else {
            timeout
        };
        self.socket.set_read_timeout(Some(timeout))?;

        match self.socket.recv_from(buf) {
            Ok((len, source)) => Ok(Some(Datagram {
                remote: from_socket_source(source),
                kind: ConnectionKind::Udp,
                len,
            })),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn dtls_session_init(&self, remote: SocketAddr, tag: CredentialTag) -> io::Result<DtlsSession> {
        log::debug!("[udp] DTLS session to {} (tag {}) refused", remote, tag);
        Err(unsupported())
    }

    fn dtls_handshake(&self, _session: DtlsSession, _timeout: Duration) -> io::Result<()> {
        Err(unsupported())
    }

    fn dtls_send(&self, _session: DtlsSession, _data: &[u8]) -> io::Result<usize> {
        Err(unsupported())
    }

    fn dtls_session_destroy(&self, _session: DtlsSession) {}

    fn interfaces(&self) -> io::Result<Vec<NetworkInterface>> {
        let addrs = local_ip_address::list_afinet_netifas().map_err(|e| {
            log::debug!("[udp] failed to list network interfaces: {}", e);
            io::Error::other(e.to_string())
        })?;

        let mut interfaces: Vec<NetworkInterface> = Vec::new();
        for (name, ip) in addrs {
            if ip.is_loopback() || interfaces.iter().any(|i| i.name == name) {
                continue;
            }
            match interface_index(&name) {
                Ok(index) => interfaces.push(NetworkInterface { name, index }),
                Err(e) => log::debug!("[udp] no index for interface {}: {}", name, e),
            }
        }
        log::debug!("[udp] discovered {} non-loopback interfaces", interfaces.len());
        Ok(interfaces)
    }
}

/// Interface index for an interface name.
#[cfg(unix)]
pub fn interface_index(name: &str) -> io::Result<u32> {
    use std::ffi::CString;

    let name_c = CString::new(name).map_err(|_| io::Error::other("invalid interface name"))?;

    // SAFETY:
    // - name_c is a valid NUL-terminated CString
    // - if_nametoindex only reads the string and returns 0 on error
    let index = unsafe { libc::if_nametoindex(name_c.as_ptr()) };

    if index == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(index)
    }
}

/// Interface index for an interface name.
#[cfg(not(unix))]
pub fn interface_index(_name: &str) -> io::Result<u32> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface indices not available on this platform",
    ))
}
