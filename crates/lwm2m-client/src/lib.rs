// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # lwm2m-client - LwM2M device object runtime
//!
//! The object-instance lifecycle and connection/credential layer of a
//! device-side LwM2M client. The CoAP message layer and the registration
//! state machine sit above this crate and drive it.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------+
//! |  Protocol engine (external)             |
//! +-----------------------------------------+
//!      | CRUD / poll            ^ notifications
//!      v                        |
//! +-----------------------------------------+
//! |  Lwm2mClient                            |
//! |   ObjectStore<T> per object type        |
//! |   ConnectionRegistry  CredentialManager |
//! +-----------------------------------------+
//!      |                        |
//!      v                        v
//! +-------------------+  +------------------+
//! |  Transport        |  |  CredentialStore |
//! |  (UDP / DTLS)     |  |  (key storage)   |
//! +-------------------+  +------------------+
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lwm2m_client::{
//!     ClientConfig, Lwm2mClient, MemoryCredentialStore, SecurityArgs, SecurityMode, UdpTransport,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Lwm2mClient::new(
//!     ClientConfig::default(),
//!     Arc::new(UdpTransport::bind(0)?),
//!     Arc::new(MemoryCredentialStore::new(4)),
//! )?;
//!
//! let server = client.create_security_instance(
//!     &SecurityArgs {
//!         server_uri: "coap://[2001:db8::1]".into(),
//!         server_id: 1,
//!         security_mode: SecurityMode::NoSec,
//!         ..Default::default()
//!     },
//!     None,
//! )?;
//! let conn = client.connect(server)?;
//! client.send(conn.handle, b"...")?;
//! # Ok(())
//! # }
//! ```

/// Client context and CRUD dispatch by object ID
pub mod client;

/// Client configuration (TOML)
pub mod config;

/// Connection registry and server URI parsing
pub mod connection;

/// Credential tags, store and lifecycle manager
pub mod credential;

/// Error types and CoAP response code mapping
pub mod error;

/// Resource change notification
pub mod notify;

/// LwM2M objects (Security, Device, IPSO sensors, Light Control)
pub mod object;

/// Fixed-capacity instance pool
pub mod pool;

/// Transport abstraction (UDP, in-memory)
pub mod transport;

/// Resource values and paths
pub mod value;

/// Largest datagram accepted by [`Lwm2mClient::poll`].
pub const MAX_PACKET_SIZE: usize = 1280;

// Re-exports for convenience
pub use crate::client::{Lwm2mClient, PacketHandler, PollOutcome, ProtocolError};
pub use crate::config::{ClientConfig, ConfigError};
pub use crate::connection::{Connection, ConnectionHandle, ConnectionKind};
pub use crate::credential::{
    Credential, CredentialManager, CredentialStore, CredentialTag, MemoryCredentialStore,
    StoreError,
};
pub use crate::error::{Error, ResponseCode, Result};
pub use crate::notify::{ChangeNotifier, NotificationQueue};
pub use crate::object::{ObjectKind, SecurityArgs, SecurityMode, SensorArgs};
pub use crate::pool::{InstancePool, PoolError};
pub use crate::transport::{MemoryTransport, Transport, UdpTransport};
pub use crate::value::{Resource, ResourcePath, ResourceValue};
