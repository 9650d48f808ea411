// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lwm2m_client::transport::NetworkInterface;
use lwm2m_client::{
    ClientConfig, Lwm2mClient, MemoryCredentialStore, MemoryTransport, SecurityArgs, SecurityMode,
};

/// A client wired to in-memory collaborators.
pub struct Harness {
    pub client: Lwm2mClient,
    pub transport: Arc<MemoryTransport>,
    pub store: Arc<MemoryCredentialStore>,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn harness() -> Harness {
    harness_with(ClientConfig::default(), MemoryTransport::new(), 4)
}

pub fn harness_with(config: ClientConfig, transport: MemoryTransport, store_capacity: usize) -> Harness {
    init_logging();
    let transport = Arc::new(transport);
    let store = Arc::new(MemoryCredentialStore::new(store_capacity));
    let client = Lwm2mClient::new(config, transport.clone(), store.clone())
        .expect("client construction");
    Harness {
        client,
        transport,
        store,
    }
}

pub fn two_interface_transport() -> MemoryTransport {
    MemoryTransport::with_interfaces(vec![
        NetworkInterface {
            name: "eth0".into(),
            index: 2,
        },
        NetworkInterface {
            name: "wpan0".into(),
            index: 3,
        },
    ])
}

pub fn psk_server(uri: &str, server_id: u16) -> SecurityArgs {
    SecurityArgs {
        server_uri: uri.into(),
        server_id,
        security_mode: SecurityMode::PreSharedKey,
        pub_key_or_id: b"client1".to_vec(),
        secret_key: b"secret01".to_vec(),
        ..Default::default()
    }
}

pub fn plain_server(uri: &str, server_id: u16) -> SecurityArgs {
    SecurityArgs {
        server_uri: uri.into(),
        server_id,
        security_mode: SecurityMode::NoSec,
        ..Default::default()
    }
}
