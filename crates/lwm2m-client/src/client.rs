// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client context.
//!
//! [`Lwm2mClient`] owns one [`ObjectStore`] per object type, the connection
//! registry, the credential manager and the notification queue. The protocol
//! engine drives it through the CRUD entry points (keyed by numeric object
//! ID) and [`Lwm2mClient::poll`]. Application threads use the typed
//! helpers to provision Security instances and feed sensor readings.
//!
//! # Lock order
//!
//! Object pool locks and the registry lock are never held together. The
//! credential manager and the notification queue use leaf locks that may be
//! taken under a pool lock.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionHandle, ConnectionRegistry};
use crate::credential::{CredentialManager, CredentialStore, CredentialTag};
use crate::error::{Error, Result};
use crate::notify::NotificationQueue;
use crate::object::{
    DeviceInstance, HumidityInstance, IlluminanceInstance, LightControlInstance, ObjectEnv,
    ObjectInstance, ObjectKind, ObjectStore, SecurityArgs, SecurityInstance, SensorArgs, TemperatureInstance,
};
use crate::transport::Transport;
use crate::value::{Resource, ResourcePath};
use crate::MAX_PACKET_SIZE;

/// ID of the single Device instance.
pub const DEVICE_INSTANCE: u16 = 0;

/// Errors reported by a [`PacketHandler`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error(transparent)]
    Client(#[from] Error),
}

/// Protocol engine entry point for received packets.
pub trait PacketHandler {
    /// Handle one datagram received on `connection`.
    fn handle_packet(
        &mut self,
        client: &Lwm2mClient,
        connection: &Connection,
        data: &[u8],
    ) -> std::result::Result<(), ProtocolError>;
}

/// What a call to [`Lwm2mClient::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing arrived before the timeout.
    Idle,
    /// A packet was handed to the handler.
    Delivered(ConnectionHandle),
    /// A packet from an unknown source was dropped.
    Dropped,
}

// Run `$body` with `$store` bound to the store of `$object`.
macro_rules! with_store {
    ($client:expr, $object:expr, |$store:ident| $body:expr) => {
        match ObjectKind::from_id($object) {
            Some(ObjectKind::Security) => {
                let $store = &$client.security;
                $body
            }
            Some(ObjectKind::Device) => {
                let $store = &$client.device;
                $body
            }
            Some(ObjectKind::Illuminance) => {
                let $store = &$client.illuminance;
                $body
            }
            Some(ObjectKind::Temperature) => {
                let $store = &$client.temperature;
                $body
            }
            Some(ObjectKind::Humidity) => {
                let $store = &$client.humidity;
                $body
            }
            Some(ObjectKind::LightControl) => {
                let $store = &$client.light_control;
                $body
            }
            None => Err(Error::ObjectNotFound($object)),
        }
    };
}

/// One LwM2M client.
pub struct Lwm2mClient {
    config: ClientConfig,
    security: ObjectStore<SecurityInstance>,
    device: ObjectStore<DeviceInstance>,
    illuminance: ObjectStore<IlluminanceInstance>,
    temperature: ObjectStore<TemperatureInstance>,
    humidity: ObjectStore<HumidityInstance>,
    light_control: ObjectStore<LightControlInstance>,
    connections: ConnectionRegistry,
    credentials: CredentialManager,
    notifications: NotificationQueue,
}

impl Lwm2mClient {
    /// Build a client and create the Device instance.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        config.validate()?;

        let capacity = &config.capacity;
        let client = Self {
            security: ObjectStore::new(capacity.security),
            device: ObjectStore::new(1),
            illuminance: ObjectStore::new(capacity.illuminance),
            temperature: ObjectStore::new(capacity.temperature),
            humidity: ObjectStore::new(capacity.humidity),
            light_control: ObjectStore::new(capacity.light_control),
            connections: ConnectionRegistry::new(
                transport,
                config.ports.clone(),
                config.dtls.clone(),
            ),
            credentials: CredentialManager::new(store, &config.credentials),
            notifications: NotificationQueue::new(),
            config,
        };

        let device = DeviceInstance::from_config(&client.config.device);
        client
            .device
            .insert(Some(DEVICE_INSTANCE), &client.env(), |inst, _| {
                *inst = device;
                Ok(())
            })?;

        log::info!(
            "[client] endpoint {:?} ready ({} security slots)",
            client.config.endpoint_name,
            client.security.capacity()
        );
        Ok(client)
    }

    /// Services handed to object code.
    pub fn env(&self) -> ObjectEnv<'_> {
        ObjectEnv {
            credentials: &self.credentials,
            limits: &self.config.limits,
            notifier: &self.notifications,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // CRUD entry points, keyed by object ID
    // ------------------------------------------------------------------

    pub fn read(&self, object: u16, instance: u16, resources: &[u16]) -> Result<Vec<Resource>> {
        with_store!(self, object, |store| store.read(instance, resources))
    }

    pub fn write(&self, object: u16, instance: u16, values: &[Resource]) -> Result<()> {
        let env = self.env();
        with_store!(self, object, |store| store.write(instance, values, &env))
    }

    pub fn create(&self, object: u16, instance: Option<u16>, values: &[Resource]) -> Result<u16> {
        let env = self.env();
        with_store!(self, object, |store| store.create(instance, values, &env))
    }

    /// Delete an instance. Deleting a Security instance closes its connections.
    pub fn delete(&self, object: u16, instance: u16) -> Result<()> {
        let env = self.env();
        with_store!(self, object, |store| store.delete(instance, &env))?;
        // After the instance is gone, so a racing connect sees it missing.
        if object == ObjectKind::Security.id() {
            self.close_owned_connections(instance);
        }
        Ok(())
    }

    pub fn execute(&self, object: u16, instance: u16, resource: u16, args: &[u8]) -> Result<()> {
        let env = self.env();
        with_store!(self, object, |store| store.execute(instance, resource, args, &env))
    }

    pub fn discover(&self, object: u16, instance: u16, resources: &[u16]) -> Result<Vec<u16>> {
        with_store!(self, object, |store| store.discover(instance, resources))
    }

    /// Instance IDs of an object.
    pub fn instances(&self, object: u16) -> Result<Vec<u16>> {
        with_store!(self, object, |store| Ok(store.ids()))
    }

    // ------------------------------------------------------------------
    // Application helpers
    // ------------------------------------------------------------------

    pub fn create_security_instance(
        &self,
        args: &SecurityArgs,
        instance: Option<u16>,
    ) -> Result<u16> {
        self.security.create_instance(args, instance, &self.env())
    }

    /// Delete a Security instance, its credential and its connections.
    pub fn delete_security_instance(&self, instance: u16) -> Result<()> {
        self.security.remove(instance, &self.env())?;
        self.close_owned_connections(instance);
        Ok(())
    }

    pub fn credential_tag(&self, security_instance: u16) -> Result<Option<CredentialTag>> {
        self.security.credential_tag(security_instance)
    }

    /// Create a sensor instance of `object` (3301, 3303 or 3304).
    pub fn create_sensor_instance(
        &self,
        object: u16,
        args: &SensorArgs,
        instance: Option<u16>,
    ) -> Result<u16> {
        let env = self.env();
        match ObjectKind::from_id(object) {
            Some(ObjectKind::Illuminance) => self.illuminance.create_instance(args, instance, &env),
            Some(ObjectKind::Temperature) => self.temperature.create_instance(args, instance, &env),
            Some(ObjectKind::Humidity) => self.humidity.create_instance(args, instance, &env),
            Some(_) => Err(Error::BadRequest(format!("object {} is not a sensor", object))),
            None => Err(Error::ObjectNotFound(object)),
        }
    }

    /// Feed a new sensor reading.
    pub fn update_sensor_value(&self, object: u16, instance: u16, value: f64) -> Result<()> {
        let env = self.env();
        match ObjectKind::from_id(object) {
            Some(ObjectKind::Illuminance) => self.illuminance.update_value(instance, value, &env),
            Some(ObjectKind::Temperature) => self.temperature.update_value(instance, value, &env),
            Some(ObjectKind::Humidity) => self.humidity.update_value(instance, value, &env),
            Some(_) => Err(Error::BadRequest(format!("object {} is not a sensor", object))),
            None => Err(Error::ObjectNotFound(object)),
        }
    }

    pub fn create_light(&self, instance: Option<u16>, values: &[Resource]) -> Result<u16> {
        self.light_control.insert(instance, &self.env(), |inst, env| {
            values
                .iter()
                .try_for_each(|res| inst.write(res.id, &res.value, env))
        })
    }

    /// True (once) after a server executed Device/Reboot.
    pub fn take_reboot_request(&self) -> bool {
        self.device
            .with_instance_mut(DEVICE_INSTANCE, DeviceInstance::take_reboot_request)
            .unwrap_or(false)
    }

    /// Pending resource changes for the observe engine.
    pub fn take_notifications(&self) -> Vec<ResourcePath> {
        self.notifications.drain()
    }

    pub fn security(&self) -> &ObjectStore<SecurityInstance> {
        &self.security
    }

    pub fn device(&self) -> &ObjectStore<DeviceInstance> {
        &self.device
    }

    pub fn illuminance(&self) -> &ObjectStore<IlluminanceInstance> {
        &self.illuminance
    }

    pub fn temperature(&self) -> &ObjectStore<TemperatureInstance> {
        &self.temperature
    }

    pub fn humidity(&self) -> &ObjectStore<HumidityInstance> {
        &self.humidity
    }

    pub fn light_control(&self) -> &ObjectStore<LightControlInstance> {
        &self.light_control
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Connection to the server of a Security instance, created on first use.
    pub fn connect(&self, security_instance: u16) -> Result<Connection> {
        let env = self.env();
        let target = self.security.prepare_connection(security_instance, &env)?;

        match self.connections.connect(&target) {
            Ok(conn) => {
                // A delete may have run while the registry was connecting.
                let current = self.security.credential_tag(security_instance).ok();
                if current != Some(target.credential_tag) {
                    self.connections.close(conn.handle);
                    log::debug!(
                        "[client] security instance {} changed during connect, dropped {}",
                        security_instance,
                        conn.handle
                    );
                    return Err(Error::InstanceNotFound {
                        object: ObjectKind::Security.id(),
                        instance: security_instance,
                    });
                }
                Ok(conn)
            }
            Err(e) => {
                if target.fresh_credential {
                    self.security.discard_credential(security_instance, &env);
                }
                log::warn!(
                    "[client] connect for security instance {} failed: {}",
                    security_instance,
                    e
                );
                Err(e)
            }
        }
    }

    pub fn send(&self, handle: ConnectionHandle, data: &[u8]) -> Result<usize> {
        self.connections.send(handle, data)
    }

    /// Close a connection. Unknown handles are ignored.
    pub fn close(&self, handle: ConnectionHandle) -> bool {
        self.connections.close(handle).is_some()
    }

    /// Close every connection. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let closed = self.connections.close_all();
        log::info!("[client] closed {} connections", closed);
        closed
    }

    /// Live connection to the server with `short_server_id`.
    pub fn connection_for_server(&self, short_server_id: u16) -> Option<Connection> {
        let instance = self.security.find_by_short_server_id(short_server_id)?;
        self.connections
            .connections()
            .into_iter()
            .find(|c| c.security_instance == instance)
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    fn close_owned_connections(&self, security_instance: u16) {
        let closed = self
            .connections
            .close_for_security_instance(security_instance);
        if closed > 0 {
            log::debug!(
                "[client] closed {} connections of security instance {}",
                closed,
                security_instance
            );
        }
    }

    /// Receive one packet and hand it to `handler`.
    pub fn poll<H: PacketHandler + ?Sized>(&self, handler: &mut H, timeout: Duration) -> Result<PollOutcome> {
        // One spare byte: a datagram filling it was truncated by the socket.
        let mut buf = [0u8; MAX_PACKET_SIZE + 1];
        let Some(dgram) = self.connections.transport().recv(&mut buf, timeout)? else {
            return Ok(PollOutcome::Idle);
        };

        if dgram.len > MAX_PACKET_SIZE {
            log::warn!(
                "[client] dropping oversized datagram from {} (more than {} bytes)",
                dgram.remote,
                MAX_PACKET_SIZE
            );
            return Ok(PollOutcome::Dropped);
        }

        let Some(conn) = self.connections.find(dgram.remote, dgram.kind) else {
            log::debug!(
                "[client] dropping {} bytes from unknown {:?} peer {}",
                dgram.len,
                dgram.kind,
                dgram.remote
            );
            return Ok(PollOutcome::Dropped);
        };

        if let Err(e) = handler.handle_packet(self, &conn, &buf[..dgram.len]) {
            log::debug!("[client] packet from {} rejected: {}", conn.remote, e);
        }
        Ok(PollOutcome::Delivered(conn.handle))
    }

    /// Close all connections and remove every provisioned credential.
    pub fn shutdown(&self) {
        self.close_all();
        let env = self.env();
        for id in self.security.ids() {
            self.security.discard_credential(id, &env);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::MemoryCredentialStore;
    use crate::transport::MemoryTransport;
    use crate::value::ResourceValue;

    fn client() -> Lwm2mClient {
        Lwm2mClient::new(
            ClientConfig::default(),
            Arc::new(MemoryTransport::new()),
            Arc::new(MemoryCredentialStore::new(4)),
        )
        .unwrap()
    }

    #[test]
    fn test_device_instance_created() {
        let client = client();
        assert_eq!(client.instances(3).unwrap(), vec![0]);
        let version = client.read(3, 0, &[3]).unwrap();
        assert_eq!(
            version[0].value,
            ResourceValue::string(env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_unknown_object() {
        let client = client();
        assert!(matches!(client.read(42, 0, &[]), Err(Error::ObjectNotFound(42))));
        assert!(matches!(
            client.create(9, None, &[]),
            Err(Error::ObjectNotFound(9))
        ));
        assert!(matches!(
            client.update_sensor_value(3311, 0, 1.0),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_reboot_flag() {
        let client = client();
        assert!(!client.take_reboot_request());
        client.execute(3, 0, 4, &[]).unwrap();
        assert!(client.take_reboot_request());
        assert!(!client.take_reboot_request());
    }

    #[test]
    fn test_create_light() {
        let client = client();
        let id = client
            .create_light(None, &[Resource::new(5851, ResourceValue::Integer(80))])
            .unwrap();
        assert_eq!(client.light_control().with_instance(id, |l| l.dimmer()).unwrap(), 80);
        assert!(client
            .create_light(None, &[Resource::new(5851, ResourceValue::Integer(200))])
            .is_err());
        assert_eq!(client.instances(3311).unwrap(), vec![id]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ClientConfig::default();
        config.capacity.security = 0;
        let result = Lwm2mClient::new(
            config,
            Arc::new(MemoryTransport::new()),
            Arc::new(MemoryCredentialStore::new(1)),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
