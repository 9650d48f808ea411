// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LwM2M Security object (ID 0).
//!
//! Holds the URI and key material for every server the client talks to.
//! Instances in PSK or RPK mode own one credential store entry, identified
//! by their credential tag. The entry is (re)provisioned when key material
//! changes size and removed when the instance is deleted.

use crate::connection::{ConnectTarget, ConnectionKind};
use crate::credential::{Credential, CredentialTag, StoreError};
use crate::error::{Error, Result};
use crate::value::ResourceValue;

use super::{id, ObjectEnv, ObjectInstance, ObjectStore};

/// Security object resource IDs.
pub mod resource {
    pub const URI: u16 = 0;
    pub const BOOTSTRAP: u16 = 1;
    pub const SECURITY_MODE: u16 = 2;
    pub const PUBLIC_KEY_OR_ID: u16 = 3;
    pub const SERVER_PUBLIC_KEY: u16 = 4;
    pub const SECRET_KEY: u16 = 5;
    pub const SMS_SECURITY_MODE: u16 = 6;
    pub const SMS_BINDING_KEY_PARAM: u16 = 7;
    pub const SMS_BINDING_SECRET_KEY: u16 = 8;
    pub const SMS_SERVER_NUMBER: u16 = 9;
    pub const SHORT_SERVER_ID: u16 = 10;
    pub const CLIENT_HOLD_OFF_TIME: u16 = 11;
    pub const BOOTSTRAP_TIMEOUT: u16 = 12;
}

/// UDP channel security mode (resource 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    PreSharedKey,
    RawPublicKey,
    Certificate,
    #[default]
    NoSec,
}

impl SecurityMode {
    pub const fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::PreSharedKey),
            1 => Some(Self::RawPublicKey),
            2 => Some(Self::Certificate),
            3 => Some(Self::NoSec),
            _ => None,
        }
    }

    pub const fn as_i64(self) -> i64 {
        match self {
            Self::PreSharedKey => 0,
            Self::RawPublicKey => 1,
            Self::Certificate => 2,
            Self::NoSec => 3,
        }
    }

    /// True for modes backed by a credential store entry.
    pub const fn uses_credential(self) -> bool {
        matches!(self, Self::PreSharedKey | Self::RawPublicKey)
    }
}

/// Application-side parameters for a new Security instance.
#[derive(Debug, Clone, Default)]
pub struct SecurityArgs {
    pub server_uri: String,
    pub server_id: u16,
    pub security_mode: SecurityMode,
    pub is_bootstrap: bool,
    pub client_hold_off_time: u32,
    pub bootstrap_account_timeout: u32,
    /// PSK identity, or the client public key in RPK mode.
    pub pub_key_or_id: Vec<u8>,
    /// PSK key, or the client private key in RPK mode.
    pub secret_key: Vec<u8>,
    pub server_pub_key: Vec<u8>,
}

/// One Security instance.
#[derive(Debug, Default)]
pub struct SecurityInstance {
    uri: String,
    is_bootstrap: bool,
    security_mode: SecurityMode,
    pub_key_or_id: Vec<u8>,
    server_pub_key: Vec<u8>,
    secret_key: Vec<u8>,
    short_server_id: u16,
    client_hold_off_time: u32,
    bootstrap_account_timeout: u32,
    credential_tag: Option<CredentialTag>,
}

impl SecurityInstance {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_bootstrap(&self) -> bool {
        self.is_bootstrap
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.security_mode
    }

    pub fn short_server_id(&self) -> u16 {
        self.short_server_id
    }

    pub fn credential_tag(&self) -> Option<CredentialTag> {
        self.credential_tag
    }

    /// Key material for the current mode, if complete.
    pub fn credential(&self) -> Option<Credential> {
        match self.security_mode {
            SecurityMode::PreSharedKey
                if !self.pub_key_or_id.is_empty() && !self.secret_key.is_empty() =>
            {
                Some(Credential::Psk {
                    identity: self.pub_key_or_id.clone(),
                    key: self.secret_key.clone(),
                })
            }
            SecurityMode::RawPublicKey
                if !self.pub_key_or_id.is_empty()
                    && !self.secret_key.is_empty()
                    && !self.server_pub_key.is_empty() =>
            {
                Some(Credential::Rpk {
                    public_key: self.pub_key_or_id.clone(),
                    private_key: self.secret_key.clone(),
                    peer_public_key: self.server_pub_key.clone(),
                })
            }
            _ => None,
        }
    }

    /// Bring the credential store in line with the instance.
    ///
    /// Complete key material is provisioned under the instance's tag (a new
    /// one is assigned if needed). Otherwise any existing entry is removed.
    /// A failed provisioning leaves the instance without a tag.
    pub fn refresh_credential(&mut self, env: &ObjectEnv<'_>) -> Result<()> {
        let Some(credential) = self.credential() else {
            env.credentials.deprovision(&mut self.credential_tag);
            return Ok(());
        };

        let tag = env.credentials.ensure_tag(&mut self.credential_tag)?;
        if let Err(e) = env.credentials.provision(tag, &credential) {
            env.credentials.deprovision(&mut self.credential_tag);
            return Err(e.into());
        }
        Ok(())
    }

    /// Initialise a freshly allocated instance from application arguments.
    pub fn apply_args(&mut self, args: &SecurityArgs, env: &ObjectEnv<'_>) -> Result<()> {
        let limits = env.limits;

        if args.server_uri.is_empty() {
            return Err(Error::BadRequest("server URI is required".into()));
        }
        if args.server_uri.len() > limits.uri_max_size.saturating_sub(1) {
            return Err(Error::BadRequest(format!(
                "server URI longer than {} bytes",
                limits.uri_max_size.saturating_sub(1)
            )));
        }
        if args.server_id == 0 || args.server_id == u16::MAX {
            return Err(Error::BadRequest(format!(
                "short server ID {} out of range",
                args.server_id
            )));
        }

        match args.security_mode {
            SecurityMode::NoSec => {}
            SecurityMode::Certificate => {
                return Err(Error::Unsupported("certificate security mode".into()));
            }
            SecurityMode::PreSharedKey | SecurityMode::RawPublicKey => {
                check_buffer("public key or identity", &args.pub_key_or_id, limits.pub_key_or_id_size)?;
                check_buffer("secret key", &args.secret_key, limits.secret_key_size)?;
                if args.security_mode == SecurityMode::RawPublicKey {
                    check_buffer(
                        "server public key",
                        &args.server_pub_key,
                        limits.server_pub_key_size,
                    )?;
                }
            }
        }

        self.uri = args.server_uri.clone();
        self.is_bootstrap = args.is_bootstrap;
        self.security_mode = args.security_mode;
        self.short_server_id = args.server_id;
        self.client_hold_off_time = args.client_hold_off_time;
        self.bootstrap_account_timeout = args.bootstrap_account_timeout;

        if args.security_mode.uses_credential() {
            self.pub_key_or_id = args.pub_key_or_id.clone();
            self.secret_key = args.secret_key.clone();
            if args.security_mode == SecurityMode::RawPublicKey {
                self.server_pub_key = args.server_pub_key.clone();
            }
            self.refresh_credential(env).map_err(|e| {
                log::warn!("[security] could not register the credential: {}", e);
                e
            })?;
        }
        Ok(())
    }

    fn write_key(
        &mut self,
        resource: u16,
        value: &ResourceValue,
        limit: usize,
        env: &ObjectEnv<'_>,
    ) -> Result<()> {
        let bytes = value.as_bytes(resource)?;
        if bytes.len() > limit {
            return Err(Error::OutOfRange { resource });
        }

        let buffer = match resource {
            resource::PUBLIC_KEY_OR_ID => &mut self.pub_key_or_id,
            resource::SECRET_KEY => &mut self.secret_key,
            _ => &mut self.server_pub_key,
        };
        let size_changed = buffer.len() != bytes.len();
        let content_changed = buffer.as_slice() != bytes;
        buffer.clear();
        buffer.extend_from_slice(bytes);

        if size_changed || (content_changed && env.credentials.reprovision_on_content_change()) {
            self.refresh_credential(env)?;
        }
        Ok(())
    }
}

fn check_buffer(name: &str, bytes: &[u8], limit: usize) -> Result<()> {
    if bytes.is_empty() {
        return Err(Error::BadRequest(format!("{} is required", name)));
    }
    if bytes.len() > limit {
        return Err(Error::BadRequest(format!(
            "{} longer than {} bytes",
            name, limit
        )));
    }
    Ok(())
}

fn u32_resource(value: &ResourceValue, resource: u16) -> Result<u32> {
    let v = value.as_integer(resource)?;
    u32::try_from(v).map_err(|_| Error::OutOfRange { resource })
}

impl ObjectInstance for SecurityInstance {
    const OBJECT_ID: u16 = id::SECURITY;
    const NAME: &'static str = "security";
    const READABLE: &'static [u16] = &[
        resource::URI,
        resource::BOOTSTRAP,
        resource::SECURITY_MODE,
        resource::PUBLIC_KEY_OR_ID,
        resource::SERVER_PUBLIC_KEY,
        resource::SECRET_KEY,
        resource::SHORT_SERVER_ID,
        resource::CLIENT_HOLD_OFF_TIME,
        resource::BOOTSTRAP_TIMEOUT,
    ];
    const DEFINED: &'static [u16] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    fn read(&self, res: u16) -> Result<ResourceValue> {
        let value = match res {
            resource::URI => ResourceValue::string(self.uri.as_str()),
            resource::BOOTSTRAP => ResourceValue::Boolean(self.is_bootstrap),
            resource::SECURITY_MODE => ResourceValue::Integer(self.security_mode.as_i64()),
            resource::PUBLIC_KEY_OR_ID => ResourceValue::opaque(self.pub_key_or_id.as_slice()),
            resource::SERVER_PUBLIC_KEY => ResourceValue::opaque(self.server_pub_key.as_slice()),
            resource::SECRET_KEY => ResourceValue::opaque(self.secret_key.as_slice()),
            resource::SHORT_SERVER_ID => ResourceValue::Integer(i64::from(self.short_server_id)),
            resource::CLIENT_HOLD_OFF_TIME => {
                ResourceValue::Integer(i64::from(self.client_hold_off_time))
            }
            resource::BOOTSTRAP_TIMEOUT => {
                ResourceValue::Integer(i64::from(self.bootstrap_account_timeout))
            }
            _ => return Err(Error::ResourceNotFound { resource: res }),
        };
        Ok(value)
    }

    fn write(&mut self, res: u16, value: &ResourceValue, env: &ObjectEnv<'_>) -> Result<()> {
        match res {
            resource::URI => {
                let uri = value.as_text(res)?;
                if uri.len() > env.limits.uri_max_size.saturating_sub(1) {
                    return Err(Error::OutOfRange { resource: res });
                }
                self.uri = uri.to_string();
            }
            resource::BOOTSTRAP => self.is_bootstrap = value.as_bool(res)?,
            resource::SECURITY_MODE => {
                let mode = SecurityMode::from_i64(value.as_integer(res)?)
                    .ok_or(Error::OutOfRange { resource: res })?;
                if mode != self.security_mode {
                    self.security_mode = mode;
                    self.refresh_credential(env)?;
                }
            }
            resource::PUBLIC_KEY_OR_ID => {
                self.write_key(res, value, env.limits.pub_key_or_id_size, env)?
            }
            resource::SERVER_PUBLIC_KEY => {
                self.write_key(res, value, env.limits.server_pub_key_size, env)?
            }
            resource::SECRET_KEY => self.write_key(res, value, env.limits.secret_key_size, env)?,
            resource::SMS_SECURITY_MODE..=resource::SMS_SERVER_NUMBER => {
                log::trace!("[security] ignoring SMS resource {}", res);
            }
            resource::SHORT_SERVER_ID => {
                let v = value.as_integer(res)?;
                if !(1..i64::from(u16::MAX)).contains(&v) {
                    return Err(Error::OutOfRange { resource: res });
                }
                self.short_server_id = v as u16;
            }
            resource::CLIENT_HOLD_OFF_TIME => self.client_hold_off_time = u32_resource(value, res)?,
            resource::BOOTSTRAP_TIMEOUT => {
                self.bootstrap_account_timeout = u32_resource(value, res)?
            }
            _ => return Err(Error::ResourceNotFound { resource: res }),
        }
        Ok(())
    }

    fn teardown(&mut self, env: &ObjectEnv<'_>) {
        // Whatever the mode says, never leave an orphaned store entry.
        env.credentials.deprovision(&mut self.credential_tag);
    }
}

impl ObjectStore<SecurityInstance> {
    /// Create an instance from application arguments.
    pub fn create_instance(
        &self,
        args: &SecurityArgs,
        instance: Option<u16>,
        env: &ObjectEnv<'_>,
    ) -> Result<u16> {
        self.insert(instance, env, |inst, env| inst.apply_args(args, env))
    }

    /// Credential tag of an instance, `None` if it has none.
    pub fn credential_tag(&self, instance: u16) -> Result<Option<CredentialTag>> {
        self.with_instance(instance, SecurityInstance::credential_tag)
    }

    /// Instance serving `short_server_id`.
    pub fn find_by_short_server_id(&self, short_server_id: u16) -> Option<u16> {
        self.find_id(|inst| inst.short_server_id == short_server_id)
    }

    /// Snapshot everything needed to reach the instance's server.
    ///
    /// Secured instances without a tag are provisioned here. The returned
    /// target says so, so a failed connect can undo it.
    pub fn prepare_connection(&self, instance: u16, env: &ObjectEnv<'_>) -> Result<ConnectTarget> {
        self.with_instance_mut(instance, |inst| -> Result<ConnectTarget> {
            let kind = match inst.security_mode {
                SecurityMode::NoSec => ConnectionKind::Udp,
                SecurityMode::PreSharedKey | SecurityMode::RawPublicKey => ConnectionKind::Dtls,
                SecurityMode::Certificate => {
                    return Err(Error::Unsupported("certificate security mode".into()));
                }
            };

            let mut fresh_credential = false;
            if kind == ConnectionKind::Dtls && inst.credential_tag.is_none() {
                if inst.credential().is_none() {
                    return Err(Error::from(StoreError::Incomplete));
                }
                inst.refresh_credential(env)?;
                fresh_credential = true;
            }

            Ok(ConnectTarget {
                security_instance: instance,
                uri: inst.uri.clone(),
                is_bootstrap: inst.is_bootstrap,
                kind,
                credential_tag: inst.credential_tag,
                short_server_id: inst.short_server_id,
                fresh_credential,
            })
        })?
    }

    /// Drop the credential of an instance, e.g. after a failed connect.
    pub fn discard_credential(&self, instance: u16, env: &ObjectEnv<'_>) {
        let result = self.with_instance_mut(instance, |inst| {
            env.credentials.deprovision(&mut inst.credential_tag);
        });
        if let Err(e) = result {
            log::debug!("[security] no credential to discard for instance {}: {}", instance, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialStore;
    use crate::object::test_util::TestEnv;
    use crate::value::Resource;

    fn psk_args() -> SecurityArgs {
        SecurityArgs {
            server_uri: "coaps://[2001:db8::1]:5684".into(),
            server_id: 1,
            security_mode: SecurityMode::PreSharedKey,
            pub_key_or_id: b"client1".to_vec(),
            secret_key: b"secret01".to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_short_server_id_out_of_range() {
        let t = TestEnv::new();
        let store: ObjectStore<SecurityInstance> = ObjectStore::new(2);
        let id = store.create_instance(&psk_args(), None, &t.env()).unwrap();

        let err = store
            .write(
                id,
                &[Resource::new(resource::SHORT_SERVER_ID, ResourceValue::Integer(70000))],
                &t.env(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::OutOfRange { resource: 10 }));
        assert_eq!(store.with_instance(id, |s| s.short_server_id()).unwrap(), 1);

        for bad in [0, 65535] {
            assert!(store
                .write(
                    id,
                    &[Resource::new(resource::SHORT_SERVER_ID, ResourceValue::Integer(bad))],
                    &t.env(),
                )
                .is_err());
        }
    }

    #[test]
    fn test_psk_create_provisions_store() {
        let t = TestEnv::new();
        let store: ObjectStore<SecurityInstance> = ObjectStore::new(2);
        let id = store.create_instance(&psk_args(), None, &t.env()).unwrap();

        let tag = store.credential_tag(id).unwrap().unwrap();
        assert_eq!(tag.get(), 11);
        assert_eq!(
            t.store.get(tag),
            Some(Credential::Psk {
                identity: b"client1".to_vec(),
                key: b"secret01".to_vec(),
            })
        );

        store.delete(id, &t.env()).unwrap();
        assert!(!t.store.contains(tag));
        assert!(t.credentials.registered_tags().is_empty());
    }

    #[test]
    fn test_read_all_order() {
        let t = TestEnv::new();
        let store: ObjectStore<SecurityInstance> = ObjectStore::new(1);
        let id = store.create_instance(&psk_args(), None, &t.env()).unwrap();

        let ids: Vec<u16> = store.read(id, &[]).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5, 10, 11, 12]);
        assert!(matches!(
            store.read(id, &[resource::SMS_SERVER_NUMBER]),
            Err(Error::ResourceNotFound { resource: 9 })
        ));
        assert!(matches!(
            store.execute(id, resource::URI, &[], &t.env()),
            Err(Error::MethodNotAllowed { resource: 0 })
        ));
    }

    #[test]
    fn test_create_args_validation() {
        let t = TestEnv::new();
        let store: ObjectStore<SecurityInstance> = ObjectStore::new(2);

        let mut args = psk_args();
        args.server_id = 0;
        assert!(matches!(
            store.create_instance(&args, None, &t.env()),
            Err(Error::BadRequest(_))
        ));

        let mut args = psk_args();
        args.secret_key = vec![0; 65];
        assert!(matches!(
            store.create_instance(&args, None, &t.env()),
            Err(Error::BadRequest(_))
        ));

        let mut args = psk_args();
        args.security_mode = SecurityMode::RawPublicKey;
        assert!(matches!(
            store.create_instance(&args, None, &t.env()),
            Err(Error::BadRequest(_))
        ));

        let mut args = psk_args();
        args.security_mode = SecurityMode::Certificate;
        assert!(matches!(
            store.create_instance(&args, None, &t.env()),
            Err(Error::Unsupported(_))
        ));

        let mut args = psk_args();
        args.server_uri = "x".repeat(64);
        assert!(matches!(
            store.create_instance(&args, None, &t.env()),
            Err(Error::BadRequest(_))
        ));

        assert_eq!(store.len(), 0);
        assert!(t.store.is_empty());
    }

    #[test]
    fn test_store_full_rolls_back_create() {
        let t = TestEnv::new();
        let store: ObjectStore<SecurityInstance> = ObjectStore::new(8);
        for _ in 0..4 {
            store.create_instance(&psk_args(), None, &t.env()).unwrap();
        }
        let err = store.create_instance(&psk_args(), None, &t.env()).unwrap_err();
        assert!(matches!(err, Error::StoreFailure(StoreError::Full)));
        assert_eq!(store.len(), 4);
        assert_eq!(t.store.len(), 4);
    }

    #[test]
    fn test_key_length_change_reprovisions() {
        let t = TestEnv::new();
        let store: ObjectStore<SecurityInstance> = ObjectStore::new(1);
        let id = store.create_instance(&psk_args(), None, &t.env()).unwrap();
        let tag = store.credential_tag(id).unwrap().unwrap();

        // Same length: store keeps the old key.
        store
            .write(
                id,
                &[Resource::new(resource::SECRET_KEY, ResourceValue::opaque(b"secret02".to_vec()))],
                &t.env(),
            )
            .unwrap();
        assert_eq!(
            t.store.get(tag),
            Some(Credential::Psk {
                identity: b"client1".to_vec(),
                key: b"secret01".to_vec(),
            })
        );

        // New length: re-provisioned under the same tag.
        store
            .write(
                id,
                &[Resource::new(resource::SECRET_KEY, ResourceValue::opaque(b"longer-secret".to_vec()))],
                &t.env(),
            )
            .unwrap();
        assert_eq!(store.credential_tag(id).unwrap(), Some(tag));
        assert_eq!(
            t.store.get(tag),
            Some(Credential::Psk {
                identity: b"client1".to_vec(),
                key: b"longer-secret".to_vec(),
            })
        );
    }

    #[test]
    fn test_remote_create_provisions_when_complete() {
        let t = TestEnv::new();
        let store: ObjectStore<SecurityInstance> = ObjectStore::new(1);
        let id = store
            .create(
                None,
                &[
                    Resource::new(resource::URI, ResourceValue::string("coaps://192.0.2.1")),
                    Resource::new(resource::SECURITY_MODE, ResourceValue::Integer(0)),
                    Resource::new(resource::PUBLIC_KEY_OR_ID, ResourceValue::opaque(b"id".to_vec())),
                    Resource::new(resource::SMS_SECURITY_MODE, ResourceValue::Integer(1)),
                ],
                &t.env(),
            )
            .unwrap();
        assert_eq!(store.credential_tag(id).unwrap(), None);

        store
            .write(
                id,
                &[Resource::new(resource::SECRET_KEY, ResourceValue::opaque(b"k".to_vec()))],
                &t.env(),
            )
            .unwrap();
        assert!(store.credential_tag(id).unwrap().is_some());

        // Switching to NoSec drops the entry.
        store
            .write(
                id,
                &[Resource::new(resource::SECURITY_MODE, ResourceValue::Integer(3))],
                &t.env(),
            )
            .unwrap();
        assert_eq!(store.credential_tag(id).unwrap(), None);
        assert!(t.store.is_empty());
    }

    #[test]
    fn test_prepare_connection() {
        let t = TestEnv::new();
        let store: ObjectStore<SecurityInstance> = ObjectStore::new(2);
        let psk = store.create_instance(&psk_args(), None, &t.env()).unwrap();
        let plain = store
            .create_instance(
                &SecurityArgs {
                    server_uri: "coap://192.0.2.1".into(),
                    server_id: 2,
                    ..Default::default()
                },
                None,
                &t.env(),
            )
            .unwrap();

        let target = store.prepare_connection(psk, &t.env()).unwrap();
        assert_eq!(target.kind, ConnectionKind::Dtls);
        assert!(target.credential_tag.is_some());
        assert!(!target.fresh_credential);

        let target = store.prepare_connection(plain, &t.env()).unwrap();
        assert_eq!(target.kind, ConnectionKind::Udp);
        assert_eq!(target.credential_tag, None);
        assert_eq!(store.find_by_short_server_id(2), Some(plain));
    }

    #[test]
    fn test_discard_credential_of_missing_instance() {
        let t = TestEnv::new();
        let store: ObjectStore<SecurityInstance> = ObjectStore::new(2);
        let id = store.create_instance(&psk_args(), None, &t.env()).unwrap();
        let tag = store.credential_tag(id).unwrap().unwrap();

        store.discard_credential(id + 1, &t.env());
        assert!(t.store.contains(tag));
        assert!(t.credentials.is_registered(tag));

        store.discard_credential(id, &t.env());
        assert!(!t.store.contains(tag));
        assert_eq!(store.credential_tag(id).unwrap(), None);
    }
}
