// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LwM2M objects and the generic CRUD dispatcher.
//!
//! Each object type implements [`ObjectInstance`], which is the per-type
//! resource codec: it reads and writes single resources of one instance.
//! [`ObjectStore`] wraps an [`InstancePool`] behind its own mutex and
//! implements the protocol entry points (`read`, `write`, `create`,
//! `delete`, `execute`, `discover`) on top of the codec.
//!
//! Multi-resource writes are applied in caller order and stop at the first
//! failing resource. Resources written before the failure keep their new
//! value. On `create`, only the allocation is rolled back.

pub mod device;
pub mod light_control;
pub mod security;
pub mod sensor;

use parking_lot::Mutex;

use crate::config::Limits;
use crate::credential::CredentialManager;
use crate::error::{Error, Result};
use crate::notify::ChangeNotifier;
use crate::pool::{InstancePool, PoolError};
use crate::value::{Resource, ResourceValue};

pub use device::DeviceInstance;
pub use light_control::LightControlInstance;
pub use security::{SecurityArgs, SecurityInstance, SecurityMode};
pub use sensor::{
    Humidity, HumidityInstance, Illuminance, IlluminanceInstance, SensorArgs, SensorInstance,
    SensorProfile, Temperature, TemperatureInstance,
};

/// Object IDs handled by this client.
pub mod id {
    pub const SECURITY: u16 = 0;
    pub const DEVICE: u16 = 3;
    pub const ILLUMINANCE: u16 = 3301;
    pub const TEMPERATURE: u16 = 3303;
    pub const HUMIDITY: u16 = 3304;
    pub const LIGHT_CONTROL: u16 = 3311;
}

/// Closed set of object types known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Security,
    Device,
    Illuminance,
    Temperature,
    Humidity,
    LightControl,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 6] = [
        Self::Security,
        Self::Device,
        Self::Illuminance,
        Self::Temperature,
        Self::Humidity,
        Self::LightControl,
    ];

    pub const fn from_id(object: u16) -> Option<Self> {
        match object {
            id::SECURITY => Some(Self::Security),
            id::DEVICE => Some(Self::Device),
            id::ILLUMINANCE => Some(Self::Illuminance),
            id::TEMPERATURE => Some(Self::Temperature),
            id::HUMIDITY => Some(Self::Humidity),
            id::LIGHT_CONTROL => Some(Self::LightControl),
            _ => None,
        }
    }

    pub const fn id(self) -> u16 {
        match self {
            Self::Security => id::SECURITY,
            Self::Device => id::DEVICE,
            Self::Illuminance => id::ILLUMINANCE,
            Self::Temperature => id::TEMPERATURE,
            Self::Humidity => id::HUMIDITY,
            Self::LightControl => id::LIGHT_CONTROL,
        }
    }
}

/// Client services available to object code during a request.
#[derive(Clone, Copy)]
pub struct ObjectEnv<'a> {
    pub credentials: &'a CredentialManager,
    pub limits: &'a Limits,
    pub notifier: &'a dyn ChangeNotifier,
}

/// Per-type resource codec and lifecycle hooks.
pub trait ObjectInstance: Default + Send + 'static {
    const OBJECT_ID: u16;
    const NAME: &'static str;

    /// Resources returned by a read with no explicit resource list, in order.
    const READABLE: &'static [u16];

    /// Every resource defined for the object (discover).
    const DEFINED: &'static [u16];

    /// Whether servers may create and delete instances.
    const REMOTE_LIFECYCLE: bool = true;

    /// Encode one resource.
    fn read(&self, resource: u16) -> Result<ResourceValue>;

    /// Decode and store one resource. Must validate before mutating.
    fn write(&mut self, resource: u16, value: &ResourceValue, env: &ObjectEnv<'_>) -> Result<()>;

    /// Run an executable resource. Returns the resources whose value changed.
    fn execute(&mut self, resource: u16, _args: &[u8], _env: &ObjectEnv<'_>) -> Result<Vec<u16>> {
        if Self::DEFINED.contains(&resource) {
            Err(Error::MethodNotAllowed { resource })
        } else {
            Err(Error::ResourceNotFound { resource })
        }
    }

    /// Release external state before the instance goes back to the pool.
    fn teardown(&mut self, _env: &ObjectEnv<'_>) {}
}

/// Instance pool of one object type plus the CRUD entry points.
pub struct ObjectStore<T> {
    pool: Mutex<InstancePool<T>>,
}

impl<T: ObjectInstance> ObjectStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Mutex::new(InstancePool::new(capacity)),
        }
    }

    /// Read `resources` of an instance, or every readable resource if empty.
    pub fn read(&self, instance: u16, resources: &[u16]) -> Result<Vec<Resource>> {
        let pool = self.pool.lock();
        let inst = pool.find(instance).ok_or_else(|| not_found::<T>(instance))?;

        let ids = if resources.is_empty() {
            T::READABLE
        } else {
            resources
        };

        ids.iter()
            .map(|&id| inst.read(id).map(|value| Resource::new(id, value)))
            .collect()
    }

    /// Write resources in the given order, stopping at the first failure.
    pub fn write(&self, instance: u16, values: &[Resource], env: &ObjectEnv<'_>) -> Result<()> {
        let mut changed = Vec::with_capacity(values.len());
        let result = {
            let mut pool = self.pool.lock();
            match pool.find_mut(instance) {
                Some(inst) => write_all(inst, values, env, &mut changed),
                None => Err(not_found::<T>(instance)),
            }
        };

        notify_all::<T>(env, instance, &changed);
        if let Err(ref e) = result {
            log::debug!("[{}] write /{}/{} failed: {}", T::NAME, T::OBJECT_ID, instance, e);
        }
        result
    }

    /// Create an instance from a server request.
    pub fn create(
        &self,
        instance: Option<u16>,
        values: &[Resource],
        env: &ObjectEnv<'_>,
    ) -> Result<u16> {
        if !T::REMOTE_LIFECYCLE {
            return Err(Error::OperationNotAllowed {
                object: T::OBJECT_ID,
            });
        }
        self.insert(instance, env, |inst, env| {
            let mut changed = Vec::new();
            write_all(inst, values, env, &mut changed)
        })
    }

    /// Delete an instance from a server request.
    pub fn delete(&self, instance: u16, env: &ObjectEnv<'_>) -> Result<()> {
        if !T::REMOTE_LIFECYCLE {
            return Err(Error::OperationNotAllowed {
                object: T::OBJECT_ID,
            });
        }
        self.remove(instance, env)
    }

    /// Allocate an instance and initialise it with `init`.
    ///
    /// If `init` fails, the instance is torn down and its slot released.
    pub fn insert<F>(&self, instance: Option<u16>, env: &ObjectEnv<'_>, init: F) -> Result<u16>
    where
        F: FnOnce(&mut T, &ObjectEnv<'_>) -> Result<()>,
    {
        let mut pool = self.pool.lock();
        let (id, inst) = pool
            .allocate(instance)
            .map_err(pool_error::<T>)?;

        if let Err(e) = init(inst, env) {
            inst.teardown(env);
            if let Err(release_err) = pool.release(id) {
                log::error!(
                    "[{}] rollback of instance {} failed: {}",
                    T::NAME,
                    id,
                    release_err
                );
                debug_assert!(false, "freshly allocated instance vanished");
            }
            log::debug!("[{}] create /{}/{} rolled back: {}", T::NAME, T::OBJECT_ID, id, e);
            return Err(e);
        }

        log::debug!("[{}] created instance {}", T::NAME, id);
        Ok(id)
    }

    /// Tear down and release an instance, regardless of remote lifecycle.
    pub fn remove(&self, instance: u16, env: &ObjectEnv<'_>) -> Result<()> {
        let mut pool = self.pool.lock();
        let inst = pool
            .find_mut(instance)
            .ok_or_else(|| not_found::<T>(instance))?;
        inst.teardown(env);
        pool.release(instance).map_err(pool_error::<T>)?;
        log::debug!("[{}] deleted instance {}", T::NAME, instance);
        Ok(())
    }

    /// Execute a resource and notify the resources it changed.
    pub fn execute(
        &self,
        instance: u16,
        resource: u16,
        args: &[u8],
        env: &ObjectEnv<'_>,
    ) -> Result<()> {
        let changed = {
            let mut pool = self.pool.lock();
            let inst = pool
                .find_mut(instance)
                .ok_or_else(|| not_found::<T>(instance))?;
            inst.execute(resource, args, env)?
        };
        notify_all::<T>(env, instance, &changed);
        Ok(())
    }

    /// Check that `resources` are defined; returns the list that was checked.
    pub fn discover(&self, instance: u16, resources: &[u16]) -> Result<Vec<u16>> {
        if !self.pool.lock().contains(instance) {
            return Err(not_found::<T>(instance));
        }
        if resources.is_empty() {
            return Ok(T::DEFINED.to_vec());
        }
        match resources.iter().find(|id| !T::DEFINED.contains(id)) {
            Some(&resource) => Err(Error::ResourceNotFound { resource }),
            None => Ok(resources.to_vec()),
        }
    }

    /// Run `f` on an instance under the pool lock.
    pub fn with_instance<R>(&self, instance: u16, f: impl FnOnce(&T) -> R) -> Result<R> {
        let pool = self.pool.lock();
        pool.find(instance)
            .map(f)
            .ok_or_else(|| not_found::<T>(instance))
    }

    /// Run `f` on a mutable instance under the pool lock.
    pub fn with_instance_mut<R>(&self, instance: u16, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut pool = self.pool.lock();
        pool.find_mut(instance)
            .map(f)
            .ok_or_else(|| not_found::<T>(instance))
    }

    /// First instance (lowest ID) matching `pred`.
    pub fn find_id(&self, pred: impl Fn(&T) -> bool) -> Option<u16> {
        self.pool
            .lock()
            .iter()
            .find(|(_, inst)| pred(inst))
            .map(|(id, _)| id)
    }

    pub fn contains(&self, instance: u16) -> bool {
        self.pool.lock().contains(instance)
    }

    /// Used instance IDs, ascending.
    pub fn ids(&self) -> Vec<u16> {
        self.pool.lock().ids()
    }

    pub fn len(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pool.lock().capacity()
    }

    pub fn free_len(&self) -> usize {
        self.pool.lock().free_len()
    }

    /// `(used, free)` slot counts taken under one lock.
    pub fn occupancy(&self) -> (usize, usize) {
        let pool = self.pool.lock();
        (pool.len(), pool.free_len())
    }
}

fn write_all<T: ObjectInstance>(
    inst: &mut T,
    values: &[Resource],
    env: &ObjectEnv<'_>,
    changed: &mut Vec<u16>,
) -> Result<()> {
    for res in values {
        if !T::DEFINED.contains(&res.id) {
            return Err(Error::ResourceNotFound { resource: res.id });
        }
        inst.write(res.id, &res.value, env)?;
        changed.push(res.id);
    }
    Ok(())
}

fn notify_all<T: ObjectInstance>(env: &ObjectEnv<'_>, instance: u16, resources: &[u16]) {
    for &resource in resources {
        env.notifier.notify(T::OBJECT_ID, instance, resource);
    }
}

fn not_found<T: ObjectInstance>(instance: u16) -> Error {
    Error::InstanceNotFound {
        object: T::OBJECT_ID,
        instance,
    }
}

fn pool_error<T: ObjectInstance>(err: PoolError) -> Error {
    match err {
        PoolError::NoCapacity => Error::NoCapacity {
            object: T::OBJECT_ID,
        },
        PoolError::IdInUse(id) => Error::IdInUse(id),
        PoolError::IdTooLarge(id) => Error::IdTooLarge(id),
        PoolError::NotFound(id) => not_found::<T>(id),
    }
}
