// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IPSO sensor objects.
//!
//! Illuminance (3301), Temperature (3303) and Humidity (3304) share one
//! resource set. [`SensorInstance`] implements it once and a zero-sized
//! [`SensorProfile`] marker supplies the object ID.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::value::ResourceValue;

use super::{id, ObjectEnv, ObjectInstance, ObjectStore};

/// IPSO sensor resource IDs.
pub mod resource {
    pub const MIN_MEASURED_VALUE: u16 = 5601;
    pub const MAX_MEASURED_VALUE: u16 = 5602;
    pub const MIN_RANGE_VALUE: u16 = 5603;
    pub const MAX_RANGE_VALUE: u16 = 5604;
    pub const RESET_MIN_MAX: u16 = 5605;
    pub const SENSOR_VALUE: u16 = 5700;
    pub const SENSOR_UNITS: u16 = 5701;
    pub const APPLICATION_TYPE: u16 = 5750;
}

/// Binds the shared sensor resource set to one object ID.
pub trait SensorProfile: Send + 'static {
    const OBJECT_ID: u16;
    const NAME: &'static str;
}

#[derive(Debug)]
pub struct Illuminance;

#[derive(Debug)]
pub struct Temperature;

#[derive(Debug)]
pub struct Humidity;

impl SensorProfile for Illuminance {
    const OBJECT_ID: u16 = id::ILLUMINANCE;
    const NAME: &'static str = "illuminance";
}

impl SensorProfile for Temperature {
    const OBJECT_ID: u16 = id::TEMPERATURE;
    const NAME: &'static str = "temperature";
}

impl SensorProfile for Humidity {
    const OBJECT_ID: u16 = id::HUMIDITY;
    const NAME: &'static str = "humidity";
}

pub type IlluminanceInstance = SensorInstance<Illuminance>;
pub type TemperatureInstance = SensorInstance<Temperature>;
pub type HumidityInstance = SensorInstance<Humidity>;

/// Application-side parameters for a new sensor instance.
#[derive(Debug, Clone, Default)]
pub struct SensorArgs {
    pub value: f64,
    pub min_range: f64,
    pub max_range: f64,
    pub units: String,
    pub application_type: String,
}

/// One sensor instance.
pub struct SensorInstance<P> {
    value: f64,
    min_measured: f64,
    max_measured: f64,
    min_range: f64,
    max_range: f64,
    units: String,
    application_type: String,
    _profile: PhantomData<fn() -> P>,
}

impl<P> Default for SensorInstance<P> {
    fn default() -> Self {
        Self {
            value: 0.0,
            min_measured: 0.0,
            max_measured: 0.0,
            min_range: 0.0,
            max_range: 0.0,
            units: String::new(),
            application_type: String::new(),
            _profile: PhantomData,
        }
    }
}

impl<P: SensorProfile> fmt::Debug for SensorInstance<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorInstance")
            .field("object", &P::OBJECT_ID)
            .field("value", &self.value)
            .field("min_measured", &self.min_measured)
            .field("max_measured", &self.max_measured)
            .field("units", &self.units)
            .finish()
    }
}

impl<P: SensorProfile> SensorInstance<P> {
    pub fn value(&self) -> f64 {
        self.value
    }

    /// (min, max) measured since creation or the last reset.
    pub fn measured_range(&self) -> (f64, f64) {
        (self.min_measured, self.max_measured)
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    fn apply_args(&mut self, args: &SensorArgs, env: &ObjectEnv<'_>) -> Result<()> {
        if args.min_range > args.max_range {
            return Err(Error::BadRequest(format!(
                "sensor range [{}, {}] is empty",
                args.min_range, args.max_range
            )));
        }
        let limit = env.limits.string_max_size;
        if args.units.len() > limit || args.application_type.len() > limit {
            return Err(Error::BadRequest(format!(
                "sensor strings longer than {} bytes",
                limit
            )));
        }

        self.value = args.value;
        self.min_measured = args.value;
        self.max_measured = args.value;
        self.min_range = args.min_range;
        self.max_range = args.max_range;
        self.units = args.units.clone();
        self.application_type = args.application_type.clone();
        Ok(())
    }

    /// Store a new reading. Returns the resources whose value changed.
    pub fn update_value(&mut self, value: f64) -> Vec<u16> {
        let mut changed = Vec::new();
        if value != self.value {
            self.value = value;
            changed.push(resource::SENSOR_VALUE);
        }
        if value < self.min_measured {
            self.min_measured = value;
            changed.push(resource::MIN_MEASURED_VALUE);
        }
        if value > self.max_measured {
            self.max_measured = value;
            changed.push(resource::MAX_MEASURED_VALUE);
        }
        changed
    }
}

impl<P: SensorProfile> ObjectInstance for SensorInstance<P> {
    const OBJECT_ID: u16 = P::OBJECT_ID;
    const NAME: &'static str = P::NAME;
    const READABLE: &'static [u16] = &[5700, 5601, 5602, 5603, 5604, 5701, 5750];
    const DEFINED: &'static [u16] = &[5601, 5602, 5603, 5604, 5605, 5700, 5701, 5750];

    fn read(&self, res: u16) -> Result<ResourceValue> {
        let value = match res {
            resource::SENSOR_VALUE => ResourceValue::Float(self.value),
            resource::MIN_MEASURED_VALUE => ResourceValue::Float(self.min_measured),
            resource::MAX_MEASURED_VALUE => ResourceValue::Float(self.max_measured),
            resource::MIN_RANGE_VALUE => ResourceValue::Float(self.min_range),
            resource::MAX_RANGE_VALUE => ResourceValue::Float(self.max_range),
            resource::SENSOR_UNITS => ResourceValue::string(self.units.as_str()),
            resource::APPLICATION_TYPE => ResourceValue::string(self.application_type.as_str()),
            resource::RESET_MIN_MAX => return Err(Error::MethodNotAllowed { resource: res }),
            _ => return Err(Error::ResourceNotFound { resource: res }),
        };
        Ok(value)
    }

    fn write(&mut self, res: u16, value: &ResourceValue, env: &ObjectEnv<'_>) -> Result<()> {
        match res {
            resource::APPLICATION_TYPE => {
                let text = value.as_text(res)?;
                if text.len() > env.limits.string_max_size {
                    return Err(Error::OutOfRange { resource: res });
                }
                self.application_type = text.to_string();
                Ok(())
            }
            _ if Self::DEFINED.contains(&res) => Err(Error::MethodNotAllowed { resource: res }),
            _ => Err(Error::ResourceNotFound { resource: res }),
        }
    }

    fn execute(&mut self, res: u16, _args: &[u8], _env: &ObjectEnv<'_>) -> Result<Vec<u16>> {
        match res {
            resource::RESET_MIN_MAX => {
                self.min_measured = self.value;
                self.max_measured = self.value;
                Ok(vec![resource::MIN_MEASURED_VALUE, resource::MAX_MEASURED_VALUE])
            }
            _ if Self::DEFINED.contains(&res) => Err(Error::MethodNotAllowed { resource: res }),
            _ => Err(Error::ResourceNotFound { resource: res }),
        }
    }
}

impl<P: SensorProfile> ObjectStore<SensorInstance<P>> {
    /// Create an instance from application arguments.
    pub fn create_instance(
        &self,
        args: &SensorArgs,
        instance: Option<u16>,
        env: &ObjectEnv<'_>,
    ) -> Result<u16> {
        self.insert(instance, env, |inst, env| inst.apply_args(args, env))
    }

    /// Record a new reading and notify every resource it changed.
    pub fn update_value(&self, instance: u16, value: f64, env: &ObjectEnv<'_>) -> Result<()> {
        let changed = self.with_instance_mut(instance, |inst| inst.update_value(value))?;
        for resource in changed {
            env.notifier.notify(P::OBJECT_ID, instance, resource);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::test_util::TestEnv;
    use crate::value::{Resource, ResourcePath};

    fn temperature(t: &TestEnv) -> (ObjectStore<TemperatureInstance>, u16) {
        let store: ObjectStore<TemperatureInstance> = ObjectStore::new(2);
        let args = SensorArgs {
            value: 20.0,
            min_range: -40.0,
            max_range: 85.0,
            units: "Cel".into(),
            application_type: "room".into(),
        };
        let id = store.create_instance(&args, None, &t.env()).unwrap();
        (store, id)
    }

    #[test]
    fn test_update_widens_min_max() {
        let t = TestEnv::new();
        let (store, id) = temperature(&t);

        store.update_value(id, 25.5, &t.env()).unwrap();
        store.update_value(id, 18.0, &t.env()).unwrap();
        assert_eq!(store.with_instance(id, |s| s.measured_range()).unwrap(), (18.0, 25.5));
        assert_eq!(
            t.notifier.drain(),
            vec![
                ResourcePath::resource(3303, id, 5700),
                ResourcePath::resource(3303, id, 5602),
                ResourcePath::resource(3303, id, 5601),
            ]
        );

        // Unchanged reading: nothing to notify.
        store.update_value(id, 18.0, &t.env()).unwrap();
        assert!(t.notifier.is_empty());
    }

    #[test]
    fn test_reset_min_max() {
        let t = TestEnv::new();
        let (store, id) = temperature(&t);
        store.update_value(id, 30.0, &t.env()).unwrap();
        store.update_value(id, 22.0, &t.env()).unwrap();
        t.notifier.drain();

        store.execute(id, resource::RESET_MIN_MAX, &[], &t.env()).unwrap();
        assert_eq!(store.with_instance(id, |s| s.measured_range()).unwrap(), (22.0, 22.0));
        assert_eq!(t.notifier.len(), 2);
    }

    #[test]
    fn test_read_only_resources() {
        let t = TestEnv::new();
        let (store, id) = temperature(&t);

        assert!(matches!(
            store.write(id, &[Resource::new(5700, ResourceValue::Float(1.0))], &t.env()),
            Err(Error::MethodNotAllowed { resource: 5700 })
        ));
        store
            .write(id, &[Resource::new(5750, ResourceValue::string("outdoor"))], &t.env())
            .unwrap();

        let all = store.read(id, &[]).unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all[0], Resource::new(5700, ResourceValue::Float(20.0)));
        assert_eq!(all[5], Resource::new(5701, ResourceValue::string("Cel")));
        assert_eq!(all[6], Resource::new(5750, ResourceValue::string("outdoor")));
    }

    #[test]
    fn test_profiles_share_resources() {
        assert_eq!(<IlluminanceInstance as ObjectInstance>::OBJECT_ID, 3301);
        assert_eq!(<HumidityInstance as ObjectInstance>::OBJECT_ID, 3304);

        let t = TestEnv::new();
        let store: ObjectStore<HumidityInstance> = ObjectStore::new(1);
        let err = store
            .create_instance(
                &SensorArgs {
                    min_range: 100.0,
                    max_range: 0.0,
                    ..Default::default()
                },
                None,
                &t.env(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(store.free_len(), 1);
    }
}
