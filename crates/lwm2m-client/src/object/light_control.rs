// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IPSO Light Control object (ID 3311).

use std::time::Instant;

use crate::error::{Error, Result};
use crate::value::ResourceValue;

use super::{id, ObjectEnv, ObjectInstance};

/// Light control resource IDs.
pub mod resource {
    pub const SENSOR_UNITS: u16 = 5701;
    pub const COLOUR: u16 = 5706;
    pub const APPLICATION_TYPE: u16 = 5750;
    pub const ON_OFF: u16 = 5850;
    pub const DIMMER: u16 = 5851;
    pub const ON_TIME: u16 = 5852;
}

/// One light.
#[derive(Debug, Default)]
pub struct LightControlInstance {
    on: bool,
    dimmer: u8,
    colour: String,
    units: String,
    application_type: String,
    on_since: Option<Instant>,
}

impl LightControlInstance {
    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn dimmer(&self) -> u8 {
        self.dimmer
    }

    pub fn colour(&self) -> &str {
        &self.colour
    }

    /// Seconds the light has been on since it was switched on or the counter reset.
    pub fn on_time(&self) -> u64 {
        self.on_since.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    fn set_on(&mut self, on: bool) {
        if on && !self.on {
            self.on_since = Some(Instant::now());
        } else if !on {
            self.on_since = None;
        }
        self.on = on;
    }
}

impl ObjectInstance for LightControlInstance {
    const OBJECT_ID: u16 = id::LIGHT_CONTROL;
    const NAME: &'static str = "light";
    const READABLE: &'static [u16] = &[5850, 5851, 5706, 5701, 5852, 5750];
    const DEFINED: &'static [u16] = Self::READABLE;

    fn read(&self, res: u16) -> Result<ResourceValue> {
        let value = match res {
            resource::ON_OFF => ResourceValue::Boolean(self.on),
            resource::DIMMER => ResourceValue::Integer(i64::from(self.dimmer)),
            resource::COLOUR => ResourceValue::string(self.colour.as_str()),
            resource::SENSOR_UNITS => ResourceValue::string(self.units.as_str()),
            resource::ON_TIME => {
                ResourceValue::Integer(i64::try_from(self.on_time()).unwrap_or(i64::MAX))
            }
            resource::APPLICATION_TYPE => ResourceValue::string(self.application_type.as_str()),
            _ => return Err(Error::ResourceNotFound { resource: res }),
        };
        Ok(value)
    }

    fn write(&mut self, res: u16, value: &ResourceValue, env: &ObjectEnv<'_>) -> Result<()> {
        let limit = env.limits.string_max_size;
        match res {
            resource::ON_OFF => self.set_on(value.as_bool(res)?),
            resource::DIMMER => {
                let level = value.as_integer(res)?;
                self.dimmer = u8::try_from(level)
                    .ok()
                    .filter(|l| *l <= 100)
                    .ok_or(Error::OutOfRange { resource: res })?;
            }
            resource::COLOUR | resource::APPLICATION_TYPE => {
                let text = value.as_text(res)?;
                if text.len() > limit {
                    return Err(Error::OutOfRange { resource: res });
                }
                if res == resource::COLOUR {
                    self.colour = text.to_string();
                } else {
                    self.application_type = text.to_string();
                }
            }
            resource::ON_TIME => {
                // Only a reset to zero is accepted.
                if value.as_integer(res)? != 0 {
                    return Err(Error::OutOfRange { resource: res });
                }
                if self.on {
                    self.on_since = Some(Instant::now());
                }
            }
            resource::SENSOR_UNITS => return Err(Error::MethodNotAllowed { resource: res }),
            _ => return Err(Error::ResourceNotFound { resource: res }),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::test_util::TestEnv;
    use crate::object::ObjectStore;
    use crate::value::{Resource, ResourcePath};

    #[test]
    fn test_switch_and_dim() {
        let t = TestEnv::new();
        let store: ObjectStore<LightControlInstance> = ObjectStore::new(1);
        let id = store
            .create(
                None,
                &[
                    Resource::new(resource::ON_OFF, ResourceValue::Boolean(true)),
                    Resource::new(resource::DIMMER, ResourceValue::Integer(40)),
                    Resource::new(resource::COLOUR, ResourceValue::string("#FF8800")),
                ],
                &t.env(),
            )
            .unwrap();

        let light = store.with_instance(id, |l| (l.is_on(), l.dimmer(), l.colour().to_string()));
        assert_eq!(light.unwrap(), (true, 40, "#FF8800".to_string()));

        store
            .write(id, &[Resource::new(resource::ON_OFF, ResourceValue::Boolean(false))], &t.env())
            .unwrap();
        assert_eq!(t.notifier.drain(), vec![ResourcePath::resource(3311, id, 5850)]);
        assert_eq!(store.with_instance(id, |l| l.on_time()).unwrap(), 0);
    }

    #[test]
    fn test_invalid_writes() {
        let t = TestEnv::new();
        let store: ObjectStore<LightControlInstance> = ObjectStore::new(1);
        let id = store.create(None, &[], &t.env()).unwrap();

        for (res, value) in [
            (resource::DIMMER, ResourceValue::Integer(101)),
            (resource::DIMMER, ResourceValue::Integer(-1)),
            (resource::ON_TIME, ResourceValue::Integer(5)),
        ] {
            assert!(matches!(
                store.write(id, &[Resource::new(res, value)], &t.env()),
                Err(Error::OutOfRange { .. })
            ));
        }
        assert!(matches!(
            store.write(id, &[Resource::new(resource::SENSOR_UNITS, ResourceValue::string("x"))], &t.env()),
            Err(Error::MethodNotAllowed { resource: 5701 })
        ));
        store
            .write(id, &[Resource::new(resource::ON_TIME, ResourceValue::Integer(0))], &t.env())
            .unwrap();
    }
}
