// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LwM2M Device object (ID 3).
//!
//! Exactly one instance (ID 0) exists, created at client start from the
//! `[device]` configuration. Servers can neither create nor delete it.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::value::ResourceValue;

use super::{id, ObjectEnv, ObjectInstance};

/// Device object resource IDs.
pub mod resource {
    pub const MANUFACTURER: u16 = 0;
    pub const MODEL_NUMBER: u16 = 1;
    pub const SERIAL_NUMBER: u16 = 2;
    pub const FIRMWARE_VERSION: u16 = 3;
    pub const REBOOT: u16 = 4;
    pub const ERROR_CODE: u16 = 11;
    pub const CURRENT_TIME: u16 = 13;
    pub const UTC_OFFSET: u16 = 14;
    pub const TIMEZONE: u16 = 15;
    pub const SUPPORTED_BINDING: u16 = 16;
    pub const DEVICE_TYPE: u16 = 17;
    pub const HARDWARE_VERSION: u16 = 18;
    pub const SOFTWARE_VERSION: u16 = 19;
}

/// The Device instance.
#[derive(Debug, Default)]
pub struct DeviceInstance {
    info: DeviceConfig,
    error_code: i64,
    /// Server time minus local time, in seconds.
    time_offset: i64,
    utc_offset: String,
    timezone: String,
    reboot_requested: bool,
}

impl DeviceInstance {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            info: config.clone(),
            ..Default::default()
        }
    }

    /// True once a server executed the Reboot resource.
    pub fn reboot_requested(&self) -> bool {
        self.reboot_requested
    }

    /// Clear the reboot flag, returning its previous value.
    pub fn take_reboot_request(&mut self) -> bool {
        std::mem::take(&mut self.reboot_requested)
    }

    pub fn set_error_code(&mut self, code: i64) {
        self.error_code = code;
    }

    fn current_time(&self) -> i64 {
        unix_now().saturating_add(self.time_offset)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn bounded_text(value: &ResourceValue, resource: u16, limit: usize) -> Result<String> {
    let text = value.as_text(resource)?;
    if text.len() > limit {
        return Err(Error::OutOfRange { resource });
    }
    Ok(text.to_string())
}

impl ObjectInstance for DeviceInstance {
    const OBJECT_ID: u16 = id::DEVICE;
    const NAME: &'static str = "device";
    const READABLE: &'static [u16] = &[0, 1, 2, 3, 11, 13, 14, 15, 16, 17, 18, 19];
    const DEFINED: &'static [u16] = &[0, 1, 2, 3, 4, 11, 13, 14, 15, 16, 17, 18, 19];
    const REMOTE_LIFECYCLE: bool = false;

    fn read(&self, res: u16) -> Result<ResourceValue> {
        let value = match res {
            resource::MANUFACTURER => ResourceValue::string(self.info.manufacturer.as_str()),
            resource::MODEL_NUMBER => ResourceValue::string(self.info.model.as_str()),
            resource::SERIAL_NUMBER => ResourceValue::string(self.info.serial.as_str()),
            resource::FIRMWARE_VERSION => {
                ResourceValue::string(self.info.firmware_version.as_str())
            }
            resource::ERROR_CODE => ResourceValue::Integer(self.error_code),
            resource::CURRENT_TIME => ResourceValue::Integer(self.current_time()),
            resource::UTC_OFFSET => ResourceValue::string(self.utc_offset.as_str()),
            resource::TIMEZONE => ResourceValue::string(self.timezone.as_str()),
            resource::SUPPORTED_BINDING => ResourceValue::string(self.info.binding.as_str()),
            resource::DEVICE_TYPE => ResourceValue::string(self.info.device_type.as_str()),
            resource::HARDWARE_VERSION => {
                ResourceValue::string(self.info.hardware_version.as_str())
            }
            resource::SOFTWARE_VERSION => {
                ResourceValue::string(self.info.software_version.as_str())
            }
            resource::REBOOT => return Err(Error::MethodNotAllowed { resource: res }),
            _ => return Err(Error::ResourceNotFound { resource: res }),
        };
        Ok(value)
    }

    fn write(&mut self, res: u16, value: &ResourceValue, env: &ObjectEnv<'_>) -> Result<()> {
        match res {
            resource::CURRENT_TIME => {
                let server_time = value.as_integer(res)?;
                self.time_offset = server_time.saturating_sub(unix_now());
            }
            resource::UTC_OFFSET => {
                self.utc_offset = bounded_text(value, res, env.limits.string_max_size)?
            }
            resource::TIMEZONE => {
                self.timezone = bounded_text(value, res, env.limits.string_max_size)?
            }
            _ if Self::DEFINED.contains(&res) => {
                return Err(Error::MethodNotAllowed { resource: res })
            }
            _ => return Err(Error::ResourceNotFound { resource: res }),
        }
        Ok(())
    }

    fn execute(&mut self, res: u16, _args: &[u8], _env: &ObjectEnv<'_>) -> Result<Vec<u16>> {
        match res {
            resource::REBOOT => {
                log::info!("[device] reboot requested");
                self.reboot_requested = true;
                Ok(Vec::new())
            }
            _ if Self::DEFINED.contains(&res) => Err(Error::MethodNotAllowed { resource: res }),
            _ => Err(Error::ResourceNotFound { resource: res }),
        }
    }
}
