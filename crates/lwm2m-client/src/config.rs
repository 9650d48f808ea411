// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client configuration.
//!
//! Supports both programmatic and file-based configuration. Every field has a
//! default, so a TOML file only needs the values it overrides:
//!
//! ```toml
//! endpoint_name = "riot-node-7"
//!
//! [capacity]
//! security = 3
//! temperature = 2
//!
//! [credentials]
//! tag_base = 20
//!
//! [device]
//! manufacturer = "ACME"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// LwM2M endpoint client name.
    pub endpoint_name: String,

    /// Instance pool sizes per object type.
    pub capacity: CapacityConfig,

    /// Default CoAP ports.
    pub ports: PortConfig,

    /// Resource buffer limits.
    pub limits: Limits,

    /// Credential tag allocation and provisioning policy.
    pub credentials: CredentialConfig,

    /// DTLS session parameters.
    pub dtls: DtlsConfig,

    /// Static device metadata exposed through the Device object.
    pub device: DeviceConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity.security == 0 {
            return Err(ConfigError::Invalid(
                "at least one security instance is required".into(),
            ));
        }
        if self.limits.uri_max_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "uri_max_size {} leaves no room for a URI",
                self.limits.uri_max_size
            )));
        }
        for (name, port) in [
            ("standard", self.ports.standard),
            ("bootstrap", self.ports.bootstrap),
        ] {
            if port == 0 {
                return Err(ConfigError::Invalid(format!("{} port must not be 0", name)));
            }
        }
        if self.dtls.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "DTLS handshake timeout must be positive".into(),
            ));
        }
        if self.credentials.tag_base == u16::MAX {
            return Err(ConfigError::Invalid(
                "credential tag base leaves no tags to allocate".into(),
            ));
        }
        Ok(())
    }
}

/// Instance capacities (the `*_INSTANCES_MAX` bounds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub security: usize,
    pub temperature: usize,
    pub humidity: usize,
    pub illuminance: usize,
    pub light_control: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            security: 2,
            temperature: 2,
            humidity: 2,
            illuminance: 2,
            light_control: 2,
        }
    }
}

/// Default server ports, used when the server URI carries none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Standard LwM2M server port.
    pub standard: u16,
    /// Bootstrap server port.
    pub bootstrap: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            standard: 5683,
            bootstrap: 5685,
        }
    }
}

impl PortConfig {
    /// Port used when the URI does not name one.
    pub const fn default_for(&self, is_bootstrap: bool) -> u16 {
        if is_bootstrap {
            self.bootstrap
        } else {
            self.standard
        }
    }
}

/// Buffer limits for instance resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// URI buffer size, including the terminator byte of the wire buffer.
    pub uri_max_size: usize,
    pub pub_key_or_id_size: usize,
    pub secret_key_size: usize,
    pub server_pub_key_size: usize,
    /// Maximum length of writable string resources.
    pub string_max_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            uri_max_size: 64,
            pub_key_or_id_size: 128,
            secret_key_size: 64,
            server_pub_key_size: 128,
            string_max_size: 32,
        }
    }
}

/// Credential tag policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Tags are handed out starting at `tag_base + 1`.
    pub tag_base: u16,

    /// Re-provision the store on same-length key changes too.
    ///
    /// Off by default: only a change in key length triggers re-provisioning.
    pub reprovision_on_content_change: bool,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            tag_base: 10,
            reprovision_on_content_change: false,
        }
    }
}

/// DTLS session parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtlsConfig {
    /// Bound on the handshake receive.
    pub handshake_timeout_ms: u64,

    /// Re-handshake a session idle for longer than this before sending (0 = never).
    pub session_refresh_secs: u64,
}

impl Default for DtlsConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 1000,
            session_refresh_secs: 0,
        }
    }
}

impl DtlsConfig {
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub const fn session_refresh(&self) -> Option<Duration> {
        if self.session_refresh_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.session_refresh_secs))
        }
    }
}

/// Device object metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware_version: String,
    pub hardware_version: String,
    pub software_version: String,
    pub device_type: String,
    pub binding: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            manufacturer: "unknown".to_string(),
            model: "unknown".to_string(),
            serial: "0".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            hardware_version: "unknown".to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            device_type: "node".to_string(),
            binding: "U".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ports.default_for(false), 5683);
        assert_eq!(config.ports.default_for(true), 5685);
        assert_eq!(config.dtls.handshake_timeout(), Duration::from_secs(1));
        assert_eq!(config.dtls.session_refresh(), None);
    }

    #[test]
    fn test_partial_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            endpoint_name = "node-1"

            [capacity]
            security = 4

            [credentials]
            tag_base = 100
            reprovision_on_content_change = true

            [device]
            manufacturer = "ACME"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint_name, "node-1");
        assert_eq!(config.capacity.security, 4);
        assert_eq!(config.capacity.temperature, 2);
        assert_eq!(config.credentials.tag_base, 100);
        assert!(config.credentials.reprovision_on_content_change);
        assert_eq!(config.device.manufacturer, "ACME");
        assert_eq!(config.device.binding, "U");
        assert_eq!(config.limits, Limits::default());
    }

    #[test]
    fn test_invalid_config() {
        let err = ClientConfig::from_toml_str("[capacity]\nsecurity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ClientConfig::from_toml_str("[ports]\nstandard = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ClientConfig::from_toml_str("capacity = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dtls]\nhandshake_timeout_ms = 250\nsession_refresh_secs = 60").unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.dtls.handshake_timeout(), Duration::from_millis(250));
        assert_eq!(config.dtls.session_refresh(), Some(Duration::from_secs(60)));

        let missing = ClientConfig::from_file("/nonexistent/lwm2m.toml");
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
