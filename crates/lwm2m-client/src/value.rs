// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic resource values exchanged with the protocol layer.
//!
//! A [`ResourceValue`] is the transient, typed form of one resource. Object
//! implementations encode their fields into it on read and decode it on
//! write. The `as_*` accessors accept the plain-text forms the protocol layer
//! hands over for text/plain payloads and report [`Error::TypeMismatch`]
//! for anything else.

use std::fmt;

use crate::error::{Error, Result};

/// Tagged value of a single resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(Vec<u8>),
    Opaque(Vec<u8>),
    ObjectLink { object: u16, instance: u16 },
}

impl ResourceValue {
    /// Build a string value.
    pub fn string(text: impl Into<String>) -> Self {
        Self::String(text.into().into_bytes())
    }

    /// Build an opaque value.
    pub fn opaque(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Opaque(bytes.into())
    }

    /// Short type name, for logs.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
            Self::Opaque(_) => "opaque",
            Self::ObjectLink { .. } => "objlnk",
        }
    }

    /// Decode as integer.
    pub fn as_integer(&self, resource: u16) -> Result<i64> {
        match self {
            Self::Integer(v) => Ok(*v),
            Self::String(text) => parse_text(text, resource),
            _ => Err(Error::TypeMismatch { resource }),
        }
    }

    /// Decode as float. Integers are widened.
    pub fn as_float(&self, resource: u16) -> Result<f64> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Integer(v) => Ok(*v as f64),
            Self::String(text) => parse_text(text, resource),
            _ => Err(Error::TypeMismatch { resource }),
        }
    }

    /// Decode as boolean. Accepts 0/1 integers and their text forms.
    pub fn as_bool(&self, resource: u16) -> Result<bool> {
        match self {
            Self::Boolean(v) => Ok(*v),
            Self::Integer(0) => Ok(false),
            Self::Integer(1) => Ok(true),
            Self::String(text) => match text.as_slice() {
                b"0" | b"false" => Ok(false),
                b"1" | b"true" => Ok(true),
                _ => Err(Error::TypeMismatch { resource }),
            },
            _ => Err(Error::TypeMismatch { resource }),
        }
    }

    /// Raw bytes of a string or opaque value.
    pub fn as_bytes(&self, resource: u16) -> Result<&[u8]> {
        match self {
            Self::String(bytes) | Self::Opaque(bytes) => Ok(bytes),
            _ => Err(Error::TypeMismatch { resource }),
        }
    }

    /// UTF-8 text of a string or opaque value.
    pub fn as_text(&self, resource: u16) -> Result<&str> {
        let bytes = self.as_bytes(resource)?;
        std::str::from_utf8(bytes).map_err(|_| Error::TypeMismatch { resource })
    }

    /// Decode an object link.
    pub fn as_object_link(&self, resource: u16) -> Result<(u16, u16)> {
        match self {
            Self::ObjectLink { object, instance } => Ok((*object, *instance)),
            _ => Err(Error::TypeMismatch { resource }),
        }
    }
}

fn parse_text<T: std::str::FromStr>(text: &[u8], resource: u16) -> Result<T> {
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or(Error::TypeMismatch { resource })
}

/// A resource ID paired with its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: u16,
    pub value: ResourceValue,
}

impl Resource {
    pub fn new(id: u16, value: ResourceValue) -> Self {
        Self { id, value }
    }
}

/// Object/instance/resource path, e.g. `/3303/0/5700`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePath {
    pub object: u16,
    pub instance: Option<u16>,
    pub resource: Option<u16>,
}

impl ResourcePath {
    pub const fn object(object: u16) -> Self {
        Self {
            object,
            instance: None,
            resource: None,
        }
    }

    pub const fn instance(object: u16, instance: u16) -> Self {
        Self {
            object,
            instance: Some(instance),
            resource: None,
        }
    }

    pub const fn resource(object: u16, instance: u16, resource: u16) -> Self {
        Self {
            object,
            instance: Some(instance),
            resource: Some(resource),
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.object)?;
        if let Some(instance) = self.instance {
            write!(f, "/{}", instance)?;
            if let Some(resource) = self.resource {
                write!(f, "/{}", resource)?;
            }
        }
        Ok(())
    }
}
