// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the LwM2M client runtime
//!
//! Every operation returns a stable [`Error`] value. The protocol layer above
//! this crate turns it into a CoAP response with [`Error::response_code`].

use std::fmt;
use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::credential::StoreError;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// CoAP response codes produced by the object layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// 2.01
    Created,
    /// 2.02
    Deleted,
    /// 2.04
    Changed,
    /// 2.05
    Content,
    /// 4.00
    BadRequest,
    /// 4.04
    NotFound,
    /// 4.05
    MethodNotAllowed,
    /// 5.00
    InternalServerError,
    /// 5.01
    NotImplemented,
    /// 5.03
    ServiceUnavailable,
}

impl ResponseCode {
    /// Code class (the digit before the dot).
    pub const fn class(self) -> u8 {
        match self {
            Self::Created | Self::Deleted | Self::Changed | Self::Content => 2,
            Self::BadRequest | Self::NotFound | Self::MethodNotAllowed => 4,
            Self::InternalServerError | Self::NotImplemented | Self::ServiceUnavailable => 5,
        }
    }

    /// Code detail (the two digits after the dot).
    pub const fn detail(self) -> u8 {
        match self {
            Self::Created => 1,
            Self::Deleted => 2,
            Self::Changed => 4,
            Self::Content => 5,
            Self::BadRequest => 0,
            Self::NotFound => 4,
            Self::MethodNotAllowed => 5,
            Self::InternalServerError => 0,
            Self::NotImplemented => 1,
            Self::ServiceUnavailable => 3,
        }
    }

    /// Single-byte wire encoding (`class << 5 | detail`).
    pub const fn as_u8(self) -> u8 {
        (self.class() << 5) | self.detail()
    }

    /// True for 2.xx codes.
    pub const fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

/// Errors returned by the object, connection and credential layers.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Capacity errors
    // ========================================================================
    /// The instance pool of `object` has no free slot left.
    #[error("no free instance left for object {object}")]
    NoCapacity { object: u16 },

    /// The requested instance ID is already used.
    #[error("instance ID {0} already in use")]
    IdInUse(u16),

    /// The requested instance ID is the reserved sentinel.
    #[error("instance ID {0} is too large")]
    IdTooLarge(u16),

    // ========================================================================
    // Not-found errors
    // ========================================================================
    /// Unknown object ID.
    #[error("object {0} not found")]
    ObjectNotFound(u16),

    /// No used instance with that ID.
    #[error("instance /{object}/{instance} not found")]
    InstanceNotFound { object: u16, instance: u16 },

    /// Resource not defined (or not implemented) for the object.
    #[error("resource {resource} not found")]
    ResourceNotFound { resource: u16 },

    // ========================================================================
    // Validation errors
    // ========================================================================
    /// Value has the wrong type for the resource.
    #[error("type mismatch for resource {resource}")]
    TypeMismatch { resource: u16 },

    /// Value is outside the range allowed for the resource.
    #[error("value out of range for resource {resource}")]
    OutOfRange { resource: u16 },

    /// Malformed request or arguments.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Operation not allowed on that resource or object.
    #[error("method not allowed on resource {resource}")]
    MethodNotAllowed { resource: u16 },

    /// Create or delete requested on an object the server may not manage.
    #[error("operation not allowed on object {object}")]
    OperationNotAllowed { object: u16 },

    /// Feature not supported by this client.
    #[error("unsupported: {0}")]
    Unsupported(String),

    // ========================================================================
    // Transport / security errors
    // ========================================================================
    /// Server URI could not be parsed or has no host.
    #[error("invalid server URI: {0}")]
    UriInvalid(String),

    /// Destination address is not usable.
    #[error("invalid address: {0}")]
    AddressInvalid(String),

    /// Link-local destination without an unambiguous interface.
    #[error("cannot determine network interface for link-local address")]
    InterfaceUnresolvable,

    /// DTLS session setup or handshake failed.
    #[error("DTLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// Credential store rejected the operation.
    #[error("credential store failure: {0}")]
    StoreFailure(#[from] StoreError),

    /// No connection for the given handle.
    #[error("connection not found")]
    ConnectionNotFound,

    /// Socket level failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    // ========================================================================
    // Other
    // ========================================================================
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Broken internal invariant. Never expected in a correct build.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// CoAP response code the protocol layer should answer with.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Error::IdInUse(_)
            | Error::IdTooLarge(_)
            | Error::TypeMismatch { .. }
            | Error::OutOfRange { .. }
            | Error::BadRequest(_) => ResponseCode::BadRequest,
            Error::ObjectNotFound(_)
            | Error::InstanceNotFound { .. }
            | Error::ResourceNotFound { .. } => ResponseCode::NotFound,
            Error::MethodNotAllowed { .. } | Error::OperationNotAllowed { .. } => {
                ResponseCode::MethodNotAllowed
            }
            Error::Unsupported(_) => ResponseCode::NotImplemented,
            Error::UriInvalid(_)
            | Error::AddressInvalid(_)
            | Error::InterfaceUnresolvable
            | Error::HandshakeFailed(_)
            | Error::ConnectionNotFound
            | Error::Transport(_) => ResponseCode::ServiceUnavailable,
            Error::NoCapacity { .. }
            | Error::StoreFailure(_)
            | Error::Config(_)
            | Error::Internal(_) => ResponseCode::InternalServerError,
        }
    }

    /// True for errors caused by the request content rather than device state.
    pub fn is_client_error(&self) -> bool {
        self.response_code().class() == 4
    }
}
