// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server URI parsing (`coap://` and `coaps://`).
//!
//! IPv6 zone identifiers (`[fe80::1%eth0]` or the RFC 6874 form
//! `[fe80::1%25eth0]`) are split off before the URI is handed to `url`,
//! which does not accept them.

use std::net::IpAddr;

use url::{Host, Url};

use crate::error::{Error, Result};

/// Host part of a server URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerHost {
    Ip(IpAddr),
    Name(String),
}

/// A parsed server URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUri {
    pub secure: bool,
    pub host: ServerHost,
    pub port: Option<u16>,
    /// Interface name or index given as IPv6 zone.
    pub zone: Option<String>,
}

impl ServerUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let (stripped, zone) = split_zone(uri)?;
        let url = Url::parse(&stripped).map_err(|e| Error::UriInvalid(format!("{}: {}", uri, e)))?;

        let secure = match url.scheme() {
            "coap" => false,
            "coaps" => true,
            other => return Err(Error::UriInvalid(format!("unsupported scheme {:?}", other))),
        };

        let host = match url.host() {
            Some(Host::Ipv4(ip)) => ServerHost::Ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => ServerHost::Ip(IpAddr::V6(ip)),
            Some(Host::Domain(name)) if !name.is_empty() => match name.parse::<IpAddr>() {
                Ok(ip) => ServerHost::Ip(ip),
                Err(_) => ServerHost::Name(name.to_string()),
            },
            _ => return Err(Error::UriInvalid(format!("{}: missing host", uri))),
        };

        if zone.is_some() && !matches!(host, ServerHost::Ip(IpAddr::V6(_))) {
            return Err(Error::UriInvalid(format!("{}: zone on non-IPv6 host", uri)));
        }

        Ok(Self {
            secure,
            host,
            port: url.port(),
            zone,
        })
    }
}

fn split_zone(uri: &str) -> Result<(String, Option<String>)> {
    let (Some(open), Some(close)) = (uri.find('['), uri.find(']')) else {
        return Ok((uri.to_string(), None));
    };
    if close < open {
        return Err(Error::UriInvalid(format!("{}: malformed IPv6 literal", uri)));
    }

    let literal = &uri[open + 1..close];
    let Some(pct) = literal.find('%') else {
        return Ok((uri.to_string(), None));
    };

    let raw_zone = &literal[pct + 1..];
    let zone = raw_zone.strip_prefix("25").unwrap_or(raw_zone);
    if zone.is_empty() {
        return Err(Error::UriInvalid(format!("{}: empty zone", uri)));
    }

    let stripped = format!("{}{}", &uri[..open + 1 + pct], &uri[close..]);
    Ok((stripped, Some(zone.to_string())))
}
