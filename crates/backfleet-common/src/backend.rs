//! Backend Types
//!
//! This module defines the identity records for synthetic backends and the
//! traffic types they are partitioned by.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FleetError;

/// How a backend's traffic is terminated and routed by the proxy in front of it.
///
/// The derived ordering is the enumeration order used for every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficType {
    /// TLS terminated at the proxy, plain HTTP to the backend
    Edge,
    /// Plain HTTP end to end
    Http,
    /// TLS passed through untouched to the backend
    Passthrough,
    /// TLS terminated at the proxy and re-established to the backend
    Reencrypt,
}

impl TrafficType {
    /// Every traffic type, in enumeration order.
    pub const ALL: [TrafficType; 4] = [
        TrafficType::Edge,
        TrafficType::Http,
        TrafficType::Passthrough,
        TrafficType::Reencrypt,
    ];

    /// Wire label, also used in backend names and URL paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficType::Edge => "edge",
            TrafficType::Http => "http",
            TrafficType::Passthrough => "passthrough",
            TrafficType::Reencrypt => "reencrypt",
        }
    }

    /// URL scheme a client uses to reach a backend of this type through the proxy.
    pub fn scheme(&self) -> &'static str {
        match self {
            TrafficType::Http => "http",
            TrafficType::Edge | TrafficType::Passthrough | TrafficType::Reencrypt => "https",
        }
    }

    /// Whether the proxy terminates TLS for this traffic type.
    pub fn terminates_tls(&self) -> bool {
        matches!(self, TrafficType::Edge | TrafficType::Reencrypt)
    }
}

impl fmt::Display for TrafficType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficType {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrafficType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FleetError::UnknownTrafficType(s.to_string()))
    }
}

/// A synthetic backend's identity, known before its port is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    pub host_addr: String,
    pub name: String,
    pub traffic_type: TrafficType,
}

impl Backend {
    pub fn new(host_addr: impl Into<String>, name: impl Into<String>, traffic_type: TrafficType) -> Self {
        Self {
            host_addr: host_addr.into(),
            name: name.into(),
            traffic_type,
        }
    }

    /// Pairs this backend with the port its worker bound.
    pub fn bind(&self, port: u16) -> BoundBackend {
        BoundBackend {
            host_addr: self.host_addr.clone(),
            name: self.name.clone(),
            traffic_type: self.traffic_type,
            port,
        }
    }
}

/// A backend together with the port its worker is listening on.
///
/// This is also the body of a registration request. Unknown fields are
/// rejected so a worker built against a different schema fails loudly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundBackend {
    pub host_addr: String,
    pub name: String,
    pub traffic_type: TrafficType,
    pub port: u16,
}

impl BoundBackend {
    /// Identity without the port.
    pub fn backend(&self) -> Backend {
        Backend::new(self.host_addr.clone(), self.name.clone(), self.traffic_type)
    }

    /// URL of the 1 KiB test page served by this backend.
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}/1024.html",
            self.traffic_type.scheme(),
            self.host_addr,
            self.port
        )
    }
}

/// Formats the line used by the plain-text listing: `host_addr name port traffic_type`.
impl fmt::Display for BoundBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.host_addr, self.name, self.port, self.traffic_type)
    }
}

impl FromStr for BoundBackend {
    type Err = FleetError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [host_addr, name, port, traffic_type] = fields.as_slice() else {
            return Err(FleetError::InvalidListing(line.to_string()));
        };

        let port = port
            .parse::<u16>()
            .map_err(|_| FleetError::InvalidListing(line.to_string()))?;

        Ok(BoundBackend {
            host_addr: host_addr.to_string(),
            name: name.to_string(),
            traffic_type: traffic_type.parse()?,
            port,
        })
    }
}
