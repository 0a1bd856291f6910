//! Kernel forwarding-table interface.
//!
//! # Data Flow
//! ```text
//! engine::manager marks a backend for DSR/TUN probing
//!     → Service { fwmark, one Destination } built from the mark key
//!     → ForwardingTable::add_service
//!
//! Last DSR/TUN probe for the backend removed (or shutdown)
//!     → ForwardingTable::delete_service
//!     → mark returned to the allocator
//! ```
//!
//! # Design Decisions
//! - The table is a trait so the kernel backend can be swapped out
//! - Any error from the table is fatal to the caller
//! - `LoggingForwardingTable` keeps an in-memory view for hosts without IPVS

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// IP protocol of a service or probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpProto {
    /// Wildcard protocol (0), used by firewall-mark services.
    #[default]
    Any,
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
}

impl IpProto {
    /// IANA protocol number.
    pub fn number(self) -> u8 {
        match self {
            IpProto::Any => 0,
            IpProto::Icmp => 1,
            IpProto::Tcp => 6,
            IpProto::Udp => 17,
            IpProto::Icmpv6 => 58,
        }
    }
}

impl fmt::Display for IpProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IpProto::Any => "any",
            IpProto::Tcp => "TCP",
            IpProto::Udp => "UDP",
            IpProto::Icmp => "ICMP",
            IpProto::Icmpv6 => "ICMPv6",
        })
    }
}

/// How IPVS forwards packets to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardingMethod {
    /// Direct routing (DSR).
    Route,
    /// IP-in-IP tunnel.
    Tunnel,
}

/// A real server behind a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub address: IpAddr,
    pub port: u16,
    pub weight: u32,
    pub method: ForwardingMethod,
}

/// A virtual service entry in the forwarding table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub address: IpAddr,
    pub protocol: IpProto,
    pub port: u16,
    pub scheduler: String,
    pub firewall_mark: u32,
    pub destinations: Vec<Destination>,
}

impl Service {
    /// A firewall-mark service forwarding everything carrying `mark` to
    /// `backend`.
    pub fn for_mark(mark: u32, backend: IpAddr, method: ForwardingMethod) -> Self {
        let address = match backend {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        Self {
            address,
            protocol: IpProto::Any,
            port: 0,
            scheduler: "rr".to_string(),
            firewall_mark: mark,
            destinations: vec![Destination {
                address: backend,
                port: 0,
                weight: 1,
                method,
            }],
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FWM {} ({})", self.firewall_mark, self.scheduler)?;
        for dst in &self.destinations {
            write!(f, " -> {} {:?} w{}", dst.address, dst.method, dst.weight)?;
        }
        Ok(())
    }
}

/// Errors returned by a forwarding table.
#[derive(Debug, Error)]
pub enum ForwardingError {
    #[error("service with firewall mark {0} already exists")]
    AlreadyExists(u32),

    #[error("no service with firewall mark {0}")]
    NotFound(u32),

    #[error("forwarding table unavailable: {0}")]
    Unavailable(String),
}

/// The kernel load-balancing table.
pub trait ForwardingTable: Send + Sync {
    fn add_service(&self, service: &Service) -> Result<(), ForwardingError>;

    fn delete_service(&self, service: &Service) -> Result<(), ForwardingError>;
}

/// In-memory forwarding table that logs every change.
#[derive(Debug, Default)]
pub struct LoggingForwardingTable {
    services: Mutex<HashMap<u32, Service>>,
}

impl LoggingForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Services currently installed, ordered by firewall mark.
    pub fn services(&self) -> Vec<Service> {
        let services = self.services.lock().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<Service> = services.values().cloned().collect();
        list.sort_by_key(|s| s.firewall_mark);
        list
    }
}

impl ForwardingTable for LoggingForwardingTable {
    fn add_service(&self, service: &Service) -> Result<(), ForwardingError> {
        let mut services = self.services.lock().unwrap_or_else(|e| e.into_inner());
        if services.contains_key(&service.firewall_mark) {
            return Err(ForwardingError::AlreadyExists(service.firewall_mark));
        }
        tracing::info!(service = %service, "IPVS service added");
        services.insert(service.firewall_mark, service.clone());
        Ok(())
    }

    fn delete_service(&self, service: &Service) -> Result<(), ForwardingError> {
        let mut services = self.services.lock().unwrap_or_else(|e| e.into_inner());
        if services.remove(&service.firewall_mark).is_none() {
            return Err(ForwardingError::NotFound(service.firewall_mark));
        }
        tracing::info!(service = %service, "IPVS service removed");
        Ok(())
    }
}
