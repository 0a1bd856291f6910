//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::engine::check::{CheckKey, Healthcheck};
use crate::ipvs::IpProto;

/// First firewall mark used for DSR/TUN healthchecks.
pub const DSR_MARK_BASE: u32 = 1 << 16;

/// Number of marks available for DSR/TUN healthchecks.
pub const DSR_MARK_SIZE: u32 = 16_000;

/// Root configuration for the healthcheck engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Healthcheck manager settings.
    pub coordinator: CoordinatorConfig,

    /// Virtual services and the checks they want.
    pub vservers: Vec<VserverConfig>,
}

/// Healthcheck manager configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Whether configs and notifications flow at startup.
    pub enabled: bool,

    /// First firewall mark handed out.
    pub mark_base: u32,

    /// Number of firewall marks available.
    pub mark_size: u32,

    /// Pending vserver updates before submitters block.
    pub queue_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mark_base: DSR_MARK_BASE,
            mark_size: DSR_MARK_SIZE,
            queue_size: 1000,
        }
    }
}

/// A virtual service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VserverConfig {
    /// Unique vserver name.
    pub name: String,

    /// Virtual IP.
    pub address: IpAddr,

    /// Service port on the VIP.
    #[serde(default)]
    pub port: u16,

    /// Service protocol on the VIP.
    #[serde(default = "default_protocol")]
    pub protocol: IpProto,

    /// Backend addresses.
    #[serde(default)]
    pub backends: Vec<IpAddr>,

    /// Checks run against every backend.
    #[serde(default)]
    pub healthchecks: Vec<Healthcheck>,
}

fn default_protocol() -> IpProto {
    IpProto::Tcp
}

impl VserverConfig {
    /// One check per (backend, healthcheck) pair.
    pub fn check_keys(&self) -> Vec<(CheckKey, Healthcheck)> {
        self.backends
            .iter()
            .flat_map(|backend| {
                self.healthchecks.iter().map(move |hc| {
                    let key = CheckKey {
                        vserver_ip: self.address,
                        service_port: self.port,
                        service_protocol: self.protocol,
                        backend_ip: *backend,
                        mode: hc.mode,
                        name: format!("{}/{}/{}", self.name, backend, hc.name),
                    };
                    (key, hc.clone())
                })
            })
            .collect()
    }
}

impl Default for VserverConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            protocol: default_protocol(),
            backends: Vec::new(),
            healthchecks: Vec::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::check::HealthcheckType;
    use crate::healthcheck::HealthcheckMode;

    #[test]
    fn test_check_keys_cross_product() {
        let mut web = Healthcheck::new("http", HealthcheckType::Http, 80);
        web.mode = HealthcheckMode::Dsr;
        let vserver = VserverConfig {
            name: "web".into(),
            address: "192.0.2.1".parse().unwrap(),
            port: 80,
            backends: vec!["10.0.0.2".parse().unwrap(), "10.0.0.3".parse().unwrap()],
            healthchecks: vec![web, Healthcheck::new("ping", HealthcheckType::Icmp, 0)],
            ..VserverConfig::default()
        };

        let keys = vserver.check_keys();
        assert_eq!(keys.len(), 4);

        let (key, hc) = &keys[0];
        assert_eq!(key.name, "web/10.0.0.2/http");
        assert_eq!(key.mode, HealthcheckMode::Dsr);
        assert_eq!(key.service_port, 80);
        assert_eq!(key.service_protocol, IpProto::Tcp);
        assert_eq!(hc.kind, HealthcheckType::Http);

        assert_eq!(keys[1].0.mode, HealthcheckMode::Plain);
        assert_eq!(keys[3].0.name, "web/10.0.0.3/ping");
    }
}
