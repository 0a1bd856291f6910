//! Wanted probes and the notifications delivered for them.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::engine::marks::MarkKey;
use crate::healthcheck::{HealthcheckMode, Status};
use crate::ipvs::IpProto;

/// Identifies one (vserver service, backend, mode) probe request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckKey {
    pub vserver_ip: IpAddr,
    pub service_port: u16,
    pub service_protocol: IpProto,
    pub backend_ip: IpAddr,
    pub mode: HealthcheckMode,
    pub name: String,
}

impl CheckKey {
    /// Strips the fields that do not change how the probe runs.
    ///
    /// The name never matters. The vserver address, port and protocol only
    /// matter for DSR/TUN, where the probe targets the VIP.
    pub fn dedup(&self) -> CheckKey {
        let mut key = self.clone();
        key.name.clear();
        if key.mode.is_plain() {
            // One placeholder for both families.
            key.vserver_ip = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
            key.service_port = 0;
            key.service_protocol = IpProto::Any;
        }
        key
    }

    /// The mark binding this probe needs, if it is routed through IPVS.
    pub fn mark_key(&self) -> Option<MarkKey> {
        if self.mode.is_plain() {
            return None;
        }
        Some(MarkKey {
            backend: self.backend_ip,
            mode: self.mode,
        })
    }
}

impl fmt::Display for CheckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{}/{} backend {} ({})",
            self.name,
            self.vserver_ip,
            self.service_port,
            self.service_protocol,
            self.backend_ip,
            self.mode
        )
    }
}

/// Probe protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthcheckType {
    Dns,
    Http,
    Https,
    Icmp,
    Radius,
    Tcp,
    TcpTls,
    Udp,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for HealthcheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthcheckType::Dns => "DNS",
            HealthcheckType::Http => "HTTP",
            HealthcheckType::Https => "HTTPS",
            HealthcheckType::Icmp => "ICMP",
            HealthcheckType::Radius => "RADIUS",
            HealthcheckType::Tcp => "TCP",
            HealthcheckType::TcpTls => "TCP/TLS",
            HealthcheckType::Udp => "UDP",
            HealthcheckType::Unknown => "unknown",
        })
    }
}

/// Probe specification as it appears in vserver configuration.
///
/// Part of the dedup key: two requests for the same backend with different
/// specifications are different probes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Healthcheck {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: HealthcheckType,

    /// Port probed on the target (ignored for ICMP).
    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub mode: HealthcheckMode,

    /// Request payload. For DNS the query name, for RADIUS
    /// `username:password:secret`.
    #[serde(default)]
    pub send: String,

    /// Expected response payload.
    #[serde(default)]
    pub receive: String,

    /// Expected HTTP status code (0 = checker default).
    #[serde(default)]
    pub code: u16,

    /// HTTP method, or DNS query type.
    #[serde(default)]
    pub method: String,

    /// Send HTTP requests in proxy form.
    #[serde(default)]
    pub proxy: bool,

    #[serde(default)]
    pub tls_verify: bool,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_retries() -> u32 {
    1
}

impl Healthcheck {
    /// A specification with default scheduling.
    pub fn new(name: impl Into<String>, kind: HealthcheckType, port: u16) -> Self {
        Self {
            name: name.into(),
            kind,
            port,
            mode: HealthcheckMode::Plain,
            send: String::new(),
            receive: String::new(),
            code: 0,
            method: String::new(),
            proxy: false,
            tls_verify: false,
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The specification without its name, which is already carried by
    /// the check's key.
    pub fn dedup(&self) -> Healthcheck {
        Healthcheck {
            name: String::new(),
            ..self.clone()
        }
    }
}

/// Status delivered to a vserver for one of its checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckNotification {
    pub key: CheckKey,
    pub description: String,
    pub status: Status,
}

impl fmt::Display for CheckNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.status.state)
    }
}

/// Consumer of check notifications, normally a vserver state machine.
pub trait CheckNotifier: Send + Sync + fmt::Debug {
    fn queue_check_notification(&self, note: CheckNotification);
}

impl CheckNotifier for mpsc::UnboundedSender<CheckNotification> {
    fn queue_check_notification(&self, note: CheckNotification) {
        if let Err(e) = self.send(note) {
            tracing::debug!(key = %e.0.key, "Check notification receiver closed");
        }
    }
}

impl CheckNotifier for mpsc::Sender<CheckNotification> {
    fn queue_check_notification(&self, note: CheckNotification) {
        match self.try_send(note) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(note)) => {
                tracing::warn!(key = %note.key, "Check notification queue full, dropping notification");
            }
            Err(mpsc::error::TrySendError::Closed(note)) => {
                tracing::debug!(key = %note.key, "Check notification receiver closed");
            }
        }
    }
}

/// One vserver's request for a probe of one backend.
#[derive(Debug, Clone)]
pub struct Check {
    pub key: CheckKey,
    pub healthcheck: Healthcheck,
    pub notifier: Arc<dyn CheckNotifier>,
}

impl Check {
    pub fn new(key: CheckKey, healthcheck: Healthcheck, notifier: Arc<dyn CheckNotifier>) -> Self {
        Self {
            key,
            healthcheck,
            notifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(vip: &str, port: u16, mode: HealthcheckMode, name: &str) -> CheckKey {
        CheckKey {
            vserver_ip: vip.parse().unwrap(),
            service_port: port,
            service_protocol: IpProto::Tcp,
            backend_ip: "10.0.0.2".parse().unwrap(),
            mode,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_dedup_plain_ignores_service_fields() {
        let a = key("192.0.2.1", 80, HealthcheckMode::Plain, "web-a");
        let b = key("192.0.2.9", 443, HealthcheckMode::Plain, "web-b");
        assert_ne!(a, b);
        assert_eq!(a.dedup(), b.dedup());
        assert_eq!(a.dedup().service_protocol, IpProto::Any);
    }

    #[test]
    fn test_dedup_plain_ignores_vip_family() {
        let v4 = key("192.0.2.1", 80, HealthcheckMode::Plain, "v4");
        let v6 = key("2001:db8::1", 80, HealthcheckMode::Plain, "v6");
        assert_eq!(v4.dedup(), v6.dedup());
        assert_eq!(v6.dedup().vserver_ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_dedup_dsr_keeps_service_fields() {
        let a = key("192.0.2.1", 80, HealthcheckMode::Dsr, "web-a");
        let b = key("192.0.2.9", 80, HealthcheckMode::Dsr, "web-a");
        let c = key("192.0.2.1", 80, HealthcheckMode::Dsr, "web-c");
        assert_ne!(a.dedup(), b.dedup());
        assert_eq!(a.dedup(), c.dedup());
    }

    #[test]
    fn test_healthcheck_dedup_ignores_name() {
        let http = Healthcheck::new("http", HealthcheckType::Tcp, 80);
        let web = Healthcheck::new("web", HealthcheckType::Tcp, 80);
        assert_ne!(http, web);
        assert_eq!(http.dedup(), web.dedup());

        let mut slow = web.clone();
        slow.interval_ms = 60_000;
        assert_ne!(http.dedup(), slow.dedup());
    }

    #[test]
    fn test_mark_key_only_for_routed_modes() {
        assert!(key("192.0.2.1", 80, HealthcheckMode::Plain, "p").mark_key().is_none());

        let tun = key("192.0.2.1", 80, HealthcheckMode::Tun, "t").mark_key().unwrap();
        assert_eq!(tun.backend, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(tun.mode, HealthcheckMode::Tun);
    }

    #[test]
    fn test_healthcheck_deserialize_defaults() {
        let hc: Healthcheck = toml::from_str(
            r#"
            name = "web"
            type = "https"
            port = 443
            "#,
        )
        .unwrap();
        assert_eq!(hc.kind, HealthcheckType::Https);
        assert_eq!(hc.mode, HealthcheckMode::Plain);
        assert_eq!(hc.interval(), Duration::from_secs(10));
        assert_eq!(hc.timeout(), Duration::from_secs(5));
        assert_eq!(hc.retries, 1);
        assert_eq!(hc, Healthcheck::new("web", HealthcheckType::Https, 443));

        let unknown: Healthcheck = toml::from_str("name = \"x\"\ntype = \"gopher\"").unwrap();
        assert_eq!(unknown.kind, HealthcheckType::Unknown);
    }
}
