//! Protocol-specific checker configurations.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::healthcheck::types::HealthcheckMode;
use crate::ipvs::IpProto;

/// Where and how a checker sends its probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Probe destination: the backend for plain mode, the VIP otherwise.
    pub ip: IpAddr,
    /// The backend being checked.
    pub host: IpAddr,
    pub port: u16,
    pub proto: IpProto,
    /// Firewall mark applied to probe packets (0 for plain mode).
    pub mark: u32,
    pub mode: HealthcheckMode,
}

impl Target {
    fn new(ip: IpAddr, port: u16, proto: IpProto) -> Self {
        Self {
            ip,
            host: ip,
            port,
            proto,
            mark: 0,
            mode: HealthcheckMode::Plain,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 0 {
            write!(f, "{}", self.ip)?;
        } else {
            write!(f, "{}", SocketAddr::new(self.ip, self.port))?;
        }
        if !self.mode.is_plain() {
            write!(f, " ({} to {}, mark {})", self.mode, self.host, self.mark)?;
        }
        Ok(())
    }
}

/// DNS record type queried by a DNS checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsType {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Ptr,
    Soa,
    Txt,
}

impl FromStr for DnsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(DnsType::A),
            "AAAA" => Ok(DnsType::Aaaa),
            "CNAME" => Ok(DnsType::Cname),
            "MX" => Ok(DnsType::Mx),
            "NS" => Ok(DnsType::Ns),
            "PTR" => Ok(DnsType::Ptr),
            "SOA" => Ok(DnsType::Soa),
            "TXT" => Ok(DnsType::Txt),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for DnsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DnsType::A => "A",
            DnsType::Aaaa => "AAAA",
            DnsType::Cname => "CNAME",
            DnsType::Mx => "MX",
            DnsType::Ns => "NS",
            DnsType::Ptr => "PTR",
            DnsType::Soa => "SOA",
            DnsType::Txt => "TXT",
        })
    }
}

/// Resolves a query and compares the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsChecker {
    pub target: Target,
    pub query: String,
    pub qtype: DnsType,
    pub answer: String,
}

impl DnsChecker {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            target: Target::new(ip, port, IpProto::Udp),
            query: String::new(),
            qtype: DnsType::A,
            answer: String::new(),
        }
    }
}

/// Issues an HTTP(S) request and checks the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpChecker {
    pub target: Target,
    pub method: String,
    pub proxy: bool,
    pub request: String,
    pub response: String,
    pub response_code: u16,
    pub secure: bool,
    pub tls_verify: bool,
}

impl HttpChecker {
    pub const DEFAULT_METHOD: &'static str = "GET";
    pub const DEFAULT_REQUEST: &'static str = "/";
    pub const DEFAULT_RESPONSE_CODE: u16 = 200;

    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            target: Target::new(ip, port, IpProto::Tcp),
            method: Self::DEFAULT_METHOD.to_string(),
            proxy: false,
            request: Self::DEFAULT_REQUEST.to_string(),
            response: String::new(),
            response_code: Self::DEFAULT_RESPONSE_CODE,
            secure: false,
            tls_verify: true,
        }
    }
}

/// ICMP echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingChecker {
    pub target: Target,
}

impl PingChecker {
    pub fn new(ip: IpAddr) -> Self {
        let proto = if ip.is_ipv4() {
            IpProto::Icmp
        } else {
            IpProto::Icmpv6
        };
        Self {
            target: Target::new(ip, 0, proto),
        }
    }
}

/// RADIUS Access-Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadiusChecker {
    pub target: Target,
    pub username: String,
    pub password: String,
    pub secret: String,
    pub response: String,
}

impl RadiusChecker {
    pub const DEFAULT_RESPONSE: &'static str = "accept";

    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            target: Target::new(ip, port, IpProto::Udp),
            username: String::new(),
            password: String::new(),
            secret: String::new(),
            response: Self::DEFAULT_RESPONSE.to_string(),
        }
    }
}

/// TCP connect, optionally over TLS, with optional send/expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpChecker {
    pub target: Target,
    pub send: String,
    pub receive: String,
    pub secure: bool,
    pub tls_verify: bool,
}

impl TcpChecker {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            target: Target::new(ip, port, IpProto::Tcp),
            send: String::new(),
            receive: String::new(),
            secure: false,
            tls_verify: true,
        }
    }
}

/// UDP send/expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpChecker {
    pub target: Target,
    pub send: String,
    pub receive: String,
}

impl UdpChecker {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            target: Target::new(ip, port, IpProto::Udp),
            send: String::new(),
            receive: String::new(),
        }
    }
}

/// A configured probe of one protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checker {
    Dns(DnsChecker),
    Http(HttpChecker),
    Ping(PingChecker),
    Radius(RadiusChecker),
    Tcp(TcpChecker),
    Udp(UdpChecker),
}

impl Checker {
    pub fn target(&self) -> &Target {
        match self {
            Checker::Dns(c) => &c.target,
            Checker::Http(c) => &c.target,
            Checker::Ping(c) => &c.target,
            Checker::Radius(c) => &c.target,
            Checker::Tcp(c) => &c.target,
            Checker::Udp(c) => &c.target,
        }
    }

    pub fn target_mut(&mut self) -> &mut Target {
        match self {
            Checker::Dns(c) => &mut c.target,
            Checker::Http(c) => &mut c.target,
            Checker::Ping(c) => &mut c.target,
            Checker::Radius(c) => &mut c.target,
            Checker::Tcp(c) => &mut c.target,
            Checker::Udp(c) => &mut c.target,
        }
    }
}

impl fmt::Display for Checker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checker::Dns(c) => write!(f, "DNS {} query for {:?} {}", c.qtype, c.query, c.target),
            Checker::Http(c) => {
                let scheme = if c.secure { "HTTPS" } else { "HTTP" };
                write!(
                    f,
                    "{} {} {} expecting {} {}",
                    scheme, c.method, c.request, c.response_code, c.target
                )
            }
            Checker::Ping(c) => write!(f, "ICMP ping {}", c.target),
            Checker::Radius(c) => write!(f, "RADIUS auth as {:?} {}", c.username, c.target),
            Checker::Tcp(c) if c.secure => write!(f, "TCP/TLS {}", c.target),
            Checker::Tcp(c) => write!(f, "TCP {}", c.target),
            Checker::Udp(c) => write!(f, "UDP {}", c.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_type_parse() {
        assert_eq!("aaaa".parse::<DnsType>(), Ok(DnsType::Aaaa));
        assert_eq!("Cname".parse::<DnsType>(), Ok(DnsType::Cname));
        assert!("".parse::<DnsType>().is_err());
        assert!("AXFR".parse::<DnsType>().is_err());
    }

    #[test]
    fn test_ping_protocol_follows_family() {
        let v4 = PingChecker::new("192.0.2.1".parse().unwrap());
        let v6 = PingChecker::new("2001:db8::1".parse().unwrap());
        assert_eq!(v4.target.proto, IpProto::Icmp);
        assert_eq!(v6.target.proto, IpProto::Icmpv6);
    }

    #[test]
    fn test_description() {
        let mut http = HttpChecker::new("10.0.0.2".parse().unwrap(), 80);
        assert_eq!(
            Checker::Http(http.clone()).to_string(),
            "HTTP GET / expecting 200 10.0.0.2:80"
        );

        http.target.ip = "192.0.2.1".parse().unwrap();
        http.target.mode = HealthcheckMode::Dsr;
        http.target.mark = 65536;
        assert_eq!(
            Checker::Http(http).to_string(),
            "HTTP GET / expecting 200 192.0.2.1:80 (DSR to 10.0.0.2, mark 65536)"
        );
    }
}
