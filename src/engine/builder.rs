//! Translation of probe specifications into checker configurations.

use crate::engine::check::{CheckKey, Healthcheck, HealthcheckType};
use crate::engine::error::BuildError;
use crate::healthcheck::{
    Checker, Config, DnsChecker, DnsType, HttpChecker, Id, PingChecker, RadiusChecker, TcpChecker,
    UdpChecker,
};

/// Builds the probe configuration for a deduplicated check.
///
/// `mark` must already be bound to the key's backend when the key is in
/// DSR or TUN mode, and is 0 otherwise. In those modes the probe targets
/// the VIP so that it follows the same forwarding path as client traffic.
pub fn build_config(
    id: Id,
    key: &CheckKey,
    hc: &Healthcheck,
    mark: u32,
) -> Result<Config, BuildError> {
    let host = key.backend_ip;
    let ip = if key.mode.is_plain() {
        host
    } else {
        key.vserver_ip
    };
    let port = hc.port;

    let mut checker = match hc.kind {
        HealthcheckType::Dns => {
            let qtype: DnsType = hc.method.parse().map_err(BuildError::UnknownDnsType)?;
            let mut dns = DnsChecker::new(ip, port);
            dns.query = hc.send.clone();
            dns.qtype = qtype;
            dns.answer = hc.receive.clone();
            Checker::Dns(dns)
        }
        HealthcheckType::Http | HealthcheckType::Https => {
            let mut http = HttpChecker::new(ip, port);
            if !hc.send.is_empty() {
                http.request = hc.send.clone();
            }
            if !hc.receive.is_empty() {
                http.response = hc.receive.clone();
            }
            if hc.code != 0 {
                http.response_code = hc.code;
            }
            if !hc.method.is_empty() {
                http.method = hc.method.clone();
            }
            http.proxy = hc.proxy;
            if hc.kind == HealthcheckType::Https {
                http.secure = true;
                http.tls_verify = hc.tls_verify;
            }
            Checker::Http(http)
        }
        HealthcheckType::Icmp => {
            // Echo requests cannot carry a mark towards the VIP.
            if !key.mode.is_plain() {
                return Err(BuildError::IcmpRequiresPlain(key.mode));
            }
            Checker::Ping(PingChecker::new(ip))
        }
        HealthcheckType::Radius => {
            let parts: Vec<&str> = hc.send.split(':').collect();
            let [username, password, secret] = parts.as_slice() else {
                return Err(BuildError::InvalidRadiusSend);
            };
            let mut radius = RadiusChecker::new(ip, port);
            radius.username = username.to_string();
            radius.password = password.to_string();
            radius.secret = secret.to_string();
            if !hc.receive.is_empty() {
                radius.response = hc.receive.clone();
            }
            Checker::Radius(radius)
        }
        HealthcheckType::Tcp | HealthcheckType::TcpTls => {
            let mut tcp = TcpChecker::new(ip, port);
            tcp.send = hc.send.clone();
            tcp.receive = hc.receive.clone();
            if hc.kind == HealthcheckType::TcpTls {
                tcp.secure = true;
                tcp.tls_verify = hc.tls_verify;
            }
            Checker::Tcp(tcp)
        }
        HealthcheckType::Udp => {
            let mut udp = UdpChecker::new(ip, port);
            udp.send = hc.send.clone();
            udp.receive = hc.receive.clone();
            Checker::Udp(udp)
        }
        HealthcheckType::Unknown => return Err(BuildError::UnknownType),
    };

    let target = checker.target_mut();
    target.host = host;
    target.mark = mark;
    target.mode = key.mode;

    let mut config = Config::new(id, checker);
    config.interval = hc.interval();
    config.timeout = hc.timeout();
    config.retries = hc.retries;
    Ok(config)
}
