//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::EngineConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::check::HealthcheckType;
    use crate::healthcheck::HealthcheckMode;
    use crate::ipvs::IpProto;

    const SAMPLE: &str = r#"
        [observability]
        log_level = "debug"

        [coordinator]
        mark_size = 64

        [[vservers]]
        name = "dns"
        address = "192.0.2.53"
        port = 53
        protocol = "udp"
        backends = ["10.0.1.1", "10.0.1.2"]

        [[vservers.healthchecks]]
        name = "resolve"
        type = "dns"
        port = 53
        mode = "tun"
        method = "A"
        send = "www.example.com"
        receive = "192.0.2.80"
        interval_ms = 2000
    "#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.coordinator.mark_base, 1 << 16);
        assert_eq!(config.coordinator.mark_size, 64);
        assert_eq!(config.coordinator.queue_size, 1000);

        let dns = &config.vservers[0];
        assert_eq!(dns.protocol, IpProto::Udp);
        assert_eq!(dns.backends.len(), 2);
        let hc = &dns.healthchecks[0];
        assert_eq!(hc.kind, HealthcheckType::Dns);
        assert_eq!(hc.mode, HealthcheckMode::Tun);
        assert_eq!(hc.interval_ms, 2000);
        assert_eq!(hc.timeout_ms, 5000);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_config("[[vservers]]\nname = \"x\"\naddress = \"not-an-ip\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            parse_config("[coordinator]\nqueue_size = 0"),
            Err(ConfigError::Validation(errors)) if errors.len() == 1
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("hc-coordinator-loader-{}.toml", std::process::id()));
        fs::write(&path, SAMPLE).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.vservers[0].name, "dns");

        std::fs::remove_file(&path).unwrap_or_default();
        assert!(matches!(load_config(&path), Err(ConfigError::Io(_))));
    }
}
