//! Configuration loading and validation for the VIP agent

use crate::agent::AgentSettings;
use crate::tls::{DEFAULT_CA_CERT, DEFAULT_CERT, DEFAULT_KEY, TlsFiles};
use election::{DEFAULT_ELECTION_KEY, DEFAULT_LEASE_TTL};
use netif::HostAddress;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

pub const ENV_ADVERTISE_IP: &str = "ADVERTISE_IP";
pub const ENV_ADVERTISE_IFACE: &str = "ADVERTISE_IFACE";
pub const ENV_ETCD_CERT: &str = "ETCD_CERT";
pub const ENV_ETCD_KEY: &str = "ETCD_KEY";
pub const ENV_ETCD_CA_CERT: &str = "ETCD_CA_CERT";
pub const ENV_ETCD_ENDPOINTS: &str = "ETCD_ENDPOINTS";
pub const ENV_ETCD_DIAL_TIMEOUT: &str = "ETCD_DIAL_TIMEOUT";
pub const ENV_ELECTION_KEY: &str = "ADVERTISE_ELECTION_KEY";
pub const ENV_LEASE_TTL: &str = "ADVERTISE_LEASE_TTL";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// Default etcd dial timeout
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var} is not a valid duration: {source}")]
    InvalidDuration {
        var: &'static str,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Unknown log format {0:?} (expected \"text\" or \"json\")")]
    InvalidLogFormat(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Failed to read TLS file {}: {source}", path.display())]
    TlsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for common::Error {
    fn from(e: ConfigError) -> Self {
        common::Error::config(e)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidLogFormat(s.to_string())),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Validate)]
pub struct Config {
    /// Candidate identity and the address to bind
    #[validate(custom = "validate_advertise_ip")]
    pub advertise_ip: String,

    #[validate(length(min = 1))]
    pub interface: String,

    #[validate(length(min = 1))]
    pub endpoints: Vec<String>,

    pub tls: TlsFiles,

    #[validate(custom = "validate_dial_timeout")]
    pub dial_timeout: Duration,

    #[validate(custom = "validate_election_key")]
    pub election_key: String,

    #[validate(custom = "validate_lease_ttl")]
    pub lease_ttl: Duration,

    pub log_format: LogFormat,
}

// Custom validators

fn validate_advertise_ip(ip: &str) -> Result<(), ValidationError> {
    HostAddress::parse(ip)
        .map(|_| ())
        .map_err(|_| ValidationError::new("advertise_ip_invalid"))
}

fn validate_election_key(key: &str) -> Result<(), ValidationError> {
    if !key.starts_with('/') || key.trim_end_matches('/').is_empty() {
        return Err(ValidationError::new("election_key_invalid_format"));
    }
    Ok(())
}

fn validate_lease_ttl(ttl: &Duration) -> Result<(), ValidationError> {
    let secs = ttl.as_secs();
    if !(5..=3600).contains(&secs) {
        return Err(ValidationError::new("lease_ttl_out_of_range"));
    }
    Ok(())
}

fn validate_dial_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if !(100..=300_000).contains(&millis) {
        return Err(ValidationError::new("dial_timeout_out_of_range"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));
        let duration = |name: &'static str, default: Duration| match get(name) {
            Some(raw) => humantime::parse_duration(raw.trim())
                .map_err(|source| ConfigError::InvalidDuration { var: name, source }),
            None => Ok(default),
        };

        let advertise_ip = required(ENV_ADVERTISE_IP)?;
        let interface = required(ENV_ADVERTISE_IFACE)?;

        let tls = TlsFiles {
            cert: PathBuf::from(get(ENV_ETCD_CERT).unwrap_or_else(|| DEFAULT_CERT.to_string())),
            key: PathBuf::from(get(ENV_ETCD_KEY).unwrap_or_else(|| DEFAULT_KEY.to_string())),
            ca: PathBuf::from(get(ENV_ETCD_CA_CERT).unwrap_or_else(|| DEFAULT_CA_CERT.to_string())),
        };

        let endpoints: Vec<String> = required(ENV_ETCD_ENDPOINTS)?
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();

        let config = Config {
            advertise_ip,
            interface,
            endpoints,
            tls,
            dial_timeout: duration(ENV_ETCD_DIAL_TIMEOUT, DEFAULT_DIAL_TIMEOUT)?,
            election_key: get(ENV_ELECTION_KEY).unwrap_or_else(|| DEFAULT_ELECTION_KEY.to_string()),
            lease_ttl: duration(ENV_LEASE_TTL, DEFAULT_LEASE_TTL)?,
            log_format: get(ENV_LOG_FORMAT)
                .map(|raw| raw.parse::<LogFormat>())
                .transpose()?
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Settings the orchestrator needs
    pub fn settings(&self) -> AgentSettings {
        let mut settings = AgentSettings::new(&self.advertise_ip, &self.interface);
        settings.election_key = self.election_key.clone();
        settings.lease_ttl = self.lease_ttl;
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_ADVERTISE_IP, "10.0.0.5"),
            (ENV_ADVERTISE_IFACE, "eth0"),
            (ENV_ETCD_ENDPOINTS, "https://10.0.0.1:2379"),
        ]
    }

    #[test]
    fn test_minimal_env_uses_defaults() {
        let config = Config::from_lookup(env(&minimal())).unwrap();

        assert_eq!(config.advertise_ip, "10.0.0.5");
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.endpoints, vec!["https://10.0.0.1:2379".to_string()]);
        assert_eq!(config.tls, TlsFiles::default());
        assert_eq!(config.dial_timeout, Duration::from_secs(5));
        assert_eq!(config.election_key, "/advertise-ip");
        assert_eq!(config.lease_ttl, Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_required_variables() {
        for missing in [ENV_ADVERTISE_IP, ENV_ADVERTISE_IFACE, ENV_ETCD_ENDPOINTS] {
            let pairs: Vec<_> = minimal().into_iter().filter(|(k, _)| *k != missing).collect();
            match Config::from_lookup(env(&pairs)) {
                Err(ConfigError::Missing(name)) => assert_eq!(name, missing),
                other => panic!("expected Missing({}), got {:?}", missing, other),
            }
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut pairs = minimal();
        pairs[0] = (ENV_ADVERTISE_IP, "");
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::Missing(ENV_ADVERTISE_IP))
        ));
    }

    #[test]
    fn test_endpoint_list_parsing() {
        let mut pairs = minimal();
        pairs[2] = (ENV_ETCD_ENDPOINTS, "https://a:2379, https://b:2379,,https://c:2379 ");
        let config = Config::from_lookup(env(&pairs)).unwrap();
        assert_eq!(
            config.endpoints,
            vec!["https://a:2379", "https://b:2379", "https://c:2379"]
        );
    }

    #[test]
    fn test_blank_endpoint_list_is_invalid() {
        let mut pairs = minimal();
        pairs[2] = (ENV_ETCD_ENDPOINTS, " , ");
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = minimal();
        pairs.extend([
            (ENV_ETCD_CERT, "/etc/vip/client.crt"),
            (ENV_ETCD_KEY, "/etc/vip/client.key"),
            (ENV_ETCD_CA_CERT, "/etc/vip/ca.crt"),
            (ENV_ETCD_DIAL_TIMEOUT, "750ms"),
            (ENV_ELECTION_KEY, "/vip/web"),
            (ENV_LEASE_TTL, "15s"),
            (ENV_LOG_FORMAT, "JSON"),
        ]);
        let config = Config::from_lookup(env(&pairs)).unwrap();

        assert_eq!(config.tls.cert, PathBuf::from("/etc/vip/client.crt"));
        assert_eq!(config.tls.key, PathBuf::from("/etc/vip/client.key"));
        assert_eq!(config.tls.ca, PathBuf::from("/etc/vip/ca.crt"));
        assert_eq!(config.dial_timeout, Duration::from_millis(750));
        assert_eq!(config.election_key, "/vip/web");
        assert_eq!(config.lease_ttl, Duration::from_secs(15));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_advertise_ip() {
        let mut pairs = minimal();
        pairs[0] = (ENV_ADVERTISE_IP, "10.0.0.5/24");
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_duration() {
        let mut pairs = minimal();
        pairs.push((ENV_LEASE_TTL, "sixty"));
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::InvalidDuration { var: ENV_LEASE_TTL, .. })
        ));
    }

    #[test]
    fn test_lease_ttl_out_of_range() {
        let mut pairs = minimal();
        pairs.push((ENV_LEASE_TTL, "1s"));
        assert!(Config::from_lookup(env(&pairs)).is_err());

        let mut pairs = minimal();
        pairs.push((ENV_LEASE_TTL, "2h"));
        assert!(Config::from_lookup(env(&pairs)).is_err());
    }

    #[test]
    fn test_election_key_validation() {
        assert!(validate_election_key("/advertise-ip").is_ok());
        assert!(validate_election_key("/a/b").is_ok());
        assert!(validate_election_key("advertise-ip").is_err());
        assert!(validate_election_key("/").is_err());
        assert!(validate_election_key("").is_err());
    }

    #[test]
    fn test_unknown_log_format() {
        let mut pairs = minimal();
        pairs.push((ENV_LOG_FORMAT, "xml"));
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_settings_conversion() {
        let config = Config::from_lookup(env(&minimal())).unwrap();
        let settings = config.settings();

        assert_eq!(settings.advertise_ip, "10.0.0.5");
        assert_eq!(settings.interface, "eth0");
        assert_eq!(settings.election_key, "/advertise-ip");
        assert_eq!(settings.lease_ttl, Duration::from_secs(60));
    }
}
