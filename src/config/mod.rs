/// Configuration management for tidegate
pub mod namespace;

pub use crate::error::ConfigError;
pub use namespace::Namespace;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Cluster name used when none is configured
pub const DEFAULT_CLUSTER_NAME: &str = "default";

/// Lower bound for the client session timeout, in seconds
pub const MIN_SESSION_TIMEOUT: u64 = 600;

pub const CONFIG_CENTER_TYPE_FILE: &str = "file";
pub const CONFIG_CENTER_TYPE_ETCD: &str = "etcd";

/// Main tidegate process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub version: String,
    pub cluster: String,
    /// Client listener settings
    pub proxy_server: ProxyServerConfig,
    /// Administrative HTTP endpoint
    pub admin_server: AdminServerConfig,
    /// Logging configuration
    pub log: LogConfig,
    /// Service registry
    pub registry: RegistryConfig,
    /// Source of namespace definitions
    pub config_center: ConfigCenterConfig,
    /// TLS material
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyServerConfig {
    /// Address to listen on
    pub addr: String,
    /// Maximum number of concurrent client connections
    pub max_connections: u32,
    /// Client session timeout in seconds
    pub session_timeout: u64,
    pub storage_path: String,
    pub tcp_keep_alive: bool,
    /// Metadata service address
    pub pd_addrs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminServerConfig {
    pub addr: String,
    pub enable_basic_auth: bool,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
    pub log_file: LogFileConfig,
}

/// Log file target; rotation is left to an external rotator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    pub filename: String,
    /// Megabytes
    pub max_size: u32,
    pub max_days: u32,
    pub max_backups: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub enable: bool,
    #[serde(rename = "type")]
    pub registry_type: String,
    pub addrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigCenterConfig {
    /// `file` or `etcd`
    #[serde(rename = "type")]
    pub center_type: String,
    pub config_file: ConfigFileConfig,
    pub config_etcd: ConfigEtcdConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFileConfig {
    /// Directory holding one YAML file per namespace
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigEtcdConfig {
    pub addrs: Vec<String>,
    pub base_path: String,
    pub username: String,
    pub password: String,
    /// When disabled, malformed namespaces are skipped while listing
    pub strict_parse: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    #[serde(rename = "ssl-ca")]
    pub ssl_ca: String,
    #[serde(rename = "ssl-cert")]
    pub ssl_cert: String,
    #[serde(rename = "ssl-key")]
    pub ssl_key: String,
    #[serde(rename = "cluster-ssl-ca")]
    pub cluster_ssl_ca: String,
    #[serde(rename = "cluster-ssl-cert")]
    pub cluster_ssl_cert: String,
    #[serde(rename = "cluster-ssl-key")]
    pub cluster_ssl_key: String,
    #[serde(rename = "cluster-verify-cn")]
    pub cluster_verify_cn: Vec<String>,
    #[serde(rename = "tls-version")]
    pub min_tls_version: String,
    #[serde(rename = "rsa-key-size")]
    pub rsa_key_size: u32,
}

impl Default for ProxyServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:6000".to_string(),
            max_connections: 1000,
            session_timeout: MIN_SESSION_TIMEOUT,
            storage_path: "./data".to_string(),
            tcp_keep_alive: true,
            pd_addrs: String::new(),
        }
    }
}

impl Default for AdminServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:6001".to_string(),
            enable_basic_auth: false,
            user: String::new(),
            password: String::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            log_file: LogFileConfig::default(),
        }
    }
}

impl Default for ConfigCenterConfig {
    fn default() -> Self {
        Self {
            center_type: CONFIG_CENTER_TYPE_FILE.to_string(),
            config_file: ConfigFileConfig {
                path: "./conf/namespace".to_string(),
            },
            config_etcd: ConfigEtcdConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Parse TOML, apply defaults and validate
    pub fn from_bytes(data: &[u8]) -> Result<Self, ConfigError> {
        let content =
            std::str::from_utf8(data).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config: ProxyConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.check();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_bytes(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_toml()?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Fill in derived defaults
    pub fn check(&mut self) {
        if self.proxy_server.session_timeout <= MIN_SESSION_TIMEOUT {
            self.proxy_server.session_timeout = MIN_SESSION_TIMEOUT;
        }
        if self.cluster.is_empty() {
            self.cluster = DEFAULT_CLUSTER_NAME.to_string();
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate proxy server config
        if self.proxy_server.addr.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "proxy_server.addr cannot be empty".to_string(),
            ));
        }

        if !is_host_port(&self.proxy_server.addr) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid proxy_server.addr: {}",
                self.proxy_server.addr
            )));
        }

        if self.proxy_server.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        // Validate admin server config
        if self.admin_server.enable_basic_auth && self.admin_server.user.is_empty() {
            return Err(ConfigError::ValidationError(
                "admin_server.user is required when basic auth is enabled".to_string(),
            ));
        }

        // Validate logging config
        match self.log.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.log.level
                )))
            }
        }

        match self.log.format.as_str() {
            "json" | "text" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.log.format
                )))
            }
        }

        // Validate config center
        match self.config_center.center_type.as_str() {
            CONFIG_CENTER_TYPE_FILE => {
                if self.config_center.config_file.path.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "config_center.config_file.path cannot be empty".to_string(),
                    ));
                }
            }
            CONFIG_CENTER_TYPE_ETCD => {
                if self.config_center.config_etcd.addrs.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "config_center.config_etcd.addrs cannot be empty".to_string(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "invalid config center type: {}",
                    other
                )))
            }
        }

        // Validate security config
        match self.security.min_tls_version.as_str() {
            "" | "TLSv1.0" | "TLSv1.1" | "TLSv1.2" | "TLSv1.3" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid tls-version: {}",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P, center: &str) -> Result<(), ConfigError> {
        let config = match center {
            CONFIG_CENTER_TYPE_FILE => ProxyConfig {
                cluster: DEFAULT_CLUSTER_NAME.to_string(),
                ..Default::default()
            },
            CONFIG_CENTER_TYPE_ETCD => ProxyConfig {
                cluster: DEFAULT_CLUSTER_NAME.to_string(),
                config_center: ConfigCenterConfig {
                    center_type: CONFIG_CENTER_TYPE_ETCD.to_string(),
                    config_file: ConfigFileConfig::default(),
                    config_etcd: ConfigEtcdConfig {
                        addrs: vec![
                            "10.0.1.10:2379".to_string(),
                            "10.0.1.11:2379".to_string(),
                            "10.0.1.12:2379".to_string(),
                        ],
                        base_path: "/tidegate".to_string(),
                        username: String::new(),
                        password: String::new(),
                        strict_parse: true,
                    },
                },
                ..Default::default()
            },
            _ => {
                return Err(ConfigError::ValidationError(
                    "Config center must be 'file' or 'etcd'".to_string(),
                ))
            }
        };

        config.save_to_file(path)
    }
}

/// `host:port` shape only; hostnames are resolved when the listener binds
fn is_host_port(addr: &str) -> bool {
    match addr.trim().rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let mut config = ProxyConfig::default();
        config.check();
        assert!(config.validate().is_ok());
        assert_eq!(config.cluster, DEFAULT_CLUSTER_NAME);
    }

    #[test]
    fn test_session_timeout_is_clamped() {
        let config = ProxyConfig::from_bytes(b"[proxy_server]\naddr = \"127.0.0.1:6000\"\nsession_timeout = 30\n").unwrap();
        assert_eq!(config.proxy_server.session_timeout, MIN_SESSION_TIMEOUT);

        let config = ProxyConfig::from_bytes(b"[proxy_server]\naddr = \"127.0.0.1:6000\"\nsession_timeout = 3600\n").unwrap();
        assert_eq!(config.proxy_server.session_timeout, 3600);
    }

    #[test]
    fn test_cluster_defaults() {
        let config = ProxyConfig::from_bytes(b"version = \"v1\"\n").unwrap();
        assert_eq!(config.cluster, DEFAULT_CLUSTER_NAME);

        let config = ProxyConfig::from_bytes(b"cluster = \"east\"\n").unwrap();
        assert_eq!(config.cluster, "east");
    }

    #[test]
    fn test_config_validation() {
        let mut config = ProxyConfig::default();

        config.proxy_server.max_connections = 0;
        assert!(config.validate().is_err());
        config.proxy_server.max_connections = 1000;
        assert!(config.validate().is_ok());

        config.log.level = "verbose".to_string();
        assert!(config.validate().is_err());
        config.log.level = "debug".to_string();

        config.admin_server.enable_basic_auth = true;
        assert!(config.validate().is_err());
        config.admin_server.user = "admin".to_string();
        assert!(config.validate().is_ok());

        config.config_center.center_type = "zookeeper".to_string();
        assert!(config.validate().is_err());

        config.config_center.center_type = CONFIG_CENTER_TYPE_ETCD.to_string();
        assert!(config.validate().is_err());
        config.config_center.config_etcd.addrs = vec!["127.0.0.1:2379".to_string()];
        assert!(config.validate().is_ok());

        config.security.min_tls_version = "SSLv3".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_proxy_addr_accepts_hostnames() {
        let config =
            ProxyConfig::from_bytes(b"[proxy_server]\naddr = \"localhost:6000\"\n").unwrap();
        assert_eq!(config.proxy_server.addr, "localhost:6000");

        let mut config = ProxyConfig::default();
        config.proxy_server.addr = "[::1]:6000".to_string();
        assert!(config.validate().is_ok());

        for bad in ["localhost", ":6000", "localhost:http", "db:70000"] {
            config.proxy_server.addr = bad.to_string();
            assert!(config.validate().is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_security_keys_use_dashes() {
        let toml_str = r#"
[security]
ssl-ca = "/etc/tidegate/ca.pem"
cluster-verify-cn = ["tidegate"]
tls-version = "TLSv1.2"
rsa-key-size = 4096
"#;
        let config = ProxyConfig::from_bytes(toml_str.as_bytes()).unwrap();
        assert_eq!(config.security.ssl_ca, "/etc/tidegate/ca.pem");
        assert_eq!(config.security.cluster_verify_cn, vec!["tidegate".to_string()]);
        assert_eq!(config.security.min_tls_version, "TLSv1.2");
        assert_eq!(config.security.rsa_key_size, 4096);
    }

    #[test]
    fn test_config_file_operations() {
        let temp_file = NamedTempFile::new().unwrap();

        ProxyConfig::create_example_config(temp_file.path(), "etcd").unwrap();
        let loaded = ProxyConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.config_center.center_type, CONFIG_CENTER_TYPE_ETCD);
        assert_eq!(loaded.config_center.config_etcd.addrs.len(), 3);
        assert!(loaded.config_center.config_etcd.strict_parse);

        assert!(ProxyConfig::create_example_config(temp_file.path(), "consul").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ProxyConfig::load_from_file("/nonexistent/tidegate.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
