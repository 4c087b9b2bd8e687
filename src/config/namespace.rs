/// Per-tenant namespace configuration
///
/// Namespaces are YAML documents supplied by a configuration center. The
/// transport layer reads the backend descriptor to choose a dial target; the
/// frontend, breaker and rate limiter descriptors are carried for the policy
/// layers above it.
use serde::{Deserialize, Serialize};

use crate::backend::SelectorType;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespace {
    pub version: String,
    pub namespace: String,
    pub frontend: FrontendNamespace,
    pub backend: BackendNamespace,
    pub breaker: BreakerInfo,
    pub rate_limiter: RateLimiterInfo,
}

/// Client-facing filtering rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendNamespace {
    pub allowed_dbs: Vec<String>,
    /// Slow statement threshold in milliseconds
    pub slow_sql_time: i64,
    pub denied_ips: Vec<String>,
    pub usernames: Vec<String>,
    pub sql_blacklist: Vec<SqlInfo>,
    pub sql_whitelist: Vec<SqlInfo>,
}

/// Literal SQL text match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlInfo {
    pub sql: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendNamespace {
    pub instances: Vec<String>,
    pub selector_type: String,
}

impl BackendNamespace {
    pub fn selector(&self) -> Result<SelectorType, ConfigError> {
        self.selector_type.parse()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerInfo {
    pub scope: String,
    pub strategies: Vec<StrategyInfo>,
}

/// One circuit-breaker strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyInfo {
    pub min_qps: i64,
    pub sql_timeout_ms: i64,
    pub failure_rate_threshold: i64,
    pub failure_num: i64,
    pub open_status_duration_ms: i64,
    /// Ring buffer size
    pub size: i64,
    pub cell_interval_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterInfo {
    pub scope: String,
    pub qps: i64,
}

impl Namespace {
    pub fn from_yaml(data: &[u8]) -> Result<Self, ConfigError> {
        serde_yaml::from_slice(data).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Minimum a config center needs to index the namespace
    pub fn check_name(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "namespace name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that the namespace can be used for routing
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_name()?;

        if self.backend.instances.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "namespace {} has no backend instances",
                self.namespace
            )));
        }

        if let Some(blank) = self.backend.instances.iter().find(|i| i.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "namespace {} has an empty backend instance {:?}",
                self.namespace, blank
            )));
        }

        self.backend.selector()?;

        if self.rate_limiter.qps < 0 {
            return Err(ConfigError::ValidationError(format!(
                "namespace {} rate limiter qps must not be negative",
                self.namespace
            )));
        }

        Ok(())
    }
}
