/// Pluggable sources of namespace definitions
pub mod etcd;
pub mod file;

pub use etcd::EtcdConfigCenter;
pub use file::FileConfigCenter;

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::warn;

use crate::config::{ConfigCenterConfig, Namespace, CONFIG_CENTER_TYPE_ETCD, CONFIG_CENTER_TYPE_FILE};
use crate::error::{TidegateError, TidegateResult};

/// Namespace lookup
#[async_trait]
pub trait ConfigCenter: Send + Sync {
    async fn get_namespace(&self, name: &str) -> TidegateResult<Namespace>;

    async fn list_all_namespaces(&self) -> TidegateResult<Vec<Namespace>>;
}

/// Build the configuration center selected by `cfg.type`
pub fn create_config_center(cfg: &ConfigCenterConfig) -> TidegateResult<Box<dyn ConfigCenter>> {
    match cfg.center_type.as_str() {
        CONFIG_CENTER_TYPE_FILE => Ok(Box::new(FileConfigCenter::new(&cfg.config_file.path)?)),
        CONFIG_CENTER_TYPE_ETCD => Ok(Box::new(EtcdConfigCenter::new(&cfg.config_etcd)?)),
        other => Err(TidegateError::config_center(format!(
            "invalid config center type: {}",
            other
        ))),
    }
}

/// Parse raw `(source, yaml)` entries into namespaces.
///
/// An entry is malformed when its YAML does not decode, its name is empty, or
/// its name was already seen. With `strict` set, the first malformed entry
/// fails the whole batch; otherwise it is logged and skipped. Routing checks
/// such as a non-empty instance list are left to the dial path.
pub fn parse_namespace_entries<I>(entries: I, strict: bool) -> TidegateResult<Vec<Namespace>>
where
    I: IntoIterator<Item = (String, Vec<u8>)>,
{
    let mut namespaces = Vec::new();
    let mut seen = HashSet::new();

    for (source, data) in entries {
        let parsed = Namespace::from_yaml(&data)
            .and_then(|ns| ns.check_name().map(|_| ns))
            .map_err(|e| format!("parse namespace {} failed: {}", source, e))
            .and_then(|ns| {
                if seen.contains(&ns.namespace) {
                    Err(format!("duplicate namespace {} in {}", ns.namespace, source))
                } else {
                    Ok(ns)
                }
            });

        match parsed {
            Ok(ns) => {
                seen.insert(ns.namespace.clone());
                namespaces.push(ns);
            }
            Err(message) if strict => return Err(TidegateError::config_center(message)),
            Err(message) => warn!("skipping namespace entry: {}", message),
        }
    }

    Ok(namespaces)
}
