/// Backend instance selection for a namespace
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use super::{BackendConnection, BackendConnectionImpl, Dialer};
use crate::config::namespace::Namespace;
use crate::error::{ConfigError, TidegateError, TidegateResult};

/// Load-distribution strategy named by a namespace's `selector_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorType {
    #[default]
    Random,
    RoundRobin,
}

impl FromStr for SelectorType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "random" => Ok(SelectorType::Random),
            "round_robin" | "roundrobin" => Ok(SelectorType::RoundRobin),
            other => Err(ConfigError::ValidationError(format!(
                "Invalid selector type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SelectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorType::Random => write!(f, "random"),
            SelectorType::RoundRobin => write!(f, "round_robin"),
        }
    }
}

/// Picks one backend instance from a namespace's instance list
pub trait Selector: Send + Sync {
    fn select(&self, instances: &[String]) -> Option<usize>;
}

/// Uniformly random selection
#[derive(Debug, Default)]
pub struct RandomSelector;

impl Selector for RandomSelector {
    fn select(&self, instances: &[String]) -> Option<usize> {
        if instances.is_empty() {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..instances.len()))
    }
}

/// Round-robin selection
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    counter: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Selector for RoundRobinSelector {
    fn select(&self, instances: &[String]) -> Option<usize> {
        if instances.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % instances.len();
        Some(index)
    }
}

pub fn selector_for(selector_type: SelectorType) -> Box<dyn Selector> {
    match selector_type {
        SelectorType::Random => Box::new(RandomSelector),
        SelectorType::RoundRobin => Box::new(RoundRobinSelector::new()),
    }
}

/// Choose a backend instance of `namespace` and connect to it
pub async fn connect_namespace_backend<D: Dialer>(
    namespace: &Namespace,
    selector: &dyn Selector,
    dialer: D,
) -> TidegateResult<BackendConnectionImpl<D>> {
    namespace.validate()?;

    let instances = &namespace.backend.instances;
    let index = selector.select(instances).ok_or_else(|| {
        TidegateError::backend(format!(
            "namespace {} has no backend instances",
            namespace.namespace
        ))
    })?;
    let address = &instances[index];
    debug!(namespace = %namespace.namespace, address = %address, "selected backend instance");

    let mut conn = BackendConnectionImpl::with_dialer(address.clone(), dialer);
    conn.connect().await?;
    Ok(conn)
}
