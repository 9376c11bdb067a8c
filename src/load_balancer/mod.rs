// src/load_balancer/mod.rs
mod round_robin;

pub use round_robin::RoundRobin;
pub use crate::config::LoadBalancerAlgorithm;

use crate::config::Config;
use crate::health::{HealthMonitor, MonitorOptions};
use crate::proxy::{simple_routes, Backend, ConfigError, Handler, Mapping, Routes};
use std::sync::Arc;

/// Builds one health-monitored round-robin group per route. Every group gets
/// its own monitor; `options_for` supplies the monitor settings per route.
///
/// Must run inside a Tokio runtime since the probe loops start right away.
pub fn round_robin_routes<F>(mapping: &Mapping, options_for: F) -> Result<Routes, ConfigError>
where
    F: Fn(&str) -> MonitorOptions,
{
    // Validate everything before the first probe loop is spawned.
    let mut groups = Vec::with_capacity(mapping.len());
    for (route, targets) in mapping {
        if targets.is_empty() {
            return Err(ConfigError::EmptyRoute {
                route: route.clone(),
            });
        }
        let backends = targets
            .iter()
            .enumerate()
            .map(|(index, target)| Backend::new(index, target).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        groups.push((route, backends));
    }

    let mut routes = Routes::new();
    for (route, backends) in groups {
        let health = HealthMonitor::start(route, &backends, &options_for(route.as_str()))?;
        tracing::info!(route = %route, backends = backends.len(), "round robin group ready");
        let group: Arc<dyn Handler> = Arc::new(RoundRobin::new(route.clone(), backends, health));
        routes.insert(route.clone(), group);
    }
    Ok(routes)
}

/// Builds every route of `config` with the algorithm it asks for.
pub fn routes_from_config(config: &Config) -> Result<Routes, ConfigError> {
    let mut routes = simple_routes(&config.mapping(LoadBalancerAlgorithm::Single))?;
    let balanced = round_robin_routes(&config.mapping(LoadBalancerAlgorithm::RoundRobin), |route| {
        MonitorOptions::from(config.health_check_for(route))
    })?;
    routes.extend(balanced);
    Ok(routes)
}
