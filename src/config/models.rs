// src/config/models.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::proxy::{validate_url, Mapping};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub routes: BTreeMap<String, RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub timeout_secs: u64,
    /// Strip client provenance headers instead of adding `X-Forwarded-*`.
    pub silent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub path: Option<String>,
    pub expect_body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub targets: Vec<String>,
    #[serde(default)]
    pub algorithm: LoadBalancerAlgorithm,
    /// Replaces the global health check settings for this route.
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerAlgorithm {
    #[default]
    RoundRobin,
    /// No balancing: the first target takes every request.
    Single,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            timeout_secs: 10,
            silent: false,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.address
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.address))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            timeout_secs: 10,
            path: None,
            expect_body: None,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, scope: &str) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("{scope}: health check interval must be greater than zero");
        }
        if self.timeout_secs == 0 {
            bail!("{scope}: health check timeout must be greater than zero");
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;
        if self.server.timeout_secs == 0 {
            bail!("server timeout must be greater than zero");
        }
        self.health_check.validate("health_check")?;

        for (name, route) in &self.routes {
            if route.targets.is_empty() {
                bail!("route {name:?} has no targets");
            }
            for target in &route.targets {
                validate_url(target).with_context(|| format!("route {name:?}"))?;
            }
            if let Some(health_check) = &route.health_check {
                health_check.validate(&format!("route {name:?}"))?;
            }
        }
        Ok(())
    }

    /// Health check settings in effect for `route`.
    pub fn health_check_for(&self, route: &str) -> &HealthCheckConfig {
        self.routes
            .get(route)
            .and_then(|route| route.health_check.as_ref())
            .unwrap_or(&self.health_check)
    }

    /// Targets of every route using `algorithm`.
    pub fn mapping(&self, algorithm: LoadBalancerAlgorithm) -> Mapping {
        self.routes
            .iter()
            .filter(|(_, route)| route.algorithm == algorithm)
            .map(|(name, route)| (name.clone(), route.targets.clone()))
            .collect()
    }
}
