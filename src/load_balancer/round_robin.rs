// src/load_balancer/round_robin.rs
use crate::health::HealthMonitor;
use crate::proxy::{Backend, Handler, ProxyError};
use async_trait::async_trait;
use hyper::{Body, Request, Response};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Health-aware round-robin over the backends of one route.
///
/// Every selection advances the cursor by exactly one slot, no matter how
/// many unhealthy backends the scan had to skip.
#[derive(Debug)]
pub struct RoundRobin {
    route: String,
    backends: Vec<Arc<Backend>>,
    health: HealthMonitor,
    cursor: Mutex<usize>,
}

/// First position in `start, start+1, ..` (wrapping at `len`) that is
/// healthy. Visits every position at most once.
pub(crate) fn scan(start: usize, len: usize, is_healthy: impl Fn(usize) -> bool) -> Option<usize> {
    (0..len)
        .map(|offset| (start + offset) % len)
        .find(|&position| is_healthy(position))
}

impl RoundRobin {
    pub fn new(route: impl Into<String>, backends: Vec<Arc<Backend>>, health: HealthMonitor) -> Self {
        Self {
            route: route.into(),
            backends,
            health,
            cursor: Mutex::new(0),
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// Picks the next healthy backend. The cursor lock covers the scan and
    /// the advance, and is released before the caller forwards anything.
    pub async fn select(&self) -> Result<Arc<Backend>, ProxyError> {
        let mut cursor = self.cursor.lock().await;
        let len = self.backends.len();
        if len == 0 {
            return Err(ProxyError::NoHealthyBackends);
        }

        let start = *cursor;
        let picked = {
            let status = self.health.status_store().read().await;
            scan(start, len, |position| {
                status.is_healthy(self.backends[position].index())
            })
        };
        *cursor = (start + 1) % len;

        match picked {
            Some(position) => Ok(self.backends[position].clone()),
            None => Err(ProxyError::NoHealthyBackends),
        }
    }

    #[cfg(test)]
    async fn cursor(&self) -> usize {
        *self.cursor.lock().await
    }
}

#[async_trait]
impl Handler for RoundRobin {
    async fn handle(&self, req: Request<Body>) -> Response<Body> {
        match self.select().await {
            Ok(backend) => {
                debug!(route = %self.route, backend = %backend.url(), "selected backend");
                backend.handle(req).await
            }
            Err(err) => {
                warn!(route = %self.route, error = %err, "no backend available");
                err.into()
            }
        }
    }

    async fn ready(&self) {
        self.health.first_round().await;
    }

    fn shutdown(&self) {
        self.health.shutdown();
    }
}
