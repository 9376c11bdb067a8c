// src/health/monitor.rs
use super::probe::{check_url, Probe};
use super::status::HealthStatus;
use crate::config::HealthCheckConfig;
use crate::proxy::{Backend, ConfigError};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const FIRST_ROUND_SLACK: Duration = Duration::from_secs(1);

/// Knobs for one group's monitor.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Pause between two probes of the same backend.
    pub interval: Duration,
    /// Per-probe timeout, owned by this monitor's HTTP client.
    pub timeout: Duration,
    /// Sub-path appended to every target before probing.
    pub path: Option<String>,
    /// Literal the response body has to contain.
    pub expect_body: Option<String>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            path: None,
            expect_body: None,
        }
    }
}

impl From<&HealthCheckConfig> for MonitorOptions {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
            path: config.path.clone(),
            expect_body: config.expect_body.clone(),
        }
    }
}

/// Handle to the probe loops of one backend group.
///
/// Every backend gets its own task that probes, records the verdict and
/// sleeps. The loops run until [`HealthMonitor::shutdown`] is called or the
/// monitor is dropped.
#[derive(Debug)]
pub struct HealthMonitor {
    route: String,
    backends: usize,
    timeout: Duration,
    status: Arc<HealthStatus>,
    shutdown_tx: watch::Sender<bool>,
}

struct ProbeLoop {
    route: String,
    index: usize,
    url: Url,
    probe: Probe,
    client: Client,
    interval: Duration,
    status: Arc<HealthStatus>,
    shutdown_rx: watch::Receiver<bool>,
}

impl HealthMonitor {
    /// Spawns one probe loop per backend. Must be called inside a Tokio
    /// runtime. Fails if a check URL cannot be composed or the HTTP client
    /// cannot be built; nothing is spawned in that case.
    pub fn start(
        route: &str,
        backends: &[Arc<Backend>],
        options: &MonitorOptions,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder().timeout(options.timeout).build()?;
        let probe = Probe::new(options.expect_body.as_deref());

        let targets = backends
            .iter()
            .map(|backend| {
                check_url(backend.url(), options.path.as_deref()).map(|url| (backend.index(), url))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let status = Arc::new(HealthStatus::new());
        let (shutdown_tx, _) = watch::channel(false);
        let backends = targets.len();

        for (index, url) in targets {
            debug!(
                route,
                target = %url,
                interval = ?options.interval,
                "starting health check"
            );
            let probe_loop = ProbeLoop {
                route: route.to_string(),
                index,
                url,
                probe: probe.clone(),
                client: client.clone(),
                interval: options.interval,
                status: status.clone(),
                shutdown_rx: shutdown_tx.subscribe(),
            };
            tokio::spawn(probe_loop.run());
        }

        Ok(Self {
            route: route.to_string(),
            backends,
            timeout: options.timeout,
            status,
            shutdown_tx,
        })
    }

    /// A monitor without probe loops; verdicts are recorded by the test.
    #[cfg(test)]
    pub(crate) fn idle(route: &str) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            route: route.to_string(),
            backends: 0,
            timeout: DEFAULT_TIMEOUT,
            status: Arc::new(HealthStatus::new()),
            shutdown_tx,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub async fn status(&self, index: usize) -> bool {
        self.status.status(index).await
    }

    pub fn status_store(&self) -> &Arc<HealthStatus> {
        &self.status
    }

    /// Waits until every backend has been probed once. A probe never outlives
    /// the client timeout, so this is bounded by it.
    pub async fn first_round(&self) {
        let waited = tokio::time::timeout(
            self.timeout + FIRST_ROUND_SLACK,
            self.status.wait_probed(self.backends),
        )
        .await;
        if waited.is_err() {
            warn!(route = %self.route, "first health check round did not finish in time");
        }
    }

    /// Asks every loop to stop at its next probe or sleep boundary.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!(route = %self.route, "health checks stopping");
        }
    }
}

impl ProbeLoop {
    async fn run(mut self) {
        loop {
            let healthy = tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => break,
                healthy = self.probe.check(&self.client, &self.url) => healthy,
            };
            self.record(healthy).await;

            tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => break,
                _ = sleep(self.interval) => {}
            }
        }
        debug!(route = %self.route, target = %self.url, "health check stopped");
    }

    async fn record(&self, healthy: bool) {
        let previous = self.status.record(self.index, healthy).await;
        debug!(route = %self.route, target = %self.url, healthy, "health probe finished");

        match (previous, healthy) {
            (Some(true), true) | (Some(false), false) => {}
            (_, true) => info!(route = %self.route, target = %self.url, "backend is healthy"),
            (_, false) => warn!(route = %self.route, target = %self.url, "backend is unhealthy"),
        }
    }
}
