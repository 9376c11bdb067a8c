// src/health/status.rs
use std::collections::HashMap;
use tokio::sync::{watch, RwLock, RwLockReadGuard};

/// Health verdicts of one backend group, keyed by backend index.
///
/// A backend without a verdict has not been probed yet and reads as
/// unhealthy.
#[derive(Debug)]
pub struct HealthStatus {
    verdicts: RwLock<HashMap<usize, bool>>,
    probed: watch::Sender<usize>,
}

/// Shared read access to a [`HealthStatus`], held for the span of a scan.
pub struct StatusView<'a> {
    verdicts: RwLockReadGuard<'a, HashMap<usize, bool>>,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            verdicts: RwLock::new(HashMap::new()),
            probed: watch::channel(0).0,
        }
    }

    /// Stores a verdict and returns the one it replaced.
    pub async fn record(&self, index: usize, healthy: bool) -> Option<bool> {
        let mut verdicts = self.verdicts.write().await;
        let previous = verdicts.insert(index, healthy);
        self.probed.send_replace(verdicts.len());
        previous
    }

    /// Resolves once at least `count` backends carry a verdict.
    pub async fn wait_probed(&self, count: usize) {
        let mut probed = self.probed.subscribe();
        let _ = probed.wait_for(|probed| *probed >= count).await;
    }

    pub async fn status(&self, index: usize) -> bool {
        self.read().await.is_healthy(index)
    }

    pub async fn read(&self) -> StatusView<'_> {
        StatusView {
            verdicts: self.verdicts.read().await,
        }
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusView<'_> {
    pub fn is_healthy(&self, index: usize) -> bool {
        self.verdict(index).unwrap_or(false)
    }

    /// The recorded verdict, `None` before the first probe.
    pub fn verdict(&self, index: usize) -> Option<bool> {
        self.verdicts.get(&index).copied()
    }

    /// Number of backends probed at least once.
    pub fn probed(&self) -> usize {
        self.verdicts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unprobed_backends_read_unhealthy() {
        let status = HealthStatus::new();
        assert!(!status.status(0).await);
        assert_eq!(status.read().await.probed(), 0);
    }

    #[tokio::test]
    async fn record_replaces_previous_verdict() {
        let status = HealthStatus::new();
        assert_eq!(status.record(1, true).await, None);
        assert!(status.status(1).await);

        assert_eq!(status.record(1, false).await, Some(true));
        assert!(!status.status(1).await);
        assert!(!status.status(0).await);
        assert_eq!(status.read().await.probed(), 1);
    }

    #[tokio::test]
    async fn wait_probed_resolves_after_enough_verdicts() {
        let status = std::sync::Arc::new(HealthStatus::new());
        let waiter = tokio::spawn({
            let status = status.clone();
            async move { status.wait_probed(2).await }
        });

        status.record(0, true).await;
        status.record(0, false).await;
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        status.record(1, true).await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
