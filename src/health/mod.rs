// src/health/mod.rs
mod monitor;
mod probe;
mod status;

pub use monitor::{HealthMonitor, MonitorOptions};
pub use probe::{check_url, Probe};
pub use status::{HealthStatus, StatusView};
