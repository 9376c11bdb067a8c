// src/proxy/mod.rs
mod backend;
mod error;
mod headers;

pub use backend::{validate_url, Backend};
pub use error::{ConfigError, ProxyError};
pub use headers::HeaderPolicy;

use async_trait::async_trait;
use hyper::{Body, Request, Response};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Route name -> upstream target URLs, in round-robin order.
pub type Mapping = BTreeMap<String, Vec<String>>;

/// Route name -> the handler serving it. This is what gets published as a
/// routing table.
pub type Routes = BTreeMap<String, Arc<dyn Handler>>;

/// Anything a route can dispatch to: a single backend or a balanced group.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: Request<Body>) -> Response<Body>;

    /// Resolves once the handler can serve, e.g. after a first health round.
    async fn ready(&self) {}

    /// Stops background work owned by the handler.
    fn shutdown(&self) {}
}

/// Builds unbalanced routes: every route forwards to the first of its
/// targets, without health monitoring.
pub fn simple_routes(mapping: &Mapping) -> Result<Routes, ConfigError> {
    let mut routes = Routes::new();
    for (route, targets) in mapping {
        let target = targets.first().ok_or_else(|| ConfigError::EmptyRoute {
            route: route.clone(),
        })?;
        let backend: Arc<dyn Handler> = Arc::new(Backend::new(0, target)?);
        routes.insert(route.clone(), backend);
    }
    Ok(routes)
}
