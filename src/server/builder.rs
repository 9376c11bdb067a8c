// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::config::ServerConfig;
use crate::proxy::{HeaderPolicy, ProxyError, Routes};
use crate::server::handler::RequestHandler;
use crate::server::listener::bind_tcp;
use crate::server::router::RoutingTable;
use anyhow::Result;
use arc_swap::ArcSwapOption;
use futures::future::join_all;
use hyper::header::HOST;
use hyper::{server::conn::Http, Body, Request, Response, StatusCode, Uri};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder pattern so `main.rs` can configure the server before it serves.
pub struct ServerBuilder {
    addr: SocketAddr,
    timeout: Duration,
    silent: bool,
    routes: Option<Routes>,
}

/// The proxy front: holds the published routing table and dispatches every
/// request to the route matching its path.
///
/// Starts out unconfigured; the first [`Server::set_routing`] makes it serve
/// and every later call hot-swaps the table.
pub struct Server {
    addr: SocketAddr,
    timeout: Duration,
    policy: HeaderPolicy,
    routing: ArcSwapOption<RoutingTable>,
}

impl ServerBuilder {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: DEFAULT_TIMEOUT,
            silent: false,
            routes: None,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Ok(Self::new(config.socket_addr()?)
            .timeout(config.timeout())
            .silent(config.silent))
    }

    /// Upper bound for handling one request, forwarding included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Routes published as soon as the server is built.
    pub fn with_routes(mut self, routes: Routes) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn build(self) -> Server {
        let server = Server {
            addr: self.addr,
            timeout: self.timeout,
            policy: HeaderPolicy::from_silent(self.silent),
            routing: ArcSwapOption::empty(),
        };
        if let Some(routes) = self.routes {
            server.set_routing(routes);
        }
        server
    }
}

impl Server {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Publishes `routes` as the new routing table in one atomic swap and
    /// hands back the table it replaced.
    pub fn set_routing(&self, routes: Routes) -> Option<Arc<RoutingTable>> {
        let mut installed = None;
        let previous = self.routing.rcu(|current| {
            let version = current.as_ref().map_or(1, |table| table.version() + 1);
            let table = Arc::new(RoutingTable::new(version, routes.clone()));
            installed = Some(table.clone());
            Some(table)
        });

        if let Some(table) = installed {
            info!(
                version = table.version(),
                routes = table.len(),
                prefixes = ?table.prefixes().collect::<Vec<_>>(),
                "routing table reloaded"
            );
        }
        previous
    }

    /// Waits until every handler in `routes` is ready, then publishes them.
    /// Freshly built groups have no health verdicts yet and would answer 503
    /// until their first round, so the current table keeps serving meanwhile.
    pub async fn publish(&self, routes: Routes) -> Option<Arc<RoutingTable>> {
        join_all(routes.values().map(|handler| handler.ready())).await;
        self.set_routing(routes)
    }

    /// The snapshot new requests are routed against, if any.
    pub fn routing(&self) -> Option<Arc<RoutingTable>> {
        self.routing.load_full()
    }

    /// Stops the health monitors of the current routing table.
    pub fn shutdown_monitors(&self) {
        if let Some(table) = self.routing() {
            table.shutdown();
        }
    }

    pub async fn serve(&self, req: Request<Body>, peer: SocketAddr) -> Response<Body> {
        let span = info_span!("request", id = %Uuid::new_v4());
        self.dispatch(req, peer).instrument(span).await
    }

    async fn dispatch(&self, mut req: Request<Body>, peer: SocketAddr) -> Response<Body> {
        let Some(table) = self.routing.load_full() else {
            warn!(%peer, "request before any routing table was published");
            return ProxyError::NoHandler.into();
        };

        let Some(route) = table.lookup(req.uri().path()) else {
            return not_found();
        };
        info!(%peer, path = route.prefix, version = table.version(), "received request");

        let uri = match stripped_uri(req.uri(), &route.path) {
            Ok(uri) => uri,
            Err(err) => return err.into(),
        };
        let host = req
            .headers()
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| req.uri().authority().map(|authority| authority.to_string()));
        let scheme = req.uri().scheme_str().unwrap_or("http").to_string();

        self.policy
            .apply(req.headers_mut(), peer, host.as_deref(), &scheme);
        *req.uri_mut() = uri;

        let handler = route.handler.clone();
        match tokio::time::timeout(self.timeout, handler.handle(req)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(%peer, path = route.prefix, timeout = ?self.timeout, "request timed out");
                ProxyError::Timeout.into()
            }
        }
    }

    /// Binds the configured address and serves until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = bind_tcp(self.addr).await?;
        self.serve_listener(listener, shutdown).await
    }

    /// Accepts connections on `listener`, one Tokio task per connection.
    pub async fn serve_listener(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("HTTP server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(connection) => connection,
                        Err(err) => {
                            error!(%err, "failed to accept connection");
                            continue;
                        }
                    };
                    let svc = RequestHandler::new(self.clone(), peer);

                    tokio::spawn(async move {
                        let http = Http::new();
                        if let Err(err) = http.serve_connection(stream, svc).await {
                            warn!(%peer, %err, "connection error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("HTTP server shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}

fn stripped_uri(original: &Uri, path: &str) -> Result<Uri, ProxyError> {
    let path_and_query = match original.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    Ok(Uri::builder().path_and_query(path_and_query).build()?)
}

fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::from("404 page not found\n"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
