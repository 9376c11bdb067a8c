// src/proxy/backend.rs
use super::error::{ConfigError, ProxyError};
use super::Handler;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::{self, HeaderMap, HeaderName};
use hyper::{Body, Client, Request, Response, Uri, Version};
use hyper_tls::HttpsConnector;
use tracing::warn;
use url::{Position, Url};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Headers that only make sense for a single hop and must not be relayed.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// One upstream target. The index is the backend's position inside its
/// group and doubles as its key in the group's health status store.
#[derive(Debug)]
pub struct Backend {
    index: usize,
    url: Url,
    client: HttpsClient,
}

/// Parses `target` and insists on a scheme and a host.
pub fn validate_url(target: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidTarget {
        target: target.to_string(),
    };

    let url = Url::parse(target).map_err(|_| invalid())?;
    match url.host_str() {
        Some(host) if !host.is_empty() && !url.scheme().is_empty() => Ok(url),
        _ => Err(invalid()),
    }
}

impl Backend {
    pub fn new(index: usize, target: &str) -> Result<Self, ConfigError> {
        let url = validate_url(target)?;
        Ok(Self::with_url(index, url))
    }

    pub fn with_url(index: usize, url: Url) -> Self {
        let client = Client::builder().build(HttpsConnector::new());
        Self { index, url, client }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Relays `req` to this backend and hands back the upstream response
    /// untouched apart from hop-by-hop headers.
    pub async fn forward(&self, mut req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        *req.uri_mut() = self.upstream_uri(req.uri())?;
        *req.version_mut() = Version::HTTP_11;
        strip_hop_by_hop(req.headers_mut());

        let mut response = self.client.request(req).await?;
        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }

    fn upstream_uri(&self, incoming: &Uri) -> Result<Uri, ProxyError> {
        let path = join_paths(self.url.path(), incoming.path());
        let path_and_query = match (self.url.query().unwrap_or(""), incoming.query().unwrap_or("")) {
            ("", "") => path,
            (query, "") | ("", query) => format!("{path}?{query}"),
            (target, request) => format!("{path}?{target}&{request}"),
        };

        let uri = Uri::builder()
            .scheme(self.url.scheme())
            .authority(&self.url[Position::BeforeHost..Position::AfterPort])
            .path_and_query(path_and_query)
            .build()?;
        Ok(uri)
    }
}

#[async_trait]
impl Handler for Backend {
    async fn handle(&self, req: Request<Body>) -> Response<Body> {
        match self.forward(req).await {
            Ok(response) => response,
            Err(err) => {
                warn!(target = %self.url, error = %err, "forwarding failed");
                err.into()
            }
        }
    }
}

/// Joins two path pieces with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by Connection are hop-by-hop as well.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
