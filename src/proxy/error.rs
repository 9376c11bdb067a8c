// src/proxy/error.rs
use hyper::{Body, Response, StatusCode};

/// Setup-time failures. These abort route construction and are handed back
/// to whoever asked for the routes.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid target url: {target} - host or scheme missing")]
    InvalidTarget { target: String },

    #[error("cannot join health check path {path:?} onto {target}")]
    InvalidCheckPath { target: String, path: String },

    #[error("route {route:?} has no targets")]
    EmptyRoute { route: String },

    #[error("failed to build health check client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Per-request failures. Never fatal, always rendered as a response.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("handler not set (publish a routing table first)")]
    NoHandler,

    #[error("Backend error: {0}")]
    Upstream(#[from] hyper::Error),

    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] hyper::http::Error),

    #[error("Request timeout")]
    Timeout,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoHealthyBackends | ProxyError::NoHandler => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::Upstream(_) | ProxyError::InvalidUri(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let message = match err {
            ProxyError::NoHealthyBackends | ProxyError::NoHandler => "unavailable",
            ProxyError::Upstream(_) | ProxyError::InvalidUri(_) => "bad gateway",
            ProxyError::Timeout => "gateway timeout",
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = err.status();
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_target_names_the_url() {
        let err = ConfigError::InvalidTarget {
            target: "not-a-url".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid target url: not-a-url - host or scheme missing"
        );
    }

    #[test]
    fn unavailable_renders_503() {
        let response: Response<Body> = ProxyError::NoHealthyBackends.into();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response: Response<Body> = ProxyError::Timeout.into();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
