// src/proxy/headers.rs
use hyper::header::{self, HeaderMap, HeaderValue};
use std::net::SocketAddr;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// What the proxy tells the backend about where a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderPolicy {
    /// Record client address, original host and scheme in `X-Forwarded-*`.
    #[default]
    Forward,
    /// Strip the user agent and any `X-Forwarded-*` provenance.
    Silent,
}

impl HeaderPolicy {
    pub fn from_silent(silent: bool) -> Self {
        if silent {
            HeaderPolicy::Silent
        } else {
            HeaderPolicy::Forward
        }
    }

    /// Rewrites `headers` in place. `host` and `scheme` describe the request
    /// as the client sent it, `peer` is the client's socket address.
    pub fn apply(&self, headers: &mut HeaderMap, peer: SocketAddr, host: Option<&str>, scheme: &str) {
        match self {
            HeaderPolicy::Silent => {
                headers.remove(header::USER_AGENT);
                headers.remove(X_FORWARDED_HOST);
                headers.remove(X_FORWARDED_FOR);
                headers.remove(X_FORWARDED_PROTO);
            }
            HeaderPolicy::Forward => {
                let client = peer.ip().to_string();
                let prior: Vec<&str> = headers
                    .get_all(X_FORWARDED_FOR)
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .collect();
                let forwarded_for = if prior.is_empty() {
                    client
                } else {
                    format!("{}, {}", prior.join(", "), client)
                };

                set(headers, X_FORWARDED_FOR, &forwarded_for);
                match host {
                    Some(host) => set(headers, X_FORWARDED_HOST, host),
                    None => {
                        headers.remove(X_FORWARDED_HOST);
                    }
                }
                set(headers, X_FORWARDED_PROTO, scheme);
            }
        }
    }
}

fn set(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
