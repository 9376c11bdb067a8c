// src/health/probe.rs
use crate::proxy::ConfigError;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

/// How a single health probe decides on a verdict. Chosen once per monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Healthy when the target answers `200 OK`.
    Ping,
    /// Healthy when the target answers `200 OK` and the body contains the
    /// literal string.
    BodyMatch(String),
}

impl Probe {
    pub fn new(expect_body: Option<&str>) -> Self {
        match expect_body {
            Some(needle) if !needle.is_empty() => Probe::BodyMatch(needle.to_string()),
            _ => Probe::Ping,
        }
    }

    /// Runs one probe. Every failure is a `false` verdict; nothing is retried.
    pub async fn check(&self, client: &Client, url: &Url) -> bool {
        let response = match client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(%url, error = %err, "health probe failed");
                return false;
            }
        };

        if response.status() != StatusCode::OK {
            debug!(%url, status = %response.status(), "health probe got unexpected status");
            return false;
        }

        match self {
            Probe::Ping => true,
            Probe::BodyMatch(needle) => match response.text().await {
                Ok(body) => {
                    let found = body.contains(needle.as_str());
                    if !found {
                        debug!(%url, expected = %needle, "health probe body did not match");
                    }
                    found
                }
                Err(err) => {
                    debug!(%url, error = %err, "health probe body unreadable");
                    false
                }
            },
        }
    }
}

/// Appends the health check sub-path to a target URL, segment by segment.
pub fn check_url(target: &Url, path: Option<&str>) -> Result<Url, ConfigError> {
    let path = match path {
        Some(path) if !path.is_empty() => path,
        _ => return Ok(target.clone()),
    };

    let invalid = || ConfigError::InvalidCheckPath {
        target: target.to_string(),
        path: path.to_string(),
    };

    let pieces: Vec<&str> = path.split('/').filter(|piece| !piece.is_empty()).collect();
    if pieces.iter().any(|piece| *piece == "." || *piece == "..") {
        return Err(invalid());
    }

    let mut url = target.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
        segments.pop_if_empty().extend(pieces);
        if path.ends_with('/') {
            segments.push("");
        }
    }
    Ok(url)
}
