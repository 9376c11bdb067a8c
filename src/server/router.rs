// src/server/router.rs
use crate::proxy::{Handler, Routes};
use std::sync::Arc;

/// One published, immutable routing snapshot. A request keeps the snapshot
/// it looked up for its whole lifetime, even if a newer one is published.
pub struct RoutingTable {
    version: u64,
    entries: Vec<RouteEntry>,
}

struct RouteEntry {
    name: String,
    prefix: String,
    handler: Arc<dyn Handler>,
}

/// Result of a prefix lookup.
pub struct RouteMatch<'a> {
    pub name: &'a str,
    pub prefix: &'a str,
    pub handler: &'a Arc<dyn Handler>,
    /// Request path with the route prefix removed, always starting with `/`.
    pub path: String,
}

/// `api` and `/api/` both register the prefix `/api/`.
fn prefix_for(name: &str) -> String {
    let trimmed = name.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Collapses empty, `.` and `..` segments so a request cannot climb out of
/// the route it matched. A trailing slash survives.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let mut cleaned = format!("/{}", segments.join("/"));
    if path.ends_with('/') && cleaned != "/" {
        cleaned.push('/');
    }
    cleaned
}

impl RoutingTable {
    pub fn new(version: u64, routes: Routes) -> Self {
        let mut entries: Vec<RouteEntry> = routes
            .into_iter()
            .map(|(name, handler)| RouteEntry {
                prefix: prefix_for(&name),
                name,
                handler,
            })
            .collect();
        // Longest prefix wins.
        entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        entries.dedup_by(|later, earlier| later.prefix == earlier.prefix);

        Self { version, entries }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.prefix.as_str())
    }

    /// Matches the cleaned `path` against the longest registered prefix.
    pub fn lookup(&self, path: &str) -> Option<RouteMatch<'_>> {
        let path = clean_path(path);
        let path = path.as_str();
        self.entries.iter().find_map(|entry| {
            let stripped = if let Some(rest) = path.strip_prefix(entry.prefix.as_str()) {
                format!("/{rest}")
            } else if entry.prefix.len() > 1 && path == entry.prefix.trim_end_matches('/') {
                "/".to_string()
            } else {
                return None;
            };

            Some(RouteMatch {
                name: &entry.name,
                prefix: &entry.prefix,
                handler: &entry.handler,
                path: stripped,
            })
        })
    }

    /// Stops the health monitors of every route in this snapshot.
    pub fn shutdown(&self) {
        for entry in &self.entries {
            entry.handler.shutdown();
        }
    }
}
