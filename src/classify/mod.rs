//! Request classification.
//!
//! A pure, I/O-free mapping from one intercepted request to exactly one
//! `StrategyClass`. Rules are checked in priority order and the first
//! match wins, so classification is deterministic and total.

use crate::models::{FetchRequest, HttpMethod, StrategyClass};

/// Path prefixes served as immutable static assets.
const STATIC_PATH_PREFIXES: &[&str] = &["/assets/", "/icons/"];

/// File extensions served as static assets.
const STATIC_EXTENSIONS: &[&str] = &[
    "css",
    "js",
    "mjs",
    "png",
    "jpg",
    "jpeg",
    "gif",
    "svg",
    "webp",
    "ico",
    "woff",
    "woff2",
    "webmanifest",
];

/// Path segment marking application API traffic.
const API_PATH_MARKER: &str = "/api/";

/// Hosted backend and weather-service hostnames.
const BACKEND_HOSTS: &[&str] = &[
    "firestore.googleapis.com",
    "firebasestorage.googleapis.com",
    "api.open-meteo.com",
];

/// Dev-server live-reload traffic that must never be served stale.
const DEV_UPDATE_MARKERS: &[&str] = &["hot-update", "/@vite/", "/__vite_ping", "/sockjs-node/"];

/// Assign a request to its strategy class. First matching rule wins.
pub fn classify(req: &FetchRequest) -> StrategyClass {
    // 1. Only plain GETs over http(s) are ever cache-managed.
    if req.method != HttpMethod::Get {
        return StrategyClass::PassThrough;
    }
    if req.scheme != "http" && req.scheme != "https" {
        return StrategyClass::PassThrough;
    }

    // 2. Live-reload updates bypass the cache entirely.
    if is_dev_update(&req.path) {
        return StrategyClass::PassThrough;
    }

    // 3. Static assets.
    if is_static_asset(&req.path) {
        return StrategyClass::CacheFirst;
    }

    // 4. API traffic.
    if is_api(&req.host, &req.path) {
        return StrategyClass::NetworkFirst;
    }

    // 5. Full-document loads.
    if req.is_navigation() {
        return StrategyClass::NavigationFallback;
    }

    // 6. Everything else.
    StrategyClass::PassThrough
}

fn is_dev_update(path: &str) -> bool {
    DEV_UPDATE_MARKERS.iter().any(|marker| path.contains(marker))
}

fn is_static_asset(path: &str) -> bool {
    if STATIC_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        return true;
    }
    match path_extension(path) {
        Some(ext) => STATIC_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known)),
        None => false,
    }
}

fn is_api(host: &str, path: &str) -> bool {
    if path.contains(API_PATH_MARKER) || path.ends_with("/api") {
        return true;
    }
    BACKEND_HOSTS
        .iter()
        .any(|backend| host.eq_ignore_ascii_case(backend))
}

/// Extension of the final path segment, ignoring any query string.
fn path_extension(path: &str) -> Option<&str> {
    let without_query = path.split('?').next().unwrap_or(path);
    let last_segment = without_query.rsplit('/').next().unwrap_or(without_query);
    match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}
