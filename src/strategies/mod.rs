//! Strategy executors.
//!
//! Four interchangeable algorithms turn one classified request into one
//! response. `CacheFirst` and `PassThrough` propagate transport errors;
//! `NetworkFirst` and `NavigationFallback` always produce a response,
//! degrading through stale cache to a synthesized fallback.

mod fallback;

pub use fallback::{offline_api_response, offline_page_response, OFFLINE_MESSAGE};

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::{FetchRequest, ResponseSnapshot, StrategyClass};
use crate::store::CacheStore;
use crate::upstream::Upstream;

/// Dispatch one request through its strategy class.
///
/// `static_ns` and `api_ns` are the current version's namespaces;
/// `shell_key` is the cache identity of the application shell document.
pub async fn execute<U: Upstream>(
    class: StrategyClass,
    req: &FetchRequest,
    store: &CacheStore,
    upstream: &U,
    static_ns: &str,
    api_ns: &str,
    shell_key: &str,
) -> Result<ResponseSnapshot, EngineError> {
    match class {
        StrategyClass::CacheFirst => cache_first(static_ns, req, store, upstream).await,
        StrategyClass::NetworkFirst => Ok(network_first(api_ns, req, store, upstream).await),
        StrategyClass::NavigationFallback => {
            Ok(navigation_fallback(static_ns, shell_key, req, store, upstream).await)
        }
        StrategyClass::PassThrough => pass_through(req, upstream).await,
    }
}

/// Serve from cache, populating it on a miss. A network failure with no
/// cached copy propagates: static assets have no meaningful substitute.
pub async fn cache_first<U: Upstream>(
    namespace: &str,
    req: &FetchRequest,
    store: &CacheStore,
    upstream: &U,
) -> Result<ResponseSnapshot, EngineError> {
    let key = req.cache_key();
    match store.get(namespace, &key).await {
        Ok(Some(hit)) => {
            debug!(key = %key, "CacheFirst hit");
            return Ok(hit);
        }
        Ok(None) => {}
        Err(e) => warn!(key = %key, error = %e, "Cache read failed; treating as miss"),
    }

    let snapshot = upstream.fetch(req).await?;
    if snapshot.is_success() {
        if let Err(e) = store.put(namespace, &key, &snapshot).await {
            warn!(key = %key, error = %e, "Cache write failed; serving uncached response");
        }
    }
    Ok(snapshot)
}

/// Try the network; fall back to stale cache, then to the structured
/// offline response. Never returns a raw transport error.
pub async fn network_first<U: Upstream>(
    namespace: &str,
    req: &FetchRequest,
    store: &CacheStore,
    upstream: &U,
) -> ResponseSnapshot {
    let key = req.cache_key();
    match upstream.fetch(req).await {
        Ok(snapshot) => {
            if snapshot.is_success() {
                if let Err(e) = store.put(namespace, &key, &snapshot).await {
                    warn!(key = %key, error = %e, "Cache write failed; serving network response");
                }
            }
            snapshot
        }
        Err(fetch_err) => {
            debug!(key = %key, error = %fetch_err, "NetworkFirst fetch failed; consulting cache");
            match store.get(namespace, &key).await {
                Ok(Some(hit)) => hit,
                Ok(None) => offline_api_response(),
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache read failed after network failure");
                    offline_api_response()
                }
            }
        }
    }
}

/// Try the network; fall back to the cached shell document, then to the
/// inline offline page. Navigations never fail with a transport error.
pub async fn navigation_fallback<U: Upstream>(
    static_ns: &str,
    shell_key: &str,
    req: &FetchRequest,
    store: &CacheStore,
    upstream: &U,
) -> ResponseSnapshot {
    match upstream.fetch(req).await {
        Ok(snapshot) => snapshot,
        Err(fetch_err) => {
            debug!(url = %req.full_url(), error = %fetch_err, "Navigation fetch failed; falling back to shell");
            match store.get(static_ns, shell_key).await {
                Ok(Some(shell)) => shell,
                Ok(None) => offline_page_response(),
                Err(e) => {
                    warn!(error = %e, "Shell lookup failed after navigation failure");
                    offline_page_response()
                }
            }
        }
    }
}

/// Forward to the network, returning whatever comes back untouched.
pub async fn pass_through<U: Upstream>(
    req: &FetchRequest,
    upstream: &U,
) -> Result<ResponseSnapshot, EngineError> {
    Ok(upstream.fetch(req).await?)
}
