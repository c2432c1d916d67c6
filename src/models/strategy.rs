//! Strategy classes assigned to intercepted requests.

use serde::{Deserialize, Serialize};

/// The closed set of caching algorithms a request can be routed through.
/// Exactly one class is assigned per request by `classify::classify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyClass {
    /// Serve from cache; populate the cache on a miss.
    CacheFirst,
    /// Try the network; fall back to stale cache, then a structured
    /// offline response.
    NetworkFirst,
    /// Try the network; fall back to the cached shell document, then an
    /// inline offline page.
    NavigationFallback,
    /// Forward to the network untouched.
    PassThrough,
}
