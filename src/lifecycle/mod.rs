//! Version lifecycle: install, activate, cutover.
//!
//! Namespace names embed a single version constant that is bumped on every
//! deploy changing precache contents or API-cache semantics, so a rollout
//! is atomic at the namespace-set granularity.

use futures::future::try_join_all;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::models::{FetchRequest, ResponseSnapshot};
use crate::store::CacheStore;
use crate::upstream::Upstream;

/// Bumped together for both namespaces on every deploy.
pub const CACHE_VERSION: u32 = 4;

/// URLs that must be present in the static namespace after install.
/// Shell document first; the remaining entries are the compiled bundles,
/// icons, and the routes the shell can serve offline.
pub const PRECACHE_MANIFEST: &[&str] = &[
    "/",
    "/assets/app.js",
    "/assets/app.css",
    "/manifest.webmanifest",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
    "/buddies",
    "/scores",
    "/messages",
];

pub fn static_namespace() -> String {
    format!("static-v{}", CACHE_VERSION)
}

pub fn api_namespace() -> String {
    format!("api-v{}", CACHE_VERSION)
}

/// The namespace set owned by the current version.
pub fn current_namespaces() -> [String; 2] {
    [static_namespace(), api_namespace()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LifecycleState {
    Installing,
    Waiting,
    Activating,
    Active,
    Redundant,
}

/// Drives the install → waiting → activating → active progression.
///
/// The host serializes install and activate; the controller itself is kept
/// behind the engine's async mutex and never re-entered concurrently.
pub struct LifecycleController {
    state: LifecycleState,
    skip_waiting: bool,
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleController {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Installing,
            skip_waiting: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether install requested promotion past `Waiting`.
    pub fn should_skip_waiting(&self) -> bool {
        self.skip_waiting
    }

    /// Precache the manifest into a fresh static namespace.
    ///
    /// Every manifest URL is fetched first; only when all of them came back
    /// 2xx is anything published, in a single transaction. A failed install
    /// leaves the state machine in `Installing` with nothing written, so
    /// the previously active version keeps serving.
    pub async fn install<U: Upstream>(
        &mut self,
        upstream: &U,
        store: &CacheStore,
        app_origin: &str,
        skip_waiting: bool,
    ) -> Result<(), EngineError> {
        self.state = LifecycleState::Installing;
        let namespace = static_namespace();
        info!(namespace = %namespace, entries = PRECACHE_MANIFEST.len(), "Installing precache");

        let fetches = PRECACHE_MANIFEST
            .iter()
            .map(|path| precache_one(upstream, app_origin, path));
        let entries = try_join_all(fetches).await?;

        store.put_all(&namespace, entries).await?;
        store.create_namespace(&api_namespace()).await?;

        self.skip_waiting = skip_waiting;
        self.state = LifecycleState::Waiting;
        info!(namespace = %namespace, skip_waiting, "Install complete");
        Ok(())
    }

    /// Garbage-collect stale namespaces, then claim traffic.
    ///
    /// Deletion failures are tolerated: the namespace stays behind, the
    /// next activation retries, and promotion to `Active` is never blocked.
    pub async fn activate(&mut self, store: &CacheStore) -> Result<(), EngineError> {
        self.state = LifecycleState::Activating;
        let keep = current_namespaces();

        let existing = store.list_namespaces().await?;
        for namespace in existing {
            if keep.contains(&namespace) {
                continue;
            }
            match store.delete_namespace(&namespace).await {
                Ok(()) => info!(namespace = %namespace, "Removed stale namespace"),
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Stale namespace cleanup failed; will retry on next activation")
                }
            }
        }

        self.state = LifecycleState::Active;
        info!(version = CACHE_VERSION, "Activation complete");
        Ok(())
    }

    /// Mark this version as superseded by a newer one.
    pub fn mark_redundant(&mut self) {
        self.state = LifecycleState::Redundant;
        info!(version = CACHE_VERSION, "Version marked redundant");
    }
}

/// Join an origin and an absolute path into one URL.
pub(crate) fn origin_url(origin: &str, path: &str) -> String {
    format!("{}{}", origin.trim_end_matches('/'), path)
}

async fn precache_one<U: Upstream>(
    upstream: &U,
    app_origin: &str,
    path: &str,
) -> Result<(String, ResponseSnapshot), EngineError> {
    let url = origin_url(app_origin, path);
    let req = FetchRequest::get(&url)?;
    let snapshot = upstream
        .fetch(&req)
        .await
        .map_err(|e| EngineError::Precache {
            url: url.clone(),
            reason: e.to_string(),
        })?;
    if !snapshot.is_success() {
        return Err(EngineError::Precache {
            url,
            reason: format!("unexpected status {}", snapshot.status),
        });
    }
    Ok((req.cache_key(), snapshot))
}
