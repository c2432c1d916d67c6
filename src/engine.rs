//! The offline engine.
//!
//! Owns the durable stores, the upstream seam and the lifecycle
//! controller, and turns each intercepted request into a response. The
//! engine holds no per-request mutable state: concurrent `handle_fetch`
//! calls share only the durable stores.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::classify;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::lifecycle::{
    api_namespace, origin_url, static_namespace, LifecycleController, LifecycleState,
    CACHE_VERSION,
};
use crate::models::{FetchRequest, ResponseSnapshot, StrategyClass};
use crate::store::{ActionRecord, ActionStore, CacheStore};
use crate::strategies;
use crate::sync::{self, SyncTag};
use crate::upstream::Upstream;

/// Point-in-time snapshot of engine state for the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub lifecycle: LifecycleState,
    pub cache_version: u32,
    pub static_entries: u64,
    pub api_entries: u64,
    pub pending_actions: u64,
}

pub struct OfflineEngine<U: Upstream> {
    config: EngineConfig,
    store: Arc<CacheStore>,
    actions: Arc<ActionStore>,
    upstream: U,
    lifecycle: tokio::sync::Mutex<LifecycleController>,
    static_ns: String,
    api_ns: String,
    shell_key: String,
}

impl<U: Upstream> OfflineEngine<U> {
    pub fn new(config: EngineConfig, upstream: U) -> Result<Self, EngineError> {
        let base = Path::new(&config.storage_path);
        let store = Arc::new(CacheStore::open(base)?);
        let actions = Arc::new(ActionStore::open(base)?);

        let shell_url = origin_url(&config.app_origin, "/");
        let shell_key = FetchRequest::get(&shell_url)?.cache_key();

        Ok(Self {
            config,
            store,
            actions,
            upstream,
            lifecycle: tokio::sync::Mutex::new(LifecycleController::new()),
            static_ns: static_namespace(),
            api_ns: api_namespace(),
            shell_key,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Run the install transition. With `skip_waiting` the new version is
    /// promoted immediately instead of waiting for the host to activate.
    pub async fn install(&self, skip_waiting: bool) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle
            .install(&self.upstream, &self.store, &self.config.app_origin, skip_waiting)
            .await?;
        if lifecycle.should_skip_waiting() {
            lifecycle.activate(&self.store).await?;
        }
        Ok(())
    }

    /// Run the activate transition: garbage-collect stale namespaces and
    /// claim traffic.
    pub async fn activate(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.activate(&self.store).await
    }

    pub async fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.lock().await.state()
    }

    /// Mark this version as superseded. Called by the host once a newer
    /// version has activated; the engine serves no further traffic.
    pub async fn mark_redundant(&self) {
        self.lifecycle.lock().await.mark_redundant();
    }

    /// Handle one intercepted request: classify, then dispatch to the
    /// strategy executor.
    pub async fn handle_fetch(&self, req: &FetchRequest) -> Result<ResponseSnapshot, EngineError> {
        let class = classify(req);
        debug!(method = %req.method, url = %req.full_url(), class = ?class, "Intercepted request");
        strategies::execute(
            class,
            req,
            &self.store,
            &self.upstream,
            &self.static_ns,
            &self.api_ns,
            &self.shell_key,
        )
        .await
    }

    /// Classify without executing; used by the host for diagnostics.
    pub fn classify(&self, req: &FetchRequest) -> StrategyClass {
        classify(req)
    }

    /// Durably queue a deferred write-action.
    pub async fn enqueue_action(
        &self,
        tag: SyncTag,
        payload: &serde_json::Value,
    ) -> Result<ActionRecord, EngineError> {
        sync::enqueue(&self.actions, tag, payload).await
    }

    /// Replay pending actions for one tag. Safe to call at any time, any
    /// number of times; failures propagate so the host reschedules.
    pub async fn resume_sync(&self, tag: SyncTag) -> Result<(), EngineError> {
        sync::resume(&self.actions, &self.upstream, &self.config.api_origin, tag).await
    }

    pub async fn pending_action_count(&self, tag: SyncTag) -> Result<u64, EngineError> {
        Ok(self.actions.count(tag.as_str()).await?)
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let lifecycle = self.lifecycle.lock().await.state();
        Ok(EngineStatus {
            lifecycle,
            cache_version: CACHE_VERSION,
            static_entries: self.store.entry_count(&self.static_ns).await?,
            api_entries: self.store.entry_count(&self.api_ns).await?,
            pending_actions: self.actions.count_all().await?,
        })
    }

    /// Wipe the response cache entirely. Returns removed entry count.
    pub async fn clear_cache(&self) -> Result<u64, EngineError> {
        Ok(self.store.clear_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::lifecycle::PRECACHE_MANIFEST;
    use crate::models::HttpMethod;
    use crate::upstream::fake::{ok_response, FakeUpstream};

    fn test_config(dir: &tempfile::TempDir) -> EngineConfig {
        EngineConfig {
            storage_path: dir.path().to_string_lossy().to_string(),
            ..EngineConfig::default()
        }
    }

    fn engine_with_manifest(
        dir: &tempfile::TempDir,
    ) -> OfflineEngine<std::sync::Arc<FakeUpstream>> {
        let upstream = std::sync::Arc::new(FakeUpstream::new());
        for path in PRECACHE_MANIFEST {
            upstream.respond(
                &origin_url("https://fairway.app", path),
                ok_response(b"asset", "text/plain"),
            );
        }
        OfflineEngine::new(test_config(dir), upstream).unwrap()
    }

    #[tokio::test]
    async fn test_install_and_activate_reach_active() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_manifest(&dir);

        engine.install(false).await.unwrap();
        assert_eq!(engine.lifecycle_state().await, LifecycleState::Waiting);

        engine.activate().await.unwrap();
        assert_eq!(engine.lifecycle_state().await, LifecycleState::Active);

        let status = engine.status().await.unwrap();
        assert_eq!(status.cache_version, CACHE_VERSION);
        assert_eq!(status.static_entries, PRECACHE_MANIFEST.len() as u64);
        assert_eq!(status.api_entries, 0);
        assert_eq!(status.pending_actions, 0);
    }

    #[tokio::test]
    async fn test_skip_waiting_promotes_in_one_step() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_manifest(&dir);

        engine.install(true).await.unwrap();
        assert_eq!(engine.lifecycle_state().await, LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_handle_fetch_routes_through_the_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with_manifest(&dir);
        engine.install(true).await.unwrap();

        let mut nav = FetchRequest::new(
            HttpMethod::Get,
            "https",
            "fairway.app",
            443,
            "/buddies/nearby",
            HashMap::new(),
        );
        nav.headers
            .insert("sec-fetch-mode".to_string(), "navigate".to_string());

        let resp = engine.handle_fetch(&nav).await.unwrap();
        // No route scripted for /buddies/nearby: the fake answers 404, which
        // navigation returns unmodified (the network responded).
        assert_eq!(resp.status, 404);
    }
}
