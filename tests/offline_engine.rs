//! End-to-end engine behavior against a scripted network.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use fairway_offline_core::config::EngineConfig;
use fairway_offline_core::engine::OfflineEngine;
use fairway_offline_core::error::{EngineError, FetchError};
use fairway_offline_core::lifecycle::{
    api_namespace, static_namespace, LifecycleState, PRECACHE_MANIFEST,
};
use fairway_offline_core::models::{FetchRequest, HttpMethod, ResponseSnapshot, StrategyClass};
use fairway_offline_core::sync::SyncTag;
use fairway_offline_core::upstream::Upstream;

const ORIGIN: &str = "https://fairway.app";

/// Scripted network: URL → canned response, with a global offline switch.
#[derive(Default)]
struct ScriptedNetwork {
    responses: Mutex<HashMap<String, ResponseSnapshot>>,
    failures: Mutex<Vec<String>>,
    offline: AtomicBool,
    log: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn respond(&self, url: &str, status: u16, content_type: &str, body: &[u8]) {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), ResponseSnapshot::new(status, headers, body.to_vec()));
    }

    fn fail(&self, url: &str) {
        self.failures.lock().unwrap().push(url.to_string());
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn requests_seen(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

impl Upstream for ScriptedNetwork {
    fn fetch(
        &self,
        req: &FetchRequest,
    ) -> impl Future<Output = Result<ResponseSnapshot, FetchError>> + Send {
        let url = req.full_url();
        async move {
            self.log.lock().unwrap().push(url.clone());
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError::Transport("network is down".to_string()));
            }
            if self.failures.lock().unwrap().contains(&url) {
                return Err(FetchError::Transport("connection reset".to_string()));
            }
            match self.responses.lock().unwrap().get(&url) {
                Some(snapshot) => Ok(snapshot.clone()),
                None => Ok(ResponseSnapshot::new(404, HashMap::new(), b"not found".to_vec())),
            }
        }
    }
}

fn script_manifest(network: &ScriptedNetwork) {
    for path in PRECACHE_MANIFEST {
        let url = format!("{}{}", ORIGIN, path);
        let body = format!("precached:{}", path);
        let content_type = if *path == "/" { "text/html" } else { "text/plain" };
        network.respond(&url, 200, content_type, body.as_bytes());
    }
}

fn new_engine(
    dir: &tempfile::TempDir,
    network: Arc<ScriptedNetwork>,
) -> OfflineEngine<Arc<ScriptedNetwork>> {
    let config = EngineConfig {
        storage_path: dir.path().to_string_lossy().to_string(),
        ..EngineConfig::default()
    };
    OfflineEngine::new(config, network).expect("engine opens")
}

fn get(host: &str, path: &str) -> FetchRequest {
    FetchRequest::new(HttpMethod::Get, "https", host, 443, path, HashMap::new())
}

fn navigation(path: &str) -> FetchRequest {
    let mut req = get("fairway.app", path);
    req.headers
        .insert("sec-fetch-mode".to_string(), "navigate".to_string());
    req
}

#[tokio::test]
async fn install_succeeds_and_precache_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    script_manifest(&network);
    let engine = new_engine(&dir, network);

    engine.install(false).await.unwrap();

    let store = engine.store();
    let shell = store
        .get(&static_namespace(), "GET https://fairway.app/")
        .await
        .unwrap()
        .expect("shell precached");
    assert_eq!(shell.body, b"precached:/");

    let bundle = store
        .get(&static_namespace(), "GET https://fairway.app/assets/app.js")
        .await
        .unwrap()
        .expect("bundle precached");
    assert_eq!(bundle.body, b"precached:/assets/app.js");
}

#[tokio::test]
async fn failed_install_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    script_manifest(&network);
    network.fail("https://fairway.app/assets/app.js");
    let engine = new_engine(&dir, network);

    let result = engine.install(false).await;
    assert!(matches!(result, Err(EngineError::Precache { .. })));

    assert_eq!(
        engine.store().entry_count(&static_namespace()).await.unwrap(),
        0
    );
    assert_eq!(engine.store().total_entry_count().await.unwrap(), 0);
}

#[tokio::test]
async fn activation_removes_every_stale_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    script_manifest(&network);
    let engine = new_engine(&dir, network);

    // Leftovers from two older versions
    for stale in ["static-v2", "api-v2", "static-v3", "api-v3"] {
        engine.store().create_namespace(stale).await.unwrap();
    }
    engine
        .store()
        .put(
            "static-v3",
            "GET https://fairway.app/",
            &ResponseSnapshot::new(200, HashMap::new(), b"old shell".to_vec()),
        )
        .await
        .unwrap();

    engine.install(true).await.unwrap();
    assert_eq!(engine.lifecycle_state().await, LifecycleState::Active);

    let mut remaining = engine.store().list_namespaces().await.unwrap();
    remaining.sort();
    let mut expected = vec![api_namespace(), static_namespace()];
    expected.sort();
    assert_eq!(remaining, expected);
}

#[tokio::test]
async fn api_request_offline_with_prior_cache_returns_cached_body() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    script_manifest(&network);
    network.respond(
        "https://fairway.app/api/profile",
        200,
        "application/json",
        br#"{"handicap":12}"#,
    );
    let engine = new_engine(&dir, network.clone());
    engine.install(true).await.unwrap();

    // Warm the API cache, then lose the network
    let req = get("fairway.app", "/api/profile");
    let live = engine.handle_fetch(&req).await.unwrap();
    assert_eq!(live.status, 200);
    network.go_offline();

    let cached = engine.handle_fetch(&req).await.unwrap();
    assert_eq!(cached.status, 200);
    assert_eq!(cached.body, br#"{"handicap":12}"#);
}

#[tokio::test]
async fn api_request_offline_with_cold_cache_returns_structured_503() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    script_manifest(&network);
    let engine = new_engine(&dir, network.clone());
    engine.install(true).await.unwrap();
    network.go_offline();

    let resp = engine
        .handle_fetch(&get("fairway.app", "/api/profile"))
        .await
        .unwrap();

    assert_eq!(resp.status, 503);
    assert_eq!(resp.content_type(), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body["error"], "Offline");
    assert!(body["message"].is_string());
    assert_eq!(body.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn navigation_offline_returns_precached_shell_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    script_manifest(&network);
    let engine = new_engine(&dir, network.clone());
    engine.install(true).await.unwrap();
    network.go_offline();

    let resp = engine.handle_fetch(&navigation("/buddies/nearby")).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"precached:/");
}

#[tokio::test]
async fn navigation_offline_without_shell_synthesizes_html() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    // No install at all: cold cache, dead network
    network.go_offline();
    let engine = new_engine(&dir, network);

    let resp = engine.handle_fetch(&navigation("/scores")).await.unwrap();
    assert_eq!(resp.status, 503);
    assert!(resp.content_type().unwrap_or("").starts_with("text/html"));
    assert!(String::from_utf8(resp.body).unwrap().contains("<!doctype html>"));
}

#[tokio::test]
async fn cache_first_assets_are_stable_across_calls() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    script_manifest(&network);
    let engine = new_engine(&dir, network.clone());
    engine.install(true).await.unwrap();

    let req = get("fairway.app", "/assets/app.js");
    let seen_before = network.requests_seen();
    let first = engine.handle_fetch(&req).await.unwrap();
    let second = engine.handle_fetch(&req).await.unwrap();

    // Precached at install: no further network traffic, identical bytes
    assert_eq!(network.requests_seen(), seen_before);
    assert_eq!(first.body, second.body);
    assert_eq!(first.status, second.status);
}

#[tokio::test]
async fn resuming_a_drained_sync_tag_is_a_successful_noop() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    network.respond("https://fairway.app/api/scores", 201, "application/json", b"{}");
    let engine = new_engine(&dir, network.clone());

    engine
        .enqueue_action(SyncTag::ScoreWrite, &serde_json::json!({"round": 7, "score": 85}))
        .await
        .unwrap();
    assert_eq!(engine.pending_action_count(SyncTag::ScoreWrite).await.unwrap(), 1);

    engine.resume_sync(SyncTag::ScoreWrite).await.unwrap();
    assert_eq!(engine.pending_action_count(SyncTag::ScoreWrite).await.unwrap(), 0);
    let replays = network.requests_seen();

    // Second resume with no new writes: success, and nothing is re-sent
    engine.resume_sync(SyncTag::ScoreWrite).await.unwrap();
    assert_eq!(network.requests_seen(), replays);
}

#[tokio::test]
async fn deferred_actions_survive_offline_resume_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::new();
    network.go_offline();
    let engine = new_engine(&dir, network.clone());

    engine
        .enqueue_action(
            SyncTag::SocialConnectionWrite,
            &serde_json::json!({"to": "sam", "course": "pebble-creek"}),
        )
        .await
        .unwrap();

    let result = engine.resume_sync(SyncTag::SocialConnectionWrite).await;
    assert!(result.is_err());
    assert_eq!(
        engine
            .pending_action_count(SyncTag::SocialConnectionWrite)
            .await
            .unwrap(),
        1
    );
}

#[test]
fn classification_is_stable_and_total() {
    let samples = vec![
        (get("fairway.app", "/assets/app.js"), StrategyClass::CacheFirst),
        (get("fairway.app", "/api/profile"), StrategyClass::NetworkFirst),
        (navigation("/buddies"), StrategyClass::NavigationFallback),
        (get("example.com", "/feed"), StrategyClass::PassThrough),
    ];
    for (req, expected) in samples {
        assert_eq!(fairway_offline_core::classify::classify(&req), expected);
        assert_eq!(fairway_offline_core::classify::classify(&req), expected);
    }
}
