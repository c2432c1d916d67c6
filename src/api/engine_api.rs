//! Engine API for the hosting application
//!
//! This module provides the main surface the host uses to drive the
//! engine: logging bootstrap, lifecycle transitions, gateway start/stop,
//! deferred-action resumption and notification dispatch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::config::EngineConfig;
use crate::engine::{EngineStatus, OfflineEngine};
use crate::error::EngineError;
use crate::gateway;
use crate::notify::{self, InteractionOutcome, NotificationSpec};
use crate::sync::SyncTag;
use crate::upstream::ReqwestUpstream;

/// The process-wide engine slot. The engine itself keeps no mutable state
/// between requests; this global only pins the handle the gateway and the
/// host share.
static ENGINE: Lazy<Mutex<Option<Arc<OfflineEngine<ReqwestUpstream>>>>> =
    Lazy::new(|| Mutex::new(None));

// Gateway state
static GATEWAY_RUNNING: AtomicBool = AtomicBool::new(false);
static ACTIVE_GATEWAY_TASKS: AtomicU64 = AtomicU64::new(0);

/// Currently bound gateway address (bind_address, port)
static CURRENT_GATEWAY_ADDR: Lazy<RwLock<(String, u16)>> =
    Lazy::new(|| RwLock::new(("127.0.0.1".to_string(), 0)));

/// Get the version of the offline core library
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Initialize logging (call once at startup).
/// `storage_path` is used to store log files in release mode.
#[allow(unused_variables)]
pub fn init_core(storage_path: Option<&str>) -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }

    #[cfg(debug_assertions)]
    {
        // Debug mode: log to console (stderr)
        let level = resolve_log_level();
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        // Release mode: log to a daily-rolling file
        let level = resolve_log_level();

        let log_dir = storage_path
            .map(|p| std::path::PathBuf::from(p).join("logs"))
            .unwrap_or_else(|| crate::config::default_storage_dir().join("logs"));

        std::fs::create_dir_all(&log_dir).map_err(|e| {
            anyhow::anyhow!("failed to create log directory {}: {}", log_dir.display(), e)
        })?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "fairway_offline_core");
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

        // Keep the guard alive for the lifetime of the program; logging
        // should last until process exit.
        std::mem::forget(_guard);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(non_blocking)
            .try_init();
    }

    tracing::info!(
        "Fairway offline core initialized v{}",
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

fn resolve_log_level() -> tracing::level_filters::LevelFilter {
    use tracing::level_filters::LevelFilter;

    match std::env::var("RUST_LOG") {
        Ok(val) => match val.to_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            _ => LevelFilter::INFO,
        },
        Err(_) => LevelFilter::INFO,
    }
}

/// Construct the engine if not already present. Idempotent: a second call
/// keeps the existing engine.
pub fn init_engine(config: EngineConfig) -> Result<(), EngineError> {
    let mut guard = ENGINE
        .lock()
        .map_err(|e| EngineError::Store(anyhow::anyhow!("engine slot poisoned: {}", e)))?;
    if guard.is_some() {
        return Ok(());
    }
    let upstream = ReqwestUpstream::new()?;
    let engine = Arc::new(OfflineEngine::new(config, upstream)?);
    *guard = Some(engine);
    Ok(())
}

fn engine() -> Result<Arc<OfflineEngine<ReqwestUpstream>>, EngineError> {
    let guard = ENGINE
        .lock()
        .map_err(|e| EngineError::Store(anyhow::anyhow!("engine slot poisoned: {}", e)))?;
    guard.clone().ok_or(EngineError::Uninitialized)
}

/// Run the install transition (precache). With `skip_waiting` the new
/// version cuts over immediately after a successful install.
pub async fn install(skip_waiting: bool) -> Result<(), EngineError> {
    engine()?.install(skip_waiting).await
}

/// Run the activate transition (stale-namespace cleanup + claim).
pub async fn activate() -> Result<(), EngineError> {
    engine()?.activate().await
}

/// Install and, on success, activate in one call.
pub async fn install_and_activate() -> Result<(), EngineError> {
    engine()?.install(true).await
}

pub async fn engine_status() -> Result<EngineStatus, EngineError> {
    engine()?.status().await
}

/// Mark the running version as superseded by a newer deploy.
pub async fn mark_redundant() -> Result<(), EngineError> {
    engine()?.mark_redundant().await;
    Ok(())
}

/// Gateway status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStatus {
    /// Whether the gateway is accepting traffic
    pub is_running: bool,
    /// Bind address
    pub bind_address: String,
    /// Bound port
    pub port: u16,
}

/// Get current gateway status
pub fn gateway_status() -> GatewayStatus {
    let (bind_address, port) = {
        let addr = CURRENT_GATEWAY_ADDR.read().unwrap();
        (addr.0.clone(), addr.1)
    };
    GatewayStatus {
        is_running: GATEWAY_RUNNING.load(Ordering::SeqCst),
        bind_address,
        port,
    }
}

/// Internal helper to check if the gateway should keep running
pub fn is_gateway_running_internal() -> bool {
    GATEWAY_RUNNING.load(Ordering::SeqCst)
}

/// Start the interception gateway. Returns the bound port.
pub async fn start_gateway() -> Result<u16, EngineError> {
    let engine = engine()?;
    if GATEWAY_RUNNING.load(Ordering::SeqCst) {
        tracing::info!("Gateway already running");
        let addr = CURRENT_GATEWAY_ADDR.read().unwrap();
        return Ok(addr.1);
    }

    let config = engine.config().clone();
    // Find an available port starting from the requested one
    let selected_port = find_available_port(&config.bind_address, config.port, 20)
        .await
        .map_err(EngineError::Gateway)?;

    if selected_port != config.port {
        tracing::warn!(
            "Port {} in use, falling back to {}",
            config.port,
            selected_port
        );
    }

    GATEWAY_RUNNING.store(true, Ordering::SeqCst);
    {
        let mut current = CURRENT_GATEWAY_ADDR.write().unwrap();
        *current = (config.bind_address.clone(), selected_port);
    }
    tracing::info!(
        "Starting gateway on {}:{}",
        config.bind_address,
        selected_port
    );

    let bind_address = config.bind_address.clone();
    tokio::spawn(async move {
        if let Err(e) = gateway::run_gateway(engine, bind_address, selected_port).await {
            tracing::error!("Gateway error: {}", e);
        }

        // If the listener exits, ensure the flag is cleared
        GATEWAY_RUNNING.store(false, Ordering::SeqCst);
        ACTIVE_GATEWAY_TASKS.fetch_sub(1, Ordering::SeqCst);
    });
    ACTIVE_GATEWAY_TASKS.fetch_add(1, Ordering::SeqCst);

    Ok(selected_port)
}

async fn find_available_port(
    bind_address: &str,
    start_port: u16,
    max_tries: u16,
) -> Result<u16, String> {
    use std::io::ErrorKind;

    for offset in 0..max_tries {
        let candidate = start_port.saturating_add(offset);
        match TcpListener::bind((bind_address, candidate)).await {
            Ok(listener) => {
                drop(listener); // release so the real listener can bind
                return Ok(candidate);
            }
            Err(err) if err.kind() == ErrorKind::AddrInUse => continue,
            Err(err) => {
                return Err(format!(
                    "Failed to bind to {}:{}: {}",
                    bind_address, candidate, err
                ))
            }
        }
    }

    Err(format!(
        "No available port found in range {}-{}",
        start_port,
        start_port.saturating_add(max_tries.saturating_sub(1))
    ))
}

/// Stop the gateway and wait for the listener task to finish.
pub async fn stop_gateway() -> Result<(), EngineError> {
    tracing::info!("Stopping gateway");
    GATEWAY_RUNNING.store(false, Ordering::SeqCst);
    loop {
        if ACTIVE_GATEWAY_TASKS.load(Ordering::SeqCst) == 0 {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }
    Ok(())
}

/// Durably queue a deferred write-action. Returns the record id, which
/// also serves as the replay idempotency key.
pub async fn queue_deferred_action(
    tag: &str,
    payload: serde_json::Value,
) -> Result<String, EngineError> {
    let tag = SyncTag::parse(tag).ok_or_else(|| EngineError::UnknownSyncTag(tag.to_string()))?;
    let record = engine()?.enqueue_action(tag, &payload).await?;
    Ok(record.id)
}

/// Resume one sync tag: replay its pending write-actions. Called by the
/// host whenever it decides connectivity is back.
pub async fn resume_sync(tag: &str) -> Result<(), EngineError> {
    let tag = SyncTag::parse(tag).ok_or_else(|| EngineError::UnknownSyncTag(tag.to_string()))?;
    engine()?.resume_sync(tag).await
}

pub async fn pending_action_count(tag: &str) -> Result<u64, EngineError> {
    let tag = SyncTag::parse(tag).ok_or_else(|| EngineError::UnknownSyncTag(tag.to_string()))?;
    engine()?.pending_action_count(tag).await
}

/// Build the notification descriptor for an inbound push delivery.
pub fn notification_for_push(payload: Option<&str>) -> NotificationSpec {
    notify::build_notification(payload)
}

/// Route a notification interaction back into the application.
pub fn notification_interaction(action: &str) -> InteractionOutcome {
    notify::handle_interaction(action)
}

/// Entries currently cached in one namespace.
pub async fn cache_entry_count(namespace: &str) -> Result<u64, EngineError> {
    Ok(engine()?.store().entry_count(namespace).await?)
}

/// Wipe the response cache (manual reset). Returns removed entry count.
pub async fn clear_cache() -> Result<u64, EngineError> {
    engine()?.clear_cache().await
}
