//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the offline engine and its interception gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Gateway bind address (loopback only by default)
    pub bind_address: String,
    /// Gateway port to listen on
    pub port: u16,
    /// Directory for the durable cache and action-queue databases
    pub storage_path: String,
    /// Origin the application shell and static assets are served from
    pub app_origin: String,
    /// Origin the application's own API is served from
    pub api_origin: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 9821,
            storage_path: default_storage_dir().to_string_lossy().to_string(),
            app_origin: "https://fairway.app".to_string(),
            api_origin: "https://fairway.app".to_string(),
        }
    }
}

/// Default location for durable engine state.
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("fairway-offline"))
        .unwrap_or_else(|| PathBuf::from("./fairway-offline"))
}
