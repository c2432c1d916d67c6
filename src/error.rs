//! Error taxonomy for the offline engine.

use thiserror::Error;

/// Failure at the network seam. Any HTTP response, whatever its status,
/// is a successful fetch; `FetchError` means no response was obtained.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("upstream client setup failed: {0}")]
    Client(String),
}

/// Engine-level errors surfaced through the host facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Install-time manifest fetch failure. Fatal to the install
    /// transition; nothing is published.
    #[error("precache of {url} failed: {reason}")]
    Precache { url: String, reason: String },

    #[error("engine not initialized")]
    Uninitialized,

    #[error("cache store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unknown sync tag: {0}")]
    UnknownSyncTag(String),

    #[error("deferred action replay for tag {tag} failed: {reason}")]
    Replay { tag: String, reason: String },

    #[error("gateway error: {0}")]
    Gateway(String),
}
