//! # Fairway Offline Core
//!
//! Offline request-interception and caching engine for the Fairway app.
//! Sits between the application's outgoing network calls and the network,
//! serving from a durable versioned cache when it can, degrading to
//! well-formed offline responses when it must.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Fairway app (UI)                      │
//! ├──────────────────────────────────────────────────────────┤
//! │              Fairway Offline Core (this crate)           │
//! │  ┌─────────┐  ┌──────────┐  ┌────────────┐  ┌─────────┐  │
//! │  │ Gateway │──│ Classify │──│ Strategies │──│  Store  │  │
//! │  └─────────┘  └──────────┘  └─────┬──────┘  │ (SQLite)│  │
//! │        ┌───────────┐  ┌──────┐    │         └─────────┘  │
//! │        │ Lifecycle │  │ Sync │  Upstream (reqwest)       │
//! │        └───────────┘  └──────┘                           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every intercepted request is assigned exactly one strategy class
//! (cache-first, network-first, navigation-fallback or pass-through) and
//! executed against the current version's cache namespaces. The lifecycle
//! controller installs precached assets all-or-nothing and garbage-collects
//! superseded namespaces on activation. Deferred write-actions and push
//! notifications are independent side-channels driven by the host.

// Public modules
pub mod api;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod store;
pub mod strategies;
pub mod sync;
pub mod upstream;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
