//! Host-facing API for the offline engine.

pub mod engine_api;

pub use engine_api::*;
