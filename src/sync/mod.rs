//! Deferred write-action queue.
//!
//! Writes that fail for connectivity reasons are recorded durably and
//! replayed later when the host decides to resume a tag. Scheduling, retry
//! cadence and backoff belong to the host; this module only guarantees
//! that resuming is safe under at-least-once, out-of-order invocation.

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::lifecycle::origin_url;
use crate::models::FetchRequest;
use crate::store::{ActionRecord, ActionStore};
use crate::upstream::Upstream;

/// The closed set of deferred write-intent classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTag {
    /// Buddy-request writes that could not reach the backend
    SocialConnectionWrite,
    /// Scorecard uploads that could not reach the backend
    ScoreWrite,
}

impl SyncTag {
    pub const ALL: [SyncTag; 2] = [SyncTag::SocialConnectionWrite, SyncTag::ScoreWrite];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTag::SocialConnectionWrite => "social-connection-write",
            SyncTag::ScoreWrite => "score-write",
        }
    }

    pub fn parse(s: &str) -> Option<SyncTag> {
        match s {
            "social-connection-write" => Some(SyncTag::SocialConnectionWrite),
            "score-write" => Some(SyncTag::ScoreWrite),
            _ => None,
        }
    }

    /// Backend write endpoint this tag replays against.
    fn replay_path(&self) -> &'static str {
        match self {
            SyncTag::SocialConnectionWrite => "/api/buddy-requests",
            SyncTag::ScoreWrite => "/api/scores",
        }
    }
}

impl std::fmt::Display for SyncTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durably record a write-intent for later replay.
pub async fn enqueue(
    actions: &ActionStore,
    tag: SyncTag,
    payload: &serde_json::Value,
) -> Result<ActionRecord, EngineError> {
    let record = actions.enqueue(tag.as_str(), &payload.to_string()).await?;
    info!(tag = %tag, id = %record.id, "Deferred action queued");
    Ok(record)
}

/// Replay every pending record for one tag.
///
/// Each record is POSTed to the tag's backend endpoint and deleted only
/// once that POST succeeds, so an interrupted pass resumes exactly where
/// it stopped and a second pass over drained work is a no-op. A permanent
/// backend rejection (4xx) drops the record rather than poisoning the
/// queue; anything else propagates so the host reschedules.
pub async fn resume<U: Upstream>(
    actions: &ActionStore,
    upstream: &U,
    api_origin: &str,
    tag: SyncTag,
) -> Result<(), EngineError> {
    let pending = actions.list(tag.as_str()).await?;
    if pending.is_empty() {
        debug!(tag = %tag, "No deferred actions pending");
        return Ok(());
    }

    info!(tag = %tag, count = pending.len(), "Replaying deferred actions");
    let url = origin_url(api_origin, tag.replay_path());

    for record in pending {
        let mut req = FetchRequest::post_json(&url, record.payload.clone().into_bytes())?;
        req.headers
            .insert("idempotency-key".to_string(), record.id.clone());

        let snapshot = upstream
            .fetch(&req)
            .await
            .map_err(|e| EngineError::Replay {
                tag: tag.to_string(),
                reason: e.to_string(),
            })?;

        if snapshot.is_success() {
            actions.remove(&record.id).await?;
            debug!(tag = %tag, id = %record.id, "Deferred action replayed");
        } else if (400..500).contains(&snapshot.status) {
            warn!(tag = %tag, id = %record.id, status = snapshot.status, "Deferred action rejected; dropping");
            actions.remove(&record.id).await?;
        } else {
            return Err(EngineError::Replay {
                tag: tag.to_string(),
                reason: format!("backend answered {}", snapshot.status),
            });
        }
    }

    Ok(())
}
