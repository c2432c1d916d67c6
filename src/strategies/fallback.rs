//! Synthesized offline responses.
//!
//! When neither the network nor the cache can answer, classified requests
//! still get a well-formed response: structured JSON for API traffic, a
//! self-contained HTML page for navigations.

use std::collections::HashMap;

use crate::models::ResponseSnapshot;

pub const OFFLINE_MESSAGE: &str =
    "You're offline. Fairway will catch up as soon as you're back on the network.";

/// Offline page with no external asset references, so it renders even with
/// an empty cache.
const OFFLINE_PAGE_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Fairway &mdash; Offline</title>
<style>
  body { font-family: system-ui, sans-serif; background: #f4f7f4; color: #1d3321;
         display: flex; align-items: center; justify-content: center;
         min-height: 100vh; margin: 0; }
  main { text-align: center; padding: 2rem; }
  h1 { font-size: 1.5rem; }
  p { color: #4a6350; }
</style>
</head>
<body>
<main>
<h1>You&rsquo;re offline</h1>
<p>Fairway couldn&rsquo;t reach the course. Your buddies, scores and messages
will be right here once the connection returns.</p>
</main>
</body>
</html>
"#;

/// Structured 503 returned for API requests with no cached copy.
pub fn offline_api_response() -> ResponseSnapshot {
    let body = serde_json::json!({
        "error": "Offline",
        "message": OFFLINE_MESSAGE,
    });
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    let mut snapshot = ResponseSnapshot::new(503, headers, body.to_string().into_bytes());
    snapshot.status_message = Some("Service Unavailable".to_string());
    snapshot
}

/// Inline offline page returned when a navigation cannot be served from
/// network or cached shell.
pub fn offline_page_response() -> ResponseSnapshot {
    let mut headers = HashMap::new();
    headers.insert(
        "content-type".to_string(),
        "text/html; charset=utf-8".to_string(),
    );
    let mut snapshot =
        ResponseSnapshot::new(503, headers, OFFLINE_PAGE_HTML.as_bytes().to_vec());
    snapshot.status_message = Some("Service Unavailable".to_string());
    snapshot
}
