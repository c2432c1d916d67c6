//! The interception gateway.
//!
//! A loopback HTTP listener the application routes its outgoing traffic
//! through. Requests arrive either in absolute form (proxy style) or in
//! origin form, where the intended origin comes from the
//! `x-fairway-origin` header and defaults to the application origin; the
//! upstream side owns TLS. Each connection is served on its own task and
//! every request flows through the engine's classify-and-dispatch path.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::engine::OfflineEngine;
use crate::lifecycle::origin_url;
use crate::models::{FetchRequest, HttpMethod, ResponseSnapshot};
use crate::upstream::ReqwestUpstream;

/// Hard cap on inbound request bodies.
const MAX_REQUEST_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Header carrying the intended origin for origin-form requests.
/// Consumed by the gateway, never forwarded.
const ORIGIN_OVERRIDE_HEADER: &str = "x-fairway-origin";

/// Response headers that must not be copied from a snapshot; the gateway
/// re-frames the body itself.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

/// Run the gateway listener until the running flag is cleared.
pub async fn run_gateway(
    engine: Arc<OfflineEngine<ReqwestUpstream>>,
    bind_address: String,
    port: u16,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Gateway listening on {}", addr);

    loop {
        if !crate::api::is_gateway_running_internal() {
            break;
        }

        // Accept with a timeout so cancellation is checked periodically
        let accept_result =
            tokio::time::timeout(tokio::time::Duration::from_millis(500), listener.accept()).await;

        match accept_result {
            Ok(Ok((socket, peer_addr))) => {
                debug!("Connection from {}", peer_addr);
                let engine = engine.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(socket);
                    let service = service_fn(move |req| {
                        let engine = engine.clone();
                        async move {
                            Ok::<_, std::convert::Infallible>(handle_request(engine, req).await)
                        }
                    });
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        // Early client hangups are routine; keep them quiet
                        let err_str = e.to_string().to_lowercase();
                        if err_str.contains("eof")
                            || err_str.contains("broken pipe")
                            || err_str.contains("connection reset")
                            || err_str.contains("connection closed")
                        {
                            debug!("Connection closed by client: {}", e);
                        } else {
                            error!("Error serving connection: {}", e);
                        }
                    }
                });
            }
            Ok(Err(e)) => error!("Accept error: {}", e),
            Err(_) => {
                // Timeout, check the running flag and continue
                continue;
            }
        }
    }

    info!("Gateway stopped");
    Ok(())
}

async fn handle_request(
    engine: Arc<OfflineEngine<ReqwestUpstream>>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let fetch_req = match to_fetch_request(req, engine.config()).await {
        Ok(fetch_req) => fetch_req,
        Err(detail) => {
            warn!("Rejecting malformed gateway request: {}", detail);
            return error_response(StatusCode::BAD_REQUEST, &detail);
        }
    };

    match engine.handle_fetch(&fetch_req).await {
        Ok(snapshot) => to_http_response(&snapshot),
        Err(e) => {
            // Only CacheFirst and PassThrough propagate; surface those as a
            // gateway-level transport failure.
            debug!(url = %fetch_req.full_url(), error = %e, "Fetch propagated an error");
            error_response(StatusCode::BAD_GATEWAY, "upstream fetch failed")
        }
    }
}

/// Convert one inbound hyper request into the engine's request model.
async fn to_fetch_request<B>(req: Request<B>, config: &EngineConfig) -> Result<FetchRequest, String>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if req.method() == hyper::Method::CONNECT {
        return Err("CONNECT is not supported".to_string());
    }

    let (parts, body) = req.into_parts();
    let method = HttpMethod::from_str_lossy(parts.method.as_str());

    let headers: HashMap<String, String> = parts
        .headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    let (scheme, host, port, path) = if let Some(authority) = parts.uri.authority() {
        // Absolute-form (proxy style)
        let scheme = parts.uri.scheme_str().unwrap_or("http").to_string();
        let host = authority.host().to_string();
        let port = authority
            .port_u16()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        (scheme, host, port, path)
    } else {
        // Origin-form: resolve against the override header or the app origin
        let origin = parts
            .headers
            .get(ORIGIN_OVERRIDE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(&config.app_origin)
            .to_string();
        let base = FetchRequest::get(&origin_url(&origin, "/")).map_err(|e| e.to_string())?;
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        (base.scheme, base.host, base.port, path)
    };

    let body_bytes = Limited::new(body, MAX_REQUEST_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| format!("reading request body: {}", e))?
        .to_bytes();

    let mut fetch_req = FetchRequest::new(method, &scheme, &host, port, &path, headers);
    fetch_req
        .headers
        .retain(|k, _| !k.eq_ignore_ascii_case(ORIGIN_OVERRIDE_HEADER));
    if !body_bytes.is_empty() {
        fetch_req.body = Some(body_bytes.to_vec());
    }
    Ok(fetch_req)
}

fn to_http_response(snapshot: &ResponseSnapshot) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(snapshot.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Full::new(Bytes::from(snapshot.body.clone())));
    *response.status_mut() = status;

    for (key, value) in &snapshot.headers {
        if STRIPPED_RESPONSE_HEADERS
            .iter()
            .any(|stripped| key.eq_ignore_ascii_case(stripped))
        {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(key.as_str()),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }

    response
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(format!("{}\n", message))));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EngineConfig {
        EngineConfig::default()
    }

    fn empty_body() -> Full<Bytes> {
        Full::new(Bytes::new())
    }

    #[tokio::test]
    async fn test_absolute_form_request_conversion() {
        let req = Request::builder()
            .method("GET")
            .uri("https://api.open-meteo.com/v1/forecast?latitude=36.57")
            .body(empty_body())
            .unwrap();

        let fetch_req = to_fetch_request(req, &test_config()).await.unwrap();
        assert_eq!(fetch_req.method, HttpMethod::Get);
        assert_eq!(fetch_req.host, "api.open-meteo.com");
        assert_eq!(fetch_req.port, 443);
        assert_eq!(fetch_req.path, "/v1/forecast?latitude=36.57");
        assert!(fetch_req.body.is_none());
    }

    #[tokio::test]
    async fn test_origin_form_defaults_to_app_origin() {
        let req = Request::builder()
            .method("GET")
            .uri("/api/profile")
            .body(empty_body())
            .unwrap();

        let fetch_req = to_fetch_request(req, &test_config()).await.unwrap();
        assert_eq!(fetch_req.scheme, "https");
        assert_eq!(fetch_req.host, "fairway.app");
        assert_eq!(fetch_req.path, "/api/profile");
    }

    #[tokio::test]
    async fn test_origin_override_header_is_consumed() {
        let req = Request::builder()
            .method("POST")
            .uri("/v1/projects/fairway/documents/scores")
            .header("x-fairway-origin", "https://firestore.googleapis.com")
            .body(Full::new(Bytes::from_static(b"{\"score\":82}")))
            .unwrap();

        let fetch_req = to_fetch_request(req, &test_config()).await.unwrap();
        assert_eq!(fetch_req.host, "firestore.googleapis.com");
        assert_eq!(fetch_req.method, HttpMethod::Post);
        assert_eq!(fetch_req.body.as_deref(), Some(&b"{\"score\":82}"[..]));
        assert!(fetch_req.header("x-fairway-origin").is_none());
    }

    #[tokio::test]
    async fn test_connect_is_rejected() {
        let req = Request::builder()
            .method("CONNECT")
            .uri("fairway.app:443")
            .body(empty_body())
            .unwrap();

        assert!(to_fetch_request(req, &test_config()).await.is_err());
    }

    #[test]
    fn test_snapshot_conversion_strips_framing_headers() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("content-length".to_string(), "999".to_string());
        headers.insert("transfer-encoding".to_string(), "chunked".to_string());
        let snapshot = ResponseSnapshot::new(200, headers, b"{}".to_vec());

        let response = to_http_response(&snapshot);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert!(response.headers().get("content-length").is_none());
        assert!(response.headers().get("transfer-encoding").is_none());
    }
}
