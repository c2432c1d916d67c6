//! The network seam.
//!
//! Every strategy executor reaches the network through the `Upstream`
//! trait, so tests can script connectivity without sockets. The production
//! implementation forwards through reqwest, which also owns TLS and
//! timeout policy for outbound traffic.

use std::collections::HashMap;
use std::future::Future;

use crate::error::FetchError;
use crate::models::{FetchRequest, HttpMethod, ResponseSnapshot};

/// Hop-by-hop headers that must not be forwarded upstream.
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "proxy-connection",
];

pub trait Upstream: Send + Sync {
    /// Perform one network fetch. Returns `Ok` for any HTTP response
    /// (regardless of status) and `Err` only when no response was obtained.
    fn fetch(
        &self,
        req: &FetchRequest,
    ) -> impl Future<Output = Result<ResponseSnapshot, FetchError>> + Send;
}

impl<T: Upstream> Upstream for std::sync::Arc<T> {
    fn fetch(
        &self,
        req: &FetchRequest,
    ) -> impl Future<Output = Result<ResponseSnapshot, FetchError>> + Send {
        (**self).fetch(req)
    }
}

/// Production upstream backed by a shared reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new() -> Result<Self, FetchError> {
        // Disable env/system proxies so traffic never loops back through
        // our own gateway.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

fn should_forward_header(name: &str) -> bool {
    !STRIPPED_REQUEST_HEADERS
        .iter()
        .any(|stripped| name.eq_ignore_ascii_case(stripped))
}

impl Upstream for ReqwestUpstream {
    fn fetch(
        &self,
        req: &FetchRequest,
    ) -> impl Future<Output = Result<ResponseSnapshot, FetchError>> + Send {
        async move {
            let url = req.full_url();
            let mut builder = self.client.request(to_reqwest_method(req.method), &url);

            for (key, value) in &req.headers {
                if !should_forward_header(key) {
                    continue;
                }
                if let Ok(header_name) = reqwest::header::HeaderName::try_from(key.as_str()) {
                    if let Ok(header_value) = reqwest::header::HeaderValue::from_str(value) {
                        builder = builder.header(header_name, header_value);
                    }
                }
            }

            if let Some(body) = &req.body {
                builder = builder.body(body.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            let status = response.status().as_u16();
            let status_message = response.status().canonical_reason().map(String::from);
            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?
                .to_vec();

            Ok(ResponseSnapshot {
                status,
                status_message,
                headers,
                body,
            })
        }
    }
}
