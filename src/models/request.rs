//! Outgoing request model
//!
//! A `FetchRequest` is the engine's view of one outgoing application
//! request: enough identity to classify it, cache it, and forward it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Convert from string (lossy, defaults to GET)
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            "HEAD" => HttpMethod::Head,
            "OPTIONS" => HttpMethod::Options,
            _ => HttpMethod::Get,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(HttpMethod::from_str_lossy(s))
    }
}

/// One outgoing request as seen at the interception point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    /// HTTP method
    pub method: HttpMethod,

    /// Request scheme (http or https)
    pub scheme: String,

    /// Host name
    pub host: String,

    /// Port number
    pub port: u16,

    /// Request path (including query string)
    pub path: String,

    /// Request headers
    pub headers: HashMap<String, String>,

    /// Request body (if any)
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn new(
        method: HttpMethod,
        scheme: &str,
        host: &str,
        port: u16,
        path: &str,
        headers: HashMap<String, String>,
    ) -> Self {
        Self {
            method,
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            headers,
            body: None,
        }
    }

    /// Build a GET request from an absolute URL.
    pub fn get(url: &str) -> Result<Self, FetchError> {
        Self::from_url(HttpMethod::Get, url)
    }

    /// Build a POST request from an absolute URL and a JSON body.
    pub fn post_json(url: &str, body: Vec<u8>) -> Result<Self, FetchError> {
        let mut req = Self::from_url(HttpMethod::Post, url)?;
        req.headers
            .insert("content-type".to_string(), "application/json".to_string());
        req.body = Some(body);
        Ok(req)
    }

    fn from_url(method: HttpMethod, url: &str) -> Result<Self, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| FetchError::InvalidRequest(format!("invalid URL '{}': {}", url, e)))?;

        let scheme = parsed.scheme().to_string();
        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidRequest(format!("URL '{}' has no host", url)))?
            .to_string();
        let port = parsed
            .port()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });
        let path = if let Some(q) = parsed.query() {
            format!("{}?{}", parsed.path(), q)
        } else {
            parsed.path().to_string()
        };

        Ok(Self::new(method, &scheme, &host, port, &path, HashMap::new()))
    }

    /// Get the full URL, eliding default ports.
    pub fn full_url(&self) -> String {
        let port_str = if (self.scheme == "https" && self.port == 443)
            || (self.scheme == "http" && self.port == 80)
        {
            String::new()
        } else {
            format!(":{}", self.port)
        };
        format!("{}://{}{}{}", self.scheme, self.host, port_str, self.path)
    }

    /// Cache identity for this request. Only GET requests are ever cached,
    /// but the key includes the method so lookups stay self-describing.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method.as_str(), self.full_url())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this request is a full-document navigation.
    ///
    /// `Sec-Fetch-Mode: navigate` is authoritative when present; otherwise a
    /// GET whose Accept header prefers HTML is treated as a navigation.
    pub fn is_navigation(&self) -> bool {
        if self.method != HttpMethod::Get {
            return false;
        }
        if let Some(mode) = self.header("sec-fetch-mode") {
            return mode.eq_ignore_ascii_case("navigate");
        }
        self.header("accept")
            .map(|accept| accept.trim_start().starts_with("text/html"))
            .unwrap_or(false)
    }
}
