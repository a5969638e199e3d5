// ABOUTME: Resource handling module for issuing one HTTP exchange through a session's transport.
// ABOUTME: Builds GET/HEAD/POST requests, enforces content-length limits, and decodes charsets.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;

use crate::error::ScrapeError;

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// HTTP method of a fetch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
}

/// One outbound request.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub json_body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    /// A GET request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// A HEAD request for `url`.
    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            url: url.into(),
            ..Default::default()
        }
    }

    /// A POST request for `url` carrying `body` as JSON.
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            json_body: Some(body),
            ..Default::default()
        }
    }

    /// Add a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of a completed exchange, whatever its status.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResult {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for the statuses that signal bot detection or rate limiting.
    pub fn is_block(&self) -> bool {
        self.status == 403 || self.status == 429
    }

    /// Decode the body as UTF-8 text, using charset hints from the content-type header.
    pub fn text_utf8(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Decode body bytes to a String using charset from content-type header or detection.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(ct) = content_type {
        if let Some(charset) = extract_charset(ct) {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(body);
                return decoded.into_owned();
            }
        }
    }

    // Use chardetng for detection
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    for part in lower.split(';') {
        let trimmed = part.trim();
        if let Some(charset) = trimmed.strip_prefix("charset=") {
            let charset = charset.trim_matches('"').trim_matches('\'');
            return Some(charset.to_string());
        }
    }
    None
}

/// Send `req` through `client` and read the whole response.
///
/// Any status is returned as a `FetchResult`; classifying it is the caller's job.
pub async fn send(
    client: &reqwest::Client,
    req: &FetchRequest,
    op: &str,
) -> Result<FetchResult, ScrapeError> {
    let url = req.url.as_str();
    let parsed = url::Url::parse(url).map_err(|e| {
        ScrapeError::validation(url, op, Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;

    let mut request = match req.method {
        Method::Get => client.get(parsed),
        Method::Head => client.head(parsed),
        Method::Post => client.post(parsed),
    };
    for (key, value) in &req.headers {
        request = request.header(key, value);
    }
    if let Some(ref body) = req.json_body {
        request = request.json(body);
    }
    if let Some(timeout) = req.timeout {
        request = request.timeout(timeout);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ScrapeError::from_transport(url, op, e))?;

    if let Some(len) = response.content_length() {
        if len as usize > MAX_CONTENT_LENGTH {
            return Err(ScrapeError::fetch(
                url,
                op,
                Some(anyhow::anyhow!("content too large")),
            ));
        }
    }

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    let body = response
        .bytes()
        .await
        .map_err(|e| ScrapeError::from_transport(url, op, e))?;

    if body.len() > MAX_CONTENT_LENGTH {
        return Err(ScrapeError::fetch(
            url,
            op,
            Some(anyhow::anyhow!("content too large")),
        ));
    }

    Ok(FetchResult {
        status,
        url: url.to_string(),
        final_url,
        content_type,
        body,
    })
}
