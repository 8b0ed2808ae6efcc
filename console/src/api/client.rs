use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Terminal failure of a backend call, after retries
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status} {status_text}")]
pub struct ApiError {
    /// HTTP status, 0 when the request never got a response
    pub status: u16,
    pub status_text: String,
    pub message: Option<String>,
}

impl ApiError {
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self {
            status: 0,
            status_text: "Network Error".to_string(),
            message: Some(err.to_string()),
        }
    }

    /// One-line text for a notification
    pub fn summary(&self) -> String {
        match &self.message {
            Some(m) if !m.is_empty() => format!("{self}: {m}"),
            _ => self.to_string(),
        }
    }
}

/// Uniform result of a backend call. Never both `data` and `error`; both
/// absent means the response had an unexpected shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { data: Some(data), error: None }
    }

    pub fn err(error: ApiError) -> Self {
        Self { data: None, error: Some(error) }
    }

    pub fn empty() -> Self {
        Self { data: None, error: None }
    }

    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.data),
        }
    }
}

/// Linear retry: the same delay between every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Per-call options. A body turns the call into a POST.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn json(body: Value) -> Self {
        Self {
            body: Some(body),
            query: Vec::new(),
        }
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// HTTP client bound to the backend base URL.
///
/// Every call is retried under the same policy whatever its verb, so
/// non-idempotent endpoints may see a request more than once.
#[derive(Clone)]
pub struct RequestClient {
    base_url: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl RequestClient {
    pub fn new(base_url: &str, retry: RetryPolicy, timeout: Option<Duration>) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
            client: builder.build().expect("HTTP client"),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a call and decode its JSON body. Failures land in `error`.
    pub async fn request<T: DeserializeOwned>(&self, path: &str, opts: RequestOptions) -> ApiResponse<T> {
        let url = format!("{}{}", self.base_url, path);
        let attempts = self.retry.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.attempt(&url, &opts).await {
                Ok(body) => return decode(path, &body),
                Err(e) => {
                    debug!("{path} attempt {attempt}/{attempts} failed: {}", e.summary());
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        let error = last_error.unwrap_or_else(|| ApiError::network("no attempt made"));
        warn!("{path} failed after {attempts} attempts: {}", error.summary());
        ApiResponse::err(error)
    }

    async fn attempt(&self, url: &str, opts: &RequestOptions) -> Result<String, ApiError> {
        let builder = match &opts.body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.get(url),
        };
        let builder = if opts.query.is_empty() {
            builder
        } else {
            builder.query(&opts.query)
        };

        let resp = builder
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ApiError::network)?;

        let status = resp.status();
        let body = resp.text().await.map_err(ApiError::network)?;
        if status.is_success() {
            return Ok(body);
        }

        Err(ApiError {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            message: error_message(&body),
        })
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: &str) -> ApiResponse<T> {
    match serde_json::from_str(body) {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => {
            debug!("{path}: unexpected response shape ({e})");
            ApiResponse::empty()
        }
    }
}

/// Pull a human message out of an error body: FastAPI `detail`, then
/// `error`/`message`, else the raw text.
fn error_message(body: &str) -> Option<String> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(Value::String(s)) = map.get(key) {
                return Some(s.clone());
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(200).collect())
    }
}
