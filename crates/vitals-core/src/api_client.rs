//! HTTP client for the vitals backend REST API.
//!
//! # Example
//!
//! ```no_run
//! use vitals_core::api_client::ApiClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new("https://api.example.com/v1")?.with_token("secret");
//!
//! let alerts = client.active_alerts().await?;
//! println!("{} active alerts", alerts.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use vitals_types::VitalsReading;

use crate::retry::{RetryConfig, Retryable, with_retry};

/// Errors returned by the backend API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// The request never got a response.
    #[error("Network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Missing or rejected credentials (401/403).
    #[error("Authentication failed ({status})")]
    Auth { status: u16 },

    /// The server rejected the request body (400/422).
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    /// 5xx response.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ApiError {
    /// Classify a non-success status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth { status },
            400 | 422 => Self::Validation { message },
            404 => Self::NotFound { message },
            500..=599 => Self::Server { status, message },
            _ => Self::Http { status, message },
        }
    }

    /// Whether the request failed before the server could judge it.
    pub fn is_transmission_failure(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Server { .. })
    }
}

impl Retryable for ApiError {
    fn is_retryable(&self) -> bool {
        self.is_transmission_failure()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// An alert raised by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub id: String,
    pub kind: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Body of `POST /health/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub readings: Vec<VitalsReading>,
}

/// Response of `POST /health/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Readings stored by the server.
    pub accepted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A wearable registered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
}

/// HTTP client for the backend API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    retry: RetryConfig,
}

fn normalize_base_url(base_url: &str) -> Result<String> {
    let base_url = base_url.trim_end_matches('/').to_string();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ApiError::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {}",
            base_url
        )));
    }
    Ok(base_url)
}

impl ApiClient {
    /// Create a client with a 10 s request timeout.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Network {
                url: base_url.to_string(),
                source: e,
            })?;
        Self::with_client(base_url, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
            token: None,
            retry: RetryConfig::for_api(),
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Latest vitals known to the backend.
    pub async fn current_vitals(&self) -> Result<VitalsReading> {
        self.get("/health/current", &[]).await
    }

    /// Readings captured between `start` and `end`.
    pub async fn historical(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<VitalsReading>> {
        let format = |t: OffsetDateTime| t.format(&Rfc3339).unwrap_or_default();
        let query = [("start", format(start)), ("end", format(end))];
        self.get("/health/historical", &query).await
    }

    pub async fn active_alerts(&self) -> Result<Vec<HealthAlert>> {
        self.get("/health/alerts/active", &[]).await
    }

    /// Upload readings.
    pub async fn sync(&self, readings: &[VitalsReading]) -> Result<SyncResponse> {
        let body = serde_json::to_value(SyncRequest {
            readings: readings.to_vec(),
        })?;
        self.request(Method::POST, "/health/sync", &[], Some(&body))
            .await
    }

    pub async fn user_profile(&self) -> Result<UserProfile> {
        self.get("/user/profile", &[]).await
    }

    pub async fn devices(&self) -> Result<Vec<RegisteredDevice>> {
        self.get("/user/devices", &[]).await
    }

    /// Register a wearable with the user's account.
    pub async fn register_device(&self, device: &RegisteredDevice) -> Result<RegisteredDevice> {
        let body = serde_json::to_value(device)?;
        self.request(Method::POST, "/user/devices", &[], Some(&body))
            .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.request(Method::GET, path, query, None).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let name = format!("{} {}", method, path);
        with_retry(&self.retry, &name, || self.send_once(method.clone(), &url, query, body)).await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ApiError::Network {
            url: url.to_string(),
            source: e,
        })?;
        debug!("{} -> {}", url, response.status());
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(ApiError::Decode);
        }

        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| {
                v.get("error")
                    .or_else(|| v.get("message"))
                    .and_then(|e| e.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| status_text(status));
        Err(ApiError::from_status(status.as_u16(), message))
    }
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(String::from)
        .unwrap_or_else(|| status.to_string())
}
