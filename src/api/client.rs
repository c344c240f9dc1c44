//! HTTP client for the pet records API.
//!
//! The client only covers the single read endpoint this subsystem
//! consumes. Credential storage and retry-on-401 live with the session
//! layer that hands us a token, not here.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::models::PetRecord;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL for the records API.
const DEFAULT_BASE_URL: &str = "https://api.pawtrack.app";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Source of raw pet records for the sync orchestrator.
///
/// Constructed by the caller and injected, never reached through a
/// global. Tests substitute an in-memory implementation.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every record, bounded by `page_size_ceiling`. The remote API
    /// is not paginated by this subsystem; the ceiling just caps one
    /// oversized response.
    async fn fetch_all_records(&self, page_size_ceiling: u32) -> Result<Vec<PetRecord>, ApiError>;
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    pets: Vec<PetRecord>,
}

/// API client for the pet records service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client against the default base URL.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    /// Create a new API client against a specific base URL.
    pub fn with_base_url(base_url: String) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    /// Check if response is successful, returning a classified error with
    /// the (truncated) body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

#[async_trait]
impl RecordSource for ApiClient {
    async fn fetch_all_records(&self, page_size_ceiling: u32) -> Result<Vec<PetRecord>, ApiError> {
        let url = format!("{}/v1/pets", self.base_url);

        let mut request = self.client.get(&url).query(&[("pageSize", page_size_ceiling)]);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = Self::check_response(request.send().await?).await?;
        let records: RecordsResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse records: {}", e)))?;

        debug!(count = records.pets.len(), "Fetched pet records");
        Ok(records.pets)
    }
}
