//! API request and response models.

use chrono::{DateTime, Utc};
use hookbin_core::{CapturedRequest, HeaderList};
use hookbin_storage::{TokenSummary, DEFAULT_RESPONSE_STATUS};
use serde::{Deserialize, Serialize};

/// Response body for POST /api/session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Response body for GET /api/tokens.
#[derive(Debug, Serialize)]
pub struct TokensResponse {
    pub tokens: Vec<TokenSummary>,
}

/// Request body for PUT /api/tokens/{token}/response.
#[derive(Debug, Deserialize)]
pub struct UpdateResponseRequest {
    pub enabled: bool,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: HeaderList,
    #[serde(default)]
    pub body: String,
}

fn default_status() -> u16 {
    DEFAULT_RESPONSE_STATUS
}

/// Query parameters for GET /api/tokens/{token}/requests.
#[derive(Debug, Deserialize)]
pub struct RequestsQuery {
    /// Maximum number of requests to return (default: 50, at most 500).
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Largest page size for request listings.
pub const MAX_LIMIT: i64 = 500;

/// Response body for GET /api/tokens/{token}/requests.
#[derive(Debug, Serialize)]
pub struct RequestsResponse {
    pub requests: Vec<CapturedRequest>,
    pub total: i64,
}

/// Request body for POST /api/tokens/{token}/requests.
///
/// Either pasted raw HTTP text or an already structured request.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ManualIngest {
    Raw(RawIngest),
    Structured(StructuredIngest),
}

/// Pasted raw HTTP request text.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIngest {
    pub raw: String,
    pub client_ip: Option<String>,
    pub remote_ip: Option<String>,
}

/// A request given field by field. Header names are kept as given.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredIngest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HeaderList,
    #[serde(default)]
    pub body: String,
    pub client_ip: Option<String>,
    pub remote_ip: Option<String>,
}

/// Query parameters for GET /api/tokens/{token}/requests/{id}/body.
#[derive(Debug, Deserialize)]
pub struct BodyQuery {
    /// `preview` returns JSON instead of the raw bytes.
    pub format: Option<String>,
}

/// Response body for a body preview.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyPreview {
    pub is_binary: bool,
    pub content_type: String,
    pub content_length: u64,
    /// Body text, absent for binary bodies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Default acknowledgement for captured requests.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureAck {
    pub ok: bool,
    pub request_id: String,
}

/// Response body for bulk deletions.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_session_channels: usize,
    pub active_token_channels: usize,
}
